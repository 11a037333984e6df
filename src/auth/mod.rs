mod gate;
mod login;
mod password;
mod signup;
mod token;
pub mod validate;

use axum::{Router, routing::post};
use serde::Serialize;

use crate::{AppState, hub::UserView};

pub use gate::{AuthUser, bearer_token, require_auth};
pub use login::login_user;
pub use password::{HashedPassword, SALT_LEN, Salt};
pub use signup::signup_user;
pub use token::AuthToken;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup::signup))
        .route("/login", post(login::login))
}

/// Reply payload for a successful signup or login.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    #[serde(flatten)]
    pub token: AuthToken,
    pub user: UserView,
}

/// Run argon2 work on the blocking pool.
async fn blocking<T, F>(work: F) -> crate::hub::HubResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| crate::hub::HubError::Internal(format!("password worker failed: {err}")))
}
