use std::sync::Arc;

use axum::{Json, debug_handler, extract::State};
use serde::Deserialize;
use tracing::info;

use crate::{
    AppResult,
    hub::{ConnId, Hub, HubError, HubResult},
    proto::Reply,
};

use super::Session;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginBody {
    username: String,
    password: String,
}

#[debug_handler]
pub(crate) async fn login(
    State(hub): State<Arc<Hub>>,
    Json(LoginBody { username, password }): Json<LoginBody>,
) -> AppResult<Reply> {
    Ok(login_user(&hub, &username, &password, None).await?)
}

/// Verify credentials and hand out the user's token, reusing it while it is
/// still valid. When `conn` is given the user is bound to it.
pub async fn login_user(
    hub: &Hub,
    username: &str,
    password: &str,
    conn: Option<&ConnId>,
) -> HubResult<Reply> {
    let hashed = hub.password_of(username)?;
    let password = password.to_owned();
    super::blocking(move || hashed.verify(&password)).await??;

    let token = hub.issue_token(username)?;
    if let Some(conn) = conn {
        hub.attach(conn, username)?;
    }
    let user = hub
        .user(username)
        .ok_or_else(|| HubError::UserNotFound(username.to_owned()))?;

    info!(username, via_socket = conn.is_some(), "user logged in");
    Reply::success(format!("User '{username}' logged in.")).with_data(&Session { token, user })
}
