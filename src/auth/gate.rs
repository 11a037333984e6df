use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::{
    hub::{Hub, HubError},
    proto::Reply,
};

/// The user a request was authenticated as, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

/// Token from `Authorization: Bearer <token>`, or a bare token value.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// Reject requests without a known, unexpired token with 401.
pub async fn require_auth(State(hub): State<Arc<Hub>>, mut request: Request, next: Next) -> Response {
    let result = bearer_token(request.headers())
        .ok_or(HubError::AuthMissing)
        .and_then(|token| hub.authenticate(token));

    match result {
        Ok(user) => {
            request.extensions_mut().insert(AuthUser {
                username: user.username,
            });
            next.run(request).await
        }
        Err(err) => {
            debug!(path = request.uri().path(), error = %err, "rejected unauthenticated request");
            Reply::from(&err).into_response()
        }
    }
}
