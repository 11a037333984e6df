use std::sync::Arc;

use axum::{Json, debug_handler, extract::State};
use serde::Deserialize;

use crate::{
    AppResult,
    hub::{Audience, ConnId, Hub, HubError, HubResult, UserInfo},
    proto::{Reply, RequestKind},
};

use super::{HashedPassword, Session, validate};

#[derive(Debug, Deserialize)]
pub(crate) struct SignupBody {
    user_info: UserInfo,
    password: String,
}

#[debug_handler]
pub(crate) async fn signup(
    State(hub): State<Arc<Hub>>,
    Json(SignupBody { user_info, password }): Json<SignupBody>,
) -> AppResult<Reply> {
    Ok(signup_user(&hub, user_info, password, None).await?)
}

/// Register a password-protected user and announce it to everyone else.
pub async fn signup_user(
    hub: &Hub,
    info: UserInfo,
    password: String,
    conn: Option<&ConnId>,
) -> HubResult<Reply> {
    validate::username(&info.username)?;
    validate::password(&password)?;
    // skip the hash for names that are obviously taken
    if hub.user(&info.username).is_some() {
        return Err(HubError::DuplicateUsername(info.username));
    }

    let hashed = super::blocking(move || HashedPassword::new(&password)).await?;
    let (user, token) = hub.create_user(info, Some(hashed), conn)?;

    let announced = hub
        .broadcast(Audience::All, RequestKind::Signup, &user, &[user.username.as_str()])
        .await;

    let message = format!("User '{}' signed up.", user.username);
    let reply = Reply::success(message).with_data(&Session { token, user })?;
    Ok(reply.delivered(announced))
}
