use std::sync::Arc;

use axum::{Extension, Json, debug_handler, extract::State};

use crate::{
    AppResult,
    auth::AuthUser,
    hub::{Audience, Hub, HubResult, UserInfo},
    proto::{Reply, RequestKind},
};

#[debug_handler]
pub(crate) async fn update(
    State(hub): State<Arc<Hub>>,
    Extension(AuthUser { username }): Extension<AuthUser>,
    Json(info): Json<UserInfo>,
) -> AppResult<Reply> {
    Ok(update_user(&hub, &username, info).await?)
}

pub async fn update_user(hub: &Hub, username: &str, info: UserInfo) -> HubResult<Reply> {
    let user = hub.update_user_info(username, info)?;
    let reply = Reply::success(format!("User '{username}' was updated.")).with_data(&user)?;
    let announced = hub
        .broadcast(Audience::All, RequestKind::UpdateUser, &user, &[username])
        .await;
    Ok(reply.delivered(announced))
}
