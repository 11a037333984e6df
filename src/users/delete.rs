use std::sync::Arc;

use axum::{Extension, debug_handler, extract::State};
use serde::Serialize;

use crate::{
    AppResult,
    auth::AuthUser,
    hub::{Audience, Hub, HubResult},
    proto::{Reply, RequestKind},
    rooms::announce_departure,
};

#[derive(Debug, Serialize)]
struct DeletedUser<'a> {
    username: &'a str,
}

#[debug_handler]
pub(crate) async fn delete(
    State(hub): State<Arc<Hub>>,
    Extension(AuthUser { username }): Extension<AuthUser>,
) -> AppResult<Reply> {
    Ok(delete_user(&hub, &username).await?)
}

/// Remove `username` for good. Their room is left (or dissolved, if they
/// owned it) and their token stops working.
pub async fn delete_user(hub: &Hub, username: &str) -> HubResult<Reply> {
    let deleted = hub.delete_user(username)?;
    let reply = Reply::success(format!("User '{username}' was deleted.")).with_data(&deleted.user)?;

    let departed = match &deleted.departure {
        Some(departure) => announce_departure(hub, departure).await.map(drop),
        None => Ok(()),
    };
    // the socket outlives the account, anonymously, so skip it by id
    let announced = hub
        .broadcast_except(
            Audience::All,
            RequestKind::DeleteUser,
            &DeletedUser { username },
            &[username],
            &deleted.conn.iter().collect::<Vec<_>>(),
        )
        .await;

    Ok(reply.delivered(departed.and(announced)))
}
