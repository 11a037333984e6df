use std::sync::Arc;

use axum::{Extension, debug_handler, extract::{Path, State}};

use crate::{
    AppResult,
    auth::AuthUser,
    hub::{Departure, Hub, HubResult, RoomId},
    proto::Reply,
};

use super::announce_departure;

#[debug_handler]
pub(crate) async fn delete(
    State(hub): State<Arc<Hub>>,
    Extension(AuthUser { username }): Extension<AuthUser>,
    Path(id): Path<RoomId>,
) -> AppResult<Reply> {
    Ok(delete_room(&hub, &username, id).await?)
}

/// Only the owner may delete a room. Evicted members are told.
pub async fn delete_room(hub: &Hub, username: &str, id: RoomId) -> HubResult<Reply> {
    let room = hub.delete_room(id, username)?;
    let reply = Reply::success(format!("Room {id} was deleted.")).with_data(&room)?;
    Ok(reply.delivered(announce_departure(hub, &Departure::Dissolved(room)).await))
}
