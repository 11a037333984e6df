use std::sync::Arc;

use axum::{Extension, Json, debug_handler, extract::State};
use serde::Deserialize;

use crate::{
    AppResult,
    auth::AuthUser,
    hub::{Hub, HubResult},
    proto::Reply,
};

use super::announce_departure;

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomBody {
    room_name: String,
}

#[debug_handler]
pub(crate) async fn create(
    State(hub): State<Arc<Hub>>,
    Extension(AuthUser { username }): Extension<AuthUser>,
    Json(NewRoomBody { room_name }): Json<NewRoomBody>,
) -> AppResult<Reply> {
    Ok(create_room(&hub, &username, &room_name).await?)
}

/// Open a room owned by `owner`, who is moved out of any room they were in.
pub async fn create_room(hub: &Hub, owner: &str, name: &str) -> HubResult<Reply> {
    let (room, departure) = hub.create_room(owner, name)?;
    let reply = Reply::success(format!("Room {} '{}' was created.", room.id, room.name)).with_data(&room)?;
    Ok(match &departure {
        Some(departure) => reply.delivered(announce_departure(hub, departure).await),
        None => reply,
    })
}
