mod call;
mod delete;
mod join;
mod new;

use std::sync::Arc;

use axum::{Extension, Router, debug_handler, extract::State, routing::{self, get, post}};
use serde::Serialize;

use crate::{
    AppResult, AppState,
    auth::AuthUser,
    hub::{Audience, Departure, Hub, HubResult, RoomId},
    proto::{Reply, RequestKind},
};

pub use call::call_update;
pub use delete::delete_room;
pub use join::join_room;
pub use new::create_room;

/// Routes behind the auth gate.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list).post(new::create))
        .route("/rooms/leave", post(leave))
        .route("/rooms/{id}/join", post(join::join))
        .route("/rooms/{id}", routing::delete(delete::delete))
}

#[debug_handler]
async fn list(State(hub): State<Arc<Hub>>) -> AppResult<Reply> {
    Ok(get_rooms(&hub)?)
}

#[debug_handler]
async fn leave(
    State(hub): State<Arc<Hub>>,
    Extension(AuthUser { username }): Extension<AuthUser>,
) -> AppResult<Reply> {
    Ok(leave_room(&hub, &username).await?)
}

pub fn get_rooms(hub: &Hub) -> HubResult<Reply> {
    let rooms = hub.rooms();
    Reply::success(format!("{} room(s).", rooms.len())).with_data(&rooms)
}

pub async fn leave_room(hub: &Hub, username: &str) -> HubResult<Reply> {
    let departure = hub.leave_room(username)?;
    let message = match &departure {
        Departure::Left { room_id, .. } => format!("Left room {room_id}."),
        Departure::Dissolved(room) => format!("Left room {}; it was closed.", room.id),
    };
    Ok(Reply::success(message).delivered(announce_departure(hub, &departure).await))
}

#[derive(Debug, Serialize)]
pub(crate) struct Membership<'a> {
    pub room_id: RoomId,
    pub username: &'a str,
}

/// Tell the right people that a user is gone from their room: the remaining
/// members for a plain leave, every evicted member when the owner's exit
/// closed the room.
pub(crate) async fn announce_departure(hub: &Hub, departure: &Departure) -> HubResult<usize> {
    match departure {
        Departure::Left { room_id, username } => {
            let data = Membership {
                room_id: *room_id,
                username,
            };
            hub.broadcast(
                Audience::Room(*room_id),
                RequestKind::LeaveRoom,
                &data,
                &[username.as_str()],
            )
            .await
        }
        Departure::Dissolved(room) => {
            hub.broadcast(
                Audience::Users(room.members.clone()),
                RequestKind::DeleteRoom,
                room,
                &[room.owner.as_str()],
            )
            .await
        }
    }
}
