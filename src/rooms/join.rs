use std::sync::Arc;

use axum::{Extension, debug_handler, extract::{Path, State}};
use serde::Serialize;
use tracing::warn;

use crate::{
    AppResult,
    auth::AuthUser,
    hub::{Audience, Hub, HubError, HubResult, RoomId, RoomView},
    proto::{Reply, RequestKind},
};

use super::announce_departure;

#[derive(Debug, Serialize)]
struct Joined {
    room: RoomView,
    /// The user has no live socket; they must open a new one on `/ws` to
    /// receive room events.
    reconnect_required: bool,
}

#[debug_handler]
pub(crate) async fn join(
    State(hub): State<Arc<Hub>>,
    Extension(AuthUser { username }): Extension<AuthUser>,
    Path(id): Path<RoomId>,
) -> AppResult<Reply> {
    Ok(join_room(&hub, &username, id).await?)
}

/// Probe the joiner's socket, drop it if it no longer answers, then move
/// them into room `id`.
pub async fn join_room(hub: &Hub, username: &str, id: RoomId) -> HubResult<Reply> {
    let reconnect_required = match hub.connection_of(username) {
        Some(conn) => {
            let readiness = conn.probe(hub.settings().probe_timeout).await;
            if readiness.is_ready() {
                false
            } else {
                warn!(username, conn = %conn.id, ?readiness, "stale connection on join, detaching");
                hub.detach_stale(username, &conn.id);
                true
            }
        }
        None => true,
    };

    let (room, departure) = hub.join_room(username, id)?;
    let user = hub
        .user(username)
        .ok_or_else(|| HubError::UserNotFound(username.to_owned()))?;

    let departed = match &departure {
        Some(departure) => announce_departure(hub, departure).await.map(drop),
        None => Ok(()),
    };
    let announced = hub
        .broadcast(Audience::Room(id), RequestKind::JoinRoom, &user, &[username])
        .await;

    let message = if reconnect_required {
        format!("Joined room {id}; reconnect to receive room updates.")
    } else {
        format!("Joined room {id}.")
    };
    let reply = Reply::success(message).with_data(&Joined {
        room,
        reconnect_required,
    })?;
    Ok(reply.delivered(departed.and(announced)))
}
