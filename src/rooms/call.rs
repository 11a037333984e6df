use serde::Serialize;
use tracing::trace;

use crate::{
    hub::{Audience, Hub, HubError, HubResult},
    proto::{CallData, RequestKind},
};

#[derive(Debug, Serialize)]
struct Frame<'a> {
    username: &'a str,
    call_data: &'a CallData,
}

/// Relay a media frame to the sender's room mates. The frame is passed on
/// untouched and the sender gets no reply on success.
pub async fn call_update(hub: &Hub, username: &str, call_data: &CallData) -> HubResult<usize> {
    let room_id = hub
        .user(username)
        .ok_or_else(|| HubError::UserNotFound(username.to_owned()))?
        .room_id
        .ok_or_else(|| HubError::NotInRoom(username.to_owned()))?;

    let delivered = hub
        .broadcast(
            Audience::Room(room_id),
            RequestKind::CallUpdate,
            &Frame {
                username,
                call_data,
            },
            &[username],
        )
        .await?;
    trace!(username, room = %room_id, delivered, "relayed call frame");
    Ok(delivered)
}
