mod delete;
mod new;
mod update;

use std::sync::Arc;

use axum::{Router, debug_handler, extract::{Query, State}, routing::get};
use serde::Deserialize;

use crate::{
    AppResult, AppState,
    hub::{Hub, HubResult, RoomId},
    proto::Reply,
};

pub use delete::delete_user;
pub use new::create_user;
pub use update::update_user;

/// Routes behind the auth gate.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/users",
        get(list)
            .post(update::update)
            .put(update::update)
            .delete(delete::delete),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsersQuery {
    /// Restrict the listing to members of this room.
    id: Option<RoomId>,
}

#[debug_handler]
async fn list(
    State(hub): State<Arc<Hub>>,
    Query(UsersQuery { id }): Query<UsersQuery>,
) -> AppResult<Reply> {
    Ok(get_users(&hub, id)?)
}

pub fn get_users(hub: &Hub, room: Option<RoomId>) -> HubResult<Reply> {
    let users = hub.users(room)?;
    let message = match room {
        Some(id) => format!("{} user(s) in room {id}.", users.len()),
        None => format!("{} user(s).", users.len()),
    };
    Reply::success(message).with_data(&users)
}
