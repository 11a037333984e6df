use thiserror::Error;

use super::broadcast::BroadcastError;
use super::connection::ConnId;
use super::rooms::RoomId;

pub type HubResult<T> = Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error("user '{0}' does not exist")]
    UserNotFound(String),
    #[error("room {0} does not exist")]
    RoomNotFound(RoomId),
    #[error("connection ({0}) is not registered")]
    ConnectionNotFound(ConnId),
    #[error("only the owner of room {0} can delete it")]
    PermissionDenied(RoomId),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("user '{0}' is not in a room")]
    NotInRoom(String),
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid authentication key")]
    AuthMissing,
    #[error("expired authentication")]
    AuthExpired,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Internal(String),
}

impl HubError {
    /// Numeric code sent back in replies; doubles as the HTTP status.
    pub fn code(&self) -> u16 {
        use HubError::*;
        match self {
            Validation(_) | NotInRoom(_) => 400,
            InvalidCredentials | AuthMissing | AuthExpired => 401,
            PermissionDenied(_) => 403,
            UserNotFound(_) | RoomNotFound(_) | ConnectionNotFound(_) => 404,
            DuplicateUsername(_) => 409,
            Broadcast(_) | Transport(_) | Encode(_) | Internal(_) => 500,
        }
    }
}
