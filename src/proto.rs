//! JSON envelopes exchanged with clients.

use std::fmt;
use std::str::FromStr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hub::{HubError, HubResult, RoomId, UserInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    CreateUser,
    DeleteUser,
    UpdateUser,
    CallUpdate,
    GetUsers,
    JoinRoom,
    LeaveRoom,
    CreateRoom,
    DeleteRoom,
    GetRooms,
    Login,
    Signup,
}

impl RequestKind {
    pub const ALL: [RequestKind; 12] = [
        RequestKind::CreateUser,
        RequestKind::DeleteUser,
        RequestKind::UpdateUser,
        RequestKind::CallUpdate,
        RequestKind::GetUsers,
        RequestKind::JoinRoom,
        RequestKind::LeaveRoom,
        RequestKind::CreateRoom,
        RequestKind::DeleteRoom,
        RequestKind::GetRooms,
        RequestKind::Login,
        RequestKind::Signup,
    ];

    pub fn as_str(&self) -> &'static str {
        use RequestKind::*;
        match self {
            CreateUser => "create-user",
            DeleteUser => "delete-user",
            UpdateUser => "update-user",
            CallUpdate => "call-update",
            GetUsers => "get-users",
            JoinRoom => "join-room",
            LeaveRoom => "leave-room",
            CreateRoom => "create-room",
            DeleteRoom => "delete-room",
            GetRooms => "get-rooms",
            Login => "login",
            Signup => "signup",
        }
    }

    /// Kinds a connection may send before it has an authenticated user.
    pub fn is_public(&self) -> bool {
        use RequestKind::*;
        matches!(self, Login | Signup | CreateUser | GetUsers | GetRooms)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| HubError::Validation(format!("received invalid request_type: ({s})")))
    }
}

/// Opaque media frame relayed between room members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    /// Base64 encoded frame; the hub never decodes it.
    #[serde(default)]
    pub curr_frame: String,
    #[serde(default)]
    pub image_format: String,
}

/// Inbound socket message. Every field but `request_type` is optional and
/// only read by the handlers that need it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Request {
    pub request_type: String,
    #[serde(default)]
    pub user_info: Option<UserInfo>,
    #[serde(default)]
    pub call_data: Option<CallData>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
}

impl Request {
    pub fn kind(&self) -> Result<RequestKind, HubError> {
        self.request_type.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Success,
    Error,
}

/// Answer to the originating client only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub response_type: ResponseType,
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Reply {
    pub const SUCCESS: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const INTERNAL_ERROR: u16 = 500;

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Success,
            code: Self::SUCCESS,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data<T: Serialize>(mut self, data: &T) -> HubResult<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Turn a success into the error from a follow-up broadcast. `data` is
    /// kept, since the change it describes has already been applied.
    pub fn delivered<T>(self, outcome: HubResult<T>) -> Self {
        match outcome {
            Ok(_) => self,
            Err(err) => Reply {
                data: self.data,
                ..Reply::from(&err)
            },
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Error,
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.response_type == ResponseType::Success
    }
}

impl From<&HubError> for Reply {
    fn from(err: &HubError) -> Self {
        Reply::error(err.code(), err.to_string())
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Fan-out message: `response_type` names the event that caused it.
#[derive(Debug, Serialize)]
pub struct Event<'a, T> {
    pub response_type: RequestKind,
    pub data: &'a T,
}
