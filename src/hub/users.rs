use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthToken, HashedPassword};

use super::connection::ConnId;
use super::error::{HubError, HubResult};
use super::rooms::RoomId;

/// Profile fields a client sends and sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
}

pub struct User {
    pub info: UserInfo,
    pub(crate) password: Option<HashedPassword>,
    pub token: Option<AuthToken>,
    pub room_id: Option<RoomId>,
    pub conn: Option<ConnId>,
}

impl User {
    pub fn new(info: UserInfo, password: Option<HashedPassword>, token: AuthToken) -> Self {
        Self {
            info,
            password,
            token: Some(token),
            room_id: None,
            conn: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.info.username
    }

    pub fn view(&self) -> UserView {
        UserView {
            username: self.info.username.clone(),
            display_name: self.info.display_name.clone(),
            room_id: self.room_id,
            online: self.conn.is_some(),
        }
    }
}

/// What other clients get to see about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub username: String,
    pub display_name: String,
    pub room_id: Option<RoomId>,
    pub online: bool,
}

/// Users keyed by name, with a secondary index from auth token to name.
#[derive(Default)]
pub(crate) struct UserRegistry {
    by_name: HashMap<String, User>,
    by_token: HashMap<String, String>,
}

impl UserRegistry {
    pub(crate) fn insert(&mut self, user: User) -> HubResult<()> {
        let username = user.username().to_owned();
        if self.by_name.contains_key(&username) {
            return Err(HubError::DuplicateUsername(username));
        }
        if let Some(token) = &user.token {
            self.by_token.insert(token.token.clone(), username.clone());
        }
        self.by_name.insert(username, user);
        Ok(())
    }

    pub(crate) fn remove(&mut self, username: &str) -> Option<User> {
        let user = self.by_name.remove(username)?;
        if let Some(token) = &user.token {
            self.by_token.remove(&token.token);
        }
        Some(user)
    }

    pub(crate) fn get(&self, username: &str) -> Option<&User> {
        self.by_name.get(username)
    }

    pub(crate) fn get_mut(&mut self, username: &str) -> Option<&mut User> {
        self.by_name.get_mut(username)
    }

    pub(crate) fn by_token(&self, token: &str) -> Option<&User> {
        self.by_name.get(self.by_token.get(token)?)
    }

    /// Swap the user's token, keeping the token index in step.
    pub(crate) fn set_token(&mut self, username: &str, token: AuthToken) -> HubResult<()> {
        let user = self
            .by_name
            .get_mut(username)
            .ok_or_else(|| HubError::UserNotFound(username.to_owned()))?;
        if let Some(old) = user.token.replace(token.clone()) {
            self.by_token.remove(&old.token);
        }
        self.by_token.insert(token.token, username.to_owned());
        Ok(())
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &User> {
        self.by_name.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_name.len()
    }
}
