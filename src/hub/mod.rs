//! The connection, user and room registries and the operations that keep
//! them consistent with each other.
//!
//! ## Locking
//!
//! All three registries and the room id counter live behind one
//! `parking_lot::Mutex`. Each [`Room`] additionally guards its member set
//! with its own mutex. Lock order is registry lock first, then a room lock.
//! Nothing awaits while holding either; broadcasts snapshot their audience
//! under the lock and write after releasing it.

mod broadcast;
mod connection;
mod error;
mod rooms;
mod users;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::auth::{self, AuthToken, HashedPassword};

pub use broadcast::{Audience, BroadcastError};
pub use connection::{ConnId, Connection, Outbound, Readiness};
pub use error::{HubError, HubResult};
pub use rooms::{Room, RoomId, RoomView};
pub use users::{User, UserInfo, UserView};

use connection::ConnectionRegistry;
use rooms::RoomRegistry;
use users::UserRegistry;

#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    /// Lifetime of a freshly minted auth token.
    pub token_ttl: time::Duration,
    /// How long a readiness probe may wait for a write slot.
    pub probe_timeout: Duration,
    /// Upper bound on a single queued write during fan-out.
    pub write_timeout: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            token_ttl: AuthToken::DEFAULT_TTL,
            probe_timeout: Duration::from_millis(5),
            write_timeout: Duration::from_millis(250),
        }
    }
}

/// What happened to a user's previous room when they left it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The user left; the room carries on.
    Left { room_id: RoomId, username: String },
    /// The owner left, so the room was deleted. Holds the room as it was
    /// just before its members were evicted.
    Dissolved(RoomView),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedUser {
    pub user: UserView,
    pub departure: Option<Departure>,
    /// The socket the user was signed in on. It stays registered, now
    /// anonymous.
    pub conn: Option<ConnId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub users: usize,
    pub rooms: usize,
}

#[derive(Default)]
struct Registries {
    conns: ConnectionRegistry,
    users: UserRegistry,
    rooms: RoomRegistry,
}

impl Registries {
    fn user(&self, username: &str) -> HubResult<&User> {
        self.users
            .get(username)
            .ok_or_else(|| HubError::UserNotFound(username.to_owned()))
    }

    fn user_mut(&mut self, username: &str) -> HubResult<&mut User> {
        self.users
            .get_mut(username)
            .ok_or_else(|| HubError::UserNotFound(username.to_owned()))
    }

    /// Unlink `username` from its connection, if any.
    fn detach_user(&mut self, username: &str) -> Option<ConnId> {
        let conn_id = self.users.get_mut(username)?.conn.take()?;
        self.conns.set_user(&conn_id, None);
        Some(conn_id)
    }

    /// Unlink whatever user is attached to `conn_id`.
    fn detach_conn(&mut self, conn_id: &ConnId) -> Option<String> {
        let username = self.conns.set_user(conn_id, None)?;
        if let Some(user) = self.users.get_mut(&username) {
            if user.conn.as_ref() == Some(conn_id) {
                user.conn = None;
            }
        }
        Some(username)
    }

    fn attach(&mut self, conn_id: &ConnId, username: &str) -> HubResult<()> {
        if !self.conns.contains(conn_id) {
            return Err(HubError::ConnectionNotFound(conn_id.clone()));
        }
        self.user(username)?;
        self.detach_conn(conn_id);
        if let Some(previous) = self.detach_user(username) {
            debug!(username, %previous, "user moved to a new connection");
        }
        self.conns.set_user(conn_id, Some(username.to_owned()));
        self.user_mut(username)?.conn = Some(conn_id.clone());
        Ok(())
    }

    /// Take `username` out of its current room. An owner leaving dissolves
    /// the room so that every room always contains its owner.
    fn depart(&mut self, username: &str) -> Option<Departure> {
        let room_id = self.users.get_mut(username)?.room_id.take()?;
        let room = Arc::clone(self.rooms.get(room_id)?);
        if room.owner == username {
            self.dissolve(room_id).map(Departure::Dissolved)
        } else {
            room.remove_member(username);
            Some(Departure::Left {
                room_id,
                username: username.to_owned(),
            })
        }
    }

    /// Evict every member and drop the room.
    fn dissolve(&mut self, room_id: RoomId) -> Option<RoomView> {
        let room = self.rooms.remove(room_id)?;
        let view = room.view();
        for member in room.evict_all() {
            if let Some(user) = self.users.get_mut(&member) {
                if user.room_id == Some(room_id) {
                    user.room_id = None;
                }
            }
        }
        Some(view)
    }
}

pub struct Hub {
    registries: Mutex<Registries>,
    settings: HubSettings,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubSettings::default())
    }
}

impl Hub {
    pub fn new(settings: HubSettings) -> Self {
        Self {
            registries: Mutex::new(Registries::default()),
            settings,
        }
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    pub fn stats(&self) -> HubStats {
        let registries = self.registries.lock();
        HubStats {
            connections: registries.conns.len(),
            users: registries.users.len(),
            rooms: registries.rooms.len(),
        }
    }

    // ── connections ──

    pub fn register_connection(&self, conn: Arc<Connection>) {
        let mut registries = self.registries.lock();
        let id = conn.id.clone();
        if let Some(displaced) = registries.conns.insert(conn) {
            if let Some(user) = registries.users.get_mut(&displaced) {
                if user.conn.as_ref() == Some(&id) {
                    user.conn = None;
                }
            }
        }
        info!(conn = %id, "new connection established");
    }

    /// Forget a closed connection. Its user, if any, stays registered but
    /// goes offline; the username is returned.
    pub fn remove_connection(&self, id: &ConnId) -> Option<String> {
        let mut registries = self.registries.lock();
        let (conn, username) = registries.conns.remove(id)?;
        if let Some(username) = &username {
            if let Some(user) = registries.users.get_mut(username) {
                if user.conn.as_ref() == Some(id) {
                    user.conn = None;
                }
            }
        }
        info!(
            conn = %id,
            username = username.as_deref().unwrap_or("-"),
            secs = conn.connected_at.elapsed().as_secs(),
            "closed connection"
        );
        username
    }

    pub fn connection(&self, id: &ConnId) -> Option<Arc<Connection>> {
        self.registries.lock().conns.get(id).cloned()
    }

    /// The live connection of `username`, if they are online.
    pub fn connection_of(&self, username: &str) -> Option<Arc<Connection>> {
        let registries = self.registries.lock();
        let conn_id = registries.users.get(username)?.conn.as_ref()?;
        registries.conns.get(conn_id).cloned()
    }

    pub fn user_of(&self, id: &ConnId) -> Option<String> {
        self.registries.lock().conns.user_of(id).map(str::to_owned)
    }

    /// Bind `username` to connection `id`, unbinding any previous partner of
    /// either side.
    pub fn attach(&self, id: &ConnId, username: &str) -> HubResult<()> {
        self.registries.lock().attach(id, username)
    }

    /// Unbind `username` from `expected` if that is still its connection.
    /// Used when a readiness probe finds the connection stale.
    pub fn detach_stale(&self, username: &str, expected: &ConnId) -> bool {
        let mut registries = self.registries.lock();
        let current = registries.users.get(username).and_then(|u| u.conn.as_ref());
        if current != Some(expected) {
            return false;
        }
        registries.detach_user(username);
        true
    }

    // ── users ──

    /// Register a user with a fresh token, optionally binding it to `conn`.
    pub fn create_user(
        &self,
        info: UserInfo,
        password: Option<HashedPassword>,
        conn: Option<&ConnId>,
    ) -> HubResult<(UserView, AuthToken)> {
        auth::validate::username(&info.username)?;
        let token = AuthToken::mint(self.settings.token_ttl);
        let username = info.username.clone();

        let mut registries = self.registries.lock();
        registries
            .users
            .insert(User::new(info, password, token.clone()))?;
        if let Some(conn) = conn {
            if let Err(err) = registries.attach(conn, &username) {
                registries.users.remove(&username);
                return Err(err);
            }
        }
        let view = registries.user(&username)?.view();
        info!(username, "created new user");
        Ok((view, token))
    }

    pub fn delete_user(&self, username: &str) -> HubResult<DeletedUser> {
        let mut registries = self.registries.lock();
        registries.user(username)?;
        let departure = registries.depart(username);
        let conn = registries.detach_user(username);
        let user = registries
            .users
            .remove(username)
            .ok_or_else(|| HubError::UserNotFound(username.to_owned()))?;
        info!(username, "deleted user");
        Ok(DeletedUser {
            user: user.view(),
            departure,
            conn,
        })
    }

    /// Replace profile fields. The username itself cannot change.
    pub fn update_user_info(&self, username: &str, info: UserInfo) -> HubResult<UserView> {
        if !info.username.is_empty() && info.username != username {
            return Err(HubError::Validation(format!(
                "username cannot be changed from '{username}' to '{}'",
                info.username
            )));
        }
        let mut registries = self.registries.lock();
        let user = registries.user_mut(username)?;
        user.info.display_name = info.display_name;
        debug!(username, "updated user info");
        Ok(user.view())
    }

    pub fn user(&self, username: &str) -> Option<UserView> {
        self.registries.lock().users.get(username).map(User::view)
    }

    pub fn lookup_by_token(&self, token: &str) -> Option<UserView> {
        self.registries.lock().users.by_token(token).map(User::view)
    }

    /// Resolve a bearer token to its user, failing closed on unknown, empty
    /// or expired tokens.
    pub fn authenticate(&self, token: &str) -> HubResult<UserView> {
        let registries = self.registries.lock();
        let user = registries.users.by_token(token).ok_or(HubError::AuthMissing)?;
        user.token
            .as_ref()
            .ok_or(HubError::AuthMissing)?
            .validate()?;
        Ok(user.view())
    }

    /// Check that `username` still holds a valid token.
    pub fn check_session(&self, username: &str) -> HubResult<()> {
        let registries = self.registries.lock();
        registries
            .user(username)?
            .token
            .as_ref()
            .ok_or(HubError::AuthMissing)?
            .validate()
    }

    /// Clone of the stored hash so it can be verified off the lock.
    pub fn password_of(&self, username: &str) -> HubResult<HashedPassword> {
        let registries = self.registries.lock();
        let user = registries.users.get(username).ok_or(HubError::InvalidCredentials)?;
        user.password.clone().ok_or_else(|| {
            HubError::Validation(format!("hashed password for user '{username}' is not set"))
        })
    }

    /// Return the user's token if it is still valid, otherwise mint and
    /// index a new one.
    pub fn issue_token(&self, username: &str) -> HubResult<AuthToken> {
        let mut registries = self.registries.lock();
        let now = OffsetDateTime::now_utc();
        if let Some(token) = &registries.user(username)?.token {
            if token.validate_at(now).is_ok() {
                return Ok(token.clone());
            }
        }
        let token = AuthToken::mint_at(now, self.settings.token_ttl);
        registries.users.set_token(username, token.clone())?;
        debug!(username, "minted new auth token");
        Ok(token)
    }

    /// All users, or just the members of `room`.
    pub fn users(&self, room: Option<RoomId>) -> HubResult<Vec<UserView>> {
        let registries = self.registries.lock();
        let mut users: Vec<UserView> = match room {
            None => registries.users.values().map(User::view).collect(),
            Some(id) => {
                let room = registries.rooms.get(id).ok_or(HubError::RoomNotFound(id))?;
                room.members()
                    .iter()
                    .filter_map(|member| registries.users.get(member))
                    .map(User::view)
                    .collect()
            }
        };
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    // ── rooms ──

    pub fn rooms(&self) -> Vec<RoomView> {
        self.registries.lock().rooms.values().map(|room| room.view()).collect()
    }

    pub fn room(&self, id: RoomId) -> Option<RoomView> {
        self.registries.lock().rooms.get(id).map(|room| room.view())
    }

    /// Create a room owned by `owner`, who leaves any current room first.
    pub fn create_room(&self, owner: &str, name: &str) -> HubResult<(RoomView, Option<Departure>)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HubError::Validation("room name must not be empty".to_owned()));
        }
        let mut registries = self.registries.lock();
        registries.user(owner)?;
        let departure = registries.depart(owner);
        let room = registries.rooms.create(owner, name);
        registries.user_mut(owner)?.room_id = Some(room.id);
        info!(room = %room.id, owner, name, "created room");
        Ok((room.view(), departure))
    }

    /// Move `username` into room `id`, leaving any current room first.
    /// Joining the room one is already in changes nothing.
    pub fn join_room(&self, username: &str, id: RoomId) -> HubResult<(RoomView, Option<Departure>)> {
        let mut registries = self.registries.lock();
        let current = registries.user(username)?.room_id;
        let room = Arc::clone(registries.rooms.get(id).ok_or(HubError::RoomNotFound(id))?);
        if current == Some(id) {
            return Ok((room.view(), None));
        }
        let departure = registries.depart(username);
        room.add_member(username);
        registries.user_mut(username)?.room_id = Some(id);
        info!(room = %id, username, "joined room");
        Ok((room.view(), departure))
    }

    pub fn leave_room(&self, username: &str) -> HubResult<Departure> {
        let mut registries = self.registries.lock();
        registries.user(username)?;
        let departure = registries
            .depart(username)
            .ok_or_else(|| HubError::NotInRoom(username.to_owned()))?;
        info!(username, "left room");
        Ok(departure)
    }

    /// Delete room `id` on behalf of `requester`, who must own it. Returns the
    /// room as it was, including the members that were evicted.
    pub fn delete_room(&self, id: RoomId, requester: &str) -> HubResult<RoomView> {
        let mut registries = self.registries.lock();
        let room = registries.rooms.get(id).ok_or(HubError::RoomNotFound(id))?;
        if room.owner != requester {
            return Err(HubError::PermissionDenied(id));
        }
        let view = registries.dissolve(id).ok_or(HubError::RoomNotFound(id))?;
        info!(room = %id, owner = requester, evicted = view.members.len(), "deleted room");
        Ok(view)
    }

    /// Panic if any cross-registry invariant is broken.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let registries = self.registries.lock();
        for user in registries.users.values() {
            if let Some(conn_id) = &user.conn {
                assert_eq!(
                    registries.conns.user_of(conn_id),
                    Some(user.username()),
                    "connection of {} does not point back",
                    user.username()
                );
            }
            if let Some(room_id) = user.room_id {
                let room = registries.rooms.get(room_id).expect("user in missing room");
                assert!(room.contains(user.username()));
            }
        }
        for (conn, username) in registries.conns.iter() {
            if let Some(username) = username {
                let user = registries.users.get(username).expect("connection user missing");
                assert_eq!(user.conn.as_ref(), Some(&conn.id));
            }
        }
        for room in registries.rooms.values() {
            assert!(room.contains(&room.owner), "owner missing from room {}", room.id);
            for member in room.members() {
                let user = registries.users.get(&member).expect("member missing");
                assert_eq!(user.room_id, Some(room.id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn connect(hub: &Hub, id: &str) -> (ConnId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Arc::new(Connection::new(ConnId::new(id), tx));
        let conn_id = conn.id.clone();
        hub.register_connection(conn);
        (conn_id, rx)
    }

    fn info(name: &str) -> UserInfo {
        UserInfo {
            username: name.into(),
            display_name: format!("{name} display"),
        }
    }

    fn online(hub: &Hub, name: &str) -> (ConnId, mpsc::Receiver<Outbound>) {
        let (conn_id, rx) = connect(hub, &format!("{name}:1"));
        hub.create_user(info(name), None, Some(&conn_id)).unwrap();
        (conn_id, rx)
    }

    #[test]
    fn create_user_links_both_ways() {
        let hub = Hub::default();
        let (conn_id, _rx) = online(&hub, "alice");
        assert_eq!(hub.user_of(&conn_id).as_deref(), Some("alice"));
        assert!(hub.user("alice").unwrap().online);
        hub.assert_consistent();
    }

    #[test]
    fn duplicate_username_fails_and_keeps_first() {
        let hub = Hub::default();
        let (_alice_conn, _rx) = online(&hub, "alice");
        let (other, _rx2) = connect(&hub, "other:1");
        let err = hub.create_user(info("alice"), None, Some(&other)).unwrap_err();
        assert!(matches!(err, HubError::DuplicateUsername(_)));
        assert_eq!(hub.user_of(&other), None);
        hub.assert_consistent();
    }

    #[test]
    fn create_user_validates_username() {
        let hub = Hub::default();
        assert!(matches!(
            hub.create_user(info("a"), None, None),
            Err(HubError::Validation(_))
        ));
    }

    #[test]
    fn remove_connection_keeps_user_offline() {
        let hub = Hub::default();
        let (conn_id, _rx) = online(&hub, "alice");
        let (room, _) = hub.create_room("alice", "Standup").unwrap();

        assert_eq!(hub.remove_connection(&conn_id).as_deref(), Some("alice"));
        let alice = hub.user("alice").unwrap();
        assert!(!alice.online);
        assert_eq!(alice.room_id, Some(room.id));
        assert!(hub.connection(&conn_id).is_none());
        hub.assert_consistent();

        assert_eq!(hub.remove_connection(&conn_id), None);
    }

    #[test]
    fn reconnect_reattaches_user() {
        let hub = Hub::default();
        let (first, _rx) = online(&hub, "alice");
        hub.remove_connection(&first);
        let (second, _rx2) = connect(&hub, "alice:2");
        hub.attach(&second, "alice").unwrap();
        assert!(hub.user("alice").unwrap().online);
        assert_eq!(hub.connection_of("alice").unwrap().id, second);
        hub.assert_consistent();
    }

    #[test]
    fn attach_keeps_one_connection_per_user() {
        let hub = Hub::default();
        let (first, _rx) = online(&hub, "alice");
        let (second, _rx2) = connect(&hub, "alice:2");
        hub.attach(&second, "alice").unwrap();
        assert_eq!(hub.user_of(&first), None);
        assert_eq!(hub.user_of(&second).as_deref(), Some("alice"));
        hub.assert_consistent();
    }

    #[test]
    fn attach_replaces_previous_user_of_connection() {
        let hub = Hub::default();
        let (conn_id, _rx) = online(&hub, "alice");
        hub.create_user(info("bob"), None, None).unwrap();
        hub.attach(&conn_id, "bob").unwrap();
        assert!(!hub.user("alice").unwrap().online);
        assert_eq!(hub.user_of(&conn_id).as_deref(), Some("bob"));
        hub.assert_consistent();
    }

    #[test]
    fn attach_to_unregistered_connection_is_not_found() {
        let hub = Hub::default();
        hub.create_user(info("alice"), None, None).unwrap();
        let gone = ConnId::new("gone:1");

        let err = hub.attach(&gone, "alice").unwrap_err();
        assert!(matches!(&err, HubError::ConnectionNotFound(id) if *id == gone));
        assert_eq!(err.code(), 404);
        assert!(!hub.user("alice").unwrap().online);
        hub.assert_consistent();
    }

    #[test]
    fn detach_stale_only_matches_current_connection() {
        let hub = Hub::default();
        let (conn_id, _rx) = online(&hub, "alice");
        assert!(!hub.detach_stale("alice", &ConnId::new("elsewhere:1")));
        assert!(hub.detach_stale("alice", &conn_id));
        assert!(!hub.user("alice").unwrap().online);
        assert!(hub.connection(&conn_id).is_some());
        hub.assert_consistent();
    }

    #[test]
    fn delete_user_cascades() {
        let hub = Hub::default();
        let (alice_conn, _a) = online(&hub, "alice");
        let (bob_conn, _b) = online(&hub, "bob");
        let (room, _) = hub.create_room("alice", "Standup").unwrap();
        hub.join_room("bob", room.id).unwrap();
        let bob_token = hub.issue_token("bob").unwrap();

        let deleted = hub.delete_user("bob").unwrap();
        assert_eq!(deleted.user.username, "bob");
        assert_eq!(
            deleted.departure,
            Some(Departure::Left {
                room_id: room.id,
                username: "bob".into()
            })
        );
        assert!(hub.user("bob").is_none());
        assert!(hub.lookup_by_token(&bob_token.token).is_none());
        assert_eq!(deleted.conn.as_ref(), Some(&bob_conn));
        assert_eq!(hub.user_of(&bob_conn), None);
        assert!(hub.connection(&bob_conn).is_some());
        assert_eq!(hub.room(room.id).unwrap().members, vec!["alice".to_owned()]);
        assert_eq!(hub.user_of(&alice_conn).as_deref(), Some("alice"));
        hub.assert_consistent();

        assert!(matches!(hub.delete_user("bob"), Err(HubError::UserNotFound(_))));
    }

    #[test]
    fn deleting_owner_dissolves_room() {
        let hub = Hub::default();
        let (_a, _ra) = online(&hub, "alice");
        let (_b, _rb) = online(&hub, "bob");
        let (room, _) = hub.create_room("alice", "Standup").unwrap();
        hub.join_room("bob", room.id).unwrap();

        let deleted = hub.delete_user("alice").unwrap();
        match deleted.departure {
            Some(Departure::Dissolved(view)) => {
                assert_eq!(view.members, vec!["alice".to_owned(), "bob".to_owned()]);
            }
            other => panic!("expected dissolved room, got {other:?}"),
        }
        assert!(hub.room(room.id).is_none());
        assert_eq!(hub.user("bob").unwrap().room_id, None);
        hub.assert_consistent();
    }

    #[test]
    fn update_user_info_keeps_token_and_room() {
        let hub = Hub::default();
        let (_c, _rx) = online(&hub, "alice");
        let (room, _) = hub.create_room("alice", "Standup").unwrap();
        let token = hub.issue_token("alice").unwrap();

        let view = hub
            .update_user_info(
                "alice",
                UserInfo {
                    username: "alice".into(),
                    display_name: "Alice A.".into(),
                },
            )
            .unwrap();
        assert_eq!(view.display_name, "Alice A.");
        assert_eq!(view.room_id, Some(room.id));
        assert_eq!(hub.issue_token("alice").unwrap(), token);

        let renamed = UserInfo {
            username: "alicia".into(),
            display_name: String::new(),
        };
        assert!(matches!(
            hub.update_user_info("alice", renamed),
            Err(HubError::Validation(_))
        ));
        assert!(matches!(
            hub.update_user_info("nobody", UserInfo::default()),
            Err(HubError::UserNotFound(_))
        ));
    }

    #[test]
    fn authenticate_resolves_valid_tokens_only() {
        let hub = Hub::default();
        let (view, token) = hub.create_user(info("alice"), None, None).unwrap();
        assert_eq!(hub.authenticate(&token.token).unwrap(), view);
        assert!(matches!(hub.authenticate(""), Err(HubError::AuthMissing)));
        assert!(matches!(hub.authenticate("bogus"), Err(HubError::AuthMissing)));
    }

    #[test]
    fn expired_token_fails_authentication() {
        let hub = Hub::new(HubSettings {
            token_ttl: time::Duration::ZERO,
            ..HubSettings::default()
        });
        let (_, token) = hub.create_user(info("alice"), None, None).unwrap();
        assert!(hub.lookup_by_token(&token.token).is_some());
        assert!(matches!(hub.authenticate(&token.token), Err(HubError::AuthExpired)));
        assert!(matches!(hub.check_session("alice"), Err(HubError::AuthExpired)));
    }

    #[test]
    fn issue_token_reuses_valid_token() {
        let hub = Hub::default();
        let (_, minted) = hub.create_user(info("alice"), None, None).unwrap();
        let first = hub.issue_token("alice").unwrap();
        let second = hub.issue_token("alice").unwrap();
        assert_eq!(first, minted);
        assert_eq!(first, second);
    }

    #[test]
    fn issue_token_replaces_expired_token() {
        let hub = Hub::new(HubSettings {
            token_ttl: time::Duration::ZERO,
            ..HubSettings::default()
        });
        let (_, minted) = hub.create_user(info("alice"), None, None).unwrap();
        let fresh = hub.issue_token("alice").unwrap();
        assert_ne!(fresh.token, minted.token);
        assert!(hub.lookup_by_token(&minted.token).is_none());
        assert!(hub.lookup_by_token(&fresh.token).is_some());
    }

    #[test]
    fn standup_scenario() {
        let hub = Hub::default();
        let (_a, _ra) = online(&hub, "alice");
        let (_b, _rb) = online(&hub, "bob");

        let (room, departure) = hub.create_room("alice", "Standup").unwrap();
        assert_eq!(room.id, RoomId(1));
        assert_eq!(room.members, vec!["alice".to_owned()]);
        assert_eq!(departure, None);

        let (room, _) = hub.join_room("bob", RoomId(1)).unwrap();
        assert_eq!(room.members, vec!["alice".to_owned(), "bob".to_owned()]);
        hub.assert_consistent();

        assert!(matches!(
            hub.delete_room(RoomId(1), "bob"),
            Err(HubError::PermissionDenied(RoomId(1)))
        ));
        assert!(hub.room(RoomId(1)).is_some());

        let deleted = hub.delete_room(RoomId(1), "alice").unwrap();
        assert_eq!(deleted.members.len(), 2);
        assert!(hub.room(RoomId(1)).is_none());
        assert_eq!(hub.user("alice").unwrap().room_id, None);
        assert_eq!(hub.user("bob").unwrap().room_id, None);
        hub.assert_consistent();
    }

    #[test]
    fn join_missing_room_keeps_current_room() {
        let hub = Hub::default();
        let (_a, _ra) = online(&hub, "alice");
        let (room, _) = hub.create_room("alice", "Standup").unwrap();
        assert!(matches!(
            hub.join_room("alice", RoomId(99)),
            Err(HubError::RoomNotFound(RoomId(99)))
        ));
        assert_eq!(hub.user("alice").unwrap().room_id, Some(room.id));
    }

    #[test]
    fn switching_rooms_leaves_previous_room() {
        let hub = Hub::default();
        let (_a, _ra) = online(&hub, "alice");
        let (_b, _rb) = online(&hub, "bob");
        let (_c, _rc) = online(&hub, "carol");
        let (standup, _) = hub.create_room("alice", "Standup").unwrap();
        let (retro, _) = hub.create_room("bob", "Retro").unwrap();
        hub.join_room("carol", standup.id).unwrap();

        let (_, departure) = hub.join_room("carol", retro.id).unwrap();
        assert_eq!(
            departure,
            Some(Departure::Left {
                room_id: standup.id,
                username: "carol".into()
            })
        );
        assert_eq!(hub.room(standup.id).unwrap().members, vec!["alice".to_owned()]);

        let (_, departure) = hub.join_room("carol", retro.id).unwrap();
        assert_eq!(departure, None);
        hub.assert_consistent();
    }

    #[test]
    fn owner_leaving_dissolves_room() {
        let hub = Hub::default();
        let (_a, _ra) = online(&hub, "alice");
        let (_b, _rb) = online(&hub, "bob");
        let (room, _) = hub.create_room("alice", "Standup").unwrap();
        hub.join_room("bob", room.id).unwrap();

        assert!(matches!(hub.leave_room("alice").unwrap(), Departure::Dissolved(_)));
        assert!(hub.room(room.id).is_none());
        assert_eq!(hub.user("bob").unwrap().room_id, None);
        assert!(matches!(hub.leave_room("bob"), Err(HubError::NotInRoom(_))));
        hub.assert_consistent();
    }

    #[test]
    fn create_room_rejects_blank_name() {
        let hub = Hub::default();
        let (_a, _ra) = online(&hub, "alice");
        assert!(matches!(
            hub.create_room("alice", "   "),
            Err(HubError::Validation(_))
        ));
    }

    #[test]
    fn users_can_be_filtered_by_room() {
        let hub = Hub::default();
        let (_a, _ra) = online(&hub, "alice");
        let (_b, _rb) = online(&hub, "bob");
        let (room, _) = hub.create_room("alice", "Standup").unwrap();

        let everyone: Vec<String> = hub.users(None).unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(everyone, vec!["alice".to_owned(), "bob".to_owned()]);
        let members = hub.users(Some(room.id)).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].username, "alice");
        assert!(matches!(hub.users(Some(RoomId(5))), Err(HubError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_mutations_stay_consistent() {
        let hub = Arc::new(Hub::default());
        let mut receivers = Vec::new();
        for i in 0..8 {
            let (_, rx) = online(&hub, &format!("user{i}"));
            receivers.push(rx);
        }
        let (room, _) = hub.create_room("user0", "Standup").unwrap();

        let tasks: Vec<_> = (1..8)
            .map(|i| {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    let name = format!("user{i}");
                    for _ in 0..20 {
                        hub.join_room(&name, room.id).unwrap();
                        hub.leave_room(&name).unwrap();
                    }
                    hub.join_room(&name, room.id).unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(hub.room(room.id).unwrap().members.len(), 8);
        hub.assert_consistent();
    }

    #[test]
    fn stats_count_registries() {
        let hub = Hub::default();
        let (_a, _ra) = online(&hub, "alice");
        let (_anon, _rx) = connect(&hub, "anon:1");
        hub.create_room("alice", "Standup").unwrap();
        assert_eq!(
            hub.stats(),
            HubStats {
                connections: 2,
                users: 1,
                rooms: 1
            }
        );
    }
}
