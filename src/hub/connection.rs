//! Physical connections and the registry that indexes them.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use super::error::{HubError, HubResult};

/// Serialized JSON text queued for a connection's writer task.
pub type Outbound = Arc<String>;

/// Registry key of a connection: the peer's transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnId(String);

impl ConnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for ConnId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of [`Connection::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.readable && self.writable
    }
}

/// One live duplex channel to a client.
///
/// The socket itself is owned by the session task; the hub only sees the
/// outbound queue drained by the session's writer and a flag that the read
/// loop clears when it stops.
pub struct Connection {
    pub id: ConnId,
    tx: mpsc::Sender<Outbound>,
    reading: AtomicBool,
    pub connected_at: Instant,
}

impl Connection {
    pub fn new(id: ConnId, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            tx,
            reading: AtomicBool::new(true),
            connected_at: Instant::now(),
        }
    }

    /// Queue `text` for the writer, waiting at most `timeout` for room.
    pub async fn send(&self, text: Outbound, timeout: Duration) -> HubResult<()> {
        self.tx
            .send_timeout(text, timeout)
            .await
            .map_err(|err| match err {
                SendTimeoutError::Timeout(_) => {
                    HubError::Transport(format!("write to ({}) timed out", self.id))
                }
                SendTimeoutError::Closed(_) => {
                    HubError::Transport(format!("connection ({}) is closed", self.id))
                }
            })
    }

    pub async fn send_json<T: Serialize>(&self, value: &T, timeout: Duration) -> HubResult<()> {
        let text = serde_json::to_string(value)?;
        self.send(Arc::new(text), timeout).await
    }

    /// Called by the session once its read loop has ended.
    pub fn close_read(&self) {
        self.reading.store(false, Ordering::Release);
    }

    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::Acquire)
    }

    /// Check whether both directions look usable right now.
    ///
    /// Reading is usable while the session's read loop runs; writing is usable
    /// if a slot on the outbound queue can be reserved before `deadline`. The
    /// reserved slot is released immediately. This is a heuristic: the peer
    /// can still vanish right after a positive probe.
    pub async fn probe(&self, deadline: Duration) -> Readiness {
        let readable = self.is_reading();
        let writable = matches!(
            tokio::time::timeout(deadline, self.tx.reserve()).await,
            Ok(Ok(_permit))
        );
        Readiness { readable, writable }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("reading", &self.is_reading())
            .finish()
    }
}

struct ConnEntry {
    conn: Arc<Connection>,
    user: Option<String>,
}

/// Connection id -> connection, plus the username attached to each.
#[derive(Default)]
pub(crate) struct ConnectionRegistry {
    entries: HashMap<ConnId, ConnEntry>,
}

impl ConnectionRegistry {
    /// Insert `conn`, returning the user of any entry it displaced.
    pub(crate) fn insert(&mut self, conn: Arc<Connection>) -> Option<String> {
        let id = conn.id.clone();
        self.entries
            .insert(id, ConnEntry { conn, user: None })
            .and_then(|old| old.user)
    }

    pub(crate) fn remove(&mut self, id: &ConnId) -> Option<(Arc<Connection>, Option<String>)> {
        self.entries.remove(id).map(|entry| (entry.conn, entry.user))
    }

    pub(crate) fn contains(&self, id: &ConnId) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn get(&self, id: &ConnId) -> Option<&Arc<Connection>> {
        self.entries.get(id).map(|entry| &entry.conn)
    }

    pub(crate) fn user_of(&self, id: &ConnId) -> Option<&str> {
        self.entries.get(id)?.user.as_deref()
    }

    /// Replace the user attached to `id`, returning the previous one.
    pub(crate) fn set_user(&mut self, id: &ConnId, user: Option<String>) -> Option<String> {
        let entry = self.entries.get_mut(id)?;
        std::mem::replace(&mut entry.user, user)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Arc<Connection>, Option<&str>)> {
        self.entries
            .values()
            .map(|entry| (&entry.conn, entry.user.as_deref()))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
