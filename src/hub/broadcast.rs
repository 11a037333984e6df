//! Event fan-out to connected clients.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::proto::{Event, RequestKind};

use super::Hub;
use super::connection::{ConnId, Connection};
use super::error::HubResult;
use super::rooms::RoomId;

/// Who an event is meant for, before exclusions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every registered connection.
    All,
    /// Current members of a room.
    Room(RoomId),
    /// An explicit list of users, e.g. members evicted from a deleted room.
    Users(Vec<String>),
}

#[derive(Debug, Error)]
#[error("failed to broadcast {kind} to {}", failed.join(", "))]
pub struct BroadcastError {
    pub kind: RequestKind,
    pub delivered: usize,
    pub failed: Vec<String>,
}

struct Recipient {
    conn: Arc<Connection>,
    username: Option<String>,
}

impl Recipient {
    fn label(&self) -> String {
        match &self.username {
            Some(username) => username.clone(),
            None => self.conn.id.to_string(),
        }
    }
}

impl Hub {
    /// Deliver `data` as a `kind` event to `audience`, skipping connections
    /// whose user is in `exclude`.
    ///
    /// The audience is resolved under the registry lock and the lock is
    /// released before anything is written. Each write is bounded by the
    /// hub's write timeout and one failed recipient never stops delivery to
    /// the others; failures are collected into a [`BroadcastError`].
    pub async fn broadcast<T: Serialize>(
        &self,
        audience: Audience,
        kind: RequestKind,
        data: &T,
        exclude: &[&str],
    ) -> HubResult<usize> {
        self.broadcast_except(audience, kind, data, exclude, &[]).await
    }

    /// Like [`Hub::broadcast`], additionally skipping the connections in
    /// `exclude_conns` whoever is attached to them. Needed once the sender's
    /// user has already been detached from its socket, e.g. after deletion.
    pub async fn broadcast_except<T: Serialize>(
        &self,
        audience: Audience,
        kind: RequestKind,
        data: &T,
        exclude: &[&str],
        exclude_conns: &[&ConnId],
    ) -> HubResult<usize> {
        let text = Arc::new(serde_json::to_string(&Event {
            response_type: kind,
            data,
        })?);
        let recipients = self.recipients(&audience, exclude, exclude_conns);
        let timeout = self.settings.write_timeout;

        let results = join_all(recipients.iter().map(|recipient| {
            let text = Arc::clone(&text);
            async move { recipient.conn.send(text, timeout).await }
        }))
        .await;

        let mut failed = Vec::new();
        for (recipient, result) in recipients.iter().zip(results) {
            if let Err(err) = result {
                warn!(kind = %kind, recipient = %recipient.label(), error = %err, "failed to deliver event");
                failed.push(recipient.label());
            }
        }
        let delivered = recipients.len() - failed.len();
        debug!(kind = %kind, ?audience, delivered, failed = failed.len(), "broadcast event");

        if failed.is_empty() {
            Ok(delivered)
        } else {
            Err(BroadcastError {
                kind,
                delivered,
                failed,
            }
            .into())
        }
    }

    fn recipients(
        &self,
        audience: &Audience,
        exclude: &[&str],
        exclude_conns: &[&ConnId],
    ) -> Vec<Recipient> {
        let registries = self.registries.lock();
        let excluded = |username: Option<&str>| username.is_some_and(|u| exclude.contains(&u));
        let skipped = |conn: &Connection| exclude_conns.contains(&&conn.id);

        let members = match audience {
            Audience::All => {
                return registries
                    .conns
                    .iter()
                    .filter(|(conn, username)| !excluded(*username) && !skipped(conn))
                    .map(|(conn, username)| Recipient {
                        conn: Arc::clone(conn),
                        username: username.map(str::to_owned),
                    })
                    .collect();
            }
            Audience::Room(id) => match registries.rooms.get(*id) {
                Some(room) => room.members(),
                None => return Vec::new(),
            },
            Audience::Users(usernames) => usernames.clone(),
        };

        members
            .into_iter()
            .filter(|username| !excluded(Some(username)))
            .filter_map(|username| {
                let conn_id = registries.users.get(&username)?.conn.as_ref()?;
                let conn = registries.conns.get(conn_id).filter(|conn| !skipped(conn))?;
                Some(Recipient {
                    conn: Arc::clone(conn),
                    username: Some(username),
                })
            })
            .collect()
    }
}
