use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named group of users who see each other's call updates.
///
/// The member set has its own lock. It is only taken while the hub's registry
/// lock is held, or after that lock has been released; never the other way
/// round.
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub owner: String,
    members: Mutex<BTreeSet<String>>,
}

impl Room {
    fn new(id: RoomId, name: String, owner: String) -> Self {
        let members = BTreeSet::from([owner.clone()]);
        Self {
            id,
            name,
            owner,
            members: Mutex::new(members),
        }
    }

    pub fn members(&self) -> Vec<String> {
        self.members.lock().iter().cloned().collect()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.members.lock().contains(username)
    }

    pub(crate) fn add_member(&self, username: &str) {
        self.members.lock().insert(username.to_owned());
    }

    pub(crate) fn remove_member(&self, username: &str) -> bool {
        self.members.lock().remove(username)
    }

    /// Empty the member set, returning who was in it.
    pub(crate) fn evict_all(&self) -> Vec<String> {
        std::mem::take(&mut *self.members.lock()).into_iter().collect()
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            id: self.id,
            name: self.name.clone(),
            owner: self.owner.clone(),
            members: self.members(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub id: RoomId,
    pub name: String,
    pub owner: String,
    pub members: Vec<String>,
}

/// Rooms by id. Ids come from a counter that only moves forward.
pub(crate) struct RoomRegistry {
    rooms: BTreeMap<RoomId, Arc<Room>>,
    next_id: u64,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self {
            rooms: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl RoomRegistry {
    pub(crate) fn create(&mut self, owner: &str, name: &str) -> Arc<Room> {
        let id = RoomId(self.next_id);
        self.next_id += 1;
        let room = Arc::new(Room::new(id, name.to_owned(), owner.to_owned()));
        self.rooms.insert(id, Arc::clone(&room));
        room
    }

    pub(crate) fn get(&self, id: RoomId) -> Option<&Arc<Room>> {
        self.rooms.get(&id)
    }

    pub(crate) fn remove(&mut self, id: RoomId) -> Option<Arc<Room>> {
        self.rooms.remove(&id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Arc<Room>> {
        self.rooms.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.rooms.len()
    }
}
