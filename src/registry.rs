//! Presence registry.
//!
//! Maps logical user ids to the connection they announced themselves on.
//! Lookups come from two directions (by user id when routing a message, by
//! connection id when a socket closes), so both are indexed. Listing keeps
//! the order in which users came online.

use std::collections::{BTreeMap, HashMap};

use crate::protocol::{ConnectionId, UserPresence};

#[derive(Debug)]
struct Entry {
    presence: UserPresence,
    seq: u64,
}

/// In-memory userId ↔ connection mapping.
///
/// Not synchronised on its own; the relay keeps it behind its broker lock.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    users: HashMap<String, Entry>,
    by_connection: HashMap<ConnectionId, Vec<String>>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user_id` on `connection_id`.
    ///
    /// If the user is already present this is a no-op and the original
    /// connection is kept. Returns whether a new entry was inserted.
    pub fn add_user(&mut self, user_id: &str, connection_id: &ConnectionId) -> bool {
        if self.users.contains_key(user_id) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.users.insert(
            user_id.to_string(),
            Entry {
                presence: UserPresence {
                    user_id: user_id.to_string(),
                    connection_id: connection_id.clone(),
                },
                seq,
            },
        );
        self.by_connection
            .entry(connection_id.clone())
            .or_default()
            .push(user_id.to_string());
        self.order.insert(seq, user_id.to_string());
        true
    }

    /// Remove every user bound to `connection_id`. Returns the removed ids.
    pub fn remove_user(&mut self, connection_id: &ConnectionId) -> Vec<String> {
        let Some(user_ids) = self.by_connection.remove(connection_id) else {
            return Vec::new();
        };

        for user_id in &user_ids {
            if let Some(entry) = self.users.remove(user_id) {
                self.order.remove(&entry.seq);
            }
        }

        user_ids
    }

    pub fn get_user(&self, user_id: &str) -> Option<&UserPresence> {
        self.users.get(user_id).map(|entry| &entry.presence)
    }

    /// Snapshot of all online users, oldest registration first.
    pub fn list_users(&self) -> Vec<UserPresence> {
        self.order
            .values()
            .filter_map(|user_id| self.users.get(user_id))
            .map(|entry| entry.presence.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
