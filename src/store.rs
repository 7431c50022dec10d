//! Message store.
//!
//! Every message ever sent is kept in memory, bucketed by receiver id in the
//! order it arrived. Nothing is evicted. The relay talks to the store only
//! through [`MessageStore`], so a persistent backend can replace
//! [`MemoryStore`] without touching the routing logic.

use dashmap::DashMap;

use crate::protocol::Message;

/// A stored message plus relay-side bookkeeping that never goes on the wire.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub message: Message,
    /// Whether the message has been pushed to a live connection of its receiver.
    pub delivered: bool,
}

/// Storage capability used by the relay.
pub trait MessageStore: Send + Sync {
    /// Append `message` to the end of `receiver_id`'s bucket, creating it if absent.
    fn append(&self, receiver_id: &str, message: Message);

    /// First message in `bucket` matching `predicate`.
    fn find(&self, bucket: &str, predicate: &dyn Fn(&Message) -> bool) -> Option<Message>;

    /// Flip `seen` on the stored record in place.
    ///
    /// `Some(true)` if this call changed it, `Some(false)` if it was already
    /// seen, `None` if no such message is in `bucket`.
    fn mark_seen(&self, bucket: &str, message_id: &str) -> Option<bool>;

    /// Record that a message reached its receiver. Returns false if it is unknown.
    fn mark_delivered(&self, receiver_id: &str, message_id: &str) -> bool;

    /// Every not-yet-delivered message for `receiver_id`, oldest first.
    /// Nothing is marked; callers record each successful push with
    /// [`MessageStore::mark_delivered`].
    fn undelivered(&self, receiver_id: &str) -> Vec<Message>;

    /// Snapshot of a whole bucket.
    fn bucket(&self, receiver_id: &str) -> Vec<Message>;

    /// Total number of stored messages.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Volatile, process-lifetime store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: DashMap<String, Vec<StoredMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryStore {
    fn append(&self, receiver_id: &str, message: Message) {
        self.buckets
            .entry(receiver_id.to_string())
            .or_default()
            .push(StoredMessage {
                message,
                delivered: false,
            });
    }

    fn find(&self, bucket: &str, predicate: &dyn Fn(&Message) -> bool) -> Option<Message> {
        self.buckets
            .get(bucket)?
            .iter()
            .find(|stored| predicate(&stored.message))
            .map(|stored| stored.message.clone())
    }

    fn mark_seen(&self, bucket: &str, message_id: &str) -> Option<bool> {
        let mut messages = self.buckets.get_mut(bucket)?;
        let stored = messages
            .iter_mut()
            .find(|stored| stored.message.id == message_id)?;

        let flipped = !stored.message.seen;
        stored.message.seen = true;
        Some(flipped)
    }

    fn mark_delivered(&self, receiver_id: &str, message_id: &str) -> bool {
        let Some(mut messages) = self.buckets.get_mut(receiver_id) else {
            return false;
        };
        let Some(stored) = messages
            .iter_mut()
            .find(|stored| stored.message.id == message_id)
        else {
            return false;
        };
        stored.delivered = true;
        true
    }

    fn undelivered(&self, receiver_id: &str) -> Vec<Message> {
        self.buckets
            .get(receiver_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|stored| !stored.delivered)
                    .map(|stored| stored.message.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn bucket(&self, receiver_id: &str) -> Vec<Message> {
        self.buckets
            .get(receiver_id)
            .map(|messages| messages.iter().map(|s| s.message.clone()).collect())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.buckets.iter().map(|entry| entry.value().len()).sum()
    }
}
