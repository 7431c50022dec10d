//! Relay engine.
//!
//! Owns the presence registry and the message store and turns inbound
//! client events into registry/store mutations plus outbound events.
//!
//! Event handling is serialised by one broker-wide lock around the registry.
//! Store writes and gateway sends happen while it is held. Neither blocks:
//! store buckets are `DashMap` entries and sends go into unbounded channels.
//! Every client therefore observes presence lists and messages in one global
//! order.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{RelayError, Result};
use crate::gateway::{ClientSender, Gateway};
use crate::protocol::{
    ClientEvent, ConnectionId, LastMessageUpdate, Message, SeenReceipt, SendMessage,
    ServerEvent, UserPresence,
};
use crate::registry::PresenceRegistry;
use crate::store::{MemoryStore, MessageStore};

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 4000;

/// Where `messageSeen` looks for the message it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SeenLookup {
    /// Search the receiver's bucket (where `sendMessage` stored it) for a
    /// message with this id from this sender.
    #[default]
    Recipient,
    /// Search the sender's bucket for a message with this id addressed to
    /// the receiver. Matches the legacy broker; only self-addressed messages
    /// can ever be found this way.
    SenderBucket,
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    /// Origin allowed by CORS. `None` allows any origin.
    pub cors_origin: Option<String>,
    pub seen_lookup: SeenLookup,
    /// Push messages buffered while a user was offline when they announce
    /// themselves again.
    pub replay_on_connect: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cors_origin: None,
            seen_lookup: SeenLookup::Recipient,
            replay_on_connect: true,
        }
    }
}

/// Shared relay state. Cheap to clone.
#[derive(Clone)]
pub struct Relay {
    /// Presence registry. Its lock doubles as the broker-wide event lock.
    presence: Arc<Mutex<PresenceRegistry>>,

    store: Arc<dyn MessageStore>,

    gateway: Gateway,

    config: RelayConfig,
}

impl Relay {
    /// Create a relay backed by the in-memory store.
    pub fn new(config: RelayConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Create a relay over any [`MessageStore`].
    pub fn with_store(config: RelayConfig, store: Arc<dyn MessageStore>) -> Self {
        Self {
            presence: Arc::new(Mutex::new(PresenceRegistry::new())),
            store,
            gateway: Gateway::new(),
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn MessageStore {
        self.store.as_ref()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    // ── Connection Lifecycle ──────────────────────────────────────────────

    /// Attach a freshly accepted socket. It receives broadcasts from now on
    /// but is not in the registry until it announces an identity.
    pub fn connect(&self, connection_id: ConnectionId, sender: ClientSender) {
        self.gateway.attach(connection_id, sender);
    }

    /// Tear down a closed socket: drop its registry entries, detach it, and
    /// broadcast the remaining user list.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> Vec<String> {
        let mut registry = self.presence.lock();

        let removed = registry.remove_user(connection_id);
        self.gateway.detach(connection_id);

        for user_id in &removed {
            tracing::info!(user_id = user_id.as_str(), connection_id = %connection_id, "User offline");
        }

        self.gateway
            .broadcast_all(ServerEvent::GetUsers(registry.list_users()));
        removed
    }

    // ── Event Dispatch ────────────────────────────────────────────────────

    /// Apply one inbound event from `connection_id`.
    pub fn handle(&self, connection_id: &ConnectionId, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::AddUser(identity) => self.announce(connection_id, identity.user_id())?,
            ClientEvent::SendMessage(payload) => {
                self.send_message(payload);
            }
            ClientEvent::MessageSeen(receipt) => {
                self.message_seen(receipt);
            }
            ClientEvent::UpdateLastMessage(update) => {
                self.update_last_message(update);
            }
        }
        Ok(())
    }

    /// Identity announcement: bind `user_id` to the connection, broadcast
    /// the full user list to every connection, then replay anything that
    /// was buffered while the user was offline.
    pub fn announce(&self, connection_id: &ConnectionId, user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(RelayError::EmptyIdentity);
        }

        let mut registry = self.presence.lock();

        let inserted = registry.add_user(user_id, connection_id);
        if inserted {
            tracing::info!(user_id = user_id, connection_id = %connection_id, "User online");
        } else {
            tracing::debug!(user_id = user_id, "User already registered, keeping existing connection");
        }

        self.gateway
            .broadcast_all(ServerEvent::GetUsers(registry.list_users()));

        if inserted && self.config.replay_on_connect {
            let pending = self.store.undelivered(user_id);
            if !pending.is_empty() {
                tracing::info!(
                    user_id = user_id,
                    count = pending.len(),
                    "Replaying buffered messages"
                );
            }
            for message in pending {
                let message_id = message.id.clone();
                if !self
                    .gateway
                    .unicast(connection_id, ServerEvent::GetMessage(message))
                {
                    // The rest stay undelivered for the next announcement.
                    tracing::warn!(user_id = user_id, "Replay target went away mid-replay");
                    break;
                }
                self.store.mark_delivered(user_id, &message_id);
            }
        }

        Ok(())
    }

    /// Store a new message under its receiver and push it to them if online.
    pub fn send_message(&self, payload: SendMessage) -> Message {
        let message = Message::from(payload);
        let registry = self.presence.lock();

        self.store.append(&message.receiver_id, message.clone());

        let delivered = match registry.get_user(&message.receiver_id) {
            Some(receiver) => self.gateway.unicast(
                &receiver.connection_id,
                ServerEvent::GetMessage(message.clone()),
            ),
            None => false,
        };

        if delivered {
            self.store.mark_delivered(&message.receiver_id, &message.id);
            tracing::debug!(
                from = message.sender_id.as_str(),
                to = message.receiver_id.as_str(),
                message_id = message.id.as_str(),
                "Message delivered"
            );
        } else {
            tracing::info!(
                from = message.sender_id.as_str(),
                to = message.receiver_id.as_str(),
                message_id = message.id.as_str(),
                "Receiver not connected, storing message for later delivery"
            );
        }

        message
    }

    /// Mark a message seen and tell its sender. Unknown messages are ignored.
    /// Returns whether the message was found.
    pub fn message_seen(&self, receipt: SeenReceipt) -> bool {
        let registry = self.presence.lock();

        let (bucket, found) = match self.config.seen_lookup {
            SeenLookup::Recipient => (
                receipt.receiver_id.as_str(),
                self.store.find(&receipt.receiver_id, &|m| {
                    m.id == receipt.message_id && m.sender_id == receipt.sender_id
                }),
            ),
            SeenLookup::SenderBucket => (
                receipt.sender_id.as_str(),
                self.store.find(&receipt.sender_id, &|m| {
                    m.receiver_id == receipt.receiver_id && m.id == receipt.message_id
                }),
            ),
        };

        let Some(message) = found else {
            tracing::debug!(
                message_id = receipt.message_id.as_str(),
                bucket = bucket,
                "Seen receipt for unknown message"
            );
            return false;
        };

        if self.store.mark_seen(bucket, &message.id) == Some(true) {
            tracing::debug!(message_id = message.id.as_str(), "Message seen");
        }

        if let Some(sender) = registry.get_user(&receipt.sender_id) {
            self.gateway
                .unicast(&sender.connection_id, ServerEvent::MessageSeen(receipt.clone()));
        }

        true
    }

    /// Fan a conversation preview update out to every connection.
    pub fn update_last_message(&self, update: LastMessageUpdate) -> usize {
        let _guard = self.presence.lock();
        self.gateway
            .broadcast_all(ServerEvent::GetLastMessage(update))
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn list_users(&self) -> Vec<UserPresence> {
        self.presence.lock().list_users()
    }

    pub fn get_user(&self, user_id: &str) -> Option<UserPresence> {
        self.presence.lock().get_user(user_id).cloned()
    }

    pub fn online_count(&self) -> usize {
        self.presence.lock().len()
    }
}
