//! Connection gateway.
//!
//! Holds the outbound channel of every live socket, keyed by connection id.
//! Each socket has a writer task draining its channel, so sends here never
//! wait on the network.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::protocol::{ConnectionId, ServerEvent};

/// A connected socket's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerEvent>;

/// Table of live connections with unicast and broadcast primitives.
#[derive(Clone, Default)]
pub struct Gateway {
    connections: Arc<DashMap<ConnectionId, ClientSender>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start routing events to a newly accepted socket.
    pub fn attach(&self, connection_id: ConnectionId, sender: ClientSender) {
        tracing::debug!(connection_id = %connection_id, "Connection attached");
        self.connections.insert(connection_id, sender);
    }

    /// Stop routing to a socket. Returns false if it was not attached.
    pub fn detach(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.connections.remove(connection_id).is_some();
        if removed {
            tracing::debug!(connection_id = %connection_id, "Connection detached");
        }
        removed
    }

    pub fn is_attached(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Send to exactly one connection. Returns true if it was handed to the writer.
    pub fn unicast(&self, connection_id: &ConnectionId, event: ServerEvent) -> bool {
        if let Some(sender) = self.connections.get(connection_id) {
            sender.send(event).is_ok()
        } else {
            false
        }
    }

    /// Send to every connection. Returns how many accepted it.
    pub fn broadcast_all(&self, event: ServerEvent) -> usize {
        let mut sent = 0;
        for entry in self.connections.iter() {
            if entry.value().send(event.clone()).is_ok() {
                sent += 1;
            } else {
                tracing::debug!(
                    connection_id = %entry.key(),
                    event = event.name(),
                    "Broadcast skipped closed connection"
                );
            }
        }
        sent
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LastMessageUpdate;

    fn ping() -> ServerEvent {
        ServerEvent::GetLastMessage(LastMessageUpdate::default())
    }

    #[test]
    fn test_unicast_to_attached() {
        let gateway = Gateway::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gateway.attach(ConnectionId::from("c1"), tx);

        assert!(gateway.unicast(&ConnectionId::from("c1"), ping()));
        assert_eq!(rx.try_recv().unwrap(), ping());
    }

    #[test]
    fn test_unicast_to_unknown_returns_false() {
        let gateway = Gateway::new();
        assert!(!gateway.unicast(&ConnectionId::from("nobody"), ping()));
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let gateway = Gateway::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        gateway.attach(ConnectionId::from("c1"), tx1);
        gateway.attach(ConnectionId::from("c2"), tx2);

        assert_eq!(gateway.broadcast_all(ping()), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_skips_dropped_receiver() {
        let gateway = Gateway::new();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        gateway.attach(ConnectionId::from("c1"), tx1);
        gateway.attach(ConnectionId::from("c2"), tx2);
        drop(rx1);

        assert_eq!(gateway.broadcast_all(ping()), 1);
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_detach() {
        let gateway = Gateway::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        gateway.attach(ConnectionId::from("c1"), tx);
        assert_eq!(gateway.connection_count(), 1);

        assert!(gateway.detach(&ConnectionId::from("c1")));
        assert!(!gateway.detach(&ConnectionId::from("c1")));
        assert!(!gateway.is_attached(&ConnectionId::from("c1")));
        assert_eq!(gateway.connection_count(), 0);
    }
}
