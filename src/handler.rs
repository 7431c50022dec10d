//! WebSocket connection handler.
//!
//! Runs one socket from accept to close: assigns it a connection id, wires
//! its outbound channel into the gateway, parses inbound frames and hands
//! them to the relay, and deregisters it when the transport closes.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::{RelayError, Result};
use crate::protocol::{ClientEvent, ConnectionId, ServerEvent};
use crate::relay::Relay;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Accepted, no identity announced yet.
    Unidentified,
    /// Bound to a user id in the presence registry.
    Identified,
    /// Transport closed. Terminal.
    Closed,
}

/// Handle a single WebSocket connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Attaches the socket to the gateway under a fresh connection id
/// 2. Spawns a writer task that serialises outbound events onto the socket
/// 3. Feeds inbound frames to the relay until the socket closes
/// 4. Runs the relay's disconnect transition
pub async fn handle_websocket(socket: WebSocket, relay: Relay) {
    let connection_id = ConnectionId::new();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // ── Step 1: Attach ────────────────────────────────────────────────────

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    relay.connect(connection_id.clone(), tx);
    tracing::info!(connection_id = %connection_id, "A user is connected");

    // ── Step 2: Spawn Writer Task ─────────────────────────────────────────

    let writer_id = connection_id.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(
                        connection_id = %writer_id,
                        event = event.name(),
                        error = %e,
                        "Failed to serialize server event"
                    );
                }
            }
        }
    });

    // ── Step 3: Process Frames ────────────────────────────────────────────

    let mut phase = ConnectionPhase::Unidentified;

    while let Some(frame) = ws_receiver.next().await {
        let outcome = match frame {
            Ok(Message::Text(text)) => process_frame(&relay, &connection_id, &mut phase, &text),
            Ok(Message::Binary(_)) => Err(RelayError::UnsupportedFrame),
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection_id, "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => Ok(()), // Ping/Pong are answered by axum
        };

        if let Err(e) = outcome {
            tracing::warn!(
                connection_id = %connection_id,
                kind = e.kind(),
                error = %e,
                "Dropping inbound event"
            );
        }
    }

    // ── Step 4: Disconnect ────────────────────────────────────────────────

    let was = std::mem::replace(&mut phase, ConnectionPhase::Closed);
    let removed = relay.disconnect(&connection_id);
    sender_task.abort();
    tracing::info!(
        connection_id = %connection_id,
        was = ?was,
        users = ?removed,
        "A user disconnected"
    );
}

/// Parse one text frame and apply it.
///
/// Events other than `addUser` are processed even before the connection
/// has an identity; they act against whatever the registry holds.
fn process_frame(
    relay: &Relay,
    connection_id: &ConnectionId,
    phase: &mut ConnectionPhase,
    text: &str,
) -> Result<()> {
    let event = ClientEvent::parse(text)?;
    let announces = matches!(event, ClientEvent::AddUser(_));

    if *phase == ConnectionPhase::Unidentified && !announces {
        tracing::debug!(
            connection_id = %connection_id,
            event = event.name(),
            "Event received before identity announcement"
        );
    }

    relay.handle(connection_id, event)?;

    if announces {
        *phase = ConnectionPhase::Identified;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::relay::RelayConfig;

    fn attach(relay: &Relay, id: &str) -> (ConnectionId, UnboundedReceiver<ServerEvent>) {
        let connection_id = ConnectionId::from(id);
        let (tx, rx) = mpsc::unbounded_channel();
        relay.connect(connection_id.clone(), tx);
        (connection_id, rx)
    }

    #[test]
    fn test_add_user_identifies_connection() {
        let relay = Relay::new(RelayConfig::default());
        let (conn, mut rx) = attach(&relay, "conn-a");
        let mut phase = ConnectionPhase::Unidentified;

        process_frame(&relay, &conn, &mut phase, r#"{"event":"addUser","data":"alice"}"#)
            .unwrap();

        assert_eq!(phase, ConnectionPhase::Identified);
        assert!(matches!(rx.try_recv().unwrap(), ServerEvent::GetUsers(_)));
    }

    #[test]
    fn test_malformed_frame_leaves_state_untouched() {
        let relay = Relay::new(RelayConfig::default());
        let (conn, mut rx) = attach(&relay, "conn-a");
        let mut phase = ConnectionPhase::Unidentified;

        let err = process_frame(&relay, &conn, &mut phase, r#"{"event":"sendMessage"}"#)
            .unwrap_err();

        assert_eq!(err.kind(), "malformed_event");
        assert_eq!(phase, ConnectionPhase::Unidentified);
        assert!(relay.store().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_empty_identity_keeps_connection_unidentified() {
        let relay = Relay::new(RelayConfig::default());
        let (conn, _rx) = attach(&relay, "conn-a");
        let mut phase = ConnectionPhase::Unidentified;

        let err = process_frame(&relay, &conn, &mut phase, r#"{"event":"addUser","data":""}"#)
            .unwrap_err();

        assert_eq!(err.kind(), "empty_identity");
        assert_eq!(phase, ConnectionPhase::Unidentified);
    }

    #[test]
    fn test_events_before_identity_are_processed() {
        let relay = Relay::new(RelayConfig::default());
        let (conn, _rx) = attach(&relay, "conn-a");
        let mut phase = ConnectionPhase::Unidentified;

        process_frame(
            &relay,
            &conn,
            &mut phase,
            r#"{"event":"sendMessage","data":{"senderId":"alice","receiverId":"bob","text":"early"}}"#,
        )
        .unwrap();

        assert_eq!(phase, ConnectionPhase::Unidentified);
        assert_eq!(relay.store().bucket("bob").len(), 1);
    }
}
