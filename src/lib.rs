//! Presence Relay
//!
//! A WebSocket broker for direct messaging:
//!
//! 1. **Presence**: clients announce a user id. Every connection is told the
//!    full list of online users whenever someone comes or goes.
//!
//! 2. **Message relay**: direct messages are stored under their receiver and
//!    pushed to them immediately if they are online. Messages for offline
//!    users stay buffered and are replayed when that user announces again.
//!
//! 3. **Read receipts**: when a receiver reports a message as seen, the
//!    stored copy is updated and the original sender is notified.
//!
//! State is in memory only and lives as long as the process.

pub mod error;
pub mod gateway;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod store;

pub use error::{RelayError, Result};
pub use relay::{Relay, RelayConfig, SeenLookup};
