//! Client registry using the Actor pattern.
//!
//! The registry is the single owner of every connected client socket. The
//! listener and the broadcast loop never touch sockets directly: they send
//! commands over an mpsc channel and the actor processes them one at a time.
//! A registration therefore can never interleave with a broadcast, so no
//! client is sent a tick twice or skipped because of a concurrent insert.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                       ┌─────────────────┐
//! │    Listener     │──── Register ────────▶│                 │
//! └─────────────────┘                       │  RegistryActor  │───▶ ClientEvent
//! ┌─────────────────┐                       │ BTreeMap<Id,    │     (broadcast)
//! │  BroadcastLoop  │──── Broadcast ───────▶│  Connection>    │
//! └─────────────────┘   (oneshot report)    └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

mod actor;
mod client;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use client::{ClientConnection, ClientId, ClientInfo};
pub use commands::{BroadcastReport, ClientEvent, DisconnectReason, RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// `max_clients` caps concurrent connections; `None` means unbounded.
///
/// # Example
///
/// ```no_run
/// use daqcastd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(None);
///     let clients = handle.clients().await;
///     assert!(clients.is_empty());
/// }
/// ```
pub fn spawn_registry(max_clients: Option<usize>) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), max_clients);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
