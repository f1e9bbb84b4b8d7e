//! Cloneable interface to the RegistryActor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`, or to an
//!   empty result for read-only queries

use std::net::{SocketAddr, TcpStream};

use tokio::sync::{broadcast, mpsc, oneshot};

use super::client::{ClientId, ClientInfo};
use super::commands::{BroadcastReport, ClientEvent, RegistryCommand, RegistryError};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// ```ignore
/// let id = handle.register(stream, peer).await?;
/// let report = handle.broadcast(frame).await?;
///
/// let mut events = handle.subscribe();
/// while let Ok(event) = events.recv().await {
///     // ...
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
    event_sender: broadcast::Sender<ClientEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Hands an accepted socket to the registry.
    ///
    /// The stream must already be in non-blocking mode.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if the client cap is reached
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<ClientId, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                stream,
                peer,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Sends one frame to every registered client.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn broadcast(&self, frame: Vec<u8>) -> Result<BroadcastReport, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Broadcast {
                frame,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Returns every registered client in accept order.
    ///
    /// Returns an empty vec if the actor has shut down.
    pub async fn clients(&self) -> Vec<ClientInfo> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::ListClients { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    pub async fn client_count(&self) -> usize {
        self.clients().await.len()
    }

    /// Closes every client and stops the actor.
    ///
    /// Returns the number of connections closed, or 0 if the actor was
    /// already gone.
    pub async fn shutdown(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Shutdown { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Subscribe to connect/disconnect events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
