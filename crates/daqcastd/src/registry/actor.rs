//! Registry actor - owns every client socket and processes commands.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Failed sends remove the client; they never propagate
//! - Event publish failures (no subscribers) are ignored

use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpStream};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::client::{ClientConnection, ClientId};
use super::commands::{
    BroadcastReport, ClientEvent, DisconnectReason, RegistryCommand, RegistryError,
};

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor.
///
/// Clients are kept in a `BTreeMap` keyed by a monotonically increasing id,
/// so broadcast order is accept order and ids are never reused. A peer that
/// reconnects from the same address gets a fresh entry.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    clients: BTreeMap<ClientId, ClientConnection>,
    next_id: u64,
    max_clients: Option<usize>,
    event_publisher: broadcast::Sender<ClientEvent>,
}

impl RegistryActor {
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<ClientEvent>,
        max_clients: Option<usize>,
    ) -> Self {
        Self {
            receiver,
            clients: BTreeMap::new(),
            next_id: 1,
            max_clients,
            event_publisher,
        }
    }

    /// Runs until a `Shutdown` command arrives or every handle is dropped.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            if let RegistryCommand::Shutdown { respond_to } = cmd {
                let closed = self.handle_shutdown();
                let _ = respond_to.send(closed);
                break;
            }
            self.handle_command(cmd);
        }

        info!("Registry actor stopped (clients: {})", self.clients.len());
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                stream,
                peer,
                respond_to,
            } => {
                let result = self.handle_register(stream, peer);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Broadcast { frame, respond_to } => {
                let report = self.handle_broadcast(&frame);
                let _ = respond_to.send(report);
            }
            RegistryCommand::ListClients { respond_to } => {
                let clients = self.clients.values().map(ClientConnection::info).collect();
                let _ = respond_to.send(clients);
            }
            RegistryCommand::Shutdown { respond_to } => {
                // Handled in `run`; kept for exhaustiveness.
                let _ = respond_to.send(self.handle_shutdown());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_register(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<ClientId, RegistryError> {
        if let Some(max) = self.max_clients {
            if self.clients.len() >= max {
                warn!(%peer, max, "Rejecting client: registry full");
                // Dropping the stream closes it.
                return Err(RegistryError::RegistryFull { max });
            }
        }

        let client_id = ClientId::new(self.next_id);
        self.next_id += 1;

        self.clients
            .insert(client_id, ClientConnection::new(client_id, stream, peer));
        info!(%client_id, %peer, clients = self.clients.len(), "Client connected");

        let _ = self
            .event_publisher
            .send(ClientEvent::Connected { client_id, peer });

        Ok(client_id)
    }

    /// One pass over the map: each client gets exactly one write attempt,
    /// and failures are removed in the same pass.
    fn handle_broadcast(&mut self, frame: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport {
            attempted: self.clients.len(),
            ..BroadcastReport::default()
        };
        let mut dropped = Vec::new();

        self.clients.retain(|&client_id, conn| match conn.send_frame(frame) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(reason) => {
                dropped.push((client_id, conn.peer(), reason));
                false
            }
        });

        for (client_id, peer, reason) in dropped {
            if reason.is_error() {
                warn!(%client_id, %peer, %reason, "Removing client");
            } else {
                info!(%client_id, %peer, %reason, "Client disconnected");
            }
            report.removed.push(client_id);
            let _ = self.event_publisher.send(ClientEvent::Disconnected {
                client_id,
                peer,
                reason,
            });
        }

        if !report.removed.is_empty() {
            debug!(
                delivered = report.delivered,
                removed = report.removed.len(),
                remaining = self.clients.len(),
                "Broadcast completed with removals"
            );
        }

        report
    }

    fn handle_shutdown(&mut self) -> usize {
        let clients = std::mem::take(&mut self.clients);
        let closed = clients.len();

        for (client_id, conn) in clients {
            conn.close();
            let _ = self.event_publisher.send(ClientEvent::Disconnected {
                client_id,
                peer: conn.peer(),
                reason: DisconnectReason::Shutdown,
            });
        }

        if closed > 0 {
            info!(closed, "Closed all client connections");
        }
        closed
    }
}
