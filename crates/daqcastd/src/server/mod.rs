//! TCP broadcast server for the daqcast daemon.
//!
//! The server:
//! - Binds the configured address, retrying while it is in use
//! - Registers every accepted connection with the registry actor
//! - Broadcasts one fixed-width message per tick to every client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   Register   ┌─────────────────┐
//! │    Listener     │─────────────▶│                 │
//! │  (TcpListener)  │              │  RegistryHandle │──▶ client sockets
//! └─────────────────┘              │                 │
//! ┌─────────────────┐   Broadcast  │                 │
//! │  BroadcastLoop  │─────────────▶│                 │
//! │ (SampleReceiver)│              └─────────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-client failures are contained in the registry
//! - Only bind failures and invalid configuration are returned as errors

mod broadcast;
mod listener;

pub use broadcast::BroadcastLoop;
pub use listener::{bind_with_retry, Listener};

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use daqcast_core::{ConfigError, DaemonConfig};
use daqcast_protocol::{FrameError, MessageFormat};

use crate::channel::SampleReceiver;
use crate::registry::RegistryHandle;
use crate::stats::ServerStats;

/// The broadcast server: listener plus broadcast loop over one registry.
pub struct BroadcastServer {
    config: DaemonConfig,
    format: MessageFormat,
    registry: RegistryHandle,
    receiver: SampleReceiver,
    stats: Arc<ServerStats>,
    cancel_token: CancellationToken,
}

impl BroadcastServer {
    /// Creates a server. Nothing is bound until [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: DaemonConfig,
        registry: RegistryHandle,
        receiver: SampleReceiver,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let format = MessageFormat::new(config.broadcast.message_width)?;

        Ok(Self {
            config,
            format,
            registry,
            receiver,
            stats: Arc::new(ServerStats::new()),
            cancel_token,
        })
    }

    /// Counters shared with the resource monitor.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Binds the configured address and serves until cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        match bind_with_retry(&self.config.server, &self.cancel_token).await? {
            Some(listener) => self.serve(listener).await,
            None => {
                info!("Shutdown requested before the listener was bound");
                self.registry.shutdown().await;
                Ok(())
            }
        }
    }

    /// Serves on an already bound listener until cancelled, then closes
    /// every client connection.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            rate_hz = self.config.broadcast.sample_rate_hz,
            width = self.format.width(),
            "Broadcast server listening"
        );

        let broadcast = BroadcastLoop::new(
            self.receiver,
            self.registry.clone(),
            self.format,
            self.config.broadcast.period(),
            Arc::clone(&self.stats),
            self.cancel_token.clone(),
        );
        let broadcast_task = tokio::spawn(broadcast.run());

        Listener::new(
            listener,
            self.registry.clone(),
            Arc::clone(&self.stats),
            self.cancel_token.clone(),
        )
        .run()
        .await;

        if let Err(e) = broadcast_task.await {
            warn!(error = %e, "Broadcast loop task failed");
        }

        let closed = self.registry.shutdown().await;
        info!(closed, "Broadcast server stopped");
        Ok(())
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind {
        addr: SocketAddr,
        #[source]
        error: io::Error,
    },

    #[error("Address {addr} still in use after {attempts} bind attempts")]
    AddressInUse { addr: SocketAddr, attempts: u32 },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid message format: {0}")]
    Format(#[from] FrameError),

    #[error("Socket error: {0}")]
    Io(#[from] io::Error),
}
