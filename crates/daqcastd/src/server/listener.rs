//! TCP listener: binding with retry and the cancellable accept loop.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept and socket-option failures are logged and the loop continues

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use daqcast_core::ServerConfig;

use super::ServerError;
use crate::registry::{RegistryError, RegistryHandle};
use crate::stats::ServerStats;

/// Pause after a failed `accept` so fd exhaustion does not spin the loop.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(50);

// ============================================================================
// Binding
// ============================================================================

/// Binds the configured address, retrying while it is in use.
///
/// Only `AddrInUse` is retried, after a fixed delay and for as many attempts
/// as `max_bind_attempts` allows (forever if unset). The wait between
/// attempts is raced against `cancel_token`.
///
/// Returns `Ok(None)` if cancelled before a bind succeeded.
///
/// # Errors
///
/// - `ServerError::AddressInUse` once the attempt limit is exhausted
/// - `ServerError::Bind` for any other bind failure
pub async fn bind_with_retry(
    config: &ServerConfig,
    cancel_token: &CancellationToken,
) -> Result<Option<TcpListener>, ServerError> {
    let addr = config.listen_addr();
    let delay = config.bind_retry_delay();
    let mut attempts: u32 = 0;

    loop {
        if cancel_token.is_cancelled() {
            return Ok(None);
        }
        attempts = attempts.saturating_add(1);

        match bind_once(addr, config.backlog) {
            Ok(listener) => {
                if attempts > 1 {
                    info!(%addr, attempts, "Bound after retrying");
                }
                return Ok(Some(listener));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                if config.max_bind_attempts.is_some_and(|max| attempts >= max) {
                    return Err(ServerError::AddressInUse { addr, attempts });
                }
                warn!(
                    %addr,
                    attempt = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "Address in use, retrying bind"
                );
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        info!(%addr, "Bind retry cancelled");
                        return Ok(None);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(error) => return Err(ServerError::Bind { addr, error }),
        }
    }
}

fn bind_once(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    // Lets a restarted daemon rebind while old connections sit in TIME_WAIT.
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

// ============================================================================
// Accept loop
// ============================================================================

/// Accepts connections and hands them to the registry.
pub struct Listener {
    listener: TcpListener,
    registry: RegistryHandle,
    stats: Arc<ServerStats>,
    cancel_token: CancellationToken,
}

impl Listener {
    pub fn new(
        listener: TcpListener,
        registry: RegistryHandle,
        stats: Arc<ServerStats>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            listener,
            registry,
            stats,
            cancel_token,
        }
    }

    /// Accepts until cancelled or the registry goes away. The listening
    /// socket is closed on return.
    pub async fn run(self) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("Listener shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            if let Err(RegistryError::ChannelClosed) = self.admit(stream, peer).await {
                                warn!("Registry unavailable, listener stopping");
                                break;
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                        }
                    }
                }
            }
        }
    }

    async fn admit(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), RegistryError> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }

        // The std stream keeps non-blocking mode, so each broadcast write
        // is a single send that never waits on a slow reader.
        let stream = match stream.into_std() {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%peer, error = %e, "Dropping connection: failed to detach socket");
                return Ok(());
            }
        };

        match self.registry.register(stream, peer).await {
            Ok(_) => {
                self.stats.record_accept();
                Ok(())
            }
            Err(RegistryError::RegistryFull { max }) => {
                debug!(%peer, max, "Connection refused by registry");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
