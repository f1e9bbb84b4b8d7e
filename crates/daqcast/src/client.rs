//! Stream client for the daqcast daemon.
//!
//! The `StreamClient` handles:
//! - Connection to the daemon over TCP
//! - Reassembly of fixed-width messages regardless of TCP segmentation
//! - Automatic reconnection with exponential backoff
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()`.

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use daqcast_core::{DEFAULT_MESSAGE_WIDTH, DEFAULT_PORT};
use daqcast_protocol::{FixedWidthCodec, MessageFormat};

use crate::error::{ClientError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for [`StreamClient`].
///
/// ```rust
/// use daqcast_client::StreamConfig;
/// use std::time::Duration;
///
/// let config = StreamConfig {
///     host: "10.0.0.5".to_string(),
///     retry_initial_delay: Duration::from_millis(500),
///     ..Default::default()
/// };
/// assert_eq!(config.address(), "10.0.0.5:5025");
/// ```
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Host name or address of the daemon.
    pub host: String,

    pub port: u16,

    /// Message width the daemon was configured with.
    pub width: usize,

    /// Initial delay before first retry after connection failure.
    pub retry_initial_delay: Duration,

    /// Maximum delay between retry attempts.
    pub retry_max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub retry_multiplier: f64,

    /// Reconnect after a failed connect or a lost stream.
    pub reconnect: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            width: DEFAULT_MESSAGE_WIDTH,
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            retry_multiplier: 2.0,
            reconnect: true,
        }
    }
}

impl StreamConfig {
    /// `host:port` as passed to `connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Backoff delay following `current`, capped at `retry_max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.retry_multiplier) as u64;
        Duration::from_millis(next_ms).min(self.retry_max_delay)
    }
}

// ============================================================================
// Events
// ============================================================================

/// One received sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Position in the stream since the client started, from 1.
    pub seq: u64,
    pub value: f64,
}

/// What the client reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected { addr: SocketAddr },
    Reading(Reading),
    Disconnected { reason: String },
}

// ============================================================================
// Stream Client
// ============================================================================

/// Client that follows a daemon's sample stream.
///
/// ```rust,ignore
/// let (tx, mut rx) = mpsc::unbounded_channel();
/// let client = StreamClient::new(StreamConfig::default(), tx, cancel_token)?;
/// tokio::spawn(async move { client.run().await });
///
/// while let Some(event) = rx.recv().await {
///     // ...
/// }
/// ```
pub struct StreamClient {
    config: StreamConfig,
    format: MessageFormat,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
    cancel_token: CancellationToken,
}

/// Whether the outer loop should keep going.
enum Flow {
    Continue,
    Stop,
}

impl StreamClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// `ClientError::Frame` if `config.width` is not a valid message width.
    pub fn new(
        config: StreamConfig,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        cancel_token: CancellationToken,
    ) -> Result<Self> {
        let format = MessageFormat::new(config.width)?;
        Ok(Self {
            config,
            format,
            event_tx,
            cancel_token,
        })
    }

    /// Follows the stream until cancelled, the event receiver is dropped,
    /// or (without reconnect) the first connection ends.
    ///
    /// Returns the number of readings forwarded.
    ///
    /// # Errors
    ///
    /// Only when reconnect is disabled: the connect failure or the
    /// protocol error that ended the stream.
    pub async fn run(&self) -> Result<u64> {
        let addr = self.config.address();
        info!(%addr, width = self.format.width(), "Stream client starting");

        let mut seq = 0u64;

        loop {
            let Some(stream) = self.connect_with_retry(&addr).await? else {
                break;
            };

            let peer = stream.peer_addr()?;
            info!(%peer, "Connected to daemon");
            if self.emit(StreamEvent::Connected { addr: peer }).is_err() {
                break;
            }

            let (flow, reason) = match self.read_stream(stream, &mut seq).await {
                Ok(flow) => (flow, "connection closed by daemon".to_string()),
                Err(e) if !self.config.reconnect => {
                    let _ = self.emit(StreamEvent::Disconnected {
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
                Err(e) => (Flow::Continue, e.to_string()),
            };

            if matches!(flow, Flow::Stop) {
                break;
            }

            warn!(%reason, "Disconnected from daemon");
            if self.emit(StreamEvent::Disconnected { reason }).is_err() {
                break;
            }

            if !self.config.reconnect {
                break;
            }
        }

        info!(readings = seq, "Stream client stopped");
        Ok(seq)
    }

    /// Connects with exponential backoff.
    ///
    /// Returns `Ok(None)` when cancelled.
    async fn connect_with_retry(&self, addr: &str) -> Result<Option<TcpStream>> {
        let mut delay = self.config.retry_initial_delay;
        let mut attempt = 0u32;

        loop {
            if self.cancel_token.is_cancelled() {
                return Ok(None);
            }
            attempt = attempt.saturating_add(1);
            debug!(attempt, %addr, "Attempting to connect to daemon");

            let connect = tokio::select! {
                _ = self.cancel_token.cancelled() => return Ok(None),
                result = TcpStream::connect(addr) => result,
            };

            match connect {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "Failed to set TCP_NODELAY");
                    }
                    return Ok(Some(stream));
                }
                Err(source) if !self.config.reconnect => {
                    return Err(ClientError::Connect {
                        addr: addr.to_string(),
                        source,
                    });
                }
                Err(e) => {
                    if attempt == 1 {
                        warn!(%addr, error = %e, "Daemon not reachable, will retry");
                    } else {
                        debug!(attempt, error = %e, "Connection attempt failed");
                    }
                }
            }

            tokio::select! {
                _ = sleep(delay) => {
                    delay = self.config.next_delay(delay);
                }
                _ = self.cancel_token.cancelled() => {
                    info!("Connection retry cancelled");
                    return Ok(None);
                }
            }
        }
    }

    /// Forwards samples from one connection until it ends.
    async fn read_stream(&self, stream: TcpStream, seq: &mut u64) -> Result<Flow> {
        let mut frames = FramedRead::new(stream, FixedWidthCodec::new(self.format));

        loop {
            let frame = tokio::select! {
                _ = self.cancel_token.cancelled() => return Ok(Flow::Stop),
                frame = frames.next() => frame,
            };

            match frame {
                Some(Ok(sample)) => {
                    *seq += 1;
                    let reading = Reading {
                        seq: *seq,
                        value: sample.value(),
                    };
                    if self.emit(StreamEvent::Reading(reading)).is_err() {
                        return Ok(Flow::Stop);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(Flow::Continue),
            }
        }
    }

    /// Sends an event; fails once the consumer is gone.
    fn emit(&self, event: StreamEvent) -> std::result::Result<(), ()> {
        self.event_tx.send(event).map_err(|_| {
            debug!("Event receiver dropped, stopping");
        })
    }
}
