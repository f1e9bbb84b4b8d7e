//! Commands, events and errors exchanged with the registry actor.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpStream};

use thiserror::Error;
use tokio::sync::oneshot;

use super::client::{ClientId, ClientInfo};

/// Commands that can be sent to the RegistryActor.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Take ownership of a freshly accepted, non-blocking socket.
    Register {
        stream: TcpStream,
        peer: SocketAddr,
        respond_to: oneshot::Sender<Result<ClientId, RegistryError>>,
    },

    /// Write one frame to every registered client.
    Broadcast {
        frame: Vec<u8>,
        respond_to: oneshot::Sender<BroadcastReport>,
    },

    /// Snapshot of all registered clients.
    ListClients {
        respond_to: oneshot::Sender<Vec<ClientInfo>>,
    },

    /// Close every connection and stop the actor.
    /// Replies with the number of connections closed.
    Shutdown { respond_to: oneshot::Sender<usize> },
}

/// Errors returned by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry full: maximum of {max} clients reached")]
    RegistryFull { max: usize },

    #[error("registry channel closed")]
    ChannelClosed,
}

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients registered when the broadcast started.
    pub attempted: usize,
    /// Clients that received the whole frame.
    pub delivered: usize,
    /// Clients dropped during this broadcast.
    pub removed: Vec<ClientId>,
}

/// Why a client left the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed or reset the connection.
    Closed,
    /// The send timed out.
    TimedOut,
    /// The socket buffer is full; the client is not keeping up.
    Stalled,
    /// Only part of the frame was accepted.
    ShortWrite { written: usize, expected: usize },
    /// Any other socket error.
    Error(String),
    /// The server is shutting down.
    Shutdown,
}

impl DisconnectReason {
    /// Classifies a failed write.
    pub fn from_io_error(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => Self::Closed,
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::WouldBlock => Self::Stalled,
            _ => Self::Error(error.to_string()),
        }
    }

    /// `true` for removals worth a warning rather than an info line.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Closed | Self::Shutdown)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed by peer"),
            Self::TimedOut => write!(f, "send timed out"),
            Self::Stalled => write!(f, "client not reading (send buffer full)"),
            Self::ShortWrite { written, expected } => {
                write!(f, "short write ({written} of {expected} bytes)")
            }
            Self::Error(msg) => write!(f, "send failed: {msg}"),
            Self::Shutdown => write!(f, "server shutdown"),
        }
    }
}

/// Lifecycle events published by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected {
        client_id: ClientId,
        peer: SocketAddr,
    },
    Disconnected {
        client_id: ClientId,
        peer: SocketAddr,
        reason: DisconnectReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_from_io_error() {
        let cases = [
            (io::ErrorKind::BrokenPipe, DisconnectReason::Closed),
            (io::ErrorKind::ConnectionReset, DisconnectReason::Closed),
            (io::ErrorKind::TimedOut, DisconnectReason::TimedOut),
            (io::ErrorKind::WouldBlock, DisconnectReason::Stalled),
        ];
        for (kind, expected) in cases {
            let err = io::Error::new(kind, "boom");
            assert_eq!(DisconnectReason::from_io_error(&err), expected, "{kind:?}");
        }

        let other = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            DisconnectReason::from_io_error(&other),
            DisconnectReason::Error(_)
        ));
    }

    #[test]
    fn test_reason_is_error() {
        assert!(!DisconnectReason::Closed.is_error());
        assert!(!DisconnectReason::Shutdown.is_error());
        assert!(DisconnectReason::Stalled.is_error());
        assert!(DisconnectReason::ShortWrite {
            written: 3,
            expected: 16
        }
        .is_error());
    }

    #[test]
    fn test_reason_display() {
        let reason = DisconnectReason::ShortWrite {
            written: 3,
            expected: 16,
        };
        assert_eq!(reason.to_string(), "short write (3 of 16 bytes)");
    }
}
