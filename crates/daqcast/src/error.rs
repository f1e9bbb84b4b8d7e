//! Error types for the stream client.

use std::io;

use daqcast_protocol::FrameError;
use thiserror::Error;

/// Stream client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The daemon could not be reached.
    ///
    /// Only surfaced when reconnection is disabled; otherwise connection
    /// failures are retried.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The stream carried bytes that are not a valid message, or the
    /// configured width is unusable.
    #[error("Protocol error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let error = ClientError::Connect {
            addr: "127.0.0.1:5025".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        let display = error.to_string();
        assert!(display.contains("127.0.0.1:5025"));
        assert!(display.contains("refused"));
    }

    #[test]
    fn test_frame_error_from_conversion() {
        let error: ClientError = FrameError::InvalidEncoding.into();
        assert!(matches!(error, ClientError::Frame(_)));
        assert!(error.to_string().starts_with("Protocol error"));
    }
}
