//! Error types for configuration and sample sources.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for `DaemonConfig`.
    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A field holds a value outside its permitted range.
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised by sample sources and the recorder.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Underlying I/O failure (file read, CSV write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A replay file contained no usable samples.
    #[error("No samples found in {origin}")]
    Empty { origin: String },

    /// An analog channel read failed.
    #[error("Failed to read analog channel {channel}: {reason}")]
    ChannelRead { channel: u8, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("broadcast.message_width", "must be at least 4");
        assert_eq!(
            err.to_string(),
            "Invalid broadcast.message_width: must be at least 4"
        );

        let err = ConfigError::Parse {
            path: PathBuf::from("/etc/daqcast.toml"),
            reason: "expected a table".to_string(),
        };
        assert!(err.to_string().contains("/etc/daqcast.toml"));
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::ChannelRead {
            channel: 1,
            reason: "device busy".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to read analog channel 1: device busy");

        let err = SourceError::Empty {
            origin: "data.csv".to_string(),
        };
        assert_eq!(err.to_string(), "No samples found in data.csv");
    }
}
