//! daqcast Core - Shared types for the sample broadcast system
//!
//! This crate provides the domain types shared between the daemon
//! (daqcastd), the wire protocol and the stream client:
//! - `Sample` - one scalar measurement
//! - `config` - the explicit daemon configuration structure
//! - `source` - producers that feed samples into the daemon
//! - `recorder` - CSV capture of a differential pair for later replay
//!
//! All production code follows the panic-free policy: no `.unwrap()`,
//! `.expect()`, `panic!()`, `unreachable!()` or `todo!()`.

pub mod config;
pub mod error;
pub mod recorder;
pub mod sample;
pub mod source;

// Re-exports for convenience
pub use config::{
    BroadcastConfig, DaemonConfig, MonitorConfig, ServerConfig, SourceConfig,
    DEFAULT_MESSAGE_WIDTH, DEFAULT_PORT, DEFAULT_SAMPLE_RATE_HZ,
};
pub use error::{ConfigError, SourceError};
pub use recorder::{Recorder, RecorderSettings, RecordingSummary};
pub use sample::Sample;
pub use source::{AnalogInput, DifferentialSource, ReplaySource, SampleSource, SimulatedInput};
