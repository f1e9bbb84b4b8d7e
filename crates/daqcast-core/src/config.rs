//! Daemon configuration.
//!
//! Every tunable of the broadcast server lives in [`DaemonConfig`], which is
//! passed to the server at construction. The structure deserializes from TOML
//! and every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5025
//!
//! [broadcast]
//! sample_rate_hz = 400.0
//! message_width = 16
//!
//! [source]
//! kind = "file"
//! path = "output_data.csv"
//! ```
//!
//! Without hardware, `kind = "simulated"` reads a synthetic differential pair.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default TCP port the daemon listens on.
pub const DEFAULT_PORT: u16 = 5025;

/// Default broadcast rate in Hz.
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 400.0;

/// Default message width in bytes.
pub const DEFAULT_MESSAGE_WIDTH: usize = 16;

/// Smallest message width: zero fractional digits.
pub const MIN_MESSAGE_WIDTH: usize = 4;

/// Largest message width accepted.
pub const MAX_MESSAGE_WIDTH: usize = 64;

/// Default depth of the sample channel between producer and broadcaster.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Largest sample channel depth accepted. The channel allocates every slot
/// up front.
pub const MAX_CHANNEL_CAPACITY: usize = 65_536;

/// Slowest rate accepted for the broadcast loop and the producer.
pub const MIN_RATE_HZ: f64 = 0.001;

/// Fastest rate accepted; one tick per microsecond.
pub const MAX_RATE_HZ: f64 = 1_000_000.0;

/// Default delay between bind attempts while the address is in use.
pub const DEFAULT_BIND_RETRY_DELAY_MS: u64 = 5_000;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 128;

// ============================================================================
// Top-level configuration
// ============================================================================

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Listener settings.
    pub server: ServerConfig,

    /// Broadcast loop settings.
    pub broadcast: BroadcastConfig,

    /// Where samples come from.
    pub source: SourceConfig,

    /// Resource monitor settings.
    pub monitor: MonitorConfig,
}

impl DaemonConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }

    /// Parses and validates TOML text. `origin` is only used in errors.
    pub fn parse(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: DaemonConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field against its permitted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.broadcast.validate()?;
        self.source.validate()?;
        self.monitor.validate()
    }
}

// ============================================================================
// Server
// ============================================================================

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: IpAddr,

    /// TCP port to bind (0 picks an ephemeral port).
    pub port: u16,

    /// Listen backlog passed to `listen(2)`.
    pub backlog: u32,

    /// Delay between bind attempts while the address is in use.
    pub bind_retry_delay_ms: u64,

    /// Give up binding after this many attempts (unbounded if absent).
    pub max_bind_attempts: Option<u32>,

    /// Reject connections beyond this many clients (unbounded if absent).
    pub max_clients: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            bind_retry_delay_ms: DEFAULT_BIND_RETRY_DELAY_MS,
            max_bind_attempts: None,
            max_clients: None,
        }
    }
}

impl ServerConfig {
    /// Socket address built from `host` and `port`.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Delay between bind attempts.
    pub fn bind_retry_delay(&self) -> Duration {
        Duration::from_millis(self.bind_retry_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog == 0 {
            return Err(ConfigError::invalid("server.backlog", "must be at least 1"));
        }
        if self.bind_retry_delay_ms == 0 {
            return Err(ConfigError::invalid(
                "server.bind_retry_delay_ms",
                "must be greater than 0",
            ));
        }
        if self.max_bind_attempts == Some(0) {
            return Err(ConfigError::invalid(
                "server.max_bind_attempts",
                "must be at least 1 when set",
            ));
        }
        if self.max_clients == Some(0) {
            return Err(ConfigError::invalid(
                "server.max_clients",
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Broadcast
// ============================================================================

/// Broadcast loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BroadcastConfig {
    /// Ticks per second.
    pub sample_rate_hz: f64,

    /// Exact byte length of every message on the wire.
    pub message_width: usize,

    /// Samples buffered between producer and broadcaster before the
    /// oldest is overwritten.
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            message_width: DEFAULT_MESSAGE_WIDTH,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl BroadcastConfig {
    /// Time between two ticks.
    pub fn period(&self) -> Duration {
        rate_to_period(self.sample_rate_hz)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_rate("broadcast.sample_rate_hz", self.sample_rate_hz)?;
        if !(MIN_MESSAGE_WIDTH..=MAX_MESSAGE_WIDTH).contains(&self.message_width) {
            return Err(ConfigError::invalid(
                "broadcast.message_width",
                format!(
                    "{} is outside {MIN_MESSAGE_WIDTH}..={MAX_MESSAGE_WIDTH}",
                    self.message_width
                ),
            ));
        }
        if !(1..=MAX_CHANNEL_CAPACITY).contains(&self.channel_capacity) {
            return Err(ConfigError::invalid(
                "broadcast.channel_capacity",
                format!(
                    "{} is outside 1..={MAX_CHANNEL_CAPACITY}",
                    self.channel_capacity
                ),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Source
// ============================================================================

/// Where the daemon gets its samples from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// No producer; every tick broadcasts the sentinel.
    #[default]
    None,

    /// Replay the second column of a CSV file in a loop.
    File {
        path: PathBuf,
        /// Producer rate; defaults to the broadcast rate.
        #[serde(default)]
        rate_hz: Option<f64>,
    },

    /// Read a synthetic sine through a differential channel pair.
    Simulated {
        #[serde(default = "default_signal_frequency")]
        frequency_hz: f64,
        #[serde(default = "default_signal_amplitude")]
        amplitude: f64,
        #[serde(default)]
        rate_hz: Option<f64>,
    },
}

fn default_signal_frequency() -> f64 {
    1.0
}

fn default_signal_amplitude() -> f64 {
    1.0
}

impl SourceConfig {
    /// Producer rate, falling back to the broadcast rate.
    pub fn rate_hz(&self, broadcast: &BroadcastConfig) -> f64 {
        match self {
            Self::File {
                rate_hz: Some(rate),
                ..
            }
            | Self::Simulated {
                rate_hz: Some(rate),
                ..
            } => *rate,
            _ => broadcast.sample_rate_hz,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::None => {}
            Self::File { rate_hz, .. } => {
                if let Some(rate) = rate_hz {
                    validate_rate("source.rate_hz", *rate)?;
                }
            }
            Self::Simulated {
                frequency_hz,
                amplitude,
                rate_hz,
            } => {
                if let Some(rate) = rate_hz {
                    validate_rate("source.rate_hz", *rate)?;
                }
                if !frequency_hz.is_finite() || *frequency_hz < 0.0 {
                    return Err(ConfigError::invalid(
                        "source.frequency_hz",
                        format!("{frequency_hz} is not a non-negative frequency"),
                    ));
                }
                if !amplitude.is_finite() {
                    return Err(ConfigError::invalid(
                        "source.amplitude",
                        format!("{amplitude} is not finite"),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Resource monitor settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Seconds between two resource reports.
    pub interval_secs: u64,

    /// Resident memory above which a warning is logged.
    pub memory_threshold_mb: u64,

    /// CPU usage above which a warning is logged.
    pub cpu_threshold_percent: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            memory_threshold_mb: 100,
            cpu_threshold_percent: 80.0,
        }
    }
}

impl MonitorConfig {
    /// Time between two resource reports.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::invalid(
                "monitor.interval_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Converts a rate in Hz to a tick period.
///
/// Callers validate the rate first. A non-positive rate maps to one second,
/// a period too long for [`Duration`] maps to one second, and the result is
/// never shorter than one nanosecond.
pub fn rate_to_period(rate_hz: f64) -> Duration {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return Duration::from_secs(1);
    }
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .unwrap_or(Duration::from_secs(1))
        .max(Duration::from_nanos(1))
}

fn validate_rate(field: &'static str, rate: f64) -> Result<(), ConfigError> {
    if !rate.is_finite() || !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&rate) {
        return Err(ConfigError::invalid(
            field,
            format!("{rate} is outside {MIN_RATE_HZ}..={MAX_RATE_HZ} Hz"),
        ));
    }
    Ok(())
}
