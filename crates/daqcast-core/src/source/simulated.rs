//! Synthetic analog input for running without acquisition hardware.

use std::f64::consts::TAU;
use std::time::Instant;

use super::differential::AnalogInput;
use crate::error::SourceError;

/// Channel carrying the sine wave.
pub const SIGNAL_CHANNEL: u8 = 0;

/// Channel held at the common-mode voltage.
pub const REFERENCE_CHANNEL: u8 = 1;

/// Common-mode voltage present on both channels.
const COMMON_MODE_VOLTS: f64 = 1.65;

/// Two-channel input: a sine on [`SIGNAL_CHANNEL`] riding on a common-mode
/// offset, and the bare offset on [`REFERENCE_CHANNEL`].
///
/// Reading the pair differentially cancels the offset, leaving
/// `amplitude * sin(2π · frequency · t)`.
#[derive(Debug, Clone)]
pub struct SimulatedInput {
    frequency_hz: f64,
    amplitude: f64,
    origin: Instant,
}

impl SimulatedInput {
    pub fn new(frequency_hz: f64, amplitude: f64) -> Self {
        Self {
            frequency_hz,
            amplitude,
            origin: Instant::now(),
        }
    }

    fn signal_at(&self, seconds: f64) -> f64 {
        COMMON_MODE_VOLTS + self.amplitude * (TAU * self.frequency_hz * seconds).sin()
    }
}

impl AnalogInput for SimulatedInput {
    fn read_channel(&mut self, channel: u8) -> Result<f64, SourceError> {
        match channel {
            SIGNAL_CHANNEL => Ok(self.signal_at(self.origin.elapsed().as_secs_f64())),
            REFERENCE_CHANNEL => Ok(COMMON_MODE_VOLTS),
            _ => Err(SourceError::ChannelRead {
                channel,
                reason: "simulated input has two channels".to_string(),
            }),
        }
    }
}
