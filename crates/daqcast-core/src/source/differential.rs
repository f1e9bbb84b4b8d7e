//! Differential sampling of an analog channel pair.

use async_trait::async_trait;

use super::SampleSource;
use crate::error::SourceError;
use crate::Sample;

/// Single-ended analog input device.
///
/// Implemented by hardware drivers; reads are expected to be short and are
/// called from the producer task.
pub trait AnalogInput: Send {
    /// Reads the current voltage on `channel`.
    fn read_channel(&mut self, channel: u8) -> Result<f64, SourceError>;
}

/// Yields `signal - reference` for a pair of analog channels.
pub struct DifferentialSource<A> {
    input: A,
    signal: u8,
    reference: u8,
    name: String,
}

impl<A: AnalogInput> DifferentialSource<A> {
    /// Creates a source reading `signal` against `reference`.
    pub fn new(input: A, signal: u8, reference: u8) -> Self {
        Self {
            input,
            signal,
            reference,
            name: format!("differential ch{signal}-ch{reference}"),
        }
    }

    /// Reads both channels once and returns their difference.
    pub fn read_pair(&mut self) -> Result<Sample, SourceError> {
        let signal = self.input.read_channel(self.signal)?;
        let reference = self.input.read_channel(self.reference)?;
        Ok(Sample::new(signal - reference))
    }

    /// Channel indices as `(signal, reference)`.
    pub fn channels(&self) -> (u8, u8) {
        (self.signal, self.reference)
    }
}

#[async_trait]
impl<A: AnalogInput> SampleSource for DifferentialSource<A> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_sample(&mut self) -> Result<Sample, SourceError> {
        self.read_pair()
    }
}
