//! Sample producers.
//!
//! A [`SampleSource`] yields one sample per call at whatever pace the caller
//! drives it. The daemon's producer task polls a source at a fixed rate and
//! pushes each sample into the broadcast channel.
//!
//! Two sources exist:
//! - [`ReplaySource`] - loops over the second column of a CSV file
//! - [`DifferentialSource`] - reads a signal/reference pair through an
//!   [`AnalogInput`] and yields their difference
//!
//! [`SimulatedInput`] stands in for acquisition hardware.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::Sample;

mod differential;
mod replay;
mod simulated;

pub use differential::{AnalogInput, DifferentialSource};
pub use replay::ReplaySource;
pub use simulated::{SimulatedInput, REFERENCE_CHANNEL, SIGNAL_CHANNEL};

/// A producer of samples.
#[async_trait]
pub trait SampleSource: Send {
    /// Short human-readable description used in logs.
    fn name(&self) -> &str;

    /// Produces the next sample.
    async fn next_sample(&mut self) -> Result<Sample, SourceError>;
}

#[async_trait]
impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn next_sample(&mut self) -> Result<Sample, SourceError> {
        (**self).next_sample().await
    }
}
