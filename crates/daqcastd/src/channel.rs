//! Sample channel between the producer and the broadcast loop.
//!
//! The channel is bounded. When the producer outpaces the broadcaster, the
//! oldest pending sample is overwritten: only recent values matter for a
//! live display, and memory stays constant. Overwritten samples are counted.
//!
//! It is built on `tokio::sync::broadcast`, whose ring buffer already
//! implements overwrite-on-full and reports the overwritten count to the
//! receiver as `Lagged`. The capacity is rounded up to a power of two.
//!
//! "Nothing pending" and "producer gone" are distinct outcomes of
//! [`SampleReceiver::try_recv`].

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::debug;

use daqcast_core::Sample;

/// Errors from the sample channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The other side of the channel was dropped.
    #[error("sample channel closed")]
    Closed,
}

/// Creates a bounded sample channel holding at least `capacity` samples.
pub fn sample_channel(capacity: usize) -> (SampleSender, SampleReceiver) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    (SampleSender { tx }, SampleReceiver { rx, dropped: 0 })
}

/// Producer side. Sending never waits.
#[derive(Debug, Clone)]
pub struct SampleSender {
    tx: broadcast::Sender<Sample>,
}

impl SampleSender {
    /// Enqueues a sample, overwriting the oldest one if the channel is full.
    ///
    /// # Errors
    ///
    /// `ChannelError::Closed` if the receiver has been dropped.
    pub fn send(&self, sample: Sample) -> Result<(), ChannelError> {
        self.tx
            .send(sample)
            .map(|_| ())
            .map_err(|_| ChannelError::Closed)
    }

    /// Returns true once the receiver is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.receiver_count() == 0
    }
}

/// Consumer side.
#[derive(Debug)]
pub struct SampleReceiver {
    rx: broadcast::Receiver<Sample>,
    dropped: u64,
}

impl SampleReceiver {
    /// Takes the oldest pending sample without waiting.
    ///
    /// Returns `Ok(None)` when nothing is pending.
    ///
    /// # Errors
    ///
    /// `ChannelError::Closed` once every sender is dropped and the buffer
    /// is drained.
    pub fn try_recv(&mut self) -> Result<Option<Sample>, ChannelError> {
        loop {
            match self.rx.try_recv() {
                Ok(sample) => return Ok(Some(sample)),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => self.record_overwrite(skipped),
                Err(TryRecvError::Closed) => return Err(ChannelError::Closed),
            }
        }
    }

    /// Waits for the next sample.
    ///
    /// # Errors
    ///
    /// `ChannelError::Closed` once every sender is dropped and the buffer
    /// is drained.
    pub async fn recv(&mut self) -> Result<Sample, ChannelError> {
        loop {
            match self.rx.recv().await {
                Ok(sample) => return Ok(sample),
                Err(RecvError::Lagged(skipped)) => self.record_overwrite(skipped),
                Err(RecvError::Closed) => return Err(ChannelError::Closed),
            }
        }
    }

    /// Total samples overwritten before they could be consumed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn record_overwrite(&mut self, skipped: u64) {
        self.dropped = self.dropped.saturating_add(skipped);
        debug!(
            skipped,
            total_dropped = self.dropped,
            "Sample channel full, oldest samples overwritten"
        );
    }
}
