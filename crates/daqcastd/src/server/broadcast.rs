//! Fixed-period broadcast loop.
//!
//! Each tick takes at most one sample from the channel without waiting,
//! encodes it, and asks the registry to write it to every client. An empty
//! or closed channel yields the sentinel, so clients always see a steady
//! cadence. Late ticks are skipped rather than bursted.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use daqcast_core::Sample;
use daqcast_protocol::MessageFormat;

use crate::channel::{ChannelError, SampleReceiver};
use crate::registry::{BroadcastReport, RegistryError, RegistryHandle};
use crate::stats::ServerStats;

/// The broadcast loop task.
pub struct BroadcastLoop {
    receiver: SampleReceiver,
    registry: RegistryHandle,
    format: MessageFormat,
    period: Duration,
    stats: Arc<ServerStats>,
    cancel_token: CancellationToken,
    source_closed: bool,
}

impl BroadcastLoop {
    /// A zero `period` is raised to one nanosecond.
    pub fn new(
        receiver: SampleReceiver,
        registry: RegistryHandle,
        format: MessageFormat,
        period: Duration,
        stats: Arc<ServerStats>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            registry,
            format,
            period: period.max(Duration::from_nanos(1)),
            stats,
            cancel_token,
            source_closed: false,
        }
    }

    /// Ticks until cancelled or the registry shuts down.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            period_us = self.period.as_micros() as u64,
            width = self.format.width(),
            "Broadcast loop starting"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => break,

                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Registry unavailable, broadcast loop stopping");
                        break;
                    }
                }
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            ticks = snapshot.ticks,
            sentinel_ticks = snapshot.sentinel_ticks,
            "Broadcast loop stopped"
        );
    }

    /// Runs a single tick immediately.
    ///
    /// # Errors
    ///
    /// `RegistryError::ChannelClosed` if the registry actor is gone.
    pub async fn tick(&mut self) -> Result<BroadcastReport, RegistryError> {
        let (sample, sentinel) = self.next_sample();
        let frame = self.format.encode(sample);
        trace!(value = sample.value(), sentinel, "Tick");

        let report = self.registry.broadcast(frame).await?;

        self.stats
            .record_tick(sentinel, report.delivered, report.removed.len());
        self.stats.set_samples_dropped(self.receiver.dropped());
        Ok(report)
    }

    /// Next sample, or the sentinel when none is available. The flag is
    /// true when the sentinel was substituted.
    fn next_sample(&mut self) -> (Sample, bool) {
        match self.receiver.try_recv() {
            Ok(Some(sample)) => (sample, false),
            Ok(None) => (Sample::SENTINEL, true),
            Err(ChannelError::Closed) => {
                if !self.source_closed {
                    warn!("Sample source closed, broadcasting sentinel from now on");
                    self.source_closed = true;
                }
                (Sample::SENTINEL, true)
            }
        }
    }
}
