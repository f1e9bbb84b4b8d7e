//! Producer task: drives a [`SampleSource`] at a fixed rate into the
//! sample channel.
//!
//! A failed read skips that tick. The first failure of a run is a warning,
//! repeats are debug-level so a dead input does not flood the log, and the
//! first success afterwards is logged as a recovery. The task ends when
//! cancelled or when the broadcast side has dropped its receiver.

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use daqcast_core::config::rate_to_period;
use daqcast_core::SampleSource;

use crate::channel::SampleSender;

/// Why the producer stopped and what it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerSummary {
    pub produced: u64,
    pub failed: u64,
    pub stop: ProducerStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerStop {
    Cancelled,
    ChannelClosed,
}

/// Spawns [`run_producer`] on the runtime.
pub fn spawn_producer<S>(
    source: S,
    sender: SampleSender,
    rate_hz: f64,
    cancel_token: CancellationToken,
) -> JoinHandle<ProducerSummary>
where
    S: SampleSource + 'static,
{
    tokio::spawn(run_producer(source, sender, rate_hz, cancel_token))
}

/// Polls `source` every `1 / rate_hz` seconds and forwards each sample.
pub async fn run_producer<S: SampleSource>(
    mut source: S,
    sender: SampleSender,
    rate_hz: f64,
    cancel_token: CancellationToken,
) -> ProducerSummary {
    let period = rate_to_period(rate_hz);
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut produced = 0u64;
    let mut failed = 0u64;
    let mut failing_since: Option<u64> = None;

    info!(source = source.name(), rate_hz, "Producer starting");

    let stop = loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => break ProducerStop::Cancelled,

            _ = tick.tick() => {
                match source.next_sample().await {
                    Ok(sample) => {
                        if sender.send(sample).is_err() {
                            break ProducerStop::ChannelClosed;
                        }
                        produced += 1;
                        if let Some(first_failure) = failing_since.take() {
                            info!(
                                source = source.name(),
                                failed_reads = failed - first_failure,
                                "Source recovered"
                            );
                        }
                    }
                    Err(e) => {
                        if failing_since.is_none() {
                            warn!(source = source.name(), error = %e, "Source read failed, skipping tick");
                            failing_since = Some(failed);
                        } else {
                            debug!(source = source.name(), error = %e, "Source read failed again");
                        }
                        failed += 1;
                    }
                }
            }
        }
    };

    info!(
        source = source.name(),
        produced,
        failed,
        reason = ?stop,
        "Producer stopped"
    );

    ProducerSummary {
        produced,
        failed,
        stop,
    }
}
