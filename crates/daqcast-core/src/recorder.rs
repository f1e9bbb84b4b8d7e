//! CSV capture of a differential channel pair.
//!
//! The recorder writes `elapsed_seconds,value` rows at a target rate so the
//! file can later be replayed by [`ReplaySource`](crate::ReplaySource). The
//! loop runs on a blocking thread: reads, formatting and writes all take
//! time, so the recorder first measures how long one iteration overshoots
//! the target period and shortens its sleep by that amount.

use std::io::{self, BufWriter, Write};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::rate_to_period;
use crate::error::SourceError;
use crate::source::{AnalogInput, DifferentialSource};

/// Recording parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSettings {
    /// Target rows per second.
    pub rate_hz: f64,

    /// How long to record after the warm-up.
    pub duration: Duration,

    /// Readings taken before recording starts are discarded.
    pub warmup: Duration,

    /// Iterations used to measure loop overhead. The first one is ignored.
    pub calibration_rounds: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            rate_hz: 400.0,
            duration: Duration::from_secs(20),
            warmup: Duration::from_secs(2),
            calibration_rounds: 50,
        }
    }
}

/// Outcome of one recording run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingSummary {
    /// Rows written.
    pub rows: usize,

    /// Measured per-iteration overshoot subtracted from every sleep.
    pub loop_overhead: Duration,
}

/// Records a differential pair to CSV with drift-corrected pacing.
pub struct Recorder<A> {
    source: DifferentialSource<A>,
    settings: RecorderSettings,
}

impl<A: AnalogInput> Recorder<A> {
    pub fn new(source: DifferentialSource<A>, settings: RecorderSettings) -> Self {
        Self { source, settings }
    }

    /// Measures how much one read/format/sleep iteration exceeds the period.
    pub fn calibrate(&mut self) -> Result<Duration, SourceError> {
        let period = rate_to_period(self.settings.rate_hz);
        let origin = Instant::now();
        let mut sink = io::sink();
        let mut total = Duration::ZERO;
        let mut counted = 0u32;

        for round in 0..self.settings.calibration_rounds {
            let started = Instant::now();
            let sample = self.source.read_pair()?;
            writeln!(
                sink,
                "{},{:18.16}",
                started.duration_since(origin).as_secs_f64(),
                sample.value()
            )?;
            thread::sleep(period);

            // The first iteration pays one-off costs.
            if round != 0 {
                total += started.elapsed();
                counted += 1;
            }
        }

        if counted == 0 {
            return Ok(Duration::ZERO);
        }

        let average = total / counted;
        let overhead = average.saturating_sub(period);
        debug!(
            average_us = average.as_micros() as u64,
            overhead_us = overhead.as_micros() as u64,
            "Recorder calibration complete"
        );
        Ok(overhead)
    }

    /// Calibrates, then records rows to `out` until the duration elapses.
    pub fn record<W: Write>(&mut self, out: W) -> Result<RecordingSummary, SourceError> {
        let overhead = self.calibrate()?;
        let period = rate_to_period(self.settings.rate_hz);
        let pause = period.saturating_sub(overhead);
        let warmup = self.settings.warmup;
        let end = warmup + self.settings.duration;

        info!(
            duration_secs = self.settings.duration.as_secs_f64(),
            rate_hz = self.settings.rate_hz,
            "Recording started"
        );

        let mut writer = BufWriter::new(out);
        let mut rows = 0usize;
        let start = Instant::now();

        while start.elapsed() < end {
            let sample = self.source.read_pair()?;
            let elapsed = start.elapsed();
            if elapsed > warmup {
                writeln!(
                    writer,
                    "{:.6},{:016.12}",
                    (elapsed - warmup).as_secs_f64(),
                    sample.value()
                )?;
                rows += 1;
            }
            thread::sleep(pause);
        }

        writer.flush()?;
        info!(rows, "Recording finished");

        Ok(RecordingSummary {
            rows,
            loop_overhead: overhead,
        })
    }
}
