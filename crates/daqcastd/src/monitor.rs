//! Resource and throughput monitoring for the daqcast daemon.
//!
//! Every interval the monitor samples the daemon's memory and CPU usage via
//! `sysinfo` together with the server counters, logs one report, and warns
//! when a resource threshold is exceeded or samples were overwritten since
//! the last report.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A process missing from the sysinfo table reports zero usage

use std::process;
use std::sync::Arc;

use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use daqcast_core::MonitorConfig;

use crate::stats::{ServerStats, StatsSnapshot};

/// Current process metrics snapshot.
#[derive(Debug, Clone, Default)]
pub struct ProcessMetrics {
    pub memory_bytes: u64,
    pub memory_mb: u64,
    /// CPU usage as percentage of one core (can exceed 100).
    pub cpu_percent: f32,
    pub memory_high: bool,
    pub cpu_high: bool,
}

impl ProcessMetrics {
    pub fn is_any_high(&self) -> bool {
        self.memory_high || self.cpu_high
    }
}

/// Samples resource usage of the current process.
///
/// CPU usage is relative to the previous refresh, so the first reading
/// after construction is usually zero.
pub struct ProcessMonitor {
    system: System,
    pid: Pid,
    memory_threshold_mb: u64,
    cpu_threshold_percent: f32,
}

impl ProcessMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(process::id()),
            memory_threshold_mb: config.memory_threshold_mb,
            cpu_threshold_percent: config.cpu_threshold_percent,
        }
    }

    pub fn refresh(&mut self) -> ProcessMetrics {
        // A single-process refresh does not compute CPU usage.
        self.system.refresh_all();

        let (memory_bytes, cpu_percent) = self
            .system
            .process(self.pid)
            .map(|p| (p.memory(), p.cpu_usage()))
            .unwrap_or((0, 0.0));

        let memory_mb = memory_bytes / 1024 / 1024;

        ProcessMetrics {
            memory_bytes,
            memory_mb,
            cpu_percent,
            memory_high: memory_mb > self.memory_threshold_mb,
            cpu_high: cpu_percent > self.cpu_threshold_percent,
        }
    }

    pub fn memory_threshold_mb(&self) -> u64 {
        self.memory_threshold_mb
    }

    pub fn cpu_threshold_percent(&self) -> f32 {
        self.cpu_threshold_percent
    }
}

/// Counter movement between two reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThroughputDelta {
    pub ticks: u64,
    pub sentinel_ticks: u64,
    pub frames_sent: u64,
    pub clients_removed: u64,
    pub samples_dropped: u64,
}

impl ThroughputDelta {
    pub fn between(previous: &StatsSnapshot, current: &StatsSnapshot) -> Self {
        Self {
            ticks: current.ticks.saturating_sub(previous.ticks),
            sentinel_ticks: current.sentinel_ticks.saturating_sub(previous.sentinel_ticks),
            frames_sent: current.frames_sent.saturating_sub(previous.frames_sent),
            clients_removed: current
                .clients_removed
                .saturating_sub(previous.clients_removed),
            samples_dropped: current
                .samples_dropped
                .saturating_sub(previous.samples_dropped),
        }
    }
}

/// Spawns the monitoring task. It runs until `cancel_token` fires.
pub fn spawn_monitor_task(
    config: MonitorConfig,
    stats: Arc<ServerStats>,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut monitor = ProcessMonitor::new(&config);
        let mut tick = interval(config.interval());

        // Baseline for CPU usage and for the first delta.
        let _ = monitor.refresh();
        let mut previous = stats.snapshot();

        info!(
            memory_threshold_mb = monitor.memory_threshold_mb(),
            cpu_threshold_percent = monitor.cpu_threshold_percent(),
            interval_secs = config.interval_secs,
            "Resource monitor started"
        );

        // The first interval tick completes immediately.
        tick.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Resource monitor shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let metrics = monitor.refresh();
                    let current = stats.snapshot();
                    let delta = ThroughputDelta::between(&previous, &current);
                    log_report(&metrics, &monitor, &current, &delta);
                    previous = current;
                }
            }
        }

        debug!("Resource monitor task completed");
    })
}

fn log_report(
    metrics: &ProcessMetrics,
    monitor: &ProcessMonitor,
    current: &StatsSnapshot,
    delta: &ThroughputDelta,
) {
    let cpu_percent = format!("{:.1}", metrics.cpu_percent);

    if metrics.memory_high {
        warn!(
            memory_mb = metrics.memory_mb,
            threshold_mb = monitor.memory_threshold_mb(),
            cpu_percent,
            "HIGH MEMORY: daemon memory usage above threshold"
        );
    } else if metrics.cpu_high {
        warn!(
            memory_mb = metrics.memory_mb,
            cpu_percent,
            threshold_percent = monitor.cpu_threshold_percent(),
            "HIGH CPU: daemon CPU usage above threshold"
        );
    }

    if delta.samples_dropped > 0 {
        warn!(
            dropped = delta.samples_dropped,
            "Broadcast loop fell behind the producer, samples overwritten"
        );
    }

    info!(
        memory_mb = metrics.memory_mb,
        cpu_percent = format!("{:.1}", metrics.cpu_percent),
        active_clients = current.active_clients,
        ticks = delta.ticks,
        sentinel_ticks = delta.sentinel_ticks,
        frames_sent = delta.frames_sent,
        clients_removed = delta.clients_removed,
        "Daemon status"
    );
}
