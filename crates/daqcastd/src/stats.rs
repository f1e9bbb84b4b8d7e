//! Shared throughput counters.
//!
//! Written by the listener and the broadcast loop, read by the monitor.
//! Counters are independent relaxed atomics; a snapshot is not a
//! consistent cut across them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live server counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    ticks: AtomicU64,
    sentinel_ticks: AtomicU64,
    frames_sent: AtomicU64,
    clients_accepted: AtomicU64,
    clients_removed: AtomicU64,
    active_clients: AtomicU64,
    samples_dropped: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub sentinel_ticks: u64,
    pub frames_sent: u64,
    pub clients_accepted: u64,
    pub clients_removed: u64,
    pub active_clients: u64,
    pub samples_dropped: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed tick.
    pub fn record_tick(&self, sentinel: bool, delivered: usize, removed: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if sentinel {
            self.sentinel_ticks.fetch_add(1, Ordering::Relaxed);
        }
        self.frames_sent.fetch_add(delivered as u64, Ordering::Relaxed);
        self.clients_removed.fetch_add(removed as u64, Ordering::Relaxed);
        self.active_clients.store(delivered as u64, Ordering::Relaxed);
    }

    /// Records one accepted and registered connection.
    pub fn record_accept(&self) {
        self.clients_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Publishes the channel's cumulative overwrite count.
    pub fn set_samples_dropped(&self, dropped: u64) {
        self.samples_dropped.store(dropped, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            sentinel_ticks: self.sentinel_ticks.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            clients_accepted: self.clients_accepted.load(Ordering::Relaxed),
            clients_removed: self.clients_removed.load(Ordering::Relaxed),
            active_clients: self.active_clients.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tick() {
        let stats = ServerStats::new();
        stats.record_tick(true, 3, 0);
        stats.record_tick(false, 2, 1);
        stats.record_accept();
        stats.set_samples_dropped(7);

        let snap = stats.snapshot();
        assert_eq!(snap.ticks, 2);
        assert_eq!(snap.sentinel_ticks, 1);
        assert_eq!(snap.frames_sent, 5);
        assert_eq!(snap.clients_removed, 1);
        assert_eq!(snap.active_clients, 2);
        assert_eq!(snap.clients_accepted, 1);
        assert_eq!(snap.samples_dropped, 7);
    }
}
