//! Distribution statistics.
use std::sync::{
    atomic::{AtomicU64, Ordering::Relaxed},
    Arc,
};

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    notifications_received: AtomicU64,
    decoding_failures: AtomicU64,
    forwards_succeeded: AtomicU64,
    forwards_failed: AtomicU64,
}

/// Process-wide dispatch counters.
///
/// Cloning is cheap and every clone shares the same counters.
#[derive(Clone, Debug, Default)]
pub struct DistributionStatistics {
    counters: Arc<Counters>,
}

impl DistributionStatistics {
    /// Creates a new set of statistics with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a decoded notification.
    pub fn notification_received(&self) {
        self.counters.notifications_received.fetch_add(1, Relaxed);
    }

    /// Records a notification that failed to decode.
    pub fn decoding_failed(&self) {
        self.counters.decoding_failures.fetch_add(1, Relaxed);
    }

    /// Records a successful forward.
    pub fn forward_succeeded(&self) {
        self.counters.forwards_succeeded.fetch_add(1, Relaxed);
    }

    /// Records a failed forward.
    pub fn forward_failed(&self) {
        self.counters.forwards_failed.fetch_add(1, Relaxed);
    }

    /// Takes a point-in-time snapshot of the counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            notifications_received: self.counters.notifications_received.load(Relaxed),
            decoding_failures: self.counters.decoding_failures.load(Relaxed),
            forwards_succeeded: self.counters.forwards_succeeded.load(Relaxed),
            forwards_failed: self.counters.forwards_failed.load(Relaxed),
        }
    }
}

/// Point-in-time copy of [`DistributionStatistics`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    /// Notifications decoded and dispatched.
    pub notifications_received: u64,

    /// Notifications that failed to decode.
    pub decoding_failures: u64,

    /// Successful deliveries, counted per forwarder.
    pub forwards_succeeded: u64,

    /// Failed deliveries, counted per forwarder.
    pub forwards_failed: u64,
}
