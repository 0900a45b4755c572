//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any session task.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Session metrics
    pub sessions_total: AtomicU64,
    pub sessions_active: AtomicU64,
    pub sessions_rejected: AtomicU64,
    pub auth_failures: AtomicU64,

    // TCP relay metrics
    pub connects_total: AtomicU64,
    pub connect_failures: AtomicU64,
    pub bytes_up: AtomicU64,
    pub bytes_down: AtomicU64,

    // UDP relay metrics
    pub associations_total: AtomicU64,
    pub datagrams_in: AtomicU64,
    pub datagrams_out: AtomicU64,

    // Error metrics
    pub protocol_errors: AtomicU64,
    pub timeouts_total: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            sessions_rejected: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            connects_total: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
            associations_total: AtomicU64::new(0),
            datagrams_in: AtomicU64::new(0),
            datagrams_out: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
        }
    }

    // Session tracking
    #[inline]
    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    // TCP relay tracking
    #[inline]
    pub fn connect_opened(&self) {
        self.connects_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn bytes_up(&self, count: u64) {
        self.bytes_up.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn bytes_down(&self, count: u64) {
        self.bytes_down.fetch_add(count, Ordering::Relaxed);
    }

    // UDP relay tracking
    #[inline]
    pub fn association_opened(&self) {
        self.associations_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn datagram_in(&self) {
        self.datagrams_in.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn datagram_out(&self) {
        self.datagrams_out.fetch_add(1, Ordering::Relaxed);
    }

    // Error tracking
    #[inline]
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn timeout(&self) {
        self.timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            connects_total: self.connects_total.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            bytes_up: self.bytes_up.load(Ordering::Relaxed),
            bytes_down: self.bytes_down.load(Ordering::Relaxed),
            associations_total: self.associations_total.load(Ordering::Relaxed),
            datagrams_in: self.datagrams_in.load(Ordering::Relaxed),
            datagrams_out: self.datagrams_out.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub sessions_total: u64,
    pub sessions_active: u64,
    pub sessions_rejected: u64,
    pub auth_failures: u64,
    pub connects_total: u64,
    pub connect_failures: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub associations_total: u64,
    pub datagrams_in: u64,
    pub datagrams_out: u64,
    pub protocol_errors: u64,
    pub timeouts_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();

        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();
        metrics.bytes_up(100);
        metrics.bytes_down(50);
        metrics.datagram_out();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_total, 2);
        assert_eq!(snapshot.sessions_active, 1);
        assert_eq!(snapshot.bytes_up, 100);
        assert_eq!(snapshot.bytes_down, 50);
        assert_eq!(snapshot.datagrams_out, 1);
    }
}
