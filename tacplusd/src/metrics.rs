//! Process-wide counters and duration sums.
//!
//! All increments are relaxed atomic operations; the counters are monotonic
//! and only ever read as a point-in-time [`MetricsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The process-global metrics registry.
#[derive(Debug, Default)]
pub struct Metrics {
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    connections_closed: AtomicU64,
    packets_read: AtomicU64,
    replies_written: AtomicU64,
    sessions_started: AtomicU64,
    sessions_completed: AtomicU64,
    session_duration_micros: AtomicU64,
    bad_secrets: AtomicU64,
    sequence_errors: AtomicU64,
    codec_errors: AtomicU64,
    handler_errors: AtomicU64,
}

static METRICS: Metrics = Metrics {
    connections_accepted: AtomicU64::new(0),
    connections_rejected: AtomicU64::new(0),
    connections_closed: AtomicU64::new(0),
    packets_read: AtomicU64::new(0),
    replies_written: AtomicU64::new(0),
    sessions_started: AtomicU64::new(0),
    sessions_completed: AtomicU64::new(0),
    session_duration_micros: AtomicU64::new(0),
    bad_secrets: AtomicU64::new(0),
    sequence_errors: AtomicU64::new(0),
    codec_errors: AtomicU64::new(0),
    handler_errors: AtomicU64::new(0),
};

/// Returns the process-global metrics registry.
pub fn metrics() -> &'static Metrics {
    &METRICS
}

impl Metrics {
    pub(crate) fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn packet_read(&self) {
        self.packets_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reply_written(&self) {
        self.replies_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_completed(&self, duration: Duration) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        // saturating: a pathological duration must not wrap the sum
        self.session_duration_micros.fetch_add(
            u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    pub(crate) fn bad_secret(&self) {
        self.bad_secrets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sequence_error(&self) {
        self.sequence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn codec_error(&self) {
        self.codec_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            packets_read: self.packets_read.load(Ordering::Relaxed),
            replies_written: self.replies_written.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            session_duration_micros: self.session_duration_micros.load(Ordering::Relaxed),
            bad_secrets: self.bad_secrets.load(Ordering::Relaxed),
            sequence_errors: self.sequence_errors.load(Ordering::Relaxed),
            codec_errors: self.codec_errors.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of every counter in the registry.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub connections_closed: u64,
    pub packets_read: u64,
    pub replies_written: u64,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub session_duration_micros: u64,
    pub bad_secrets: u64,
    pub sequence_errors: u64,
    pub codec_errors: u64,
    pub handler_errors: u64,
}
