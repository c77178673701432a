use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Worker runtime counters.
///
/// All counters use `Relaxed` ordering: they are independent observations
/// and nothing synchronises on them.
///
/// Share via `Arc<Metrics>`.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Tasks taken off the primary queue (malformed ones excluded).
    pub jobs_received: AtomicU64,

    /// Tasks whose transcode request was published.
    pub jobs_dispatched: AtomicU64,

    /// Jobs whose transcript was uploaded.
    pub jobs_completed: AtomicU64,

    /// Jobs that ended in `Failed`, at any stage.
    pub jobs_failed: AtomicU64,

    /// Jobs waiting on the transcoder or recognizing (gauge).
    pub jobs_in_flight: AtomicI64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_received(&self) {
        self.jobs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dispatched(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_in_flight(&self) {
        self.jobs_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_in_flight(&self) {
        self.jobs_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Approximate point-in-time view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.jobs_received.load(Ordering::Relaxed),
            dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            completed: self.jobs_completed.load(Ordering::Relaxed),
            failed: self.jobs_failed.load(Ordering::Relaxed),
            in_flight: self.jobs_in_flight.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            received   = s.received,
            dispatched = s.dispatched,
            completed  = s.completed,
            failed     = s.failed,
            in_flight  = s.in_flight,
            "📊 metrics summary"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: i64,
}
