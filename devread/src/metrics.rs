use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters across all sweeps.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Metrics {
    pub reads_issued: u64,
    pub bytes_read: u64,
    pub wraparounds: u64,
    pub shortfalls: u64,
    pub timing_errors: u64,
}

pub(crate) struct MetricsStorage {
    pub(crate) reads_issued: AtomicU64,
    pub(crate) bytes_read: AtomicU64,
    pub(crate) wraparounds: AtomicU64,
    pub(crate) shortfalls: AtomicU64,
    pub(crate) timing_errors: AtomicU64,
}

impl MetricsStorage {
    pub(crate) const fn new_const() -> Self {
        MetricsStorage {
            reads_issued: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            wraparounds: AtomicU64::new(0),
            shortfalls: AtomicU64::new(0),
            timing_errors: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_iteration(
        &self,
        reads: u64,
        bytes_read: u64,
        wraparounds: u64,
        shortfall: bool,
        timing_error: bool,
    ) {
        self.reads_issued.fetch_add(reads, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes_read, Ordering::Relaxed);
        self.wraparounds.fetch_add(wraparounds, Ordering::Relaxed);
        if shortfall {
            self.shortfalls.fetch_add(1, Ordering::Relaxed);
        }
        if timing_error {
            self.timing_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn make_pub(&self) -> Metrics {
        Metrics {
            reads_issued: self.reads_issued.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            wraparounds: self.wraparounds.load(Ordering::Relaxed),
            shortfalls: self.shortfalls.load(Ordering::Relaxed),
            timing_errors: self.timing_errors.load(Ordering::Relaxed),
        }
    }
}

pub(crate) static GLOBAL_STORAGE: MetricsStorage = MetricsStorage::new_const();

pub fn global() -> Metrics {
    GLOBAL_STORAGE.make_pub()
}
