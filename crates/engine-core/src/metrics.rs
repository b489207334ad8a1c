use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    items_fetched: AtomicU64,
    imported: AtomicU64,
    already_existed: AtomicU64,
    lock_contended: AtomicU64,
    failures: AtomicU64,
    acknowledged: AtomicU64,
    reconciled: AtomicU64,
}

/// Process-wide counters for import activity. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub items_fetched: u64,
    pub imported: u64,
    pub already_existed: u64,
    pub lock_contended: u64,
    pub failures: u64,
    pub acknowledged: u64,
    pub reconciled: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_fetched(&self, count: u64) {
        self.inner.items_fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_imported(&self, count: u64) {
        self.inner.imported.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_already_existed(&self, count: u64) {
        self.inner.already_existed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_lock_contended(&self, count: u64) {
        self.inner.lock_contended.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_failures(&self, count: u64) {
        self.inner.failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_acknowledged(&self, count: u64) {
        self.inner.acknowledged.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_reconciled(&self, count: u64) {
        self.inner.reconciled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_fetched: self.inner.items_fetched.load(Ordering::Relaxed),
            imported: self.inner.imported.load(Ordering::Relaxed),
            already_existed: self.inner.already_existed.load(Ordering::Relaxed),
            lock_contended: self.inner.lock_contended.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
            acknowledged: self.inner.acknowledged.load(Ordering::Relaxed),
            reconciled: self.inner.reconciled.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
