use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime counters, mutated only by completed work-item outcomes
/// and read by the shutdown summary. Monotonically increasing.
#[derive(Debug, Default)]
pub struct RunStatistics {
    uploaded: AtomicU64,
    deleted: AtomicU64,
    dirs_created: AtomicU64,
    dirs_removed: AtomicU64,
    errors: AtomicU64,
    skipped_large: AtomicU64,
    safety_violations: AtomicU64,
}

impl RunStatistics {
    pub fn record_upload(&self) {
        self.uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dir_created(&self) {
        self.dirs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dir_removed(&self) {
        self.dirs_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_large(&self) {
        self.skipped_large.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_safety_violation(&self) {
        self.safety_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uploaded: self.uploaded.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            dirs_created: self.dirs_created.load(Ordering::Relaxed),
            dirs_removed: self.dirs_removed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped_large: self.skipped_large.load(Ordering::Relaxed),
            safety_violations: self.safety_violations.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uploaded: u64,
    pub deleted: u64,
    pub dirs_created: u64,
    pub dirs_removed: u64,
    pub errors: u64,
    pub skipped_large: u64,
    pub safety_violations: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uploaded={} deleted={} dirs_created={} dirs_removed={} errors={} skipped_large={} safety_violations={}",
            self.uploaded,
            self.deleted,
            self.dirs_created,
            self.dirs_removed,
            self.errors,
            self.skipped_large,
            self.safety_violations,
        )
    }
}
