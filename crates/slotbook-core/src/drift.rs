//! Counters for tolerated ledger drift.
//!
//! A few best-effort steps may leave slot counters out of step with
//! appointment state: a failed compensating unlock after a failed create, a
//! failed `book` after a successful deposit charge, a failed release after
//! completion or cancellation, and lock units dropped by capacity
//! recalculation. Each occurrence is logged at `warn` with a `drift_kind`
//! field and counted here.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    CompensationFailed,
    BookFailed,
    ReleaseFailed,
    LockClamped,
}

impl DriftKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftKind::CompensationFailed => "compensation_failed",
            DriftKind::BookFailed => "book_failed",
            DriftKind::ReleaseFailed => "release_failed",
            DriftKind::LockClamped => "lock_clamped",
        }
    }
}

#[derive(Debug, Default)]
pub struct LedgerDrift {
    compensation_failed: AtomicU64,
    book_failed: AtomicU64,
    release_failed: AtomicU64,
    lock_clamped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LedgerDriftSnapshot {
    pub compensation_failed: u64,
    pub book_failed: u64,
    pub release_failed: u64,
    pub lock_clamped: u64,
}

impl LedgerDriftSnapshot {
    pub fn total(&self) -> u64 {
        self.compensation_failed + self.book_failed + self.release_failed + self.lock_clamped
    }
}

impl LedgerDrift {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: DriftKind, units: u64) {
        let counter = match kind {
            DriftKind::CompensationFailed => &self.compensation_failed,
            DriftKind::BookFailed => &self.book_failed,
            DriftKind::ReleaseFailed => &self.release_failed,
            DriftKind::LockClamped => &self.lock_clamped,
        };
        counter.fetch_add(units, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LedgerDriftSnapshot {
        LedgerDriftSnapshot {
            compensation_failed: self.compensation_failed.load(Ordering::Relaxed),
            book_failed: self.book_failed.load(Ordering::Relaxed),
            release_failed: self.release_failed.load(Ordering::Relaxed),
            lock_clamped: self.lock_clamped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let drift = LedgerDrift::new();
        drift.record(DriftKind::ReleaseFailed, 1);
        drift.record(DriftKind::LockClamped, 3);
        drift.record(DriftKind::LockClamped, 2);

        let snap = drift.snapshot();
        assert_eq!(snap.release_failed, 1);
        assert_eq!(snap.lock_clamped, 5);
        assert_eq!(snap.book_failed, 0);
        assert_eq!(snap.total(), 6);
    }
}
