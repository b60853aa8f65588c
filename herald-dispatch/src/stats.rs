//! Outcome counters for dispatched mail.
//!
//! `send` is fire-and-forget, so these counters are the only place a caller can
//! see what became of its messages.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DispatchStats {
    /// `send` calls made while initialized
    submitted: AtomicU64,

    /// Messages dropped before reaching a multiplexer
    rejected: AtomicU64,

    /// Transfers handed to a multiplexer
    attached: AtomicU64,

    /// Transfers reaped with a successful outcome
    delivered: AtomicU64,

    /// Transfers reaped with a failed outcome
    failed: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub attached: u64,
    pub delivered: u64,
    pub failed: u64,
}

impl StatsSnapshot {
    /// Transfers attached but not yet reaped.
    #[must_use]
    pub const fn in_flight(&self) -> u64 {
        self.attached
            .saturating_sub(self.delivered)
            .saturating_sub(self.failed)
    }

    #[must_use]
    pub const fn reaped(&self) -> u64 {
        self.delivered + self.failed
    }
}

impl DispatchStats {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attached(&self) {
        self.attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            attached: self.attached.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
