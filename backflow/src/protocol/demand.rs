//! Outstanding-demand bookkeeping for one subscription.

use crate::protocol::UNBOUNDED;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Cumulative requested count, delivered count and the cancellation flag.
///
/// `requested` only grows (saturating at [`UNBOUNDED`]); `delivered` is only
/// advanced by the thread currently holding the subscription's drain gate, so
/// `outstanding()` never over-reports from the drainer's point of view.
#[derive(Debug, Default)]
pub struct DemandLedger {
    requested: AtomicU64,
    delivered: AtomicU64,
    cancelled: AtomicBool,
}

impl DemandLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to the cumulative request count and returns the outstanding
    /// demand before the addition. No-op once cancelled.
    pub fn add(&self, n: u64) -> u64 {
        if self.is_cancelled() {
            return 0;
        }
        let mut current = self.requested.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = if n == UNBOUNDED {
                UNBOUNDED
            } else {
                current.checked_add(n).unwrap_or(UNBOUNDED)
            };
            match self.requested.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current - self.delivered.load(Ordering::Acquire).min(current),
                Err(actual) => current = actual,
            }
        }
    }

    /// Items that may still be delivered, or [`UNBOUNDED`].
    pub fn outstanding(&self) -> u64 {
        let requested = self.requested.load(Ordering::Acquire);
        if requested == UNBOUNDED {
            return UNBOUNDED;
        }
        requested.saturating_sub(self.delivered.load(Ordering::Acquire))
    }

    pub fn is_unbounded(&self) -> bool {
        self.requested.load(Ordering::Acquire) == UNBOUNDED
    }

    /// Records `k` deliveries.
    pub fn produced(&self, k: u64) {
        self.delivered.fetch_add(k, Ordering::AcqRel);
    }

    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Sets the flag; returns `true` only for the call that flipped it.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::DemandLedger;
    use crate::protocol::UNBOUNDED;

    #[test]
    fn outstanding_tracks_requests_minus_deliveries() {
        let ledger = DemandLedger::new();
        ledger.add(3);
        ledger.add(2);
        ledger.produced(4);

        assert_eq!(ledger.requested(), 5);
        assert_eq!(ledger.delivered(), 4);
        assert_eq!(ledger.outstanding(), 1);
    }

    #[test]
    fn overflow_saturates_to_unbounded() {
        let ledger = DemandLedger::new();
        ledger.add(u64::MAX - 1);
        ledger.add(5);

        assert!(ledger.is_unbounded());
        ledger.produced(1_000);
        assert_eq!(ledger.outstanding(), UNBOUNDED);
    }

    #[test]
    fn add_reports_previous_outstanding() {
        let ledger = DemandLedger::new();

        assert_eq!(ledger.add(2), 0);
        ledger.produced(1);
        assert_eq!(ledger.add(2), 1);
        assert_eq!(ledger.add(UNBOUNDED), 3);
        assert_eq!(ledger.add(1), UNBOUNDED);
    }

    #[test]
    fn cancel_is_monotonic_and_blocks_new_demand() {
        let ledger = DemandLedger::new();
        ledger.add(1);

        assert!(ledger.cancel());
        assert!(!ledger.cancel());
        assert!(ledger.is_cancelled());

        ledger.add(10);
        assert_eq!(ledger.requested(), 1);
    }
}
