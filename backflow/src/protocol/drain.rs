//! Work-in-progress gate that lets exactly one thread run a drain loop.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Serialises a subscription's production step without a blocking lock.
///
/// Callers that lose the race to [`DrainGate::enter`] only record that more
/// work is pending; the current drainer observes it through
/// [`DrainGate::leave`] and loops again. Re-entrant calls from inside
/// `on_next` therefore never deadlock.
#[derive(Debug, Default)]
pub(crate) struct DrainGate {
    wip: AtomicUsize,
}

impl DrainGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the caller became the drainer.
    pub(crate) fn enter(&self) -> bool {
        self.wip.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Retires `missed` units of work; a non-zero result means more arrived
    /// meanwhile and the drainer must go round again with that value.
    pub(crate) fn leave(&self, missed: usize) -> usize {
        self.wip.fetch_sub(missed, Ordering::AcqRel) - missed
    }

    /// Runs `body` as the drainer if the gate is free, looping until no work
    /// was missed. `body` returns `false` to stop for good (terminal state);
    /// the gate then stays closed so later callers become no-ops.
    pub(crate) fn drain_with<F>(&self, mut body: F)
    where
        F: FnMut() -> bool,
    {
        if !self.enter() {
            return;
        }
        let mut missed = 1;
        loop {
            if !body() {
                return;
            }
            missed = self.leave(missed);
            if missed == 0 {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DrainGate;
    use std::cell::Cell;

    #[test]
    fn second_entrant_is_deferred_to_the_drainer() {
        let gate = DrainGate::new();

        assert!(gate.enter());
        assert!(!gate.enter());
        assert_eq!(gate.leave(1), 1);
        assert_eq!(gate.leave(1), 0);
    }

    #[test]
    fn reentrant_work_is_picked_up_by_the_outer_loop() {
        let gate = DrainGate::new();
        let passes = Cell::new(0);

        gate.drain_with(|| {
            passes.set(passes.get() + 1);
            if passes.get() == 1 {
                // Simulates a request issued from inside on_next.
                gate.drain_with(|| -> bool { unreachable!("nested drain must not run") });
            }
            true
        });

        assert_eq!(passes.get(), 2);
    }

    #[test]
    fn stopping_keeps_the_gate_closed() {
        let gate = DrainGate::new();
        let passes = Cell::new(0);

        gate.drain_with(|| {
            passes.set(passes.get() + 1);
            false
        });
        gate.drain_with(|| {
            passes.set(passes.get() + 1);
            true
        });

        assert_eq!(passes.get(), 1);
    }
}
