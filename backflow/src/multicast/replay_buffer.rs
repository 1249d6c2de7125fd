//! Shared history addressed by absolute position.

use crate::multicast::policy::ReplayPolicy;
use std::collections::VecDeque;

/// Items indexed from `base`; positions never move backwards, so a slot's
/// cursor stays valid across evictions and clears.
pub(crate) struct ReplayBuffer<T> {
    items: VecDeque<T>,
    base: u64,
    policy: ReplayPolicy,
}

impl<T> ReplayBuffer<T> {
    pub(crate) fn new(policy: ReplayPolicy) -> Self {
        Self {
            items: VecDeque::new(),
            base: 0,
            policy,
        }
    }

    /// Oldest retained position.
    pub(crate) fn base(&self) -> u64 {
        self.base
    }

    /// One past the newest position.
    pub(crate) fn high_water(&self) -> u64 {
        self.base + self.items.len() as u64
    }

    pub(crate) fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    fn retention(&self) -> Option<usize> {
        match self.policy {
            ReplayPolicy::None => Some(0),
            ReplayPolicy::Bounded(n) => Some(n),
            ReplayPolicy::Unbounded => None,
        }
    }

    /// Holds more than the policy retains.
    pub(crate) fn over_retained(&self) -> bool {
        self.retention().is_some_and(|keep| self.items.len() > keep)
    }

    /// Evicts oldest-first down to the policy's retention, never at or past
    /// `floor`.
    pub(crate) fn trim(&mut self, floor: u64) -> usize {
        let Some(keep) = self.retention() else {
            return 0;
        };
        let mut evicted = 0;
        while self.items.len() > keep && self.base < floor {
            self.items.pop_front();
            self.base += 1;
            evicted += 1;
        }
        evicted
    }

    pub(crate) fn clear(&mut self) {
        self.base = self.high_water();
        self.items.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T: Clone> ReplayBuffer<T> {
    pub(crate) fn get(&self, position: u64) -> Option<T> {
        let offset = position.checked_sub(self.base)?;
        self.items.get(usize::try_from(offset).ok()?).cloned()
    }
}
