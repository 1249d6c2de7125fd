//! Releasable reference from a subscription to the subscriber it serves.

use crate::error::FlowError;
use crate::protocol::{Subscriber, Subscription};
use arc_swap::ArcSwapOption;
use std::sync::Arc;

struct Bound<T> {
    subscriber: Arc<dyn Subscriber<T>>,
}

/// Holds the subscriber only while the subscription is live.
///
/// The subscriber keeps the authoritative reference to its subscription; this
/// cell drops its side on the terminal signal or on cancellation, which
/// breaks the subscription/subscriber cycle and guarantees that terminal
/// signals are delivered at most once.
pub(crate) struct DownstreamCell<T> {
    bound: ArcSwapOption<Bound<T>>,
}

impl<T> DownstreamCell<T> {
    pub(crate) fn new(subscriber: Arc<dyn Subscriber<T>>) -> Self {
        Self {
            bound: ArcSwapOption::from_pointee(Bound { subscriber }),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_released(&self) -> bool {
        self.bound.load().is_none()
    }

    pub(crate) fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if let Some(bound) = self.bound.load_full() {
            bound.subscriber.on_subscribe(subscription);
        }
    }

    /// Delivers one item; returns `false` once the cell has been released.
    pub(crate) fn on_next(&self, item: T) -> bool {
        match self.bound.load_full() {
            Some(bound) => {
                bound.subscriber.on_next(item);
                true
            }
            None => false,
        }
    }

    pub(crate) fn on_error(&self, error: FlowError) -> bool {
        match self.bound.swap(None) {
            Some(bound) => {
                bound.subscriber.on_error(error);
                true
            }
            None => false,
        }
    }

    pub(crate) fn on_complete(&self) -> bool {
        match self.bound.swap(None) {
            Some(bound) => {
                bound.subscriber.on_complete();
                true
            }
            None => false,
        }
    }

    /// Drops the subscriber without signalling it (cancellation path).
    pub(crate) fn release(&self) {
        self.bound.store(None);
    }
}
