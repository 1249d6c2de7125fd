//! Demand carried across a change of upstream.

use crate::error::FlowError;
use crate::protocol::downstream::DownstreamCell;
use crate::protocol::{Subscriber, Subscription, UNBOUNDED};
use std::sync::{Arc, Mutex};

struct ArbiterState {
    outstanding: u64,
    current: Option<Arc<dyn Subscription>>,
    cancelled: bool,
}

/// The subscription a switching operator hands downstream.
///
/// Remembers demand not yet satisfied so that a replacement upstream is asked
/// for exactly what the previous one still owed.
pub(crate) struct SwitchArbiter<T> {
    state: Mutex<ArbiterState>,
    downstream: DownstreamCell<T>,
}

impl<T: Send + 'static> SwitchArbiter<T> {
    pub(crate) fn new(downstream: Arc<dyn Subscriber<T>>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ArbiterState {
                outstanding: 0,
                current: None,
                cancelled: false,
            }),
            downstream: DownstreamCell::new(downstream),
        })
    }

    /// Signals `on_subscribe` downstream with the arbiter itself.
    pub(crate) fn start(self: &Arc<Self>) {
        self.downstream.on_subscribe(self.clone());
    }

    /// Adopts `upstream` unless `reject` says otherwise or the arbiter is
    /// cancelled, then asks it for the demand still owed.
    pub(crate) fn set_upstream_unless<F>(&self, upstream: Arc<dyn Subscription>, reject: F)
    where
        F: FnOnce() -> bool,
    {
        let pending = match self.state.lock() {
            Ok(mut state) => {
                if state.cancelled || reject() {
                    None
                } else {
                    state.current = Some(upstream.clone());
                    Some(state.outstanding)
                }
            }
            Err(_) => None,
        };
        match pending {
            None => upstream.cancel(),
            Some(0) => {}
            Some(pending) => upstream.request(pending),
        }
    }

    pub(crate) fn set_upstream(&self, upstream: Arc<dyn Subscription>) {
        self.set_upstream_unless(upstream, || false);
    }

    /// Cancels the current upstream without ending the downstream.
    pub(crate) fn cancel_upstream(&self) {
        let current = self.state.lock().ok().and_then(|mut state| state.current.take());
        if let Some(current) = current {
            current.cancel();
        }
    }

    pub(crate) fn emit(&self, item: T) {
        if let Ok(mut state) = self.state.lock() {
            if state.outstanding != UNBOUNDED {
                state.outstanding = state.outstanding.saturating_sub(1);
            }
        }
        self.downstream.on_next(item);
    }

    pub(crate) fn complete(&self) {
        self.clear_current();
        self.downstream.on_complete();
    }

    pub(crate) fn fail(&self, error: FlowError) {
        self.clear_current();
        self.downstream.on_error(error);
    }

    fn clear_current(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.current = None;
        }
    }
}

impl<T: Send + 'static> Subscription for SwitchArbiter<T> {
    fn request(&self, n: u64) {
        let current = match self.state.lock() {
            Ok(mut state) => {
                if state.cancelled {
                    return;
                }
                state.outstanding = if n == UNBOUNDED {
                    UNBOUNDED
                } else {
                    state.outstanding.checked_add(n).unwrap_or(UNBOUNDED)
                };
                state.current.clone()
            }
            Err(_) => return,
        };
        if let Some(current) = current {
            current.request(n);
        }
    }

    fn cancel(&self) {
        let current = match self.state.lock() {
            Ok(mut state) => {
                if state.cancelled {
                    return;
                }
                state.cancelled = true;
                state.current.take()
            }
            Err(_) => None,
        };
        self.downstream.release();
        if let Some(current) = current {
            current.cancel();
        }
    }
}

/// Forwards a replacement upstream's signals through the arbiter.
pub(crate) struct Relay<T> {
    arbiter: Arc<SwitchArbiter<T>>,
}

impl<T> Relay<T> {
    pub(crate) fn new(arbiter: Arc<SwitchArbiter<T>>) -> Self {
        Self { arbiter }
    }
}

impl<T: Send + 'static> Subscriber<T> for Relay<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.arbiter.set_upstream(subscription);
    }

    fn on_next(&self, item: T) {
        self.arbiter.emit(item);
    }

    fn on_error(&self, error: FlowError) {
        self.arbiter.fail(error);
    }

    fn on_complete(&self) {
        self.arbiter.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::{Relay, SwitchArbiter};
    use crate::protocol::{Publisher, Subscription};
    use crate::source::pull::PullPublisher;
    use crate::source::single::RangeSource;
    use crate::test_support::RecordingSubscriber;
    use std::sync::Arc;

    #[test]
    fn replacement_upstream_receives_remaining_demand() {
        let recorder = Arc::new(RecordingSubscriber::new(5));
        let arbiter = SwitchArbiter::new(recorder.clone());
        arbiter.start();

        PullPublisher::new(RangeSource::new(1, 2)).subscribe(Arc::new(Relay::new(arbiter.clone())));
        assert_eq!(recorder.items(), vec![1, 2]);
        assert!(recorder.is_completed());
    }

    #[test]
    fn demand_counts_down_across_switch() {
        let recorder = Arc::new(RecordingSubscriber::new(0));
        let arbiter = SwitchArbiter::new(recorder.clone());
        arbiter.start();
        arbiter.request(3);

        arbiter.emit(10);
        arbiter.set_upstream(Arc::new(crate::protocol::NoopSubscription));
        PullPublisher::new(RangeSource::new(20, 10))
            .subscribe(Arc::new(Relay::new(arbiter.clone())));

        assert_eq!(recorder.items(), vec![10, 20, 21]);
    }

    #[test]
    fn cancelled_arbiter_cancels_late_upstream() {
        let recorder = Arc::new(RecordingSubscriber::<i64>::new(1));
        let arbiter = SwitchArbiter::new(recorder.clone());
        arbiter.start();

        arbiter.cancel();
        PullPublisher::new(RangeSource::new(1, 3)).subscribe(Arc::new(Relay::new(arbiter.clone())));

        assert!(recorder.items().is_empty());
        assert_eq!(recorder.terminal_count(), 0);
    }
}
