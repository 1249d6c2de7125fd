//! Fallback for sources that complete without emitting.

use crate::error::FlowError;
use crate::flux::Flux;
use crate::observability::events;
use crate::operators::arbiter::{Relay, SwitchArbiter};
use crate::protocol::{Publisher, Subscriber, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

const COMPONENT: &str = "switch_if_empty";

pub(crate) struct SwitchIfEmptyPublisher<T> {
    source: Flux<T>,
    fallback: Flux<T>,
}

impl<T> SwitchIfEmptyPublisher<T> {
    pub(crate) fn new(source: Flux<T>, fallback: Flux<T>) -> Self {
        Self { source, fallback }
    }
}

impl<T: Send + 'static> Publisher<T> for SwitchIfEmptyPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let arbiter = SwitchArbiter::new(subscriber);
        arbiter.start();
        self.source.subscribe(Arc::new(SwitchIfEmptySubscriber {
            arbiter,
            fallback: self.fallback.clone(),
            seen: AtomicBool::new(false),
        }));
    }
}

struct SwitchIfEmptySubscriber<T> {
    arbiter: Arc<SwitchArbiter<T>>,
    fallback: Flux<T>,
    seen: AtomicBool,
}

impl<T: Send + 'static> Subscriber<T> for SwitchIfEmptySubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.arbiter.set_upstream(subscription);
    }

    fn on_next(&self, item: T) {
        self.seen.store(true, Ordering::Release);
        self.arbiter.emit(item);
    }

    fn on_error(&self, error: FlowError) {
        self.arbiter.fail(error);
    }

    fn on_complete(&self) {
        if self.seen.load(Ordering::Acquire) {
            self.arbiter.complete();
            return;
        }
        debug!(
            event = events::OPERATOR_SWITCHED,
            component = COMPONENT,
            "source completed empty; switching to fallback"
        );
        self.fallback
            .subscribe(Arc::new(Relay::new(self.arbiter.clone())));
    }
}

#[cfg(test)]
mod tests {
    use crate::error::FlowError;
    use crate::flux::Flux;
    use crate::protocol::UNBOUNDED;
    use crate::test_support::RecordingSubscriber;
    use std::sync::Arc;

    #[test]
    fn empty_source_switches_to_fallback() {
        let recorder = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        Flux::<i64>::empty()
            .switch_if_empty(Flux::range(7, 2))
            .subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![7, 8]);
        assert!(recorder.is_completed());
    }

    #[test]
    fn default_value_only_for_empty_sources() {
        let empty = Arc::new(RecordingSubscriber::new(UNBOUNDED));
        let full = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        Flux::<&str>::empty().default_if_empty("none").subscribe(empty.clone());
        Flux::just("some").default_if_empty("none").subscribe(full.clone());

        assert_eq!(empty.items(), vec!["none"]);
        assert_eq!(full.items(), vec!["some"]);
        assert_eq!(full.terminal_count(), 1);
    }

    #[test]
    fn errors_are_not_treated_as_empty() {
        let recorder = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        Flux::<u8>::error(FlowError::producer("boom"))
            .default_if_empty(1)
            .subscribe(recorder.clone());

        assert!(recorder.items().is_empty());
        assert!(recorder.error().is_some());
    }
}
