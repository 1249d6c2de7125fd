//! Error recovery: substitute a fallback source for a matching error.

use crate::error::FlowError;
use crate::flux::Flux;
use crate::observability::events;
use crate::operators::arbiter::{Relay, SwitchArbiter};
use crate::protocol::{Publisher, Subscriber, Subscription};
use std::sync::Arc;
use tracing::debug;

const COMPONENT: &str = "recover";

/// Maps an error to the source that replaces the failed one, or `None` to
/// let the error through.
pub(crate) type RecoveryRule<T> = Arc<dyn Fn(&FlowError) -> Option<Flux<T>> + Send + Sync>;

pub(crate) struct RecoverPublisher<T> {
    source: Flux<T>,
    rule: RecoveryRule<T>,
}

impl<T> RecoverPublisher<T> {
    pub(crate) fn new(source: Flux<T>, rule: RecoveryRule<T>) -> Self {
        Self { source, rule }
    }
}

impl<T: Send + 'static> Publisher<T> for RecoverPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let arbiter = SwitchArbiter::new(subscriber);
        arbiter.start();
        self.source.subscribe(Arc::new(RecoverSubscriber {
            arbiter,
            rule: self.rule.clone(),
        }));
    }
}

struct RecoverSubscriber<T> {
    arbiter: Arc<SwitchArbiter<T>>,
    rule: RecoveryRule<T>,
}

impl<T: Send + 'static> Subscriber<T> for RecoverSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.arbiter.set_upstream(subscription);
    }

    fn on_next(&self, item: T) {
        self.arbiter.emit(item);
    }

    fn on_error(&self, error: FlowError) {
        match (self.rule)(&error) {
            Some(fallback) => {
                debug!(
                    event = events::OPERATOR_RECOVERED,
                    component = COMPONENT,
                    kind = %error.kind(),
                    err = %error,
                    "error replaced by fallback"
                );
                fallback.subscribe(Arc::new(Relay::new(self.arbiter.clone())));
            }
            None => self.arbiter.fail(error),
        }
    }

    fn on_complete(&self) {
        self.arbiter.complete();
    }
}

#[cfg(test)]
mod tests {
    use crate::error::FlowError;
    use crate::flux::Flux;
    use crate::protocol::UNBOUNDED;
    use crate::test_support::RecordingSubscriber;
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("type x")]
    struct TypeX;

    fn failing_after(items: Vec<&'static str>, error: FlowError) -> Flux<&'static str> {
        Flux::create(move |sink| {
            for item in items.iter() {
                sink.next(*item);
            }
            sink.error(error.clone());
        })
    }

    #[test]
    fn return_value_replaces_error_after_items() {
        let recorder = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        failing_after(vec!["a", "b"], FlowError::producer("boom"))
            .on_error_return("fallback")
            .subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec!["a", "b", "fallback"]);
        assert!(recorder.is_completed());
        assert!(recorder.error().is_none());
    }

    #[test]
    fn innermost_matching_rule_wins() {
        let recorder = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        failing_after(vec![], FlowError::producer("not x"))
            .on_error_return_if(|err| err.is_cause::<TypeX>(), "valueA")
            .on_error_return("valueB")
            .subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec!["valueB"]);
    }

    #[test]
    fn typed_rule_matches_its_cause() {
        let recorder = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        failing_after(vec![], FlowError::from_cause(TypeX))
            .on_error_return_if(|err| err.is_cause::<TypeX>(), "valueA")
            .on_error_return("valueB")
            .subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec!["valueA"]);
    }

    #[test]
    fn unmatched_error_reaches_subscriber() {
        let recorder = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        failing_after(vec!["a"], FlowError::producer("boom"))
            .on_error_return_if(|err| err.is_cause::<TypeX>(), "never")
            .subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec!["a"]);
        assert_eq!(recorder.error().map(|e| e.message().to_string()), Some("boom".to_string()));
    }

    #[test]
    fn resume_respects_remaining_demand() {
        let recorder = Arc::new(RecordingSubscriber::new(3));

        failing_after(vec!["a"], FlowError::producer("boom"))
            .on_error_resume(|_| Flux::from_iter(vec!["x", "y", "z"]))
            .subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec!["a", "x", "y"]);
        assert!(!recorder.is_completed());
    }
}
