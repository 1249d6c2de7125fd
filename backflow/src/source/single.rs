//! Fixed and single-value sources.

use crate::error::FlowError;
use crate::flux::Flux;
use crate::protocol::{NoopSubscription, Publisher, Subscriber};
use crate::source::pull::{Emission, PullSource};
use std::iter::Peekable;
use std::sync::Arc;

pub(crate) struct JustSource<T> {
    value: T,
}

impl<T> JustSource<T> {
    pub(crate) fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Clone + Send + Sync + 'static> PullSource for JustSource<T> {
    type State = ();
    type Item = T;

    fn open(&self) -> Result<(), FlowError> {
        Ok(())
    }

    fn step(&self, state: ()) -> ((), Emission<T>) {
        (state, Emission::Last(self.value.clone()))
    }
}

/// Replays a cloned iterable for every subscriber.
pub(crate) struct IterSource<I> {
    iterable: I,
}

impl<I> IterSource<I> {
    pub(crate) fn new(iterable: I) -> Self {
        Self { iterable }
    }
}

impl<I> PullSource for IterSource<I>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    type State = Peekable<I::IntoIter>;
    type Item = I::Item;

    fn open(&self) -> Result<Self::State, FlowError> {
        Ok(self.iterable.clone().into_iter().peekable())
    }

    fn step(&self, mut state: Self::State) -> (Self::State, Emission<I::Item>) {
        match state.next() {
            None => (state, Emission::Complete),
            Some(item) => {
                if state.peek().is_none() {
                    (state, Emission::Last(item))
                } else {
                    (state, Emission::Item(item))
                }
            }
        }
    }
}

pub(crate) struct RangeSource {
    start: i64,
    count: u64,
}

impl RangeSource {
    pub(crate) fn new(start: i64, count: u64) -> Self {
        Self { start, count }
    }
}

impl PullSource for RangeSource {
    type State = u64;
    type Item = i64;

    fn open(&self) -> Result<u64, FlowError> {
        if self.count > 0 && self.start.checked_add_unsigned(self.count - 1).is_none() {
            return Err(FlowError::producer(format!(
                "range({}, {}) overflows i64",
                self.start, self.count
            )));
        }
        Ok(0)
    }

    fn step(&self, index: u64) -> (u64, Emission<i64>) {
        if index >= self.count {
            return (index, Emission::Complete);
        }
        let value = self.start.wrapping_add_unsigned(index);
        if index + 1 == self.count {
            (index + 1, Emission::Last(value))
        } else {
            (index + 1, Emission::Item(value))
        }
    }
}

/// Computes its single value at the first unit of demand.
pub(crate) struct SupplierSource<F> {
    supplier: F,
}

impl<F> SupplierSource<F> {
    pub(crate) fn new(supplier: F) -> Self {
        Self { supplier }
    }
}

impl<T, F> PullSource for SupplierSource<F>
where
    T: Send + 'static,
    F: Fn() -> Result<T, FlowError> + Send + Sync + 'static,
{
    type State = ();
    type Item = T;

    fn open(&self) -> Result<(), FlowError> {
        Ok(())
    }

    fn step(&self, state: ()) -> ((), Emission<T>) {
        match (self.supplier)() {
            Ok(value) => (state, Emission::Last(value)),
            Err(err) => (state, Emission::Error(err)),
        }
    }
}

/// Terminates on subscribe; terminal signals need no demand.
pub(crate) struct EmptyPublisher;

impl<T> Publisher<T> for EmptyPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber.on_subscribe(Arc::new(NoopSubscription));
        subscriber.on_complete();
    }
}

/// Signals `on_subscribe` and nothing else.
pub(crate) struct NeverPublisher;

impl<T> Publisher<T> for NeverPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber.on_subscribe(Arc::new(NoopSubscription));
    }
}

pub(crate) struct ErrorPublisher {
    error: FlowError,
}

impl ErrorPublisher {
    pub(crate) fn new(error: FlowError) -> Self {
        Self { error }
    }
}

impl<T> Publisher<T> for ErrorPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber.on_subscribe(Arc::new(NoopSubscription));
        subscriber.on_error(self.error.clone());
    }
}

/// Builds a fresh source for every subscriber.
pub(crate) struct DeferPublisher<F> {
    factory: F,
}

impl<F> DeferPublisher<F> {
    pub(crate) fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<T, F> Publisher<T> for DeferPublisher<F>
where
    T: Send + 'static,
    F: Fn() -> Flux<T> + Send + Sync,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        (self.factory)().subscribe(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::{EmptyPublisher, IterSource, JustSource, RangeSource, SupplierSource};
    use crate::error::{ErrorKind, FlowError};
    use crate::protocol::{Publisher, UNBOUNDED};
    use crate::source::pull::PullPublisher;
    use crate::test_support::RecordingSubscriber;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn just_completes_with_its_first_item() {
        let publisher = PullPublisher::new(JustSource::new("hello"));
        let recorder = Arc::new(RecordingSubscriber::new(1));

        publisher.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec!["hello"]);
        assert!(recorder.is_completed());
    }

    #[test]
    fn iter_source_restarts_for_each_subscriber() {
        let publisher = PullPublisher::new(IterSource::new(vec![1, 2, 3]));
        let first = Arc::new(RecordingSubscriber::new(UNBOUNDED));
        let second = Arc::new(RecordingSubscriber::new(2));

        publisher.subscribe(first.clone());
        publisher.subscribe(second.clone());

        assert_eq!(first.items(), vec![1, 2, 3]);
        assert!(first.is_completed());
        assert_eq!(second.items(), vec![1, 2]);
        assert!(!second.is_completed());
    }

    #[test]
    fn empty_iterable_completes_on_first_demand() {
        let publisher = PullPublisher::new(IterSource::new(Vec::<u8>::new()));
        let recorder = Arc::new(RecordingSubscriber::new(1));

        publisher.subscribe(recorder.clone());

        assert!(recorder.items().is_empty());
        assert!(recorder.is_completed());
    }

    #[test]
    fn range_counts_from_start() {
        let publisher = PullPublisher::new(RangeSource::new(-2, 4));
        let recorder = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        publisher.subscribe(recorder.clone());

        assert_eq!(recorder.items(), vec![-2, -1, 0, 1]);
        assert!(recorder.is_completed());
    }

    #[test]
    fn overflowing_range_fails_at_open() {
        let publisher = PullPublisher::new(RangeSource::new(i64::MAX, 2));
        let recorder = Arc::new(RecordingSubscriber::<i64>::new(1));

        publisher.subscribe(recorder.clone());

        assert_eq!(recorder.error().map(|e| e.kind()), Some(ErrorKind::Producer));
    }

    #[test]
    fn supplier_waits_for_demand() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let publisher = PullPublisher::new(SupplierSource::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FlowError>(5)
        }));
        let recorder = Arc::new(RecordingSubscriber::new(0));

        publisher.subscribe(recorder.clone());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        recorder.request(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.items(), vec![5]);
    }

    #[test]
    fn empty_completes_without_demand() {
        let recorder = Arc::new(RecordingSubscriber::<u8>::new(0));

        Publisher::<u8>::subscribe(&EmptyPublisher, recorder.clone());

        assert_eq!(recorder.subscribed_count(), 1);
        assert!(recorder.is_completed());
    }
}
