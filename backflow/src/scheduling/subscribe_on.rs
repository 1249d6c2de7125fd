//! Boundary that re-dispatches subscription and demand onto a scheduler.

use crate::error::FlowError;
use crate::flux::Flux;
use crate::protocol::{Publisher, Subscriber, Subscription};
use crate::scheduling::Scheduler;
use std::sync::Arc;
use tracing::trace;

const COMPONENT: &str = "subscribe_on";

pub(crate) struct SubscribeOnPublisher<T> {
    source: Flux<T>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T> SubscribeOnPublisher<T> {
    pub(crate) fn new(source: Flux<T>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { source, scheduler }
    }
}

impl<T: Send + 'static> Publisher<T> for SubscribeOnPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let source = self.source.clone();
        let scheduler = self.scheduler.clone();
        trace!(
            component = COMPONENT,
            scheduler = scheduler.name(),
            "subscription handed to scheduler"
        );
        self.scheduler.schedule(Box::new(move || {
            source.subscribe(Arc::new(SubscribeOnSubscriber {
                downstream: subscriber,
                scheduler,
            }));
        }));
    }
}

struct SubscribeOnSubscriber<T> {
    downstream: Arc<dyn Subscriber<T>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T: Send + 'static> Subscriber<T> for SubscribeOnSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.downstream
            .on_subscribe(Arc::new(SubscribeOnSubscription {
                upstream: subscription,
                scheduler: self.scheduler.clone(),
            }));
    }

    fn on_next(&self, item: T) {
        self.downstream.on_next(item);
    }

    fn on_error(&self, error: FlowError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}

struct SubscribeOnSubscription {
    upstream: Arc<dyn Subscription>,
    scheduler: Arc<dyn Scheduler>,
}

impl Subscription for SubscribeOnSubscription {
    fn request(&self, n: u64) {
        let upstream = self.upstream.clone();
        self.scheduler.schedule(Box::new(move || upstream.request(n)));
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }
}

#[cfg(test)]
mod tests {
    use crate::flux::Flux;
    use crate::protocol::UNBOUNDED;
    use crate::scheduling::{Scheduler, WorkerThread};
    use crate::test_support::RecordingSubscriber;
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    #[test]
    fn nearest_boundary_to_the_source_runs_production() {
        let inner: Arc<dyn Scheduler> = Arc::new(WorkerThread::spawn("inner-worker").expect("inner"));
        let outer: Arc<dyn Scheduler> = Arc::new(WorkerThread::spawn("outer-worker").expect("outer"));
        let (tx, rx) = mpsc::channel();

        let flux = Flux::generate(
            move || {
                tx.send(std::thread::current().name().map(str::to_string))
                    .expect("send");
                Ok(0u32)
            },
            |n| {
                if n < 3 {
                    (n + 1, crate::source::Emission::Item(n))
                } else {
                    (n, crate::source::Emission::Complete)
                }
            },
            |_| Ok(()),
        )
        .subscribe_on(inner)
        .subscribe_on(outer);
        let recorder = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        flux.subscribe(recorder.clone());

        let opened_on = rx.recv_timeout(Duration::from_secs(2)).expect("source opened");
        assert_eq!(opened_on.as_deref(), Some("inner-worker"));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !recorder.is_completed() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(recorder.items(), vec![0, 1, 2]);
        assert!(recorder
            .threads()
            .iter()
            .all(|name| name == "inner-worker"));
    }
}
