//! Boundary that re-dispatches delivery onto a scheduler.

use crate::error::FlowError;
use crate::flux::Flux;
use crate::protocol::downstream::DownstreamCell;
use crate::protocol::drain::DrainGate;
use crate::protocol::{Publisher, Subscriber, Subscription, Terminal};
use crate::scheduling::Scheduler;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

const COMPONENT: &str = "publish_on";

pub(crate) struct PublishOnPublisher<T> {
    source: Flux<T>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T> PublishOnPublisher<T> {
    pub(crate) fn new(source: Flux<T>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { source, scheduler }
    }
}

impl<T: Send + 'static> Publisher<T> for PublishOnPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let hop = Arc::new(Hop {
            scheduler: self.scheduler.clone(),
            signals: Mutex::new(VecDeque::new()),
            gate: DrainGate::new(),
            cancelled: AtomicBool::new(false),
            downstream: DownstreamCell::new(subscriber),
        });
        self.source.subscribe(Arc::new(HopSubscriber { hop }));
    }
}

enum Signal<T> {
    Next(T),
    Done(Terminal),
}

/// Signals queued for the scheduler, drained by at most one task at a time.
struct Hop<T> {
    scheduler: Arc<dyn Scheduler>,
    signals: Mutex<VecDeque<Signal<T>>>,
    gate: DrainGate,
    cancelled: AtomicBool,
    downstream: DownstreamCell<T>,
}

impl<T: Send + 'static> Hop<T> {
    fn enqueue(self: &Arc<Self>, signal: Signal<T>) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut signals) = self.signals.lock() {
            signals.push_back(signal);
        }
        if self.gate.enter() {
            let hop = self.clone();
            self.scheduler.schedule(Box::new(move || hop.drain_on_scheduler()));
        }
    }

    fn drain_on_scheduler(&self) {
        let mut missed = 1;
        loop {
            self.flush();
            missed = self.gate.leave(missed);
            if missed == 0 {
                return;
            }
        }
    }

    fn flush(&self) {
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                if let Ok(mut signals) = self.signals.lock() {
                    signals.clear();
                }
                return;
            }
            let next = self.signals.lock().ok().and_then(|mut signals| signals.pop_front());
            match next {
                Some(Signal::Next(item)) => {
                    self.downstream.on_next(item);
                }
                Some(Signal::Done(terminal)) => {
                    trace!(
                        component = COMPONENT,
                        scheduler = self.scheduler.name(),
                        terminal = ?terminal,
                        "terminal delivered across boundary"
                    );
                    match terminal {
                        Terminal::Complete => self.downstream.on_complete(),
                        Terminal::Error(err) => self.downstream.on_error(err),
                    };
                }
                None => return,
            }
        }
    }
}

struct HopSubscriber<T> {
    hop: Arc<Hop<T>>,
}

impl<T: Send + 'static> Subscriber<T> for HopSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.hop.downstream.on_subscribe(Arc::new(HopSubscription {
            hop: self.hop.clone(),
            upstream: subscription,
        }));
    }

    fn on_next(&self, item: T) {
        self.hop.enqueue(Signal::Next(item));
    }

    fn on_error(&self, error: FlowError) {
        self.hop.enqueue(Signal::Done(Terminal::Error(error)));
    }

    fn on_complete(&self) {
        self.hop.enqueue(Signal::Done(Terminal::Complete));
    }
}

struct HopSubscription<T> {
    hop: Arc<Hop<T>>,
    upstream: Arc<dyn Subscription>,
}

impl<T: Send + 'static> Subscription for HopSubscription<T> {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        if !self.hop.cancelled.swap(true, Ordering::AcqRel) {
            self.hop.downstream.release();
            self.upstream.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::flux::Flux;
    use crate::protocol::UNBOUNDED;
    use crate::scheduling::{Scheduler, WorkerThread};
    use crate::test_support::RecordingSubscriber;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn delivery_moves_to_the_scheduler_in_order() {
        let worker: Arc<dyn Scheduler> =
            Arc::new(WorkerThread::spawn("delivery-worker").expect("worker"));
        let recorder = Arc::new(RecordingSubscriber::new(UNBOUNDED));

        Flux::range(1, 100)
            .publish_on(worker)
            .subscribe(recorder.clone());

        wait_for(|| recorder.is_completed());
        assert_eq!(recorder.items(), (1..=100).collect::<Vec<i64>>());
        assert!(recorder
            .threads()
            .iter()
            .all(|name| name == "delivery-worker"));
    }

    #[test]
    fn demand_still_gates_the_source() {
        let worker: Arc<dyn Scheduler> =
            Arc::new(WorkerThread::spawn("gated-worker").expect("worker"));
        let recorder = Arc::new(RecordingSubscriber::new(3));

        Flux::range(1, 100)
            .publish_on(worker)
            .subscribe(recorder.clone());

        wait_for(|| recorder.items().len() == 3);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(recorder.items(), vec![1, 2, 3]);
        assert!(!recorder.is_completed());
    }
}
