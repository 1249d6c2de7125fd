//! Per-signal timeout, raced against the primary source.

use crate::error::FlowError;
use crate::flux::Flux;
use crate::observability::events;
use crate::operators::arbiter::{Relay, SwitchArbiter};
use crate::protocol::{Publisher, Subscriber, Subscription};
use crate::scheduling::Scheduler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

const COMPONENT: &str = "timeout";

/// Index value once the race is decided for good.
const SETTLED: u64 = u64::MAX;

pub(crate) struct TimeoutPublisher<T> {
    source: Flux<T>,
    window: Duration,
    fallback: Option<Flux<T>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T> TimeoutPublisher<T> {
    pub(crate) fn new(
        source: Flux<T>,
        window: Duration,
        fallback: Option<Flux<T>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            source,
            window,
            fallback,
            scheduler,
        }
    }
}

impl<T: Send + 'static> Publisher<T> for TimeoutPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let arbiter = SwitchArbiter::new(subscriber);
        let race = Arc::new(TimeoutRace {
            id: Uuid::new_v4(),
            arbiter,
            index: AtomicU64::new(0),
            window_start: Mutex::new(Instant::now()),
            window: self.window,
            fallback: self.fallback.clone(),
            scheduler: self.scheduler.clone(),
        });
        race.arbiter.start();
        race.arm(self.window);
        self.source.subscribe(Arc::new(PrimarySubscriber { race }));
    }
}

/// Each primary signal and the timer compete for the current index; only
/// one of them moves it, so the timer never fires over a delivered item.
///
/// One timer is pending per race. An item only restarts the window; the
/// timer notices on wake-up and sleeps again for whatever is left of it.
struct TimeoutRace<T> {
    id: Uuid,
    arbiter: Arc<SwitchArbiter<T>>,
    index: AtomicU64,
    /// When the current index was claimed. Items update it together with
    /// the index.
    window_start: Mutex<Instant>,
    window: Duration,
    fallback: Option<Flux<T>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T: Send + 'static> TimeoutRace<T> {
    /// The timer keeps the race alive until it fires; a silent source may
    /// hold no reference to its subscriber at all.
    fn arm(self: &Arc<Self>, delay: Duration) {
        let race = self.clone();
        self.scheduler.schedule_after(delay, Box::new(move || race.wake()));
    }

    fn wake(self: &Arc<Self>) {
        let expired = {
            let Ok(started) = self.window_start.lock() else {
                return;
            };
            let index = self.index.load(Ordering::Acquire);
            if index == SETTLED {
                return;
            }
            let elapsed = started.elapsed();
            if elapsed < self.window {
                Err(self.window - elapsed)
            } else {
                Ok(self.claim(index, SETTLED))
            }
        };
        match expired {
            Ok(true) => self.fire(),
            Ok(false) => {}
            Err(remaining) => self.arm(remaining),
        }
    }

    /// Moves to the next index for a delivered item and restarts the window.
    fn advance(&self) -> bool {
        let Ok(mut started) = self.window_start.lock() else {
            return false;
        };
        let index = self.index.load(Ordering::Acquire);
        if !self.claim(index, index + 1) {
            return false;
        }
        *started = Instant::now();
        true
    }

    /// Settles the race for a terminal signal from the primary.
    fn settle(&self) -> bool {
        let index = self.index.load(Ordering::Acquire);
        self.claim(index, SETTLED)
    }

    fn claim(&self, index: u64, next: u64) -> bool {
        index != SETTLED
            && self
                .index
                .compare_exchange(index, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    fn fire(&self) {
        info!(
            event = events::OPERATOR_TIMED_OUT,
            component = COMPONENT,
            subscription_id = %self.id,
            window_ms = self.window.as_millis() as u64,
            fallback = self.fallback.is_some(),
            "no signal within the timeout window"
        );
        self.arbiter.cancel_upstream();
        match &self.fallback {
            Some(fallback) => fallback.subscribe(Arc::new(Relay::new(self.arbiter.clone()))),
            None => self.arbiter.fail(FlowError::timeout(format!(
                "no signal within {:?}",
                self.window
            ))),
        }
    }
}

struct PrimarySubscriber<T> {
    race: Arc<TimeoutRace<T>>,
}

impl<T: Send + 'static> Subscriber<T> for PrimarySubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let race = &self.race;
        race.arbiter
            .set_upstream_unless(subscription, || race.index.load(Ordering::Acquire) == SETTLED);
    }

    fn on_next(&self, item: T) {
        if self.race.advance() {
            self.race.arbiter.emit(item);
        }
    }

    fn on_error(&self, error: FlowError) {
        if self.race.settle() {
            self.race.arbiter.fail(error);
        }
    }

    fn on_complete(&self) {
        if self.race.settle() {
            self.race.arbiter.complete();
        }
    }
}
