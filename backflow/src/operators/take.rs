//! Limits a source to its first `n` items.

use crate::error::FlowError;
use crate::flux::Flux;
use crate::protocol::downstream::DownstreamCell;
use crate::protocol::{NoopSubscription, Publisher, Subscriber, Subscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) struct TakePublisher<T> {
    source: Flux<T>,
    limit: u64,
}

impl<T> TakePublisher<T> {
    pub(crate) fn new(source: Flux<T>, limit: u64) -> Self {
        Self { source, limit }
    }
}

impl<T: Send + 'static> Publisher<T> for TakePublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let state = Arc::new(TakeState {
            limit: self.limit,
            remaining: AtomicU64::new(self.limit),
            granted: AtomicU64::new(0),
            upstream: Mutex::new(None),
            downstream: DownstreamCell::new(subscriber),
        });
        self.source.subscribe(Arc::new(TakeSubscriber { state }));
    }
}

struct TakeState<T> {
    limit: u64,
    remaining: AtomicU64,
    /// Demand forwarded upstream so far; never exceeds `limit`.
    granted: AtomicU64,
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
    downstream: DownstreamCell<T>,
}

impl<T> TakeState<T> {
    fn cancel_upstream(&self) {
        let upstream = self.upstream.lock().ok().and_then(|mut upstream| upstream.take());
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }

    /// Clamps `n` so the total forwarded stays within `limit`.
    fn grant(&self, n: u64) -> u64 {
        let mut current = self.granted.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(n).min(self.limit);
            if next == current {
                return 0;
            }
            match self.granted.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next - current,
                Err(actual) => current = actual,
            }
        }
    }
}

struct TakeSubscriber<T> {
    state: Arc<TakeState<T>>,
}

impl<T: Send + 'static> Subscriber<T> for TakeSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.state.limit == 0 {
            subscription.cancel();
            self.state
                .downstream
                .on_subscribe(Arc::new(NoopSubscription));
            self.state.downstream.on_complete();
            return;
        }
        if let Ok(mut upstream) = self.state.upstream.lock() {
            *upstream = Some(subscription);
        }
        self.state.downstream.on_subscribe(Arc::new(TakeSubscription {
            state: self.state.clone(),
        }));
    }

    fn on_next(&self, item: T) {
        let before = self
            .state
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1));
        match before {
            Ok(1) => {
                self.state.downstream.on_next(item);
                self.state.cancel_upstream();
                self.state.downstream.on_complete();
            }
            Ok(_) => {
                self.state.downstream.on_next(item);
            }
            Err(_) => {}
        }
    }

    fn on_error(&self, error: FlowError) {
        if self.state.remaining.load(Ordering::Acquire) > 0 {
            self.state.downstream.on_error(error);
        }
    }

    fn on_complete(&self) {
        if self.state.remaining.load(Ordering::Acquire) > 0 {
            self.state.downstream.on_complete();
        }
    }
}

struct TakeSubscription<T> {
    state: Arc<TakeState<T>>,
}

impl<T: Send + 'static> Subscription for TakeSubscription<T> {
    fn request(&self, n: u64) {
        let upstream = self.state.upstream.lock().ok().and_then(|upstream| upstream.clone());
        let Some(upstream) = upstream else {
            return;
        };
        if n == 0 {
            upstream.request(0);
            return;
        }
        let granted = self.state.grant(n);
        if granted > 0 {
            upstream.request(granted);
        }
    }

    fn cancel(&self) {
        self.state.downstream.release();
        self.state.cancel_upstream();
    }
}
