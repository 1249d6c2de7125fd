//! Closure-backed subscriber and the handle that cancels it.

use crate::error::FlowError;
use crate::protocol::{Subscriber, Subscription, UNBOUNDED};
use std::sync::{Arc, Mutex};

enum Link {
    Pending,
    Active(Arc<dyn Subscription>),
    Disposed,
}

/// Shared between a [`Disposable`] and the subscriber it controls; disposal
/// may arrive before the subscription does.
pub(crate) struct SubscriptionLink {
    state: Mutex<Link>,
}

impl SubscriptionLink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Link::Pending),
        })
    }

    /// Records `subscription`; returns `false` (after cancelling it) when
    /// the link was already disposed.
    pub(crate) fn attach(&self, subscription: Arc<dyn Subscription>) -> bool {
        let disposed = match self.state.lock() {
            Ok(mut state) => match *state {
                Link::Disposed => true,
                _ => {
                    *state = Link::Active(subscription.clone());
                    false
                }
            },
            Err(_) => true,
        };
        if disposed {
            subscription.cancel();
        }
        !disposed
    }

    pub(crate) fn current(&self) -> Option<Arc<dyn Subscription>> {
        match self.state.lock() {
            Ok(state) => match &*state {
                Link::Active(subscription) => Some(subscription.clone()),
                _ => None,
            },
            Err(_) => None,
        }
    }

    /// Drops the subscription reference once the flow has terminated.
    pub(crate) fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Link::Active(_) = *state {
                *state = Link::Pending;
            }
        }
    }

    pub(crate) fn dispose(&self) {
        let previous = match self.state.lock() {
            Ok(mut state) => std::mem::replace(&mut *state, Link::Disposed),
            Err(_) => return,
        };
        if let Link::Active(subscription) = previous {
            subscription.cancel();
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(*state, Link::Disposed))
            .unwrap_or(true)
    }
}

/// Cancels the subscription created by `Flux::subscribe_with`.
///
/// Dropping the handle does not cancel; call [`Disposable::dispose`].
pub struct Disposable {
    link: Arc<SubscriptionLink>,
}

impl Disposable {
    pub(crate) fn new(link: Arc<SubscriptionLink>) -> Self {
        Self { link }
    }

    pub fn dispose(&self) {
        self.link.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.link.is_disposed()
    }
}

type NextFn<T> = Box<dyn Fn(T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(FlowError) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;

/// Requests everything on subscribe and hands each signal to a closure.
pub(crate) struct LambdaSubscriber<T> {
    link: Arc<SubscriptionLink>,
    on_next: NextFn<T>,
    on_error: ErrorFn,
    on_complete: CompleteFn,
}

impl<T> LambdaSubscriber<T> {
    pub(crate) fn new<N, E, C>(
        link: Arc<SubscriptionLink>,
        on_next: N,
        on_error: E,
        on_complete: C,
    ) -> Self
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(FlowError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        Self {
            link,
            on_next: Box::new(on_next),
            on_error: Box::new(on_error),
            on_complete: Box::new(on_complete),
        }
    }
}

impl<T> Subscriber<T> for LambdaSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.link.attach(subscription.clone()) {
            subscription.request(UNBOUNDED);
        }
    }

    fn on_next(&self, item: T) {
        (self.on_next)(item);
    }

    fn on_error(&self, error: FlowError) {
        self.link.finish();
        (self.on_error)(error);
    }

    fn on_complete(&self) {
        self.link.finish();
        (self.on_complete)();
    }
}
