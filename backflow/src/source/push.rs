//! Producer-driven sources: a sink fed at the producer's pace and a FIFO that
//! absorbs whatever exceeds current demand.

use crate::config::PushConfig;
use crate::error::FlowError;
use crate::observability::{events, fields};
use crate::protocol::demand::DemandLedger;
use crate::protocol::downstream::DownstreamCell;
use crate::protocol::drain::DrainGate;
use crate::protocol::{Publisher, Subscriber, Subscription, Terminal};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};
use uuid::Uuid;

const COMPONENT: &str = "push_source";

/// Queue policy for a push source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// `None` buffers without limit.
    pub queue_capacity: Option<usize>,
}

impl PushOptions {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            queue_capacity: Some(capacity),
        }
    }

    pub fn from_config(config: &PushConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
        }
    }
}

type Producer<T> = Arc<dyn Fn(FluxSink<T>) + Send + Sync>;
type RequestObserver = Arc<dyn Fn(u64) + Send + Sync>;
type DisposeHook = Box<dyn FnOnce() + Send>;

pub(crate) struct PushPublisher<T> {
    options: PushOptions,
    producer: Producer<T>,
}

impl<T: Send + 'static> PushPublisher<T> {
    pub(crate) fn new<F>(options: PushOptions, producer: F) -> Self
    where
        F: Fn(FluxSink<T>) + Send + Sync + 'static,
    {
        Self {
            options,
            producer: Arc::new(producer),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for PushPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let subscription = Arc::new(PushSubscription {
            id: Uuid::new_v4(),
            options: self.options,
            ledger: DemandLedger::new(),
            gate: DrainGate::new(),
            state: Mutex::new(PushState {
                queue: VecDeque::new(),
                terminal: None,
                violation: None,
                done: false,
            }),
            downstream: DownstreamCell::new(subscriber),
            request_observers: Mutex::new(Vec::new()),
            dispose_hooks: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });
        subscription.downstream.on_subscribe(subscription.clone());

        debug!(
            event = events::PUSH_PRODUCER_STARTED,
            component = COMPONENT,
            subscription_id = %subscription.id,
            queue_capacity = ?self.options.queue_capacity,
            "push producer started"
        );
        (self.producer)(FluxSink {
            inner: subscription,
        });
    }
}

/// Handle given to a push producer.
///
/// Clonable and usable from any thread. Pushes after a terminal signal or
/// after cancellation are ignored.
pub struct FluxSink<T> {
    inner: Arc<PushSubscription<T>>,
}

impl<T> Clone for FluxSink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> FluxSink<T> {
    pub fn next(&self, item: T) {
        self.inner.push(item);
    }

    pub fn complete(&self) {
        self.inner.finish(Terminal::Complete);
    }

    pub fn error(&self, error: FlowError) {
        self.inner.finish(Terminal::Error(error));
    }

    /// Demand granted but not yet satisfied.
    pub fn requested(&self) -> u64 {
        self.inner.ledger.outstanding()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.ledger.is_cancelled()
    }

    /// Registers a demand observer. It is called with every later `request`
    /// amount, and immediately with any demand already outstanding.
    pub fn on_request<F>(&self, observer: F) -> &Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let observer: RequestObserver = Arc::new(observer);
        // Registration and the backlog read share the lock `request` adds
        // demand under, so each request reaches the observer exactly once.
        let outstanding = match self.inner.request_observers.lock() {
            Ok(mut observers) => {
                observers.push(observer.clone());
                self.inner.ledger.outstanding()
            }
            Err(_) => 0,
        };
        if outstanding > 0 && !self.inner.ledger.is_cancelled() {
            observer(outstanding);
        }
        self
    }

    /// Registers cleanup run exactly once, at the terminal signal or on
    /// cancellation. Runs at once if the subscription is already over.
    pub fn on_dispose<F>(&self, hook: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.disposed.load(Ordering::Acquire) {
            hook();
            return self;
        }
        let late = match self.inner.dispose_hooks.lock() {
            Ok(mut hooks) => {
                if self.inner.disposed.load(Ordering::Acquire) {
                    Some(hook)
                } else {
                    hooks.push(Box::new(hook));
                    None
                }
            }
            Err(_) => Some(hook),
        };
        if let Some(hook) = late {
            hook();
        }
        self
    }
}

struct PushState<T> {
    queue: VecDeque<T>,
    terminal: Option<Terminal>,
    violation: Option<FlowError>,
    done: bool,
}

impl<T> PushState<T> {
    fn accepts_signals(&self) -> bool {
        !self.done && self.terminal.is_none()
    }
}

struct PushSubscription<T> {
    id: Uuid,
    options: PushOptions,
    ledger: DemandLedger,
    gate: DrainGate,
    state: Mutex<PushState<T>>,
    downstream: DownstreamCell<T>,
    request_observers: Mutex<Vec<RequestObserver>>,
    dispose_hooks: Mutex<Vec<DisposeHook>>,
    disposed: AtomicBool,
}

impl<T: Send + 'static> PushSubscription<T> {
    fn push(&self, item: T) {
        if self.ledger.is_cancelled() {
            trace!(
                event = events::PUSH_ITEM_DROPPED,
                component = COMPONENT,
                subscription_id = %self.id,
                reason = "cancelled",
                "push after cancellation ignored"
            );
            return;
        }
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if !state.accepts_signals() {
                trace!(
                    event = events::PUSH_ITEM_DROPPED,
                    component = COMPONENT,
                    subscription_id = %self.id,
                    reason = "terminated",
                    "push after terminal signal ignored"
                );
                return;
            }
            match self.options.queue_capacity {
                Some(capacity) if state.queue.len() >= capacity => {
                    warn!(
                        event = events::PUSH_QUEUE_OVERFLOW,
                        component = COMPONENT,
                        subscription_id = %self.id,
                        capacity,
                        "push queue overflow"
                    );
                    state.queue.clear();
                    state.terminal = Some(Terminal::Error(FlowError::producer(format!(
                        "push queue overflow (capacity {capacity})"
                    ))));
                }
                _ => state.queue.push_back(item),
            }
        }
        self.drain();
    }

    fn finish(&self, terminal: Terminal) {
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if !state.accepts_signals() {
                return;
            }
            state.terminal = Some(terminal);
        }
        self.drain();
    }

    fn drain(&self) {
        self.gate.drain_with(|| self.drain_pass());
    }

    fn drain_pass(&self) -> bool {
        loop {
            let Ok(mut state) = self.state.lock() else {
                return false;
            };

            if let Some(violation) = state.violation.take() {
                state.done = true;
                state.queue.clear();
                drop(state);
                self.ledger.cancel();
                self.downstream.on_error(violation);
                self.dispose();
                return false;
            }

            if self.ledger.is_cancelled() {
                state.done = true;
                let discarded = state.queue.len();
                state.queue.clear();
                drop(state);
                if discarded > 0 {
                    trace!(
                        event = events::PUSH_ITEM_DROPPED,
                        component = COMPONENT,
                        subscription_id = %self.id,
                        discarded,
                        "queued items discarded on cancellation"
                    );
                }
                self.downstream.release();
                self.dispose();
                return false;
            }

            if self.ledger.outstanding() > 0 {
                if let Some(item) = state.queue.pop_front() {
                    drop(state);
                    self.ledger.produced(1);
                    self.downstream.on_next(item);
                    continue;
                }
            }

            if state.queue.is_empty() {
                if let Some(terminal) = state.terminal.take() {
                    state.done = true;
                    drop(state);
                    debug!(
                        event = events::SUBSCRIPTION_TERMINATED,
                        component = COMPONENT,
                        subscription_id = %self.id,
                        delivered = self.ledger.delivered(),
                        terminal = ?terminal,
                        "push subscription terminated"
                    );
                    match terminal {
                        Terminal::Complete => self.downstream.on_complete(),
                        Terminal::Error(err) => self.downstream.on_error(err),
                    };
                    self.dispose();
                    return false;
                }
            }
            return true;
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = match self.dispose_hooks.lock() {
            Ok(mut hooks) => std::mem::take(&mut *hooks),
            Err(_) => Vec::new(),
        };
        if let Ok(mut observers) = self.request_observers.lock() {
            observers.clear();
        }
        for hook in hooks {
            hook();
        }
    }
}

impl<T: Send + 'static> Subscription for PushSubscription<T> {
    fn request(&self, n: u64) {
        if self.ledger.is_cancelled() {
            return;
        }
        if n == 0 {
            debug!(
                event = events::DEMAND_REJECTED,
                component = COMPONENT,
                subscription_id = %self.id,
                "request(0) rejected"
            );
            if let Ok(mut state) = self.state.lock() {
                if !state.done && state.violation.is_none() {
                    state.violation =
                        Some(FlowError::protocol_violation("request(n) requires n > 0"));
                }
            }
            self.drain();
            return;
        }

        trace!(
            event = events::DEMAND_REQUESTED,
            component = COMPONENT,
            subscription_id = %self.id,
            n = %fields::format_demand(n),
            "demand requested"
        );
        let observers = match self.request_observers.lock() {
            Ok(observers) => {
                self.ledger.add(n);
                observers.clone()
            }
            Err(_) => {
                self.ledger.add(n);
                Vec::new()
            }
        };
        for observer in observers {
            observer(n);
        }
        self.drain();
    }

    fn cancel(&self) {
        if self.ledger.cancel() {
            debug!(
                event = events::SUBSCRIPTION_CANCELLED,
                component = COMPONENT,
                subscription_id = %self.id,
                delivered = self.ledger.delivered(),
                "push subscription cancelled"
            );
            self.downstream.release();
        }
        self.drain();
    }
}
