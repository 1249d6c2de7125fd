//! Demand-gated sources: one `step` per unit of granted demand.

use crate::error::{report_dropped, ErrorKind, FlowError};
use crate::observability::{events, fields};
use crate::protocol::demand::DemandLedger;
use crate::protocol::downstream::DownstreamCell;
use crate::protocol::drain::DrainGate;
use crate::protocol::{NoopSubscription, Publisher, Subscriber, Subscription, Terminal};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};
use uuid::Uuid;

const COMPONENT: &str = "pull_source";

/// Outcome of one `step`.
#[derive(Debug)]
pub enum Emission<T> {
    Item(T),
    /// An item that is also the end of the sequence.
    Last(T),
    Complete,
    Error(FlowError),
}

/// A source computing each emission from explicitly threaded state.
///
/// `open` runs once per subscription, `step` at most once per unit of
/// granted demand and never after a terminal emission, `close` exactly once
/// whatever way the subscription ends.
pub trait PullSource: Send + Sync + 'static {
    type State: Send + 'static;
    type Item: Send + 'static;

    fn open(&self) -> Result<Self::State, FlowError>;

    fn step(&self, state: Self::State) -> (Self::State, Emission<Self::Item>);

    fn close(&self, _state: Self::State) -> Result<(), FlowError> {
        Ok(())
    }

    /// Largest `n` a single `request(n)` may carry; larger requests are
    /// protocol violations.
    fn max_request_per_call(&self) -> Option<u64> {
        None
    }
}

/// Closure-backed [`PullSource`].
pub struct Generator<S, T, O, F, C> {
    open: O,
    step: F,
    close: C,
    max_request: Option<u64>,
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, T, O, F, C> Generator<S, T, O, F, C>
where
    O: Fn() -> Result<S, FlowError>,
    F: Fn(S) -> (S, Emission<T>),
    C: Fn(S) -> Result<(), FlowError>,
{
    pub fn new(open: O, step: F, close: C) -> Self {
        Self {
            open,
            step,
            close,
            max_request: None,
            _marker: PhantomData,
        }
    }

    pub fn with_max_request(mut self, cap: u64) -> Self {
        self.max_request = Some(cap);
        self
    }
}

impl<S, T, O, F, C> PullSource for Generator<S, T, O, F, C>
where
    S: Send + 'static,
    T: Send + 'static,
    O: Fn() -> Result<S, FlowError> + Send + Sync + 'static,
    F: Fn(S) -> (S, Emission<T>) + Send + Sync + 'static,
    C: Fn(S) -> Result<(), FlowError> + Send + Sync + 'static,
{
    type State = S;
    type Item = T;

    fn open(&self) -> Result<S, FlowError> {
        (self.open)()
    }

    fn step(&self, state: S) -> (S, Emission<T>) {
        (self.step)(state)
    }

    fn close(&self, state: S) -> Result<(), FlowError> {
        (self.close)(state)
    }

    fn max_request_per_call(&self) -> Option<u64> {
        self.max_request
    }
}

pub(crate) struct PullPublisher<P> {
    source: Arc<P>,
}

impl<P: PullSource> PullPublisher<P> {
    pub(crate) fn new(source: P) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

impl<P: PullSource> Publisher<P::Item> for PullPublisher<P> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<P::Item>>) {
        let id = Uuid::new_v4();
        match self.source.open() {
            Ok(state) => {
                debug!(
                    event = events::PULL_SOURCE_OPENED,
                    component = COMPONENT,
                    subscription_id = %id,
                    "pull source opened"
                );
                let subscription = Arc::new(PullSubscription {
                    id,
                    source: self.source.clone(),
                    ledger: DemandLedger::new(),
                    gate: DrainGate::new(),
                    state: Mutex::new(Some(state)),
                    violation: Mutex::new(None),
                    downstream: DownstreamCell::new(subscriber),
                });
                subscription
                    .downstream
                    .on_subscribe(subscription.clone());
            }
            Err(err) => {
                warn!(
                    event = events::PULL_SOURCE_OPEN_FAILED,
                    component = COMPONENT,
                    subscription_id = %id,
                    err = %err,
                    "pull source failed to open"
                );
                subscriber.on_subscribe(Arc::new(NoopSubscription));
                subscriber.on_error(err);
            }
        }
    }
}

enum Halt {
    Cancelled,
    Violation(FlowError),
}

struct PullSubscription<P: PullSource> {
    id: Uuid,
    source: Arc<P>,
    ledger: DemandLedger,
    gate: DrainGate,
    state: Mutex<Option<P::State>>,
    violation: Mutex<Option<FlowError>>,
    downstream: DownstreamCell<P::Item>,
}

impl<P: PullSource> PullSubscription<P> {
    fn reject(&self, err: FlowError) {
        debug!(
            event = events::DEMAND_REJECTED,
            component = COMPONENT,
            subscription_id = %self.id,
            err = %err,
            "request rejected"
        );
        if let Ok(mut violation) = self.violation.lock() {
            if violation.is_none() {
                *violation = Some(err);
            }
        }
        self.drain();
    }

    fn drain(&self) {
        self.gate.drain_with(|| self.drain_pass());
    }

    fn pending_halt(&self) -> Option<Halt> {
        let violation = self.violation.lock().ok().and_then(|mut v| v.take());
        if let Some(err) = violation {
            self.ledger.cancel();
            return Some(Halt::Violation(err));
        }
        if self.ledger.is_cancelled() {
            return Some(Halt::Cancelled);
        }
        None
    }

    /// One pass of the production loop; `false` once terminal.
    fn drain_pass(&self) -> bool {
        loop {
            if let Some(halt) = self.pending_halt() {
                let state = self.state.lock().ok().and_then(|mut s| s.take());
                let cleanup = state.and_then(|state| self.close_state(state));
                match halt {
                    Halt::Violation(err) => self.terminate(Terminal::Error(err), cleanup),
                    Halt::Cancelled => {
                        self.downstream.release();
                        if let Some(cleanup) = cleanup {
                            report_dropped(&cleanup);
                        }
                    }
                }
                return false;
            }

            if self.ledger.outstanding() == 0 {
                return true;
            }

            let Some(state) = self.state.lock().ok().and_then(|mut s| s.take()) else {
                return false;
            };

            let (next, emission) = self.source.step(state);
            match emission {
                Emission::Item(item) => {
                    if let Ok(mut slot) = self.state.lock() {
                        *slot = Some(next);
                    }
                    self.ledger.produced(1);
                    self.downstream.on_next(item);
                }
                Emission::Last(item) => {
                    self.ledger.produced(1);
                    self.downstream.on_next(item);
                    let cleanup = self.close_state(next);
                    self.terminate(Terminal::Complete, cleanup);
                    return false;
                }
                Emission::Complete => {
                    let cleanup = self.close_state(next);
                    self.terminate(Terminal::Complete, cleanup);
                    return false;
                }
                Emission::Error(err) => {
                    let cleanup = self.close_state(next);
                    self.terminate(Terminal::Error(err), cleanup);
                    return false;
                }
            }
        }
    }

    /// Runs the finalizer; a failure comes back as a cleanup error.
    fn close_state(&self, state: P::State) -> Option<FlowError> {
        match self.source.close(state) {
            Ok(()) => {
                debug!(
                    event = events::PULL_SOURCE_CLOSED,
                    component = COMPONENT,
                    subscription_id = %self.id,
                    delivered = self.ledger.delivered(),
                    "pull source closed"
                );
                None
            }
            Err(err) => {
                warn!(
                    event = events::PULL_SOURCE_CLOSE_FAILED,
                    component = COMPONENT,
                    subscription_id = %self.id,
                    err = %err,
                    "pull source failed to close"
                );
                Some(err.reclassify(ErrorKind::ResourceCleanup))
            }
        }
    }

    fn terminate(&self, terminal: Terminal, cleanup: Option<FlowError>) {
        debug!(
            event = events::SUBSCRIPTION_TERMINATED,
            component = COMPONENT,
            subscription_id = %self.id,
            delivered = self.ledger.delivered(),
            terminal = ?terminal,
            "pull subscription terminated"
        );
        match terminal {
            Terminal::Error(mut err) => {
                if let Some(cleanup) = cleanup {
                    err.add_suppressed(cleanup);
                }
                self.downstream.on_error(err);
            }
            Terminal::Complete => {
                self.downstream.on_complete();
                if let Some(cleanup) = cleanup {
                    report_dropped(&cleanup);
                }
            }
        }
    }
}

impl<P: PullSource> Subscription for PullSubscription<P> {
    fn request(&self, n: u64) {
        if self.ledger.is_cancelled() {
            return;
        }
        if n == 0 {
            self.reject(FlowError::protocol_violation(
                "request(n) requires n > 0",
            ));
            return;
        }
        if let Some(cap) = self.source.max_request_per_call() {
            if n > cap {
                self.reject(FlowError::protocol_violation(format!(
                    "request({}) exceeds the per-call cap of {cap}",
                    fields::format_demand(n)
                )));
                return;
            }
        }
        trace!(
            event = events::DEMAND_REQUESTED,
            component = COMPONENT,
            subscription_id = %self.id,
            n = %fields::format_demand(n),
            "demand requested"
        );
        self.ledger.add(n);
        self.drain();
    }

    fn cancel(&self) {
        if self.ledger.cancel() {
            debug!(
                event = events::SUBSCRIPTION_CANCELLED,
                component = COMPONENT,
                subscription_id = %self.id,
                delivered = self.ledger.delivered(),
                "pull subscription cancelled"
            );
            self.downstream.release();
        }
        self.drain();
    }
}
