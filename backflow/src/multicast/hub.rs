//! One upstream subscription fanned out to any number of slots.

use crate::error::FlowError;
use crate::flux::Flux;
use crate::multicast::policy::{ConnectPolicy, DisconnectPolicy, HubConfig};
use crate::multicast::replay_buffer::ReplayBuffer;
use crate::observability::{events, fields};
use crate::protocol::demand::DemandLedger;
use crate::protocol::downstream::DownstreamCell;
use crate::protocol::drain::DrainGate;
use crate::protocol::{Publisher, Subscriber, Subscription, Terminal, UNBOUNDED};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, trace};
use uuid::Uuid;

const COMPONENT: &str = "multicast_hub";

const HUB_TAG: &str = "MulticastHub:";
const HUB_FN_REMOVE_SLOT_TAG: &str = "remove_slot:";

/// Connection state of a hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Terminated,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Terminated,
            _ => ConnectionState::Idle,
        }
    }
}

/// Hot source sharing one upstream subscription.
///
/// Every upstream item is appended to the replay buffer and offered to each
/// attached slot; a slot without demand catches up from the buffer later, so
/// what it can still receive is bounded by the replay policy. Slots are held
/// weakly: a subscriber that drops its subscription leaves the hub.
///
/// An eager hub subscribes inside [`MulticastHub::new`] and requests
/// unbounded demand; over a synchronous infinite source that call never
/// returns, so put such sources behind `subscribe_on`.
pub struct MulticastHub<T> {
    inner: Arc<HubInner<T>>,
}

impl<T> Clone for MulticastHub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> MulticastHub<T> {
    pub fn new(source: Flux<T>, config: HubConfig) -> Self {
        let inner = Arc::new(HubInner {
            id: Uuid::new_v4(),
            source,
            config,
            phase: AtomicU8::new(ConnectionState::Idle as u8),
            generation: AtomicU64::new(0),
            shared: Mutex::new(Shared {
                buffer: ReplayBuffer::new(config.replay),
                slots: HashMap::new(),
                terminal: None,
            }),
            upstream: Mutex::new(None),
        });
        if config.connect == ConnectPolicy::Eager {
            inner.connect();
        }
        Self { inner }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.inner.subscribe(subscriber);
    }

    /// Subscribes to the upstream unless already connected or connecting.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Cancels the upstream, drops the buffered history and returns to
    /// `Idle`. Attached slots stay attached.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_shared().map_or(0, |shared| shared.live_count())
    }

    pub fn as_flux(&self) -> Flux<T> {
        Flux::from_publisher(HubPublisher {
            hub: self.inner.clone(),
        })
    }
}

/// Read progress of one slot, visible to the hub without upgrading it.
struct SlotProgress {
    ledger: DemandLedger,
    cursor: AtomicU64,
}

struct SlotEntry<T> {
    slot: Weak<HubSlot<T>>,
    progress: Arc<SlotProgress>,
}

struct Shared<T> {
    buffer: ReplayBuffer<T>,
    slots: HashMap<Uuid, SlotEntry<T>>,
    terminal: Option<Terminal>,
}

impl<T> Shared<T> {
    /// Slots whose subscriber is still around. Upgraded handles must be
    /// dropped after the lock is released, since a slot's drop re-enters it.
    fn live_slots(&self) -> Vec<Arc<HubSlot<T>>> {
        self.slots
            .values()
            .filter_map(|entry| entry.slot.upgrade())
            .collect()
    }

    fn live_count(&self) -> usize {
        self.slots
            .values()
            .filter(|entry| entry.slot.strong_count() > 0)
            .count()
    }

    /// Lowest position still owed to a slot with outstanding demand.
    fn read_floor(&self) -> u64 {
        self.slots
            .values()
            .map(|entry| &entry.progress)
            .filter(|progress| {
                !progress.ledger.is_cancelled() && progress.ledger.outstanding() > 0
            })
            .map(|progress| progress.cursor.load(Ordering::Acquire))
            .min()
            .unwrap_or(u64::MAX)
    }

    /// Applies the replay policy without evicting anything a demanding slot
    /// has yet to read.
    fn trim_history(&mut self) -> usize {
        if !self.buffer.over_retained() {
            return 0;
        }
        let floor = self.read_floor();
        self.buffer.trim(floor)
    }
}

struct HubInner<T> {
    id: Uuid,
    source: Flux<T>,
    config: HubConfig,
    phase: AtomicU8,
    generation: AtomicU64,
    shared: Mutex<Shared<T>>,
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
}

impl<T> HubInner<T> {
    fn lock_shared(&self) -> Option<MutexGuard<'_, Shared<T>>> {
        self.shared.lock().ok()
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.phase.store(state as u8, Ordering::Release);
    }

    fn disconnect(&self) {
        let upstream = {
            let Some(mut shared) = self.lock_shared() else {
                return;
            };
            if self.state() == ConnectionState::Idle {
                return;
            }
            self.generation.fetch_add(1, Ordering::AcqRel);
            self.set_state(ConnectionState::Idle);
            shared.buffer.clear();
            shared.terminal = None;
            self.upstream.lock().ok().and_then(|mut upstream| upstream.take())
        };
        info!(
            event = events::HUB_DISCONNECTED,
            component = COMPONENT,
            hub_id = %self.id,
            "hub disconnected from upstream"
        );
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }

    fn remove_slot(&self, id: &Uuid) {
        let remaining = {
            let Some(mut shared) = self.lock_shared() else {
                return;
            };
            if shared.slots.remove(id).is_none() {
                trace!("{HUB_TAG}{HUB_FN_REMOVE_SLOT_TAG} slot {id} already gone");
                return;
            }
            shared.trim_history();
            shared.live_count()
        };
        debug!(
            event = events::HUB_SLOT_LEFT,
            component = COMPONENT,
            hub_id = %self.id,
            subscription_id = %id,
            remaining,
            "subscriber left hub"
        );
        if remaining == 0 && self.config.disconnect == DisconnectPolicy::OnZeroSubscribers {
            debug!("{HUB_TAG}{HUB_FN_REMOVE_SLOT_TAG} last subscriber gone, disconnecting");
            self.disconnect();
        }
    }
}

impl<T: Clone + Send + 'static> HubInner<T> {
    fn connect(self: &Arc<Self>) {
        if self
            .phase
            .compare_exchange(
                ConnectionState::Idle as u8,
                ConnectionState::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            event = events::HUB_CONNECTING,
            component = COMPONENT,
            hub_id = %self.id,
            generation,
            "hub connecting to upstream"
        );
        self.source.subscribe(Arc::new(HubUpstream {
            hub: Arc::downgrade(self),
            generation,
        }));
    }

    fn subscribe(self: &Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let progress = Arc::new(SlotProgress {
            ledger: DemandLedger::new(),
            cursor: AtomicU64::new(0),
        });
        let slot = Arc::new(HubSlot {
            id: Uuid::new_v4(),
            hub: self.clone(),
            progress: progress.clone(),
            gate: DrainGate::new(),
            violation: Mutex::new(None),
            downstream: DownstreamCell::new(subscriber),
        });
        let attached = {
            let Some(mut shared) = self.lock_shared() else {
                return;
            };
            progress.cursor.store(shared.buffer.base(), Ordering::Release);
            shared.slots.insert(
                slot.id,
                SlotEntry {
                    slot: Arc::downgrade(&slot),
                    progress,
                },
            );
            shared.live_count()
        };
        debug!(
            event = events::HUB_SLOT_JOINED,
            component = COMPONENT,
            hub_id = %self.id,
            subscription_id = %slot.id,
            attached,
            "subscriber joined hub"
        );

        slot.downstream.on_subscribe(slot.clone());
        slot.drain();

        match self.config.connect {
            ConnectPolicy::Eager => self.connect(),
            ConnectPolicy::Threshold(needed) if attached >= needed => self.connect(),
            ConnectPolicy::Threshold(_) | ConnectPolicy::Manual => {}
        }
    }

    fn on_upstream_subscribe(&self, generation: u64, subscription: Arc<dyn Subscription>) {
        let accepted = match self.lock_shared() {
            Some(_shared) if self.generation.load(Ordering::Acquire) == generation => {
                if let Ok(mut upstream) = self.upstream.lock() {
                    *upstream = Some(subscription.clone());
                }
                self.set_state(ConnectionState::Connected);
                true
            }
            _ => false,
        };
        if !accepted {
            subscription.cancel();
            return;
        }
        info!(
            event = events::HUB_CONNECTED,
            component = COMPONENT,
            hub_id = %self.id,
            generation,
            "hub connected to upstream"
        );
        subscription.request(UNBOUNDED);
    }

    fn on_upstream_item(&self, generation: u64, item: T) {
        let slots = {
            let Some(mut shared) = self.lock_shared() else {
                return;
            };
            if self.generation.load(Ordering::Acquire) != generation || shared.terminal.is_some() {
                return;
            }
            shared.buffer.push(item);
            shared.live_slots()
        };
        for slot in &slots {
            slot.drain();
        }
        if let Some(mut shared) = self.lock_shared() {
            let evicted = shared.trim_history();
            if evicted > 0 {
                trace!(
                    component = COMPONENT,
                    hub_id = %self.id,
                    evicted,
                    retained = shared.buffer.len(),
                    "replay buffer trimmed"
                );
            }
        }
    }

    fn on_upstream_terminal(&self, generation: u64, terminal: Terminal) {
        let slots = {
            let Some(mut shared) = self.lock_shared() else {
                return;
            };
            if self.generation.load(Ordering::Acquire) != generation || shared.terminal.is_some() {
                return;
            }
            info!(
                event = events::HUB_TERMINATED,
                component = COMPONENT,
                hub_id = %self.id,
                terminal = ?terminal,
                retained = shared.buffer.len(),
                "hub upstream terminated"
            );
            shared.terminal = Some(terminal);
            self.set_state(ConnectionState::Terminated);
            if let Ok(mut upstream) = self.upstream.lock() {
                upstream.take();
            }
            shared.live_slots()
        };
        for slot in &slots {
            slot.drain();
        }
    }
}

struct HubPublisher<T> {
    hub: Arc<HubInner<T>>,
}

impl<T: Clone + Send + 'static> Publisher<T> for HubPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.hub.subscribe(subscriber);
    }
}

/// The hub's own subscriber on its upstream.
struct HubUpstream<T> {
    hub: Weak<HubInner<T>>,
    generation: u64,
}

impl<T: Clone + Send + 'static> Subscriber<T> for HubUpstream<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        match self.hub.upgrade() {
            Some(hub) => hub.on_upstream_subscribe(self.generation, subscription),
            None => subscription.cancel(),
        }
    }

    fn on_next(&self, item: T) {
        if let Some(hub) = self.hub.upgrade() {
            hub.on_upstream_item(self.generation, item);
        }
    }

    fn on_error(&self, error: FlowError) {
        if let Some(hub) = self.hub.upgrade() {
            hub.on_upstream_terminal(self.generation, Terminal::Error(error));
        }
    }

    fn on_complete(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.on_upstream_terminal(self.generation, Terminal::Complete);
        }
    }
}

enum SlotStep<T> {
    Item(T),
    Terminal(Terminal),
    Wait,
}

/// One subscriber's view of the hub: its own demand and read cursor.
///
/// Dropping the last handle leaves the hub, which lets the disconnect
/// policy see subscribers that went away without cancelling.
struct HubSlot<T> {
    id: Uuid,
    hub: Arc<HubInner<T>>,
    progress: Arc<SlotProgress>,
    gate: DrainGate,
    violation: Mutex<Option<FlowError>>,
    downstream: DownstreamCell<T>,
}

impl<T> Drop for HubSlot<T> {
    fn drop(&mut self) {
        self.hub.remove_slot(&self.id);
    }
}

impl<T: Clone + Send + 'static> HubSlot<T> {
    fn drain(&self) {
        self.gate.drain_with(|| self.drain_pass());
    }

    fn next_step(&self) -> SlotStep<T> {
        let Some(mut shared) = self.hub.lock_shared() else {
            return SlotStep::Wait;
        };
        shared.trim_history();
        let progress = &self.progress;
        let mut cursor = progress.cursor.load(Ordering::Acquire);
        let base = shared.buffer.base();
        if cursor < base {
            trace!(
                component = COMPONENT,
                subscription_id = %self.id,
                skipped = base - cursor,
                "slot fell behind the replay window"
            );
            cursor = base;
            progress.cursor.store(cursor, Ordering::Release);
        }
        if cursor < shared.buffer.high_water() {
            if progress.ledger.outstanding() == 0 {
                return SlotStep::Wait;
            }
            return match shared.buffer.get(cursor) {
                Some(item) => {
                    progress.cursor.store(cursor + 1, Ordering::Release);
                    SlotStep::Item(item)
                }
                None => SlotStep::Wait,
            };
        }
        match &shared.terminal {
            Some(terminal) => SlotStep::Terminal(terminal.clone()),
            None => SlotStep::Wait,
        }
    }

    fn drain_pass(&self) -> bool {
        loop {
            let violation = self.violation.lock().ok().and_then(|mut v| v.take());
            if let Some(err) = violation {
                self.progress.ledger.cancel();
                self.downstream.on_error(err);
                self.hub.remove_slot(&self.id);
                return false;
            }
            if self.progress.ledger.is_cancelled() {
                return false;
            }
            match self.next_step() {
                SlotStep::Item(item) => {
                    self.progress.ledger.produced(1);
                    self.downstream.on_next(item);
                }
                SlotStep::Terminal(terminal) => {
                    self.progress.ledger.cancel();
                    match terminal {
                        Terminal::Complete => self.downstream.on_complete(),
                        Terminal::Error(err) => self.downstream.on_error(err),
                    };
                    self.hub.remove_slot(&self.id);
                    return false;
                }
                SlotStep::Wait => return true,
            }
        }
    }
}

impl<T: Clone + Send + 'static> Subscription for HubSlot<T> {
    fn request(&self, n: u64) {
        if self.progress.ledger.is_cancelled() {
            return;
        }
        if n == 0 {
            debug!(
                event = events::DEMAND_REJECTED,
                component = COMPONENT,
                subscription_id = %self.id,
                "request(0) rejected"
            );
            if let Ok(mut violation) = self.violation.lock() {
                if violation.is_none() {
                    *violation = Some(FlowError::protocol_violation("request(n) requires n > 0"));
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
        self.progress.ledger.add(n);
        self.drain();
    }

    fn cancel(&self) {
        if self.progress.ledger.cancel() {
            debug!(
                event = events::SUBSCRIPTION_CANCELLED,
                component = COMPONENT,
                subscription_id = %self.id,
                delivered = self.progress.ledger.delivered(),
                "hub slot cancelled"
            );
            self.downstream.release();
            self.hub.remove_slot(&self.id);
        }
    }
}
