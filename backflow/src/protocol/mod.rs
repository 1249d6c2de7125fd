/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Subscription protocol layer.
//!
//! Owns the capability sets shared by every source variant and the primitives
//! each concrete subscription is assembled from: the demand ledger, the drain
//! gate serialising delivery, and the releasable downstream reference.
//!
//! Signals reaching one subscriber are strictly sequential:
//! `on_subscribe` first, then any number of `on_next`, then at most one of
//! `on_error` / `on_complete`.
//!
//! ```
//! use backflow::{Flux, FlowError, Subscriber, Subscription};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct TwoAtATime {
//!     seen: Mutex<Vec<i64>>,
//!     subscription: Mutex<Option<Arc<dyn Subscription>>>,
//! }
//!
//! impl Subscriber<i64> for TwoAtATime {
//!     fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
//!         *self.subscription.lock().unwrap() = Some(subscription.clone());
//!         subscription.request(2);
//!     }
//!     fn on_next(&self, item: i64) {
//!         self.seen.lock().unwrap().push(item);
//!     }
//!     fn on_error(&self, _error: FlowError) {}
//!     fn on_complete(&self) {}
//! }
//!
//! let subscriber = Arc::new(TwoAtATime::default());
//! Flux::range(1, 10).subscribe(subscriber.clone());
//! assert_eq!(*subscriber.seen.lock().unwrap(), vec![1, 2]);
//! ```

use crate::error::FlowError;
use std::sync::Arc;

pub(crate) mod demand;
pub(crate) mod downstream;
pub(crate) mod drain;

pub use demand::DemandLedger;

/// Demand sentinel meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

/// Consumer side of the protocol.
pub trait Subscriber<T>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);
    fn on_next(&self, item: T);
    fn on_error(&self, error: FlowError);
    fn on_complete(&self);
}

/// Handle a subscriber uses to pull items or stop the flow.
pub trait Subscription: Send + Sync {
    /// Authorises `n` more items. `0` is a protocol violation.
    fn request(&self, n: u64);
    /// Idempotent, safe from any thread and from inside `on_next`.
    fn cancel(&self);
}

/// Anything a subscriber can attach to.
pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// Terminal state remembered by queues and hubs.
#[derive(Clone, Debug)]
pub(crate) enum Terminal {
    Complete,
    Error(FlowError),
}

impl Terminal {
    pub(crate) fn deliver<T>(self, subscriber: &dyn Subscriber<T>) {
        match self {
            Terminal::Complete => subscriber.on_complete(),
            Terminal::Error(err) => subscriber.on_error(err),
        }
    }
}

/// Subscription that ignores everything; handed out when a source fails
/// before a real subscription exists.
pub(crate) struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}
