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

//! # backflow
//!
//! `backflow` is a demand-driven stream engine: producers emit only what
//! subscribers have asked for.
//!
//! Typical usage is centered on [`Flux`]. Sources are lazy, every subscriber
//! gets its own run, and nothing is produced until a [`Subscription`] has
//! been granted demand.
//!
//! ## Demand-driven delivery
//!
//! ```
//! use backflow::{Flux, FlowError, Subscriber, Subscription};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Collect {
//!     items: Mutex<Vec<i64>>,
//!     subscription: Mutex<Option<Arc<dyn Subscription>>>,
//! }
//!
//! impl Subscriber<i64> for Collect {
//!     fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
//!         *self.subscription.lock().unwrap() = Some(subscription);
//!     }
//!     fn on_next(&self, item: i64) {
//!         self.items.lock().unwrap().push(item);
//!     }
//!     fn on_error(&self, _error: FlowError) {}
//!     fn on_complete(&self) {}
//! }
//!
//! let collect = Arc::new(Collect::default());
//! Flux::range(1, 100).subscribe(collect.clone());
//! assert!(collect.items.lock().unwrap().is_empty());
//!
//! let subscription = collect.subscription.lock().unwrap().clone().unwrap();
//! subscription.request(3);
//! assert_eq!(*collect.items.lock().unwrap(), vec![1, 2, 3]);
//! ```
//!
//! ## Sharing one source
//!
//! ```
//! use backflow::Flux;
//! use std::sync::{Arc, Mutex};
//!
//! let cached = Flux::from_iter(vec!["a", "b", "c"]).replay(2);
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _late = cached.subscribe_with(move |item| sink.lock().unwrap().push(item), |_| {}, || {});
//! assert_eq!(*seen.lock().unwrap(), vec!["b", "c"]);
//! ```
//!
//! ## Internal architecture map
//!
//! - Protocol: subscriber/subscription contract, demand ledger, drain gate
//! - Sources: pull generators, push sinks, fixed sequences
//! - Multicast: hub state machine and replay buffer
//! - Scheduling: worker-context providers and the two scheduling boundaries
//! - Operators: recovery, empty fallback, timeout race, take
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events and does not initialize a global subscriber.
//! Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

pub mod config;
mod consumer;
pub mod error;
mod flux;
pub mod multicast;
#[doc(hidden)]
pub mod observability;
mod operators;
pub mod protocol;
pub mod scheduling;
pub mod source;
mod stream_bridge;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, EngineConfig};
pub use consumer::Disposable;
pub use error::{ErrorKind, FlowError};
pub use flux::Flux;
pub use protocol::{Publisher, Subscriber, Subscription, UNBOUNDED};
pub use stream_bridge::FluxStream;
