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

//! Multicast layer.
//!
//! A [`MulticastHub`] owns one upstream subscription and shares it between
//! any number of subscribers. Its lifecycle is
//! `Idle -> Connecting -> Connected -> Terminated`; the [`HubConfig`]
//! policies decide when it connects, how much history late subscribers are
//! replayed, and whether it disconnects once nobody is left.
//!
//! ```
//! use backflow::multicast::{ConnectionState, HubConfig, MulticastHub};
//! use backflow::Flux;
//! use std::sync::{Arc, Mutex};
//!
//! let hub = MulticastHub::new(Flux::from_iter(vec![10, 20, 30]), HubConfig::replay(2));
//! assert_eq!(hub.state(), ConnectionState::Terminated);
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _late = hub
//!     .as_flux()
//!     .subscribe_with(move |item| sink.lock().unwrap().push(item), |_| {}, || {});
//! assert_eq!(*seen.lock().unwrap(), vec![20, 30]);
//! ```

pub(crate) mod hub;
pub(crate) mod policy;
pub(crate) mod replay_buffer;

pub use hub::{ConnectionState, MulticastHub};
pub use policy::{ConnectPolicy, DisconnectPolicy, HubConfig, ReplayPolicy};
