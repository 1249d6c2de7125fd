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

//! Lazy sources.
//!
//! Pull sources compute one emission per unit of demand from explicitly
//! threaded state and release that state exactly once. Push sources hand the
//! producer a [`FluxSink`]; anything pushed ahead of demand waits in a FIFO.
//!
//! ```
//! use backflow::source::Emission;
//! use backflow::{Flux, FlowError};
//! use std::sync::{Arc, Mutex};
//!
//! let lines = Flux::generate(
//!     || Ok::<_, FlowError>(vec!["b", "a"]),
//!     |mut pending: Vec<&'static str>| match pending.pop() {
//!         Some(line) => (pending, Emission::Item(line)),
//!         None => (pending, Emission::Complete),
//!     },
//!     |_| Ok(()),
//! );
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _running = lines.subscribe_with(
//!     move |line| sink.lock().unwrap().push(line),
//!     |_| {},
//!     || {},
//! );
//! assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
//! ```

pub(crate) mod pull;
pub(crate) mod push;
pub(crate) mod single;

pub use pull::{Emission, Generator, PullSource};
pub use push::{FluxSink, PushOptions};
