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

//! Operators layered on top of the core protocol.
//!
//! Every operator that can swap its upstream (error recovery, empty
//! fallback, timeout) routes delivery through one switching arbiter, so
//! demand the subscriber granted to the old upstream and not yet used is
//! carried over to the new one.
//!
//! ```
//! use backflow::{Flux, FlowError};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _running = Flux::<&str>::error(FlowError::producer("lost connection"))
//!     .on_error_return("cached")
//!     .subscribe_with(move |item| sink.lock().unwrap().push(item), |_| {}, || {});
//!
//! assert_eq!(*seen.lock().unwrap(), vec!["cached"]);
//! ```

pub(crate) mod arbiter;
pub(crate) mod if_empty;
pub(crate) mod recover;
pub(crate) mod take;
pub(crate) mod timeout;
