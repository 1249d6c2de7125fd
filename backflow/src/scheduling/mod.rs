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

//! Scheduling layer.
//!
//! A [`Scheduler`] is an opaque "run this on context X" capability. The two
//! boundaries built on it are explicit wrappers in the subscribe chain:
//!
//! - `subscribe_on` moves subscription establishment and every `request`
//!   onto the scheduler. When several are stacked, the one nearest the
//!   source decides where production runs.
//! - `publish_on` moves delivery of items and terminal signals onto the
//!   scheduler, one signal at a time and in emission order.
//!
//! ```
//! use backflow::scheduling::{Scheduler, WorkerThread};
//! use backflow::Flux;
//! use std::sync::{mpsc, Arc};
//! use std::time::Duration;
//!
//! let worker: Arc<dyn Scheduler> = Arc::new(WorkerThread::spawn("doc-worker").unwrap());
//! let (tx, rx) = mpsc::channel();
//!
//! let _running = Flux::just(1).subscribe_on(worker).subscribe_with(
//!     move |_| tx.send(std::thread::current().name().map(str::to_string)).unwrap(),
//!     |_| {},
//!     || {},
//! );
//! let thread = rx.recv_timeout(Duration::from_secs(2)).unwrap();
//! assert_eq!(thread.as_deref(), Some("doc-worker"));
//! ```

use std::time::Duration;

pub(crate) mod publish_on;
pub(crate) mod subscribe_on;
pub(crate) mod worker_runtime;

pub use worker_runtime::{Immediate, TokioPool, WorkerThread};

/// A unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Worker-context provider.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);

    fn schedule_after(&self, delay: Duration, task: Task);

    fn name(&self) -> &str;
}
