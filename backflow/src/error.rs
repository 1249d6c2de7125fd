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

//! Error kinds delivered through `on_error`, and the hook for errors that have
//! no terminal signal left to ride on.

use crate::observability::events;
use arc_swap::ArcSwapOption;
use lazy_static::lazy_static;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::error;

const COMPONENT: &str = "error";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Raised by a source step or pushed through a sink.
    Producer,
    /// Demand or capability used outside the subscription contract.
    ProtocolViolation,
    /// Secondary failure while releasing a source's resource.
    ResourceCleanup,
    /// No signal arrived within the configured window.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Producer => write!(f, "producer error"),
            ErrorKind::ProtocolViolation => write!(f, "protocol violation"),
            ErrorKind::ResourceCleanup => write!(f, "resource cleanup error"),
            ErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// The error carried by `on_error`.
///
/// Causes are reference counted so a hub can hand the same stored error to
/// every present and future subscriber.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FlowError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Arc<dyn Error + Send + Sync>>,
    suppressed: Vec<FlowError>,
}

impl FlowError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            suppressed: Vec::new(),
        }
    }

    pub fn producer(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Producer, message)
    }

    /// Wraps an arbitrary error raised by producer code.
    pub fn from_cause<E>(cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Producer,
            message: cause.to_string(),
            cause: Some(Arc::new(cause)),
            suppressed: Vec::new(),
        }
    }

    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolViolation, message)
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceCleanup, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` when the wrapped cause is an `E`.
    pub fn is_cause<E: Error + 'static>(&self) -> bool {
        self.cause_ref::<E>().is_some()
    }

    pub fn cause_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.cause.as_deref().and_then(|cause| cause.downcast_ref::<E>())
    }

    /// Secondary errors attached while this one was in flight.
    pub fn suppressed(&self) -> &[FlowError] {
        &self.suppressed
    }

    pub fn add_suppressed(&mut self, secondary: FlowError) {
        self.suppressed.push(secondary);
    }

    pub(crate) fn reclassify(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }
}

type DroppedErrorHook = Arc<dyn Fn(&FlowError) + Send + Sync>;

lazy_static! {
    static ref DROPPED_ERROR_HOOK: ArcSwapOption<DroppedErrorHook> = ArcSwapOption::empty();
}

/// Installs a process-wide hook for errors that could not be attached to any
/// terminal signal (cleanup failing after completion or cancellation).
pub fn set_dropped_error_hook<F>(hook: F)
where
    F: Fn(&FlowError) + Send + Sync + 'static,
{
    let hook: DroppedErrorHook = Arc::new(hook);
    DROPPED_ERROR_HOOK.store(Some(Arc::new(hook)));
}

/// Restores the default hook, which logs the error.
pub fn reset_dropped_error_hook() {
    DROPPED_ERROR_HOOK.store(None);
}

pub(crate) fn report_dropped(err: &FlowError) {
    match DROPPED_ERROR_HOOK.load_full() {
        Some(hook) => (**hook)(err),
        None => error!(
            event = events::ERROR_DROPPED,
            component = COMPONENT,
            kind = %err.kind(),
            err = %err,
            "error raised with no terminal signal left to carry it"
        ),
    }
}
