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

//! Shared helpers for `backflow` integration tests.

use backflow::{FlowError, Subscriber, Subscription};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a fmt subscriber once per test binary. `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Polls `condition` every few milliseconds until it holds or `timeout`
/// elapses; returns the final evaluation.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return condition();
        }
        thread::sleep(Duration::from_millis(2));
    }
    true
}

/// Async flavour of [`wait_until`] for `#[tokio::test]` bodies.
pub async fn wait_until_async(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return condition();
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    true
}

struct Recorded<T> {
    items: Vec<T>,
    error: Option<FlowError>,
    completions: usize,
    errors: usize,
    threads: Vec<Option<String>>,
}

/// Subscriber that records every signal and requests `initial` on subscribe.
pub struct RecordingSubscriber<T> {
    initial: u64,
    recorded: Mutex<Recorded<T>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

impl<T: Clone + Send> RecordingSubscriber<T> {
    pub fn new(initial: u64) -> Arc<Self> {
        Arc::new(Self {
            initial,
            recorded: Mutex::new(Recorded {
                items: Vec::new(),
                error: None,
                completions: 0,
                errors: 0,
                threads: Vec::new(),
            }),
            subscription: Mutex::new(None),
        })
    }

    pub fn request(&self, n: u64) {
        if let Some(subscription) = self.subscription() {
            subscription.request(n);
        }
    }

    pub fn cancel(&self) {
        if let Some(subscription) = self.subscription() {
            subscription.cancel();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription().is_some()
    }

    pub fn items(&self) -> Vec<T> {
        self.recorded.lock().expect("recorded lock").items.clone()
    }

    pub fn error(&self) -> Option<FlowError> {
        self.recorded.lock().expect("recorded lock").error.clone()
    }

    pub fn completions(&self) -> usize {
        self.recorded.lock().expect("recorded lock").completions
    }

    /// Completions plus errors; more than one is a protocol breach.
    pub fn terminal_count(&self) -> usize {
        let recorded = self.recorded.lock().expect("recorded lock");
        recorded.completions + recorded.errors
    }

    /// Name of the thread each `on_next` ran on, in delivery order.
    pub fn delivery_threads(&self) -> Vec<Option<String>> {
        self.recorded.lock().expect("recorded lock").threads.clone()
    }

    pub fn wait_for_items(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.items().len() >= count)
    }

    pub fn wait_for_terminal(&self, timeout: Duration) -> bool {
        wait_until(timeout, || self.terminal_count() > 0)
    }

    fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.subscription.lock().expect("subscription lock").clone()
    }
}

impl<T: Clone + Send> Subscriber<T> for RecordingSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.subscription.lock().expect("subscription lock") = Some(subscription.clone());
        if self.initial > 0 {
            subscription.request(self.initial);
        }
    }

    fn on_next(&self, item: T) {
        let mut recorded = self.recorded.lock().expect("recorded lock");
        recorded.items.push(item);
        recorded
            .threads
            .push(thread::current().name().map(str::to_string));
    }

    fn on_error(&self, error: FlowError) {
        let mut recorded = self.recorded.lock().expect("recorded lock");
        recorded.errors += 1;
        recorded.error = Some(error);
    }

    fn on_complete(&self) {
        self.recorded.lock().expect("recorded lock").completions += 1;
    }
}

/// Counts opens and closes of a resource-backed source.
#[derive(Default)]
pub struct CountingResource {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl CountingResource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}
