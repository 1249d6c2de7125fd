//! Subscriber doubles for the unit tests of this crate.

use crate::error::FlowError;
use crate::protocol::{Subscriber, Subscription};
use std::sync::{Arc, Mutex};
use std::thread;

struct Recorded<T> {
    items: Vec<T>,
    error: Option<FlowError>,
    completed: bool,
    terminal_count: usize,
    subscribed: usize,
    threads: Vec<String>,
}

/// Records every signal and requests `initial` items on subscribe.
pub(crate) struct RecordingSubscriber<T> {
    initial: u64,
    recorded: Mutex<Recorded<T>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

impl<T: Clone + Send> RecordingSubscriber<T> {
    pub(crate) fn new(initial: u64) -> Self {
        Self {
            initial,
            recorded: Mutex::new(Recorded {
                items: Vec::new(),
                error: None,
                completed: false,
                terminal_count: 0,
                subscribed: 0,
                threads: Vec::new(),
            }),
            subscription: Mutex::new(None),
        }
    }

    pub(crate) fn request(&self, n: u64) {
        let subscription = self.subscription.lock().expect("subscription lock").clone();
        if let Some(subscription) = subscription {
            subscription.request(n);
        }
    }

    pub(crate) fn cancel(&self) {
        let subscription = self.subscription.lock().expect("subscription lock").clone();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    pub(crate) fn items(&self) -> Vec<T> {
        self.recorded.lock().expect("recorded lock").items.clone()
    }

    pub(crate) fn error(&self) -> Option<FlowError> {
        self.recorded.lock().expect("recorded lock").error.clone()
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.recorded.lock().expect("recorded lock").completed
    }

    pub(crate) fn terminal_count(&self) -> usize {
        self.recorded.lock().expect("recorded lock").terminal_count
    }

    pub(crate) fn subscribed_count(&self) -> usize {
        self.recorded.lock().expect("recorded lock").subscribed
    }

    pub(crate) fn threads(&self) -> Vec<String> {
        self.recorded.lock().expect("recorded lock").threads.clone()
    }

    fn record_thread(recorded: &mut Recorded<T>) {
        recorded
            .threads
            .push(thread::current().name().unwrap_or("unnamed").to_string());
    }
}

impl<T: Clone + Send> Subscriber<T> for RecordingSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.subscription.lock().expect("subscription lock") = Some(subscription.clone());
        self.recorded.lock().expect("recorded lock").subscribed += 1;
        if self.initial > 0 {
            subscription.request(self.initial);
        }
    }

    fn on_next(&self, item: T) {
        let mut recorded = self.recorded.lock().expect("recorded lock");
        Self::record_thread(&mut recorded);
        recorded.items.push(item);
    }

    fn on_error(&self, error: FlowError) {
        let mut recorded = self.recorded.lock().expect("recorded lock");
        Self::record_thread(&mut recorded);
        recorded.error = Some(error);
        recorded.terminal_count += 1;
    }

    fn on_complete(&self) {
        let mut recorded = self.recorded.lock().expect("recorded lock");
        Self::record_thread(&mut recorded);
        recorded.completed = true;
        recorded.terminal_count += 1;
    }
}
