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

use crate::consumer::{Disposable, LambdaSubscriber, SubscriptionLink};
use crate::error::FlowError;
use crate::multicast::{HubConfig, MulticastHub};
use crate::operators::if_empty::SwitchIfEmptyPublisher;
use crate::operators::recover::{RecoverPublisher, RecoveryRule};
use crate::operators::take::TakePublisher;
use crate::operators::timeout::TimeoutPublisher;
use crate::protocol::{Publisher, Subscriber};
use crate::scheduling::publish_on::PublishOnPublisher;
use crate::scheduling::subscribe_on::SubscribeOnPublisher;
use crate::scheduling::Scheduler;
use crate::source::pull::{Emission, Generator, PullPublisher, PullSource};
use crate::source::push::{FluxSink, PushOptions, PushPublisher};
use crate::source::single::{
    DeferPublisher, EmptyPublisher, ErrorPublisher, IterSource, JustSource, NeverPublisher,
    RangeSource, SupplierSource,
};
use crate::stream_bridge::FluxStream;
use std::sync::Arc;
use std::time::Duration;

/// A cold, composable sequence of `T`.
///
/// Every variant (pull source, push source, hub, operator chain) is reached
/// through the same [`Flux::subscribe`]. Nothing runs until a subscriber
/// attaches and requests items; cloning a `Flux` clones the recipe, not a
/// running flow.
pub struct Flux<T> {
    inner: Arc<dyn Publisher<T>>,
}

impl<T> Clone for Flux<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    pub fn from_publisher<P>(publisher: P) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Self {
            inner: Arc::new(publisher),
        }
    }

    /// Wraps a [`PullSource`]; every subscriber gets fresh state.
    pub fn pull<P>(source: P) -> Self
    where
        P: PullSource<Item = T>,
    {
        Self::from_publisher(PullPublisher::new(source))
    }

    /// Pull source from closures: `open` builds per-subscriber state,
    /// `step` produces one emission from it, `close` releases it once.
    pub fn generate<S, O, F, C>(open: O, step: F, close: C) -> Self
    where
        S: Send + 'static,
        O: Fn() -> Result<S, FlowError> + Send + Sync + 'static,
        F: Fn(S) -> (S, Emission<T>) + Send + Sync + 'static,
        C: Fn(S) -> Result<(), FlowError> + Send + Sync + 'static,
    {
        Self::pull(Generator::new(open, step, close))
    }

    pub fn generate_stateless<F>(step: F) -> Self
    where
        F: Fn() -> Emission<T> + Send + Sync + 'static,
    {
        Self::generate(|| Ok(()), move |()| ((), step()), |()| Ok(()))
    }

    /// Push source; `producer` runs once per subscriber with a fresh sink.
    pub fn create<F>(producer: F) -> Self
    where
        F: Fn(FluxSink<T>) + Send + Sync + 'static,
    {
        Self::create_with(PushOptions::default(), producer)
    }

    pub fn create_with<F>(options: PushOptions, producer: F) -> Self
    where
        F: Fn(FluxSink<T>) + Send + Sync + 'static,
    {
        Self::from_publisher(PushPublisher::new(options, producer))
    }

    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::pull(JustSource::new(value))
    }

    /// Replays `iterable` from the start for every subscriber.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::pull(IterSource::new(iterable))
    }

    pub fn empty() -> Self {
        Self::from_publisher(EmptyPublisher)
    }

    pub fn never() -> Self {
        Self::from_publisher(NeverPublisher)
    }

    pub fn error(error: FlowError) -> Self {
        Self::from_publisher(ErrorPublisher::new(error))
    }

    /// Single value computed at the first unit of demand.
    pub fn from_supplier<F>(supplier: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::from_fallible(move || Ok(supplier()))
    }

    pub fn from_fallible<F>(supplier: F) -> Self
    where
        F: Fn() -> Result<T, FlowError> + Send + Sync + 'static,
    {
        Self::pull(SupplierSource::new(supplier))
    }

    /// Calls `factory` for every subscriber.
    pub fn defer<F>(factory: F) -> Self
    where
        F: Fn() -> Flux<T> + Send + Sync + 'static,
    {
        Self::from_publisher(DeferPublisher::new(factory))
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        self.inner.subscribe(subscriber);
    }

    /// Subscribes with closures, requesting everything up front.
    pub fn subscribe_with<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Disposable
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(FlowError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        let link = SubscriptionLink::new();
        self.subscribe(Arc::new(LambdaSubscriber::new(
            link.clone(),
            on_next,
            on_error,
            on_complete,
        )));
        Disposable::new(link)
    }

    /// Consumes the flux as a `futures::Stream`, keeping up to `prefetch`
    /// items requested ahead of the reader.
    pub fn into_stream(&self, prefetch: u64) -> FluxStream<T> {
        FluxStream::subscribe(self, prefetch)
    }

    /// Moves subscription and every `request` onto `scheduler`.
    pub fn subscribe_on(&self, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::from_publisher(SubscribeOnPublisher::new(self.clone(), scheduler))
    }

    /// Moves delivery of items and terminal signals onto `scheduler`.
    pub fn publish_on(&self, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::from_publisher(PublishOnPublisher::new(self.clone(), scheduler))
    }

    pub fn on_error_return(&self, value: T) -> Self
    where
        T: Clone + Sync,
    {
        self.on_error_return_if(|_| true, value)
    }

    pub fn on_error_return_if<P>(&self, predicate: P, value: T) -> Self
    where
        T: Clone + Sync,
        P: Fn(&FlowError) -> bool + Send + Sync + 'static,
    {
        self.on_error_resume_if(predicate, move |_| Flux::just(value.clone()))
    }

    pub fn on_error_resume<F>(&self, fallback: F) -> Self
    where
        F: Fn(&FlowError) -> Flux<T> + Send + Sync + 'static,
    {
        self.on_error_resume_if(|_| true, fallback)
    }

    /// Replaces the failed source with `fallback(err)` when `predicate`
    /// matches; otherwise the error passes through.
    pub fn on_error_resume_if<P, F>(&self, predicate: P, fallback: F) -> Self
    where
        P: Fn(&FlowError) -> bool + Send + Sync + 'static,
        F: Fn(&FlowError) -> Flux<T> + Send + Sync + 'static,
    {
        let rule: RecoveryRule<T> = Arc::new(move |err: &FlowError| {
            if predicate(err) {
                Some(fallback(err))
            } else {
                None
            }
        });
        Self::from_publisher(RecoverPublisher::new(self.clone(), rule))
    }

    pub fn default_if_empty(&self, value: T) -> Self
    where
        T: Clone + Sync,
    {
        self.switch_if_empty(Flux::just(value))
    }

    pub fn switch_if_empty(&self, fallback: Flux<T>) -> Self {
        Self::from_publisher(SwitchIfEmptyPublisher::new(self.clone(), fallback))
    }

    /// Switches to `fallback` when no signal arrives within `window` of
    /// subscribing or of the previous item.
    pub fn timeout(&self, window: Duration, fallback: Flux<T>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::from_publisher(TimeoutPublisher::new(
            self.clone(),
            window,
            Some(fallback),
            scheduler,
        ))
    }

    /// Like [`Flux::timeout`], but fails with `ErrorKind::Timeout`.
    pub fn timeout_error(&self, window: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::from_publisher(TimeoutPublisher::new(self.clone(), window, None, scheduler))
    }

    pub fn take(&self, limit: u64) -> Self {
        Self::from_publisher(TakePublisher::new(self.clone(), limit))
    }
}

impl Flux<i64> {
    /// `count` consecutive integers starting at `start`.
    pub fn range(start: i64, count: u64) -> Self {
        Self::pull(RangeSource::new(start, count))
    }
}

impl<T: Clone + Send + 'static> Flux<T> {
    /// One upstream for all subscribers while at least one is attached.
    pub fn share(&self) -> Self {
        self.publish(HubConfig::share()).as_flux()
    }

    /// Connects now and replays the last `history` items to late
    /// subscribers.
    pub fn replay(&self, history: usize) -> Self {
        self.publish(HubConfig::replay(history)).as_flux()
    }

    pub fn publish(&self, config: HubConfig) -> MulticastHub<T> {
        MulticastHub::new(self.clone(), config)
    }
}
