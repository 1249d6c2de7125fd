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

//! Bridge from the demand protocol to `futures::Stream`.
//!
//! ```
//! use backflow::Flux;
//! use futures::StreamExt;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let items: Vec<i64> = Flux::range(1, 3)
//!     .into_stream(2)
//!     .map(|item| item.unwrap())
//!     .collect()
//!     .await;
//! assert_eq!(items, vec![1, 2, 3]);
//! # });
//! ```

use crate::consumer::SubscriptionLink;
use crate::error::FlowError;
use crate::flux::Flux;
use crate::observability::events;
use crate::protocol::{Subscriber, Subscription};
use futures::channel::mpsc;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

const COMPONENT: &str = "stream_bridge";

/// A subscription read as an async stream of `Result<T, FlowError>`.
///
/// Keeps `prefetch` items requested ahead of the reader and asks for one
/// more per item handed out. Dropping the stream cancels the subscription.
pub struct FluxStream<T> {
    receiver: mpsc::UnboundedReceiver<Result<T, FlowError>>,
    link: Arc<SubscriptionLink>,
}

impl<T: Send + 'static> FluxStream<T> {
    pub(crate) fn subscribe(flux: &Flux<T>, prefetch: u64) -> Self {
        let (sender, receiver) = mpsc::unbounded();
        let link = SubscriptionLink::new();
        flux.subscribe(Arc::new(BridgeSubscriber {
            sender,
            link: link.clone(),
            prefetch: prefetch.max(1),
        }));
        Self { receiver, link }
    }
}

impl<T> Stream for FluxStream<T> {
    type Item = Result<T, FlowError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.receiver.poll_next_unpin(cx);
        if let Poll::Ready(Some(Ok(_))) = &polled {
            if let Some(subscription) = self.link.current() {
                subscription.request(1);
            }
        }
        polled
    }
}

impl<T> Drop for FluxStream<T> {
    fn drop(&mut self) {
        if self.link.current().is_some() {
            debug!(
                event = events::SUBSCRIPTION_CANCELLED,
                component = COMPONENT,
                "stream dropped before the flux terminated"
            );
        }
        self.link.dispose();
    }
}

struct BridgeSubscriber<T> {
    sender: mpsc::UnboundedSender<Result<T, FlowError>>,
    link: Arc<SubscriptionLink>,
    prefetch: u64,
}

impl<T: Send + 'static> Subscriber<T> for BridgeSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self.link.attach(subscription.clone()) {
            subscription.request(self.prefetch);
        }
    }

    fn on_next(&self, item: T) {
        if self.sender.unbounded_send(Ok(item)).is_err() {
            if let Some(subscription) = self.link.current() {
                subscription.cancel();
            }
        }
    }

    fn on_error(&self, error: FlowError) {
        self.link.finish();
        let _ = self.sender.unbounded_send(Err(error));
        self.sender.close_channel();
    }

    fn on_complete(&self) {
        self.link.finish();
        self.sender.close_channel();
    }
}
