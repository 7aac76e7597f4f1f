// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single live change-feed subscription for the signed-in identity.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed
//!                    ^  |          |
//!                    |  v          v (transport error)
//!               RetryScheduled <---+
//!                    |
//!                    v (attempts exhausted)
//!                  Failed
//! ```
//!
//! Changing the identity cancels the run (including any armed retry timer)
//! and starts a fresh one with the attempt counter at zero.

use std::sync::{Arc, Mutex, PoisonError};

use concord_bus::{BusEvent, EventBus};
use concord_config::model::FeedConfig;
use concord_core::traits::ChangeFeed;
use concord_core::types::{FeedChannel, FeedEvent, FeedStatus, UserId};
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::translate::{delivery_key, translate};
use crate::window::DeliveredWindow;

/// Owns the change-feed subscription and fans its events out through the bus.
pub struct ChangeFeedSubscriber {
    feed: Arc<dyn ChangeFeed>,
    bus: EventBus,
    backoff: Backoff,
    status: Arc<watch::Sender<FeedStatus>>,
    delivered: Arc<Mutex<DeliveredWindow>>,
    live: tokio::sync::Mutex<LiveState>,
}

#[derive(Default)]
struct LiveState {
    identity: Option<UserId>,
    run: Option<Run>,
}

struct Run {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ChangeFeedSubscriber {
    pub fn new(feed: Arc<dyn ChangeFeed>, bus: EventBus, config: &FeedConfig) -> Self {
        let (status, _) = watch::channel(FeedStatus::Disconnected);
        Self {
            feed,
            bus,
            backoff: Backoff::from_config(config),
            status: Arc::new(status),
            delivered: Arc::new(Mutex::new(DeliveredWindow::new(config.delivered_window))),
            live: tokio::sync::Mutex::new(LiveState::default()),
        }
    }

    /// Observes state changes. The receiver starts at the current state.
    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    pub fn current_status(&self) -> FeedStatus {
        *self.status.borrow()
    }

    /// The identity the subscriber is currently bound to.
    pub async fn identity(&self) -> Option<UserId> {
        self.live.lock().await.identity.clone()
    }

    /// Binds the subscriber to `identity`, tearing down any previous run first.
    ///
    /// `None` signs out: the subscription is released, no reconnect is
    /// scheduled and the status returns to [`FeedStatus::Disconnected`].
    /// Passing the current identity again restarts the subscription but keeps
    /// the delivered-event window, so replays are still suppressed.
    pub async fn set_identity(&self, identity: Option<UserId>) {
        let mut live = self.live.lock().await;

        if let Some(run) = live.run.take() {
            run.cancel.cancel();
            if let Err(e) = run.task.await
                && e.is_panic()
            {
                error!(error = %e, "change feed run panicked");
            }
            if let Some(previous) = &live.identity {
                if let Err(e) = self.feed.unsubscribe(previous).await {
                    warn!(identity = %previous, error = %e, "failed to release change feed subscription");
                }
                info!(identity = %previous, "change feed subscription torn down");
            }
        }

        if live.identity != identity {
            self.delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        live.identity = identity.clone();

        let Some(identity) = identity else {
            publish(&self.status, &self.bus, FeedStatus::Disconnected);
            return;
        };

        let cancel = CancellationToken::new();
        let ctx = RunContext {
            feed: Arc::clone(&self.feed),
            bus: self.bus.clone(),
            backoff: self.backoff,
            status: Arc::clone(&self.status),
            delivered: Arc::clone(&self.delivered),
            identity,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(ctx.run());
        live.run = Some(Run { cancel, task });
    }

    /// Equivalent to signing out.
    pub async fn shutdown(&self) {
        self.set_identity(None).await;
    }
}

struct RunContext {
    feed: Arc<dyn ChangeFeed>,
    bus: EventBus,
    backoff: Backoff,
    status: Arc<watch::Sender<FeedStatus>>,
    delivered: Arc<Mutex<DeliveredWindow>>,
    identity: UserId,
    cancel: CancellationToken,
}

impl RunContext {
    async fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            self.publish(FeedStatus::Connecting { attempt });
            debug!(identity = %self.identity, attempt, "opening change feed subscription");

            let subscribed = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.feed.subscribe(&self.identity, &FeedChannel::ALL) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    attempt = 0;
                    self.publish(FeedStatus::Subscribed);
                    info!(identity = %self.identity, "change feed subscribed");

                    loop {
                        let next = tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return,
                            next = stream.next() => next,
                        };
                        match next {
                            Some(Ok(event)) => self.deliver(&event),
                            Some(Err(e)) => {
                                warn!(identity = %self.identity, error = %e, "change feed transport error");
                                break;
                            }
                            None => {
                                warn!(identity = %self.identity, "change feed stream ended");
                                break;
                            }
                        }
                    }

                    drop(stream);
                    if let Err(e) = self.feed.unsubscribe(&self.identity).await {
                        warn!(identity = %self.identity, error = %e, "failed to release change feed subscription");
                    }
                }
                Err(e) => {
                    warn!(identity = %self.identity, attempt, error = %e, "change feed subscribe failed");
                }
            }

            if self.backoff.exhausted(attempt) {
                error!(
                    identity = %self.identity,
                    attempts = attempt,
                    "change feed reconnect attempts exhausted"
                );
                self.publish(FeedStatus::Failed { attempts: attempt });
                return;
            }

            let delay = self.backoff.jittered(attempt);
            attempt += 1;
            info!(
                identity = %self.identity,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "change feed reconnect scheduled"
            );
            self.publish(FeedStatus::RetryScheduled { attempt, delay });

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn deliver(&self, raw: &FeedEvent) {
        let event = match translate(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(channel = %raw.channel, error = %e, "dropping malformed change feed payload");
                return;
            }
        };

        if let Some(key) = delivery_key(&event) {
            let fresh = self
                .delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key);
            if !fresh {
                debug!(channel = %raw.channel, "duplicate change feed event ignored");
                return;
            }
        }

        self.bus.dispatch(event);
    }

    fn publish(&self, status: FeedStatus) {
        // A cancelled run must not overwrite the state set by its successor.
        if self.cancel.is_cancelled() {
            return;
        }
        publish(&self.status, &self.bus, status);
    }
}

fn publish(sender: &watch::Sender<FeedStatus>, bus: &EventBus, status: FeedStatus) {
    sender.send_replace(status);
    bus.dispatch(BusEvent::FeedStatusChanged(status));
}
