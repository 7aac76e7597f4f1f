// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock change feed for deterministic subscriber tests.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use concord_core::traits::{ChangeFeed, FeedStream, PluginAdapter};
use concord_core::types::{
    AdapterType, FeedChannel, FeedEvent, FeedEventType, HealthStatus, UserId,
};
use concord_core::ConcordError;
use tokio::sync::mpsc;
use tokio::time::Instant;

type EventSender = mpsc::UnboundedSender<Result<FeedEvent, ConcordError>>;

/// A change feed whose subscriptions are in-process channels.
///
/// Events pushed with [`MockChangeFeed::push`] go to the newest live
/// subscription. Subscribe failures can be scripted.
pub struct MockChangeFeed {
    state: Mutex<FeedState>,
}

#[derive(Default)]
struct FeedState {
    fail_remaining: u32,
    always_fail: bool,
    subscribe_times: Vec<Instant>,
    identities: Vec<UserId>,
    last_channels: Vec<FeedChannel>,
    unsubscribed: Vec<UserId>,
    live: Vec<EventSender>,
}

impl MockChangeFeed {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FeedState::default()),
        }
    }

    /// Rejects the next `n` subscribe calls.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_remaining = n;
    }

    /// Rejects every subscribe call while `fail` is set.
    pub fn always_fail(&self, fail: bool) {
        self.lock().always_fail = fail;
    }

    /// Delivers a row to the newest live subscription. Returns `false` if there is none.
    pub fn push(&self, channel: FeedChannel, event_type: FeedEventType, row: serde_json::Value) -> bool {
        self.push_event(FeedEvent {
            channel,
            event_type,
            row,
        })
    }

    pub fn push_event(&self, event: FeedEvent) -> bool {
        let mut state = self.lock();
        state.live.retain(|tx| !tx.is_closed());
        match state.live.last() {
            Some(tx) => tx.send(Ok(event)).is_ok(),
            None => false,
        }
    }

    /// Fails every live subscription with a transport error.
    pub fn drop_connection(&self) {
        let live = std::mem::take(&mut self.lock().live);
        for tx in live {
            let _ = tx.send(Err(ConcordError::transport("connection reset by peer")));
        }
    }

    /// Subscriptions whose stream is still held by a consumer.
    pub fn live_subscriptions(&self) -> usize {
        self.lock().live.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// When each subscribe call happened, successful or not.
    pub fn subscribe_times(&self) -> Vec<Instant> {
        self.lock().subscribe_times.clone()
    }

    /// Identities passed to successful subscribe calls, in order.
    pub fn subscribed_identities(&self) -> Vec<UserId> {
        self.lock().identities.clone()
    }

    pub fn last_channels(&self) -> Vec<FeedChannel> {
        self.lock().last_channels.clone()
    }

    pub fn unsubscribed(&self) -> Vec<UserId> {
        self.lock().unsubscribed.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChangeFeed {
    fn name(&self) -> &str {
        "mock-change-feed"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ChangeFeed
    }

    async fn health_check(&self) -> Result<HealthStatus, ConcordError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ChangeFeed for MockChangeFeed {
    async fn subscribe(
        &self,
        identity: &UserId,
        channels: &[FeedChannel],
    ) -> Result<FeedStream, ConcordError> {
        let mut state = self.lock();
        state.subscribe_times.push(Instant::now());

        if state.always_fail {
            return Err(ConcordError::transport("subscribe rejected"));
        }
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(ConcordError::transport("subscribe rejected"));
        }

        state.identities.push(identity.clone());
        state.last_channels = channels.to_vec();
        let (tx, rx) = mpsc::unbounded_channel();
        state.live.retain(|tx| !tx.is_closed());
        state.live.push(tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, identity: &UserId) -> Result<(), ConcordError> {
        self.lock().unsubscribed.push(identity.clone());
        Ok(())
    }
}
