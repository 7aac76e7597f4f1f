// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete stack for one signed-in user with
//! in-memory collaborators: store, change feed, bus, subscriber, unread
//! aggregator and moderation pipeline. Store writes are echoed through the
//! mock feed, so sessions see their own and others' messages arrive the same
//! way they would in production.

use std::sync::Arc;
use std::time::Duration;

use concord_bus::{EventBus, SubscriptionHandle};
use concord_config::model::ConcordConfig;
use concord_core::types::{FeedStatus, ThreadId, UserId, UserPreferences};
use concord_core::ConcordError;
use concord_feed::ChangeFeedSubscriber;
use concord_moderation::ModerationPipeline;
use concord_session::{SessionDeps, SessionEvent, ThreadMessagingSession};
use concord_unread::UnreadAggregator;
use tokio::sync::mpsc;

use crate::mock_feed::MockChangeFeed;
use crate::mock_moderation::MockModerationProvider;
use crate::store::InMemoryStore;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    user: UserId,
    config: ConcordConfig,
    provider: MockModerationProvider,
    preferences: UserPreferences,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ConcordConfig::default();
        config.feed.jitter_ratio = 0.0;
        Self {
            user: UserId::from("me"),
            config,
            provider: MockModerationProvider::new(),
            preferences: UserPreferences::default(),
        }
    }

    /// The signed-in user. Defaults to `"me"`.
    pub fn with_user(mut self, user: &str) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_config(mut self, config: ConcordConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_provider(mut self, provider: MockModerationProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_auto_accept(mut self, enabled: bool) -> Self {
        self.preferences.auto_accept_suggestions = enabled;
        self
    }

    /// Builds the stack, signs the user in and waits for the feed to subscribe.
    pub async fn build(self) -> Result<TestHarness, ConcordError> {
        let bus = EventBus::new();
        let feed = Arc::new(MockChangeFeed::new());
        let store = Arc::new(InMemoryStore::new());
        store.attach_feed(feed.clone());
        let provider = Arc::new(self.provider);

        let subscriber = Arc::new(ChangeFeedSubscriber::new(
            feed.clone(),
            bus.clone(),
            &self.config.feed,
        ));
        let aggregator = Arc::new(UnreadAggregator::new(
            store.clone(),
            self.user.clone(),
            bus.clone(),
        ));
        let pipeline = Arc::new(ModerationPipeline::new(
            provider.clone(),
            store.clone(),
            self.config.moderation.clone(),
        ));

        subscriber.set_identity(Some(self.user.clone())).await;
        let mut status = subscriber.status();
        status
            .wait_for(|s| *s == FeedStatus::Subscribed)
            .await
            .map_err(|e| ConcordError::Internal(format!("feed status channel closed: {e}")))?;
        let aggregator_handle = aggregator.start().await?;

        Ok(TestHarness {
            config: self.config,
            user: self.user,
            preferences: self.preferences,
            bus,
            store,
            feed,
            provider,
            subscriber,
            aggregator,
            pipeline,
            _aggregator_handle: aggregator_handle,
        })
    }
}

/// A complete in-memory Concord stack for one signed-in user.
pub struct TestHarness {
    pub config: ConcordConfig,
    pub user: UserId,
    pub preferences: UserPreferences,
    pub bus: EventBus,
    pub store: Arc<InMemoryStore>,
    pub feed: Arc<MockChangeFeed>,
    pub provider: Arc<MockModerationProvider>,
    pub subscriber: Arc<ChangeFeedSubscriber>,
    pub aggregator: Arc<UnreadAggregator>,
    pub pipeline: Arc<ModerationPipeline>,
    _aggregator_handle: SubscriptionHandle,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Session dependencies for `user` sharing this harness's collaborators.
    pub fn deps_for(&self, user: &UserId) -> SessionDeps {
        SessionDeps {
            store: self.store.clone(),
            bus: self.bus.clone(),
            pipeline: self.pipeline.clone(),
            user: user.clone(),
            preferences: self.preferences,
        }
    }

    /// Opens `thread` as the signed-in user.
    pub async fn open_session(
        &self,
        thread: &str,
    ) -> Result<(ThreadMessagingSession, mpsc::UnboundedReceiver<SessionEvent>), ConcordError> {
        ThreadMessagingSession::open(self.deps_for(&self.user), ThreadId::from(thread)).await
    }

    /// Opens `thread` as another participant on the same bus.
    pub async fn open_session_as(
        &self,
        user: &str,
        thread: &str,
    ) -> Result<(ThreadMessagingSession, mpsc::UnboundedReceiver<SessionEvent>), ConcordError> {
        ThreadMessagingSession::open(self.deps_for(&UserId::from(user)), ThreadId::from(thread))
            .await
    }

    /// Gives spawned tasks (feed run loop, recomputes) a chance to drain.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    /// Signs the user out, tearing down the feed subscription.
    pub async fn shutdown(&self) {
        self.subscriber.shutdown().await;
    }
}

/// Drains every event currently queued on `events`.
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
