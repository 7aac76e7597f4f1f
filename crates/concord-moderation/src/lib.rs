// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Moderation pipeline gating whether a draft is sent as-is, rephrased, or rejected.
//!
//! The topic-relevance check and the tone rephrase run concurrently against
//! the same thread context. The pipeline never decides whether a suggestion is
//! applied automatically; that is the caller's policy.

use std::future::Future;
use std::sync::Arc;

use concord_config::model::ModerationConfig;
use concord_core::types::{ModerationDecision, ThreadContext, ThreadId};
use concord_core::{MessageStore, ModerationProvider};
use tracing::{debug, warn};

/// Reason given when the provider judged a draft off-topic without saying why.
pub const DEFAULT_OFF_TOPIC_REASON: &str =
    "This message doesn't seem related to this thread's topic.";

/// Reviews drafts with a [`ModerationProvider`] under a caller-visible timeout.
pub struct ModerationPipeline {
    provider: Arc<dyn ModerationProvider>,
    store: Option<Arc<dyn MessageStore>>,
    config: ModerationConfig,
}

impl ModerationPipeline {
    pub fn new(
        provider: Arc<dyn ModerationProvider>,
        store: Arc<dyn MessageStore>,
        config: ModerationConfig,
    ) -> Self {
        Self {
            provider,
            store: Some(store),
            config,
        }
    }

    /// A pipeline with no store attached; only [`Self::review_with_context`] can succeed.
    pub fn detached(provider: Arc<dyn ModerationProvider>, config: ModerationConfig) -> Self {
        Self {
            provider,
            store: None,
            config,
        }
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    /// Reviews `draft` against the last messages of `thread_id`.
    ///
    /// Never fails: a store or provider failure and a timeout all come back as a
    /// rejected decision carrying the configured generic reason.
    pub async fn review(&self, draft: &str, thread_id: &ThreadId) -> ModerationDecision {
        self.bounded(async {
            let Some(store) = &self.store else {
                warn!(thread_id = %thread_id, "no store attached, cannot load moderation context");
                return self.unavailable();
            };
            let context = match store
                .thread_context(thread_id, self.config.context_messages)
                .await
            {
                Ok(context) => context,
                Err(e) => {
                    warn!(thread_id = %thread_id, error = %e, "failed to load moderation context");
                    return self.unavailable();
                }
            };
            self.decide(&context, draft).await
        })
        .await
    }

    /// Reviews `draft` against an already loaded context.
    pub async fn review_with_context(
        &self,
        context: &ThreadContext,
        draft: &str,
    ) -> ModerationDecision {
        self.bounded(self.decide(context, draft)).await
    }

    async fn bounded(&self, review: impl Future<Output = ModerationDecision>) -> ModerationDecision {
        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, review).await {
            Ok(decision) => decision,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "moderation review timed out");
                self.unavailable()
            }
        }
    }

    async fn decide(&self, context: &ThreadContext, draft: &str) -> ModerationDecision {
        let thread_id = &context.thread.id;
        let (topic, rephrased) = tokio::join!(
            self.provider.classify_topic(context, draft),
            self.provider.rephrase(context, draft),
        );

        let verdict = match topic {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "topic classification failed");
                return self.unavailable();
            }
        };

        if !verdict.relevant {
            let reason = verdict
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_OFF_TOPIC_REASON.to_string());
            debug!(thread_id = %thread_id, reason = %reason, "draft rejected as off-topic");
            return ModerationDecision::off_topic(reason);
        }

        let suggested = match rephrased {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                debug!(thread_id = %thread_id, "rephrase came back empty, offering the original");
                draft.to_string()
            }
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "rephrase failed, offering the original");
                draft.to_string()
            }
        };

        debug!(
            thread_id = %thread_id,
            changed = suggested != draft,
            "draft approved"
        );
        ModerationDecision::approved(suggested)
    }

    fn unavailable(&self) -> ModerationDecision {
        ModerationDecision::failed(self.config.rejection_reason.clone())
    }
}
