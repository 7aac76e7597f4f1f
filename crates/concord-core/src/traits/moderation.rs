// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Moderation provider trait for topic classification and tone rephrasing.

use async_trait::async_trait;

use crate::error::ConcordError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ThreadContext, TopicVerdict};

/// Adapter for the external service that reviews drafted messages.
///
/// Both calls are latency-bound and may fail; callers decide how to degrade.
#[async_trait]
pub trait ModerationProvider: PluginAdapter {
    /// Classifies whether `draft` belongs in the thread described by `context`.
    async fn classify_topic(
        &self,
        context: &ThreadContext,
        draft: &str,
    ) -> Result<TopicVerdict, ConcordError>;

    /// Produces a less confrontational phrasing of `draft`.
    async fn rephrase(&self, context: &ThreadContext, draft: &str) -> Result<String, ConcordError>;
}
