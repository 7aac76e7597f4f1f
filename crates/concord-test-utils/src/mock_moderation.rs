// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock moderation provider with canned verdicts and rephrasings.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use concord_core::traits::{ModerationProvider, PluginAdapter};
use concord_core::types::{AdapterType, HealthStatus, ThreadContext, TopicVerdict};
use concord_core::ConcordError;

/// A moderation provider that answers from configuration.
///
/// By default every draft is relevant and the rephrase is the draft prefixed
/// with `"Kindly: "`.
pub struct MockModerationProvider {
    script: Mutex<Script>,
    classify_calls: AtomicUsize,
    rephrase_calls: AtomicUsize,
    last_context: Mutex<Option<ThreadContext>>,
}

struct Script {
    verdict: TopicVerdict,
    rephrase: Option<String>,
    fail_classify: bool,
    fail_rephrase: bool,
    delay: Option<Duration>,
    draft_delays: Vec<(String, Duration)>,
}

impl MockModerationProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                verdict: TopicVerdict::relevant(),
                rephrase: None,
                fail_classify: false,
                fail_rephrase: false,
                delay: None,
                draft_delays: Vec::new(),
            }),
            classify_calls: AtomicUsize::new(0),
            rephrase_calls: AtomicUsize::new(0),
            last_context: Mutex::new(None),
        }
    }

    pub fn with_verdict(self, verdict: TopicVerdict) -> Self {
        self.set_verdict(verdict);
        self
    }

    /// Every rephrase returns `text`.
    pub fn with_rephrase(self, text: impl Into<String>) -> Self {
        self.script().rephrase = Some(text.into());
        self
    }

    pub fn failing_classify(self) -> Self {
        self.script().fail_classify = true;
        self
    }

    pub fn failing_rephrase(self) -> Self {
        self.script().fail_rephrase = true;
        self
    }

    /// Both calls sleep for `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.script().delay = Some(delay);
        self
    }

    /// Calls for exactly `draft` sleep for `delay`, overriding [`Self::with_delay`].
    pub fn with_delay_for(self, draft: impl Into<String>, delay: Duration) -> Self {
        self.script().draft_delays.push((draft.into(), delay));
        self
    }

    pub fn set_verdict(&self, verdict: TopicVerdict) {
        self.script().verdict = verdict;
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn rephrase_calls(&self) -> usize {
        self.rephrase_calls.load(Ordering::SeqCst)
    }

    /// Total provider calls of either kind.
    pub fn calls(&self) -> usize {
        self.classify_calls() + self.rephrase_calls()
    }

    pub fn last_context(&self) -> Option<ThreadContext> {
        self.last_context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self, draft: &str) {
        let delay = {
            let script = self.script();
            script
                .draft_delays
                .iter()
                .find(|(text, _)| text == draft)
                .map(|(_, delay)| *delay)
                .or(script.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockModerationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockModerationProvider {
    fn name(&self) -> &str {
        "mock-moderation"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Moderation
    }

    async fn health_check(&self) -> Result<HealthStatus, ConcordError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ModerationProvider for MockModerationProvider {
    async fn classify_topic(
        &self,
        context: &ThreadContext,
        draft: &str,
    ) -> Result<TopicVerdict, ConcordError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_context
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(context.clone());
        self.pause(draft).await;

        let (fail, verdict) = {
            let script = self.script();
            (script.fail_classify, script.verdict.clone())
        };
        if fail {
            return Err(ConcordError::provider("classifier unavailable"));
        }
        Ok(verdict)
    }

    async fn rephrase(&self, _context: &ThreadContext, draft: &str) -> Result<String, ConcordError> {
        self.rephrase_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(draft).await;

        let (fail, canned) = {
            let script = self.script();
            (script.fail_rephrase, script.rephrase.clone())
        };
        if fail {
            return Err(ConcordError::provider("rephraser unavailable"));
        }
        Ok(canned.unwrap_or_else(|| format!("Kindly: {draft}")))
    }
}
