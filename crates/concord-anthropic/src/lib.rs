// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic-backed moderation provider for Concord.
//!
//! Implements [`ModerationProvider`] with two non-streaming Messages API
//! calls: a topic classification answered as JSON and a rephrase answered
//! as plain text.

pub mod client;
pub mod prompt;
pub mod types;

use async_trait::async_trait;
use concord_config::model::AnthropicConfig;
use concord_core::traits::{ModerationProvider, PluginAdapter};
use concord_core::types::{AdapterType, HealthStatus, ThreadContext, TopicVerdict};
use concord_core::ConcordError;
use tracing::{debug, info};

use crate::client::AnthropicClient;
use crate::prompt::{
    clean_rephrase, parse_topic_verdict, render_context, REPHRASE_SYSTEM_PROMPT,
    TOPIC_SYSTEM_PROMPT,
};
use crate::types::{ApiMessage, MessageRequest};

/// Topic verdicts are short; this caps the classification call.
const CLASSIFY_MAX_TOKENS: u32 = 128;

/// Moderation provider backed by the Anthropic Messages API.
pub struct AnthropicModerationProvider {
    client: AnthropicClient,
    max_tokens: u32,
}

impl AnthropicModerationProvider {
    /// Creates a provider from configuration.
    ///
    /// The API key is taken from config first, then the `ANTHROPIC_API_KEY`
    /// environment variable.
    pub fn from_config(config: &AnthropicConfig) -> Result<Self, ConcordError> {
        let api_key = resolve_api_key(config)?;
        let client = AnthropicClient::new(&api_key, &config.api_version, config.model.clone())?;
        info!(model = %config.model, "Anthropic moderation provider initialized");

        Ok(Self {
            client,
            max_tokens: config.max_tokens,
        })
    }

    #[cfg(test)]
    fn with_client(client: AnthropicClient, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    fn request(&self, system: &str, user: String, max_tokens: u32) -> MessageRequest {
        MessageRequest {
            model: self.client.model().to_string(),
            system: Some(system.to_string()),
            messages: vec![ApiMessage::user(user)],
            max_tokens,
        }
    }
}

/// Resolves the API key from config or environment.
fn resolve_api_key(config: &AnthropicConfig) -> Result<String, ConcordError> {
    if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
        && !key.is_empty()
    {
        return Ok(key);
    }

    Err(ConcordError::Config(
        "Anthropic API key not found. Set anthropic.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
    ))
}

#[async_trait]
impl PluginAdapter for AnthropicModerationProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Moderation
    }

    async fn health_check(&self) -> Result<HealthStatus, ConcordError> {
        // Construction already validated the key and headers; no API call here.
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ModerationProvider for AnthropicModerationProvider {
    async fn classify_topic(
        &self,
        context: &ThreadContext,
        draft: &str,
    ) -> Result<TopicVerdict, ConcordError> {
        let request = self.request(
            TOPIC_SYSTEM_PROMPT,
            render_context(context, draft),
            CLASSIFY_MAX_TOKENS.min(self.max_tokens),
        );
        let response = self.client.complete(&request).await?;
        let verdict = parse_topic_verdict(&response.text());
        debug!(
            thread_id = %context.thread.id,
            relevant = verdict.relevant,
            "topic classified"
        );
        Ok(verdict)
    }

    async fn rephrase(&self, context: &ThreadContext, draft: &str) -> Result<String, ConcordError> {
        let request = self.request(
            REPHRASE_SYSTEM_PROMPT,
            render_context(context, draft),
            self.max_tokens,
        );
        let response = self.client.complete(&request).await?;
        Ok(clean_rephrase(&response.text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::types::{ThreadInfo, ThreadKind, ThreadStatus};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context() -> ThreadContext {
        ThreadContext {
            thread: ThreadInfo {
                id: "t1".into(),
                title: "Weekend pickup".into(),
                topic: Some("Saturday handover".into()),
                kind: ThreadKind::Standard,
                status: ThreadStatus::Open,
                require_ai_approval: true,
            },
            recent: Vec::new(),
        }
    }

    fn answer(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "model": "claude-haiku-4-5-20250901",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
    }

    fn provider(server: &MockServer) -> AnthropicModerationProvider {
        let client = AnthropicClient::new("k", "2023-06-01", "claude-haiku-4-5-20250901".into())
            .unwrap()
            .with_base_url(server.uri());
        AnthropicModerationProvider::with_client(client, 512)
    }

    #[test]
    fn config_key_takes_precedence() {
        let config = AnthropicConfig {
            api_key: Some("sk-config".into()),
            ..AnthropicConfig::default()
        };
        assert_eq!(resolve_api_key(&config).unwrap(), "sk-config");
    }

    #[tokio::test]
    async fn classify_sends_topic_prompt_and_parses_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "system": TOPIC_SYSTEM_PROMPT,
                "max_tokens": CLASSIFY_MAX_TOKENS
            })))
            .respond_with(answer(
                "{\"relevant\": false, \"reason\": \"This is about school fees.\"}",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let verdict = provider(&server)
            .classify_topic(&context(), "Pay the fees")
            .await
            .unwrap();
        assert_eq!(verdict, TopicVerdict::off_topic("This is about school fees."));
    }

    #[tokio::test]
    async fn classify_treats_prose_as_relevant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer("Looks fine to me."))
            .mount(&server)
            .await;

        let verdict = provider(&server)
            .classify_topic(&context(), "10am works")
            .await
            .unwrap();
        assert!(verdict.relevant);
    }

    #[tokio::test]
    async fn rephrase_returns_cleaned_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "system": REPHRASE_SYSTEM_PROMPT,
                "max_tokens": 512
            })))
            .respond_with(answer("\"Could we move pickup to 11am?\"\n"))
            .mount(&server)
            .await;

        let text = provider(&server)
            .rephrase(&context(), "You're late AGAIN. 11am.")
            .await
            .unwrap();
        assert_eq!(text, "Could we move pickup to 11am?");
    }

    #[tokio::test]
    async fn api_failure_surfaces_as_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .rephrase(&context(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ConcordError::Provider { .. }));
    }
}
