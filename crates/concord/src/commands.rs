// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `concord config`, `concord close-state` and `concord review`.

use std::path::Path;
use std::sync::Arc;

use concord_anthropic::AnthropicModerationProvider;
use concord_config::model::ConcordConfig;
use concord_core::types::{
    CloseRequestState, Message, ThreadContext, ThreadInfo, ThreadKind, ThreadStatus,
};
use concord_core::ConcordError;
use concord_moderation::ModerationPipeline;
use concord_session::{derive_close_state, pending_request};
use tracing::info;

/// Prints the effective configuration as TOML.
pub fn run_config(config: &ConcordConfig) -> Result<(), ConcordError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| ConcordError::Internal(format!("failed to render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}

/// Derived close state plus the id of the request still awaiting a decision.
#[derive(Debug, PartialEq, Eq)]
pub struct CloseStateReport {
    pub state: CloseRequestState,
    pub pending_request: Option<String>,
    pub messages: usize,
}

/// Parses a JSON message array and derives its close state.
///
/// Messages are put into log order before derivation, so the file may list
/// them in any order.
pub fn close_state_from_json(json: &str) -> Result<CloseStateReport, ConcordError> {
    let mut messages: Vec<Message> = serde_json::from_str(json)
        .map_err(|e| ConcordError::Validation(format!("invalid message log: {e}")))?;
    messages.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

    Ok(CloseStateReport {
        state: derive_close_state(&messages),
        pending_request: pending_request(&messages).map(|m| m.id.to_string()),
        messages: messages.len(),
    })
}

/// Prints the close state derived from the message log in `file`.
pub fn run_close_state(file: &Path) -> Result<(), ConcordError> {
    let json = std::fs::read_to_string(file).map_err(|e| {
        ConcordError::Validation(format!("cannot read {}: {e}", file.display()))
    })?;
    let report = close_state_from_json(&json)?;

    println!("{}", report.state);
    if let Some(id) = report.pending_request {
        println!("pending request: {id}");
    }
    Ok(())
}

/// Context for a one-off review: a fresh thread with no history.
fn review_context(title: String, topic: Option<String>) -> ThreadContext {
    ThreadContext {
        thread: ThreadInfo {
            id: "cli-review".into(),
            title,
            topic,
            kind: ThreadKind::Standard,
            status: ThreadStatus::Open,
            require_ai_approval: true,
        },
        recent: Vec::new(),
    }
}

/// Reviews `draft` with the configured provider and prints the decision as JSON.
pub async fn run_review(
    config: &ConcordConfig,
    draft: &str,
    title: String,
    topic: Option<String>,
) -> Result<(), ConcordError> {
    if draft.trim().is_empty() {
        return Err(ConcordError::Validation("draft is empty".into()));
    }

    let provider = AnthropicModerationProvider::from_config(&config.anthropic)?;
    let pipeline = ModerationPipeline::detached(Arc::new(provider), config.moderation.clone());

    let decision = pipeline
        .review_with_context(&review_context(title, topic), draft)
        .await;
    info!(rejected = decision.rejected, "review complete");

    let rendered = serde_json::to_string_pretty(&decision)
        .map_err(|e| ConcordError::Internal(format!("failed to render decision: {e}")))?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, kind: &str, minute: u32) -> serde_json::Value {
        let sender = if kind == "close_declined" { "bob" } else { "alice" };
        serde_json::json!({
            "id": id,
            "thread_id": "t1",
            "sender_id": sender,
            "text": "",
            "kind": kind,
            "timestamp": format!("2026-03-01T09:{minute:02}:00Z"),
        })
    }

    fn report(rows: &[serde_json::Value]) -> CloseStateReport {
        close_state_from_json(&serde_json::Value::from(rows.to_vec()).to_string()).unwrap()
    }

    #[test]
    fn request_then_text_is_pending() {
        let r = report(&[row("m1", "request_close", 1), row("m2", "user_message", 2)]);
        assert_eq!(r.state, CloseRequestState::Pending);
        assert_eq!(r.pending_request.as_deref(), Some("m1"));
        assert_eq!(r.messages, 2);
    }

    #[test]
    fn decline_then_new_request_cycles_state() {
        let declined = [
            row("m1", "request_close", 1),
            row("m2", "user_message", 2),
            row("m3", "close_declined", 3),
        ];
        assert_eq!(report(&declined).state, CloseRequestState::Resolved);

        let mut again = declined.to_vec();
        again.push(row("m4", "request_close", 4));
        let r = report(&again);
        assert_eq!(r.state, CloseRequestState::Pending);
        assert_eq!(r.pending_request.as_deref(), Some("m4"));
    }

    #[test]
    fn file_order_does_not_matter() {
        let r = report(&[row("m3", "close_declined", 3), row("m1", "request_close", 1)]);
        assert_eq!(r.state, CloseRequestState::Resolved);
    }

    #[test]
    fn empty_log_has_no_request() {
        assert_eq!(report(&[]).state, CloseRequestState::NoRequest);
    }

    #[test]
    fn malformed_log_is_a_validation_error() {
        let err = close_state_from_json("{\"not\": \"an array\"}").unwrap_err();
        assert!(matches!(err, ConcordError::Validation(_)));
    }

    #[test]
    fn config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&ConcordConfig::default()).unwrap();
        assert!(rendered.contains("[feed]"));
        assert!(rendered.contains("max_attempts = 5"));
    }

    #[tokio::test]
    async fn blank_review_draft_is_refused() {
        let err = run_review(&ConcordConfig::default(), "  ", "Pickup".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConcordError::Validation(_)));
    }
}
