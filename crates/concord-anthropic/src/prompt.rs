// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt construction and verdict parsing for the moderation calls.

use std::fmt::Write as _;

use concord_core::types::{ThreadContext, TopicVerdict};
use serde::Deserialize;
use tracing::debug;

/// System prompt for topic classification.
pub const TOPIC_SYSTEM_PROMPT: &str = "You review draft messages in a shared conversation \
thread between two people. Decide whether the draft belongs in the thread, judged against \
the thread title, its topic, and the recent messages. Be conservative: mark a draft off-topic \
only when it clearly has nothing to do with the thread. When in doubt, treat it as relevant. \
Answer with a single JSON object and nothing else: \
{\"relevant\": true or false, \"reason\": \"one short sentence shown to the sender\"}.";

/// System prompt for rephrasing.
pub const REPHRASE_SYSTEM_PROMPT: &str = "You help people keep a shared conversation calm. \
Rewrite the draft message so it reads as respectful and non-confrontational while keeping \
its meaning and every concrete detail such as dates, times, places and amounts. Write in the \
sender's voice. Answer with the rewritten message only, without quotes or commentary.";

/// Renders the thread context and draft as the user turn of a request.
pub fn render_context(context: &ThreadContext, draft: &str) -> String {
    let thread = &context.thread;
    let mut out = String::new();
    let _ = writeln!(out, "Thread title: {}", thread.title);
    let _ = writeln!(
        out,
        "Thread topic: {}",
        thread.topic.as_deref().unwrap_or("(none)")
    );

    let recent: Vec<_> = context
        .recent
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .collect();
    if recent.is_empty() {
        out.push_str("Recent messages: (none)\n");
    } else {
        out.push_str("Recent messages:\n");
        for message in recent {
            let _ = writeln!(out, "- {}: {}", message.sender_id, message.text.trim());
        }
    }

    let _ = write!(out, "\nDraft:\n{}", draft.trim());
    out
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    relevant: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Parses the model's topic answer.
///
/// The first `{...}` span is read as `{"relevant", "reason"}`. Anything that
/// does not parse counts as relevant.
pub fn parse_topic_verdict(answer: &str) -> TopicVerdict {
    let json = match (answer.find('{'), answer.rfind('}')) {
        (Some(start), Some(end)) if start < end => &answer[start..=end],
        _ => {
            debug!("topic answer carried no JSON object, treating as relevant");
            return TopicVerdict::relevant();
        }
    };

    match serde_json::from_str::<RawVerdict>(json) {
        Ok(RawVerdict { relevant: true, .. }) => TopicVerdict::relevant(),
        Ok(RawVerdict {
            relevant: false,
            reason,
        }) => TopicVerdict {
            relevant: false,
            reason: reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        },
        Err(e) => {
            debug!(error = %e, "unparseable topic answer, treating as relevant");
            TopicVerdict::relevant()
        }
    }
}

/// Cleans a rephrase answer: trims whitespace and one pair of wrapping quotes.
pub fn clean_rephrase(answer: &str) -> String {
    let trimmed = answer.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}
