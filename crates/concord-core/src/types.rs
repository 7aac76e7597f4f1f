// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the bus, feed, aggregator, moderation, and session crates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a message.
    MessageId
);
string_id!(
    /// Unique identifier for a conversation thread.
    ThreadId
);
string_id!(
    /// Unique identifier for a signed-in user.
    UserId
);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    ChangeFeed,
    Store,
    Moderation,
}

// --- Messages ---

/// Discriminant for the kinds of rows stored in a thread's message log.
///
/// Unknown kinds coming off the wire deserialize as [`MessageKind::Unknown`]
/// so they can be rendered as a fallback instead of failing the whole row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    UserMessage,
    AiMessage,
    CustomerSupport,
    RequestClose,
    CloseAccepted,
    CloseDeclined,
    #[serde(other)]
    Unknown,
}

/// Provenance attached to a message whose text came out of moderation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDetails {
    /// The text suggested by the moderation pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
    /// The draft the user originally typed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_message: Option<String>,
}

/// A persisted message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender_id: UserId,
    pub text: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<MessageDetails>,
}

impl Message {
    /// Ordering key: timestamp first, id as tie-break.
    pub fn order_key(&self) -> (DateTime<Utc>, &MessageId) {
        (self.timestamp, &self.id)
    }
}

/// A message to be inserted; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub thread_id: ThreadId,
    pub sender_id: UserId,
    pub text: String,
    pub kind: MessageKind,
    pub details: Option<MessageDetails>,
}

// --- Read receipts and unread counts ---

/// Per-(message, user) read state. `read_at` is set at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub user_id: UserId,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl ReadReceipt {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// A receipt joined with the thread its message belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadReceipt {
    pub thread_id: ThreadId,
    pub receipt: ReadReceipt,
}

/// Derived unread counts. `total` always equals the sum of `per_thread`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnreadCountSnapshot {
    per_thread: BTreeMap<ThreadId, u32>,
    total: u32,
}

impl UnreadCountSnapshot {
    /// Build a snapshot from the current user's receipts. Read receipts are skipped.
    pub fn from_receipts<'a>(receipts: impl IntoIterator<Item = &'a ThreadReceipt>) -> Self {
        let mut per_thread: BTreeMap<ThreadId, u32> = BTreeMap::new();
        for entry in receipts {
            if entry.receipt.is_read() {
                continue;
            }
            *per_thread.entry(entry.thread_id.clone()).or_insert(0) += 1;
        }
        let total = per_thread.values().sum();
        Self { per_thread, total }
    }

    pub fn per_thread(&self) -> &BTreeMap<ThreadId, u32> {
        &self.per_thread
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Unread count for one thread, zero when the thread has none.
    pub fn count_for(&self, thread_id: &ThreadId) -> u32 {
        self.per_thread.get(thread_id).copied().unwrap_or(0)
    }
}

// --- Threads ---

/// What a thread is for; decides which message kind a send produces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThreadKind {
    /// A conversation between co-parents.
    Standard,
    /// A conversation with the AI assistant.
    AiAssistant,
    /// A conversation with customer support.
    CustomerSupport,
}

/// Persisted thread status, maintained by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThreadStatus {
    Open,
    Closed,
}

/// Thread metadata and policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub title: String,
    #[serde(default)]
    pub topic: Option<String>,
    pub kind: ThreadKind,
    pub status: ThreadStatus,
    /// Outgoing messages must pass the moderation pipeline.
    #[serde(default)]
    pub require_ai_approval: bool,
}

/// Thread metadata plus the most recent messages, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadContext {
    pub thread: ThreadInfo,
    pub recent: Vec<Message>,
}

/// Derived per-thread close-request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum CloseRequestState {
    /// No close request has ever been made.
    NoRequest,
    /// The most recent close request still awaits a decision.
    Pending,
    /// The most recent close request was declined.
    Resolved,
}

/// Per-user settings consulted by the caller of the moderation pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Persist the moderated suggestion without asking for confirmation.
    #[serde(default)]
    pub auto_accept_suggestions: bool,
}

// --- Moderation ---

/// Answer from a topic-relevance classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicVerdict {
    pub relevant: bool,
    pub reason: Option<String>,
}

impl TopicVerdict {
    pub fn relevant() -> Self {
        Self {
            relevant: true,
            reason: None,
        }
    }

    pub fn off_topic(reason: impl Into<String>) -> Self {
        Self {
            relevant: false,
            reason: Some(reason.into()),
        }
    }
}

/// The off-topic part of a moderation decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffTopic {
    pub rejected: bool,
    pub reason: String,
}

/// Transient result of reviewing a draft. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModerationDecision {
    pub rejected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_message: Option<String>,
    pub off_topic: Option<OffTopic>,
}

impl ModerationDecision {
    /// The draft passed the topic check; `suggested` is the text to offer.
    pub fn approved(suggested: impl Into<String>) -> Self {
        Self {
            rejected: false,
            reason: None,
            suggested_message: Some(suggested.into()),
            off_topic: None,
        }
    }

    /// The draft was judged off-topic.
    pub fn off_topic(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            rejected: true,
            reason: Some(reason.clone()),
            suggested_message: None,
            off_topic: Some(OffTopic {
                rejected: true,
                reason,
            }),
        }
    }

    /// The review could not be completed (provider failure, timeout).
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            rejected: true,
            reason: Some(reason.into()),
            suggested_message: None,
            off_topic: None,
        }
    }
}

// --- Change feed ---

/// Observable state of the change-feed subscriber.
///
/// `RetryScheduled` is the disconnected state with a reconnect timer armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedStatus {
    /// No live subscription and nothing scheduled.
    Disconnected,
    /// Opening the subscription; `attempt` is the number of failures so far.
    Connecting { attempt: u32 },
    /// Subscription acknowledged; events are flowing.
    Subscribed,
    /// The transport failed; a reconnect fires after `delay`.
    RetryScheduled {
        attempt: u32,
        #[serde(with = "duration_millis")]
        delay: std::time::Duration,
    },
    /// Reconnect attempts are exhausted. Terminal until the identity changes.
    Failed { attempts: u32 },
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedStatus::Disconnected => write!(f, "disconnected"),
            FeedStatus::Connecting { attempt } => write!(f, "connecting (attempt {attempt})"),
            FeedStatus::Subscribed => write!(f, "subscribed"),
            FeedStatus::RetryScheduled { attempt, delay } => {
                write!(f, "retry {attempt} in {}ms", delay.as_millis())
            }
            FeedStatus::Failed { attempts } => write!(f, "failed after {attempts} attempts"),
        }
    }
}

mod duration_millis {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &std::time::Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Logical channels multiplexed over one change-feed subscription.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedChannel {
    MessageInserted,
    ReadReceiptChanged,
    CalendarEventChanged,
}

impl FeedChannel {
    /// Every channel the subscriber attaches on connect.
    pub const ALL: [FeedChannel; 3] = [
        FeedChannel::MessageInserted,
        FeedChannel::ReadReceiptChanged,
        FeedChannel::CalendarEventChanged,
    ];
}

/// Row-level change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEventType {
    Insert,
    Update,
}

/// A raw notification from the change feed. `row` is untrusted.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub channel: FeedChannel,
    pub event_type: FeedEventType,
    pub row: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn receipt(thread: &str, message: &str, read: bool) -> ThreadReceipt {
        ThreadReceipt {
            thread_id: thread.into(),
            receipt: ReadReceipt {
                message_id: message.into(),
                user_id: "u1".into(),
                read_at: read.then(Utc::now),
            },
        }
    }

    #[test]
    fn message_kind_parses_snake_case() {
        assert_eq!(
            MessageKind::from_str("request_close").unwrap(),
            MessageKind::RequestClose
        );
        assert_eq!(MessageKind::CloseDeclined.to_string(), "close_declined");
    }

    #[test]
    fn unknown_message_kind_deserializes_to_fallback() {
        let kind: MessageKind = serde_json::from_str("\"video_call\"").unwrap();
        assert_eq!(kind, MessageKind::Unknown);
    }

    #[test]
    fn snapshot_of_no_receipts_is_empty() {
        let snapshot = UnreadCountSnapshot::from_receipts(&Vec::<ThreadReceipt>::new());
        assert!(snapshot.per_thread().is_empty());
        assert_eq!(snapshot.total(), 0);
    }

    #[test]
    fn snapshot_groups_by_thread_and_skips_read() {
        let receipts = vec![
            receipt("t1", "m1", false),
            receipt("t1", "m2", false),
            receipt("t2", "m3", false),
            receipt("t2", "m4", true),
        ];
        let snapshot = UnreadCountSnapshot::from_receipts(&receipts);
        assert_eq!(snapshot.count_for(&"t1".into()), 2);
        assert_eq!(snapshot.count_for(&"t2".into()), 1);
        assert_eq!(snapshot.count_for(&"t3".into()), 0);
        assert_eq!(snapshot.total(), 3);
        assert_eq!(
            snapshot.total(),
            snapshot.per_thread().values().sum::<u32>()
        );
    }

    #[test]
    fn off_topic_decision_has_no_suggestion() {
        let decision = ModerationDecision::off_topic("about school pickup, not the budget");
        assert!(decision.rejected);
        assert!(decision.suggested_message.is_none());
        assert!(decision.off_topic.as_ref().is_some_and(|o| o.rejected));
    }

    #[test]
    fn message_order_key_breaks_ties_by_id() {
        let ts = Utc::now();
        let base = Message {
            id: "b".into(),
            thread_id: "t".into(),
            sender_id: "u".into(),
            text: String::new(),
            kind: MessageKind::UserMessage,
            timestamp: ts,
            details: None,
        };
        let other = Message {
            id: "a".into(),
            ..base.clone()
        };
        assert!(other.order_key() < base.order_key());
    }
}
