// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory message store behaving like the backing database.
//!
//! Writes can be echoed into a [`MockChangeFeed`] the way the real backend
//! notifies subscribers, so end-to-end tests exercise the feed path too.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use concord_core::traits::{MessageStore, PluginAdapter};
use concord_core::types::{
    AdapterType, FeedChannel, FeedEventType, HealthStatus, Message, MessageKind, NewMessage,
    ReadReceipt, ThreadContext, ThreadId, ThreadInfo, ThreadKind, ThreadReceipt, ThreadStatus,
    UserId,
};
use concord_core::ConcordError;

use crate::mock_feed::MockChangeFeed;

/// A [`MessageStore`] backed by plain collections.
///
/// Timestamps come from a fake clock that advances one second per insert,
/// so ordering is deterministic.
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    feed: Mutex<Option<Arc<MockChangeFeed>>>,
}

struct StoreState {
    threads: HashMap<ThreadId, ThreadInfo>,
    participants: HashMap<ThreadId, Vec<UserId>>,
    messages: Vec<Message>,
    receipts: Vec<ThreadReceipt>,
    status_updates: Vec<(ThreadId, ThreadStatus)>,
    next_id: u64,
    clock: DateTime<Utc>,
    insert_calls: usize,
    fail_reads: bool,
    fail_writes: bool,
}

enum Echo {
    Message(Message),
    Receipt(FeedEventType, ReadReceipt),
}

impl InMemoryStore {
    pub fn new() -> Self {
        let clock = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            state: Mutex::new(StoreState {
                threads: HashMap::new(),
                participants: HashMap::new(),
                messages: Vec::new(),
                receipts: Vec::new(),
                status_updates: Vec::new(),
                next_id: 0,
                clock,
                insert_calls: 0,
                fail_reads: false,
                fail_writes: false,
            }),
            feed: Mutex::new(None),
        }
    }

    /// Echoes subsequent writes into `feed`.
    pub fn attach_feed(&self, feed: Arc<MockChangeFeed>) {
        *self.feed.lock().unwrap_or_else(PoisonError::into_inner) = Some(feed);
    }

    pub fn seed_thread(&self, thread: ThreadInfo) {
        self.lock().threads.insert(thread.id.clone(), thread);
    }

    /// Seeds an open thread titled after its id.
    pub fn seed_thread_with(
        &self,
        id: &str,
        kind: ThreadKind,
        require_ai_approval: bool,
        topic: Option<&str>,
    ) {
        self.seed_thread(ThreadInfo {
            id: id.into(),
            title: format!("Thread {id}"),
            topic: topic.map(str::to_string),
            kind,
            status: ThreadStatus::Open,
            require_ai_approval,
        });
    }

    /// Users who receive an unread receipt for every message sent to `thread` by someone else.
    pub fn seed_participants(&self, thread: &str, users: &[&str]) {
        self.lock().participants.insert(
            thread.into(),
            users.iter().map(|u| UserId::from(*u)).collect(),
        );
    }

    pub fn seed_message(&self, message: Message) {
        self.lock().messages.push(message);
    }

    /// Seeds a `user_message` stamped `minute` minutes after the store's epoch.
    pub fn seed_text_message(&self, thread: &str, id: &str, sender: &str, text: &str, minute: i64) {
        let timestamp = self.lock().clock + Duration::minutes(minute);
        self.seed_message(Message {
            id: id.into(),
            thread_id: thread.into(),
            sender_id: sender.into(),
            text: text.to_string(),
            kind: MessageKind::UserMessage,
            timestamp,
            details: None,
        });
    }

    pub fn seed_receipt(
        &self,
        thread: &str,
        message: &str,
        user: &str,
        read_at: Option<DateTime<Utc>>,
    ) {
        self.lock().receipts.push(ThreadReceipt {
            thread_id: thread.into(),
            receipt: ReadReceipt {
                message_id: message.into(),
                user_id: user.into(),
                read_at,
            },
        });
    }

    /// Makes every read fail while set.
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Makes every write fail while set.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Stored messages of `thread`, oldest first.
    pub fn messages(&self, thread: &str) -> Vec<Message> {
        let thread = ThreadId::from(thread);
        sorted(&self.lock().messages, &thread)
    }

    /// How many inserts were attempted, including failed ones.
    pub fn insert_calls(&self) -> usize {
        self.lock().insert_calls
    }

    pub fn receipt(&self, message: &str, user: &str) -> Option<ReadReceipt> {
        self.lock()
            .receipts
            .iter()
            .find(|r| r.receipt.message_id.0 == message && r.receipt.user_id.0 == user)
            .map(|r| r.receipt.clone())
    }

    pub fn thread_status(&self, thread: &str) -> Option<ThreadStatus> {
        self.lock()
            .threads
            .get(&ThreadId::from(thread))
            .map(|t| t.status)
    }

    pub fn status_updates(&self) -> Vec<(ThreadId, ThreadStatus)> {
        self.lock().status_updates.clone()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn echo(&self, echoes: Vec<Echo>) {
        let feed = self
            .feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(feed) = feed else {
            return;
        };
        for echo in echoes {
            let (channel, event_type, row) = match echo {
                Echo::Message(m) => (
                    FeedChannel::MessageInserted,
                    FeedEventType::Insert,
                    serde_json::to_value(&m),
                ),
                Echo::Receipt(event_type, r) => (
                    FeedChannel::ReadReceiptChanged,
                    event_type,
                    serde_json::to_value(&r),
                ),
            };
            if let Ok(row) = row {
                feed.push(channel, event_type, row);
            }
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(messages: &[Message], thread: &ThreadId) -> Vec<Message> {
    let mut out: Vec<Message> = messages
        .iter()
        .filter(|m| &m.thread_id == thread)
        .cloned()
        .collect();
    out.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    out
}

#[async_trait]
impl PluginAdapter for InMemoryStore {
    fn name(&self) -> &str {
        "in-memory-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, ConcordError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn list_unread_receipts(&self, user: &UserId) -> Result<Vec<ThreadReceipt>, ConcordError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(ConcordError::store("read failed"));
        }
        Ok(state
            .receipts
            .iter()
            .filter(|r| &r.receipt.user_id == user && !r.receipt.is_read())
            .cloned()
            .collect())
    }

    async fn get_thread(&self, thread_id: &ThreadId) -> Result<ThreadInfo, ConcordError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(ConcordError::store("read failed"));
        }
        state
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ConcordError::store(format!("thread {thread_id} not found")))
    }

    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<Message>, ConcordError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(ConcordError::store("read failed"));
        }
        Ok(sorted(&state.messages, thread_id))
    }

    async fn thread_context(
        &self,
        thread_id: &ThreadId,
        limit: usize,
    ) -> Result<ThreadContext, ConcordError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(ConcordError::store("read failed"));
        }
        let thread = state
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ConcordError::store(format!("thread {thread_id} not found")))?;
        let all = sorted(&state.messages, thread_id);
        let recent = all[all.len().saturating_sub(limit)..].to_vec();
        Ok(ThreadContext { thread, recent })
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, ConcordError> {
        let mut echoes = Vec::new();
        let stored = {
            let mut state = self.lock();
            state.insert_calls += 1;
            if state.fail_writes {
                return Err(ConcordError::store("write rejected"));
            }
            match state.threads.get(&message.thread_id) {
                None => {
                    return Err(ConcordError::store(format!(
                        "thread {} not found",
                        message.thread_id
                    )));
                }
                Some(thread) if thread.status == ThreadStatus::Closed => {
                    return Err(ConcordError::store(format!(
                        "thread {} is closed",
                        message.thread_id
                    )));
                }
                Some(_) => {}
            }

            state.next_id += 1;
            let seq = state.next_id;
            let stored = Message {
                id: format!("msg-{seq}").into(),
                thread_id: message.thread_id,
                sender_id: message.sender_id,
                text: message.text,
                kind: message.kind,
                timestamp: state.clock + Duration::hours(1) + Duration::seconds(seq as i64),
                details: message.details,
            };
            state.messages.push(stored.clone());
            echoes.push(Echo::Message(stored.clone()));

            let recipients: Vec<UserId> = state
                .participants
                .get(&stored.thread_id)
                .map(|users| {
                    users
                        .iter()
                        .filter(|u| **u != stored.sender_id)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            for user in recipients {
                let receipt = ReadReceipt {
                    message_id: stored.id.clone(),
                    user_id: user,
                    read_at: None,
                };
                state.receipts.push(ThreadReceipt {
                    thread_id: stored.thread_id.clone(),
                    receipt: receipt.clone(),
                });
                echoes.push(Echo::Receipt(FeedEventType::Insert, receipt));
            }
            stored
        };

        self.echo(echoes);
        Ok(stored)
    }

    async fn upsert_read_receipt(&self, receipt: ReadReceipt) -> Result<ReadReceipt, ConcordError> {
        let (stored, echo) = {
            let mut state = self.lock();
            if state.fail_writes {
                return Err(ConcordError::store("write rejected"));
            }

            let existing = state.receipts.iter().position(|r| {
                r.receipt.message_id == receipt.message_id && r.receipt.user_id == receipt.user_id
            });
            match existing {
                Some(at) => {
                    let row = &mut state.receipts[at].receipt;
                    if row.is_read() || receipt.read_at.is_none() {
                        (row.clone(), None)
                    } else {
                        row.read_at = receipt.read_at;
                        (
                            row.clone(),
                            Some(Echo::Receipt(FeedEventType::Update, row.clone())),
                        )
                    }
                }
                None => {
                    let thread_id = state
                        .messages
                        .iter()
                        .find(|m| m.id == receipt.message_id)
                        .map(|m| m.thread_id.clone())
                        .ok_or_else(|| {
                            ConcordError::store(format!("message {} not found", receipt.message_id))
                        })?;
                    state.receipts.push(ThreadReceipt {
                        thread_id,
                        receipt: receipt.clone(),
                    });
                    (
                        receipt.clone(),
                        Some(Echo::Receipt(FeedEventType::Insert, receipt)),
                    )
                }
            }
        };

        self.echo(echo.into_iter().collect());
        Ok(stored)
    }

    async fn update_thread_status(
        &self,
        thread_id: &ThreadId,
        status: ThreadStatus,
    ) -> Result<(), ConcordError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(ConcordError::store("write rejected"));
        }
        let thread = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| ConcordError::store(format!("thread {thread_id} not found")))?;
        thread.status = status;
        state.status_updates.push((thread_id.clone(), status));
        Ok(())
    }
}
