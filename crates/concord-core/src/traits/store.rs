// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store trait for the collaborator persistence backend.
//!
//! Row-level authorization is assumed to be enforced behind this interface.

use async_trait::async_trait;

use crate::error::ConcordError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Message, NewMessage, ReadReceipt, ThreadContext, ThreadId, ThreadInfo, ThreadReceipt,
    ThreadStatus, UserId,
};

/// Reads and writes the messaging core needs from the backing store.
#[async_trait]
pub trait MessageStore: PluginAdapter {
    /// Lists `user`'s receipts that have no `read_at`, joined with their thread.
    async fn list_unread_receipts(&self, user: &UserId)
        -> Result<Vec<ThreadReceipt>, ConcordError>;

    /// Loads a thread's metadata and policy.
    async fn get_thread(&self, thread_id: &ThreadId) -> Result<ThreadInfo, ConcordError>;

    /// Lists every message in a thread, oldest first.
    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<Message>, ConcordError>;

    /// Loads the last `limit` messages of a thread together with its title and topic.
    async fn thread_context(
        &self,
        thread_id: &ThreadId,
        limit: usize,
    ) -> Result<ThreadContext, ConcordError>;

    /// Inserts a message, assigning its id and timestamp.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, ConcordError>;

    /// Upserts a receipt keyed by `(message_id, user_id)`.
    ///
    /// An existing `read_at` is never overwritten; the stored row is returned.
    async fn upsert_read_receipt(&self, receipt: ReadReceipt)
        -> Result<ReadReceipt, ConcordError>;

    /// Sets a thread's persisted status.
    async fn update_thread_status(
        &self,
        thread_id: &ThreadId,
        status: ThreadStatus,
    ) -> Result<(), ConcordError>;
}
