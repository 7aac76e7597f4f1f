// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered in-memory message log for one thread.

use std::collections::{BTreeSet, HashMap, HashSet};

use concord_core::types::{Message, MessageId, ReadReceipt, UserId};

/// Messages ordered by `(timestamp, id)`, with a seen-id set for O(1) dedup.
///
/// Append-only apart from read-state augmentation.
#[derive(Debug, Default)]
pub struct ThreadLog {
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
    read_by: HashMap<MessageId, BTreeSet<UserId>>,
}

impl ThreadLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `message` at its ordered position. Returns `false` for a duplicate id.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| m.order_key() <= message.order_key());
        self.messages.insert(at, message);
        true
    }

    /// Records a receipt against its message.
    ///
    /// Returns `true` only when a message in this log became read by the
    /// receipt's user.
    pub fn apply_receipt(&mut self, receipt: &ReadReceipt) -> bool {
        if !receipt.is_read() || !self.seen.contains(&receipt.message_id) {
            return false;
        }
        self.read_by
            .entry(receipt.message_id.clone())
            .or_default()
            .insert(receipt.user_id.clone())
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_read_by(&self, id: &MessageId, user: &UserId) -> bool {
        self.read_by
            .get(id)
            .is_some_and(|readers| readers.contains(user))
    }

    /// Messages sent by someone other than `user` that `user` has not read.
    pub fn unread_for<'a>(&'a self, user: &'a UserId) -> impl Iterator<Item = &'a Message> + 'a {
        self.messages
            .iter()
            .filter(move |m| &m.sender_id != user && !self.is_read_by(&m.id, user))
    }
}
