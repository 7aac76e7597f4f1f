// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded memory of already-delivered feed events.
//!
//! After a reconnect the backend may replay rows the subscriber already
//! dispatched. The window keeps the natural keys of the most recent
//! deliveries so replays are recognised and dropped.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use concord_core::types::{MessageId, UserId};

/// Natural key of a delivered event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryKey {
    Message(MessageId),
    /// A receipt is re-delivered when its `read_at` changes, so the stamp is part of the key.
    Receipt {
        message_id: MessageId,
        user_id: UserId,
        read_at: Option<DateTime<Utc>>,
    },
}

/// FIFO set of the last `capacity` delivery keys.
#[derive(Debug)]
pub struct DeliveredWindow {
    capacity: usize,
    order: VecDeque<DeliveryKey>,
    seen: HashSet<DeliveryKey>,
}

impl DeliveredWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Records `key`. Returns `false` if it is already in the window.
    pub fn insert(&mut self, key: DeliveryKey) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn contains(&self, key: &DeliveryKey) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}
