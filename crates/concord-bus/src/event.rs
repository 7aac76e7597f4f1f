// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events carried by the bus.

use concord_core::types::{FeedStatus, Message, ReadReceipt, UnreadCountSnapshot};
use strum::Display;

/// Discriminant used to register for one kind of [`BusEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    MessageReceived,
    ReadReceiptUpdated,
    CalendarEventChanged,
    UnreadCountsChanged,
    FeedStatusChanged,
}

/// An event delivered to bus handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// A message row was inserted.
    MessageReceived(Message),
    /// A read receipt row was inserted or updated.
    ReadReceiptUpdated(ReadReceipt),
    /// A calendar row changed. The row is passed through unvalidated beyond its id.
    CalendarEventChanged(serde_json::Value),
    /// The unread aggregator applied a new snapshot.
    UnreadCountsChanged(UnreadCountSnapshot),
    /// The change-feed subscriber changed state.
    FeedStatusChanged(FeedStatus),
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::MessageReceived(_) => EventKind::MessageReceived,
            BusEvent::ReadReceiptUpdated(_) => EventKind::ReadReceiptUpdated,
            BusEvent::CalendarEventChanged(_) => EventKind::CalendarEventChanged,
            BusEvent::UnreadCountsChanged(_) => EventKind::UnreadCountsChanged,
            BusEvent::FeedStatusChanged(_) => EventKind::FeedStatusChanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let event = BusEvent::FeedStatusChanged(FeedStatus::Subscribed);
        assert_eq!(event.kind(), EventKind::FeedStatusChanged);

        let event = BusEvent::CalendarEventChanged(serde_json::json!({"id": "c1"}));
        assert_eq!(event.kind(), EventKind::CalendarEventChanged);
    }

    #[test]
    fn kind_display_is_snake_case() {
        assert_eq!(EventKind::ReadReceiptUpdated.to_string(), "read_receipt_updated");
    }
}
