// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Boundary validation of raw feed rows.

use concord_bus::BusEvent;
use concord_core::types::{FeedChannel, FeedEvent, FeedEventType, Message, ReadReceipt};
use concord_core::ConcordError;

use crate::window::DeliveryKey;

/// Translates one untrusted feed notification into a bus event.
///
/// Rows missing required fields, with the wrong types, or with blank
/// identifiers are rejected with [`ConcordError::Validation`].
pub fn translate(event: &FeedEvent) -> Result<BusEvent, ConcordError> {
    match event.channel {
        FeedChannel::MessageInserted => {
            if event.event_type != FeedEventType::Insert {
                return Err(ConcordError::Validation(
                    "message rows are immutable; update notification ignored".to_string(),
                ));
            }
            let message: Message = decode(event)?;
            require_non_blank("id", &message.id.0)?;
            require_non_blank("thread_id", &message.thread_id.0)?;
            require_non_blank("sender_id", &message.sender_id.0)?;
            Ok(BusEvent::MessageReceived(message))
        }
        FeedChannel::ReadReceiptChanged => {
            let receipt: ReadReceipt = decode(event)?;
            require_non_blank("message_id", &receipt.message_id.0)?;
            require_non_blank("user_id", &receipt.user_id.0)?;
            Ok(BusEvent::ReadReceiptUpdated(receipt))
        }
        FeedChannel::CalendarEventChanged => {
            let has_id = match event.row.get("id") {
                Some(serde_json::Value::String(id)) => !id.trim().is_empty(),
                Some(serde_json::Value::Number(_)) => true,
                _ => false,
            };
            if !has_id {
                return Err(ConcordError::Validation(
                    "calendar row has no usable `id`".to_string(),
                ));
            }
            Ok(BusEvent::CalendarEventChanged(event.row.clone()))
        }
    }
}

/// The natural key used to suppress replays of `event`, if it has one.
pub fn delivery_key(event: &BusEvent) -> Option<DeliveryKey> {
    match event {
        BusEvent::MessageReceived(message) => Some(DeliveryKey::Message(message.id.clone())),
        BusEvent::ReadReceiptUpdated(receipt) => Some(DeliveryKey::Receipt {
            message_id: receipt.message_id.clone(),
            user_id: receipt.user_id.clone(),
            read_at: receipt.read_at,
        }),
        _ => None,
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &FeedEvent) -> Result<T, ConcordError> {
    serde_json::from_value(event.row.clone()).map_err(|e| {
        ConcordError::Validation(format!("malformed {} row: {e}", event.channel))
    })
}

fn require_non_blank(field: &str, value: &str) -> Result<(), ConcordError> {
    if value.trim().is_empty() {
        return Err(ConcordError::Validation(format!("`{field}` is blank")));
    }
    Ok(())
}
