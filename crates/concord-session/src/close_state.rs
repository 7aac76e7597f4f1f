// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Close-request state derived from the message log.
//!
//! Only `request_close` and `close_declined` move the state. A
//! `close_accepted` row is informational here: whether the thread is actually
//! closed is the thread's persisted status.

use concord_core::types::{CloseRequestState, Message, MessageKind};

/// Derives the close-request state of an ordered message log.
///
/// The most recent `request_close` is pending unless a `close_declined`
/// follows it.
pub fn derive_close_state(messages: &[Message]) -> CloseRequestState {
    let Some(last_request) = messages
        .iter()
        .rposition(|m| m.kind == MessageKind::RequestClose)
    else {
        return CloseRequestState::NoRequest;
    };

    let declined = messages[last_request + 1..]
        .iter()
        .any(|m| m.kind == MessageKind::CloseDeclined);

    if declined {
        CloseRequestState::Resolved
    } else {
        CloseRequestState::Pending
    }
}

/// The `request_close` message still awaiting a decision, if any.
pub fn pending_request(messages: &[Message]) -> Option<&Message> {
    match derive_close_state(messages) {
        CloseRequestState::Pending => messages
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::RequestClose),
        _ => None,
    }
}
