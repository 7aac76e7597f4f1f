// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread messaging session: the composition root for one open thread.
//!
//! - [`derive_close_state`] - whether a close request is still awaiting a decision
//! - [`ThreadLog`] - ordered, duplicate-free message list with read state
//! - [`ThreadMessagingSession`] - bus wiring plus send, review and close operations

pub mod close_state;
pub mod log;
pub mod session;

pub use close_state::{derive_close_state, pending_request};
pub use log::ThreadLog;
pub use session::{PendingReview, SendOutcome, SessionDeps, SessionEvent, ThreadMessagingSession};
