// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change-feed subscription management for the Concord messaging core.
//!
//! [`ChangeFeedSubscriber`] owns the single live subscription for the signed-in
//! identity, reconnects with capped exponential [`Backoff`], and translates
//! untrusted feed rows into bus events.

pub mod backoff;
pub mod subscriber;
pub mod translate;
pub mod window;

pub use backoff::Backoff;
pub use concord_core::types::FeedStatus;
pub use subscriber::ChangeFeedSubscriber;
pub use translate::{delivery_key, translate};
pub use window::{DeliveredWindow, DeliveryKey};
