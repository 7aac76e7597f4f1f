// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed event bus for the Concord messaging core.
//!
//! Consumers register a handler for one [`EventKind`] and get back a
//! [`SubscriptionHandle`]. [`EventBus::dispatch`] fans an event out to every
//! handler currently registered for its kind, in registration order.
//!
//! The bus is an explicit object owned by the composition root and injected
//! into consumers; there is no global registry.

mod bus;
mod event;

pub use bus::{EventBus, Handler, SubscriptionHandle};
pub use event::{BusEvent, EventKind};
