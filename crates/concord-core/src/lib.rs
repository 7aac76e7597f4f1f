// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Concord messaging core.
//!
//! This crate provides the domain types, the error type, and the collaborator
//! traits (change feed, store, moderation provider) used throughout the
//! Concord workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ConcordError;
pub use types::{
    AdapterType, CloseRequestState, HealthStatus, Message, MessageId, MessageKind, ThreadId,
    UserId,
};

pub use traits::{ChangeFeed, FeedStream, MessageStore, ModerationProvider, PluginAdapter};
