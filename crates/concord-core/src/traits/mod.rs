// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! The messaging core talks to three external collaborators: the change feed,
//! the store, and the moderation provider. Each extends [`PluginAdapter`] and
//! uses `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod change_feed;
pub mod moderation;
pub mod store;

pub use adapter::PluginAdapter;
pub use change_feed::{ChangeFeed, FeedStream};
pub use moderation::ModerationProvider;
pub use store::MessageStore;
