// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Concord integration tests.
//!
//! Provides in-memory collaborators and a harness for fast, deterministic
//! tests without a backend or an LLM.
//!
//! # Components
//!
//! - [`InMemoryStore`] - message store that echoes writes into a [`MockChangeFeed`]
//! - [`MockChangeFeed`] - scriptable change feed with failure injection
//! - [`MockModerationProvider`] - moderation provider with canned answers
//! - [`TestHarness`] - the full stack wired for one signed-in user

pub mod harness;
pub mod mock_feed;
pub mod mock_moderation;
pub mod store;

pub use harness::{drain_events, TestHarness, TestHarnessBuilder};
pub use mock_feed::MockChangeFeed;
pub use mock_moderation::MockModerationProvider;
pub use store::InMemoryStore;
