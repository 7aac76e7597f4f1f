// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change feed trait for row-level push notifications from the backing store.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::ConcordError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{FeedChannel, FeedEvent, UserId};

/// Stream of feed events for one live subscription.
///
/// An `Err` item or the end of the stream means the transport dropped.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<FeedEvent, ConcordError>> + Send>>;

/// Adapter for the backend's change feed.
#[async_trait]
pub trait ChangeFeed: PluginAdapter {
    /// Opens one logical subscription scoped to `identity` with the given channels attached.
    ///
    /// Returning `Ok` is the subscription acknowledgement.
    async fn subscribe(
        &self,
        identity: &UserId,
        channels: &[FeedChannel],
    ) -> Result<FeedStream, ConcordError>;

    /// Releases the server-side subscription for `identity`.
    async fn unsubscribe(&self, identity: &UserId) -> Result<(), ConcordError>;
}
