// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Concord messaging core.

use thiserror::Error;

/// The primary error type used across Concord collaborator traits and core operations.
///
/// Duplicate feed events are not represented here: they are detected by
/// natural-key dedup and ignored.
#[derive(Debug, Error)]
pub enum ConcordError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Change feed transport errors (disconnect, failed subscribe, stream end).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A payload or request failed validation at a boundary.
    #[error("validation error: {0}")]
    Validation(String),

    /// Collaborator store errors (query failure, write rejected).
    #[error("store error: {message}")]
    Store {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Moderation provider errors (classification or rephrase failure).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The session has already been closed.
    #[error("session is closed")]
    SessionClosed,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConcordError {
    /// Shorthand for a store error without an underlying source.
    pub fn store(message: impl Into<String>) -> Self {
        ConcordError::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        ConcordError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        ConcordError::Provider {
            message: message.into(),
            source: None,
        }
    }
}
