// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Concord configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConcordConfig {
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Change-feed reconnect and dedup settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Moderation pipeline settings.
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Anthropic-backed moderation provider settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Change-feed subscriber configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    /// Backoff base in milliseconds; retry `n` waits `base * 2^n`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive failed attempts tolerated before the feed reports terminal failure.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Random spread applied to each delay, as a fraction of it (0.0 disables jitter).
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// How many delivered event keys are remembered to suppress replays after reconnect.
    #[serde(default = "default_delivered_window")]
    pub delivered_window: usize,
}

impl FeedConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter_ratio: default_jitter_ratio(),
            delivered_window: default_delivered_window(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_delivered_window() -> usize {
    2048
}

/// Moderation pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModerationConfig {
    /// Caller-visible timeout for one review, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of recent thread messages sent to the provider as context.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    /// Reason shown to the user when a review cannot be completed.
    #[serde(default = "default_rejection_reason")]
    pub rejection_reason: String,
}

impl ModerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            context_messages: default_context_messages(),
            rejection_reason: default_rejection_reason(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_context_messages() -> usize {
    10
}

fn default_rejection_reason() -> String {
    "We couldn't review this message right now. Please try again.".to_string()
}

/// Anthropic API configuration for the moderation provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Anthropic API key. `None` disables the provider.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used for both topic classification and rephrasing.
    #[serde(default = "default_model")]
    pub model: String,

    /// Anthropic API version string.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Maximum tokens to generate per provider call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            api_version: default_api_version(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_max_tokens() -> u32 {
    512
}
