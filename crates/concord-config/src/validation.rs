// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::ConcordConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &ConcordConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    let level = config.logging.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        invalid(format!(
            "logging.log_level `{}` must be one of {}",
            config.logging.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    let feed = &config.feed;
    if feed.base_delay_ms == 0 {
        invalid("feed.base_delay_ms must be greater than 0".to_string());
    }
    if feed.max_delay_ms < feed.base_delay_ms {
        invalid(format!(
            "feed.max_delay_ms ({}) must be at least feed.base_delay_ms ({})",
            feed.max_delay_ms, feed.base_delay_ms
        ));
    }
    if feed.max_attempts == 0 {
        invalid("feed.max_attempts must be at least 1".to_string());
    }
    if !(0.0..1.0).contains(&feed.jitter_ratio) {
        invalid(format!(
            "feed.jitter_ratio must be in [0.0, 1.0), got {}",
            feed.jitter_ratio
        ));
    }
    if feed.delivered_window == 0 {
        invalid("feed.delivered_window must be at least 1".to_string());
    }

    let moderation = &config.moderation;
    if moderation.timeout_secs == 0 {
        invalid("moderation.timeout_secs must be greater than 0".to_string());
    }
    if moderation.context_messages == 0 {
        invalid("moderation.context_messages must be at least 1".to_string());
    }
    if moderation.rejection_reason.trim().is_empty() {
        invalid("moderation.rejection_reason must not be empty".to_string());
    }

    if config.anthropic.max_tokens == 0 {
        invalid("anthropic.max_tokens must be greater than 0".to_string());
    }
    if let Some(key) = &config.anthropic.api_key
        && key.trim().is_empty()
    {
        invalid("anthropic.api_key must not be blank when set".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
