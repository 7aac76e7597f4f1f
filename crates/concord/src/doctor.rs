// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `concord doctor` command implementation.
//!
//! Runs diagnostic checks against the configuration and the moderation
//! provider it selects.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use concord_anthropic::AnthropicModerationProvider;
use concord_config::model::{AnthropicConfig, ConcordConfig, FeedConfig};
use concord_core::types::HealthStatus;
use concord_core::{ConcordError, PluginAdapter};
use concord_feed::Backoff;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `concord doctor` command.
///
/// With `plain`, disables colored output.
pub async fn run_doctor(
    config: &ConcordConfig,
    config_path: Option<&Path>,
    plain: bool,
) -> Result<(), ConcordError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = vec![
        check_config(config_path),
        check_feed_policy(&config.feed),
        check_moderation_provider(&config.anthropic).await,
    ];

    println!();
    println!("  concord doctor");
    println!("  {}", "-".repeat(50));

    let mut issues = 0;
    for result in &results {
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        println!("{}", format_line(result, use_color));
    }

    println!();
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(())
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal().to_string()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow().to_string()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red().to_string()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

/// Check configuration loads without errors.
fn check_config(path: Option<&Path>) -> CheckResult {
    let start = Instant::now();
    let loaded = match path {
        Some(path) => concord_config::load_and_validate_path(path),
        None => concord_config::load_and_validate(),
    };
    match loaded {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Summarizes the reconnect schedule the feed subscriber will follow.
fn check_feed_policy(feed: &FeedConfig) -> CheckResult {
    let start = Instant::now();
    let backoff = Backoff::from_config(feed);
    let last = backoff.delay(feed.max_attempts.saturating_sub(1));
    let message = format!(
        "{} attempts, delays {:?} .. {:?}",
        feed.max_attempts,
        backoff.delay(0),
        last
    );
    let status = if last == feed.max_delay() && feed.max_attempts > 1 {
        // Several attempts at the cap add nothing but wait time.
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    };
    CheckResult::new("Feed reconnect", status, message, start)
}

/// Builds the moderation provider and runs its health check.
async fn check_moderation_provider(config: &AnthropicConfig) -> CheckResult {
    let start = Instant::now();
    let provider = match AnthropicModerationProvider::from_config(config) {
        Ok(provider) => provider,
        Err(ConcordError::Config(message)) => {
            return CheckResult::new("Moderation", CheckStatus::Warn, message, start);
        }
        Err(e) => return CheckResult::new("Moderation", CheckStatus::Fail, e.to_string(), start),
    };

    match provider.health_check().await {
        Ok(HealthStatus::Healthy) => CheckResult::new(
            "Moderation",
            CheckStatus::Pass,
            format!("{} ready ({})", provider.name(), config.model),
            start,
        ),
        Ok(HealthStatus::Degraded(reason)) => {
            CheckResult::new("Moderation", CheckStatus::Warn, reason, start)
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new("Moderation", CheckStatus::Fail, reason, start)
        }
        Err(e) => CheckResult::new("Moderation", CheckStatus::Fail, e.to_string(), start),
    }
}
