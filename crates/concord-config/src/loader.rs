// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./concord.toml` > `~/.config/concord/concord.toml` > `/etc/concord/concord.toml`
//! with environment variable overrides via `CONCORD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ConcordConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/concord/concord.toml`
/// 3. `~/.config/concord/concord.toml`
/// 4. `./concord.toml`
/// 5. `CONCORD_*` environment variables
pub fn load_config() -> Result<ConcordConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ConcordConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConcordConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ConcordConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConcordConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ConcordConfig::default()))
        .merge(Toml::file("/etc/concord/concord.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("concord/concord.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("concord.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `CONCORD_<SECTION>_<KEY>` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys contain
/// underscores: `CONCORD_FEED_MAX_ATTEMPTS` must map to `feed.max_attempts`.
pub fn env_provider() -> Env {
    Env::prefixed("CONCORD_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("logging_", "logging.", 1)
            .replacen("feed_", "feed.", 1)
            .replacen("moderation_", "moderation.", 1)
            .replacen("anthropic_", "anthropic.", 1);
        mapped.into()
    })
}
