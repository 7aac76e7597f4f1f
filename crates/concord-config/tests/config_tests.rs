// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Concord configuration system.

use std::io::Write;

use concord_config::diagnostic::ConfigError;
use concord_config::model::ConcordConfig;
use concord_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use figment::providers::{Format, Serialized, Toml};
use figment::{Figment, Jail};

#[test]
fn valid_toml_deserializes_into_concord_config() {
    let toml = r#"
[logging]
log_level = "debug"

[feed]
base_delay_ms = 250
max_delay_ms = 4000
max_attempts = 3
jitter_ratio = 0.0
delivered_window = 64

[moderation]
timeout_secs = 5
context_messages = 4
rejection_reason = "try later"

[anthropic]
api_key = "sk-ant-123"
model = "claude-sonnet-4-20250514"
max_tokens = 256
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.logging.log_level, "debug");
    assert_eq!(config.feed.base_delay_ms, 250);
    assert_eq!(config.feed.max_delay_ms, 4000);
    assert_eq!(config.feed.max_attempts, 3);
    assert_eq!(config.feed.jitter_ratio, 0.0);
    assert_eq!(config.feed.delivered_window, 64);
    assert_eq!(config.moderation.timeout_secs, 5);
    assert_eq!(config.moderation.context_messages, 4);
    assert_eq!(config.moderation.rejection_reason, "try later");
    assert_eq!(config.anthropic.api_key.as_deref(), Some("sk-ant-123"));
    assert_eq!(config.anthropic.model, "claude-sonnet-4-20250514");
    assert_eq!(config.anthropic.api_version, "2023-06-01");
    assert_eq!(config.anthropic.max_tokens, 256);
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_and_validate_str("").expect("defaults should validate");
    assert_eq!(config.logging.log_level, "info");
    assert_eq!(config.feed.base_delay_ms, 1_000);
    assert_eq!(config.feed.max_delay_ms, 30_000);
    assert_eq!(config.feed.max_attempts, 5);
    assert_eq!(config.feed.delivered_window, 2048);
    assert_eq!(config.moderation.timeout_secs, 20);
    assert_eq!(config.moderation.context_messages, 10);
    assert!(config.anthropic.api_key.is_none());
}

#[test]
fn unknown_field_in_feed_produces_error() {
    let toml = r#"
[feed]
max_atempts = 3
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("max_atempts"),
        "error should mention the bad key, got: {err_str}"
    );
}

#[test]
fn unknown_section_produces_error() {
    let toml = r#"
[storage]
database_path = "/tmp/x.db"
"#;

    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn unknown_key_diagnostic_suggests_correction() {
    let toml = r#"
[feed]
max_atempts = 3
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "max_atempts");
            assert_eq!(suggestion.as_deref(), Some("max_attempts"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn wrong_type_is_reported_as_invalid_type() {
    let toml = r#"
[feed]
max_attempts = "many"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject string for u32");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "got {errors:?}"
    );
}

#[test]
fn semantic_errors_are_all_collected() {
    let toml = r#"
[logging]
log_level = "loud"

[feed]
max_attempts = 0

[moderation]
timeout_secs = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert_eq!(errors.len(), 3, "got {errors:?}");
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}

#[test]
fn file_path_loading_reads_toml() {
    // Runs inside a jail so env overrides set by other tests cannot leak in.
    Jail::expect_with(|jail| {
        let path = jail.directory().join("custom.toml");
        let mut file = std::fs::File::create(&path).map_err(|e| e.to_string())?;
        writeln!(file, "[feed]\nmax_attempts = 7").map_err(|e| e.to_string())?;

        let config = load_and_validate_path(&path).map_err(|e| format!("{e:?}"))?;
        assert_eq!(config.feed.max_attempts, 7);
        Ok(())
    });
}

#[test]
fn env_overrides_toml_values() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "concord.toml",
            r#"
[feed]
max_attempts = 3

[moderation]
context_messages = 4
"#,
        )?;
        jail.set_env("CONCORD_FEED_MAX_ATTEMPTS", "9");
        jail.set_env("CONCORD_ANTHROPIC_API_KEY", "sk-env");

        let config: ConcordConfig = Figment::new()
            .merge(Serialized::defaults(ConcordConfig::default()))
            .merge(Toml::file("concord.toml"))
            .merge(concord_config::loader::env_provider())
            .extract()?;

        assert_eq!(config.feed.max_attempts, 9);
        assert_eq!(config.moderation.context_messages, 4);
        assert_eq!(config.anthropic.api_key.as_deref(), Some("sk-env"));
        Ok(())
    });
}
