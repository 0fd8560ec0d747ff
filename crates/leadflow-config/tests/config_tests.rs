// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Leadflow configuration system.

use leadflow_config::diagnostic::ConfigError;
use leadflow_config::model::{CoordinationBackend, LeadflowConfig};
use leadflow_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML touching every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_leadflow_config() {
    let toml = r#"
[storage]
database_path = "/tmp/leads.db"
wal_mode = false

[coordination]
backend = "memory"

[lock]
ttl_secs = 20
wait_ms = 2000

[retry]
max_retries = 3
backoff_minutes = [1, 2, 4]

[sweeper]
qualifying_timeout_mins = 45

[housekeeper]
max_cold_outreach = 2

[compliance]
default_timezone = "America/Chicago"
strict_holiday_states = ["FL"]

[alerts]
cooldown_secs = 60

[workers]
heartbeat_factor = 1.5

[log]
level = "debug"
json = true
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.storage.database_path, "/tmp/leads.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.coordination.backend, CoordinationBackend::Memory);
    assert_eq!(config.lock.ttl_secs, 20);
    assert_eq!(config.lock.wait_ms, 2000);
    assert_eq!(config.lock.poll_ms, 100);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.backoff_minutes, vec![1, 2, 4]);
    assert_eq!(config.sweeper.qualifying_timeout_mins, 45);
    assert_eq!(config.sweeper.intake_sent_timeout_mins, 30);
    assert_eq!(config.housekeeper.max_cold_outreach, 2);
    assert_eq!(config.compliance.default_timezone, "America/Chicago");
    assert_eq!(config.compliance.strict_holiday_states, vec!["FL"]);
    assert_eq!(config.alerts.cooldown_secs, 60);
    assert_eq!(config.workers.heartbeat_factor, 1.5);
    assert_eq!(config.log.level, "debug");
    assert!(config.log.json);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.storage.database_path, "leadflow.db");
    assert_eq!(config.coordination.backend, CoordinationBackend::Sqlite);
    assert_eq!(config.lock.ttl_secs, 30);
    assert_eq!(config.lock.wait_ms, 5000);
    assert_eq!(config.retry.backoff_minutes, vec![1, 5, 15, 60, 240]);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.sweeper.batch_size, 50);
    assert_eq!(config.sweeper.booking_timeout_mins, 120);
    assert_eq!(config.housekeeper.archive_after_days, 90);
    assert_eq!(config.housekeeper.recycle_after_days, 7);
    assert_eq!(config.housekeeper.max_cold_outreach, 3);
    assert_eq!(config.compliance.send_window_start_hour, 8);
    assert_eq!(config.compliance.send_window_end_hour, 21);
    assert_eq!(config.workers.heartbeat_factor, 2.0);
}

#[test]
fn unknown_key_produces_suggestion() {
    let toml = r#"
[lock]
ttl_sec = 30
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key should be rejected");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "ttl_sec");
            assert_eq!(suggestion.as_deref(), Some("ttl_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let toml = r#"
[redis]
url = "redis://localhost"
"#;

    let err = load_config_from_str(toml).expect_err("unknown section should be rejected");
    let err_str = err.to_string();
    assert!(
        err_str.contains("unknown field") || err_str.contains("redis"),
        "error should mention the unknown section, got: {err_str}"
    );
}

#[test]
fn wrong_type_produces_invalid_type() {
    let toml = r#"
[sweeper]
batch_size = "fifty"
"#;

    let errors = load_and_validate_str(toml).expect_err("string for integer should fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("batch_size"))),
        "expected InvalidType for batch_size, got {errors:?}"
    );
}

#[test]
fn semantic_validation_runs_after_parse() {
    let toml = r#"
[compliance]
send_window_start_hour = 22
send_window_end_hour = 6
"#;

    let errors = load_and_validate_str(toml).expect_err("inverted window should fail");
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}

#[test]
fn load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leadflow.toml");
    std::fs::write(&path, "[retry]\nclaim_lease_secs = 120\n").unwrap();

    let config = load_and_validate_path(&path).expect("file config should load");
    assert_eq!(config.retry.claim_lease_secs, 120);
}

#[test]
fn serialized_defaults_round_trip_through_figment() {
    use figment::{Figment, providers::Serialized};

    let config: LeadflowConfig = Figment::new()
        .merge(Serialized::defaults(LeadflowConfig::default()))
        .merge(("housekeeper.max_cold_outreach", 5))
        .extract()
        .expect("dot-path override should apply");

    assert_eq!(config.housekeeper.max_cold_outreach, 5);
    assert_eq!(config.housekeeper.dead_after_days, 30);
}
