// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive intervals, hour ranges, and resolvable timezones.

use crate::diagnostic::ConfigError;
use crate::model::LeadflowConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &LeadflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    if config.coordination.path.trim().is_empty() {
        invalid("coordination.path must not be empty".to_string());
    }

    // Lock: the body must fit inside the TTL, and polling must make progress.
    if config.lock.ttl_secs == 0 {
        invalid("lock.ttl_secs must be positive".to_string());
    }
    if config.lock.poll_ms == 0 {
        invalid("lock.poll_ms must be positive".to_string());
    }
    if config.lock.wait_ms >= config.lock.ttl_secs.saturating_mul(1_000) {
        invalid(format!(
            "lock.wait_ms ({}) must be shorter than lock.ttl_secs ({}s)",
            config.lock.wait_ms, config.lock.ttl_secs
        ));
    }

    // Retry schedule
    if config.retry.interval_secs == 0 {
        invalid("retry.interval_secs must be positive".to_string());
    }
    if config.retry.batch_size == 0 {
        invalid("retry.batch_size must be at least 1".to_string());
    }
    if config.retry.max_retries == 0 {
        invalid("retry.max_retries must be at least 1".to_string());
    }
    if config.retry.backoff_minutes.is_empty() {
        invalid("retry.backoff_minutes must not be empty".to_string());
    } else if config
        .retry
        .backoff_minutes
        .windows(2)
        .any(|pair| pair[1] < pair[0])
    {
        invalid(format!(
            "retry.backoff_minutes must be non-decreasing, got {:?}",
            config.retry.backoff_minutes
        ));
    }

    // Sweeper
    if config.sweeper.interval_secs == 0 {
        invalid("sweeper.interval_secs must be positive".to_string());
    }
    if config.sweeper.batch_size == 0 {
        invalid("sweeper.batch_size must be at least 1".to_string());
    }
    for (key, value) in [
        ("intake_sent_timeout_mins", config.sweeper.intake_sent_timeout_mins),
        ("qualifying_timeout_mins", config.sweeper.qualifying_timeout_mins),
        ("qualified_timeout_mins", config.sweeper.qualified_timeout_mins),
        ("booking_timeout_mins", config.sweeper.booking_timeout_mins),
    ] {
        if value == 0 {
            invalid(format!("sweeper.{key} must be positive"));
        }
    }

    // Housekeeper
    if config.housekeeper.interval_secs == 0 {
        invalid("housekeeper.interval_secs must be positive".to_string());
    }
    if config.housekeeper.max_cold_outreach == 0 {
        invalid("housekeeper.max_cold_outreach must be at least 1".to_string());
    }
    if config.housekeeper.dead_after_days < config.housekeeper.recycle_after_days {
        invalid(format!(
            "housekeeper.dead_after_days ({}) must not be shorter than recycle_after_days ({})",
            config.housekeeper.dead_after_days, config.housekeeper.recycle_after_days
        ));
    }

    // Compliance window
    let start = config.compliance.send_window_start_hour;
    let end = config.compliance.send_window_end_hour;
    if start > 23 || end > 24 {
        invalid(format!(
            "compliance send window hours out of range: start={start}, end={end}"
        ));
    } else if start >= end {
        invalid(format!(
            "compliance.send_window_start_hour ({start}) must be before send_window_end_hour ({end})"
        ));
    }
    if config
        .compliance
        .default_timezone
        .parse::<chrono_tz::Tz>()
        .is_err()
    {
        invalid(format!(
            "compliance.default_timezone `{}` is not a known IANA timezone",
            config.compliance.default_timezone
        ));
    }
    for code in &config.compliance.strict_holiday_states {
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            invalid(format!(
                "compliance.strict_holiday_states entry `{code}` is not a two-letter state code"
            ));
        }
    }
    if config.compliance.denial_alert_threshold < 1 {
        invalid("compliance.denial_alert_threshold must be at least 1".to_string());
    }

    // Workers
    let factor = config.workers.heartbeat_factor;
    if !(1.5..=2.0).contains(&factor) {
        invalid(format!(
            "workers.heartbeat_factor must be between 1.5 and 2.0, got {factor}"
        ));
    }
    if config.workers.notification_buffer == 0 {
        invalid("workers.notification_buffer must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
