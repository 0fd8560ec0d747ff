// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Leadflow.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages. Every
//! recognized option is listed here with its default; nothing reads config
//! by name anywhere else.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Leadflow configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeadflowConfig {
    /// Relational store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Coordination store (locks, heartbeats, cooldowns) settings.
    #[serde(default)]
    pub coordination: CoordinationConfig,

    /// Per-lead lock settings.
    #[serde(default)]
    pub lock: LockConfig,

    /// Dead-letter retry engine settings.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Stuck-lead sweeper settings.
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Archive and cold-lead recycling settings.
    #[serde(default)]
    pub housekeeper: HousekeeperConfig,

    /// Contact-time compliance settings.
    #[serde(default)]
    pub compliance: ComplianceConfig,

    /// Operator alert settings.
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Shared worker loop settings.
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Relational store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "leadflow.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Which coordination store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationBackend {
    /// SQLite file shared by every worker process on the host.
    Sqlite,
    /// Process-local map. Only meaningful for single-process deployments and tests.
    Memory,
}

/// Coordination store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinationConfig {
    #[serde(default = "default_coordination_backend")]
    pub backend: CoordinationBackend,

    /// Path of the coordination database when `backend = "sqlite"`.
    /// Kept separate from the relational store so it can be wiped freely.
    #[serde(default = "default_coordination_path")]
    pub path: String,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend: default_coordination_backend(),
            path: default_coordination_path(),
        }
    }
}

fn default_coordination_backend() -> CoordinationBackend {
    CoordinationBackend::Sqlite
}

fn default_coordination_path() -> String {
    "leadflow-coord.db".to_string()
}

/// Per-lead lock configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Lock TTL. Must exceed the processing time of any guarded operation.
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,

    /// How long to wait for a contended lock before giving up.
    #[serde(default = "default_lock_wait_ms")]
    pub wait_ms: u64,

    /// Poll interval while waiting.
    #[serde(default = "default_lock_poll_ms")]
    pub poll_ms: u64,
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lock_ttl_secs(),
            wait_ms: default_lock_wait_ms(),
            poll_ms: default_lock_poll_ms(),
        }
    }
}

fn default_lock_ttl_secs() -> u64 {
    30
}

fn default_lock_wait_ms() -> u64 {
    5_000
}

fn default_lock_poll_ms() -> u64 {
    100
}

/// Dead-letter retry engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_retry_interval_secs")]
    pub interval_secs: u64,

    /// Entries claimed per pass.
    #[serde(default = "default_retry_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before attempt N, indexed by retry count and clamped to the last entry.
    #[serde(default = "default_backoff_minutes")]
    pub backoff_minutes: Vec<u64>,

    /// How long a claimed entry stays invisible to other retry workers.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_retry_interval_secs(),
            batch_size: default_retry_batch_size(),
            max_retries: default_max_retries(),
            backoff_minutes: default_backoff_minutes(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_interval_secs() -> u64 {
    60
}

fn default_retry_batch_size() -> usize {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_minutes() -> Vec<u64> {
    vec![1, 5, 15, 60, 240]
}

fn default_claim_lease_secs() -> u64 {
    300
}

/// Stuck-lead sweeper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweeperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sweeper_interval_secs")]
    pub interval_secs: u64,

    /// Maximum leads remediated per state per cycle.
    #[serde(default = "default_sweeper_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_intake_sent_timeout_mins")]
    pub intake_sent_timeout_mins: u64,

    #[serde(default = "default_qualifying_timeout_mins")]
    pub qualifying_timeout_mins: u64,

    #[serde(default = "default_qualifying_timeout_mins")]
    pub qualified_timeout_mins: u64,

    #[serde(default = "default_booking_timeout_mins")]
    pub booking_timeout_mins: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweeper_interval_secs(),
            batch_size: default_sweeper_batch_size(),
            intake_sent_timeout_mins: default_intake_sent_timeout_mins(),
            qualifying_timeout_mins: default_qualifying_timeout_mins(),
            qualified_timeout_mins: default_qualifying_timeout_mins(),
            booking_timeout_mins: default_booking_timeout_mins(),
        }
    }
}

fn default_sweeper_interval_secs() -> u64 {
    300
}

fn default_sweeper_batch_size() -> usize {
    50
}

fn default_intake_sent_timeout_mins() -> u64 {
    30
}

fn default_qualifying_timeout_mins() -> u64 {
    60
}

fn default_booking_timeout_mins() -> u64 {
    120
}

/// Archive and cold-lead recycling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HousekeeperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_housekeeper_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_housekeeper_batch_size")]
    pub batch_size: usize,

    /// Terminal leads untouched this long are archived.
    #[serde(default = "default_archive_after_days")]
    pub archive_after_days: u64,

    /// Delay between a lead going cold and its next re-engagement attempt.
    #[serde(default = "default_recycle_after_days")]
    pub recycle_after_days: u64,

    /// Re-engagement attempts before a cold lead is declared dead.
    #[serde(default = "default_max_cold_outreach")]
    pub max_cold_outreach: u32,

    /// A lead cold for this long is dead regardless of attempts left.
    #[serde(default = "default_dead_after_days")]
    pub dead_after_days: u64,

    /// How far a compliance-denied recycle is pushed back.
    #[serde(default = "default_compliance_defer_mins")]
    pub compliance_defer_mins: u64,
}

impl Default for HousekeeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_housekeeper_interval_secs(),
            batch_size: default_housekeeper_batch_size(),
            archive_after_days: default_archive_after_days(),
            recycle_after_days: default_recycle_after_days(),
            max_cold_outreach: default_max_cold_outreach(),
            dead_after_days: default_dead_after_days(),
            compliance_defer_mins: default_compliance_defer_mins(),
        }
    }
}

fn default_housekeeper_interval_secs() -> u64 {
    900
}

fn default_housekeeper_batch_size() -> usize {
    100
}

fn default_archive_after_days() -> u64 {
    90
}

fn default_recycle_after_days() -> u64 {
    7
}

fn default_max_cold_outreach() -> u32 {
    3
}

fn default_dead_after_days() -> u64 {
    30
}

fn default_compliance_defer_mins() -> u64 {
    60
}

/// Contact-time compliance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceConfig {
    /// First local hour (inclusive) in which sends are allowed.
    #[serde(default = "default_send_window_start_hour")]
    pub send_window_start_hour: u32,

    /// Local hour (exclusive) at which sends stop.
    #[serde(default = "default_send_window_end_hour")]
    pub send_window_end_hour: u32,

    /// IANA timezone used when a lead has no (or an unknown) state code.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Jurisdictions that additionally observe Good Friday and the day after Thanksgiving.
    #[serde(default = "default_strict_holiday_states")]
    pub strict_holiday_states: Vec<String>,

    /// Denials for one lead within the window before an operator alert fires.
    #[serde(default = "default_denial_alert_threshold")]
    pub denial_alert_threshold: i64,

    #[serde(default = "default_denial_window_mins")]
    pub denial_window_mins: u64,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            send_window_start_hour: default_send_window_start_hour(),
            send_window_end_hour: default_send_window_end_hour(),
            default_timezone: default_timezone(),
            strict_holiday_states: default_strict_holiday_states(),
            denial_alert_threshold: default_denial_alert_threshold(),
            denial_window_mins: default_denial_window_mins(),
        }
    }
}

fn default_send_window_start_hour() -> u32 {
    8
}

fn default_send_window_end_hour() -> u32 {
    21
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_strict_holiday_states() -> Vec<String> {
    vec!["FL".to_string(), "OK".to_string()]
}

fn default_denial_alert_threshold() -> i64 {
    5
}

fn default_denial_window_mins() -> u64 {
    1_440
}

/// Operator alert configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertConfig {
    /// Identical alerts within this window are suppressed.
    #[serde(default = "default_alert_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_alert_cooldown_secs(),
        }
    }
}

fn default_alert_cooldown_secs() -> u64 {
    900
}

/// Shared worker loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkersConfig {
    /// Heartbeat TTL as a multiple of each worker's own poll interval.
    #[serde(default = "default_heartbeat_factor")]
    pub heartbeat_factor: f64,

    /// Maximum pending notifications kept per worker.
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,

    #[serde(default = "default_inbound_interval_ms")]
    pub inbound_interval_ms: u64,

    /// Inbound events processed per loop iteration.
    #[serde(default = "default_inbound_batch_size")]
    pub inbound_batch_size: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            heartbeat_factor: default_heartbeat_factor(),
            notification_buffer: default_notification_buffer(),
            inbound_interval_ms: default_inbound_interval_ms(),
            inbound_batch_size: default_inbound_batch_size(),
        }
    }
}

fn default_heartbeat_factor() -> f64 {
    2.0
}

fn default_notification_buffer() -> usize {
    100
}

fn default_inbound_interval_ms() -> u64 {
    1_000
}

fn default_inbound_batch_size() -> usize {
    20
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
