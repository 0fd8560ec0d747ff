// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator alert dispatch with cooldown-based deduplication.
//!
//! The cooldown marker is a set-if-absent key in the coordination store, so
//! every worker process shares one suppression window per alert type and
//! correlation id. If the store is down, alerts are delivered anyway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use leadflow_core::types::{AlertEvent, Severity};
use leadflow_core::{AlertSink, CoordinationStore, LeadflowError};

/// Alert sink that writes alerts to the log. Used when no pager is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn deliver(&self, alert: &AlertEvent) -> Result<(), LeadflowError> {
        match alert.severity {
            Severity::Critical => error!(
                alert_type = %alert.alert_type,
                correlation_id = %alert.correlation_id,
                "ALERT: {}",
                alert.message
            ),
            Severity::Warning => warn!(
                alert_type = %alert.alert_type,
                correlation_id = %alert.correlation_id,
                "ALERT: {}",
                alert.message
            ),
            Severity::Info => info!(
                alert_type = %alert.alert_type,
                correlation_id = %alert.correlation_id,
                "ALERT: {}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// Rate-limited front for an [`AlertSink`]. Construct once at startup and share.
#[derive(Clone)]
pub struct AlertDispatcher {
    store: Arc<dyn CoordinationStore>,
    sink: Arc<dyn AlertSink>,
    cooldown: Duration,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        sink: Arc<dyn AlertSink>,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            cooldown,
        }
    }

    /// Cooldown key for an alert. Scoped by correlation id so one noisy lead
    /// does not silence alerts about another.
    pub fn cooldown_key(alert: &AlertEvent) -> String {
        format!(
            "alert_cooldown:{}:{}",
            alert.alert_type, alert.correlation_id
        )
    }

    /// Deliver `alert` unless an identical one went out within the cooldown.
    /// Returns `true` if the sink accepted it.
    pub async fn dispatch(&self, alert: AlertEvent) -> bool {
        let key = Self::cooldown_key(&alert);
        match self.store.set_if_absent(&key, "1", self.cooldown).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    alert_type = %alert.alert_type,
                    correlation_id = %alert.correlation_id,
                    "alert suppressed by cooldown"
                );
                return false;
            }
            Err(e) => {
                warn!(error = %e, "alert cooldown unavailable, delivering without deduplication");
            }
        }

        match self.sink.deliver(&alert).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    alert_type = %alert.alert_type,
                    correlation_id = %alert.correlation_id,
                    error = %e,
                    "alert delivery failed"
                );
                false
            }
        }
    }
}
