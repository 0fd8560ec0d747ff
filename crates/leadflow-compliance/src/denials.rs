// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repeated-denial detection.
//!
//! A single denial is routine (a reply arriving at 22:00 is simply deferred).
//! Many denials for one lead inside a short window usually mean a stuck
//! follow-up loop, so crossing the threshold raises an operator alert.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use leadflow_config::model::ComplianceConfig;
use leadflow_coord::AlertDispatcher;
use leadflow_core::types::{AlertEvent, AlertType, ComplianceReason, Severity};
use leadflow_core::CoordinationStore;

/// Counts compliance denials per lead in the coordination store.
#[derive(Clone)]
pub struct DenialTracker {
    store: Arc<dyn CoordinationStore>,
    alerts: AlertDispatcher,
    threshold: i64,
    window: Duration,
}

impl DenialTracker {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        alerts: AlertDispatcher,
        threshold: i64,
        window: Duration,
    ) -> Self {
        Self {
            store,
            alerts,
            threshold,
            window,
        }
    }

    pub fn from_config(
        store: Arc<dyn CoordinationStore>,
        alerts: AlertDispatcher,
        config: &ComplianceConfig,
    ) -> Self {
        Self::new(
            store,
            alerts,
            config.denial_alert_threshold,
            Duration::from_secs(config.denial_window_mins.saturating_mul(60)),
        )
    }

    pub fn key(lead_id: &str) -> String {
        format!("compliance_denials:{lead_id}")
    }

    /// Count one denial. Returns the count inside the current window, or
    /// `None` if the coordination store was unavailable.
    pub async fn record(&self, lead_id: &str, reason: ComplianceReason) -> Option<i64> {
        let count = match self.store.incr(&Self::key(lead_id), self.window).await {
            Ok(count) => count,
            Err(e) => {
                warn!(lead_id, error = %e, "could not count compliance denial");
                return None;
            }
        };

        if count >= self.threshold {
            self.alerts
                .dispatch(AlertEvent {
                    alert_type: AlertType::ComplianceDeniedRepeat,
                    message: format!(
                        "lead {lead_id} denied {count} times within {} minutes (latest: {reason})",
                        self.window.as_secs() / 60
                    ),
                    correlation_id: lead_id.to_string(),
                    severity: Severity::Warning,
                })
                .await;
        }
        Some(count)
    }
}
