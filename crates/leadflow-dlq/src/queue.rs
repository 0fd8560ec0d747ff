// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Failure capture.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use leadflow_coord::AlertDispatcher;
use leadflow_core::types::{AlertEvent, AlertType, DlqStatus, ErrorKind, FailureStage, Severity};
use leadflow_core::{Clock, FailedLead, LeadflowError, StorageAdapter};

use crate::backoff::BackoffPolicy;

/// Writes pipeline failures into the dead-letter table.
#[derive(Clone)]
pub struct DeadLetterQueue {
    storage: Arc<dyn StorageAdapter>,
    alerts: AlertDispatcher,
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
}

/// Classify an error for the stored `error_kind`.
pub fn error_kind(err: &LeadflowError) -> ErrorKind {
    if err.is_permanent() {
        ErrorKind::Permanent
    } else {
        ErrorKind::Transient
    }
}

/// Pull `(lead_id, client_id)` out of a captured payload.
///
/// Understands both an inbound event (`{client_id, lead_payload: {lead_id}}`)
/// and a bare `{lead_id, client_id}` object.
pub fn payload_ids(payload: &Value) -> (Option<String>, Option<String>) {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
    let lead_id = text(payload.pointer("/lead_payload/lead_id"))
        .or_else(|| text(payload.get("lead_id")));
    let client_id = text(payload.get("client_id"));
    (lead_id, client_id)
}

impl DeadLetterQueue {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        alerts: AlertDispatcher,
        policy: BackoffPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            alerts,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Record a failure. Never fails: if the row cannot be written the entry
    /// is logged in full and an operator alert is raised.
    pub async fn capture_failure(
        &self,
        payload: Value,
        source: &str,
        stage: FailureStage,
        err: &LeadflowError,
    ) -> FailedLead {
        let now = self.clock.now();
        let id = Uuid::new_v4().to_string();
        let (lead_id, client_id) = payload_ids(&payload);
        let kind = error_kind(err);
        let max_retries = match kind {
            ErrorKind::Permanent => 1,
            ErrorKind::Transient => self.policy.max_retries(),
        };

        let entry = FailedLead {
            correlation_id: lead_id.clone().unwrap_or_else(|| id.clone()),
            id,
            original_payload: payload,
            source: source.to_string(),
            failure_stage: stage,
            error_message: err.to_string(),
            error_kind: kind,
            retry_count: 0,
            max_retries,
            next_retry_at: Some(now + self.policy.delay_for(0)),
            status: DlqStatus::Pending,
            lead_id,
            client_id,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            resolved_by: None,
        };

        match self.storage.insert_failed_lead(&entry).await {
            Ok(()) => info!(
                failed_lead_id = %entry.id,
                correlation_id = %entry.correlation_id,
                stage = %stage,
                error_kind = %kind,
                error = %err,
                "pipeline failure captured"
            ),
            Err(store_err) => {
                error!(
                    failed_lead_id = %entry.id,
                    correlation_id = %entry.correlation_id,
                    stage = %stage,
                    error = %err,
                    store_error = %store_err,
                    payload = %entry.original_payload,
                    "could not persist failed lead"
                );
                self.alerts
                    .dispatch(AlertEvent {
                        alert_type: AlertType::CaptureFailed,
                        message: format!(
                            "failed lead {} ({stage}) could not be written to the dead-letter queue: {store_err}",
                            entry.id
                        ),
                        correlation_id: entry.correlation_id.clone(),
                        severity: Severity::Critical,
                    })
                    .await;
            }
        }

        entry
    }
}
