// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The retry engine: claims due dead-letter entries and replays them.
//!
//! Claiming sets an entry to `retrying` and pushes `next_retry_at` out by a
//! lease, so entries held by a crashed worker become due again on their own.
//! All replay work is at-least-once; replay handlers must be idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use leadflow_config::model::RetryConfig;
use leadflow_coord::AlertDispatcher;
use leadflow_core::types::{AlertEvent, AlertType, DlqStatus, FailureStage, Severity};
use leadflow_core::{Clock, FailedLead, LeadflowError, StorageAdapter};

use crate::backoff::{BackoffPolicy, RetryDecision};
use crate::queue::error_kind;

/// Name recorded in `resolved_by` when a replay succeeds.
pub const RESOLVED_BY_ENGINE: &str = "retry_engine";

/// Replays captured work. Implemented by the lead pipeline.
#[async_trait]
pub trait Replayer: Send + Sync + 'static {
    /// Re-run new-lead ingestion. An already-ingested lead must be a no-op.
    async fn replay_ingest(&self, payload: &Value) -> Result<(), LeadflowError>;

    /// Re-enter the inbound-reply path with the last known message.
    async fn replay_reply(&self, payload: &Value) -> Result<(), LeadflowError>;

    /// Re-run a lead's scheduled follow-up: cold recycle or deferred outreach.
    async fn replay_followup(&self, payload: &Value) -> Result<(), LeadflowError>;
}

/// What happened to one claimed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Resolved,
    Rescheduled { next_retry_at: DateTime<Utc> },
    /// The lead lock was busy; rescheduled without consuming an attempt.
    Deferred { next_retry_at: DateTime<Utc> },
    Dead,
}

/// Totals for one pass of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub claimed: usize,
    pub resolved: usize,
    pub rescheduled: usize,
    pub deferred: usize,
    pub dead: usize,
}

impl RetryReport {
    fn record(&mut self, outcome: &RetryOutcome) {
        match outcome {
            RetryOutcome::Resolved => self.resolved += 1,
            RetryOutcome::Rescheduled { .. } => self.rescheduled += 1,
            RetryOutcome::Deferred { .. } => self.deferred += 1,
            RetryOutcome::Dead => self.dead += 1,
        }
    }
}

pub struct RetryEngine {
    storage: Arc<dyn StorageAdapter>,
    replayer: Arc<dyn Replayer>,
    alerts: AlertDispatcher,
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    claim_lease: Duration,
}

impl RetryEngine {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        replayer: Arc<dyn Replayer>,
        alerts: AlertDispatcher,
        clock: Arc<dyn Clock>,
        config: &RetryConfig,
    ) -> Self {
        Self {
            storage,
            replayer,
            alerts,
            policy: BackoffPolicy::from_config(config),
            clock,
            batch_size: config.batch_size,
            claim_lease: Duration::seconds(i64::try_from(config.claim_lease_secs).unwrap_or(300)),
        }
    }

    /// Claim and replay every due entry, up to the batch size.
    pub async fn run_once(&self) -> Result<RetryReport, LeadflowError> {
        let now = self.clock.now();
        let claimed = self
            .storage
            .claim_due_failed_leads(now, now + self.claim_lease, self.batch_size)
            .await?;

        let mut report = RetryReport {
            claimed: claimed.len(),
            ..RetryReport::default()
        };
        for entry in claimed {
            let outcome = self.process(entry).await?;
            report.record(&outcome);
        }

        if report.claimed > 0 {
            info!(
                claimed = report.claimed,
                resolved = report.resolved,
                rescheduled = report.rescheduled,
                deferred = report.deferred,
                dead = report.dead,
                "retry pass complete"
            );
        }
        Ok(report)
    }

    /// Replay one entry immediately, regardless of its schedule.
    ///
    /// Returns `None` if the entry is not active.
    pub async fn retry_now(&self, id: &str) -> Result<Option<RetryOutcome>, LeadflowError> {
        let Some(entry) = self.storage.get_failed_lead(id).await? else {
            return Err(LeadflowError::NotFound {
                entity: "failed lead",
                id: id.to_string(),
            });
        };
        if !entry.status.is_active() {
            debug!(failed_lead_id = id, status = %entry.status, "entry not active, skipping");
            return Ok(None);
        }
        self.process(entry).await.map(Some)
    }

    async fn dispatch(&self, entry: &FailedLead) -> Result<(), LeadflowError> {
        let payload = &entry.original_payload;
        match entry.failure_stage {
            FailureStage::Webhook | FailureStage::Intake => {
                self.replayer.replay_ingest(payload).await
            }
            FailureStage::Qualify | FailureStage::Book => self.replayer.replay_reply(payload).await,
            FailureStage::Nurture => self.replayer.replay_followup(payload).await,
        }
    }

    async fn process(&self, mut entry: FailedLead) -> Result<RetryOutcome, LeadflowError> {
        debug!(
            failed_lead_id = %entry.id,
            correlation_id = %entry.correlation_id,
            stage = %entry.failure_stage,
            attempt = entry.retry_count + 1,
            "replaying failed lead"
        );
        let result = self.dispatch(&entry).await;
        let now = self.clock.now();
        entry.updated_at = now;

        let outcome = match result {
            Ok(()) => {
                entry.status = DlqStatus::Resolved;
                entry.next_retry_at = None;
                entry.resolved_at = Some(now);
                entry.resolved_by = Some(RESOLVED_BY_ENGINE.to_string());
                RetryOutcome::Resolved
            }
            Err(err) if err.is_lock_timeout() => {
                let next_retry_at = now + self.policy.delay_for(entry.retry_count);
                entry.status = DlqStatus::Retrying;
                entry.next_retry_at = Some(next_retry_at);
                RetryOutcome::Deferred { next_retry_at }
            }
            Err(err) => {
                entry.retry_count = (entry.retry_count + 1).min(entry.max_retries);
                entry.error_message = err.to_string();
                entry.error_kind = error_kind(&err);
                let decision = if err.is_permanent() {
                    RetryDecision::GiveUp
                } else {
                    self.policy
                        .decide(entry.retry_count, entry.max_retries, now)
                };
                match decision {
                    RetryDecision::Retry { next_retry_at } => {
                        entry.status = DlqStatus::Retrying;
                        entry.next_retry_at = Some(next_retry_at);
                        warn!(
                            failed_lead_id = %entry.id,
                            correlation_id = %entry.correlation_id,
                            retry_count = entry.retry_count,
                            next_retry_at = %next_retry_at,
                            error = %err,
                            "replay failed, rescheduled"
                        );
                        RetryOutcome::Rescheduled { next_retry_at }
                    }
                    RetryDecision::GiveUp => {
                        entry.status = DlqStatus::Dead;
                        entry.next_retry_at = None;
                        RetryOutcome::Dead
                    }
                }
            }
        };

        if !self.storage.update_failed_lead(&entry).await? {
            debug!(
                failed_lead_id = %entry.id,
                "entry changed underneath the retry engine, leaving it"
            );
            return Ok(outcome);
        }

        if outcome == RetryOutcome::Dead {
            self.raise_exhausted(&entry).await;
        }
        Ok(outcome)
    }

    async fn raise_exhausted(&self, entry: &FailedLead) {
        let err = LeadflowError::RetriesExhausted {
            failed_lead_id: entry.id.clone(),
            attempts: entry.retry_count,
        };
        error!(
            failed_lead_id = %entry.id,
            correlation_id = %entry.correlation_id,
            stage = %entry.failure_stage,
            last_error = %entry.error_message,
            "{err}"
        );
        self.alerts
            .dispatch(AlertEvent {
                alert_type: AlertType::RetriesExhausted,
                message: format!(
                    "{err} (stage {}, last error: {})",
                    entry.failure_stage, entry.error_message
                ),
                correlation_id: entry.correlation_id.clone(),
                severity: Severity::Critical,
            })
            .await;
    }

    // --- Operator operations ---

    pub async fn list(
        &self,
        status: Option<DlqStatus>,
        limit: usize,
    ) -> Result<Vec<FailedLead>, LeadflowError> {
        self.storage.list_failed_leads(status, limit).await
    }

    /// Manually mark an active entry resolved.
    pub async fn resolve(&self, id: &str, operator: &str) -> Result<bool, LeadflowError> {
        let resolved = self
            .storage
            .resolve_failed_lead(id, operator, self.clock.now())
            .await?;
        if resolved {
            info!(failed_lead_id = id, operator, "failed lead resolved manually");
        }
        Ok(resolved)
    }

    /// Put a dead entry back in the queue with a fresh attempt budget.
    pub async fn requeue(&self, id: &str) -> Result<bool, LeadflowError> {
        let requeued = self
            .storage
            .requeue_failed_lead(id, self.clock.now())
            .await?;
        if requeued {
            info!(failed_lead_id = id, "dead failed lead requeued");
        }
        Ok(requeued)
    }

    pub async fn counts(&self) -> Result<Vec<(DlqStatus, i64)>, LeadflowError> {
        self.storage.count_failed_leads().await
    }
}
