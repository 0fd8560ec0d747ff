// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stuck-lead sweeper.
//!
//! Finds leads whose state has not moved within its timeout and applies the
//! per-state remediation: `intake_sent` advances to `qualifying`,
//! `qualifying` and `qualified` go cold with a follow-up scheduled, and a
//! stalled `booking` raises an operator alert without touching the lead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use leadflow_config::model::SweeperConfig;
use leadflow_coord::{AlertDispatcher, LockManager};
use leadflow_core::types::{
    AlertEvent, AlertType, AuditEvent, AuditEventType, Lead, LeadPatch, LeadState, Severity,
};
use leadflow_core::{Clock, LeadflowError, StorageAdapter};
use leadflow_lifecycle::{StateMachine, Transition, TransitionOutcome};

use crate::scheduler::Worker;

pub const SWEEPER_WORKER: &str = "sweeper";

/// A state and how long a lead may sit in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepRule {
    pub state: LeadState,
    pub timeout: chrono::Duration,
}

impl SweepRule {
    pub fn from_config(config: &SweeperConfig) -> Vec<SweepRule> {
        let mins = |m: u64| chrono::Duration::minutes(m.min(i64::MAX as u64 / 60_000) as i64);
        vec![
            SweepRule {
                state: LeadState::IntakeSent,
                timeout: mins(config.intake_sent_timeout_mins),
            },
            SweepRule {
                state: LeadState::Qualifying,
                timeout: mins(config.qualifying_timeout_mins),
            },
            SweepRule {
                state: LeadState::Qualified,
                timeout: mins(config.qualified_timeout_mins),
            },
            SweepRule {
                state: LeadState::Booking,
                timeout: mins(config.booking_timeout_mins),
            },
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub advanced: usize,
    pub cooled: usize,
    pub alerted: usize,
    /// Lock contended or the lead moved before we got to it.
    pub skipped: usize,
    pub failed: usize,
}

enum Remediation {
    Advanced,
    Cooled,
    Alerted,
    Skipped,
}

pub struct StuckLeadSweeper {
    storage: Arc<dyn StorageAdapter>,
    machine: StateMachine,
    locks: LockManager,
    alerts: AlertDispatcher,
    clock: Arc<dyn Clock>,
    rules: Vec<SweepRule>,
    batch_size: usize,
    recycle_after: chrono::Duration,
    interval: Duration,
}

impl StuckLeadSweeper {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        locks: LockManager,
        alerts: AlertDispatcher,
        clock: Arc<dyn Clock>,
        config: &SweeperConfig,
        recycle_after: chrono::Duration,
    ) -> Self {
        Self {
            machine: StateMachine::new(storage.clone(), clock.clone()),
            storage,
            locks,
            alerts,
            clock,
            rules: SweepRule::from_config(config),
            batch_size: config.batch_size,
            recycle_after,
            interval: Duration::from_secs(config.interval_secs),
        }
    }

    pub fn rules(&self) -> &[SweepRule] {
        &self.rules
    }

    /// One sweep over every rule.
    pub async fn sweep(&self) -> Result<SweepReport, LeadflowError> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for rule in &self.rules {
            let stalled = self
                .storage
                .find_stalled_leads(rule.state, now - rule.timeout, self.batch_size)
                .await?;
            if !stalled.is_empty() {
                debug!(state = %rule.state, count = stalled.len(), "stalled leads found");
            }

            for lead in stalled {
                report.examined += 1;
                let lead_id = lead.id.clone();
                let result = self
                    .locks
                    .with_lead_lock(&lead_id, self.remediate(&lead_id, *rule, now))
                    .await;
                match result {
                    Ok(Remediation::Advanced) => report.advanced += 1,
                    Ok(Remediation::Cooled) => report.cooled += 1,
                    Ok(Remediation::Alerted) => report.alerted += 1,
                    Ok(Remediation::Skipped) => report.skipped += 1,
                    Err(e) if e.is_lock_timeout() => {
                        debug!(lead_id = %lead_id, "lead busy, skipping until next sweep");
                        report.skipped += 1;
                    }
                    Err(e) => {
                        warn!(lead_id = %lead_id, error = %e, "stuck-lead remediation failed");
                        report.failed += 1;
                    }
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                examined = report.examined,
                advanced = report.advanced,
                cooled = report.cooled,
                alerted = report.alerted,
                skipped = report.skipped,
                failed = report.failed,
                "sweep finished"
            );
        }
        Ok(report)
    }

    async fn remediate(
        &self,
        lead_id: &str,
        rule: SweepRule,
        now: DateTime<Utc>,
    ) -> Result<Remediation, LeadflowError> {
        // Re-read under the lock; the lead may have moved since the query.
        let Some(mut lead) = self.storage.get_lead(lead_id).await? else {
            return Ok(Remediation::Skipped);
        };
        let last_activity = lead.last_activity_at();
        if lead.state != rule.state
            || lead.archived
            || lead.next_followup_at.is_some()
            || last_activity >= now - rule.timeout
        {
            return Ok(Remediation::Skipped);
        }

        let age_minutes = (now - last_activity).num_minutes();
        let detail = json!({
            "age_minutes": age_minutes,
            "timeout_minutes": rule.timeout.num_minutes(),
        });

        match rule.state {
            LeadState::IntakeSent => {
                let transition = Transition::to(LeadState::Qualifying, "no reply to intake")
                    .recorded_as(AuditEventType::StuckRemediated)
                    .with_detail(detail);
                self.apply(&mut lead, transition, Remediation::Advanced).await
            }
            LeadState::Qualifying | LeadState::Qualified => {
                let transition = Transition::to(LeadState::Cold, "no activity")
                    .recorded_as(AuditEventType::StuckRemediated)
                    .with_detail(detail)
                    .with_patch(LeadPatch {
                        next_followup_at: Some(Some(now + self.recycle_after)),
                        ..LeadPatch::default()
                    });
                self.apply(&mut lead, transition, Remediation::Cooled).await
            }
            LeadState::Booking => self.alert_stuck_booking(&lead, detail, age_minutes, now).await,
            other => {
                warn!(lead_id, state = %other, "no remediation for state");
                Ok(Remediation::Skipped)
            }
        }
    }

    async fn apply(
        &self,
        lead: &mut Lead,
        transition: Transition,
        applied: Remediation,
    ) -> Result<Remediation, LeadflowError> {
        match self.machine.apply(lead, transition).await? {
            TransitionOutcome::Applied => Ok(applied),
            TransitionOutcome::Stale => Ok(Remediation::Skipped),
        }
    }

    /// Booking needs a human; the lead is left as is. The audit row is
    /// written only when the alert is dispatched, not while it cools down.
    async fn alert_stuck_booking(
        &self,
        lead: &Lead,
        detail: serde_json::Value,
        age_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Remediation, LeadflowError> {
        let sent = self
            .alerts
            .dispatch(AlertEvent {
                alert_type: AlertType::StuckBooking,
                message: format!(
                    "lead {} has been in booking for {age_minutes} minutes",
                    lead.id
                ),
                correlation_id: lead.id.clone(),
                severity: Severity::Warning,
            })
            .await;
        if !sent {
            return Ok(Remediation::Skipped);
        }

        self.storage
            .record_event(
                &AuditEvent::new(
                    &lead.id,
                    AuditEventType::StuckRemediated,
                    "booking not confirmed, operator alerted",
                    now,
                )
                .with_detail(detail),
            )
            .await?;
        Ok(Remediation::Alerted)
    }
}

#[async_trait]
impl Worker for StuckLeadSweeper {
    fn name(&self) -> &'static str {
        SWEEPER_WORKER
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_pass(&self) -> Result<(), LeadflowError> {
        self.sweep().await.map(|_| ())
    }
}
