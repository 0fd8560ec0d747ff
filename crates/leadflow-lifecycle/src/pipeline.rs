// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The lead pipeline: ingestion, replies, cold-lead recycling and replay.
//!
//! Each operation runs under the per-lead lock, consults the compliance gate
//! before anything goes out, and writes state through the guarded
//! [`StateMachine`]. [`LeadPipeline::handle_event`] is the processing
//! entrypoint and never returns an error: failures land in the dead-letter
//! queue tagged with the stage they happened in.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use leadflow_compliance::{ComplianceContext, ComplianceGate, DenialTracker, OutreachKind};
use leadflow_config::model::HousekeeperConfig;
use leadflow_coord::LockManager;
use leadflow_core::types::{
    AuditEvent, AuditEventType, Booking, BookingRequest, ComplianceReason, ConsentRecord, ConsentType,
    FailureStage, InboundEvent, Lead, LeadPatch, LeadState, NewLeadPayload, ReplyPayload,
    RouterDecision, RouterInput,
};
use leadflow_core::{
    AgentRouter, Clock, CrmProvider, LeadflowError, MessageSender, RouterError, StorageAdapter,
};
use leadflow_dlq::{DeadLetterQueue, Replayer};

use crate::state_machine::{StateMachine, Transition, TransitionOutcome, can_transition, is_opt_out};
use crate::templates::fallback_message;

/// What the pipeline did with one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Work done; the lead is now in `state`.
    Processed { lead_id: String, state: LeadState },
    /// The lead was already ingested and past its first contact.
    Duplicate { lead_id: String },
    /// The compliance gate denied the outbound; state is unchanged.
    Deferred {
        lead_id: String,
        reason: ComplianceReason,
    },
    OptedOut { lead_id: String },
    /// The lead moved on underneath us; nothing was written.
    Stale { lead_id: String },
    /// Nothing to do for a lead in `state`.
    Ignored { lead_id: String, state: LeadState },
    /// The failure was captured to the dead-letter queue.
    Captured { failed_lead_id: String },
}

const MAX_DAYS: u64 = 36_500;

/// How far ahead a deferred send searches for the next allowed moment.
const DEFER_HORIZON_MINS: i64 = 8 * 24 * 60;

/// Lifecycle timings used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub recycle_after: Duration,
    pub dead_after: Duration,
    pub max_cold_outreach: u32,
    pub compliance_defer: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &HousekeeperConfig) -> Self {
        let days = |d: u64| Duration::days(d.min(MAX_DAYS) as i64);
        Self {
            recycle_after: days(config.recycle_after_days),
            dead_after: days(config.dead_after_days),
            max_cold_outreach: config.max_cold_outreach,
            compliance_defer: Duration::minutes(config.compliance_defer_mins.min(MAX_DAYS * 1440) as i64),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&HousekeeperConfig::default())
    }
}

/// Everything the pipeline is wired to.
pub struct PipelineDeps {
    pub storage: Arc<dyn StorageAdapter>,
    pub locks: LockManager,
    pub gate: ComplianceGate,
    pub denials: DenialTracker,
    pub router: Arc<dyn AgentRouter>,
    pub sender: Arc<dyn MessageSender>,
    pub crm: Arc<dyn CrmProvider>,
    pub dlq: DeadLetterQueue,
    pub clock: Arc<dyn Clock>,
    pub settings: PipelineSettings,
}

pub struct LeadPipeline {
    storage: Arc<dyn StorageAdapter>,
    machine: StateMachine,
    locks: LockManager,
    gate: ComplianceGate,
    denials: DenialTracker,
    router: Arc<dyn AgentRouter>,
    sender: Arc<dyn MessageSender>,
    crm: Arc<dyn CrmProvider>,
    dlq: DeadLetterQueue,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

/// Stable lead id for a (client, phone) pair when ingestion did not assign one.
pub fn lead_id_for(client_id: &str, phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!("{client_id}:{digits}")
}

fn invalid(what: &str, err: serde_json::Error) -> LeadflowError {
    LeadflowError::Validation(format!("malformed {what} payload: {err}"))
}

fn not_found(lead_id: &str) -> LeadflowError {
    LeadflowError::NotFound {
        entity: "lead",
        id: lead_id.to_string(),
    }
}

/// Records a send. Whatever follow-up was pending is now done.
fn outbound_patch(now: DateTime<Utc>) -> LeadPatch {
    LeadPatch {
        last_outbound_at: Some(now),
        next_followup_at: Some(None),
        ..LeadPatch::default()
    }
}

/// The lead's latest message has not been answered yet.
fn reply_pending(lead: &Lead) -> bool {
    match (lead.last_inbound_at, lead.last_outbound_at) {
        (Some(inbound), Some(outbound)) => inbound > outbound,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// State a reply advances to when the router proposes nothing usable.
fn default_reply_target(state: LeadState) -> Option<LeadState> {
    match state {
        LeadState::New => Some(LeadState::IntakeSent),
        LeadState::IntakeSent => Some(LeadState::Qualifying),
        _ => None,
    }
}

impl LeadPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            machine: StateMachine::new(deps.storage.clone(), deps.clock.clone()),
            storage: deps.storage,
            locks: deps.locks,
            gate: deps.gate,
            denials: deps.denials,
            router: deps.router,
            sender: deps.sender,
            crm: deps.crm,
            dlq: deps.dlq,
            clock: deps.clock,
            settings: deps.settings,
        }
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dlq
    }

    /// Process one inbound event. Failures are captured, never returned.
    pub async fn handle_event(&self, event: &InboundEvent) -> PipelineOutcome {
        let result = if event.is_reply {
            self.handle_reply(event).await
        } else {
            self.ingest_new_lead(event).await
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let stage = self.failure_stage(event, &err).await;
                let payload = json!({
                    "source": event.source,
                    "client_id": event.client_id,
                    "lead_payload": event.lead_payload,
                    "is_reply": event.is_reply,
                });
                let entry = self
                    .dlq
                    .capture_failure(payload, &event.source, stage, &err)
                    .await;
                PipelineOutcome::Captured {
                    failed_lead_id: entry.id,
                }
            }
        }
    }

    async fn failure_stage(&self, event: &InboundEvent, err: &LeadflowError) -> FailureStage {
        if !event.is_reply {
            return if matches!(err, LeadflowError::Validation(_)) {
                FailureStage::Webhook
            } else {
                FailureStage::Intake
            };
        }
        let lead_id = event.lead_payload.get("lead_id").and_then(Value::as_str);
        let state = match lead_id {
            Some(id) => self.storage.get_lead(id).await.ok().flatten().map(|l| l.state),
            None => None,
        };
        match state {
            Some(LeadState::Qualified | LeadState::Booking | LeadState::Booked) => {
                FailureStage::Book
            }
            _ => FailureStage::Qualify,
        }
    }

    // --- New leads ---

    /// Ingest a new lead and send its first, compliance-gated message.
    ///
    /// Re-ingesting a lead that is still `new` (its first message never went
    /// out) resumes first contact; any later state is a duplicate.
    pub async fn ingest_new_lead(
        &self,
        event: &InboundEvent,
    ) -> Result<PipelineOutcome, LeadflowError> {
        let payload: NewLeadPayload = serde_json::from_value(event.lead_payload.clone())
            .map_err(|e| invalid("new lead", e))?;
        if !payload.phone.chars().any(|c| c.is_ascii_digit()) {
            return Err(LeadflowError::Validation(format!(
                "lead phone `{}` has no digits",
                payload.phone
            )));
        }
        let lead_id = payload
            .lead_id
            .clone()
            .unwrap_or_else(|| lead_id_for(&event.client_id, &payload.phone));

        self.locks
            .with_lead_lock(&lead_id, self.ingest_locked(event, payload, &lead_id))
            .await
    }

    async fn ingest_locked(
        &self,
        event: &InboundEvent,
        payload: NewLeadPayload,
        lead_id: &str,
    ) -> Result<PipelineOutcome, LeadflowError> {
        let now = self.clock.now();
        let mut lead = Lead::new(lead_id, &event.client_id, &payload.phone, now);
        lead.name = payload.name.clone();
        lead.state_code = payload.state_code.clone();
        lead.is_emergency = payload.is_emergency;

        if self.storage.insert_lead_if_absent(&lead).await? {
            info!(lead_id, client_id = %event.client_id, source = %event.source, "lead ingested");
            self.storage
                .record_event(
                    &AuditEvent::new(lead_id, AuditEventType::InboundReceived, "new lead", now)
                        .with_detail(json!({
                            "source": event.source,
                            "message": payload.message,
                        })),
                )
                .await?;
        } else {
            lead = self
                .storage
                .get_lead(lead_id)
                .await?
                .ok_or_else(|| not_found(lead_id))?;
            if lead.state != LeadState::New {
                debug!(lead_id, state = %lead.state, "duplicate lead ignored");
                return Ok(PipelineOutcome::Duplicate {
                    lead_id: lead_id.to_string(),
                });
            }
        }

        let consent = match payload.consent {
            Some(consent_type) => Some(
                self.storage
                    .record_consent(&lead.phone, &lead.client_id, consent_type, now)
                    .await?,
            ),
            None => self.storage.get_consent(&lead.phone, &lead.client_id).await?,
        };
        if let Some(record) = &consent {
            if lead.consent_id != Some(record.id) {
                self.storage
                    .patch_lead(
                        lead_id,
                        &LeadPatch {
                            consent_id: Some(record.id),
                            ..LeadPatch::default()
                        },
                    )
                    .await?;
                lead.consent_id = Some(record.id);
            }
        }

        self.first_contact(&mut lead, consent.as_ref(), payload.message, now)
            .await
    }

    /// Gate, compose and send the first message, moving the lead to `intake_sent`.
    async fn first_contact(
        &self,
        lead: &mut Lead,
        consent: Option<&ConsentRecord>,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, LeadflowError> {
        if let Some(outcome) = self
            .gate_or_defer(lead, consent, OutreachKind::FirstContact, now)
            .await?
        {
            return Ok(outcome);
        }

        let decision = self.compose(lead, &RouterInput::NewLead { message }).await?;
        self.deliver(lead, &decision.message).await?;

        let transition = Transition::to(LeadState::IntakeSent, "first outbound sent")
            .with_patch(outbound_patch(now));
        self.finish(lead, transition).await
    }

    // --- Replies ---

    /// Handle an inbound reply from an existing lead.
    pub async fn handle_reply(&self, event: &InboundEvent) -> Result<PipelineOutcome, LeadflowError> {
        let payload: ReplyPayload =
            serde_json::from_value(event.lead_payload.clone()).map_err(|e| invalid("reply", e))?;
        let lead_id = payload.lead_id.clone();
        self.locks
            .with_lead_lock(&lead_id, self.reply_locked(&event.client_id, payload))
            .await
    }

    async fn reply_locked(
        &self,
        client_id: &str,
        payload: ReplyPayload,
    ) -> Result<PipelineOutcome, LeadflowError> {
        let now = self.clock.now();
        let lead_id = payload.lead_id.as_str();
        let mut lead = self
            .storage
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| not_found(lead_id))?;
        if lead.client_id != client_id {
            return Err(LeadflowError::Validation(format!(
                "lead {lead_id} does not belong to client {client_id}"
            )));
        }

        self.storage
            .patch_lead(
                lead_id,
                &LeadPatch {
                    last_inbound_at: Some(now),
                    ..LeadPatch::default()
                },
            )
            .await?;
        lead.last_inbound_at = Some(now);
        self.storage
            .record_event(
                &AuditEvent::new(lead_id, AuditEventType::InboundReceived, "reply", now)
                    .with_detail(json!({ "message": payload.message })),
            )
            .await?;

        if is_opt_out(&payload.message) {
            return self.opt_out(&mut lead, now).await;
        }

        if lead.state.is_terminal() {
            debug!(lead_id, state = %lead.state, "reply to terminal lead ignored");
            return Ok(PipelineOutcome::Ignored {
                lead_id: lead.id,
                state: lead.state,
            });
        }

        self.answer(&mut lead, payload.message, now).await
    }

    /// Gate, compose and send the answer to the lead's latest message. A cold
    /// lead moves back to `qualifying` only once that answer has gone out.
    async fn answer(
        &self,
        lead: &mut Lead,
        message: String,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, LeadflowError> {
        // A lead writing in implies consent to answer.
        let consent = match self.storage.get_consent(&lead.phone, &lead.client_id).await? {
            Some(record) => record,
            None => {
                self.storage
                    .record_consent(&lead.phone, &lead.client_id, ConsentType::Implied, now)
                    .await?
            }
        };
        if let Some(outcome) = self
            .gate_or_defer(lead, Some(&consent), OutreachKind::Reply, now)
            .await?
        {
            return Ok(outcome);
        }

        let decision = self.compose(lead, &RouterInput::Reply { message }).await?;

        if lead.state == LeadState::Cold {
            self.deliver(lead, &decision.message).await?;
            let transition = Transition::to(LeadState::Qualifying, "reply re-engaged cold lead")
                .with_patch(outbound_patch(now));
            return self.finish(lead, transition).await;
        }

        let proposed = decision.next_state.filter(|&to| {
            let forward = can_transition(lead.state, to)
                && !matches!(to, LeadState::Cold | LeadState::Dead | LeadState::OptedOut);
            if !forward {
                warn!(lead_id = %lead.id, from = %lead.state, to = %to, "router proposed an invalid transition");
            }
            forward
        });
        let mut target = proposed.or_else(|| default_reply_target(lead.state));
        let mut detail = Value::Null;

        if target == Some(LeadState::Booked) {
            match self.confirm_booking(lead, &decision).await? {
                Some(booking) => detail = json!({ "booking_id": booking.id }),
                None => target = None,
            }
        }

        self.deliver(lead, &decision.message).await?;

        match target {
            Some(to) => {
                let transition = Transition::to(to, "reply handled")
                    .with_patch(outbound_patch(now))
                    .with_detail(detail);
                self.finish(lead, transition).await
            }
            None => {
                self.storage.patch_lead(&lead.id, &outbound_patch(now)).await?;
                self.storage
                    .record_event(&AuditEvent::new(
                        &lead.id,
                        AuditEventType::OutboundSent,
                        "reply sent",
                        now,
                    ))
                    .await?;
                Ok(PipelineOutcome::Processed {
                    lead_id: lead.id.clone(),
                    state: lead.state,
                })
            }
        }
    }

    async fn opt_out(
        &self,
        lead: &mut Lead,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, LeadflowError> {
        self.storage
            .record_opt_out(&lead.phone, &lead.client_id, now)
            .await?;
        info!(lead_id = %lead.id, "lead opted out");
        if lead.state != LeadState::OptedOut {
            let transition = Transition::to(LeadState::OptedOut, "opt-out keyword received")
                .recorded_as(AuditEventType::OptedOut)
                .with_patch(LeadPatch {
                    next_followup_at: Some(None),
                    ..LeadPatch::default()
                });
            if self.machine.apply(lead, transition).await? == TransitionOutcome::Stale {
                return Ok(PipelineOutcome::Stale {
                    lead_id: lead.id.clone(),
                });
            }
        }
        Ok(PipelineOutcome::OptedOut {
            lead_id: lead.id.clone(),
        })
    }

    /// Check availability, pick a technician, create the customer and the booking.
    ///
    /// Returns `None` when there is nothing to book yet.
    async fn confirm_booking(
        &self,
        lead: &Lead,
        decision: &RouterDecision,
    ) -> Result<Option<Booking>, LeadflowError> {
        let Some(request) = &decision.booking else {
            warn!(lead_id = %lead.id, "router proposed booking without a slot");
            return Ok(None);
        };
        let slots = self.crm.get_availability(&request.slot).await?;
        let Some(slot) = slots.into_iter().next() else {
            info!(lead_id = %lead.id, crm = self.crm.name(), "requested slot unavailable");
            return Ok(None);
        };
        let technicians = self.crm.get_technicians().await?;
        let customer = self.crm.create_customer(lead).await?;
        let booking = self
            .crm
            .create_booking(
                &customer,
                technicians.first(),
                &BookingRequest {
                    slot,
                    service: request.service.clone(),
                },
            )
            .await?;
        info!(lead_id = %lead.id, booking_id = %booking.id, crm = self.crm.name(), "booking created");
        Ok(Some(booking))
    }

    // --- Cold leads and scheduled follow-ups ---

    /// Re-engage a cold lead whose follow-up is due, or retire it.
    pub async fn recycle_cold_lead(&self, lead_id: &str) -> Result<PipelineOutcome, LeadflowError> {
        self.locks
            .with_lead_lock(lead_id, self.recycle_locked(lead_id))
            .await
    }

    async fn recycle_locked(&self, lead_id: &str) -> Result<PipelineOutcome, LeadflowError> {
        let now = self.clock.now();
        let mut lead = self
            .storage
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| not_found(lead_id))?;
        if lead.state != LeadState::Cold {
            return Ok(PipelineOutcome::Ignored {
                lead_id: lead.id,
                state: lead.state,
            });
        }
        self.recycle(&mut lead, now).await
    }

    async fn recycle(
        &self,
        lead: &mut Lead,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, LeadflowError> {
        if lead.cold_outreach_count >= self.settings.max_cold_outreach {
            return self.retire(lead, "cold outreach attempts exhausted").await;
        }
        if now - lead.updated_at >= self.settings.dead_after {
            return self.retire(lead, "cold past dead threshold").await;
        }

        let consent = self.storage.get_consent(&lead.phone, &lead.client_id).await?;
        let context = ComplianceContext::for_lead(lead, consent.as_ref(), OutreachKind::ColdOutreach);
        let decision = self.gate.evaluate(&context, now);
        if !decision.allowed {
            if decision.reason == ComplianceReason::ColdOutreachCap {
                return self.retire(lead, "cold outreach attempts exhausted").await;
            }
            let retry_at = self.next_attempt_at(&context, decision.reason, now);
            return self.defer(lead, decision.reason, retry_at, now).await;
        }

        let attempt = lead.cold_outreach_count + 1;
        let reply = self
            .compose(lead, &RouterInput::ColdRecycle { attempt })
            .await?;
        self.deliver(lead, &reply.message).await?;

        let transition = Transition::to(LeadState::Qualifying, "cold lead recycled")
            .recorded_as(AuditEventType::Recycled)
            .with_detail(json!({ "attempt": attempt }))
            .with_patch(LeadPatch {
                cold_outreach_count: Some(attempt),
                next_followup_at: Some(None),
                last_outbound_at: Some(now),
                ..LeadPatch::default()
            });
        self.finish(lead, transition).await
    }

    /// Run whatever a lead's `next_followup_at` was scheduled for: answer a
    /// deferred reply, resume a deferred first contact, or recycle a cold lead.
    pub async fn follow_up(&self, lead_id: &str) -> Result<PipelineOutcome, LeadflowError> {
        self.locks
            .with_lead_lock(lead_id, self.follow_up_locked(lead_id))
            .await
    }

    /// [`follow_up`](Self::follow_up), capturing failures to the dead-letter
    /// queue under the `nurture` stage. A captured lead's follow-up is cleared
    /// so the retry engine alone redrives it. A busy lead is left for the next
    /// pass.
    pub async fn follow_up_or_capture(&self, lead: &Lead) -> PipelineOutcome {
        match self.follow_up(&lead.id).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_lock_timeout() => {
                debug!(lead_id = %lead.id, "lead busy, follow-up left for next pass");
                PipelineOutcome::Stale {
                    lead_id: lead.id.clone(),
                }
            }
            Err(err) => {
                let payload = json!({ "lead_id": lead.id, "client_id": lead.client_id });
                let entry = self
                    .dlq
                    .capture_failure(payload, "housekeeper", FailureStage::Nurture, &err)
                    .await;
                let cleared = LeadPatch {
                    next_followup_at: Some(None),
                    ..LeadPatch::default()
                };
                if let Err(e) = self.storage.patch_lead(&lead.id, &cleared).await {
                    warn!(lead_id = %lead.id, error = %e, "could not clear follow-up after capture");
                }
                PipelineOutcome::Captured {
                    failed_lead_id: entry.id,
                }
            }
        }
    }

    async fn follow_up_locked(&self, lead_id: &str) -> Result<PipelineOutcome, LeadflowError> {
        let now = self.clock.now();
        let mut lead = self
            .storage
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| not_found(lead_id))?;
        if lead.state.is_terminal() || lead.archived {
            return Ok(PipelineOutcome::Ignored {
                lead_id: lead.id,
                state: lead.state,
            });
        }

        if reply_pending(&lead) {
            let message = self
                .last_inbound_message(&lead.id)
                .await?
                .unwrap_or_default();
            return self.answer(&mut lead, message, now).await;
        }

        match lead.state {
            LeadState::New => {
                let message = self.last_inbound_message(&lead.id).await?;
                let consent = self.storage.get_consent(&lead.phone, &lead.client_id).await?;
                self.first_contact(&mut lead, consent.as_ref(), message, now)
                    .await
            }
            LeadState::Cold => self.recycle(&mut lead, now).await,
            state => {
                let cleared = LeadPatch {
                    next_followup_at: Some(None),
                    ..LeadPatch::default()
                };
                self.storage.patch_lead(&lead.id, &cleared).await?;
                Ok(PipelineOutcome::Ignored {
                    lead_id: lead.id,
                    state,
                })
            }
        }
    }

    /// Text of the lead's latest inbound message, from the audit trail.
    async fn last_inbound_message(&self, lead_id: &str) -> Result<Option<String>, LeadflowError> {
        let events = self.storage.list_events(lead_id).await?;
        Ok(events
            .iter()
            .rev()
            .filter(|e| e.event_type == AuditEventType::InboundReceived)
            .find_map(|e| e.detail.get("message").and_then(Value::as_str))
            .map(str::to_string))
    }

    async fn retire(
        &self,
        lead: &mut Lead,
        reason: &str,
    ) -> Result<PipelineOutcome, LeadflowError> {
        let transition = Transition::to(LeadState::Dead, reason)
            .with_detail(json!({ "cold_outreach_count": lead.cold_outreach_count }))
            .with_patch(LeadPatch {
                next_followup_at: Some(None),
                ..LeadPatch::default()
            });
        self.finish(lead, transition).await
    }

    // --- Shared steps ---

    /// Evaluate the gate. On denial, record it and return the deferral.
    async fn gate_or_defer(
        &self,
        lead: &mut Lead,
        consent: Option<&ConsentRecord>,
        kind: OutreachKind,
        now: DateTime<Utc>,
    ) -> Result<Option<PipelineOutcome>, LeadflowError> {
        let context = ComplianceContext::for_lead(lead, consent, kind);
        let decision = self.gate.evaluate(&context, now);
        if decision.allowed {
            return Ok(None);
        }
        let retry_at = self.next_attempt_at(&context, decision.reason, now);
        self.defer(lead, decision.reason, retry_at, now)
            .await
            .map(Some)
    }

    /// When a denied send should be tried again. Quiet hours and holidays
    /// resolve to the next moment the gate would allow; anything else waits
    /// one deferral interval.
    fn next_attempt_at(
        &self,
        context: &ComplianceContext<'_>,
        reason: ComplianceReason,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let step = self.settings.compliance_defer;
        let fallback = now + step;
        if !matches!(reason, ComplianceReason::QuietHours | ComplianceReason::Holiday) {
            return fallback;
        }
        let max_steps = (DEFER_HORIZON_MINS / step.num_minutes().max(1)).clamp(1, 10_000) as u32;
        self.gate
            .next_allowed_at(context, now, step, max_steps)
            .unwrap_or(fallback)
    }

    /// Record a denial and schedule a follow-up so the send is retried, not
    /// dropped. An opted-out consent record moves the lead to `opted_out`.
    async fn defer(
        &self,
        lead: &mut Lead,
        reason: ComplianceReason,
        retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome, LeadflowError> {
        info!(lead_id = %lead.id, reason = %reason, %retry_at, "outbound deferred by compliance");
        self.storage
            .record_event(
                &AuditEvent::new(
                    &lead.id,
                    AuditEventType::ComplianceDenied,
                    reason.to_string(),
                    now,
                )
                .with_detail(json!({ "retry_at": retry_at })),
            )
            .await?;
        self.denials.record(&lead.id, reason).await;

        if reason == ComplianceReason::OptedOut && lead.state != LeadState::OptedOut {
            let transition = Transition::to(LeadState::OptedOut, "consent record opted out")
                .recorded_as(AuditEventType::OptedOut)
                .with_patch(LeadPatch {
                    next_followup_at: Some(None),
                    ..LeadPatch::default()
                });
            self.machine.apply(lead, transition).await?;
            return Ok(PipelineOutcome::OptedOut {
                lead_id: lead.id.clone(),
            });
        }

        if !lead.state.is_terminal() {
            self.storage
                .patch_lead(
                    &lead.id,
                    &LeadPatch {
                        next_followup_at: Some(Some(retry_at)),
                        ..LeadPatch::default()
                    },
                )
                .await?;
            lead.next_followup_at = Some(retry_at);
        }

        Ok(PipelineOutcome::Deferred {
            lead_id: lead.id.clone(),
            reason,
        })
    }

    /// Ask the router for the next message, falling back to a template.
    async fn compose(
        &self,
        lead: &Lead,
        input: &RouterInput,
    ) -> Result<RouterDecision, LeadflowError> {
        match self.router.route(lead, input).await {
            Ok(decision) => Ok(decision),
            Err(RouterError::Unavailable(why)) => {
                warn!(lead_id = %lead.id, reason = %why, "router unavailable, using template");
                Ok(RouterDecision {
                    message: fallback_message(lead, input),
                    next_state: None,
                    booking: None,
                })
            }
            Err(RouterError::Rejected(why)) => Err(LeadflowError::Validation(format!(
                "router rejected input for lead {}: {why}",
                lead.id
            ))),
        }
    }

    async fn deliver(&self, lead: &Lead, message: &str) -> Result<(), LeadflowError> {
        let receipt = self.sender.send(lead, message).await?;
        if !receipt.delivered {
            return Err(LeadflowError::provider(format!(
                "message to lead {} refused: {}",
                lead.id,
                receipt.error.as_deref().unwrap_or("no reason given")
            )));
        }
        debug!(lead_id = %lead.id, provider_message_id = ?receipt.provider_message_id, "message delivered");
        Ok(())
    }

    async fn finish(
        &self,
        lead: &mut Lead,
        transition: Transition,
    ) -> Result<PipelineOutcome, LeadflowError> {
        match self.machine.apply(lead, transition).await? {
            TransitionOutcome::Applied => Ok(PipelineOutcome::Processed {
                lead_id: lead.id.clone(),
                state: lead.state,
            }),
            TransitionOutcome::Stale => Ok(PipelineOutcome::Stale {
                lead_id: lead.id.clone(),
            }),
        }
    }
}

#[async_trait]
impl Replayer for LeadPipeline {
    async fn replay_ingest(&self, payload: &Value) -> Result<(), LeadflowError> {
        let event: InboundEvent =
            serde_json::from_value(payload.clone()).map_err(|e| invalid("inbound event", e))?;
        let outcome = self.ingest_new_lead(&event).await?;
        debug!(?outcome, "ingest replayed");
        Ok(())
    }

    async fn replay_reply(&self, payload: &Value) -> Result<(), LeadflowError> {
        let event: InboundEvent =
            serde_json::from_value(payload.clone()).map_err(|e| invalid("inbound event", e))?;
        let outcome = self.handle_reply(&event).await?;
        debug!(?outcome, "reply replayed");
        Ok(())
    }

    async fn replay_followup(&self, payload: &Value) -> Result<(), LeadflowError> {
        let lead_id = payload
            .get("lead_id")
            .and_then(Value::as_str)
            .ok_or_else(|| LeadflowError::Validation("follow-up payload has no lead_id".into()))?;
        let outcome = self.follow_up(lead_id).await?;
        debug!(?outcome, "follow-up replayed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::TimeZone;
    use leadflow_config::model::{ComplianceConfig, RetryConfig, StorageConfig};
    use leadflow_coord::{AlertDispatcher, LockOptions, MemoryCoordinationStore};
    use leadflow_core::types::{DlqStatus, TimeSlot};
    use leadflow_dlq::BackoffPolicy;
    use leadflow_storage::SqliteStorage;
    use leadflow_test_utils::{ManualClock, MockCrm, MockRouter, MockSender, RecordingAlertSink};

    use super::*;

    struct Fixture {
        pipeline: LeadPipeline,
        storage: Arc<SqliteStorage>,
        router: Arc<MockRouter>,
        sender: Arc<MockSender>,
        crm: Arc<MockCrm>,
        clock: Arc<ManualClock>,
        _dir: tempfile::TempDir,
    }

    /// 2026-03-10 15:00 UTC is mid-morning on both US coasts.
    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap()
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("pipeline.db").to_string_lossy().to_string(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();

        let coord = Arc::new(MemoryCoordinationStore::new());
        let sink = Arc::new(RecordingAlertSink::new());
        let alerts = AlertDispatcher::new(coord.clone(), sink, StdDuration::from_secs(900));
        let clock = Arc::new(ManualClock::new(start()));
        let router = Arc::new(MockRouter::new());
        let sender = Arc::new(MockSender::new());
        let crm = Arc::new(MockCrm::new());
        let compliance = ComplianceConfig::default();

        let pipeline = LeadPipeline::new(PipelineDeps {
            storage: storage.clone(),
            locks: LockManager::new(coord.clone(), LockOptions::default()),
            gate: ComplianceGate::new(&compliance, 3).unwrap(),
            denials: DenialTracker::from_config(coord, alerts.clone(), &compliance),
            router: router.clone(),
            sender: sender.clone(),
            crm: crm.clone(),
            dlq: DeadLetterQueue::new(
                storage.clone(),
                alerts,
                BackoffPolicy::from_config(&RetryConfig::default()),
                clock.clone(),
            ),
            clock: clock.clone(),
            settings: PipelineSettings::default(),
        });

        Fixture {
            pipeline,
            storage,
            router,
            sender,
            crm,
            clock,
            _dir: dir,
        }
    }

    fn new_lead_event(lead_id: &str) -> InboundEvent {
        InboundEvent {
            source: "webform".into(),
            client_id: "client-1".into(),
            lead_payload: json!({
                "lead_id": lead_id,
                "phone": "+1 (512) 555-0100",
                "name": "Jordan",
                "state_code": "TX",
                "message": "AC is out",
                "consent": "express",
            }),
            is_reply: false,
        }
    }

    fn reply_event(lead_id: &str, message: &str) -> InboundEvent {
        InboundEvent {
            source: "sms".into(),
            client_id: "client-1".into(),
            lead_payload: json!({ "lead_id": lead_id, "message": message }),
            is_reply: true,
        }
    }

    async fn lead(f: &Fixture, id: &str) -> Lead {
        f.storage.get_lead(id).await.unwrap().expect("lead should exist")
    }

    async fn seed_cold_lead(f: &Fixture, id: &str, cold_outreach_count: u32) {
        let went_cold = start() - Duration::days(7);
        let mut lead = Lead::new(id, "client-1", "+15125550100", went_cold);
        lead.state = LeadState::Cold;
        lead.state_code = Some("TX".into());
        lead.cold_outreach_count = cold_outreach_count;
        lead.next_followup_at = Some(start());
        assert!(f.storage.insert_lead_if_absent(&lead).await.unwrap());
        f.storage
            .record_consent(&lead.phone, &lead.client_id, ConsentType::Express, went_cold)
            .await
            .unwrap();
    }

    #[test]
    fn lead_id_for_uses_phone_digits() {
        assert_eq!(lead_id_for("client-1", "+1 (512) 555-0100"), "client-1:15125550100");
    }

    #[test]
    fn default_settings_follow_housekeeper_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.recycle_after, Duration::days(7));
        assert_eq!(settings.dead_after, Duration::days(30));
        assert_eq!(settings.max_cold_outreach, 3);
        assert_eq!(settings.compliance_defer, Duration::minutes(60));
    }

    #[tokio::test]
    async fn new_lead_gets_first_message_and_moves_to_intake_sent() {
        let f = fixture().await;

        let outcome = f.pipeline.handle_event(&new_lead_event("lead-1")).await;
        assert_eq!(
            outcome,
            PipelineOutcome::Processed {
                lead_id: "lead-1".into(),
                state: LeadState::IntakeSent
            }
        );

        let stored = lead(&f, "lead-1").await;
        assert_eq!(stored.state, LeadState::IntakeSent);
        assert_eq!(stored.previous_state, Some(LeadState::New));
        assert_eq!(stored.last_outbound_at, Some(start()));
        assert!(stored.consent_id.is_some());
        assert_eq!(f.sender.sent_to("lead-1").len(), 1);
        assert_eq!(
            f.router.inputs()[0].1,
            RouterInput::NewLead {
                message: Some("AC is out".into())
            }
        );
    }

    #[tokio::test]
    async fn replayed_webhook_does_not_create_a_second_lead_or_message() {
        let f = fixture().await;
        let event = new_lead_event("lead-1");

        f.pipeline.handle_event(&event).await;
        let outcome = f.pipeline.handle_event(&event).await;

        assert_eq!(
            outcome,
            PipelineOutcome::Duplicate {
                lead_id: "lead-1".into()
            }
        );
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn lead_id_is_derived_when_ingestion_assigns_none() {
        let f = fixture().await;
        let mut event = new_lead_event("unused");
        event.lead_payload.as_object_mut().unwrap().remove("lead_id");

        f.pipeline.handle_event(&event).await;

        let stored = lead(&f, "client-1:15125550100").await;
        assert_eq!(stored.state, LeadState::IntakeSent);
    }

    #[tokio::test]
    async fn first_contact_at_night_is_deferred_then_resumed() {
        let f = fixture().await;
        // 03:00 UTC is 22:00 the previous evening in Texas.
        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 3, 0, 0).unwrap());

        let outcome = f.pipeline.handle_event(&new_lead_event("lead-1")).await;
        assert_eq!(
            outcome,
            PipelineOutcome::Deferred {
                lead_id: "lead-1".into(),
                reason: ComplianceReason::QuietHours
            }
        );
        assert_eq!(lead(&f, "lead-1").await.state, LeadState::New);
        assert!(f.sender.sent().is_empty());

        let events = f.storage.list_events("lead-1").await.unwrap();
        assert!(
            events
                .iter()
                .any(|e| e.event_type == AuditEventType::ComplianceDenied && e.reason == "quiet_hours")
        );

        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 15, 0, 0).unwrap());
        let outcome = f.pipeline.handle_event(&new_lead_event("lead-1")).await;
        assert!(matches!(
            outcome,
            PipelineOutcome::Processed {
                state: LeadState::IntakeSent,
                ..
            }
        ));
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn deferred_first_contact_is_scheduled_and_sent_by_follow_up() {
        let f = fixture().await;
        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 3, 0, 0).unwrap());
        f.pipeline.handle_event(&new_lead_event("lead-1")).await;

        let waiting = lead(&f, "lead-1").await;
        assert_eq!(waiting.state, LeadState::New);
        assert_eq!(
            waiting.next_followup_at,
            Some(Utc.with_ymd_and_hms(2026, 3, 11, 13, 0, 0).unwrap())
        );

        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 13, 5, 0).unwrap());
        let outcome = f.pipeline.follow_up("lead-1").await.unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::Processed {
                lead_id: "lead-1".into(),
                state: LeadState::IntakeSent
            }
        );
        assert_eq!(lead(&f, "lead-1").await.next_followup_at, None);
        assert_eq!(f.sender.sent().len(), 1);
        assert_eq!(
            f.router.inputs()[0].1,
            RouterInput::NewLead {
                message: Some("AC is out".into())
            }
        );
    }

    #[tokio::test]
    async fn reply_deferred_overnight_is_answered_in_the_morning() {
        let f = fixture().await;
        f.pipeline.handle_event(&new_lead_event("lead-1")).await;
        f.pipeline
            .handle_event(&reply_event("lead-1", "it is making a noise"))
            .await;
        assert_eq!(lead(&f, "lead-1").await.state, LeadState::Qualifying);

        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 3, 30, 0).unwrap());
        let outcome = f
            .pipeline
            .handle_event(&reply_event("lead-1", "also the unit is 12 years old"))
            .await;
        assert_eq!(
            outcome,
            PipelineOutcome::Deferred {
                lead_id: "lead-1".into(),
                reason: ComplianceReason::QuietHours
            }
        );
        assert_eq!(f.sender.sent().len(), 2);

        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 13, 0, 0).unwrap());
        f.pipeline.follow_up("lead-1").await.unwrap();

        assert_eq!(f.sender.sent().len(), 3);
        let inputs = f.router.inputs();
        assert_eq!(
            inputs.last().unwrap().1,
            RouterInput::Reply {
                message: "also the unit is 12 years old".into()
            }
        );
        assert_eq!(lead(&f, "lead-1").await.next_followup_at, None);
    }

    #[tokio::test]
    async fn emergency_lead_is_contacted_during_quiet_hours() {
        let f = fixture().await;
        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 3, 0, 0).unwrap());
        let mut event = new_lead_event("lead-1");
        event.lead_payload["is_emergency"] = json!(true);

        let outcome = f.pipeline.handle_event(&event).await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Processed {
                state: LeadState::IntakeSent,
                ..
            }
        ));
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_captured_as_permanent_webhook_failure() {
        let f = fixture().await;
        let event = InboundEvent {
            source: "webform".into(),
            client_id: "client-1".into(),
            lead_payload: json!({ "lead_id": "lead-1", "name": "no phone" }),
            is_reply: false,
        };

        let outcome = f.pipeline.handle_event(&event).await;
        let PipelineOutcome::Captured { failed_lead_id } = outcome else {
            panic!("expected capture, got {outcome:?}");
        };

        let entry = f
            .storage
            .get_failed_lead(&failed_lead_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.failure_stage, FailureStage::Webhook);
        assert_eq!(entry.max_retries, 1);
        assert_eq!(entry.lead_id.as_deref(), Some("lead-1"));
        assert_eq!(entry.status, DlqStatus::Pending);
    }

    #[tokio::test]
    async fn send_failure_is_captured_and_replay_completes_first_contact() {
        let f = fixture().await;
        f.sender.fail_next(1);

        let outcome = f.pipeline.handle_event(&new_lead_event("lead-1")).await;
        let PipelineOutcome::Captured { failed_lead_id } = outcome else {
            panic!("expected capture, got {outcome:?}");
        };
        let entry = f
            .storage
            .get_failed_lead(&failed_lead_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.failure_stage, FailureStage::Intake);
        assert_eq!(lead(&f, "lead-1").await.state, LeadState::New);

        f.pipeline
            .replay_ingest(&entry.original_payload)
            .await
            .unwrap();

        assert_eq!(lead(&f, "lead-1").await.state, LeadState::IntakeSent);
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn reply_without_router_proposal_advances_intake_to_qualifying() {
        let f = fixture().await;
        f.pipeline.handle_event(&new_lead_event("lead-1")).await;
        f.clock.advance(Duration::minutes(5));

        let outcome = f
            .pipeline
            .handle_event(&reply_event("lead-1", "yes it's urgent"))
            .await;

        assert_eq!(
            outcome,
            PipelineOutcome::Processed {
                lead_id: "lead-1".into(),
                state: LeadState::Qualifying
            }
        );
        let stored = lead(&f, "lead-1").await;
        assert_eq!(stored.last_inbound_at, Some(start() + Duration::minutes(5)));
        assert_eq!(f.sender.sent_to("lead-1").len(), 2);
    }

    #[tokio::test]
    async fn router_proposing_an_illegal_jump_is_ignored() {
        let f = fixture().await;
        f.pipeline.handle_event(&new_lead_event("lead-1")).await;
        f.router.push_reply("all done!", Some(LeadState::Completed));

        f.pipeline.handle_event(&reply_event("lead-1", "hi")).await;

        assert_eq!(lead(&f, "lead-1").await.state, LeadState::Qualifying);
    }

    #[tokio::test]
    async fn router_outage_falls_back_to_template() {
        let f = fixture().await;
        f.pipeline.handle_event(&new_lead_event("lead-1")).await;
        f.router.push_unavailable();

        f.pipeline.handle_event(&reply_event("lead-1", "hello?")).await;

        let sent = f.sender.sent_to("lead-1");
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[1], "mock response");
        assert!(!sent[1].is_empty());
    }

    #[tokio::test]
    async fn router_rejection_is_captured_as_permanent() {
        let f = fixture().await;
        f.pipeline.handle_event(&new_lead_event("lead-1")).await;
        f.router
            .push(Err(RouterError::Rejected("abusive content".into())));

        let outcome = f.pipeline.handle_event(&reply_event("lead-1", "...")).await;
        let PipelineOutcome::Captured { failed_lead_id } = outcome else {
            panic!("expected capture, got {outcome:?}");
        };
        let entry = f
            .storage
            .get_failed_lead(&failed_lead_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.failure_stage, FailureStage::Qualify);
        assert_eq!(entry.max_retries, 1);
    }

    #[tokio::test]
    async fn stop_keyword_opts_the_lead_out() {
        let f = fixture().await;
        f.pipeline.handle_event(&new_lead_event("lead-1")).await;

        let outcome = f.pipeline.handle_event(&reply_event("lead-1", " stop! ")).await;

        assert_eq!(
            outcome,
            PipelineOutcome::OptedOut {
                lead_id: "lead-1".into()
            }
        );
        let stored = lead(&f, "lead-1").await;
        assert_eq!(stored.state, LeadState::OptedOut);
        let consent = f
            .storage
            .get_consent(&stored.phone, "client-1")
            .await
            .unwrap()
            .unwrap();
        assert!(consent.opted_out);
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn reply_to_completed_lead_is_ignored() {
        let f = fixture().await;
        let mut done = Lead::new("lead-1", "client-1", "+15125550100", start());
        done.state = LeadState::Completed;
        f.storage.insert_lead_if_absent(&done).await.unwrap();

        let outcome = f.pipeline.handle_event(&reply_event("lead-1", "thanks")).await;

        assert_eq!(
            outcome,
            PipelineOutcome::Ignored {
                lead_id: "lead-1".into(),
                state: LeadState::Completed
            }
        );
        assert!(f.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn booking_is_confirmed_with_the_crm() {
        let f = fixture().await;
        let mut ready = Lead::new("lead-1", "client-1", "+15125550100", start());
        ready.state = LeadState::Booking;
        ready.state_code = Some("TX".into());
        f.storage.insert_lead_if_absent(&ready).await.unwrap();

        let slot = TimeSlot {
            start: start() + Duration::days(1),
            end: start() + Duration::days(1) + Duration::hours(2),
        };
        f.router.push(Ok(RouterDecision {
            message: "You're booked for tomorrow".into(),
            next_state: Some(LeadState::Booked),
            booking: Some(BookingRequest {
                slot: slot.clone(),
                service: Some("ac repair".into()),
            }),
        }));

        let outcome = f
            .pipeline
            .handle_event(&reply_event("lead-1", "tomorrow works"))
            .await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Processed {
                state: LeadState::Booked,
                ..
            }
        ));
        let bookings = f.crm.bookings();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].slot, slot);
        assert_eq!(bookings[0].technician_id.as_deref(), Some("tech-1"));
    }

    #[tokio::test]
    async fn booking_without_open_slot_keeps_the_lead_in_booking() {
        let f = fixture().await;
        let mut ready = Lead::new("lead-1", "client-1", "+15125550100", start());
        ready.state = LeadState::Booking;
        f.storage.insert_lead_if_absent(&ready).await.unwrap();
        f.crm.set_open(false);
        f.router.push(Ok(RouterDecision {
            message: "Let me check another time".into(),
            next_state: Some(LeadState::Booked),
            booking: Some(BookingRequest {
                slot: TimeSlot {
                    start: start(),
                    end: start() + Duration::hours(1),
                },
                service: None,
            }),
        }));

        f.pipeline.handle_event(&reply_event("lead-1", "now?")).await;

        assert_eq!(lead(&f, "lead-1").await.state, LeadState::Booking);
        assert!(f.crm.bookings().is_empty());
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn crm_outage_is_captured_at_book_stage() {
        let f = fixture().await;
        let mut ready = Lead::new("lead-1", "client-1", "+15125550100", start());
        ready.state = LeadState::Booking;
        f.storage.insert_lead_if_absent(&ready).await.unwrap();
        f.crm.set_unavailable(true);
        f.router.push(Ok(RouterDecision {
            message: "booked".into(),
            next_state: Some(LeadState::Booked),
            booking: Some(BookingRequest {
                slot: TimeSlot {
                    start: start(),
                    end: start() + Duration::hours(1),
                },
                service: None,
            }),
        }));

        let outcome = f.pipeline.handle_event(&reply_event("lead-1", "ok")).await;
        let PipelineOutcome::Captured { failed_lead_id } = outcome else {
            panic!("expected capture, got {outcome:?}");
        };
        let entry = f
            .storage
            .get_failed_lead(&failed_lead_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.failure_stage, FailureStage::Book);
        assert!(f.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn reply_re_engages_a_cold_lead() {
        let f = fixture().await;
        seed_cold_lead(&f, "lead-1", 1).await;

        f.pipeline
            .handle_event(&reply_event("lead-1", "still need help"))
            .await;

        let stored = lead(&f, "lead-1").await;
        assert_eq!(stored.state, LeadState::Qualifying);
        assert_eq!(stored.next_followup_at, None);
        assert_eq!(stored.cold_outreach_count, 1);
    }

    #[tokio::test]
    async fn cold_lead_replying_at_night_stays_cold_until_answered() {
        let f = fixture().await;
        seed_cold_lead(&f, "lead-1", 1).await;
        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 4, 0, 0).unwrap());

        let outcome = f
            .pipeline
            .handle_event(&reply_event("lead-1", "still need help"))
            .await;

        assert_eq!(
            outcome,
            PipelineOutcome::Deferred {
                lead_id: "lead-1".into(),
                reason: ComplianceReason::QuietHours
            }
        );
        let waiting = lead(&f, "lead-1").await;
        assert_eq!(waiting.state, LeadState::Cold);
        assert_eq!(waiting.cold_outreach_count, 1);
        assert!(f.sender.sent().is_empty());

        f.clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 13, 0, 0).unwrap());
        f.pipeline.follow_up("lead-1").await.unwrap();

        let answered = lead(&f, "lead-1").await;
        assert_eq!(answered.state, LeadState::Qualifying);
        assert_eq!(answered.cold_outreach_count, 1);
        assert_eq!(f.sender.sent().len(), 1);
        assert_eq!(
            f.router.inputs()[0].1,
            RouterInput::Reply {
                message: "still need help".into()
            }
        );
    }

    #[tokio::test]
    async fn recycling_a_cold_lead_counts_the_attempt() {
        let f = fixture().await;
        seed_cold_lead(&f, "lead-1", 0).await;

        let outcome = f.pipeline.recycle_cold_lead("lead-1").await.unwrap();

        assert!(matches!(
            outcome,
            PipelineOutcome::Processed {
                state: LeadState::Qualifying,
                ..
            }
        ));
        let stored = lead(&f, "lead-1").await;
        assert_eq!(stored.cold_outreach_count, 1);
        assert_eq!(stored.next_followup_at, None);
        assert_eq!(
            f.router.inputs()[0].1,
            RouterInput::ColdRecycle { attempt: 1 }
        );
        let events = f.storage.list_events("lead-1").await.unwrap();
        assert!(events.iter().any(|e| e.event_type == AuditEventType::Recycled));
    }

    #[tokio::test]
    async fn cold_lead_at_the_cap_is_retired() {
        let f = fixture().await;
        seed_cold_lead(&f, "lead-1", 3).await;

        f.pipeline.recycle_cold_lead("lead-1").await.unwrap();

        assert_eq!(lead(&f, "lead-1").await.state, LeadState::Dead);
        assert!(f.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn cold_lead_past_dead_threshold_is_retired() {
        let f = fixture().await;
        seed_cold_lead(&f, "lead-1", 0).await;
        f.clock.advance(Duration::days(30));

        f.pipeline.recycle_cold_lead("lead-1").await.unwrap();

        assert_eq!(lead(&f, "lead-1").await.state, LeadState::Dead);
    }

    #[tokio::test]
    async fn denied_recycle_is_pushed_back() {
        let f = fixture().await;
        seed_cold_lead(&f, "lead-1", 0).await;
        let night = Utc.with_ymd_and_hms(2026, 3, 11, 4, 0, 0).unwrap();
        f.clock.set(night);

        let outcome = f.pipeline.recycle_cold_lead("lead-1").await.unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::Deferred {
                lead_id: "lead-1".into(),
                reason: ComplianceReason::QuietHours
            }
        );
        let stored = lead(&f, "lead-1").await;
        assert_eq!(stored.state, LeadState::Cold);
        // 08:00 CDT, when the send window opens.
        assert_eq!(
            stored.next_followup_at,
            Some(Utc.with_ymd_and_hms(2026, 3, 11, 13, 0, 0).unwrap())
        );
        assert_eq!(stored.cold_outreach_count, 0);
    }

    #[tokio::test]
    async fn recycle_of_a_lead_that_already_moved_on_is_ignored() {
        let f = fixture().await;
        f.pipeline.handle_event(&new_lead_event("lead-1")).await;

        let outcome = f.pipeline.recycle_cold_lead("lead-1").await.unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::Ignored {
                lead_id: "lead-1".into(),
                state: LeadState::IntakeSent
            }
        );
    }

    #[tokio::test]
    async fn recycle_failure_is_captured_under_nurture() {
        let f = fixture().await;
        seed_cold_lead(&f, "lead-1", 0).await;
        f.sender.fail_next(1);
        let cold = lead(&f, "lead-1").await;

        let outcome = f.pipeline.follow_up_or_capture(&cold).await;
        let PipelineOutcome::Captured { failed_lead_id } = outcome else {
            panic!("expected capture, got {outcome:?}");
        };
        let entry = f
            .storage
            .get_failed_lead(&failed_lead_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.failure_stage, FailureStage::Nurture);
        assert_eq!(lead(&f, "lead-1").await.next_followup_at, None);

        f.pipeline
            .replay_followup(&entry.original_payload)
            .await
            .unwrap();
        assert_eq!(lead(&f, "lead-1").await.state, LeadState::Qualifying);
    }
}
