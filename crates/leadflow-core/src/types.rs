// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Leadflow crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a lead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadState {
    New,
    IntakeSent,
    Qualifying,
    Qualified,
    Booking,
    Booked,
    Completed,
    Cold,
    Dead,
    OptedOut,
}

impl LeadState {
    /// Every state, in lifecycle order followed by the side states.
    pub const ALL: [LeadState; 10] = [
        LeadState::New,
        LeadState::IntakeSent,
        LeadState::Qualifying,
        LeadState::Qualified,
        LeadState::Booking,
        LeadState::Booked,
        LeadState::Completed,
        LeadState::Cold,
        LeadState::Dead,
        LeadState::OptedOut,
    ];

    /// Terminal states accept no further transitions (except opt-out) and are
    /// the only states eligible for archiving.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LeadState::Completed | LeadState::Dead | LeadState::OptedOut
        )
    }
}

/// One prospective contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    /// Tenant the lead belongs to.
    pub client_id: String,
    pub phone: String,
    pub name: Option<String>,
    /// Two-letter jurisdiction code; drives timezone and holiday resolution.
    pub state_code: Option<String>,
    pub state: LeadState,
    pub previous_state: Option<LeadState>,
    pub cold_outreach_count: u32,
    pub next_followup_at: Option<DateTime<Utc>>,
    pub last_outbound_at: Option<DateTime<Utc>>,
    pub last_inbound_at: Option<DateTime<Utc>>,
    pub consent_id: Option<i64>,
    pub is_emergency: bool,
    /// Orthogonal to `state`; only set on terminal leads after retention.
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// A brand-new lead in state `new` with all counters zeroed.
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        phone: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            phone: phone.into(),
            name: None,
            state_code: None,
            state: LeadState::New,
            previous_state: None,
            cold_outreach_count: 0,
            next_followup_at: None,
            last_outbound_at: None,
            last_inbound_at: None,
            consent_id: None,
            is_emergency: false,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Latest of the last state change and the last message in either direction.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        [self.last_inbound_at, self.last_outbound_at]
            .into_iter()
            .flatten()
            .fold(self.updated_at, |latest, at| latest.max(at))
    }
}

/// Partial update applied to a lead row alongside (or without) a state change.
///
/// `None` leaves a column untouched. `next_followup_at` is doubly optional so
/// callers can clear it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadPatch {
    pub cold_outreach_count: Option<u32>,
    pub next_followup_at: Option<Option<DateTime<Utc>>>,
    pub last_outbound_at: Option<DateTime<Utc>>,
    pub last_inbound_at: Option<DateTime<Utc>>,
    pub consent_id: Option<i64>,
}

/// Legal basis for contacting a phone number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    Implied,
    Express,
}

/// Consent governing outbound eligibility for one (phone, client) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: i64,
    pub phone: String,
    pub client_id: String,
    pub consent_type: ConsentType,
    /// Permanent once set.
    pub opted_out: bool,
    pub opted_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ConsentRecord {
    /// Whether this record currently permits contact.
    pub fn is_active(&self) -> bool {
        !self.opted_out
    }
}

/// Pipeline stage a failure was captured in; selects the replay strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Webhook,
    Intake,
    Qualify,
    Book,
    /// Scheduled follow-up outreach: cold recycle or a deferred send.
    Nurture,
}

/// Status of a dead-letter entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DlqStatus {
    Pending,
    Retrying,
    Resolved,
    Dead,
}

impl DlqStatus {
    /// Active entries are still scheduled for replay.
    pub fn is_active(self) -> bool {
        matches!(self, DlqStatus::Pending | DlqStatus::Retrying)
    }
}

/// Coarse classification of the error stored on a dead-letter entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
}

/// A durable record of one failed pipeline attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedLead {
    /// UUID v4 generated at capture time.
    pub id: String,
    /// Enough to replay the step; for inbound stages this is the [`InboundEvent`].
    pub original_payload: serde_json::Value,
    pub source: String,
    pub failure_stage: FailureStage,
    pub error_message: String,
    pub error_kind: ErrorKind,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Non-null iff `status` is pending or retrying.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub status: DlqStatus,
    pub correlation_id: String,
    pub lead_id: Option<String>,
    pub client_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

/// Kind of audit trail entry written for a lead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Transition,
    StuckRemediated,
    ComplianceDenied,
    OutboundSent,
    InboundReceived,
    Archived,
    Recycled,
    OptedOut,
}

/// One row of a lead's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub lead_id: String,
    pub event_type: AuditEventType,
    pub from_state: Option<LeadState>,
    pub to_state: Option<LeadState>,
    pub reason: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        lead_id: impl Into<String>,
        event_type: AuditEventType,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lead_id: lead_id.into(),
            event_type,
            from_state: None,
            to_state: None,
            reason: reason.into(),
            detail: serde_json::Value::Null,
            created_at,
        }
    }

    pub fn with_states(mut self, from: LeadState, to: LeadState) -> Self {
        self.from_state = Some(from);
        self.to_state = Some(to);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Normalized, signature-verified event from the ingestion layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub source: String,
    pub client_id: String,
    pub lead_payload: serde_json::Value,
    #[serde(default)]
    pub is_reply: bool,
}

/// The `lead_payload` of a new-lead event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLeadPayload {
    /// Assigned by the ingestion layer; derived from client and phone when absent.
    #[serde(default)]
    pub lead_id: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_emergency: bool,
    #[serde(default)]
    pub consent: Option<ConsentType>,
}

/// The `lead_payload` of a reply event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub lead_id: String,
    pub message: String,
}

/// Entry in the durable inbound event queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}

/// Operator alert categories. Each has its own cooldown namespace.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    RetriesExhausted,
    StuckBooking,
    ComplianceDeniedRepeat,
    CaptureFailed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// An alert raised to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub correlation_id: String,
    pub severity: Severity,
}

/// Why the compliance gate allowed or denied an action.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComplianceReason {
    Allowed,
    EmergencyOverride,
    OptedOut,
    NoConsent,
    QuietHours,
    Holiday,
    ColdOutreachCap,
}

/// Outcome of a compliance evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceDecision {
    pub allowed: bool,
    pub reason: ComplianceReason,
}

impl ComplianceDecision {
    pub fn allow(reason: ComplianceReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    pub fn deny(reason: ComplianceReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Result of handing a message to a provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub delivered: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

/// What the agent router is asked to respond to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterInput {
    /// First contact for a freshly ingested lead.
    NewLead { message: Option<String> },
    /// The lead replied.
    Reply { message: String },
    /// Re-engagement of a cold lead.
    ColdRecycle { attempt: u32 },
}

/// Router output: what to send and where the lead should go next.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterDecision {
    pub message: String,
    pub next_state: Option<LeadState>,
    /// Set when the router proposes confirming an appointment.
    pub booking: Option<BookingRequest>,
}

/// Appointment window offered by the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub slot: TimeSlot,
    pub service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technician {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmCustomer {
    pub id: String,
    pub name: Option<String>,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub technician_id: Option<String>,
    pub slot: TimeSlot,
}

/// Health status reported by storage and coordination backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}
