// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the relational source of truth.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LeadflowError;
use crate::types::{
    AuditEvent, ConsentRecord, ConsentType, DlqStatus, FailedLead, HealthStatus, Lead, LeadPatch,
    LeadState, QueueEntry,
};

/// Adapter for the relational store holding leads, consent, the dead-letter
/// queue, the audit trail, and the inbound event queue.
///
/// Every lead state write is a compare-and-set on the expected source state:
/// [`transition_lead`](StorageAdapter::transition_lead) returns `false` rather
/// than an error when the lead has already moved on.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    /// Opens the backend and runs migrations.
    async fn initialize(&self) -> Result<(), LeadflowError>;

    /// Flushes pending writes and releases the connection.
    async fn close(&self) -> Result<(), LeadflowError>;

    async fn health_check(&self) -> Result<HealthStatus, LeadflowError>;

    // --- Leads ---

    /// Inserts the lead unless one with the same id exists. Returns `true` if inserted.
    async fn insert_lead_if_absent(&self, lead: &Lead) -> Result<bool, LeadflowError>;

    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, LeadflowError>;

    /// Moves `id` from `from` to `to`, applies `patch`, and appends `event`, in
    /// one transaction. Returns `false` (and writes nothing) if the lead is not
    /// currently in `from`.
    async fn transition_lead(
        &self,
        id: &str,
        from: LeadState,
        to: LeadState,
        patch: &LeadPatch,
        event: &AuditEvent,
        now: DateTime<Utc>,
    ) -> Result<bool, LeadflowError>;

    /// Applies `patch` without touching `state` or `updated_at`.
    async fn patch_lead(&self, id: &str, patch: &LeadPatch) -> Result<(), LeadflowError>;

    /// Non-archived leads in `state` whose [`Lead::last_activity_at`] is before
    /// `cutoff`, least recently active first.
    ///
    /// [`Lead::last_activity_at`]: crate::types::Lead::last_activity_at
    async fn find_stalled_leads(
        &self,
        state: LeadState,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Lead>, LeadflowError>;

    /// Non-archived, non-terminal leads whose `next_followup_at` is due.
    async fn find_due_followups(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Lead>, LeadflowError>;

    /// Archives terminal leads last updated before `cutoff`, recording an
    /// audit event for each. Returns the archived lead ids.
    async fn archive_terminal_leads(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, LeadflowError>;

    // --- Consent ---

    /// Records consent for (phone, client). Never clears an existing opt-out.
    async fn record_consent(
        &self,
        phone: &str,
        client_id: &str,
        consent_type: ConsentType,
        now: DateTime<Utc>,
    ) -> Result<ConsentRecord, LeadflowError>;

    async fn get_consent(
        &self,
        phone: &str,
        client_id: &str,
    ) -> Result<Option<ConsentRecord>, LeadflowError>;

    /// Marks (phone, client) opted out, creating the record if needed.
    async fn record_opt_out(
        &self,
        phone: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsentRecord, LeadflowError>;

    // --- Audit trail ---

    async fn record_event(&self, event: &AuditEvent) -> Result<(), LeadflowError>;

    async fn list_events(&self, lead_id: &str) -> Result<Vec<AuditEvent>, LeadflowError>;

    // --- Dead-letter queue ---

    async fn insert_failed_lead(&self, entry: &FailedLead) -> Result<(), LeadflowError>;

    async fn get_failed_lead(&self, id: &str) -> Result<Option<FailedLead>, LeadflowError>;

    /// Atomically claims up to `limit` active entries due at `now`, ordered by
    /// `next_retry_at`, setting them to `retrying` with `next_retry_at = lease_until`.
    async fn claim_due_failed_leads(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FailedLead>, LeadflowError>;

    /// Writes back retry bookkeeping. Only active entries are updated; returns
    /// `false` if the stored entry is already resolved or dead.
    async fn update_failed_lead(&self, entry: &FailedLead) -> Result<bool, LeadflowError>;

    /// Marks an active entry resolved. Returns `false` if it was not active.
    async fn resolve_failed_lead(
        &self,
        id: &str,
        resolved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, LeadflowError>;

    /// Puts a dead entry back in the queue with its attempts reset.
    async fn requeue_failed_lead(&self, id: &str, now: DateTime<Utc>) -> Result<bool, LeadflowError>;

    async fn list_failed_leads(
        &self,
        status: Option<DlqStatus>,
        limit: usize,
    ) -> Result<Vec<FailedLead>, LeadflowError>;

    async fn count_failed_leads(&self) -> Result<Vec<(DlqStatus, i64)>, LeadflowError>;

    // --- Inbound event queue ---

    /// Enqueues a raw inbound event. Returns the queue entry id.
    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, LeadflowError>;

    /// Claims the next pending (or abandoned in-flight) entry.
    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, LeadflowError>;

    async fn ack(&self, id: i64) -> Result<(), LeadflowError>;

    /// Returns the entry to pending, or marks it failed once out of attempts.
    async fn fail(&self, id: i64) -> Result<(), LeadflowError>;

    /// Marks the entry failed for good.
    async fn reject(&self, id: i64) -> Result<(), LeadflowError>;
}
