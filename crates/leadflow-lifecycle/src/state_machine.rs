// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead lifecycle edges and the guarded state write.
//!
//! ```text
//! new -> intake_sent -> qualifying -> qualified -> booking -> booked -> completed
//!                            ^  \           \
//!                            |   `-> cold <--'
//!                            `------'  |
//!                                      `-> dead
//! ```
//!
//! Any non-terminal state may also fall to `cold` or `dead`, and any state
//! may move to `opted_out`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use leadflow_core::types::{AuditEvent, AuditEventType, Lead, LeadPatch, LeadState};
use leadflow_core::{Clock, LeadflowError, StorageAdapter};

/// Whole-message keywords that opt a lead out.
pub const OPT_OUT_KEYWORDS: [&str; 6] = ["STOP", "STOPALL", "UNSUBSCRIBE", "CANCEL", "END", "QUIT"];

/// Whether `from -> to` is an edge of the lifecycle.
pub fn can_transition(from: LeadState, to: LeadState) -> bool {
    use LeadState::*;

    if from == to {
        return false;
    }
    if to == OptedOut {
        return true;
    }
    if from.is_terminal() {
        return false;
    }
    if to == Dead {
        return true;
    }
    if to == Cold {
        return from != New;
    }
    matches!(
        (from, to),
        (New, IntakeSent)
            | (IntakeSent, Qualifying)
            | (Qualifying, Qualified)
            | (Qualified, Booking)
            | (Booking, Booked)
            | (Booked, Completed)
            | (Cold, Qualifying)
    )
}

pub fn ensure_transition(from: LeadState, to: LeadState) -> Result<(), LeadflowError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(LeadflowError::InvalidTransition { from, to })
    }
}

/// Whether an inbound message is an opt-out request.
pub fn is_opt_out(message: &str) -> bool {
    let word = message
        .trim()
        .trim_end_matches(['.', '!'])
        .to_ascii_uppercase();
    OPT_OUT_KEYWORDS.contains(&word.as_str())
}

/// One requested state change.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub to: LeadState,
    pub event_type: AuditEventType,
    pub reason: String,
    pub detail: Value,
    pub patch: LeadPatch,
}

impl Transition {
    pub fn to(to: LeadState, reason: impl Into<String>) -> Self {
        Self {
            to,
            event_type: AuditEventType::Transition,
            reason: reason.into(),
            detail: Value::Null,
            patch: LeadPatch::default(),
        }
    }

    pub fn with_patch(mut self, patch: LeadPatch) -> Self {
        self.patch = patch;
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn recorded_as(mut self, event_type: AuditEventType) -> Self {
        self.event_type = event_type;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// The lead was no longer in the expected state; nothing was written.
    Stale,
}

/// Applies guarded transitions through the storage adapter.
#[derive(Clone)]
pub struct StateMachine {
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
}

impl StateMachine {
    pub fn new(storage: Arc<dyn StorageAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Move `lead` from its current (observed) state to `transition.to`.
    ///
    /// The write only happens if the stored row is still in the observed
    /// state. On success `lead` is updated in place.
    pub async fn apply(
        &self,
        lead: &mut Lead,
        transition: Transition,
    ) -> Result<TransitionOutcome, LeadflowError> {
        let from = lead.state;
        ensure_transition(from, transition.to)?;

        let now = self.clock.now();
        let event = AuditEvent::new(&lead.id, transition.event_type, &transition.reason, now)
            .with_states(from, transition.to)
            .with_detail(transition.detail);

        let applied = self
            .storage
            .transition_lead(&lead.id, from, transition.to, &transition.patch, &event, now)
            .await?;

        if !applied {
            debug!(lead_id = %lead.id, from = %from, to = %transition.to, "stale transition skipped");
            return Ok(TransitionOutcome::Stale);
        }

        info!(
            lead_id = %lead.id,
            from = %from,
            to = %transition.to,
            reason = %transition.reason,
            "lead transitioned"
        );
        apply_patch(lead, &transition.patch);
        lead.previous_state = Some(from);
        lead.state = transition.to;
        lead.updated_at = now;
        Ok(TransitionOutcome::Applied)
    }
}

fn apply_patch(lead: &mut Lead, patch: &LeadPatch) {
    if let Some(count) = patch.cold_outreach_count {
        lead.cold_outreach_count = count;
    }
    if let Some(next) = patch.next_followup_at {
        lead.next_followup_at = next;
    }
    if let Some(at) = patch.last_outbound_at {
        lead.last_outbound_at = Some(at);
    }
    if let Some(at) = patch.last_inbound_at {
        lead.last_inbound_at = Some(at);
    }
    if let Some(id) = patch.consent_id {
        lead.consent_id = Some(id);
    }
}
