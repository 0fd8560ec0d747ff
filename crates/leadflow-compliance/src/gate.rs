// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The outbound compliance gate.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::debug;

use leadflow_config::model::ComplianceConfig;
use leadflow_core::types::{ComplianceDecision, ComplianceReason, ConsentRecord, Lead};
use leadflow_core::LeadflowError;

use crate::holidays::HolidayCalendar;
use crate::timezone::timezone_for_state;

/// What kind of outbound message is being considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutreachKind {
    /// The consent-establishing first message to a new lead.
    FirstContact,
    /// A response inside an ongoing conversation.
    Reply,
    /// Re-engagement of a cold lead; counts against the outreach cap.
    ColdOutreach,
}

/// Inputs to one compliance evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ComplianceContext<'a> {
    pub consent: Option<&'a ConsentRecord>,
    pub state_code: Option<&'a str>,
    pub is_emergency: bool,
    pub kind: OutreachKind,
    pub cold_outreach_count: u32,
}

impl<'a> ComplianceContext<'a> {
    pub fn for_lead(
        lead: &'a Lead,
        consent: Option<&'a ConsentRecord>,
        kind: OutreachKind,
    ) -> Self {
        Self {
            consent,
            state_code: lead.state_code.as_deref(),
            is_emergency: lead.is_emergency,
            kind,
            cold_outreach_count: lead.cold_outreach_count,
        }
    }
}

/// Decides whether a lead may be contacted right now.
#[derive(Debug, Clone)]
pub struct ComplianceGate {
    start_hour: u32,
    end_hour: u32,
    default_tz: Tz,
    calendar: HolidayCalendar,
    max_cold_outreach: u32,
}

impl ComplianceGate {
    pub fn new(config: &ComplianceConfig, max_cold_outreach: u32) -> Result<Self, LeadflowError> {
        let default_tz = config.default_timezone.parse::<Tz>().map_err(|e| {
            LeadflowError::Config(format!(
                "invalid default timezone `{}`: {e}",
                config.default_timezone
            ))
        })?;
        Ok(Self {
            start_hour: config.send_window_start_hour,
            end_hour: config.send_window_end_hour,
            default_tz,
            calendar: HolidayCalendar::new(&config.strict_holiday_states),
            max_cold_outreach,
        })
    }

    pub fn calendar(&self) -> &HolidayCalendar {
        &self.calendar
    }

    pub fn max_cold_outreach(&self) -> u32 {
        self.max_cold_outreach
    }

    /// `now` in the lead's local timezone.
    pub fn local_time(&self, state_code: Option<&str>, now: DateTime<Utc>) -> DateTime<Tz> {
        now.with_timezone(&timezone_for_state(state_code, self.default_tz))
    }

    /// Evaluate the rules in order; the first one that denies wins.
    pub fn evaluate(&self, ctx: &ComplianceContext<'_>, now: DateTime<Utc>) -> ComplianceDecision {
        let decision = self.decide(ctx, now);
        debug!(
            allowed = decision.allowed,
            reason = %decision.reason,
            state_code = ctx.state_code.unwrap_or("-"),
            emergency = ctx.is_emergency,
            "compliance evaluated"
        );
        decision
    }

    fn decide(&self, ctx: &ComplianceContext<'_>, now: DateTime<Utc>) -> ComplianceDecision {
        if ctx.consent.is_some_and(|c| c.opted_out) {
            return ComplianceDecision::deny(ComplianceReason::OptedOut);
        }

        let has_consent = ctx.consent.is_some_and(ConsentRecord::is_active);
        if !has_consent && ctx.kind != OutreachKind::FirstContact {
            return ComplianceDecision::deny(ComplianceReason::NoConsent);
        }

        if ctx.kind == OutreachKind::ColdOutreach
            && ctx.cold_outreach_count >= self.max_cold_outreach
        {
            return ComplianceDecision::deny(ComplianceReason::ColdOutreachCap);
        }

        if ctx.is_emergency {
            return ComplianceDecision::allow(ComplianceReason::EmergencyOverride);
        }

        let local = self.local_time(ctx.state_code, now);
        let hour = local.hour();
        if hour < self.start_hour || hour >= self.end_hour {
            return ComplianceDecision::deny(ComplianceReason::QuietHours);
        }

        if self
            .calendar
            .holiday_on(local.date_naive(), ctx.state_code)
            .is_some()
        {
            return ComplianceDecision::deny(ComplianceReason::Holiday);
        }

        ComplianceDecision::allow(ComplianceReason::Allowed)
    }

    /// The first of `after + step`, `after + 2 * step`, ... at which `ctx`
    /// would be allowed, checking at most `max_steps` candidates.
    pub fn next_allowed_at(
        &self,
        ctx: &ComplianceContext<'_>,
        after: DateTime<Utc>,
        step: chrono::Duration,
        max_steps: u32,
    ) -> Option<DateTime<Utc>> {
        (1..=max_steps)
            .map(|n| after + step * n as i32)
            .find(|&at| self.decide(ctx, at).allowed)
    }
}
