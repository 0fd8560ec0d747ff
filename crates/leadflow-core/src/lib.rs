// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Leadflow lead reliability layer.
//!
//! This crate provides the error type, the domain model (leads, consent,
//! dead-letter entries, audit events, alerts), and the collaborator traits
//! every other crate in the workspace is written against.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::LeadflowError;
pub use types::{
    AlertEvent, AlertType, AuditEvent, AuditEventType, ComplianceDecision, ComplianceReason,
    ConsentRecord, ConsentType, DlqStatus, FailedLead, FailureStage, HealthStatus, InboundEvent,
    Lead, LeadPatch, LeadState, Severity,
};

pub use traits::{
    AgentRouter, AlertSink, Clock, CoordinationStore, CrmProvider, MessageSender, RouterError,
    StorageAdapter, SystemClock,
};

/// Canonical timestamp format used in storage and logs (lexicographically sortable).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn lead_state_round_trips_through_strings() {
        for state in LeadState::ALL {
            let s = state.to_string();
            let parsed = LeadState::from_str(&s).expect("should parse back");
            assert_eq!(state, parsed);
        }
        assert_eq!(LeadState::IntakeSent.to_string(), "intake_sent");
        assert_eq!(LeadState::OptedOut.to_string(), "opted_out");
    }

    #[test]
    fn lead_state_serde_matches_display() {
        let json = serde_json::to_string(&LeadState::IntakeSent).unwrap();
        assert_eq!(json, "\"intake_sent\"");
    }

    #[test]
    fn only_completed_dead_and_opted_out_are_terminal() {
        let terminal: Vec<_> = LeadState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![LeadState::Completed, LeadState::Dead, LeadState::OptedOut]
        );
    }

    #[test]
    fn dlq_status_activity() {
        assert!(DlqStatus::Pending.is_active());
        assert!(DlqStatus::Retrying.is_active());
        assert!(!DlqStatus::Resolved.is_active());
        assert!(!DlqStatus::Dead.is_active());
    }

    #[test]
    fn alert_event_serializes_type_field() {
        let alert = AlertEvent {
            alert_type: AlertType::StuckBooking,
            message: "lead stuck".into(),
            correlation_id: "lead-1".into(),
            severity: Severity::Warning,
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "stuck_booking");
        assert_eq!(json["severity"], "warning");
    }

    #[test]
    fn inbound_event_defaults_is_reply_to_false() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"source":"web","client_id":"c1","lead_payload":{"phone":"+15550100"}}"#,
        )
        .unwrap();
        assert!(!event.is_reply);
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_storage<T: StorageAdapter>() {}
        fn _assert_coordination<T: CoordinationStore>() {}
        fn _assert_router<T: AgentRouter>() {}
        fn _assert_sender<T: MessageSender>() {}
        fn _assert_crm<T: CrmProvider>() {}
        fn _assert_alert_sink<T: AlertSink>() {}
        fn _assert_clock<T: Clock>() {}
        _assert_clock::<SystemClock>();
    }
}
