// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Leadflow reliability layer.

use std::time::Duration;

use thiserror::Error;

use crate::types::LeadState;

/// The primary error type used across all Leadflow crates.
///
/// Compliance denials are deliberately absent: a denied send is an ordinary
/// outcome ([`ComplianceDecision`](crate::types::ComplianceDecision)), not a failure.
#[derive(Debug, Error)]
pub enum LeadflowError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Relational store errors (connection, query failure, row decoding).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The coordination store could not be reached or returned garbage.
    #[error("coordination store error: {message}")]
    Coordination { message: String },

    /// The per-lead lock could not be acquired within its wait budget.
    #[error("timed out after {waited:?} waiting for lock on lead {lead_id}")]
    LockTimeout { lead_id: String, waited: Duration },

    /// Malformed input. Replaying it cannot succeed without new input.
    #[error("validation error: {0}")]
    Validation(String),

    /// A downstream dependency (SMS, CRM, router) failed in a way worth retrying.
    #[error("provider error: {message}")]
    TransientProvider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A dead-letter entry used up all of its attempts.
    #[error("retries exhausted for failed lead {failed_lead_id} after {attempts} attempts")]
    RetriesExhausted { failed_lead_id: String, attempts: u32 },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A state change that is not an edge of the lead lifecycle.
    #[error("invalid lead transition {from} -> {to}")]
    InvalidTransition { from: LeadState, to: LeadState },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LeadflowError {
    /// Shorthand for a provider failure without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::TransientProvider {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Errors that are expected to clear on their own and should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. }
                | Self::TransientProvider { .. }
                | Self::Storage { .. }
                | Self::Coordination { .. }
        )
    }

    /// Errors that no amount of replaying will fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidTransition { .. } | Self::NotFound { .. }
        )
    }

    /// Returns `true` for the lock wait-budget timeout.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_is_transient_not_permanent() {
        let err = LeadflowError::LockTimeout {
            lead_id: "lead-1".into(),
            waited: Duration::from_secs(5),
        };
        assert!(err.is_transient());
        assert!(!err.is_permanent());
        assert!(err.is_lock_timeout());
        assert!(err.to_string().contains("lead-1"));
    }

    #[test]
    fn validation_is_permanent() {
        let err = LeadflowError::Validation("phone is required".into());
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[test]
    fn invalid_transition_renders_snake_case_states() {
        let err = LeadflowError::InvalidTransition {
            from: LeadState::Completed,
            to: LeadState::Qualifying,
        };
        assert_eq!(
            err.to_string(),
            "invalid lead transition completed -> qualifying"
        );
    }

    #[test]
    fn retries_exhausted_is_neither_transient_nor_permanent() {
        let err = LeadflowError::RetriesExhausted {
            failed_lead_id: "f-1".into(),
            attempts: 5,
        };
        assert!(!err.is_transient());
        assert!(!err.is_permanent());
    }
}
