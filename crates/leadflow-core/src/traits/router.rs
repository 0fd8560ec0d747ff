// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent router trait: the external collaborator that decides what to say.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Lead, RouterDecision, RouterInput};

/// Failure modes of the agent router.
///
/// Returned as a value so the caller picks the fallback explicitly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    /// The router could not produce content (model outage, timeout). The
    /// pipeline falls back to a per-state template.
    #[error("router unavailable: {0}")]
    Unavailable(String),

    /// The router refused the input. Not retried with a template.
    #[error("router rejected input: {0}")]
    Rejected(String),
}

/// Produces the next outbound message and proposed state for a lead.
#[async_trait]
pub trait AgentRouter: Send + Sync + 'static {
    async fn route(&self, lead: &Lead, input: &RouterInput) -> Result<RouterDecision, RouterError>;
}
