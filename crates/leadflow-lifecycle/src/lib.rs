// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead lifecycle for Leadflow.
//!
//! [`state_machine`] owns the legal edges and the guarded write;
//! [`pipeline`] drives leads along them for new-lead ingestion, inbound
//! replies and cold-lead recycling, with every outbound message behind the
//! compliance gate and every failure captured to the dead-letter queue.

pub mod pipeline;
pub mod state_machine;
pub mod templates;

pub use pipeline::{LeadPipeline, PipelineDeps, PipelineOutcome, PipelineSettings, lead_id_for};
pub use state_machine::{StateMachine, Transition, TransitionOutcome, can_transition, is_opt_out};
