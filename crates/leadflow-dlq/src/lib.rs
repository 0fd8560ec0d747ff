// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter queue and retry engine.
//!
//! Any pipeline failure is captured as a [`FailedLead`](leadflow_core::FailedLead)
//! tagged with the stage it failed in. The [`RetryEngine`] later claims due
//! entries, replays them through a [`Replayer`], and either resolves them,
//! reschedules them on the backoff curve, or marks them dead and alerts.

pub mod backoff;
pub mod queue;
pub mod retry;

pub use backoff::{BackoffPolicy, RetryDecision};
pub use queue::DeadLetterQueue;
pub use retry::{Replayer, RetryEngine, RetryOutcome, RetryReport};
