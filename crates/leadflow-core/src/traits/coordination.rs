// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coordination store trait: the advisory, shared key-value space used for
//! locks, heartbeats, alert cooldowns, counters and worker notifications.
//!
//! Nothing durable lives here. Losing the store may weaken mutual exclusion
//! for a moment but must never corrupt business state.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LeadflowError;

/// Atomic primitives shared by every worker process.
///
/// Implementations return [`LeadflowError::Coordination`] when the store is
/// unreachable so callers can decide whether to fail open.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Writes `value` under `key` with a TTL only if no live value exists.
    /// Returns `true` if the write happened.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeadflowError>;

    /// Deletes `key` only if its live value equals `expected`, as a single
    /// atomic operation. Returns `true` if something was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LeadflowError>;

    /// Reads a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, LeadflowError>;

    /// Unconditionally writes `value` with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LeadflowError>;

    /// Atomically increments an integer counter, creating it at zero with
    /// `ttl` if absent. Returns the new value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, LeadflowError>;

    /// Appends to a list, trimming the oldest entries beyond `max_len`.
    async fn push_bounded(
        &self,
        list: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), LeadflowError>;

    /// Removes and returns every entry of a list, oldest first.
    async fn drain(&self, list: &str) -> Result<Vec<String>, LeadflowError>;
}
