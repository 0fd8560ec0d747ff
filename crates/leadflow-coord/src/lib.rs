// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-worker coordination for Leadflow.
//!
//! Everything here is advisory: per-lead locks, alert cooldowns, worker
//! heartbeats, denial counters and notification lists all live in a
//! [`CoordinationStore`](leadflow_core::CoordinationStore) whose loss weakens
//! mutual exclusion but never corrupts the relational source of truth.

pub mod alert;
pub mod heartbeat;
pub mod lock;
pub mod memory;
pub mod notify;
pub mod sqlite;

use std::sync::Arc;

use leadflow_config::model::{CoordinationBackend, CoordinationConfig};
use leadflow_core::{CoordinationStore, LeadflowError};

pub use alert::{AlertDispatcher, LogAlertSink};
pub use heartbeat::HeartbeatRegistry;
pub use lock::{LockAcquisitionResult, LockManager, LockOptions, LockToken};
pub use memory::MemoryCoordinationStore;
pub use notify::{Notifier, WorkerNotification};
pub use sqlite::SqliteCoordinationStore;

/// Key writes between sweeps of expired keys in the bundled stores.
pub const PURGE_EVERY: u64 = 128;

/// Build the coordination store selected by configuration.
pub async fn open_store(
    config: &CoordinationConfig,
) -> Result<Arc<dyn CoordinationStore>, LeadflowError> {
    match config.backend {
        CoordinationBackend::Memory => Ok(Arc::new(MemoryCoordinationStore::new())),
        CoordinationBackend::Sqlite => {
            Ok(Arc::new(SqliteCoordinationStore::open(&config.path).await?))
        }
    }
}
