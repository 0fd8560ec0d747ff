// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker notification lists.
//!
//! Notifications are appended to a bounded list per worker
//! (`events:<worker>`) and drained at the top of that worker's next loop, so
//! a worker that was down when a notification was sent still sees it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use leadflow_core::{CoordinationStore, LeadflowError};

/// A nudge for a worker to act before its next scheduled pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerNotification {
    /// Run a pass now.
    RunNow,
    /// A dead-letter entry was requeued and should be retried promptly.
    RetryNow { failed_lead_id: String },
}

/// Sends and drains notifications through the coordination store.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn CoordinationStore>,
    max_len: usize,
}

impl Notifier {
    pub fn new(store: Arc<dyn CoordinationStore>, max_len: usize) -> Self {
        Self { store, max_len }
    }

    pub fn list_key(worker_name: &str) -> String {
        format!("events:{worker_name}")
    }

    pub async fn notify(
        &self,
        worker_name: &str,
        notification: &WorkerNotification,
    ) -> Result<(), LeadflowError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| LeadflowError::Internal(format!("encode notification: {e}")))?;
        self.store
            .push_bounded(&Self::list_key(worker_name), &payload, self.max_len)
            .await
    }

    /// Take every pending notification for `worker_name`, oldest first.
    /// Entries that fail to decode are logged and dropped.
    pub async fn drain(&self, worker_name: &str) -> Result<Vec<WorkerNotification>, LeadflowError> {
        let raw = self.store.drain(&Self::list_key(worker_name)).await?;
        Ok(raw
            .into_iter()
            .filter_map(|entry| match serde_json::from_str(&entry) {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(worker = worker_name, error = %e, "dropping malformed notification");
                    None
                }
            })
            .collect())
    }
}
