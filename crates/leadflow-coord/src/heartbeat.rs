// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker liveness markers.
//!
//! Each loop iteration writes `worker_health:<name>` with a TTL of a small
//! multiple of the worker's poll interval. A missing key means the worker
//! has not completed an iteration recently.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use leadflow_core::{CoordinationStore, LeadflowError};

/// Reads and writes worker heartbeats.
#[derive(Clone)]
pub struct HeartbeatRegistry {
    store: Arc<dyn CoordinationStore>,
    factor: f64,
}

impl HeartbeatRegistry {
    /// `factor` scales each worker's interval into its heartbeat TTL.
    pub fn new(store: Arc<dyn CoordinationStore>, factor: f64) -> Self {
        Self { store, factor }
    }

    pub fn key(worker_name: &str) -> String {
        format!("worker_health:{worker_name}")
    }

    /// TTL used for a worker polling every `interval`.
    pub fn ttl_for(&self, interval: Duration) -> Duration {
        interval.mul_f64(self.factor)
    }

    /// Record that `worker_name` finished an iteration at `now`.
    pub async fn beat(
        &self,
        worker_name: &str,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), LeadflowError> {
        self.store
            .set(
                &Self::key(worker_name),
                &now.to_rfc3339(),
                self.ttl_for(interval),
            )
            .await
    }

    /// Last heartbeat time, or `None` if the marker expired or never existed.
    pub async fn last_beat(&self, worker_name: &str) -> Result<Option<DateTime<Utc>>, LeadflowError> {
        let raw = self.store.get(&Self::key(worker_name)).await?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCoordinationStore;
    use chrono::TimeZone;

    #[tokio::test(start_paused = true)]
    async fn heartbeat_expires_after_factor_times_interval() {
        let registry = HeartbeatRegistry::new(Arc::new(MemoryCoordinationStore::new()), 2.0);
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap();
        let interval = Duration::from_secs(60);

        registry.beat("sweeper", interval, at).await.unwrap();
        assert_eq!(registry.last_beat("sweeper").await.unwrap(), Some(at));

        tokio::time::advance(Duration::from_secs(119)).await;
        assert!(registry.last_beat("sweeper").await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(registry.last_beat("sweeper").await.unwrap().is_none());
    }

    #[test]
    fn ttl_scales_with_factor() {
        let registry = HeartbeatRegistry::new(Arc::new(MemoryCoordinationStore::new()), 1.5);
        assert_eq!(
            registry.ttl_for(Duration::from_secs(300)),
            Duration::from_secs(450)
        );
    }
}
