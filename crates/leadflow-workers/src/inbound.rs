// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drains the durable inbound queue into the lead pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use leadflow_config::model::WorkersConfig;
use leadflow_core::types::{FailureStage, InboundEvent, QueueEntry};
use leadflow_core::{LeadflowError, StorageAdapter};
use leadflow_lifecycle::{LeadPipeline, PipelineOutcome};

use crate::scheduler::Worker;

pub const INBOUND_WORKER: &str = "inbound";

/// Queue name inbound events are enqueued under.
pub const INBOUND_QUEUE: &str = "inbound";

/// Serialize and enqueue an inbound event. Returns the queue entry id.
pub async fn enqueue_event(
    storage: &dyn StorageAdapter,
    event: &InboundEvent,
) -> Result<i64, LeadflowError> {
    let payload = serde_json::to_string(event)
        .map_err(|e| LeadflowError::Validation(format!("unencodable inbound event: {e}")))?;
    storage.enqueue(INBOUND_QUEUE, &payload).await
}

pub struct InboundWorker {
    storage: Arc<dyn StorageAdapter>,
    pipeline: Arc<LeadPipeline>,
    batch_size: usize,
    interval: Duration,
}

impl InboundWorker {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        pipeline: Arc<LeadPipeline>,
        config: &WorkersConfig,
    ) -> Self {
        Self {
            storage,
            pipeline,
            batch_size: config.inbound_batch_size,
            interval: Duration::from_millis(config.inbound_interval_ms),
        }
    }

    /// Process up to one batch of queued events. Returns how many were taken.
    pub async fn drain_batch(&self) -> Result<usize, LeadflowError> {
        let mut taken = 0;
        while taken < self.batch_size {
            let Some(entry) = self.storage.dequeue(INBOUND_QUEUE).await? else {
                break;
            };
            taken += 1;
            let id = entry.id;
            if let Err(e) = self.process(entry).await {
                warn!(queue_id = id, error = %e, "inbound entry not settled, returning it to the queue");
                self.storage.fail(id).await?;
            }
        }
        if taken > 0 {
            info!(count = taken, "inbound events processed");
        }
        Ok(taken)
    }

    async fn process(&self, entry: QueueEntry) -> Result<(), LeadflowError> {
        let event: InboundEvent = match serde_json::from_str(&entry.payload) {
            Ok(event) => event,
            Err(e) => {
                let err = LeadflowError::Validation(format!("undecodable inbound event: {e}"));
                error!(queue_id = entry.id, error = %err, "dropping inbound entry to dead letters");
                self.pipeline
                    .dead_letters()
                    .capture_failure(
                        json!({ "raw": entry.payload }),
                        INBOUND_QUEUE,
                        FailureStage::Webhook,
                        &err,
                    )
                    .await;
                return self.storage.reject(entry.id).await;
            }
        };

        let outcome = self.pipeline.handle_event(&event).await;
        debug!(queue_id = entry.id, ?outcome, "inbound event handled");
        if let PipelineOutcome::Captured { failed_lead_id } = &outcome {
            debug!(queue_id = entry.id, failed_lead_id, "inbound failure handed to dead letters");
        }
        // The dead-letter queue owns captured failures from here on.
        self.storage.ack(entry.id).await
    }
}

#[async_trait]
impl Worker for InboundWorker {
    fn name(&self) -> &'static str {
        INBOUND_WORKER
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_pass(&self) -> Result<(), LeadflowError> {
        self.drain_batch().await.map(|_| ())
    }
}
