// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduler adapter for the dead-letter retry engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use leadflow_config::model::RetryConfig;
use leadflow_coord::WorkerNotification;
use leadflow_core::LeadflowError;
use leadflow_dlq::RetryEngine;

use crate::scheduler::Worker;

pub const RETRY_WORKER: &str = "retry";

pub struct RetryWorker {
    engine: Arc<RetryEngine>,
    interval: Duration,
}

impl RetryWorker {
    pub fn new(engine: Arc<RetryEngine>, config: &RetryConfig) -> Self {
        Self {
            engine,
            interval: Duration::from_secs(config.interval_secs),
        }
    }
}

#[async_trait]
impl Worker for RetryWorker {
    fn name(&self) -> &'static str {
        RETRY_WORKER
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_pass(&self) -> Result<(), LeadflowError> {
        self.engine.run_once().await.map(|_| ())
    }

    async fn handle_notification(
        &self,
        notification: &WorkerNotification,
    ) -> Result<(), LeadflowError> {
        if let WorkerNotification::RetryNow { failed_lead_id } = notification {
            let outcome = self.engine.retry_now(failed_lead_id).await?;
            info!(failed_lead_id, ?outcome, "requested retry ran");
        }
        Ok(())
    }
}
