// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle housekeeping: archive old terminal leads and run due follow-ups
//! (cold-lead recycling and sends the compliance gate deferred).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use leadflow_config::model::HousekeeperConfig;
use leadflow_core::types::LeadState;
use leadflow_core::{Clock, LeadflowError, StorageAdapter};
use leadflow_lifecycle::{LeadPipeline, PipelineOutcome};

use crate::scheduler::Worker;

pub const HOUSEKEEPER_WORKER: &str = "housekeeper";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub archived: usize,
    pub recycled: usize,
    /// Deferred first contacts and replies that went out.
    pub resumed: usize,
    pub retired: usize,
    pub deferred: usize,
    pub captured: usize,
}

pub struct Housekeeper {
    storage: Arc<dyn StorageAdapter>,
    pipeline: Arc<LeadPipeline>,
    clock: Arc<dyn Clock>,
    archive_after: chrono::Duration,
    batch_size: usize,
    interval: Duration,
}

impl Housekeeper {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        pipeline: Arc<LeadPipeline>,
        clock: Arc<dyn Clock>,
        config: &HousekeeperConfig,
    ) -> Self {
        Self {
            storage,
            pipeline,
            clock,
            archive_after: chrono::Duration::days(config.archive_after_days.min(36_500) as i64),
            batch_size: config.batch_size,
            interval: Duration::from_secs(config.interval_secs),
        }
    }

    pub async fn housekeep(&self) -> Result<HousekeepingReport, LeadflowError> {
        let now = self.clock.now();
        let mut report = HousekeepingReport::default();

        let archived = self
            .storage
            .archive_terminal_leads(now - self.archive_after, self.batch_size, now)
            .await?;
        report.archived = archived.len();
        if !archived.is_empty() {
            debug!(lead_ids = ?archived, "terminal leads archived");
        }

        let due = self.storage.find_due_followups(now, self.batch_size).await?;
        for lead in due {
            let was_cold = lead.state == LeadState::Cold;
            match self.pipeline.follow_up_or_capture(&lead).await {
                PipelineOutcome::Processed {
                    state: LeadState::Dead,
                    ..
                } => report.retired += 1,
                PipelineOutcome::Processed { .. } if was_cold => report.recycled += 1,
                PipelineOutcome::Processed { .. } => report.resumed += 1,
                PipelineOutcome::Deferred { .. } | PipelineOutcome::OptedOut { .. } => {
                    report.deferred += 1
                }
                PipelineOutcome::Captured { .. } => report.captured += 1,
                PipelineOutcome::Duplicate { .. }
                | PipelineOutcome::Stale { .. }
                | PipelineOutcome::Ignored { .. } => {}
            }
        }

        if report != HousekeepingReport::default() {
            info!(
                archived = report.archived,
                recycled = report.recycled,
                resumed = report.resumed,
                retired = report.retired,
                deferred = report.deferred,
                captured = report.captured,
                "housekeeping finished"
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl Worker for Housekeeper {
    fn name(&self) -> &'static str {
        HOUSEKEEPER_WORKER
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_pass(&self) -> Result<(), LeadflowError> {
        self.housekeep().await.map(|_| ())
    }
}
