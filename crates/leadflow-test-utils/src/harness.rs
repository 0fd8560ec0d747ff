// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the full reliability layer (storage, coordination,
//! compliance, dead-letter queue, pipeline and workers) on a temp SQLite
//! database with a manual clock and mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use leadflow_compliance::{ComplianceGate, DenialTracker};
use leadflow_config::model::{LeadflowConfig, StorageConfig};
use leadflow_coord::{
    AlertDispatcher, HeartbeatRegistry, LockManager, LockOptions, MemoryCoordinationStore, Notifier,
};
use leadflow_core::types::{InboundEvent, Lead};
use leadflow_core::{CoordinationStore, LeadflowError, StorageAdapter};
use leadflow_dlq::{BackoffPolicy, DeadLetterQueue, RetryEngine};
use leadflow_lifecycle::{LeadPipeline, PipelineDeps, PipelineOutcome, PipelineSettings};
use leadflow_storage::SqliteStorage;
use leadflow_workers::{Housekeeper, InboundWorker, StuckLeadSweeper, WorkerRuntime};

use crate::clock::ManualClock;
use crate::flaky_store::FlakyCoordinationStore;
use crate::mock_alerts::RecordingAlertSink;
use crate::mock_crm::MockCrm;
use crate::mock_router::MockRouter;
use crate::mock_sender::MockSender;

/// 2026-03-10 15:00 UTC: a Tuesday, inside the send window coast to coast.
pub fn default_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: LeadflowConfig,
    start: DateTime<Utc>,
    flaky_coordination: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = LeadflowConfig::default();
        // Tests should not sit out a full production lock wait.
        config.lock.wait_ms = 300;
        config.lock.poll_ms = 20;
        Self {
            config,
            start: default_start(),
            flaky_coordination: false,
        }
    }

    /// Replace the configuration. The storage path is always overridden.
    pub fn with_config(mut self, config: LeadflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the manual clock at `start`.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    /// Back coordination with a store that can be taken down mid-test.
    pub fn with_flaky_coordination(mut self) -> Self {
        self.flaky_coordination = true;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, LeadflowError> {
        let temp_dir = tempfile::TempDir::new().map_err(LeadflowError::storage)?;
        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: temp_dir.path().join("test.db").to_string_lossy().to_string(),
            wal_mode: true,
        };

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let flaky = self
            .flaky_coordination
            .then(|| Arc::new(FlakyCoordinationStore::new()));
        let coordination: Arc<dyn CoordinationStore> = match &flaky {
            Some(store) => store.clone() as Arc<dyn CoordinationStore>,
            None => Arc::new(MemoryCoordinationStore::new()),
        };

        let clock = Arc::new(ManualClock::new(self.start));
        let router = Arc::new(MockRouter::new());
        let sender = Arc::new(MockSender::new());
        let crm = Arc::new(MockCrm::new());
        let alert_sink = Arc::new(RecordingAlertSink::new());

        let alerts = AlertDispatcher::new(
            coordination.clone(),
            alert_sink.clone(),
            Duration::from_secs(config.alerts.cooldown_secs),
        );
        let locks = LockManager::new(coordination.clone(), LockOptions::from(&config.lock));
        let gate = ComplianceGate::new(&config.compliance, config.housekeeper.max_cold_outreach)?;
        let denials =
            DenialTracker::from_config(coordination.clone(), alerts.clone(), &config.compliance);
        let dlq = DeadLetterQueue::new(
            storage.clone(),
            alerts.clone(),
            BackoffPolicy::from_config(&config.retry),
            clock.clone(),
        );
        let settings = PipelineSettings::from_config(&config.housekeeper);

        let pipeline = Arc::new(LeadPipeline::new(PipelineDeps {
            storage: storage.clone(),
            locks: locks.clone(),
            gate,
            denials,
            router: router.clone(),
            sender: sender.clone(),
            crm: crm.clone(),
            dlq,
            clock: clock.clone(),
            settings,
        }));

        let retry = Arc::new(RetryEngine::new(
            storage.clone(),
            pipeline.clone(),
            alerts.clone(),
            clock.clone(),
            &config.retry,
        ));
        let sweeper = Arc::new(StuckLeadSweeper::new(
            storage.clone(),
            locks.clone(),
            alerts.clone(),
            clock.clone(),
            &config.sweeper,
            settings.recycle_after,
        ));
        let housekeeper = Arc::new(Housekeeper::new(
            storage.clone(),
            pipeline.clone(),
            clock.clone(),
            &config.housekeeper,
        ));
        let inbound = Arc::new(InboundWorker::new(
            storage.clone(),
            pipeline.clone(),
            &config.workers,
        ));
        let runtime = WorkerRuntime {
            heartbeats: HeartbeatRegistry::new(
                coordination.clone(),
                config.workers.heartbeat_factor,
            ),
            notifier: Notifier::new(coordination.clone(), config.workers.notification_buffer),
            clock: clock.clone(),
        };

        Ok(TestHarness {
            config,
            clock,
            storage,
            coordination,
            flaky,
            router,
            sender,
            crm,
            alert_sink,
            alerts,
            locks,
            pipeline,
            retry,
            sweeper,
            housekeeper,
            inbound,
            runtime,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock collaborators and temp storage.
pub struct TestHarness {
    pub config: LeadflowConfig,
    pub clock: Arc<ManualClock>,
    /// SQLite storage (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    pub coordination: Arc<dyn CoordinationStore>,
    /// Present when built with [`TestHarnessBuilder::with_flaky_coordination`].
    pub flaky: Option<Arc<FlakyCoordinationStore>>,
    pub router: Arc<MockRouter>,
    pub sender: Arc<MockSender>,
    pub crm: Arc<MockCrm>,
    pub alert_sink: Arc<RecordingAlertSink>,
    pub alerts: AlertDispatcher,
    pub locks: LockManager,
    pub pipeline: Arc<LeadPipeline>,
    pub retry: Arc<RetryEngine>,
    pub sweeper: Arc<StuckLeadSweeper>,
    pub housekeeper: Arc<Housekeeper>,
    pub inbound: Arc<InboundWorker>,
    pub runtime: WorkerRuntime,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A new-lead event from a Texas web form with express consent.
    pub fn new_lead_event(lead_id: &str, phone: &str) -> InboundEvent {
        InboundEvent {
            source: "webform".into(),
            client_id: "client-1".into(),
            lead_payload: json!({
                "lead_id": lead_id,
                "phone": phone,
                "name": "Test Lead",
                "state_code": "TX",
                "message": "Need a quote",
                "consent": "express",
            }),
            is_reply: false,
        }
    }

    pub fn reply_event(lead_id: &str, message: &str) -> InboundEvent {
        InboundEvent {
            source: "sms".into(),
            client_id: "client-1".into(),
            lead_payload: json!({ "lead_id": lead_id, "message": message }),
            is_reply: true,
        }
    }

    /// Run an event through the processing entrypoint.
    pub async fn handle(&self, event: &InboundEvent) -> PipelineOutcome {
        self.pipeline.handle_event(event).await
    }

    /// Load a lead, failing if it does not exist.
    pub async fn lead(&self, id: &str) -> Result<Lead, LeadflowError> {
        self.storage
            .get_lead(id)
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                entity: "lead",
                id: id.to_string(),
            })
    }

    /// Simulate a coordination store outage. No-op without flaky coordination.
    pub fn set_coordination_down(&self, down: bool) {
        if let Some(flaky) = &self.flaky {
            flaky.set_down(down);
        }
    }
}
