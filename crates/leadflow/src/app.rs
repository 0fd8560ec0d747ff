// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wires configuration into the running system.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use leadflow_compliance::{ComplianceGate, DenialTracker};
use leadflow_config::LeadflowConfig;
use leadflow_coord::{
    AlertDispatcher, HeartbeatRegistry, LockManager, LockOptions, LogAlertSink, Notifier,
    open_store,
};
use leadflow_core::{
    AgentRouter, AlertSink, Clock, CrmProvider, LeadflowError, MessageSender,
    StorageAdapter, SystemClock,
};
use leadflow_dlq::{BackoffPolicy, DeadLetterQueue, RetryEngine};
use leadflow_lifecycle::{LeadPipeline, PipelineDeps, PipelineSettings};
use leadflow_storage::SqliteStorage;
use leadflow_workers::{
    Housekeeper, InboundWorker, RetryWorker, StuckLeadSweeper, WorkerRuntime, WorkerScheduler,
};

use crate::adapters::{LocalCrm, LogSender, TemplateRouter};

/// External collaborators. Swapped for mocks in tests.
pub struct Collaborators {
    pub router: Arc<dyn AgentRouter>,
    pub sender: Arc<dyn MessageSender>,
    pub crm: Arc<dyn CrmProvider>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub clock: Arc<dyn Clock>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            router: Arc::new(TemplateRouter),
            sender: Arc::new(LogSender),
            crm: Arc::new(LocalCrm),
            alert_sink: Arc::new(LogAlertSink),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Every long-lived component, built once from configuration.
pub struct App {
    pub config: LeadflowConfig,
    pub storage: Arc<SqliteStorage>,
    pub pipeline: Arc<LeadPipeline>,
    pub retry: Arc<RetryEngine>,
    pub sweeper: Arc<StuckLeadSweeper>,
    pub housekeeper: Arc<Housekeeper>,
    pub inbound: Arc<InboundWorker>,
    pub runtime: WorkerRuntime,
}

impl App {
    pub async fn open(config: LeadflowConfig) -> Result<Self, LeadflowError> {
        Self::open_with(config, Collaborators::default()).await
    }

    pub async fn open_with(
        config: LeadflowConfig,
        collaborators: Collaborators,
    ) -> Result<Self, LeadflowError> {
        let Collaborators {
            router,
            sender,
            crm,
            alert_sink,
            clock,
        } = collaborators;

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage = Arc::new(storage);
        let coordination = open_store(&config.coordination).await?;

        let alerts = AlertDispatcher::new(
            coordination.clone(),
            alert_sink,
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
            router,
            sender,
            crm,
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
            locks,
            alerts,
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
            clock,
        };

        info!(
            database = %config.storage.database_path,
            coordination = ?config.coordination.backend,
            "leadflow initialized"
        );

        Ok(Self {
            config,
            storage,
            pipeline,
            retry,
            sweeper,
            housekeeper,
            inbound,
            runtime,
        })
    }

    /// A scheduler with every enabled worker registered. The inbound worker
    /// always runs.
    pub fn scheduler(&self) -> WorkerScheduler {
        let mut scheduler = WorkerScheduler::new(self.runtime.clone());
        scheduler.register(self.inbound.clone());
        if self.config.retry.enabled {
            scheduler.register(Arc::new(RetryWorker::new(
                self.retry.clone(),
                &self.config.retry,
            )));
        }
        if self.config.sweeper.enabled {
            scheduler.register(self.sweeper.clone());
        }
        if self.config.housekeeper.enabled {
            scheduler.register(self.housekeeper.clone());
        }
        scheduler
    }

    pub async fn close(&self) -> Result<(), LeadflowError> {
        self.storage.close().await
    }
}
