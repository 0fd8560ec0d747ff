// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The polling loop shared by every worker.
//!
//! A worker is an independent task with its own interval. Each iteration
//! drains the worker's notification list, runs a pass when one is due (or a
//! notification asked for it), and writes a heartbeat. Shutdown is observed
//! between passes and while sleeping; a pass in flight always completes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use leadflow_coord::{HeartbeatRegistry, Notifier, WorkerNotification};
use leadflow_core::{Clock, LeadflowError};

/// Longest the loop sleeps before checking for notifications again.
pub const NOTIFICATION_POLL: Duration = Duration::from_secs(1);

/// One periodic unit of background work.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Stable name used for heartbeats, notifications and logs.
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Run one pass. Errors are logged by the scheduler and the loop goes on.
    async fn run_pass(&self) -> Result<(), LeadflowError>;

    /// React to a targeted notification. `RunNow` is handled by the scheduler.
    async fn handle_notification(
        &self,
        notification: &WorkerNotification,
    ) -> Result<(), LeadflowError> {
        debug!(worker = self.name(), ?notification, "notification ignored");
        Ok(())
    }
}

/// Shared plumbing handed to every worker loop.
#[derive(Clone)]
pub struct WorkerRuntime {
    pub heartbeats: HeartbeatRegistry,
    pub notifier: Notifier,
    pub clock: Arc<dyn Clock>,
}

/// Runs a set of workers until cancelled.
pub struct WorkerScheduler {
    runtime: WorkerRuntime,
    workers: Vec<Arc<dyn Worker>>,
}

impl WorkerScheduler {
    pub fn new(runtime: WorkerRuntime) -> Self {
        Self {
            runtime,
            workers: Vec::new(),
        }
    }

    pub fn register(&mut self, worker: Arc<dyn Worker>) -> &mut Self {
        self.workers.push(worker);
        self
    }

    pub fn worker_names(&self) -> Vec<&'static str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    /// Spawn every registered worker and wait for all of them to stop.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        for worker in self.workers {
            let runtime = self.runtime.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { run_worker(worker, runtime, cancel).await });
        }

        info!(count = tasks.len(), "workers started");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("all workers stopped");
    }
}

/// The loop for a single worker. Returns once `cancel` fires.
pub async fn run_worker(worker: Arc<dyn Worker>, runtime: WorkerRuntime, cancel: CancellationToken) {
    let name = worker.name();
    let interval = worker.interval();
    let mut next_pass = Instant::now();
    info!(worker = name, interval_ms = interval.as_millis() as u64, "worker starting");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let mut run_now = false;
        match runtime.notifier.drain(name).await {
            Ok(notifications) => {
                for notification in notifications {
                    if notification == WorkerNotification::RunNow {
                        run_now = true;
                        continue;
                    }
                    if let Err(e) = worker.handle_notification(&notification).await {
                        warn!(worker = name, error = %e, ?notification, "notification handling failed");
                    }
                }
            }
            Err(e) => warn!(worker = name, error = %e, "could not drain notifications"),
        }

        if run_now || Instant::now() >= next_pass {
            let started = Instant::now();
            if let Err(e) = worker.run_pass().await {
                error!(worker = name, error = %e, "worker pass failed");
            }
            debug!(worker = name, elapsed_ms = started.elapsed().as_millis() as u64, "pass finished");

            if let Err(e) = runtime
                .heartbeats
                .beat(name, interval, runtime.clock.now())
                .await
            {
                warn!(worker = name, error = %e, "heartbeat write failed");
            }
            next_pass = Instant::now() + interval;
        }

        let wait = next_pass
            .saturating_duration_since(Instant::now())
            .min(NOTIFICATION_POLL);
        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = cancel.cancelled() => break,
        }
    }

    info!(worker = name, "worker stopped");
}
