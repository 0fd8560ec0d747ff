// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background workers for Leadflow.
//!
//! Every worker is an independent polling loop run by the
//! [`WorkerScheduler`]: the inbound queue drainer, the dead-letter retry
//! worker, the stuck-lead sweeper and the lifecycle housekeeper. Workers share
//! no in-process state; they coordinate only through the coordination store.

pub mod housekeeper;
pub mod inbound;
pub mod retry;
pub mod scheduler;
pub mod shutdown;
pub mod sweeper;

pub use housekeeper::{HOUSEKEEPER_WORKER, Housekeeper, HousekeepingReport};
pub use inbound::{INBOUND_QUEUE, INBOUND_WORKER, InboundWorker, enqueue_event};
pub use retry::{RETRY_WORKER, RetryWorker};
pub use scheduler::{Worker, WorkerRuntime, WorkerScheduler, run_worker};
pub use shutdown::install_signal_handler;
pub use sweeper::{SWEEPER_WORKER, StuckLeadSweeper, SweepReport, SweepRule};

/// Names of every worker, in the order `serve` starts them.
pub const ALL_WORKERS: [&str; 4] = [INBOUND_WORKER, RETRY_WORKER, SWEEPER_WORKER, HOUSEKEEPER_WORKER];
