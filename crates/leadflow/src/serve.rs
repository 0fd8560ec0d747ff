// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadflow serve` command implementation.
//!
//! Opens storage and the coordination store, then runs the inbound, retry,
//! sweeper and housekeeper workers until SIGTERM or Ctrl-C. Passes in flight
//! finish before the process exits.

use tracing::info;

use leadflow_config::LeadflowConfig;
use leadflow_core::LeadflowError;
use leadflow_workers::install_signal_handler;

use crate::app::App;

pub async fn run_serve(config: LeadflowConfig) -> Result<(), LeadflowError> {
    info!("starting leadflow serve");

    let app = App::open(config).await?;
    let scheduler = app.scheduler();
    info!(workers = ?scheduler.worker_names(), "worker set resolved");

    let cancel = install_signal_handler();
    scheduler.run(cancel).await;

    app.close().await?;
    info!("leadflow serve shutdown complete");
    Ok(())
}
