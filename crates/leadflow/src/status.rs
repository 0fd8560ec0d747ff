// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadflow status` command implementation.
//!
//! Reports worker liveness from heartbeats and dead-letter totals by status.
//! Heartbeats written by another process are only visible with the SQLite
//! coordination backend.

use std::io::IsTerminal;

use chrono::{DateTime, Utc};
use serde::Serialize;

use leadflow_config::CoordinationBackend;
use leadflow_core::LeadflowError;
use leadflow_workers::ALL_WORKERS;

use crate::app::App;

#[derive(Debug, Serialize)]
pub struct WorkerHealth {
    pub name: String,
    pub alive: bool,
    pub last_beat: Option<DateTime<Utc>>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub coordination: String,
    pub workers: Vec<WorkerHealth>,
    pub dead_letters: Vec<DeadLetterCount>,
}

#[derive(Debug, Serialize)]
pub struct DeadLetterCount {
    pub status: String,
    pub count: i64,
}

pub async fn collect_status(app: &App) -> Result<StatusResponse, LeadflowError> {
    let mut workers = Vec::with_capacity(ALL_WORKERS.len());
    for name in ALL_WORKERS {
        let last_beat = app.runtime.heartbeats.last_beat(name).await?;
        workers.push(WorkerHealth {
            name: name.to_string(),
            alive: last_beat.is_some(),
            last_beat,
        });
    }

    let dead_letters = app
        .retry
        .counts()
        .await?
        .into_iter()
        .map(|(status, count)| DeadLetterCount {
            status: status.to_string(),
            count,
        })
        .collect();

    let coordination = match app.config.coordination.backend {
        CoordinationBackend::Memory => "memory",
        CoordinationBackend::Sqlite => "sqlite",
    };

    Ok(StatusResponse {
        coordination: coordination.to_string(),
        workers,
        dead_letters,
    })
}

/// Run the `leadflow status` command.
///
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(app: &App, json: bool, plain: bool) -> Result<(), LeadflowError> {
    let status = collect_status(app).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(());
    }

    let use_color = !plain && std::io::stdout().is_terminal();
    print_status(&status, use_color);
    Ok(())
}

fn print_status(status: &StatusResponse, use_color: bool) {
    println!();
    println!("  leadflow status ({} coordination)", status.coordination);
    println!("  {}", "-".repeat(40));

    for worker in &status.workers {
        let seen = worker
            .last_beat
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "no recent heartbeat".to_string());
        if use_color {
            use colored::Colorize;
            let mark = if worker.alive {
                "✓".green()
            } else {
                "✗".red()
            };
            println!("    {mark} {:<12} {seen}", worker.name);
        } else {
            let mark = if worker.alive { "[OK]  " } else { "[DOWN]" };
            println!("    {mark} {:<12} {seen}", worker.name);
        }
    }

    println!();
    if status.dead_letters.is_empty() {
        println!("    Dead letters: none");
    } else {
        println!("    Dead letters:");
        for entry in &status.dead_letters {
            println!("      {:<10} {}", entry.status, entry.count);
        }
    }
    println!();
}
