// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot operator commands: single worker passes, ingestion, dead-letter
//! management and the holiday calendar.

use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

use leadflow_compliance::HolidayCalendar;
use leadflow_config::LeadflowConfig;
use leadflow_coord::WorkerNotification;
use leadflow_core::types::{DlqStatus, FailedLead, InboundEvent};
use leadflow_core::LeadflowError;
use leadflow_lifecycle::PipelineOutcome;
use leadflow_workers::{INBOUND_WORKER, RETRY_WORKER, enqueue_event};

use crate::app::App;

pub async fn run_sweep(app: &App) -> Result<(), LeadflowError> {
    let report = app.sweeper.sweep().await?;
    println!(
        "sweep: examined={} advanced={} cooled={} alerted={} skipped={} failed={}",
        report.examined,
        report.advanced,
        report.cooled,
        report.alerted,
        report.skipped,
        report.failed
    );
    Ok(())
}

pub async fn run_retry(app: &App) -> Result<(), LeadflowError> {
    let report = app.retry.run_once().await?;
    println!(
        "retry: claimed={} resolved={} rescheduled={} deferred={} dead={}",
        report.claimed, report.resolved, report.rescheduled, report.deferred, report.dead
    );
    Ok(())
}

pub async fn run_housekeep(app: &App) -> Result<(), LeadflowError> {
    let report = app.housekeeper.housekeep().await?;
    println!(
        "housekeep: archived={} recycled={} resumed={} retired={} deferred={} captured={}",
        report.archived,
        report.recycled,
        report.resumed,
        report.retired,
        report.deferred,
        report.captured
    );
    Ok(())
}

/// Read an inbound event from a file, or from stdin when the path is `-`.
pub fn read_event(path: &Path) -> Result<InboundEvent, LeadflowError> {
    let raw = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())
            .map_err(|e| LeadflowError::Validation(format!("cannot read stdin: {e}")))?
    } else {
        std::fs::read_to_string(path).map_err(|e| {
            LeadflowError::Validation(format!("cannot read {}: {e}", path.display()))
        })?
    };
    parse_event(&raw)
}

pub fn parse_event(raw: &str) -> Result<InboundEvent, LeadflowError> {
    serde_json::from_str(raw)
        .map_err(|e| LeadflowError::Validation(format!("invalid inbound event: {e}")))
}

/// Hand an event to the durable queue, or process it in this process.
/// Returns the pipeline outcome when processed inline.
pub async fn run_ingest(
    app: &App,
    event: &InboundEvent,
    enqueue: bool,
) -> Result<Option<PipelineOutcome>, LeadflowError> {
    if enqueue {
        let id = enqueue_event(app.storage.as_ref(), event).await?;
        if let Err(e) = app
            .runtime
            .notifier
            .notify(INBOUND_WORKER, &WorkerNotification::RunNow)
            .await
        {
            warn!(error = %e, "could not wake the inbound worker");
        }
        info!(queue_id = id, source = %event.source, "inbound event queued");
        println!("queued as entry {id}");
        return Ok(None);
    }

    let outcome = app.pipeline.handle_event(event).await;
    println!("{}", describe_outcome(&outcome));
    Ok(Some(outcome))
}

pub fn describe_outcome(outcome: &PipelineOutcome) -> String {
    match outcome {
        PipelineOutcome::Processed { lead_id, state } => format!("{lead_id}: now {state}"),
        PipelineOutcome::Duplicate { lead_id } => format!("{lead_id}: duplicate, ignored"),
        PipelineOutcome::Deferred { lead_id, reason } => format!("{lead_id}: deferred ({reason})"),
        PipelineOutcome::OptedOut { lead_id } => format!("{lead_id}: opted out"),
        PipelineOutcome::Stale { lead_id } => format!("{lead_id}: stale, skipped"),
        PipelineOutcome::Ignored { lead_id, state } => {
            format!("{lead_id}: ignored in state {state}")
        }
        PipelineOutcome::Captured { failed_lead_id } => {
            format!("failed, captured as dead letter {failed_lead_id}")
        }
    }
}

pub async fn run_dlq_list(
    app: &App,
    status: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<Vec<FailedLead>, LeadflowError> {
    let status = status
        .map(|s| {
            DlqStatus::from_str(s)
                .map_err(|_| LeadflowError::Validation(format!("unknown dead-letter status: {s}")))
        })
        .transpose()?;
    let entries = app.retry.list(status, limit).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
        );
    } else if entries.is_empty() {
        println!("no dead letters");
    } else {
        for entry in &entries {
            println!(
                "{}  {:<8} {:<8} {}/{}  {}  {}",
                entry.id,
                entry.status,
                entry.failure_stage,
                entry.retry_count,
                entry.max_retries,
                entry.correlation_id,
                entry.error_message
            );
        }
    }
    Ok(entries)
}

pub async fn run_dlq_resolve(app: &App, id: &str, operator: &str) -> Result<(), LeadflowError> {
    if app.retry.resolve(id, operator).await? {
        println!("{id}: resolved by {operator}");
        Ok(())
    } else {
        Err(LeadflowError::NotFound {
            entity: "active dead letter",
            id: id.to_string(),
        })
    }
}

/// Requeue a dead entry and ask a running retry worker to replay it now.
pub async fn run_dlq_requeue(app: &App, id: &str) -> Result<(), LeadflowError> {
    if !app.retry.requeue(id).await? {
        return Err(LeadflowError::NotFound {
            entity: "dead letter in status dead",
            id: id.to_string(),
        });
    }
    let notification = WorkerNotification::RetryNow {
        failed_lead_id: id.to_string(),
    };
    if let Err(e) = app.runtime.notifier.notify(RETRY_WORKER, &notification).await {
        warn!(failed_lead_id = id, error = %e, "could not notify the retry worker");
    }
    println!("{id}: requeued");
    Ok(())
}

pub fn run_config(config: &LeadflowConfig) -> Result<(), LeadflowError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| LeadflowError::Internal(format!("cannot render configuration: {e}")))?;
    print!("{rendered}");
    Ok(())
}

pub fn run_holidays(
    config: &LeadflowConfig,
    year: i32,
    state: Option<&str>,
    json: bool,
) -> Result<(), LeadflowError> {
    let calendar = HolidayCalendar::new(&config.compliance.strict_holiday_states);
    let holidays = calendar.holidays(year, state);
    if json {
        let body = serde_json::to_string_pretty(&holidays)
            .map_err(|e| LeadflowError::Internal(format!("cannot encode holidays: {e}")))?;
        println!("{body}");
        return Ok(());
    }

    let scope = match state {
        Some(code) if calendar.is_strict(Some(code)) => format!("{code} (strict)"),
        Some(code) => code.to_string(),
        None => "federal".to_string(),
    };
    println!("blocked dates for {year}, {scope}:");
    for holiday in holidays {
        let observed = if holiday.observed { " (observed)" } else { "" };
        println!("  {}  {}{observed}", holiday.date, holiday.name);
    }
    Ok(())
}
