// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter queue persistence.
//!
//! Claiming is a single transaction that moves due entries to `retrying` and
//! pushes `next_retry_at` out to the claim lease, so concurrent retry workers
//! never pick up the same entry and a crashed worker's claims expire.

use chrono::{DateTime, Utc};
use leadflow_core::LeadflowError;
use leadflow_core::types::{DlqStatus, FailedLead};
use rusqlite::{OptionalExtension, Row, params};

use crate::codec::{get_enum, get_json, get_opt_ts, get_ts, opt_ts, ts};
use crate::database::Database;

const FAILED_LEAD_COLUMNS: &str = "id, original_payload, source, failure_stage, error_message, \
     error_kind, retry_count, max_retries, next_retry_at, status, correlation_id, lead_id, \
     client_id, created_at, updated_at, resolved_at, resolved_by";

const ACTIVE_STATUSES_SQL: &str = "('pending', 'retrying')";

fn row_to_failed_lead(row: &Row<'_>) -> rusqlite::Result<FailedLead> {
    Ok(FailedLead {
        id: row.get(0)?,
        original_payload: get_json(row, 1)?,
        source: row.get(2)?,
        failure_stage: get_enum(row, 3)?,
        error_message: row.get(4)?,
        error_kind: get_enum(row, 5)?,
        retry_count: row.get(6)?,
        max_retries: row.get(7)?,
        next_retry_at: get_opt_ts(row, 8)?,
        status: get_enum(row, 9)?,
        correlation_id: row.get(10)?,
        lead_id: row.get(11)?,
        client_id: row.get(12)?,
        created_at: get_ts(row, 13)?,
        updated_at: get_ts(row, 14)?,
        resolved_at: get_opt_ts(row, 15)?,
        resolved_by: row.get(16)?,
    })
}

pub async fn insert_failed_lead(db: &Database, entry: &FailedLead) -> Result<(), LeadflowError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO failed_leads ({FAILED_LEAD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    entry.id,
                    entry.original_payload.to_string(),
                    entry.source,
                    entry.failure_stage.to_string(),
                    entry.error_message,
                    entry.error_kind.to_string(),
                    entry.retry_count,
                    entry.max_retries,
                    opt_ts(entry.next_retry_at),
                    entry.status.to_string(),
                    entry.correlation_id,
                    entry.lead_id,
                    entry.client_id,
                    ts(entry.created_at),
                    ts(entry.updated_at),
                    opt_ts(entry.resolved_at),
                    entry.resolved_by,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_failed_lead(db: &Database, id: &str) -> Result<Option<FailedLead>, LeadflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {FAILED_LEAD_COLUMNS} FROM failed_leads WHERE id = ?1"),
                params![id],
                row_to_failed_lead,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim due active entries for replay.
pub async fn claim_due_failed_leads(
    db: &Database,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<FailedLead>, LeadflowError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let due: Vec<FailedLead> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {FAILED_LEAD_COLUMNS} FROM failed_leads
                     WHERE status IN {ACTIVE_STATUSES_SQL}
                       AND next_retry_at IS NOT NULL AND next_retry_at <= ?1
                     ORDER BY next_retry_at ASC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![ts(now), limit as i64], row_to_failed_lead)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let mut claimed = Vec::with_capacity(due.len());
            for entry in due {
                tx.execute(
                    "UPDATE failed_leads SET status = 'retrying', next_retry_at = ?1, updated_at = ?2
                     WHERE id = ?3",
                    params![ts(lease_until), ts(now), entry.id],
                )?;
                claimed.push(FailedLead {
                    status: DlqStatus::Retrying,
                    next_retry_at: Some(lease_until),
                    updated_at: now,
                    ..entry
                });
            }
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Write back retry bookkeeping for an entry that is still active.
pub async fn update_failed_lead(db: &Database, entry: &FailedLead) -> Result<bool, LeadflowError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                &format!(
                    "UPDATE failed_leads SET
                       retry_count = ?1, max_retries = ?2, next_retry_at = ?3, status = ?4,
                       error_message = ?5, error_kind = ?6, updated_at = ?7,
                       resolved_at = ?8, resolved_by = ?9, lead_id = COALESCE(?10, lead_id)
                     WHERE id = ?11 AND status IN {ACTIVE_STATUSES_SQL}"
                ),
                params![
                    entry.retry_count,
                    entry.max_retries,
                    opt_ts(entry.next_retry_at),
                    entry.status.to_string(),
                    entry.error_message,
                    entry.error_kind.to_string(),
                    ts(entry.updated_at),
                    opt_ts(entry.resolved_at),
                    entry.resolved_by,
                    entry.lead_id,
                    entry.id,
                ],
            )?;
            Ok(updated > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Manually resolve an active entry.
pub async fn resolve_failed_lead(
    db: &Database,
    id: &str,
    resolved_by: &str,
    now: DateTime<Utc>,
) -> Result<bool, LeadflowError> {
    let id = id.to_string();
    let resolved_by = resolved_by.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                &format!(
                    "UPDATE failed_leads SET status = 'resolved', next_retry_at = NULL,
                       resolved_at = ?1, resolved_by = ?2, updated_at = ?1
                     WHERE id = ?3 AND status IN {ACTIVE_STATUSES_SQL}"
                ),
                params![ts(now), resolved_by, id],
            )?;
            Ok(updated > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return a dead entry to the queue with a fresh attempt budget, due immediately.
pub async fn requeue_failed_lead(
    db: &Database,
    id: &str,
    now: DateTime<Utc>,
) -> Result<bool, LeadflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE failed_leads SET status = 'pending', retry_count = 0,
                   next_retry_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'dead'",
                params![ts(now), id],
            )?;
            Ok(updated > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recent entries first, optionally filtered by status.
pub async fn list_failed_leads(
    db: &Database,
    status: Option<DlqStatus>,
    limit: usize,
) -> Result<Vec<FailedLead>, LeadflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FAILED_LEAD_COLUMNS} FROM failed_leads
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY created_at DESC, id ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(
                params![status.map(|s| s.to_string()), limit as i64],
                row_to_failed_lead,
            )?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn count_failed_leads(db: &Database) -> Result<Vec<(DlqStatus, i64)>, LeadflowError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM failed_leads GROUP BY status ORDER BY status",
            )?;
            let rows = stmt.query_map([], |row| Ok((get_enum(row, 0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
