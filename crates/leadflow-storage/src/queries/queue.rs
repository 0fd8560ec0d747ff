// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crash-safe inbound event queue.
//!
//! Entries move `pending -> processing -> completed | failed`. A `processing`
//! entry whose lock has lapsed belongs to a crashed worker and is handed out again.

use leadflow_core::LeadflowError;
use leadflow_core::types::QueueEntry;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

/// Enqueue a new item. Returns the auto-generated queue entry ID.
pub async fn enqueue(db: &Database, queue_name: &str, payload: &str) -> Result<i64, LeadflowError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue (queue_name, payload) VALUES (?1, ?2)",
                params![queue_name, payload],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim the oldest available entry from the named queue.
///
/// Marks it `processing` with a 5-minute lock. Returns `None` if nothing is available.
pub async fn dequeue(db: &Database, queue_name: &str) -> Result<Option<QueueEntry>, LeadflowError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let next = tx
                .query_row(
                    "SELECT id, queue_name, payload, status, attempts, max_attempts,
                            created_at, updated_at, locked_until
                     FROM queue
                     WHERE queue_name = ?1
                       AND (status = 'pending'
                            OR (status = 'processing'
                                AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))
                     ORDER BY id ASC
                     LIMIT 1",
                    params![queue_name],
                    |row| {
                        Ok(QueueEntry {
                            id: row.get(0)?,
                            queue_name: row.get(1)?,
                            payload: row.get(2)?,
                            status: row.get(3)?,
                            attempts: row.get(4)?,
                            max_attempts: row.get(5)?,
                            created_at: row.get(6)?,
                            updated_at: row.get(7)?,
                            locked_until: row.get(8)?,
                        })
                    },
                )
                .optional()?;

            let Some(entry) = next else {
                tx.commit()?;
                return Ok(None);
            };

            let locked_until: String = tx.query_row(
                "UPDATE queue SET status = 'processing',
                 locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1
                 RETURNING locked_until",
                params![entry.id],
                |row| row.get(0),
            )?;
            tx.commit()?;

            Ok(Some(QueueEntry {
                status: "processing".to_string(),
                locked_until: Some(locked_until),
                ..entry
            }))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark an entry `completed`.
pub async fn ack(db: &Database, id: i64) -> Result<(), LeadflowError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed processing attempt.
///
/// Returns the entry to `pending` until `max_attempts` is reached, then marks it `failed`.
pub async fn fail(db: &Database, id: i64) -> Result<(), LeadflowError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET attempts = attempts + 1,
                 status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
                 locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark an entry `failed` immediately, without further attempts.
pub async fn reject(db: &Database, id: i64) -> Result<(), LeadflowError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET attempts = attempts + 1, status = 'failed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
