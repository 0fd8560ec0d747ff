// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consent records. An opt-out, once written, is never cleared.

use chrono::{DateTime, Utc};
use leadflow_core::LeadflowError;
use leadflow_core::types::{ConsentRecord, ConsentType};
use rusqlite::{OptionalExtension, Row, params};

use crate::codec::{get_enum, get_opt_ts, get_ts, ts};
use crate::database::Database;

const CONSENT_COLUMNS: &str =
    "id, phone, client_id, consent_type, opted_out, opted_out_at, created_at";

fn row_to_consent(row: &Row<'_>) -> rusqlite::Result<ConsentRecord> {
    Ok(ConsentRecord {
        id: row.get(0)?,
        phone: row.get(1)?,
        client_id: row.get(2)?,
        consent_type: get_enum(row, 3)?,
        opted_out: row.get(4)?,
        opted_out_at: get_opt_ts(row, 5)?,
        created_at: get_ts(row, 6)?,
    })
}

fn select_consent(
    conn: &rusqlite::Connection,
    phone: &str,
    client_id: &str,
) -> rusqlite::Result<ConsentRecord> {
    conn.query_row(
        &format!("SELECT {CONSENT_COLUMNS} FROM consent_records WHERE phone = ?1 AND client_id = ?2"),
        params![phone, client_id],
        row_to_consent,
    )
}

/// Record consent for (phone, client).
///
/// Express consent is never downgraded to implied, and an existing opt-out
/// is left in place.
pub async fn record_consent(
    db: &Database,
    phone: &str,
    client_id: &str,
    consent_type: ConsentType,
    now: DateTime<Utc>,
) -> Result<ConsentRecord, LeadflowError> {
    let phone = phone.to_string();
    let client_id = client_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO consent_records (phone, client_id, consent_type, opted_out, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)
                 ON CONFLICT (phone, client_id) DO UPDATE SET
                   consent_type = CASE WHEN consent_records.consent_type = 'express'
                                       THEN 'express' ELSE excluded.consent_type END",
                params![phone, client_id, consent_type.to_string(), ts(now)],
            )?;
            select_consent(conn, &phone, &client_id)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_consent(
    db: &Database,
    phone: &str,
    client_id: &str,
) -> Result<Option<ConsentRecord>, LeadflowError> {
    let phone = phone.to_string();
    let client_id = client_id.to_string();
    db.connection()
        .call(move |conn| select_consent(conn, &phone, &client_id).optional())
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark (phone, client) opted out. The first opt-out timestamp is kept.
pub async fn record_opt_out(
    db: &Database,
    phone: &str,
    client_id: &str,
    now: DateTime<Utc>,
) -> Result<ConsentRecord, LeadflowError> {
    let phone = phone.to_string();
    let client_id = client_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO consent_records
                   (phone, client_id, consent_type, opted_out, opted_out_at, created_at)
                 VALUES (?1, ?2, 'implied', 1, ?3, ?3)
                 ON CONFLICT (phone, client_id) DO UPDATE SET
                   opted_out = 1,
                   opted_out_at = COALESCE(consent_records.opted_out_at, excluded.opted_out_at)",
                params![phone, client_id, ts(now)],
            )?;
            select_consent(conn, &phone, &client_id)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
