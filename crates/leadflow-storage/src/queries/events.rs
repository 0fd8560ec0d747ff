// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only lead audit trail.

use leadflow_core::LeadflowError;
use leadflow_core::types::AuditEvent;
use rusqlite::params;

use crate::codec::{get_enum, get_json, get_opt_enum, get_ts, ts};
use crate::database::Database;

/// Insert an audit row on an existing connection or transaction.
pub(crate) fn insert_event(conn: &rusqlite::Connection, event: &AuditEvent) -> rusqlite::Result<()> {
    let detail = if event.detail.is_null() {
        None
    } else {
        Some(event.detail.to_string())
    };
    conn.execute(
        "INSERT INTO lead_events (lead_id, event_type, from_state, to_state, reason, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.lead_id,
            event.event_type.to_string(),
            event.from_state.map(|s| s.to_string()),
            event.to_state.map(|s| s.to_string()),
            event.reason,
            detail,
            ts(event.created_at),
        ],
    )?;
    Ok(())
}

pub async fn record_event(db: &Database, event: &AuditEvent) -> Result<(), LeadflowError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| insert_event(conn, &event))
        .await
        .map_err(crate::database::map_tr_err)
}

/// All events for a lead in insertion order.
pub async fn list_events(db: &Database, lead_id: &str) -> Result<Vec<AuditEvent>, LeadflowError> {
    let lead_id = lead_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT lead_id, event_type, from_state, to_state, reason, detail, created_at
                 FROM lead_events WHERE lead_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![lead_id], |row| {
                Ok(AuditEvent {
                    lead_id: row.get(0)?,
                    event_type: get_enum(row, 1)?,
                    from_state: get_opt_enum(row, 2)?,
                    to_state: get_opt_enum(row, 3)?,
                    reason: row.get(4)?,
                    detail: get_json(row, 5)?,
                    created_at: get_ts(row, 6)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use leadflow_core::types::{AuditEventType, LeadState};
    use tempfile::tempdir;

    #[tokio::test]
    async fn events_round_trip_in_order() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("events.db").to_str().unwrap())
            .await
            .unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap();

        let first = AuditEvent::new("lead-1", AuditEventType::Transition, "first outbound", at)
            .with_states(LeadState::New, LeadState::IntakeSent);
        let second = AuditEvent::new("lead-1", AuditEventType::StuckRemediated, "sweep", at)
            .with_detail(serde_json::json!({"age_minutes": 31}));
        record_event(&db, &first).await.unwrap();
        record_event(&db, &second).await.unwrap();
        record_event(
            &db,
            &AuditEvent::new("lead-2", AuditEventType::Archived, "retention", at),
        )
        .await
        .unwrap();

        let events = list_events(&db, "lead-1").await.unwrap();
        assert_eq!(events, vec![first, second]);
    }
}
