// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead persistence. Every state write is a compare-and-set on the expected
//! source state and is paired with its audit row in one transaction.

use chrono::{DateTime, Utc};
use leadflow_core::LeadflowError;
use leadflow_core::types::{AuditEvent, AuditEventType, Lead, LeadPatch, LeadState};
use rusqlite::{OptionalExtension, Row, named_params, params};

use crate::codec::{get_enum, get_opt_enum, get_opt_ts, get_ts, opt_ts, ts};
use crate::database::Database;
use crate::queries::events::insert_event;

const LEAD_COLUMNS: &str = "id, client_id, phone, name, state_code, state, previous_state, \
     cold_outreach_count, next_followup_at, last_outbound_at, last_inbound_at, consent_id, \
     is_emergency, archived, created_at, updated_at";

/// Columns touched by a [`LeadPatch`]; `NULL` parameters leave a column as is.
const PATCH_ASSIGNMENTS: &str = "cold_outreach_count = COALESCE(:cold_outreach_count, cold_outreach_count), \
     next_followup_at = CASE WHEN :set_followup THEN :next_followup_at ELSE next_followup_at END, \
     last_outbound_at = COALESCE(:last_outbound_at, last_outbound_at), \
     last_inbound_at = COALESCE(:last_inbound_at, last_inbound_at), \
     consent_id = COALESCE(:consent_id, consent_id)";

/// SQL mirror of [`Lead::last_activity_at`].
const LAST_ACTIVITY_SQL: &str = "MAX(updated_at, COALESCE(last_inbound_at, updated_at), \
     COALESCE(last_outbound_at, updated_at))";

const TERMINAL_STATES_SQL: &str = "('completed', 'dead', 'opted_out')";

fn row_to_lead(row: &Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        client_id: row.get(1)?,
        phone: row.get(2)?,
        name: row.get(3)?,
        state_code: row.get(4)?,
        state: get_enum(row, 5)?,
        previous_state: get_opt_enum(row, 6)?,
        cold_outreach_count: row.get(7)?,
        next_followup_at: get_opt_ts(row, 8)?,
        last_outbound_at: get_opt_ts(row, 9)?,
        last_inbound_at: get_opt_ts(row, 10)?,
        consent_id: row.get(11)?,
        is_emergency: row.get(12)?,
        archived: row.get(13)?,
        created_at: get_ts(row, 14)?,
        updated_at: get_ts(row, 15)?,
    })
}

/// Owned, SQL-ready form of a [`LeadPatch`] so it can move into the writer thread.
struct PatchParams {
    cold_outreach_count: Option<u32>,
    set_followup: bool,
    next_followup_at: Option<String>,
    last_outbound_at: Option<String>,
    last_inbound_at: Option<String>,
    consent_id: Option<i64>,
}

impl From<&LeadPatch> for PatchParams {
    fn from(patch: &LeadPatch) -> Self {
        Self {
            cold_outreach_count: patch.cold_outreach_count,
            set_followup: patch.next_followup_at.is_some(),
            next_followup_at: patch.next_followup_at.flatten().map(ts),
            last_outbound_at: opt_ts(patch.last_outbound_at),
            last_inbound_at: opt_ts(patch.last_inbound_at),
            consent_id: patch.consent_id,
        }
    }
}

/// Insert a lead unless its id already exists. Returns `true` if inserted.
pub async fn insert_lead_if_absent(db: &Database, lead: &Lead) -> Result<bool, LeadflowError> {
    let lead = lead.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO leads ({LEAD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                params![
                    lead.id,
                    lead.client_id,
                    lead.phone,
                    lead.name,
                    lead.state_code,
                    lead.state.to_string(),
                    lead.previous_state.map(|s| s.to_string()),
                    lead.cold_outreach_count,
                    opt_ts(lead.next_followup_at),
                    opt_ts(lead.last_outbound_at),
                    opt_ts(lead.last_inbound_at),
                    lead.consent_id,
                    lead.is_emergency,
                    lead.archived,
                    ts(lead.created_at),
                    ts(lead.updated_at),
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_lead(db: &Database, id: &str) -> Result<Option<Lead>, LeadflowError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id],
                row_to_lead,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Guarded state write. Returns `false` without writing if the lead is not in `from`.
pub async fn transition_lead(
    db: &Database,
    id: &str,
    from: LeadState,
    to: LeadState,
    patch: &LeadPatch,
    event: &AuditEvent,
    now: DateTime<Utc>,
) -> Result<bool, LeadflowError> {
    let id = id.to_string();
    let patch = PatchParams::from(patch);
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                &format!(
                    "UPDATE leads SET state = :to, previous_state = :from, updated_at = :now, \
                     {PATCH_ASSIGNMENTS} WHERE id = :id AND state = :from"
                ),
                named_params! {
                    ":to": to.to_string(),
                    ":from": from.to_string(),
                    ":now": ts(now),
                    ":id": id,
                    ":cold_outreach_count": patch.cold_outreach_count,
                    ":set_followup": patch.set_followup,
                    ":next_followup_at": patch.next_followup_at,
                    ":last_outbound_at": patch.last_outbound_at,
                    ":last_inbound_at": patch.last_inbound_at,
                    ":consent_id": patch.consent_id,
                },
            )?;
            if updated == 0 {
                return Ok(false);
            }
            insert_event(&tx, &event)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a patch without changing state or `updated_at`.
pub async fn patch_lead(db: &Database, id: &str, patch: &LeadPatch) -> Result<(), LeadflowError> {
    let id = id.to_string();
    let patch = PatchParams::from(patch);
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!("UPDATE leads SET {PATCH_ASSIGNMENTS} WHERE id = :id"),
                named_params! {
                    ":id": id,
                    ":cold_outreach_count": patch.cold_outreach_count,
                    ":set_followup": patch.set_followup,
                    ":next_followup_at": patch.next_followup_at,
                    ":last_outbound_at": patch.last_outbound_at,
                    ":last_inbound_at": patch.last_inbound_at,
                    ":consent_id": patch.consent_id,
                },
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Non-archived leads in `state` with no state change or message since
/// `cutoff`, least recently active first. A lead with a follow-up scheduled
/// is waiting, not stalled.
pub async fn find_stalled_leads(
    db: &Database,
    state: LeadState,
    cutoff: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Lead>, LeadflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LEAD_COLUMNS} FROM leads
                 WHERE state = ?1 AND archived = 0 AND next_followup_at IS NULL
                   AND {LAST_ACTIVITY_SQL} < ?2
                 ORDER BY {LAST_ACTIVITY_SQL} ASC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(
                params![state.to_string(), ts(cutoff), limit as i64],
                row_to_lead,
            )?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active leads whose follow-up time has arrived, earliest first.
pub async fn find_due_followups(
    db: &Database,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<Lead>, LeadflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LEAD_COLUMNS} FROM leads
                 WHERE state NOT IN {TERMINAL_STATES_SQL} AND archived = 0
                   AND next_followup_at IS NOT NULL AND next_followup_at <= ?1
                 ORDER BY next_followup_at ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![ts(now), limit as i64], row_to_lead)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flag terminal leads untouched since `cutoff` as archived and audit each one.
pub async fn archive_terminal_leads(
    db: &Database,
    cutoff: DateTime<Utc>,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<String>, LeadflowError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let candidates: Vec<(String, LeadState)> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT id, state FROM leads
                     WHERE state IN {TERMINAL_STATES_SQL} AND archived = 0 AND updated_at < ?1
                     ORDER BY updated_at ASC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![ts(cutoff), limit as i64], |row| {
                    Ok((row.get(0)?, get_enum(row, 1)?))
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let mut archived = Vec::with_capacity(candidates.len());
            for (id, state) in candidates {
                tx.execute("UPDATE leads SET archived = 1 WHERE id = ?1", params![id])?;
                let event = AuditEvent::new(
                    id.clone(),
                    AuditEventType::Archived,
                    "retention window elapsed",
                    now,
                )
                .with_detail(serde_json::json!({ "state": state }));
                insert_event(&tx, &event)?;
                archived.push(id);
            }
            tx.commit()?;
            Ok(archived)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::events::list_events;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("leads.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap()
    }

    fn lead(id: &str) -> Lead {
        let mut lead = Lead::new(id, "client-a", "+15550100", t0());
        lead.state_code = Some("TX".into());
        lead
    }

    #[tokio::test]
    async fn insert_is_idempotent_by_id() {
        let (db, _dir) = setup_db().await;
        assert!(insert_lead_if_absent(&db, &lead("l1")).await.unwrap());
        assert!(!insert_lead_if_absent(&db, &lead("l1")).await.unwrap());

        let stored = get_lead(&db, "l1").await.unwrap().unwrap();
        assert_eq!(stored, lead("l1"));
        assert!(get_lead(&db, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transition_applies_patch_and_audit_together() {
        let (db, _dir) = setup_db().await;
        insert_lead_if_absent(&db, &lead("l1")).await.unwrap();

        let later = t0() + Duration::minutes(1);
        let patch = LeadPatch {
            last_outbound_at: Some(later),
            ..Default::default()
        };
        let event = AuditEvent::new("l1", AuditEventType::Transition, "intake", later)
            .with_states(LeadState::New, LeadState::IntakeSent);
        let moved = transition_lead(
            &db,
            "l1",
            LeadState::New,
            LeadState::IntakeSent,
            &patch,
            &event,
            later,
        )
        .await
        .unwrap();
        assert!(moved);

        let stored = get_lead(&db, "l1").await.unwrap().unwrap();
        assert_eq!(stored.state, LeadState::IntakeSent);
        assert_eq!(stored.previous_state, Some(LeadState::New));
        assert_eq!(stored.last_outbound_at, Some(later));
        assert_eq!(stored.updated_at, later);
        assert_eq!(list_events(&db, "l1").await.unwrap(), vec![event]);
    }

    #[tokio::test]
    async fn stale_transition_writes_nothing() {
        let (db, _dir) = setup_db().await;
        insert_lead_if_absent(&db, &lead("l1")).await.unwrap();

        let event = AuditEvent::new("l1", AuditEventType::Transition, "stale", t0())
            .with_states(LeadState::Qualifying, LeadState::Cold);
        let moved = transition_lead(
            &db,
            "l1",
            LeadState::Qualifying,
            LeadState::Cold,
            &LeadPatch::default(),
            &event,
            t0(),
        )
        .await
        .unwrap();
        assert!(!moved);
        assert_eq!(get_lead(&db, "l1").await.unwrap().unwrap().state, LeadState::New);
        assert!(list_events(&db, "l1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn patch_can_clear_followup() {
        let (db, _dir) = setup_db().await;
        let mut cold = lead("l1");
        cold.state = LeadState::Cold;
        cold.next_followup_at = Some(t0());
        insert_lead_if_absent(&db, &cold).await.unwrap();

        patch_lead(
            &db,
            "l1",
            &LeadPatch {
                cold_outreach_count: Some(2),
                next_followup_at: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let stored = get_lead(&db, "l1").await.unwrap().unwrap();
        assert_eq!(stored.cold_outreach_count, 2);
        assert_eq!(stored.next_followup_at, None);
        assert_eq!(stored.updated_at, t0());
    }

    #[tokio::test]
    async fn stalled_and_due_queries_respect_cutoffs() {
        let (db, _dir) = setup_db().await;
        let mut stuck = lead("stuck");
        stuck.state = LeadState::IntakeSent;
        let mut fresh = lead("fresh");
        fresh.state = LeadState::IntakeSent;
        fresh.updated_at = t0() + Duration::minutes(40);
        let mut cold = lead("cold");
        cold.state = LeadState::Cold;
        cold.next_followup_at = Some(t0() + Duration::days(7));
        for l in [&stuck, &fresh, &cold] {
            insert_lead_if_absent(&db, l).await.unwrap();
        }

        let cutoff = t0() + Duration::minutes(30);
        let stalled = find_stalled_leads(&db, LeadState::IntakeSent, cutoff, 50)
            .await
            .unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].id, "stuck");

        assert!(find_due_followups(&db, t0(), 10).await.unwrap().is_empty());
        let due = find_due_followups(&db, t0() + Duration::days(7), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "cold");
    }

    #[tokio::test]
    async fn recent_messages_keep_a_lead_off_the_stalled_list() {
        let (db, _dir) = setup_db().await;
        let mut chatting = lead("chatting");
        chatting.state = LeadState::Qualifying;
        chatting.last_inbound_at = Some(t0() + Duration::minutes(50));
        let mut answered = lead("answered");
        answered.state = LeadState::Qualifying;
        answered.last_outbound_at = Some(t0() + Duration::minutes(45));
        let mut quiet = lead("quiet");
        quiet.state = LeadState::Qualifying;
        let mut waiting = lead("waiting");
        waiting.state = LeadState::Qualifying;
        waiting.next_followup_at = Some(t0() + Duration::hours(10));
        for l in [&chatting, &answered, &quiet, &waiting] {
            insert_lead_if_absent(&db, l).await.unwrap();
        }

        let cutoff = t0() + Duration::minutes(40);
        let stalled = find_stalled_leads(&db, LeadState::Qualifying, cutoff, 50)
            .await
            .unwrap();
        let ids: Vec<_> = stalled.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["quiet"]);
        assert_eq!(chatting.last_activity_at(), t0() + Duration::minutes(50));
    }

    #[tokio::test]
    async fn due_followups_include_deferred_active_leads_but_not_terminal_ones() {
        let (db, _dir) = setup_db().await;
        let mut deferred = lead("deferred");
        deferred.next_followup_at = Some(t0() + Duration::hours(1));
        let mut gone = lead("gone");
        gone.state = LeadState::OptedOut;
        gone.next_followup_at = Some(t0());
        for l in [&deferred, &gone] {
            insert_lead_if_absent(&db, l).await.unwrap();
        }

        let due = find_due_followups(&db, t0() + Duration::hours(2), 10)
            .await
            .unwrap();
        let ids: Vec<_> = due.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["deferred"]);
    }

    #[tokio::test]
    async fn archive_only_touches_old_terminal_leads() {
        let (db, _dir) = setup_db().await;
        let mut done = lead("done");
        done.state = LeadState::Completed;
        let mut active = lead("active");
        active.state = LeadState::Qualifying;
        insert_lead_if_absent(&db, &done).await.unwrap();
        insert_lead_if_absent(&db, &active).await.unwrap();

        let now = t0() + Duration::days(91);
        let cutoff = now - Duration::days(90);
        let archived = archive_terminal_leads(&db, cutoff, 100, now).await.unwrap();
        assert_eq!(archived, vec!["done".to_string()]);

        let stored = get_lead(&db, "done").await.unwrap().unwrap();
        assert!(stored.archived);
        assert_eq!(stored.state, LeadState::Completed);
        assert!(!get_lead(&db, "active").await.unwrap().unwrap().archived);

        let events = list_events(&db, "done").await.unwrap();
        assert_eq!(events[0].event_type, AuditEventType::Archived);

        // Second pass finds nothing new.
        assert!(archive_terminal_leads(&db, cutoff, 100, now).await.unwrap().is_empty());
    }
}
