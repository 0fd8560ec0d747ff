// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coordination store in a dedicated SQLite file.
//!
//! Shared by every worker process on one host. Each primitive is one
//! statement or one short transaction on the single tokio-rusqlite writer
//! thread, which gives the atomicity the trait requires. Expiry is wall-clock
//! milliseconds; expired rows are ignored on read, and every
//! [`PURGE_EVERY`]th write deletes all of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use leadflow_core::{CoordinationStore, LeadflowError};

use crate::PURGE_EVERY;

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA busy_timeout = 2000;
    CREATE TABLE IF NOT EXISTS coord_kv (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS coord_lists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        list TEXT NOT NULL,
        value TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_coord_lists_list ON coord_lists(list, id);
";

/// SQLite-backed [`CoordinationStore`].
pub struct SqliteCoordinationStore {
    conn: tokio_rusqlite::Connection,
    writes: AtomicU64,
}

fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> LeadflowError {
    LeadflowError::Coordination {
        message: e.to_string(),
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn expiry_ms(ttl: Duration) -> i64 {
    now_ms().saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64)
}

fn delete_expired(conn: &rusqlite::Connection, now: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM coord_kv WHERE expires_at <= ?1", params![now])
}

impl SqliteCoordinationStore {
    /// Open (creating if needed) the coordination database at `path`.
    pub async fn open(path: &str) -> Result<Self, LeadflowError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| LeadflowError::Coordination {
                message: e.to_string(),
            })?;
        conn.call(|conn| conn.execute_batch(SCHEMA))
            .await
            .map_err(map_tr_err)?;
        debug!(path, "coordination store opened");
        Ok(Self {
            conn,
            writes: AtomicU64::new(0),
        })
    }

    fn purge_due(&self) -> bool {
        (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY == 0
    }

    /// Deletes every expired key now. Returns how many rows went.
    pub async fn purge_expired(&self) -> Result<usize, LeadflowError> {
        let purged = self
            .conn
            .call(|conn| delete_expired(conn, now_ms()))
            .await
            .map_err(map_tr_err)?;
        if purged > 0 {
            debug!(purged, "expired coordination keys deleted");
        }
        Ok(purged)
    }
}

#[async_trait]
impl CoordinationStore for SqliteCoordinationStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeadflowError> {
        let key = key.to_string();
        let value = value.to_string();
        let purge = self.purge_due();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let now = now_ms();
                if purge {
                    delete_expired(&tx, now)?;
                }
                tx.execute(
                    "DELETE FROM coord_kv WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )?;
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO coord_kv (key, value, expires_at) VALUES (?1, ?2, ?3)",
                    params![key, value, expiry_ms(ttl)],
                )?;
                tx.commit()?;
                Ok(inserted > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LeadflowError> {
        let key = key.to_string();
        let expected = expected.to_string();
        self.conn
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM coord_kv WHERE key = ?1 AND value = ?2 AND expires_at > ?3",
                    params![key, expected, now_ms()],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LeadflowError> {
        let key = key.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT value FROM coord_kv WHERE key = ?1 AND expires_at > ?2",
                    params![key, now_ms()],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LeadflowError> {
        let key = key.to_string();
        let value = value.to_string();
        let purge = self.purge_due();
        self.conn
            .call(move |conn| {
                if purge {
                    delete_expired(conn, now_ms())?;
                }
                conn.execute(
                    "INSERT INTO coord_kv (key, value, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT (key) DO UPDATE SET value = excluded.value,
                                                     expires_at = excluded.expires_at",
                    params![key, value, expiry_ms(ttl)],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, LeadflowError> {
        let key = key.to_string();
        let purge = self.purge_due();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let now = now_ms();
                if purge {
                    delete_expired(&tx, now)?;
                }
                tx.execute(
                    "DELETE FROM coord_kv WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )?;
                let value: String = tx.query_row(
                    "INSERT INTO coord_kv (key, value, expires_at) VALUES (?1, '1', ?2)
                     ON CONFLICT (key) DO UPDATE
                       SET value = CAST(CAST(coord_kv.value AS INTEGER) + 1 AS TEXT)
                     RETURNING value",
                    params![key, expiry_ms(ttl)],
                    |row| row.get(0),
                )?;
                tx.commit()?;
                Ok(value)
            })
            .await
            .map_err(map_tr_err)?
            .parse::<i64>()
            .map_err(|e| LeadflowError::Coordination {
                message: format!("counter is not an integer: {e}"),
            })
    }

    async fn push_bounded(
        &self,
        list: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), LeadflowError> {
        let list = list.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO coord_lists (list, value) VALUES (?1, ?2)",
                    params![list, value],
                )?;
                tx.execute(
                    "DELETE FROM coord_lists WHERE list = ?1 AND id NOT IN (
                       SELECT id FROM coord_lists WHERE list = ?1 ORDER BY id DESC LIMIT ?2
                     )",
                    params![list, max_len as i64],
                )?;
                tx.commit()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn drain(&self, list: &str) -> Result<Vec<String>, LeadflowError> {
        let list = list.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let values = {
                    let mut stmt = tx
                        .prepare("SELECT value FROM coord_lists WHERE list = ?1 ORDER BY id ASC")?;
                    let rows = stmt.query_map(params![list], |row| row.get::<_, String>(0))?;
                    rows.collect::<Result<Vec<_>, _>>()?
                };
                tx.execute("DELETE FROM coord_lists WHERE list = ?1", params![list])?;
                tx.commit()?;
                Ok(values)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_store() -> (SqliteCoordinationStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coord.db");
        let store = SqliteCoordinationStore::open(path.to_str().unwrap())
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn set_if_absent_is_exclusive_until_expiry() {
        let (store, _dir) = open_store().await;
        assert!(store.set_if_absent("lock:lead:1", "a", Duration::from_millis(50)).await.unwrap());
        assert!(!store.set_if_absent("lock:lead:1", "b", Duration::from_secs(30)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.set_if_absent("lock:lead:1", "b", Duration::from_secs(30)).await.unwrap());
        assert_eq!(store.get("lock:lead:1").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn compare_and_delete_never_removes_another_owner() {
        let (store, _dir) = open_store().await;
        store.set("k", "new-owner", Duration::from_secs(30)).await.unwrap();
        assert!(!store.compare_and_delete("k", "old-owner").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new-owner"));
        assert!(store.compare_and_delete("k", "new-owner").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_counts_within_window() {
        let (store, _dir) = open_store().await;
        let ttl = Duration::from_secs(60);
        assert_eq!(store.incr("compliance_denials:l1", ttl).await.unwrap(), 1);
        assert_eq!(store.incr("compliance_denials:l1", ttl).await.unwrap(), 2);
        assert_eq!(store.incr("compliance_denials:l2", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_rows_are_deleted_by_explicit_and_periodic_purges() {
        let (store, _dir) = open_store().await;
        for i in 0..4 {
            store
                .set(&format!("alert_cooldown:x:{i}"), "1", Duration::from_millis(20))
                .await
                .unwrap();
        }
        store.set("keep", "1", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 4);
        assert_eq!(store.get("keep").await.unwrap().as_deref(), Some("1"));

        for i in 0..4 {
            store
                .incr(&format!("compliance_denials:{i}"), Duration::from_millis(20))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
        for _ in 0..PURGE_EVERY {
            store.set("keep", "1", Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lists_are_bounded_and_drained_once() {
        let (store, _dir) = open_store().await;
        for v in ["a", "b", "c"] {
            store.push_bounded("events:retry", v, 2).await.unwrap();
        }
        assert_eq!(store.drain("events:retry").await.unwrap(), vec!["b", "c"]);
        assert!(store.drain("events:retry").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_handles_share_one_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let first = SqliteCoordinationStore::open(path.to_str().unwrap()).await.unwrap();
        let second = SqliteCoordinationStore::open(path.to_str().unwrap()).await.unwrap();

        assert!(first.set_if_absent("lock:lead:9", "w1", Duration::from_secs(30)).await.unwrap());
        assert!(!second.set_if_absent("lock:lead:9", "w2", Duration::from_secs(30)).await.unwrap());
    }
}
