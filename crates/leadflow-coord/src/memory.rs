// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process coordination store.
//!
//! Suitable for single-process deployments and tests only: nothing is shared
//! across process boundaries and everything is lost on exit. Expiry uses
//! `tokio::time::Instant` so paused-clock tests can advance TTLs. Expired
//! entries are dropped on every [`PURGE_EVERY`]th write.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use leadflow_core::{CoordinationStore, LeadflowError};

use crate::PURGE_EVERY;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    lists: HashMap<String, VecDeque<String>>,
}

impl State {
    fn live(&self, key: &str, now: Instant) -> Option<&Entry> {
        self.values.get(key).filter(|e| e.is_live(now))
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.values.len();
        self.values.retain(|_, e| e.is_live(now));
        before - self.values.len()
    }
}

/// `Mutex<HashMap>`-backed [`CoordinationStore`].
#[derive(Debug, Default)]
pub struct MemoryCoordinationStore {
    state: Mutex<State>,
    writes: AtomicU64,
}

fn poison_err<T>(_: PoisonError<T>) -> LeadflowError {
    LeadflowError::Coordination {
        message: "memory store lock poisoned".to_string(),
    }
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, LeadflowError> {
        self.state.lock().map_err(poison_err)
    }

    /// Locks the state for a write, dropping expired keys when a sweep is due.
    fn state_for_write(&self, now: Instant) -> Result<MutexGuard<'_, State>, LeadflowError> {
        let mut state = self.state()?;
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY == 0 {
            state.purge_expired(now);
        }
        Ok(state)
    }

    /// Drops every expired key now. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, LeadflowError> {
        Ok(self.state()?.purge_expired(Instant::now()))
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeadflowError> {
        let now = Instant::now();
        let mut state = self.state_for_write(now)?;
        if state.live(key, now).is_some() {
            return Ok(false);
        }
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LeadflowError> {
        let mut state = self.state()?;
        let matches = state
            .live(key, Instant::now())
            .is_some_and(|e| e.value == expected);
        if matches {
            state.values.remove(key);
        }
        Ok(matches)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LeadflowError> {
        let state = self.state()?;
        Ok(state.live(key, Instant::now()).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LeadflowError> {
        let now = Instant::now();
        let mut state = self.state_for_write(now)?;
        state.values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, LeadflowError> {
        let now = Instant::now();
        let mut state = self.state_for_write(now)?;
        let (current, expires_at) = match state.live(key, now) {
            Some(entry) => {
                let n = entry.value.parse::<i64>().map_err(|_| LeadflowError::Coordination {
                    message: format!("key {key} does not hold an integer"),
                })?;
                (n, entry.expires_at)
            }
            None => (0, now + ttl),
        };
        let next = current + 1;
        state.values.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn push_bounded(
        &self,
        list: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), LeadflowError> {
        let mut state = self.state()?;
        let entries = state.lists.entry(list.to_string()).or_default();
        entries.push_back(value.to_string());
        while entries.len() > max_len {
            entries.pop_front();
        }
        Ok(())
    }

    async fn drain(&self, list: &str) -> Result<Vec<String>, LeadflowError> {
        let mut state = self.state()?;
        Ok(state
            .lists
            .remove(list)
            .map(Vec::from)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_respects_ttl() {
        let store = MemoryCoordinationStore::new();
        assert!(store.set_if_absent("k", "a", Duration::from_secs(30)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_secs(30)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "b", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn compare_and_delete_only_matches_owner() {
        let store = MemoryCoordinationStore::new();
        store.set("k", "owner", Duration::from_secs(30)).await.unwrap();
        assert!(!store.compare_and_delete("k", "intruder").await.unwrap());
        assert!(store.compare_and_delete("k", "owner").await.unwrap());
        assert!(!store.compare_and_delete("k", "owner").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn incr_keeps_window_from_first_increment() {
        let store = MemoryCoordinationStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(store.incr("c", ttl).await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_are_purged() {
        let store = MemoryCoordinationStore::new();
        for i in 0..5 {
            store
                .set(&format!("alert_cooldown:x:{i}"), "1", Duration::from_secs(10))
                .await
                .unwrap();
        }
        store.set("keep", "1", Duration::from_secs(600)).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.purge_expired().unwrap(), 5);
        assert_eq!(store.purge_expired().unwrap(), 0);
        assert_eq!(store.get("keep").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn ordinary_writes_sweep_expired_keys() {
        let store = MemoryCoordinationStore::new();
        for i in 0..5 {
            store
                .incr(&format!("compliance_denials:{i}"), Duration::from_secs(10))
                .await
                .unwrap();
        }
        tokio::time::advance(Duration::from_secs(11)).await;

        for _ in 0..PURGE_EVERY {
            store
                .set_if_absent("lock:lead:1", "w", Duration::from_secs(600))
                .await
                .unwrap();
        }

        assert_eq!(store.purge_expired().unwrap(), 0);
        assert_eq!(store.get("lock:lead:1").await.unwrap().as_deref(), Some("w"));
    }

    #[tokio::test]
    async fn bounded_list_drops_oldest_and_drains_in_order() {
        let store = MemoryCoordinationStore::new();
        for v in ["1", "2", "3", "4"] {
            store.push_bounded("events:w", v, 3).await.unwrap();
        }
        assert_eq!(store.drain("events:w").await.unwrap(), vec!["2", "3", "4"]);
        assert!(store.drain("events:w").await.unwrap().is_empty());
    }
}
