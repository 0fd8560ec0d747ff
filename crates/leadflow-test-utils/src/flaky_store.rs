// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coordination store that can be switched off to exercise degraded mode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use leadflow_coord::MemoryCoordinationStore;
use leadflow_core::{CoordinationStore, LeadflowError};

/// Wraps a [`MemoryCoordinationStore`]; while down, every call fails.
#[derive(Debug, Default)]
pub struct FlakyCoordinationStore {
    inner: MemoryCoordinationStore,
    down: AtomicBool,
}

impl FlakyCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), LeadflowError> {
        if self.down.load(Ordering::SeqCst) {
            Err(LeadflowError::Coordination {
                message: "connection refused".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CoordinationStore for FlakyCoordinationStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeadflowError> {
        self.check()?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, LeadflowError> {
        self.check()?;
        self.inner.compare_and_delete(key, expected).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LeadflowError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LeadflowError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, LeadflowError> {
        self.check()?;
        self.inner.incr(key, ttl).await
    }

    async fn push_bounded(
        &self,
        list: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), LeadflowError> {
        self.check()?;
        self.inner.push_bounded(list, value, max_len).await
    }

    async fn drain(&self, list: &str) -> Result<Vec<String>, LeadflowError> {
        self.check()?;
        self.inner.drain(list).await
    }
}
