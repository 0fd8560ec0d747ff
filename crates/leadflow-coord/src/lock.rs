// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-lead mutual exclusion over the coordination store.
//!
//! A lock is a random owner token written with set-if-absent and a TTL at
//! `lock:lead:<id>`. Release is a single compare-and-delete, so a holder whose
//! lock already expired (and was re-acquired by someone else) can never
//! delete the new owner's lock.
//!
//! When the store is unreachable the manager fails open: the body runs
//! without exclusivity and a warning is logged. Lead state writes are
//! compare-and-set on the expected source state, so interleaving in that
//! mode degrades to no-op writes instead of corruption.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use leadflow_config::model::LockConfig;
use leadflow_core::{CoordinationStore, LeadflowError};

/// Random owner token proving lock ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisitionResult {
    /// The lock is held under this token and must be released with it.
    Held(LockToken),
    /// The coordination store is unavailable; proceed without exclusivity.
    Degraded,
    /// Another holder kept the lock for the whole wait budget.
    TimedOut,
}

/// Lock timing for one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// How long the lock lives if never released. Must exceed the body's runtime.
    pub ttl: Duration,
    /// Total time to keep polling a contended lock.
    pub wait: Duration,
    pub poll: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            wait: Duration::from_secs(5),
            poll: Duration::from_millis(100),
        }
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            ttl: config.ttl(),
            wait: config.wait(),
            poll: config.poll(),
        }
    }
}

/// Acquires and releases per-lead locks.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn CoordinationStore>,
    options: LockOptions,
}

impl LockManager {
    pub fn new(store: Arc<dyn CoordinationStore>, options: LockOptions) -> Self {
        Self { store, options }
    }

    /// Coordination key guarding `lead_id`.
    pub fn key(lead_id: &str) -> String {
        format!("lock:lead:{lead_id}")
    }

    pub fn options(&self) -> LockOptions {
        self.options
    }

    /// Try to take the lock for `lead_id`, polling until the wait budget runs out.
    pub async fn acquire(&self, lead_id: &str) -> LockAcquisitionResult {
        self.acquire_with(lead_id, self.options).await
    }

    pub async fn acquire_with(&self, lead_id: &str, options: LockOptions) -> LockAcquisitionResult {
        let key = Self::key(lead_id);
        let token = LockToken::generate();
        let deadline = Instant::now() + options.wait;

        loop {
            match self
                .store
                .set_if_absent(&key, token.as_str(), options.ttl)
                .await
            {
                Ok(true) => {
                    debug!(lead_id, "lead lock acquired");
                    return LockAcquisitionResult::Held(token);
                }
                Ok(false) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!(
                            lead_id,
                            waited_ms = options.wait.as_millis() as u64,
                            "lead lock wait budget exhausted"
                        );
                        return LockAcquisitionResult::TimedOut;
                    }
                    tokio::time::sleep(options.poll.min(deadline - now)).await;
                }
                Err(e) => {
                    warn!(
                        lead_id,
                        error = %e,
                        "coordination store unavailable, proceeding without lead lock"
                    );
                    return LockAcquisitionResult::Degraded;
                }
            }
        }
    }

    /// Release a held lock. Returns `false` if the lock had already expired or
    /// changed hands; the other holder's lock is left untouched.
    pub async fn release(&self, lead_id: &str, token: &LockToken) -> bool {
        match self
            .store
            .compare_and_delete(&Self::key(lead_id), token.as_str())
            .await
        {
            Ok(true) => {
                debug!(lead_id, "lead lock released");
                true
            }
            Ok(false) => {
                warn!(lead_id, "lead lock expired before release");
                false
            }
            Err(e) => {
                warn!(lead_id, error = %e, "failed to release lead lock, leaving it to expire");
                false
            }
        }
    }

    /// Run `body` while holding exclusivity on `lead_id`.
    ///
    /// Returns [`LeadflowError::LockTimeout`] without running `body` if the
    /// lock stays contended for the whole wait budget.
    pub async fn with_lead_lock<F, T>(&self, lead_id: &str, body: F) -> Result<T, LeadflowError>
    where
        F: Future<Output = Result<T, LeadflowError>>,
    {
        self.with_lead_lock_opts(lead_id, self.options, body).await
    }

    pub async fn with_lead_lock_opts<F, T>(
        &self,
        lead_id: &str,
        options: LockOptions,
        body: F,
    ) -> Result<T, LeadflowError>
    where
        F: Future<Output = Result<T, LeadflowError>>,
    {
        match self.acquire_with(lead_id, options).await {
            LockAcquisitionResult::Held(token) => {
                let result = body.await;
                self.release(lead_id, &token).await;
                result
            }
            LockAcquisitionResult::Degraded => body.await,
            LockAcquisitionResult::TimedOut => Err(LeadflowError::LockTimeout {
                lead_id: lead_id.to_string(),
                waited: options.wait,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::memory::MemoryCoordinationStore;

    /// A store that is always unreachable.
    struct DownStore;

    #[async_trait]
    impl CoordinationStore for DownStore {
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, LeadflowError> {
            Err(LeadflowError::Coordination { message: "connection refused".into() })
        }
        async fn compare_and_delete(&self, _: &str, _: &str) -> Result<bool, LeadflowError> {
            Err(LeadflowError::Coordination { message: "connection refused".into() })
        }
        async fn get(&self, _: &str) -> Result<Option<String>, LeadflowError> {
            Err(LeadflowError::Coordination { message: "connection refused".into() })
        }
        async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), LeadflowError> {
            Err(LeadflowError::Coordination { message: "connection refused".into() })
        }
        async fn incr(&self, _: &str, _: Duration) -> Result<i64, LeadflowError> {
            Err(LeadflowError::Coordination { message: "connection refused".into() })
        }
        async fn push_bounded(&self, _: &str, _: &str, _: usize) -> Result<(), LeadflowError> {
            Err(LeadflowError::Coordination { message: "connection refused".into() })
        }
        async fn drain(&self, _: &str) -> Result<Vec<String>, LeadflowError> {
            Err(LeadflowError::Coordination { message: "connection refused".into() })
        }
    }

    fn manager() -> LockManager {
        LockManager::new(Arc::new(MemoryCoordinationStore::new()), LockOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquirer_times_out_while_held() {
        let locks = manager();
        let LockAcquisitionResult::Held(_token) = locks.acquire("lead-1").await else {
            panic!("first acquisition should succeed");
        };

        let started = Instant::now();
        assert_eq!(locks.acquire("lead-1").await, LockAcquisitionResult::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(5));

        // Other leads are unaffected.
        assert!(matches!(locks.acquire("lead-2").await, LockAcquisitionResult::Held(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_gets_lock_once_holder_releases() {
        let locks = manager();
        let LockAcquisitionResult::Held(token) = locks.acquire("lead-1").await else {
            panic!("first acquisition should succeed");
        };

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("lead-1").await })
        };
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(locks.release("lead-1", &token).await);

        assert!(matches!(waiter.await.unwrap(), LockAcquisitionResult::Held(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_holder_cannot_release_new_owners_lock() {
        let locks = manager();
        let LockAcquisitionResult::Held(stale) = locks.acquire("lead-1").await else {
            panic!("first acquisition should succeed");
        };

        tokio::time::advance(Duration::from_secs(31)).await;
        let LockAcquisitionResult::Held(fresh) = locks.acquire("lead-1").await else {
            panic!("lock should be free after TTL");
        };

        assert!(!locks.release("lead-1", &stale).await);
        // The new owner still holds it.
        let no_wait = LockOptions {
            wait: Duration::ZERO,
            ..LockOptions::default()
        };
        assert_eq!(
            locks.acquire_with("lead-1", no_wait).await,
            LockAcquisitionResult::TimedOut
        );
        assert!(locks.release("lead-1", &fresh).await);
    }

    #[tokio::test(start_paused = true)]
    async fn with_lead_lock_serializes_bodies_on_one_lead() {
        let locks = manager();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                locks
                    .with_lead_lock("lead-1", async {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn with_lead_lock_returns_typed_timeout() {
        let locks = manager();
        let _held = locks.acquire("lead-1").await;

        let ran = AtomicUsize::new(0);
        let err = locks
            .with_lead_lock("lead-1", async {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_lock_timeout());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn unreachable_store_fails_open() {
        let locks = LockManager::new(Arc::new(DownStore), LockOptions::default());
        assert_eq!(locks.acquire("lead-1").await, LockAcquisitionResult::Degraded);

        let value = locks.with_lead_lock("lead-1", async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert!(logs_contain("proceeding without lead lock"));
    }

    #[test]
    fn key_format() {
        assert_eq!(LockManager::key("c1:+15550100"), "lock:lead:c1:+15550100");
    }
}
