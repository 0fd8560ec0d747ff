// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use leadflow_config::model::StorageConfig;
use leadflow_core::types::{
    AuditEvent, ConsentRecord, ConsentType, DlqStatus, FailedLead, Lead, LeadPatch, LeadState,
    QueueEntry,
};
use leadflow_core::{HealthStatus, LeadflowError, StorageAdapter};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules. The
/// database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage. Nothing is opened until `initialize`.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, LeadflowError> {
        self.db.get().ok_or_else(|| LeadflowError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self) -> Result<(), LeadflowError> {
        self.database()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(crate::database::map_tr_err)
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), LeadflowError> {
        let db = Database::open_with_options(&self.config.database_path, self.config.wal_mode)
            .await?;
        self.db.set(db).map_err(|_| LeadflowError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), LeadflowError> {
        self.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadflowError> {
        let db = self.database()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    // --- Leads ---

    async fn insert_lead_if_absent(&self, lead: &Lead) -> Result<bool, LeadflowError> {
        queries::leads::insert_lead_if_absent(self.database()?, lead).await
    }

    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, LeadflowError> {
        queries::leads::get_lead(self.database()?, id).await
    }

    async fn transition_lead(
        &self,
        id: &str,
        from: LeadState,
        to: LeadState,
        patch: &LeadPatch,
        event: &AuditEvent,
        now: DateTime<Utc>,
    ) -> Result<bool, LeadflowError> {
        queries::leads::transition_lead(self.database()?, id, from, to, patch, event, now).await
    }

    async fn patch_lead(&self, id: &str, patch: &LeadPatch) -> Result<(), LeadflowError> {
        queries::leads::patch_lead(self.database()?, id, patch).await
    }

    async fn find_stalled_leads(
        &self,
        state: LeadState,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Lead>, LeadflowError> {
        queries::leads::find_stalled_leads(self.database()?, state, cutoff, limit).await
    }

    async fn find_due_followups(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Lead>, LeadflowError> {
        queries::leads::find_due_followups(self.database()?, now, limit).await
    }

    async fn archive_terminal_leads(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, LeadflowError> {
        queries::leads::archive_terminal_leads(self.database()?, cutoff, limit, now).await
    }

    // --- Consent ---

    async fn record_consent(
        &self,
        phone: &str,
        client_id: &str,
        consent_type: ConsentType,
        now: DateTime<Utc>,
    ) -> Result<ConsentRecord, LeadflowError> {
        queries::consent::record_consent(self.database()?, phone, client_id, consent_type, now)
            .await
    }

    async fn get_consent(
        &self,
        phone: &str,
        client_id: &str,
    ) -> Result<Option<ConsentRecord>, LeadflowError> {
        queries::consent::get_consent(self.database()?, phone, client_id).await
    }

    async fn record_opt_out(
        &self,
        phone: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsentRecord, LeadflowError> {
        queries::consent::record_opt_out(self.database()?, phone, client_id, now).await
    }

    // --- Audit trail ---

    async fn record_event(&self, event: &AuditEvent) -> Result<(), LeadflowError> {
        queries::events::record_event(self.database()?, event).await
    }

    async fn list_events(&self, lead_id: &str) -> Result<Vec<AuditEvent>, LeadflowError> {
        queries::events::list_events(self.database()?, lead_id).await
    }

    // --- Dead-letter queue ---

    async fn insert_failed_lead(&self, entry: &FailedLead) -> Result<(), LeadflowError> {
        queries::failed_leads::insert_failed_lead(self.database()?, entry).await
    }

    async fn get_failed_lead(&self, id: &str) -> Result<Option<FailedLead>, LeadflowError> {
        queries::failed_leads::get_failed_lead(self.database()?, id).await
    }

    async fn claim_due_failed_leads(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FailedLead>, LeadflowError> {
        queries::failed_leads::claim_due_failed_leads(self.database()?, now, lease_until, limit)
            .await
    }

    async fn update_failed_lead(&self, entry: &FailedLead) -> Result<bool, LeadflowError> {
        queries::failed_leads::update_failed_lead(self.database()?, entry).await
    }

    async fn resolve_failed_lead(
        &self,
        id: &str,
        resolved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, LeadflowError> {
        queries::failed_leads::resolve_failed_lead(self.database()?, id, resolved_by, now).await
    }

    async fn requeue_failed_lead(&self, id: &str, now: DateTime<Utc>) -> Result<bool, LeadflowError> {
        queries::failed_leads::requeue_failed_lead(self.database()?, id, now).await
    }

    async fn list_failed_leads(
        &self,
        status: Option<DlqStatus>,
        limit: usize,
    ) -> Result<Vec<FailedLead>, LeadflowError> {
        queries::failed_leads::list_failed_leads(self.database()?, status, limit).await
    }

    async fn count_failed_leads(&self) -> Result<Vec<(DlqStatus, i64)>, LeadflowError> {
        queries::failed_leads::count_failed_leads(self.database()?).await
    }

    // --- Inbound event queue ---

    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, LeadflowError> {
        queries::queue::enqueue(self.database()?, queue_name, payload).await
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, LeadflowError> {
        queries::queue::dequeue(self.database()?, queue_name).await
    }

    async fn ack(&self, id: i64) -> Result<(), LeadflowError> {
        queries::queue::ack(self.database()?, id).await
    }

    async fn fail(&self, id: i64) -> Result<(), LeadflowError> {
        queries::queue::fail(self.database()?, id).await
    }

    async fn reject(&self, id: i64) -> Result<(), LeadflowError> {
        queries::queue::reject(self.database()?, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn health_check_requires_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn lead_lifecycle_through_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap();
        let consent = storage
            .record_consent("+15550100", "c1", ConsentType::Express, now)
            .await
            .unwrap();
        let mut lead = Lead::new("c1:+15550100", "c1", "+15550100", now);
        lead.consent_id = Some(consent.id);
        assert!(storage.insert_lead_if_absent(&lead).await.unwrap());

        let event = AuditEvent::new(
            &lead.id,
            leadflow_core::AuditEventType::Transition,
            "first outbound",
            now,
        )
        .with_states(LeadState::New, LeadState::IntakeSent);
        assert!(
            storage
                .transition_lead(
                    &lead.id,
                    LeadState::New,
                    LeadState::IntakeSent,
                    &LeadPatch::default(),
                    &event,
                    now,
                )
                .await
                .unwrap()
        );

        let stored = storage.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(stored.state, LeadState::IntakeSent);
        assert_eq!(stored.consent_id, Some(consent.id));
        assert_eq!(storage.list_events(&lead.id).await.unwrap().len(), 1);

        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn queue_operations_through_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("queue_adapter.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();

        let id = storage.enqueue("inbound", r#"{"msg":"test"}"#).await.unwrap();
        let entry = storage.dequeue("inbound").await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        storage.ack(entry.id).await.unwrap();
        assert!(storage.dequeue("inbound").await.unwrap().is_none());

        storage.close().await.unwrap();
    }
}
