//! SQLite-backed metadata store.
//!
//! Every mutation is a single statement, so SQLite's own write lock provides
//! the per-shipment serialization; there is no read-modify-write cycle to
//! protect. Insertion order is the `seq` autoincrement column.

use super::{MetadataError, MetadataResult, MetadataStore, Removal};
use crate::models::{
    evidence::{EvidenceMetadata, EvidenceRecord},
    tracking::TrackingNumber,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};
use tracing::debug;
use uuid::Uuid;

const INIT_MIGRATION: &str = include_str!("../../../migrations/0001_init.sql");

const RECORD_COLUMNS: &str = "id, tracking_number, filename, original_name, size_bytes, \
     mime_type, uploaded_at, description, location, storage_ref";

#[derive(FromRow)]
struct EvidenceRow {
    id: String,
    tracking_number: String,
    filename: String,
    original_name: String,
    size_bytes: i64,
    mime_type: String,
    uploaded_at: String,
    description: String,
    location: String,
    storage_ref: String,
}

impl TryFrom<EvidenceRow> for EvidenceRecord {
    type Error = MetadataError;

    fn try_from(row: EvidenceRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|err| MetadataError::Corrupt(format!("evidence id `{}`: {}", row.id, err)))?;
        let tracking_number = TrackingNumber::parse(&row.tracking_number)
            .map_err(|err| MetadataError::Corrupt(err.to_string()))?;
        let size = u64::try_from(row.size_bytes)
            .map_err(|_| MetadataError::Corrupt(format!("negative size for {}", id)))?;
        let uploaded_at = DateTime::parse_from_rfc3339(&row.uploaded_at)
            .map_err(|err| MetadataError::Corrupt(format!("uploaded_at for {}: {}", id, err)))?
            .with_timezone(&Utc);

        Ok(EvidenceRecord::new(
            id,
            tracking_number,
            row.filename,
            row.original_name,
            size,
            row.mime_type,
            uploaded_at,
            EvidenceMetadata {
                description: Some(row.description),
                location: Some(row.location),
            },
            PathBuf::from(row.storage_ref),
        ))
    }
}

#[derive(Clone, Debug)]
pub struct SqliteMetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open the database at `url`, creating the file if it does not exist.
    /// Migrations are not applied; call [`SqliteMetadataStore::migrate`].
    pub async fn connect(url: &str) -> MetadataResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Apply the bundled schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> MetadataResult<()> {
        let statements = INIT_MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn append(
        &self,
        tracking_number: &TrackingNumber,
        record: EvidenceRecord,
    ) -> MetadataResult<()> {
        let size = i64::try_from(record.size)
            .map_err(|_| MetadataError::Corrupt(format!("size overflow for {}", record.id)))?;

        let result = sqlx::query(
            "INSERT INTO evidence (
                id, tracking_number, filename, original_name, size_bytes,
                mime_type, uploaded_at, description, location, storage_ref
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(tracking_number.as_str())
        .bind(&record.filename)
        .bind(&record.original_name)
        .bind(size)
        .bind(&record.mime_type)
        .bind(
            record
                .uploaded_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        )
        .bind(&record.description)
        .bind(&record.location)
        .bind(record.storage_ref().to_string_lossy().into_owned())
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(MetadataError::DuplicateId(record.id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_by_tracking(
        &self,
        tracking_number: &TrackingNumber,
    ) -> MetadataResult<Vec<EvidenceRecord>> {
        let rows: Vec<EvidenceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM evidence WHERE tracking_number = ? ORDER BY seq ASC",
            RECORD_COLUMNS
        ))
        .bind(tracking_number.as_str())
        .fetch_all(&*self.db)
        .await?;

        rows.into_iter().map(EvidenceRecord::try_from).collect()
    }

    async fn find_by_id(
        &self,
        tracking_number: &TrackingNumber,
        id: Uuid,
    ) -> MetadataResult<Option<EvidenceRecord>> {
        let row: Option<EvidenceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM evidence WHERE tracking_number = ? AND id = ?",
            RECORD_COLUMNS
        ))
        .bind(tracking_number.as_str())
        .bind(id.to_string())
        .fetch_optional(&*self.db)
        .await?;

        row.map(EvidenceRecord::try_from).transpose()
    }

    async fn remove(&self, tracking_number: &TrackingNumber, id: Uuid) -> MetadataResult<Removal> {
        let row: Option<EvidenceRow> = sqlx::query_as(&format!(
            "DELETE FROM evidence WHERE tracking_number = ? AND id = ? RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(tracking_number.as_str())
        .bind(id.to_string())
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) => Ok(Removal::Removed(row.try_into()?)),
            None => Ok(Removal::NotFound),
        }
    }

    async fn tracking_numbers(&self) -> MetadataResult<Vec<TrackingNumber>> {
        let raw: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT tracking_number FROM evidence ORDER BY 1")
                .fetch_all(&*self.db)
                .await?;

        raw.iter()
            .map(|tn| {
                TrackingNumber::parse(tn).map_err(|err| MetadataError::Corrupt(err.to_string()))
            })
            .collect()
    }

    async fn ping(&self) -> MetadataResult<()> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&*self.db).await?;
        if one == 1 {
            Ok(())
        } else {
            Err(MetadataError::Corrupt(format!("unexpected result: {}", one)))
        }
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;

    async fn memory_store() -> SqliteMetadataStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteMetadataStore::new(Arc::new(pool));
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn satisfies_store_contract() {
        testing::exercise_contract(Arc::new(memory_store().await)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_not_lost() {
        testing::exercise_concurrent_appends(Arc::new(memory_store().await)).await;
    }

    #[tokio::test]
    async fn migrate_is_repeatable() {
        let store = memory_store().await;
        store.migrate().await.unwrap();
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn file_database_survives_reconnect() {
        let tmp = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", tmp.path().join("evidence.db").display());
        let tracking_number = testing::tn("1Z999AA1234567890");
        let record = testing::record(&tracking_number);

        let store = SqliteMetadataStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();
        store.append(&tracking_number, record.clone()).await.unwrap();
        store.db.close().await;

        let reopened = SqliteMetadataStore::connect(&url).await.unwrap();
        let found = reopened.find_by_id(&tracking_number, record.id).await.unwrap();
        assert_eq!(found, Some(record));
    }
}
