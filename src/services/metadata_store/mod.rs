//! Evidence metadata, keyed by tracking number.
//!
//! Each backend keeps an insertion-ordered list of [`EvidenceRecord`]s per
//! shipment. Mutations of one shipment's list are serialized inside the
//! backend; different shipments never wait on each other.

use crate::models::{evidence::EvidenceRecord, tracking::TrackingNumber};
use async_trait::async_trait;
use dashmap::DashMap;
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

pub mod json_file;
pub mod memory;
pub mod sqlite;

pub use json_file::JsonFileMetadataStore;
pub use memory::InMemoryMetadataStore;
pub use sqlite::SqliteMetadataStore;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("evidence `{0}` is already recorded")]
    DuplicateId(Uuid),
    #[error("corrupt metadata: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Result of [`MetadataStore::remove`].
#[derive(Clone, Debug, PartialEq)]
pub enum Removal {
    Removed(EvidenceRecord),
    NotFound,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Append `record` to the end of the shipment's list.
    async fn append(&self, tracking_number: &TrackingNumber, record: EvidenceRecord)
    -> MetadataResult<()>;

    /// All records for a shipment in insertion order; empty if unknown.
    async fn list_by_tracking(
        &self,
        tracking_number: &TrackingNumber,
    ) -> MetadataResult<Vec<EvidenceRecord>>;

    async fn find_by_id(
        &self,
        tracking_number: &TrackingNumber,
        id: Uuid,
    ) -> MetadataResult<Option<EvidenceRecord>>;

    async fn remove(&self, tracking_number: &TrackingNumber, id: Uuid) -> MetadataResult<Removal>;

    /// Every shipment that currently has at least one record.
    async fn tracking_numbers(&self) -> MetadataResult<Vec<TrackingNumber>>;

    /// Cheap liveness probe for readiness checks.
    async fn ping(&self) -> MetadataResult<()> {
        Ok(())
    }
}

/// One async mutex per tracking number.
///
/// The map is only locked long enough to fetch or insert the per-key mutex,
/// so holding one shipment's guard never blocks another shipment.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<TrackingNumber, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub async fn lock(&self, tracking_number: &TrackingNumber) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(tracking_number.clone())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn keyed_locks_do_not_block_other_keys() {
        let locks = KeyedLocks::default();
        let a = testing::tn("1Z999AA1234567890");
        let b = testing::tn("FDX123456789012");

        let _held = locks.lock(&a).await;
        let other = tokio::time::timeout(Duration::from_millis(200), locks.lock(&b)).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), locks.lock(&a)).await;
        assert!(same.is_err());
    }
}
