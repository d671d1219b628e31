//! Process-local metadata store. Contents are lost on restart.

use super::{MetadataError, MetadataResult, MetadataStore, Removal};
use crate::models::{evidence::EvidenceRecord, tracking::TrackingNumber};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

type Shelf = Arc<Mutex<Vec<EvidenceRecord>>>;

#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    shelves: DashMap<TrackingNumber, Shelf>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the shipment's shelf without holding the map lock.
    fn shelf(&self, tracking_number: &TrackingNumber) -> Shelf {
        self.shelves
            .entry(tracking_number.clone())
            .or_default()
            .value()
            .clone()
    }

    fn existing_shelf(&self, tracking_number: &TrackingNumber) -> Option<Shelf> {
        self.shelves
            .get(tracking_number)
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn append(
        &self,
        tracking_number: &TrackingNumber,
        record: EvidenceRecord,
    ) -> MetadataResult<()> {
        let shelf = self.shelf(tracking_number);
        let mut records = shelf.lock().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(MetadataError::DuplicateId(record.id));
        }
        records.push(record);
        Ok(())
    }

    async fn list_by_tracking(
        &self,
        tracking_number: &TrackingNumber,
    ) -> MetadataResult<Vec<EvidenceRecord>> {
        match self.existing_shelf(tracking_number) {
            Some(shelf) => Ok(shelf.lock().await.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn find_by_id(
        &self,
        tracking_number: &TrackingNumber,
        id: Uuid,
    ) -> MetadataResult<Option<EvidenceRecord>> {
        let Some(shelf) = self.existing_shelf(tracking_number) else {
            return Ok(None);
        };
        let records = shelf.lock().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn remove(&self, tracking_number: &TrackingNumber, id: Uuid) -> MetadataResult<Removal> {
        let Some(shelf) = self.existing_shelf(tracking_number) else {
            return Ok(Removal::NotFound);
        };
        let mut records = shelf.lock().await;
        match records.iter().position(|r| r.id == id) {
            Some(pos) => Ok(Removal::Removed(records.remove(pos))),
            None => Ok(Removal::NotFound),
        }
    }

    async fn tracking_numbers(&self) -> MetadataResult<Vec<TrackingNumber>> {
        let shelves: Vec<(TrackingNumber, Shelf)> = self
            .shelves
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut occupied = Vec::new();
        for (tracking_number, shelf) in shelves {
            if !shelf.lock().await.is_empty() {
                occupied.push(tracking_number);
            }
        }
        Ok(occupied)
    }
}
