//! File-backed metadata: one JSON document per shipment at
//! `{dir}/{tracking_number}.json`, rewritten through a temp file and an atomic
//! rename on every mutation.

use super::{KeyedLocks, MetadataError, MetadataResult, MetadataStore, Removal};
use crate::models::{evidence::EvidenceRecord, tracking::TrackingNumber};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{io::ErrorKind, path::PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

const DOCUMENT_EXTENSION: &str = "json";

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct MetadataDocument {
    tracking_number: TrackingNumber,
    evidence: Vec<EvidenceRecord>,
}

#[derive(Debug)]
pub struct JsonFileMetadataStore {
    dir: PathBuf,
    locks: KeyedLocks,
}

impl JsonFileMetadataStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> MetadataResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: KeyedLocks::default(),
        })
    }

    fn document_path(&self, tracking_number: &TrackingNumber) -> PathBuf {
        self.dir
            .join(format!("{}.{}", tracking_number, DOCUMENT_EXTENSION))
    }

    async fn load(&self, tracking_number: &TrackingNumber) -> MetadataResult<Vec<EvidenceRecord>> {
        let path = self.document_path(tracking_number);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let doc: MetadataDocument = serde_json::from_slice(&raw)?;
        if &doc.tracking_number != tracking_number {
            return Err(MetadataError::Corrupt(format!(
                "{} holds records for {}",
                path.display(),
                doc.tracking_number
            )));
        }
        Ok(doc.evidence)
    }

    /// Replace the shipment's document. Callers must hold the shipment lock.
    async fn save(
        &self,
        tracking_number: &TrackingNumber,
        evidence: Vec<EvidenceRecord>,
    ) -> MetadataResult<()> {
        let path = self.document_path(tracking_number);
        let doc = MetadataDocument {
            tracking_number: tracking_number.clone(),
            evidence,
        };
        let body = serde_json::to_vec_pretty(&doc)?;

        let tmp_path = self
            .dir
            .join(format!(".tmp-{}-{}", tracking_number, Uuid::new_v4()));
        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        debug!(
            tracking_number = %tracking_number,
            records = doc.evidence.len(),
            "metadata document rewritten"
        );
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonFileMetadataStore {
    async fn append(
        &self,
        tracking_number: &TrackingNumber,
        record: EvidenceRecord,
    ) -> MetadataResult<()> {
        let _guard = self.locks.lock(tracking_number).await;
        let mut records = self.load(tracking_number).await?;
        if records.iter().any(|r| r.id == record.id) {
            return Err(MetadataError::DuplicateId(record.id));
        }
        records.push(record);
        self.save(tracking_number, records).await
    }

    async fn list_by_tracking(
        &self,
        tracking_number: &TrackingNumber,
    ) -> MetadataResult<Vec<EvidenceRecord>> {
        // Documents are replaced by rename, so an unlocked read sees either
        // the old or the new version, never a partial one.
        self.load(tracking_number).await
    }

    async fn find_by_id(
        &self,
        tracking_number: &TrackingNumber,
        id: Uuid,
    ) -> MetadataResult<Option<EvidenceRecord>> {
        let records = self.load(tracking_number).await?;
        Ok(records.into_iter().find(|r| r.id == id))
    }

    async fn remove(&self, tracking_number: &TrackingNumber, id: Uuid) -> MetadataResult<Removal> {
        let _guard = self.locks.lock(tracking_number).await;
        let mut records = self.load(tracking_number).await?;
        let Some(pos) = records.iter().position(|r| r.id == id) else {
            return Ok(Removal::NotFound);
        };
        let removed = records.remove(pos);
        self.save(tracking_number, records).await?;
        Ok(Removal::Removed(removed))
    }

    async fn tracking_numbers(&self) -> MetadataResult<Vec<TrackingNumber>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut occupied = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            let Some(tracking_number) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| TrackingNumber::parse(s).ok())
            else {
                continue;
            };
            if !self.load(&tracking_number).await?.is_empty() {
                occupied.push(tracking_number);
            }
        }
        Ok(occupied)
    }

    async fn ping(&self) -> MetadataResult<()> {
        fs::metadata(&self.dir).await?;
        Ok(())
    }
}
