//! EvidenceService: upload, list and delete proof-of-delivery images.
//!
//! Validates before any I/O, writes the blob before recording metadata, and
//! removes the blob before the metadata on delete. A crash between the blob
//! write and the metadata append leaves an orphaned blob; [`EvidenceService::reconcile`]
//! reports those without repairing them.

use crate::{
    models::{
        evidence::{EvidenceMetadata, EvidenceRecord, UploadedFile},
        tracking::{TrackingInfo, TrackingNumber},
    },
    services::{
        file_store::{BoxReader, Deletion, FileStore},
        identity::IdentityGenerator,
        metadata_store::{MetadataError, MetadataStore, Removal},
        path_resolver::{Extension, PathResolver, evidence_filename, parse_evidence_filename},
        tracking_lookup::TrackingLookup,
        validator::{ValidationError, Validator},
    },
};
use chrono::Utc;
use serde::Serialize;
use std::{
    collections::HashSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Underlying cause of a storage-layer failure.
#[derive(Debug, Error)]
pub enum StoreFailure {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("invalid tracking number format: `{0}`")]
    InvalidTrackingNumber(String),
    #[error("tracking number `{0}` not found")]
    TrackingNotFound(TrackingNumber),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("failed to save evidence file ({size} bytes): {source}")]
    UploadFailed {
        size: u64,
        #[source]
        source: StoreFailure,
    },
    #[error("failed to delete evidence file: {source}")]
    DeletionFailed {
        #[source]
        source: StoreFailure,
    },
    #[error("evidence `{id}` not found for tracking number `{tracking_number}`")]
    EvidenceNotFound {
        tracking_number: TrackingNumber,
        id: String,
    },
    #[error("evidence storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreFailure),
}

impl EvidenceError {
    /// Machine-readable error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTrackingNumber(_) => "invalid_tracking_number",
            Self::TrackingNotFound(_) => "tracking_not_found",
            Self::Invalid(err) => err.code(),
            Self::UploadFailed { .. } => "upload_failed",
            Self::DeletionFailed { .. } => "deletion_failed",
            Self::EvidenceNotFound { .. } => "evidence_not_found",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

pub type EvidenceResult<T> = Result<T, EvidenceError>;

fn storage_unavailable(err: impl Into<StoreFailure>) -> EvidenceError {
    EvidenceError::StorageUnavailable(err.into())
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceStats {
    pub total_files: usize,
    pub total_size: String,
    pub total_size_bytes: u64,
    pub tracking_numbers: usize,
}

/// A metadata record whose blob no longer exists.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MissingBlob {
    pub tracking_number: TrackingNumber,
    pub id: Uuid,
    pub storage_ref: PathBuf,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub scanned_blobs: usize,
    pub scanned_records: usize,
    /// Blobs on disk with no metadata record.
    pub orphaned_blobs: Vec<PathBuf>,
    pub missing_blobs: Vec<MissingBlob>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_blobs.is_empty() && self.missing_blobs.is_empty()
    }
}

#[derive(Clone)]
pub struct EvidenceService {
    tracking: Arc<dyn TrackingLookup>,
    validator: Validator,
    ids: IdentityGenerator,
    paths: PathResolver,
    files: Arc<dyn FileStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl EvidenceService {
    pub fn new(
        tracking: Arc<dyn TrackingLookup>,
        paths: PathResolver,
        files: Arc<dyn FileStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            tracking,
            validator: Validator::default(),
            ids: IdentityGenerator,
            paths,
            files,
            metadata,
        }
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    pub fn metadata_store(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Parse the tracking number and confirm the shipment exists.
    fn admit(&self, raw: &str) -> EvidenceResult<(TrackingNumber, TrackingInfo)> {
        let tracking_number = TrackingNumber::parse(raw)?;
        match self.tracking.lookup(&tracking_number) {
            Some(info) => Ok((tracking_number, info)),
            None => Err(EvidenceError::TrackingNotFound(tracking_number)),
        }
    }

    /// Shipment status for a tracking number.
    pub fn tracking_info(&self, raw_tracking_number: &str) -> EvidenceResult<TrackingInfo> {
        self.admit(raw_tracking_number).map(|(_, info)| info)
    }

    /// Validate, store and record an uploaded image.
    pub async fn save_evidence(
        &self,
        raw_tracking_number: &str,
        file: Option<UploadedFile>,
        metadata: EvidenceMetadata,
    ) -> EvidenceResult<EvidenceRecord> {
        let (tracking_number, _) = self.admit(raw_tracking_number)?;
        let kind = self.validator.validate(file.as_ref())?;
        let Some(file) = file else {
            return Err(ValidationError::MissingFile.into());
        };
        let size = file.size();

        let id = self.ids.generate();
        let extension = Extension::from_original(&file.original_name, kind);
        let path = self
            .paths
            .resolve(&tracking_number, id, &extension)
            .await
            .map_err(|err| EvidenceError::UploadFailed {
                size,
                source: err.into(),
            })?;

        self.files.write(&path, &file.bytes).await?;

        let record = EvidenceRecord::new(
            id,
            tracking_number.clone(),
            evidence_filename(id, &extension),
            file.original_name,
            size,
            kind.mime().to_string(),
            Utc::now(),
            metadata,
            path.clone(),
        );

        if let Err(err) = self.metadata.append(&tracking_number, record.clone()).await {
            warn!(
                tracking_number = %tracking_number,
                evidence_id = %id,
                error = %err,
                "metadata append failed after blob write"
            );
            match self.files.delete(&path).await {
                Ok(_) => {}
                Err(cleanup) => warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "orphaned evidence blob left on disk"
                ),
            }
            return Err(EvidenceError::UploadFailed {
                size,
                source: err.into(),
            });
        }

        info!(
            tracking_number = %tracking_number,
            evidence_id = %id,
            size,
            mime_type = kind.mime(),
            "evidence stored"
        );
        Ok(record)
    }

    /// All evidence for a shipment, oldest first.
    pub async fn get_evidence_by_tracking(
        &self,
        raw_tracking_number: &str,
    ) -> EvidenceResult<Vec<EvidenceRecord>> {
        let (tracking_number, _) = self.admit(raw_tracking_number)?;
        self.metadata
            .list_by_tracking(&tracking_number)
            .await
            .map_err(storage_unavailable)
    }

    /// Delete the blob, then the record. A failed blob delete keeps the
    /// record so the call can be retried.
    pub async fn delete_evidence(
        &self,
        raw_tracking_number: &str,
        raw_id: &str,
    ) -> EvidenceResult<EvidenceRecord> {
        let (tracking_number, _) = self.admit(raw_tracking_number)?;
        let not_found = || EvidenceError::EvidenceNotFound {
            tracking_number: tracking_number.clone(),
            id: raw_id.to_string(),
        };

        let id = Uuid::try_parse(raw_id).map_err(|_| not_found())?;
        let record = self
            .metadata
            .find_by_id(&tracking_number, id)
            .await
            .map_err(storage_unavailable)?
            .ok_or_else(not_found)?;

        if self.files.delete(record.storage_ref()).await? == Deletion::AlreadyAbsent {
            warn!(
                tracking_number = %tracking_number,
                evidence_id = %id,
                "evidence blob was already missing; removing record"
            );
        }

        match self.metadata.remove(&tracking_number, id).await {
            Ok(Removal::Removed(removed)) => {
                info!(tracking_number = %tracking_number, evidence_id = %id, "evidence deleted");
                Ok(removed)
            }
            // A concurrent delete of the same id got there first.
            Ok(Removal::NotFound) => Err(not_found()),
            Err(err) => Err(EvidenceError::DeletionFailed { source: err.into() }),
        }
    }

    /// Open a stored blob by its public filename.
    pub async fn open_evidence(
        &self,
        raw_tracking_number: &str,
        filename: &str,
    ) -> EvidenceResult<(EvidenceRecord, BoxReader)> {
        let (tracking_number, _) = self.admit(raw_tracking_number)?;
        let not_found = || EvidenceError::EvidenceNotFound {
            tracking_number: tracking_number.clone(),
            id: filename.to_string(),
        };

        let (id, _) = parse_evidence_filename(filename).ok_or_else(not_found)?;
        let record = self
            .metadata
            .find_by_id(&tracking_number, id)
            .await
            .map_err(storage_unavailable)?
            .filter(|r| r.filename == filename)
            .ok_or_else(not_found)?;

        match self.files.open(record.storage_ref()).await {
            Ok(reader) => Ok((record, reader)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(err) => Err(storage_unavailable(err)),
        }
    }

    /// Totals across every shipment.
    pub async fn stats(&self) -> EvidenceResult<EvidenceStats> {
        let shipments = self
            .metadata
            .tracking_numbers()
            .await
            .map_err(storage_unavailable)?;

        let mut total_files = 0;
        let mut total_size_bytes = 0u64;
        for tracking_number in &shipments {
            let records = self
                .metadata
                .list_by_tracking(tracking_number)
                .await
                .map_err(storage_unavailable)?;
            total_files += records.len();
            total_size_bytes += records.iter().map(|r| r.size).sum::<u64>();
        }

        Ok(EvidenceStats {
            total_files,
            total_size: format_file_size(total_size_bytes),
            total_size_bytes,
            tracking_numbers: shipments.len(),
        })
    }

    /// Compare blobs on disk with metadata records and report mismatches.
    ///
    /// Uploads still in flight may show up as orphaned blobs.
    pub async fn reconcile(&self) -> EvidenceResult<ReconcileReport> {
        let blobs = self
            .files
            .inventory(self.paths.root())
            .await
            .map_err(storage_unavailable)?;
        let on_disk: HashSet<BlobKey<'_>> = blobs.iter().filter_map(|b| blob_key(b)).collect();

        let shipments = self
            .metadata
            .tracking_numbers()
            .await
            .map_err(storage_unavailable)?;

        let mut report = ReconcileReport {
            scanned_blobs: blobs.len(),
            ..Default::default()
        };
        let mut referenced: HashSet<(String, String)> = HashSet::new();
        for tracking_number in shipments {
            let records = self
                .metadata
                .list_by_tracking(&tracking_number)
                .await
                .map_err(storage_unavailable)?;
            report.scanned_records += records.len();
            for record in records {
                if !on_disk.contains(&(tracking_number.as_str(), record.filename.as_str())) {
                    report.missing_blobs.push(MissingBlob {
                        tracking_number: tracking_number.clone(),
                        id: record.id,
                        storage_ref: record.storage_ref().to_path_buf(),
                    });
                }
                referenced.insert((tracking_number.to_string(), record.filename));
            }
        }

        report.orphaned_blobs = blobs
            .iter()
            .filter(|blob| match blob_key(blob) {
                Some((shipment, filename)) => {
                    !referenced.contains(&(shipment.to_string(), filename.to_string()))
                }
                None => true,
            })
            .cloned()
            .collect();

        for orphan in &report.orphaned_blobs {
            warn!(path = %orphan.display(), "orphaned evidence blob");
        }
        for missing in &report.missing_blobs {
            warn!(
                tracking_number = %missing.tracking_number,
                evidence_id = %missing.id,
                "evidence record without blob"
            );
        }
        info!(
            blobs = report.scanned_blobs,
            records = report.scanned_records,
            orphaned = report.orphaned_blobs.len(),
            missing = report.missing_blobs.len(),
            "reconciliation finished"
        );
        Ok(report)
    }
}

/// `(shipment directory, filename)` of a blob beneath the evidence root.
type BlobKey<'a> = (&'a str, &'a str);

/// Blobs and records are matched by their last two path components, so a
/// root spelled differently across restarts (`./uploads` vs `uploads`) still
/// pairs them up.
fn blob_key(path: &Path) -> Option<BlobKey<'_>> {
    let filename = path.file_name()?.to_str()?;
    let shipment = path.parent()?.file_name()?.to_str()?;
    Some((shipment, filename))
}

/// Human-readable size: `0 Bytes`, `1.5 KB`, `4.77 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
