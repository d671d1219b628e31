//! Represents a proof-of-delivery image attached to a shipment.

use crate::models::tracking::TrackingNumber;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// URL prefix under which stored evidence blobs are served.
pub const PUBLIC_EVIDENCE_PREFIX: &str = "/uploads/evidence";

/// Metadata for a single stored evidence image.
///
/// Records are created once by a successful upload and never mutated. The
/// payload lives on disk at `storage_ref`; that locator stays inside the
/// crate and callers only ever see [`EvidenceRecord::url`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    /// Random v4 identifier, also the stem of the on-disk filename.
    pub id: Uuid,

    /// Shipment this evidence belongs to.
    pub tracking_number: TrackingNumber,

    /// `{id}.{extension}`; never derived from client input other than the extension.
    pub filename: String,

    /// Filename as supplied by the uploader.
    pub original_name: String,

    /// Payload size in bytes.
    pub size: u64,

    /// MIME type detected from the payload bytes.
    pub mime_type: String,

    pub uploaded_at: DateTime<Utc>,

    pub description: String,

    pub location: String,

    storage_ref: PathBuf,
}

impl EvidenceRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: Uuid,
        tracking_number: TrackingNumber,
        filename: String,
        original_name: String,
        size: u64,
        mime_type: String,
        uploaded_at: DateTime<Utc>,
        metadata: EvidenceMetadata,
        storage_ref: PathBuf,
    ) -> Self {
        Self {
            id,
            tracking_number,
            filename,
            original_name,
            size,
            mime_type,
            uploaded_at,
            description: metadata.description.unwrap_or_default(),
            location: metadata.location.unwrap_or_default(),
            storage_ref,
        }
    }

    pub(crate) fn storage_ref(&self) -> &Path {
        &self.storage_ref
    }

    /// Public locator for the stored image.
    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            PUBLIC_EVIDENCE_PREFIX, self.tracking_number, self.filename
        )
    }

    pub fn to_public(&self) -> PublicEvidence {
        PublicEvidence {
            id: self.id,
            filename: self.filename.clone(),
            original_name: self.original_name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            uploaded_at: self.uploaded_at,
            description: self.description.clone(),
            location: self.location.clone(),
            url: self.url(),
        }
    }
}

/// Externally visible view of an [`EvidenceRecord`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicEvidence {
    pub id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub description: String,
    pub location: String,
    pub url: String,
}

/// An uploaded file as received from the transport, before validation.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub original_name: String,
    /// Content type claimed by the client.
    pub declared_mime: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(
        original_name: impl Into<String>,
        declared_mime: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            declared_mime: declared_mime.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Optional free-text fields supplied with an upload.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EvidenceMetadata {
    pub description: Option<String>,
    pub location: Option<String>,
}
