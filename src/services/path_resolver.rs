//! Maps evidence identity onto the on-disk layout
//! `evidence_root/{tracking_number}/{id}.{extension}`.

use crate::{models::tracking::TrackingNumber, services::validator::ImageKind};
use std::{
    fmt, io,
    path::{Path, PathBuf},
};
use tokio::fs;
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 8;

/// A lower-case ASCII alphanumeric file extension, safe as a filename suffix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extension(String);

impl Extension {
    /// Take the extension from the uploader's filename, falling back to the
    /// canonical one for `detected` when it is absent or unusable.
    pub fn from_original(original_name: &str, detected: ImageKind) -> Self {
        Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse)
            .unwrap_or_else(|| Self(detected.extension().to_string()))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let ok = !raw.is_empty()
            && raw.len() <= MAX_EXTENSION_LEN
            && raw.bytes().all(|b| b.is_ascii_alphanumeric());
        ok.then(|| Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the stored filename for an evidence item.
pub fn evidence_filename(id: Uuid, extension: &Extension) -> String {
    format!("{}.{}", id, extension)
}

/// Split a stored filename back into its id and extension.
///
/// Returns `None` for anything that could not have been produced by
/// [`evidence_filename`].
pub fn parse_evidence_filename(name: &str) -> Option<(Uuid, Extension)> {
    let (stem, ext) = name.split_once('.')?;
    let id = Uuid::try_parse(stem).ok()?;
    if id.hyphenated().to_string() != stem {
        return None;
    }
    Some((id, Extension::parse(ext)?))
}

#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every blob of one shipment. Does not touch the disk.
    pub fn tracking_dir(&self, tracking_number: &TrackingNumber) -> PathBuf {
        self.root.join(tracking_number.as_str())
    }

    /// Resolve the destination for a new blob, creating the shipment
    /// directory if needed. Repeated calls are harmless.
    pub async fn resolve(
        &self,
        tracking_number: &TrackingNumber,
        id: Uuid,
        extension: &Extension,
    ) -> io::Result<PathBuf> {
        let dir = self.tracking_dir(tracking_number);
        fs::create_dir_all(&dir).await?;
        Ok(dir.join(evidence_filename(id, extension)))
    }
}
