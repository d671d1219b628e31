//! Raw blob persistence for evidence payloads.

use crate::services::evidence_service::{EvidenceError, EvidenceResult};
use async_trait::async_trait;
use std::{
    future::Future,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncRead, AsyncWriteExt, BufReader},
    time::timeout,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Outcome of a successful delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deletion {
    Removed,
    AlreadyAbsent,
}

/// Storage for evidence bytes at resolved locations.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write `bytes` to `path`. Fails with `upload_failed` on any I/O error.
    async fn write(&self, path: &Path, bytes: &[u8]) -> EvidenceResult<()>;

    /// Open a stored blob for streaming.
    async fn open(&self, path: &Path) -> io::Result<BoxReader>;

    /// Remove the blob at `path`. A blob that is already gone is not an error.
    async fn delete(&self, path: &Path) -> EvidenceResult<Deletion>;

    /// List every stored blob beneath `root` (one directory per shipment).
    async fn inventory(&self, root: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Local-disk [`FileStore`]. Every operation is bounded by `io_timeout`.
#[derive(Clone, Debug)]
pub struct LocalFileStore {
    io_timeout: Duration,
}

impl LocalFileStore {
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        match timeout(self.io_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                ErrorKind::TimedOut,
                format!("{} timed out after {:?}", op, self.io_timeout),
            )),
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn write(&self, path: &Path, bytes: &[u8]) -> EvidenceResult<()> {
        let size = bytes.len() as u64;
        let tmp_path = temp_sibling(path, size)?;

        let result = self
            .bounded("write", write_then_rename(&tmp_path, path, bytes))
            .await;

        if let Err(err) = result {
            // The handle is already dropped here, on success and failure alike.
            let _ = fs::remove_file(&tmp_path).await;
            warn!(path = %path.display(), size, error = %err, "evidence write failed");
            return Err(EvidenceError::UploadFailed {
                size,
                source: err.into(),
            });
        }

        debug!(path = %path.display(), size, "evidence written");
        Ok(())
    }

    async fn open(&self, path: &Path) -> io::Result<BoxReader> {
        let file = self.bounded("open", File::open(path)).await?;
        Ok(Box::new(BufReader::new(file)))
    }

    async fn delete(&self, path: &Path) -> EvidenceResult<Deletion> {
        match self.bounded("delete", fs::remove_file(path)).await {
            Ok(()) => {
                debug!("removed physical file {}", path.display());
                Ok(Deletion::Removed)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", path.display());
                Ok(Deletion::AlreadyAbsent)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "evidence delete failed");
                Err(EvidenceError::DeletionFailed { source: err.into() })
            }
        }
    }

    async fn inventory(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        self.bounded("inventory", scan_two_levels(root)).await
    }
}

/// Temporary file next to `path`, so the final rename stays on one filesystem.
fn temp_sibling(path: &Path, size: u64) -> EvidenceResult<PathBuf> {
    let parent = path.parent().ok_or_else(|| EvidenceError::UploadFailed {
        size,
        source: io::Error::new(ErrorKind::Other, "evidence path missing parent directory").into(),
    })?;
    Ok(parent.join(format!(".tmp-{}", Uuid::new_v4())))
}

async fn write_then_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(tmp_path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
    }
    fs::rename(tmp_path, path).await
}

async fn scan_two_levels(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut blobs = Vec::new();
    let mut shipments = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(blobs),
        Err(err) => return Err(err),
    };

    while let Some(shipment) = shipments.next_entry().await? {
        if !shipment.file_type().await?.is_dir() {
            continue;
        }
        let mut entries = fs::read_dir(shipment.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden && entry.file_type().await?.is_file() {
                blobs.push(entry.path());
            }
        }
    }

    blobs.sort();
    Ok(blobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn store() -> LocalFileStore {
        LocalFileStore::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn write_open_delete_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("blob.png");
        let store = store();

        store.write(&path, b"payload").await.unwrap();
        let mut buf = Vec::new();
        store
            .open(&path)
            .await
            .unwrap()
            .read_to_end(&mut buf)
            .await
            .unwrap();
        assert_eq!(buf, b"payload");

        assert_eq!(store.delete(&path).await.unwrap(), Deletion::Removed);
        assert_eq!(store.delete(&path).await.unwrap(), Deletion::AlreadyAbsent);
    }

    #[tokio::test]
    async fn write_into_missing_directory_is_upload_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("no-such-dir").join("blob.png");

        let err = store().write(&path, &[1, 2, 3]).await.unwrap_err();
        assert_eq!(err.code(), "upload_failed");
        assert!(matches!(err, EvidenceError::UploadFailed { size: 3, .. }));
    }

    #[tokio::test]
    async fn stalled_operation_times_out() {
        let store = LocalFileStore::new(Duration::from_millis(20));

        let err = store
            .bounded("write", std::future::pending::<io::Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);

        let quick = store.bounded("open", async { Ok::<_, io::Error>(7) }).await.unwrap();
        assert_eq!(quick, 7);
    }

    #[tokio::test]
    async fn write_without_parent_reports_payload_size() {
        let err = store().write(Path::new("/"), b"abcd").await.unwrap_err();
        assert!(matches!(err, EvidenceError::UploadFailed { size: 4, .. }));
    }

    #[tokio::test]
    async fn failed_write_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory at the destination makes the final rename fail.
        let path = tmp.path().join("occupied");
        fs::create_dir(&path).await.unwrap();
        fs::write(path.join("keep"), b"x").await.unwrap();

        assert!(store().write(&path, b"data").await.is_err());

        let mut entries = fs::read_dir(tmp.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            assert!(!entry.file_name().to_string_lossy().starts_with(".tmp-"));
        }
    }

    #[tokio::test]
    async fn deleting_a_directory_is_deletion_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let err = store().delete(tmp.path()).await.unwrap_err();
        assert_eq!(err.code(), "deletion_failed");
    }

    #[tokio::test]
    async fn inventory_lists_blobs_and_skips_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let shipment = tmp.path().join("1Z999AA1234567890");
        fs::create_dir_all(&shipment).await.unwrap();
        fs::write(shipment.join("a.png"), b"a").await.unwrap();
        fs::write(shipment.join(".tmp-123"), b"partial").await.unwrap();
        fs::write(tmp.path().join("stray.txt"), b"ignored").await.unwrap();

        let blobs = store().inventory(tmp.path()).await.unwrap();
        assert_eq!(blobs, vec![shipment.join("a.png")]);

        let missing = store()
            .inventory(&tmp.path().join("missing"))
            .await
            .unwrap();
        assert!(missing.is_empty());
    }
}
