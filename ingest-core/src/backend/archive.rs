//! Backend that reads precomputed metadata archives

use crate::backend::{BackendError, LedgerBackend, LedgerRange, RequestGuard};
use crate::error::Result;
use async_trait::async_trait;
use ledger_meta::{write_meta, FrameReader, LedgerCloseMeta};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Default deadline for one archive fetch
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A store of archived, framed per-ledger metadata payloads
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Fetch the framed payload for one sequence, `None` if not archived
    async fn fetch(&self, sequence: u32) -> std::result::Result<Option<Vec<u8>>, BackendError>;
}

/// Filesystem archive: one framed file per ledger under a root directory
pub struct FsArchiveStore {
    root: PathBuf,
}

impl FsArchiveStore {
    /// Open an archive rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, sequence: u32) -> PathBuf {
        self.root.join(format!("{sequence:08}.meta"))
    }

    /// Archive one ledger, the write side used by export jobs
    pub async fn put(&self, meta: &LedgerCloseMeta) -> std::result::Result<(), BackendError> {
        let mut buf = Vec::new();
        write_meta(&mut buf, meta)
            .await
            .map_err(BackendError::Meta)?;
        let path = self.path_for(meta.sequence());
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for FsArchiveStore {
    async fn fetch(&self, sequence: u32) -> std::result::Result<Option<Vec<u8>>, BackendError> {
        match tokio::fs::read(self.path_for(sequence)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Serves ledgers from an archive store
///
/// Archives are immutable, so a missing ledger is an error rather than
/// something to wait for. Each fetch runs under a deadline.
pub struct ArchiveBackend<S> {
    store: S,
    guard: RequestGuard,
    fetch_timeout: Duration,
}

impl<S: ArchiveStore> ArchiveBackend<S> {
    /// Create a backend over an archive store
    pub fn new(store: S) -> Self {
        Self {
            store,
            guard: RequestGuard::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Override the per-fetch deadline
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

#[async_trait]
impl<S: ArchiveStore> LedgerBackend for ArchiveBackend<S> {
    async fn prepare_range(&mut self, range: LedgerRange) -> Result<()> {
        self.guard.prepare(range)
    }

    async fn get_ledger(&mut self, sequence: u32) -> Result<LedgerCloseMeta> {
        self.guard.check_request(sequence)?;
        let payload = tokio::time::timeout(self.fetch_timeout, self.store.fetch(sequence))
            .await
            .map_err(|_| {
                BackendError::Timeout(format!(
                    "archive fetch of ledger {sequence} exceeded {:?}",
                    self.fetch_timeout
                ))
            })??
            .ok_or_else(|| {
                BackendError::Storage(format!("ledger {sequence} not present in archive"))
            })?;
        let mut reader = FrameReader::new(payload.as_slice());
        let meta = reader
            .next_meta()
            .await
            .map_err(BackendError::Meta)?
            .ok_or_else(|| {
                BackendError::Storage(format!("archive payload for ledger {sequence} is empty"))
            })?;
        Ok(meta)
    }

    async fn close(&mut self) -> Result<()> {
        self.guard.close();
        Ok(())
    }
}
