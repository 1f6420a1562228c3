//! Storage node: byte access, naming-service commands, and startup.

use std::io::{self, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use treefs_types::{
    Command, CommandHandle, NodeId, Path, Registration, Storage, StorageError, StorageHandle,
    StorageResult,
};

use crate::config::StorageConfig;
use crate::constants::{COPY_TEMP_MARKER, MAX_IO_LEN};
use crate::error::StartError;
use crate::local::{self, LocalRoot};

/// Outcome of [`StorageNode::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    /// Files found locally and offered to the naming service.
    pub offered: usize,
    /// Offered files the naming service refused. These were deleted.
    pub rejected: Vec<Path>,
    /// Directories removed because the purge left them empty.
    pub pruned: usize,
}

/// Per-file async mutexes. Entries are dropped once nobody holds them.
#[derive(Debug, Default)]
struct FileLocks {
    locks: DashMap<Path, Arc<Mutex<()>>>,
}

impl FileLocks {
    async fn lock(&self, path: &Path) -> FileGuard<'_> {
        let mutex = Arc::clone(&self.locks.entry(path.clone()).or_default());
        let guard = mutex.lock_owned().await;
        FileGuard {
            locks: self,
            path: path.clone(),
            guard: Some(guard),
        }
    }
}

struct FileGuard<'a> {
    locks: &'a FileLocks,
    path: Path,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FileGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .locks
            .remove_if(&self.path, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// A storage node serving the files beneath one local directory.
///
/// Calls on the same file are serialized; calls on different files run
/// concurrently.
#[derive(Debug)]
pub struct StorageNode {
    config: StorageConfig,
    root: LocalRoot,
    locks: FileLocks,
    copy_seq: AtomicU64,
}

impl StorageNode {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            root: LocalRoot::new(&config.root),
            config,
            locks: FileLocks::default(),
            copy_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn root(&self) -> &LocalRoot {
        &self.root
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.config.storage_endpoint.clone())
    }

    /// Handle for the client-facing storage surface.
    pub fn storage_handle(self: &Arc<Self>) -> StorageHandle {
        StorageHandle::new(
            self.config.storage_endpoint.clone(),
            Arc::clone(self) as Arc<dyn Storage>,
        )
    }

    /// Handle for the naming-service-facing command surface.
    pub fn command_handle(self: &Arc<Self>) -> CommandHandle {
        CommandHandle::new(
            self.config.command_endpoint.clone(),
            Arc::clone(self) as Arc<dyn Command>,
        )
    }

    /// Join the cluster.
    ///
    /// Offers every local file to the naming service, deletes the ones it
    /// refuses, and prunes directories that purge left empty.
    #[tracing::instrument(skip_all, fields(node = %self.config.storage_endpoint), name = "storage.start")]
    pub async fn start(self: &Arc<Self>, naming: &dyn Registration) -> Result<StartReport, StartError> {
        let files = self.root.scan_files().await?;
        let offered = files.len();
        tracing::info!(
            "Registering {} with {} local file(s)",
            self.config.storage_endpoint,
            offered
        );

        let rejected = naming
            .register(self.storage_handle(), self.command_handle(), files)
            .await?;

        let mut removed = Vec::with_capacity(rejected.len());
        for path in &rejected {
            match Command::delete(self.as_ref(), path).await {
                Ok(true) => removed.push(path.clone()),
                Ok(false) => tracing::warn!("Duplicate {} was not fully removed", path),
                Err(e) => tracing::warn!("Failed to remove duplicate {}: {}", path, e),
            }
        }
        let pruned = self.root.prune_empty_ancestors(&removed).await;

        if !rejected.is_empty() {
            tracing::info!(
                "Purged {} duplicate file(s), pruned {} empty director(ies)",
                removed.len(),
                pruned
            );
        }
        Ok(StartReport {
            offered,
            rejected,
            pruned,
        })
    }

    /// Pull `size` bytes of `path` from `source` into a new file at `tmp`.
    async fn fetch(
        &self,
        path: &Path,
        source: &StorageHandle,
        size: u64,
        tmp: &std::path::Path,
    ) -> StorageResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(tmp)
            .await?;

        let chunk = (self.config.copy_chunk_size.max(1) as u64).min(MAX_IO_LEN as u64);
        let mut offset = 0u64;
        while offset < size {
            let len = chunk.min(size - offset);
            let data = source.read(path, offset as i64, len as i64).await?;
            if data.len() as u64 != len {
                return Err(StorageError::transport(format!(
                    "{} returned {} of {} bytes at offset {}",
                    source.endpoint(),
                    data.len(),
                    len,
                    offset
                )));
            }
            file.write_all(&data).await?;
            offset += len;
        }
        file.flush().await?;
        Ok(())
    }
}

async fn discard(tmp: &std::path::Path) {
    if let Err(e) = fs::remove_file(tmp).await
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!("Cannot remove partial copy {}: {}", tmp.display(), e);
    }
}

/// Seek and write failures past what the filesystem can address.
fn write_error(path: &Path, offset: i64, e: io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::FileTooLarge => {
            StorageError::out_of_range(format!("offset {} is too large for {}: {}", offset, path, e))
        }
        _ => StorageError::Io(e),
    }
}

/// Permission failures count as the file not being there.
fn open_error(path: &Path, e: io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => StorageError::not_found(path),
        _ => StorageError::Io(e),
    }
}

#[async_trait]
impl Storage for StorageNode {
    #[tracing::instrument(skip(self), name = "storage.size")]
    async fn size(&self, path: &Path) -> StorageResult<u64> {
        let _guard = self.locks.lock(path).await;
        let full = self.root.existing_file(path).await?;
        Ok(fs::metadata(&full).await?.len())
    }

    #[tracing::instrument(skip(self), name = "storage.read")]
    async fn read(&self, path: &Path, offset: i64, length: i64) -> StorageResult<Vec<u8>> {
        let _guard = self.locks.lock(path).await;
        let full = self.root.existing_file(path).await?;

        if offset < 0 || length < 0 {
            return Err(StorageError::out_of_range(format!(
                "negative offset {} or length {}",
                offset, length
            )));
        }
        if length > MAX_IO_LEN {
            return Err(StorageError::out_of_range(format!(
                "length {} exceeds the per-call limit {}",
                length, MAX_IO_LEN
            )));
        }

        let mut file = fs::File::open(&full)
            .await
            .map_err(|e| open_error(path, e))?;
        let size = file.metadata().await?.len();
        let (offset, length) = (offset as u64, length as u64);
        if offset + length > size {
            return Err(StorageError::out_of_range(format!(
                "range {}..{} is past the end of {} ({} bytes)",
                offset,
                offset + length,
                path,
                size
            )));
        }

        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    #[tracing::instrument(skip(self, data), fields(len = data.len()), name = "storage.write")]
    async fn write(&self, path: &Path, offset: i64, data: &[u8]) -> StorageResult<()> {
        let _guard = self.locks.lock(path).await;
        let full = self.root.existing_file(path).await?;

        if offset < 0 {
            return Err(StorageError::out_of_range(format!("negative offset {}", offset)));
        }
        if data.len() as u64 > MAX_IO_LEN as u64 {
            return Err(StorageError::out_of_range(format!(
                "{} bytes exceeds the per-call limit {}",
                data.len(),
                MAX_IO_LEN
            )));
        }
        if offset.checked_add(data.len() as i64).is_none() {
            return Err(StorageError::out_of_range(format!(
                "writing {} bytes at offset {} overflows",
                data.len(),
                offset
            )));
        }

        let mut file = OpenOptions::new()
            .write(true)
            .open(&full)
            .await
            .map_err(|e| open_error(path, e))?;
        file.seek(SeekFrom::Start(offset as u64))
            .await
            .map_err(|e| write_error(path, offset, e))?;
        file.write_all(data)
            .await
            .map_err(|e| write_error(path, offset, e))?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Command for StorageNode {
    #[tracing::instrument(skip(self), name = "storage.create")]
    async fn create(&self, path: &Path) -> StorageResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let _guard = self.locks.lock(path).await;
        let full = self.root.creatable(path).await?;

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
        {
            Ok(_) => {
                tracing::debug!("Created {}", path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self), name = "storage.delete")]
    async fn delete(&self, path: &Path) -> StorageResult<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let _guard = self.locks.lock(path).await;
        let full = self.root.creatable(path).await?;

        let meta = match fs::symlink_metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if meta.is_dir() {
            let removed = tokio::task::spawn_blocking(move || local::remove_tree(&full))
                .await
                .map_err(|e| io::Error::other(e.to_string()))?;
            Ok(removed)
        } else {
            fs::remove_file(&full).await?;
            tracing::debug!("Deleted {}", path);
            Ok(true)
        }
    }

    #[tracing::instrument(skip(self, source), fields(source = %source.endpoint()), name = "storage.copy")]
    async fn copy(&self, path: &Path, source: &StorageHandle) -> StorageResult<bool> {
        if path.is_root() {
            return Err(StorageError::not_found(path));
        }
        if source.endpoint() == &self.config.storage_endpoint {
            // Already the holder.
            self.root.existing_file(path).await?;
            return Ok(true);
        }

        let size = source.size(path).await?;
        let full = self.root.creatable(path).await?;
        let (Some(parent), Ok(name)) = (full.parent(), path.last()) else {
            return Err(StorageError::not_found(path));
        };
        fs::create_dir_all(parent).await?;
        let seq = self.copy_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = parent.join(format!(".{}{}{}", name, COPY_TEMP_MARKER, seq));

        // The file lock is only taken for the swap, so the source may be
        // pulling from this node at the same time.
        if let Err(e) = self.fetch(path, source, size, &tmp).await {
            discard(&tmp).await;
            return Err(e);
        }
        let _guard = self.locks.lock(path).await;
        if let Err(e) = fs::rename(&tmp, &full).await {
            discard(&tmp).await;
            return Err(e.into());
        }

        tracing::info!("Copied {} ({} bytes) from {}", path, size, source.endpoint());
        Ok(true)
    }
}
