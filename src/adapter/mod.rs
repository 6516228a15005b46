//! Store adapters.
//!
//! One narrow adapter per store type, behind a common trait. The two
//! adapters share a contract but nothing else: the vector store is archived
//! as a directory tree, the relational store as a logical SQL dump. Both
//! promise that `snapshot` is strictly read-only on the source store.

use crate::{Result, StoreKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

pub mod relational;
pub mod vector;

pub use relational::RelationalStoreAdapter;
pub use vector::VectorStoreAdapter;

/// Description of one archive produced by a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Store the archive was taken from.
    pub kind: StoreKind,
    /// Where the archive was written.
    pub path: PathBuf,
    /// Compressed size on disk.
    pub size_bytes: u64,
    /// SHA-256 hex digest of the archive file.
    pub checksum: String,
}

/// Common contract for the two store adapters.
///
/// `snapshot` must never mutate the source store; `restore` is destructive
/// on the target by design and is only reached after the restore
/// orchestrator has taken a safety snapshot.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Which store this adapter manages.
    fn kind(&self) -> StoreKind;

    /// Archive the current store state into `dest`.
    async fn snapshot(&self, dest: &Path) -> Result<ArchiveInfo>;

    /// Overwrite the store with the contents of `archive`.
    async fn restore(&self, archive: &Path) -> Result<()>;

    /// Lightweight post-restore reachability probe.
    async fn health_check(&self) -> Result<()>;
}

/// SHA-256 hex digest of a file, streamed in 64 KiB chunks.
pub(crate) fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Build an [`ArchiveInfo`] for a freshly written archive file.
pub(crate) fn describe_archive(kind: StoreKind, path: &Path) -> std::io::Result<ArchiveInfo> {
    let size_bytes = std::fs::metadata(path)?.len();
    let checksum = sha256_file(path)?;
    Ok(ArchiveInfo {
        kind,
        path: path.to_path_buf(),
        size_bytes,
        checksum,
    })
}
