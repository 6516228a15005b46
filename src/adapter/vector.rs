//! Vector store adapter.
//!
//! The vector store is a ChromaDB-style persist directory with no per-item
//! export format, so the snapshot is structure-preserving: the whole tree is
//! packed into one gzip-compressed tar archive with paths relative to the
//! persist directory root. Archiving and unpacking are CPU/disk bound and run
//! under `spawn_blocking`.

use super::{describe_archive, ArchiveInfo, StoreAdapter};
use crate::config::VectorStoreHandle;
use crate::{BrdrError, Result, StoreKind};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder as TarBuilder};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Adapter packaging the vector persist directory as `.tar.gz`.
pub struct VectorStoreAdapter {
    handle: VectorStoreHandle,
}

impl VectorStoreAdapter {
    /// Create an adapter for the given persist directory.
    pub fn new(handle: VectorStoreHandle) -> Self {
        Self { handle }
    }

    fn map_io(err: std::io::Error, reading_source: bool) -> BrdrError {
        let store = StoreKind::Vector;
        match err.kind() {
            ErrorKind::PermissionDenied => BrdrError::PermissionDenied {
                store,
                detail: err.to_string(),
            },
            ErrorKind::NotFound if reading_source => BrdrError::SourceUnavailable {
                store,
                detail: err.to_string(),
            },
            _ if reading_source => BrdrError::SourceUnavailable {
                store,
                detail: err.to_string(),
            },
            _ => BrdrError::WriteFailed {
                store,
                detail: err.to_string(),
            },
        }
    }

    fn pack(source: &Path, dest: &Path) -> Result<()> {
        let tar_file = std::fs::File::create(dest).map_err(|e| Self::map_io(e, false))?;
        let encoder = GzEncoder::new(tar_file, Compression::default());
        let mut builder = TarBuilder::new(encoder);

        let mut file_count = 0usize;
        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|e| BrdrError::SourceUnavailable {
                store: StoreKind::Vector,
                detail: format!("walking {}: {}", source.display(), e),
            })?;
            let path = entry.path();
            if path.is_file() {
                let relative = path.strip_prefix(source).expect("walkdir stays under root");
                builder
                    .append_path_with_name(path, relative)
                    .map_err(|e| Self::map_io(e, true))?;
                file_count += 1;
            }
        }

        // A persist directory with no files is an uninitialized store, not a
        // backup candidate; refusing here gives a clearer error than letting
        // an empty archive fail verification downstream.
        if file_count == 0 {
            drop(builder);
            let _ = std::fs::remove_file(dest);
            return Err(BrdrError::SourceUnavailable {
                store: StoreKind::Vector,
                detail: format!("{} contains no files; nothing to snapshot", source.display()),
            });
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| Self::map_io(e, false))?;
        encoder.finish().map_err(|e| Self::map_io(e, false))?;
        Ok(())
    }

    fn unpack(archive: &Path, target: &Path) -> Result<()> {
        let store = StoreKind::Vector;
        let file = std::fs::File::open(archive).map_err(|e| BrdrError::Unreadable {
            store,
            detail: e.to_string(),
        })?;

        // Unpack next to the target first so a bad archive never leaves the
        // store half-overwritten, then swap the directories.
        let staging = staging_path(target);
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| Self::map_io(e, false))?;
        }
        std::fs::create_dir_all(&staging).map_err(|e| Self::map_io(e, false))?;

        let mut tar = Archive::new(GzDecoder::new(file));
        tar.unpack(&staging).map_err(|e| BrdrError::WriteFailed {
            store,
            detail: format!("unpacking into {}: {}", staging.display(), e),
        })?;

        if target.exists() {
            std::fs::remove_dir_all(target).map_err(|e| Self::map_io(e, false))?;
        }
        std::fs::rename(&staging, target).map_err(|e| Self::map_io(e, false))?;
        Ok(())
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "vector_store".to_string());
    target.with_file_name(format!("{name}.restoring"))
}

#[async_trait]
impl StoreAdapter for VectorStoreAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Vector
    }

    async fn snapshot(&self, dest: &Path) -> Result<ArchiveInfo> {
        let source = self.handle.path.clone();
        if !source.is_dir() {
            return Err(BrdrError::SourceUnavailable {
                store: StoreKind::Vector,
                detail: format!("{} is not a directory", source.display()),
            });
        }

        let dest = dest.to_path_buf();
        debug!(source = %source.display(), dest = %dest.display(), "archiving vector store");

        let info = tokio::task::spawn_blocking(move || -> Result<ArchiveInfo> {
            Self::pack(&source, &dest)?;
            describe_archive(StoreKind::Vector, &dest).map_err(|e| Self::map_io(e, false))
        })
        .await??;

        info!(
            size_bytes = info.size_bytes,
            checksum = %info.checksum,
            "vector store snapshot complete"
        );
        Ok(info)
    }

    async fn restore(&self, archive: &Path) -> Result<()> {
        let archive = archive.to_path_buf();
        let target = self.handle.path.clone();
        info!(
            archive = %archive.display(),
            target = %target.display(),
            "restoring vector store"
        );

        tokio::task::spawn_blocking(move || Self::unpack(&archive, &target)).await??;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let path = self.handle.path.clone();
        let mut entries =
            tokio::fs::read_dir(&path)
                .await
                .map_err(|e| BrdrError::TargetUnavailable {
                    store: StoreKind::Vector,
                    detail: format!("{}: {}", path.display(), e),
                })?;
        match entries.next_entry().await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(BrdrError::TargetUnavailable {
                store: StoreKind::Vector,
                detail: format!("{} restored empty", path.display()),
            }),
            Err(e) => Err(BrdrError::TargetUnavailable {
                store: StoreKind::Vector,
                detail: e.to_string(),
            }),
        }
    }
}
