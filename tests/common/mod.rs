// Shared test doubles: an in-memory relational store adapter and an
// in-memory remote transport, so the orchestrators can be exercised against
// real tar/gzip archives on temp directories without PostgreSQL or S3.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use kbvault::adapter::{ArchiveInfo, StoreAdapter};
use kbvault::config::{BrdrConfig, RelationalStoreHandle, VectorStoreHandle};
use kbvault::transport::RemoteTransport;
use kbvault::{BrdrError, Result, StoreKind};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// Config pointing everything at a scratch directory.
pub fn test_config(root: &Path) -> BrdrConfig {
    BrdrConfig {
        backup_dir: root.join("backups"),
        retention_days: 30,
        environment: "test".to_string(),
        vector: VectorStoreHandle {
            path: root.join("chroma_db"),
        },
        relational: RelationalStoreHandle {
            url: "postgres://unused/test".to_string(),
        },
        remote: None,
        notify_url: None,
    }
}

/// Relational store stand-in: rows live in memory, snapshots are the same
/// gzipped logical-dump shape the real adapter produces (header + one line
/// per row).
pub struct MemoryRelationalAdapter {
    pub rows: Arc<Mutex<Vec<String>>>,
    pub fail_restore: AtomicBool,
    pub fail_health: AtomicBool,
}

impl MemoryRelationalAdapter {
    pub fn new(rows: Vec<String>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(rows)),
            fail_restore: AtomicBool::new(false),
            fail_health: AtomicBool::new(false),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn set_rows(&self, rows: Vec<String>) {
        *self.rows.lock().unwrap() = rows;
    }
}

#[async_trait]
impl StoreAdapter for MemoryRelationalAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    async fn snapshot(&self, dest: &Path) -> Result<ArchiveInfo> {
        let mut dump = String::from("-- kbvault test dump\n");
        for row in self.rows.lock().unwrap().iter() {
            dump.push_str(row);
            dump.push('\n');
        }

        let file = std::fs::File::create(dest)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(dump.as_bytes())?;
        encoder.finish()?;

        let bytes = std::fs::read(dest)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(ArchiveInfo {
            kind: StoreKind::Relational,
            path: dest.to_path_buf(),
            size_bytes: bytes.len() as u64,
            checksum: format!("{:x}", hasher.finalize()),
        })
    }

    async fn restore(&self, archive: &Path) -> Result<()> {
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(BrdrError::WriteFailed {
                store: StoreKind::Relational,
                detail: "injected restore failure".to_string(),
            });
        }
        let file = std::fs::File::open(archive)?;
        let mut dump = String::new();
        GzDecoder::new(file).read_to_string(&mut dump)?;
        let rows: Vec<String> = dump
            .lines()
            .filter(|l| !l.starts_with("--") && !l.is_empty())
            .map(|l| l.to_string())
            .collect();
        *self.rows.lock().unwrap() = rows;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        if self.fail_health.load(Ordering::SeqCst) {
            return Err(BrdrError::TargetUnavailable {
                store: StoreKind::Relational,
                detail: "injected unreachable store".to_string(),
            });
        }
        Ok(())
    }
}

/// Vector adapter stand-in that always emits a truncated archive, for
/// verification-gating tests.
pub struct TruncatingVectorAdapter;

#[async_trait]
impl StoreAdapter for TruncatingVectorAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Vector
    }

    async fn snapshot(&self, dest: &Path) -> Result<ArchiveInfo> {
        // Valid gzip start, chopped before the footer.
        let file = std::fs::File::create(dest)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&vec![0u8; 100_000])?;
        encoder.finish()?;
        let bytes = std::fs::read(dest)?;
        std::fs::write(dest, &bytes[..bytes.len() / 2])?;
        Ok(ArchiveInfo {
            kind: StoreKind::Vector,
            path: dest.to_path_buf(),
            size_bytes: (bytes.len() / 2) as u64,
            checksum: "truncated".to_string(),
        })
    }

    async fn restore(&self, _archive: &Path) -> Result<()> {
        unreachable!("a truncated archive must never reach restore")
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory object store implementing the transport seam.
#[derive(Default)]
pub struct MemoryTransport {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_uploads: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn key(kind: Option<StoreKind>, ts: &str) -> String {
        match kind {
            Some(kind) => format!("{}/{}", kind.as_str(), ts),
            None => format!("metadata/{ts}"),
        }
    }

    fn put(&self, key: String, path: &Path) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BrdrError::TransportFailure("injected outage".to_string()));
        }
        let bytes = std::fs::read(path)?;
        self.objects.lock().unwrap().insert(key, bytes);
        Ok(())
    }

    fn get(&self, key: &str, ts: &str, dest: &Path) -> Result<()> {
        let objects = self.objects.lock().unwrap();
        let bytes = objects.get(key).ok_or_else(|| BrdrError::NotFound {
            timestamp: ts.to_string(),
        })?;
        std::fs::write(dest, bytes)?;
        Ok(())
    }
}

#[async_trait]
impl RemoteTransport for MemoryTransport {
    async fn upload(&self, kind: StoreKind, path: &Path, ts: &str) -> Result<()> {
        self.put(Self::key(Some(kind), ts), path)
    }

    async fn upload_metadata(&self, path: &Path, ts: &str) -> Result<()> {
        self.put(Self::key(None, ts), path)
    }

    async fn download(&self, kind: StoreKind, ts: &str, dest: &Path) -> Result<()> {
        self.get(&Self::key(Some(kind), ts), ts, dest)
    }

    async fn download_metadata(&self, ts: &str, dest: &Path) -> Result<()> {
        self.get(&Self::key(None, ts), ts, dest)
    }
}

/// Seed a fake vector persist directory with the given files.
pub fn seed_vector_store(dir: &Path, files: &[(&str, &[u8])]) {
    std::fs::create_dir_all(dir).unwrap();
    for (name, content) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// Count regular files under a directory, recursively.
pub fn file_count(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}
