//! Backup metadata records and the on-disk artifact naming convention.
//!
//! The naming scheme is the persisted-state layout both `list-backups` and
//! `restore` parse, so it is deliberately rigid:
//!
//! - `vector_backup_{ts}.tar.gz` / `relational_backup_{ts}.sql.gz`
//! - `backup_metadata_{ts}.json`
//! - safety snapshots use a `safety_{ts}` timestamp, which doubles as the
//!   marker exempting them from retention and from `list-backups`.
//!
//! A metadata record is written only after every archive has verified, is
//! never mutated afterwards, and is deleted only by the retention manager.

use crate::adapter::ArchiveInfo;
use crate::{BrdrError, Result, StoreKind};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const TS_FORMAT: &str = "%Y%m%d_%H%M%S";
const SAFETY_PREFIX: &str = "safety_";
const METADATA_PREFIX: &str = "backup_metadata_";

/// Format an instant as an artifact timestamp key.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TS_FORMAT).to_string()
}

/// Timestamp key for a run starting now.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Turn a regular timestamp into its safety-snapshot form.
pub fn safety_timestamp(ts: &str) -> String {
    format!("{SAFETY_PREFIX}{ts}")
}

/// Whether a timestamp key denotes a safety snapshot.
pub fn is_safety(ts: &str) -> bool {
    ts.starts_with(SAFETY_PREFIX)
}

/// Parse a timestamp key (safety or regular) back into an instant.
pub fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>> {
    let bare = ts.strip_prefix(SAFETY_PREFIX).unwrap_or(ts);
    let naive = NaiveDateTime::parse_from_str(bare, TS_FORMAT)
        .map_err(|e| BrdrError::Config(format!("bad timestamp {ts:?}: {e}")))?;
    Ok(naive.and_utc())
}

/// Archive file name for a store kind and timestamp key.
pub fn archive_file_name(kind: StoreKind, ts: &str) -> String {
    format!("{}_backup_{}.{}", kind.as_str(), ts, kind.extension())
}

/// Metadata record file name for a timestamp key.
pub fn metadata_file_name(ts: &str) -> String {
    format!("{METADATA_PREFIX}{ts}.json")
}

/// One archive's entry inside a metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Store the archive covers.
    pub kind: StoreKind,
    /// File name within the backup directory (no path).
    pub file_name: String,
    /// Compressed size on disk.
    pub size_bytes: u64,
    /// SHA-256 hex digest.
    pub checksum: String,
}

impl ArchiveRecord {
    /// Build a record from a verified archive.
    pub fn from_info(info: &ArchiveInfo) -> Self {
        let file_name = info
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            kind: info.kind,
            file_name,
            size_bytes: info.size_bytes,
            checksum: info.checksum.clone(),
        }
    }
}

/// The source of truth for retention and restore-time artifact selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Artifact identity key.
    pub timestamp: String,
    /// Deployment environment the backup was taken in.
    pub environment: String,
    /// Retention window in effect when the artifact was created.
    pub retention_days: u32,
    /// One entry per store archive.
    pub archives: Vec<ArchiveRecord>,
    /// True for pre-restore safety snapshots.
    pub safety_snapshot: bool,
}

impl BackupMetadata {
    /// Path of this record inside `dir`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(metadata_file_name(&self.timestamp))
    }

    /// Sum of archive sizes, for summaries.
    pub fn total_bytes(&self) -> u64 {
        self.archives.iter().map(|a| a.size_bytes).sum()
    }

    /// Persist the record as pretty JSON. Called exactly once per artifact,
    /// after verification.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = self.path_in(dir);
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    /// Load the record for `ts`, or `NotFound` if the artifact does not
    /// exist (or was never marked valid).
    pub async fn load(dir: &Path, ts: &str) -> Result<Self> {
        let path = dir.join(metadata_file_name(ts));
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BrdrError::NotFound {
                    timestamp: ts.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }

    /// Enumerate valid metadata records in `dir`, most recent first.
    ///
    /// Safety snapshots and unparseable files are skipped, never errors: a
    /// stray file in the backup directory must not break `list-backups`.
    pub async fn list(dir: &Path) -> Result<Vec<Self>> {
        let mut records = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(ts) = name
                .strip_prefix(METADATA_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };
            if is_safety(ts) {
                continue;
            }
            if let Ok(json) = tokio::fs::read_to_string(entry.path()).await {
                if let Ok(record) = serde_json::from_str::<Self>(&json) {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}
