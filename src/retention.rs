//! Age-based retention over the backup directory.
//!
//! An artifact older than the retention window is removed as one logical
//! unit: every archive first, the metadata record last, so a crash mid-prune
//! can leave a listed artifact with files present but never an orphaned
//! metadata record pointing at nothing. Safety snapshots are forensic, not
//! routine, and are never touched by this pass.

use crate::metadata::{self, BackupMetadata};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{info, warn};

/// What a prune pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Artifacts deleted (archives + metadata).
    pub removed: usize,
    /// Artifacts still inside the retention window.
    pub retained: usize,
}

/// Delete every artifact whose age is at least `retention_days`, judged
/// against the injected `now`. Returns counts for the run summary.
pub async fn prune(backup_dir: &Path, retention_days: u32, now: DateTime<Utc>) -> Result<PruneOutcome> {
    let cutoff = now - Duration::days(i64::from(retention_days));
    let records = BackupMetadata::list(backup_dir).await?;

    let mut removed = 0usize;
    let mut retained = 0usize;

    for record in records {
        let created = match metadata::parse_timestamp(&record.timestamp) {
            Ok(at) => at,
            Err(e) => {
                warn!(timestamp = %record.timestamp, error = %e, "skipping unparseable artifact");
                continue;
            }
        };

        if created > cutoff {
            retained += 1;
            continue;
        }

        // Archives first, metadata last.
        for archive in &record.archives {
            let path = backup_dir.join(&archive.file_name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tokio::fs::remove_file(record.path_in(backup_dir)).await?;

        info!(timestamp = %record.timestamp, "pruned expired artifact");
        removed += 1;
    }

    Ok(PruneOutcome { removed, retained })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{archive_file_name, safety_timestamp, ArchiveRecord};
    use crate::StoreKind;
    use chrono::TimeZone;

    async fn plant_artifact(dir: &Path, ts: &str, safety: bool) {
        let mut archives = Vec::new();
        for kind in StoreKind::ALL {
            let name = archive_file_name(kind, ts);
            std::fs::write(dir.join(&name), b"payload").unwrap();
            archives.push(ArchiveRecord {
                kind,
                file_name: name,
                size_bytes: 7,
                checksum: "00".to_string(),
            });
        }
        BackupMetadata {
            timestamp: ts.to_string(),
            environment: "test".to_string(),
            retention_days: 30,
            archives,
            safety_snapshot: safety,
        }
        .write(dir)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn prunes_exactly_the_expired_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap();

        // Ages 0, 29, 30, 31 days against a 30-day window.
        plant_artifact(dir.path(), "20260831_120000", false).await;
        plant_artifact(dir.path(), "20260802_120000", false).await;
        plant_artifact(dir.path(), "20260801_120000", false).await;
        plant_artifact(dir.path(), "20260731_120000", false).await;

        let outcome = prune(dir.path(), 30, now).await.unwrap();
        assert_eq!(outcome, PruneOutcome { removed: 2, retained: 2 });

        let left = BackupMetadata::list(dir.path()).await.unwrap();
        let timestamps: Vec<_> = left.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(timestamps, vec!["20260831_120000", "20260802_120000"]);

        // Archives of pruned artifacts are gone too.
        assert!(!dir
            .path()
            .join(archive_file_name(StoreKind::Vector, "20260801_120000"))
            .exists());
    }

    #[tokio::test]
    async fn safety_snapshots_are_never_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap();

        let ancient = safety_timestamp("20200101_000000");
        plant_artifact(dir.path(), &ancient, true).await;

        let outcome = prune(dir.path(), 30, now).await.unwrap();
        assert_eq!(outcome.removed, 0);
        assert!(dir
            .path()
            .join(archive_file_name(StoreKind::Vector, &ancient))
            .exists());
    }

    #[tokio::test]
    async fn missing_archive_does_not_orphan_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap();

        plant_artifact(dir.path(), "20260101_000000", false).await;
        // Someone removed one archive by hand; prune still completes.
        std::fs::remove_file(
            dir.path()
                .join(archive_file_name(StoreKind::Relational, "20260101_000000")),
        )
        .unwrap();

        let outcome = prune(dir.path(), 30, now).await.unwrap();
        assert_eq!(outcome.removed, 1);
        assert!(BackupMetadata::list(dir.path()).await.unwrap().is_empty());
    }
}
