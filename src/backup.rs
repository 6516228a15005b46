//! Backup orchestrator.
//!
//! Sequences the adapters, verifier, metadata writer, transport, and
//! retention pass into one operation with a hard guarantee: once steps 1-4
//! have completed, a consistent, verified, locally-durable artifact exists
//! regardless of how upload or retention fare afterwards. Any failure before
//! the metadata write aborts the run and discards partial archives, so an
//! unverified artifact can never be selected later.

use crate::adapter::{RelationalStoreAdapter, StoreAdapter, VectorStoreAdapter};
use crate::config::BrdrConfig;
use crate::executor::{DryRunExecutor, Executor, RealExecutor};
use crate::lock::RunLock;
use crate::metadata::{self, ArchiveRecord, BackupMetadata};
use crate::retention::PruneOutcome;
use crate::transport::{RemoteTransport, S3Transport};
use crate::verify;
use crate::{Result, StoreKind};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of one backup run.
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// Artifact identity key (empty plan/archives for aborted runs never
    /// reach a report; errors are returned instead).
    pub timestamp: String,
    /// Verified archives, one per store.
    pub archives: Vec<ArchiveRecord>,
    /// `None` when remote transport is not configured, otherwise whether
    /// the off-site copy succeeded.
    pub uploaded: Option<bool>,
    /// Retention pass counts.
    pub pruned: PruneOutcome,
    /// True when produced by `--dry-run`.
    pub dry_run: bool,
    /// Would-do lines recorded by a dry run.
    pub plan: Vec<String>,
}

/// Drives the full backup sequence of snapshots, verification, metadata,
/// upload, and retention.
pub struct BackupOrchestrator {
    config: BrdrConfig,
    vector: Arc<dyn StoreAdapter>,
    relational: Arc<dyn StoreAdapter>,
    transport: Option<Arc<dyn RemoteTransport>>,
}

impl BackupOrchestrator {
    /// Orchestrator over the real store adapters. Remote transport is wired
    /// lazily on first use so a missing bucket config costs nothing.
    pub fn new(config: BrdrConfig) -> Self {
        let vector = Arc::new(VectorStoreAdapter::new(config.vector.clone()));
        let relational = Arc::new(RelationalStoreAdapter::new(config.relational.clone()));
        Self {
            config,
            vector,
            relational,
            transport: None,
        }
    }

    /// Orchestrator with injected adapters and transport, for tests and for
    /// embedding in the restore orchestrator.
    pub fn with_adapters(
        config: BrdrConfig,
        vector: Arc<dyn StoreAdapter>,
        relational: Arc<dyn StoreAdapter>,
        transport: Option<Arc<dyn RemoteTransport>>,
    ) -> Self {
        Self {
            config,
            vector,
            relational,
            transport,
        }
    }

    /// The configuration this orchestrator runs under.
    pub fn config(&self) -> &BrdrConfig {
        &self.config
    }

    pub(crate) async fn transport(&self) -> Option<Arc<dyn RemoteTransport>> {
        if let Some(ref transport) = self.transport {
            return Some(Arc::clone(transport));
        }
        let remote = self.config.remote.clone()?;
        match S3Transport::new(remote).await {
            Ok(transport) => Some(Arc::new(transport)),
            Err(e) => {
                warn!(error = %e, "remote transport unavailable, continuing local-only");
                None
            }
        }
    }

    /// Run a full backup (steps 1-7).
    pub async fn run(&self) -> Result<BackupReport> {
        self.run_with(&RealExecutor).await
    }

    /// Run steps 1-3 only, reporting what a real run would do.
    pub async fn dry_run(&self) -> Result<BackupReport> {
        self.run_with(&DryRunExecutor::new()).await
    }

    /// Run the backup sequence under the given executor strategy.
    pub async fn run_with(&self, executor: &dyn Executor) -> Result<BackupReport> {
        // Step 1: the directory must exist before the lock file can.
        tokio::fs::create_dir_all(&self.config.backup_dir).await?;
        let _lock = RunLock::acquire(&self.config.backup_dir)?;

        let timestamp = metadata::now_timestamp();
        info!(timestamp = %timestamp, dry_run = executor.is_dry_run(), "backup run starting");

        // Dry runs snapshot into a scratch directory that is removed whole,
        // so two consecutive dry runs leave no artifacts behind.
        let scratch;
        let dest_dir: &Path = if executor.is_dry_run() {
            scratch = std::env::temp_dir().join(format!(
                "kbvault-dryrun-{}-{}",
                std::process::id(),
                timestamp
            ));
            tokio::fs::create_dir_all(&scratch).await?;
            &scratch
        } else {
            &self.config.backup_dir
        };

        let result = self
            .snapshot_and_verify(dest_dir, &timestamp, executor)
            .await;

        if executor.is_dry_run() {
            let cleanup_dir = dest_dir.to_path_buf();
            if let Err(e) = tokio::fs::remove_dir_all(&cleanup_dir).await {
                warn!(dir = %cleanup_dir.display(), error = %e, "failed to remove dry-run scratch");
            }
        }

        let record = result?;

        // Step 5: best-effort upload; a transport failure degrades the run,
        // it never fails it.
        let uploaded = match self.transport().await {
            Some(transport) => {
                match executor
                    .upload_artifact(transport.as_ref(), &record, &self.config.backup_dir)
                    .await
                {
                    Ok(()) => Some(true),
                    Err(e) => {
                        warn!(
                            timestamp = %timestamp,
                            error = %e,
                            "remote upload failed; local backup remains valid"
                        );
                        Some(false)
                    }
                }
            }
            None => None,
        };

        // Step 6: retention.
        let pruned = executor
            .prune(&self.config.backup_dir, self.config.retention_days, Utc::now())
            .await?;

        let report = BackupReport {
            timestamp: timestamp.clone(),
            archives: record.archives.clone(),
            uploaded,
            pruned,
            dry_run: executor.is_dry_run(),
            plan: executor.plan(),
        };

        info!(
            timestamp = %timestamp,
            total_bytes = record.total_bytes(),
            uploaded = ?report.uploaded,
            pruned = report.pruned.removed,
            "backup run complete"
        );

        if let Some(ref url) = self.config.notify_url {
            if !executor.is_dry_run() {
                let status = match report.uploaded {
                    Some(false) => "degraded",
                    _ => "success",
                };
                crate::notify::send(
                    url,
                    "backup",
                    &timestamp,
                    status,
                    &format!("{} bytes across {} archives", record.total_bytes(), record.archives.len()),
                )
                .await;
            }
        }

        Ok(report)
    }

    /// Steps 2-4 of the sequence: concurrent snapshots, a join point, then
    /// verification of every archive, then the metadata record.
    ///
    /// Used directly by the restore orchestrator for safety snapshots (which
    /// pass a `safety_*` timestamp and skip upload/retention entirely).
    pub async fn snapshot_and_verify(
        &self,
        dest_dir: &Path,
        timestamp: &str,
        executor: &dyn Executor,
    ) -> Result<BackupMetadata> {
        let vector_path = dest_dir.join(metadata::archive_file_name(StoreKind::Vector, timestamp));
        let relational_path =
            dest_dir.join(metadata::archive_file_name(StoreKind::Relational, timestamp));

        // Step 2: the stores are disjoint, so their snapshots may overlap.
        let (vector_result, relational_result) = tokio::join!(
            self.vector.snapshot(&vector_path),
            self.relational.snapshot(&relational_path),
        );

        let infos = match (vector_result, relational_result) {
            (Ok(v), Ok(r)) => vec![v, r],
            (vector_result, relational_result) => {
                discard(&vector_path).await;
                discard(&relational_path).await;
                let err = vector_result.err().or(relational_result.err()).expect("one failed");
                error!(
                    store = ?err.store(),
                    kind = err.kind(),
                    "snapshot failed, aborting backup run"
                );
                return Err(err);
            }
        };

        // Step 3: verify every archive before anything durable is recorded.
        for info in &infos {
            if let Err(err) = verify::verify(info.kind, &info.path).await {
                error!(
                    store = %info.kind,
                    kind = err.kind(),
                    "integrity verification failed, aborting backup run"
                );
                for info in &infos {
                    discard(&info.path).await;
                }
                return Err(err);
            }
        }

        // Step 4: the artifact becomes valid only now.
        let record = BackupMetadata {
            timestamp: timestamp.to_string(),
            environment: self.config.environment.clone(),
            retention_days: self.config.retention_days,
            archives: infos.iter().map(ArchiveRecord::from_info).collect(),
            safety_snapshot: metadata::is_safety(timestamp),
        };
        executor.write_metadata(&record, dest_dir).await?;

        Ok(record)
    }

}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to discard partial archive"),
    }
}
