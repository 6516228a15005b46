//! Restore orchestrator.
//!
//! A restore is destructive, so it moves through an explicit phase sequence:
//! confirmation gate, safety snapshot of the current (possibly broken)
//! state, artifact fetch, per-store restore, and a post-restore
//! reachability check. The two stores are independent failure domains: one
//! store failing neither rolls back nor blocks the other, and the partial
//! result is reported rather than hidden. The safety snapshot's location is
//! surfaced in every report, success or failure.

use crate::adapter::{RelationalStoreAdapter, StoreAdapter, VectorStoreAdapter};
use crate::backup::BackupOrchestrator;
use crate::config::BrdrConfig;
use crate::executor::RealExecutor;
use crate::lock::RunLock;
use crate::metadata::{self, BackupMetadata};
use crate::transport::RemoteTransport;
use crate::{BrdrError, Result, StoreKind};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Phases of the restore state machine. The run logs each phase as it
/// advances; the report carries the final one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePhase {
    /// Nothing started yet.
    Idle,
    /// Waiting on explicit operator confirmation.
    ConfirmationRequired,
    /// Backing up the current state before any destructive write.
    SafetySnapshotting,
    /// Locating or downloading the requested artifact.
    Fetching,
    /// Adapters writing into the stores.
    Restoring,
    /// Post-restore reachability checks.
    Verifying,
    /// All stores restored and verified.
    Completed,
    /// At least one store did not come back.
    Failed,
}

/// Where the artifact is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The local backup directory.
    Local,
    /// The configured object-storage bucket.
    Remote,
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "local" => Ok(Source::Local),
            "remote" => Ok(Source::Remote),
            other => Err(format!("expected 'local' or 'remote', got {other:?}")),
        }
    }
}

/// Operator request for one restore run.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    /// Artifact identity key to restore.
    pub timestamp: String,
    /// Local directory or remote bucket.
    pub source: Source,
    /// Must be true; there is no unattended restore path.
    pub confirmed: bool,
}

/// Per-store end state of a restore.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StoreOutcome {
    /// Restored and reachable.
    Restored,
    /// Restore or verification failed; the error kind and detail say which.
    Failed {
        /// Machine-parseable error kind.
        kind: String,
        /// Human-readable cause.
        detail: String,
    },
}

/// Overall run status, mapped to distinct process exit codes by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    /// Every store restored and verified.
    Success,
    /// Some stores restored, some failed; the operator knows exactly which.
    PartialFailure,
    /// No store restored.
    Failure,
}

/// Outcome of one restore run.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// The artifact that was restored.
    pub timestamp: String,
    /// Final phase reached.
    pub phase: RestorePhase,
    /// Timestamp key of the pre-restore safety snapshot. Always present
    /// once the run got past the confirmation gate.
    pub safety_snapshot: Option<String>,
    /// Per-store end states.
    pub outcomes: Vec<(StoreKind, StoreOutcome)>,
    /// Overall status.
    pub status: RestoreStatus,
}

impl RestoreReport {
    fn status_of(outcomes: &[(StoreKind, StoreOutcome)]) -> RestoreStatus {
        let failed = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, StoreOutcome::Failed { .. }))
            .count();
        if failed == 0 {
            RestoreStatus::Success
        } else if failed == outcomes.len() {
            RestoreStatus::Failure
        } else {
            RestoreStatus::PartialFailure
        }
    }
}

/// Drives the restore state machine.
pub struct RestoreOrchestrator {
    backup: BackupOrchestrator,
    vector: Arc<dyn StoreAdapter>,
    relational: Arc<dyn StoreAdapter>,
}

impl RestoreOrchestrator {
    /// Orchestrator over the real store adapters.
    pub fn new(config: BrdrConfig) -> Self {
        let vector: Arc<dyn StoreAdapter> =
            Arc::new(VectorStoreAdapter::new(config.vector.clone()));
        let relational: Arc<dyn StoreAdapter> =
            Arc::new(RelationalStoreAdapter::new(config.relational.clone()));
        let backup = BackupOrchestrator::with_adapters(
            config,
            Arc::clone(&vector),
            Arc::clone(&relational),
            None,
        );
        Self {
            backup,
            vector,
            relational,
        }
    }

    /// Orchestrator with injected adapters and transport, for tests.
    pub fn with_adapters(
        config: BrdrConfig,
        vector: Arc<dyn StoreAdapter>,
        relational: Arc<dyn StoreAdapter>,
        transport: Option<Arc<dyn RemoteTransport>>,
    ) -> Self {
        let backup = BackupOrchestrator::with_adapters(
            config,
            Arc::clone(&vector),
            Arc::clone(&relational),
            transport,
        );
        Self {
            backup,
            vector,
            relational,
        }
    }

    fn config(&self) -> &BrdrConfig {
        self.backup.config()
    }

    /// Run a restore. Returns `Err` for conditions that stop the run before
    /// any store is touched (no confirmation, lock held, artifact missing,
    /// safety snapshot failure); per-store restore failures after that point
    /// are reported in the `Ok` report instead.
    pub async fn run(&self, request: RestoreRequest) -> Result<RestoreReport> {
        info!(
            phase = ?RestorePhase::Idle,
            timestamp = %request.timestamp,
            source = ?request.source,
            "restore run starting"
        );
        if !request.confirmed {
            warn!(phase = ?RestorePhase::ConfirmationRequired, "refusing unconfirmed restore");
            return Err(BrdrError::ConfirmationRequired);
        }

        tokio::fs::create_dir_all(&self.config().backup_dir).await?;
        let _lock = RunLock::acquire(&self.config().backup_dir)?;

        let timestamp = request.timestamp.clone();

        // Safety snapshot of the current state, before any destructive
        // write. Local-only, retention-exempt, removed only by an operator.
        let safety_ts = metadata::safety_timestamp(&metadata::now_timestamp());
        info!(phase = ?RestorePhase::SafetySnapshotting, safety = %safety_ts, "taking pre-restore safety snapshot");
        let safety_record = self
            .backup
            .snapshot_and_verify(&self.config().backup_dir, &safety_ts, &RealExecutor)
            .await
            .map_err(|e| {
                error!(kind = e.kind(), "safety snapshot failed; restore aborted");
                e
            })?;

        // Fetch: resolve the artifact before touching anything.
        info!(phase = ?RestorePhase::Fetching, timestamp = %timestamp, "locating artifact");
        let record = self.fetch(&request).await?;

        // Restore both stores concurrently; failure domains are independent,
        // so even a missing or corrupted archive for one store only fails
        // that store.
        info!(phase = ?RestorePhase::Restoring, timestamp = %timestamp, "writing into stores");
        let (vector_result, relational_result) = tokio::join!(
            self.restore_store(&record, self.vector.as_ref()),
            self.restore_store(&record, self.relational.as_ref()),
        );

        // Reachability probes run after both restores have settled; a store
        // that restored at the file level but does not answer is downgraded.
        info!(phase = ?RestorePhase::Verifying, "running post-restore reachability checks");
        let (vector_result, relational_result) = tokio::join!(
            self.verify_store(self.vector.as_ref(), vector_result),
            self.verify_store(self.relational.as_ref(), relational_result),
        );

        let outcomes = vec![
            (StoreKind::Vector, vector_result),
            (StoreKind::Relational, relational_result),
        ];
        let status = RestoreReport::status_of(&outcomes);

        let report = RestoreReport {
            timestamp,
            phase: match status {
                RestoreStatus::Success => RestorePhase::Completed,
                _ => RestorePhase::Failed,
            },
            safety_snapshot: Some(safety_record.timestamp.clone()),
            outcomes,
            status,
        };

        info!(
            timestamp = %report.timestamp,
            status = ?report.status,
            safety = %safety_record.timestamp,
            "restore run finished"
        );

        if let Some(ref url) = self.config().notify_url {
            let status = match report.status {
                RestoreStatus::Success => "success",
                RestoreStatus::PartialFailure => "partial_failure",
                RestoreStatus::Failure => "failure",
            };
            crate::notify::send(
                url,
                "restore",
                &report.timestamp,
                status,
                &format!("safety snapshot: {}", safety_record.timestamp),
            )
            .await;
        }

        Ok(report)
    }

    /// Resolve and checksum-validate one store's archive from the record,
    /// then restore it. Every failure mode collapses into a per-store
    /// outcome rather than an error.
    async fn restore_store(&self, record: &BackupMetadata, adapter: &dyn StoreAdapter) -> StoreOutcome {
        let archive = match self.verified_archive_path(record, adapter.kind()).await {
            Ok(path) => path,
            Err(e) => {
                error!(store = %adapter.kind(), kind = e.kind(), "archive unavailable");
                return StoreOutcome::Failed {
                    kind: e.kind().to_string(),
                    detail: e.to_string(),
                };
            }
        };
        if let Err(e) = adapter.restore(&archive).await {
            error!(store = %adapter.kind(), kind = e.kind(), "store restore failed");
            return StoreOutcome::Failed {
                kind: e.kind().to_string(),
                detail: e.to_string(),
            };
        }
        StoreOutcome::Restored
    }

    /// A restore that "succeeded" at the file level but left the store
    /// unreachable is still a failure.
    async fn verify_store(&self, adapter: &dyn StoreAdapter, outcome: StoreOutcome) -> StoreOutcome {
        if !matches!(outcome, StoreOutcome::Restored) {
            return outcome;
        }
        match adapter.health_check().await {
            Ok(()) => StoreOutcome::Restored,
            Err(e) => {
                error!(store = %adapter.kind(), kind = e.kind(), "post-restore check failed");
                StoreOutcome::Failed {
                    kind: e.kind().to_string(),
                    detail: format!("restored but unreachable: {e}"),
                }
            }
        }
    }

    /// Locate the artifact: load local metadata, or download archives and
    /// metadata from the bucket first.
    async fn fetch(&self, request: &RestoreRequest) -> Result<BackupMetadata> {
        let dir = self.config().backup_dir.clone();
        let ts = &request.timestamp;

        match request.source {
            Source::Local => BackupMetadata::load(&dir, ts).await,
            Source::Remote => {
                let transport =
                    self.backup.transport().await.ok_or_else(|| {
                        BrdrError::Config("remote restore requested but no remote transport is configured".to_string())
                    })?;

                let metadata_dest = dir.join(metadata::metadata_file_name(ts));
                transport.download_metadata(ts, &metadata_dest).await?;

                for kind in StoreKind::ALL {
                    let dest = dir.join(metadata::archive_file_name(kind, ts));
                    transport.download(kind, ts, &dest).await?;
                }
                BackupMetadata::load(&dir, ts).await
            }
        }
    }

    /// Resolve the on-disk path for one of the artifact's archives and
    /// require its content to still match the checksum recorded when the
    /// artifact verified. `NotFound` if the file named by the record is
    /// missing, `ChecksumMismatch` if it has since been corrupted: a bad
    /// copy, local or downloaded, must never reach a destructive restore.
    async fn verified_archive_path(
        &self,
        record: &BackupMetadata,
        kind: StoreKind,
    ) -> Result<std::path::PathBuf> {
        let entry = record
            .archives
            .iter()
            .find(|a| a.kind == kind)
            .ok_or_else(|| BrdrError::NotFound {
                timestamp: record.timestamp.clone(),
            })?;
        let path = self.config().backup_dir.join(&entry.file_name);
        if !path.exists() {
            warn!(path = %path.display(), "archive named by metadata record is missing");
            return Err(BrdrError::NotFound {
                timestamp: record.timestamp.clone(),
            });
        }

        let digest_path = path.clone();
        let computed =
            tokio::task::spawn_blocking(move || crate::adapter::sha256_file(&digest_path))
                .await??;
        if computed != entry.checksum {
            warn!(
                path = %path.display(),
                expected = %entry.checksum,
                computed = %computed,
                "archive content does not match its metadata record"
            );
            return Err(BrdrError::ChecksumMismatch {
                store: kind,
                detail: format!("expected {}, computed {computed}", entry.checksum),
            });
        }
        Ok(path)
    }
}
