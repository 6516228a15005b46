//! Dry-run strategy for the backup orchestrator.
//!
//! The original scripts threaded a dry-run boolean through every branch by
//! hand. Here the side-effecting steps (metadata write, upload, retention)
//! sit behind one trait with two implementations, so a step cannot forget to
//! be dry-run-aware: the orchestrator never branches on a flag, it just
//! calls the executor it was given.

use crate::metadata::BackupMetadata;
use crate::retention::{self, PruneOutcome};
use crate::transport::RemoteTransport;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// The side-effecting tail of a backup run (steps after snapshot+verify).
#[async_trait]
pub trait Executor: Send + Sync {
    /// Whether this executor performs durable side effects.
    fn is_dry_run(&self) -> bool;

    /// Persist the metadata record (step 4).
    async fn write_metadata(&self, record: &BackupMetadata, dir: &Path) -> Result<()>;

    /// Upload verified archives and the metadata record (step 5).
    async fn upload_artifact(
        &self,
        transport: &dyn RemoteTransport,
        record: &BackupMetadata,
        dir: &Path,
    ) -> Result<()>;

    /// Run the retention pass (step 6).
    async fn prune(&self, dir: &Path, retention_days: u32, now: DateTime<Utc>)
        -> Result<PruneOutcome>;

    /// Lines describing what a dry run would have done; empty for real runs.
    fn plan(&self) -> Vec<String>;
}

/// Executor that actually performs every step.
pub struct RealExecutor;

#[async_trait]
impl Executor for RealExecutor {
    fn is_dry_run(&self) -> bool {
        false
    }

    async fn write_metadata(&self, record: &BackupMetadata, dir: &Path) -> Result<()> {
        record.write(dir).await?;
        Ok(())
    }

    async fn upload_artifact(
        &self,
        transport: &dyn RemoteTransport,
        record: &BackupMetadata,
        dir: &Path,
    ) -> Result<()> {
        for archive in &record.archives {
            transport
                .upload(archive.kind, &dir.join(&archive.file_name), &record.timestamp)
                .await?;
        }
        transport
            .upload_metadata(&record.path_in(dir), &record.timestamp)
            .await?;
        Ok(())
    }

    async fn prune(
        &self,
        dir: &Path,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<PruneOutcome> {
        retention::prune(dir, retention_days, now).await
    }

    fn plan(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Executor that records what would happen and performs nothing durable.
#[derive(Default)]
pub struct DryRunExecutor {
    steps: Mutex<Vec<String>>,
}

impl DryRunExecutor {
    /// New empty plan recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, step: String) {
        info!(step = %step, "dry-run");
        self.steps.lock().expect("plan mutex").push(step);
    }
}

#[async_trait]
impl Executor for DryRunExecutor {
    fn is_dry_run(&self) -> bool {
        true
    }

    async fn write_metadata(&self, record: &BackupMetadata, dir: &Path) -> Result<()> {
        self.record(format!(
            "would write {} ({} archives, {} bytes total)",
            record.path_in(dir).display(),
            record.archives.len(),
            record.total_bytes()
        ));
        Ok(())
    }

    async fn upload_artifact(
        &self,
        _transport: &dyn RemoteTransport,
        record: &BackupMetadata,
        _dir: &Path,
    ) -> Result<()> {
        for archive in &record.archives {
            self.record(format!(
                "would upload {} to {}/ prefix",
                archive.file_name,
                archive.kind.as_str()
            ));
        }
        self.record(format!(
            "would upload metadata record for {}",
            record.timestamp
        ));
        Ok(())
    }

    async fn prune(
        &self,
        _dir: &Path,
        retention_days: u32,
        _now: DateTime<Utc>,
    ) -> Result<PruneOutcome> {
        self.record(format!(
            "would prune artifacts older than {retention_days} days"
        ));
        Ok(PruneOutcome {
            removed: 0,
            retained: 0,
        })
    }

    fn plan(&self) -> Vec<String> {
        self.steps.lock().expect("plan mutex").clone()
    }
}
