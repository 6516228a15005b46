//! # kbvault
//!
//! Backup, restore, and disaster-recovery tooling for the knowledge-base
//! chatbot's persistent state: a ChromaDB-style vector store (embedded
//! knowledge-base content) and a PostgreSQL relational store (usage,
//! analytics, and consent records).
//!
//! The subsystem guarantees that a backup is either complete and verified or
//! rejected, and that a restore never silently produces a
//! partially-consistent state. The surrounding chat application is an
//! external collaborator whose data is snapshotted and recovered without
//! interpreting its semantics.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kbvault::config::BrdrConfig;
//! use kbvault::backup::BackupOrchestrator;
//!
//! # async fn example() -> kbvault::Result<()> {
//! let config = BrdrConfig::from_env()?;
//! let orchestrator = BackupOrchestrator::new(config);
//! let report = orchestrator.run().await?;
//! println!("backed up artifact {}", report.timestamp);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: environment-derived configuration
//! - [`adapter`]: per-store snapshot/restore adapters
//! - [`verify`]: structural archive integrity checks
//! - [`metadata`]: backup metadata records and artifact naming
//! - [`retention`]: age-based pruning of the backup directory
//! - [`transport`]: optional S3-compatible off-site copies
//! - [`backup`] / [`restore`]: the two orchestrators
//! - [`runbook`]: operator-facing disaster-recovery checklists

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for kbvault operations
pub type Result<T> = std::result::Result<T, BrdrError>;

/// Which of the two protected stores an archive or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// The ChromaDB-style vector persist directory.
    Vector,
    /// The PostgreSQL usage/analytics/consent database.
    Relational,
}

impl StoreKind {
    /// Both known store kinds, in the order archives are produced.
    pub const ALL: [StoreKind; 2] = [StoreKind::Vector, StoreKind::Relational];

    /// Stable lowercase name used in file names, S3 prefixes, and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Vector => "vector",
            StoreKind::Relational => "relational",
        }
    }

    /// Archive file extension for this store's snapshot format.
    pub fn extension(&self) -> &'static str {
        match self {
            StoreKind::Vector => "tar.gz",
            StoreKind::Relational => "sql.gz",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for kbvault operations
#[derive(Error, Debug)]
pub enum BrdrError {
    /// Store unreachable while taking a snapshot
    #[error("{store} store unavailable for snapshot: {detail}")]
    SourceUnavailable {
        /// Store that could not be read
        store: StoreKind,
        /// Underlying cause
        detail: String,
    },

    /// Store unreachable while restoring
    #[error("{store} store unavailable for restore: {detail}")]
    TargetUnavailable {
        /// Store that could not be reached
        store: StoreKind,
        /// Underlying cause
        detail: String,
    },

    /// Filesystem or database permissions refused the operation
    #[error("permission denied on {store} store: {detail}")]
    PermissionDenied {
        /// Store the operation was against
        store: StoreKind,
        /// Underlying cause
        detail: String,
    },

    /// Restore write to a store failed
    #[error("write to {store} store failed: {detail}")]
    WriteFailed {
        /// Store being written
        store: StoreKind,
        /// Underlying cause
        detail: String,
    },

    /// Dump does not match the live schema at restore time
    #[error("schema mismatch restoring {store} store: {detail}")]
    SchemaMismatch {
        /// Store being restored
        store: StoreKind,
        /// Offending statement or object reported by the server
        detail: String,
    },

    /// Archive is structurally incomplete
    #[error("{store} archive is truncated: {detail}")]
    Truncated {
        /// Store the archive belongs to
        store: StoreKind,
        /// What the verifier observed
        detail: String,
    },

    /// Archive cannot be opened at all
    #[error("{store} archive is unreadable: {detail}")]
    Unreadable {
        /// Store the archive belongs to
        store: StoreKind,
        /// Underlying cause
        detail: String,
    },

    /// Archive content no longer matches the checksum recorded at backup time
    #[error("{store} archive failed checksum validation: {detail}")]
    ChecksumMismatch {
        /// Store the archive belongs to
        store: StoreKind,
        /// Expected vs computed digests
        detail: String,
    },

    /// Remote upload or download failed
    #[error("remote transport failure: {0}")]
    TransportFailure(String),

    /// No artifact exists for the requested timestamp
    #[error("no backup artifact found for timestamp {timestamp}")]
    NotFound {
        /// The timestamp that was requested
        timestamp: String,
    },

    /// Destructive operation attempted without operator confirmation
    #[error("restore is destructive and requires explicit confirmation (--yes)")]
    ConfirmationRequired,

    /// Another backup or restore run holds the backup directory
    #[error("backup directory is locked by another run: {holder}")]
    Locked {
        /// Contents of the lock file (pid and start time)
        holder: String,
    },

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata record (de)serialization error
    #[error("metadata serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Join error from a blocking archive task
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BrdrError {
    /// Stable machine-parseable kind tag for summaries and alerting.
    pub fn kind(&self) -> &'static str {
        match self {
            BrdrError::SourceUnavailable { .. } => "source_unavailable",
            BrdrError::TargetUnavailable { .. } => "target_unavailable",
            BrdrError::PermissionDenied { .. } => "permission_denied",
            BrdrError::WriteFailed { .. } => "write_failed",
            BrdrError::SchemaMismatch { .. } => "schema_mismatch",
            BrdrError::Truncated { .. } => "truncated",
            BrdrError::Unreadable { .. } => "unreadable",
            BrdrError::ChecksumMismatch { .. } => "checksum_mismatch",
            BrdrError::TransportFailure(_) => "transport_failure",
            BrdrError::NotFound { .. } => "not_found",
            BrdrError::ConfirmationRequired => "confirmation_required",
            BrdrError::Locked { .. } => "locked",
            BrdrError::Config(_) => "config",
            BrdrError::Io(_) => "io",
            BrdrError::Json(_) => "json",
            BrdrError::Join(_) => "join",
        }
    }

    /// Store the error is attributed to, when it has one.
    pub fn store(&self) -> Option<StoreKind> {
        match self {
            BrdrError::SourceUnavailable { store, .. }
            | BrdrError::TargetUnavailable { store, .. }
            | BrdrError::PermissionDenied { store, .. }
            | BrdrError::WriteFailed { store, .. }
            | BrdrError::SchemaMismatch { store, .. }
            | BrdrError::Truncated { store, .. }
            | BrdrError::Unreadable { store, .. }
            | BrdrError::ChecksumMismatch { store, .. } => Some(*store),
            _ => None,
        }
    }
}

/// Store snapshot/restore adapters
pub mod adapter;

/// Backup orchestrator
pub mod backup;

/// Environment-derived configuration
pub mod config;

/// Dry-run executor strategy
pub mod executor;

/// Run-level backup directory lock
pub mod lock;

/// Backup metadata records and artifact naming
pub mod metadata;

/// Webhook notification
pub mod notify;

/// Age-based retention pruning
pub mod retention;

/// Restore orchestrator
pub mod restore;

/// Disaster-recovery runbook
pub mod runbook;

/// Remote archive transport
pub mod transport;

/// Archive integrity verification
pub mod verify;
