//! Relational store adapter.
//!
//! Snapshots are full logical dumps taken with `pg_dump --no-owner --no-acl`
//! (ownership and ACLs are environment-specific and re-derived at restore
//! time). The dump stream is piped straight through a gzip encoder so that
//! peak disk usage is bounded by the single compressed file. Restore feeds
//! the decompressed dump into `psql` inside one transaction; the
//! reachability probe is a `SELECT 1` over sqlx.

use super::{describe_archive, ArchiveInfo, StoreAdapter};
use crate::config::RelationalStoreHandle;
use crate::{BrdrError, Result, StoreKind};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sqlx::Connection;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{ChildStderr, Command, Stdio};
use tracing::{debug, info};

/// Adapter dumping and restoring the PostgreSQL store as `.sql.gz`.
pub struct RelationalStoreAdapter {
    handle: RelationalStoreHandle,
}

impl RelationalStoreAdapter {
    /// Create an adapter for the given connection URL.
    pub fn new(handle: RelationalStoreHandle) -> Self {
        Self { handle }
    }

    fn classify_dump_failure(stderr: &str) -> BrdrError {
        let store = StoreKind::Relational;
        let lowered = stderr.to_lowercase();
        if lowered.contains("permission denied") || lowered.contains("authentication failed") {
            BrdrError::PermissionDenied {
                store,
                detail: first_line(stderr),
            }
        } else {
            BrdrError::SourceUnavailable {
                store,
                detail: first_line(stderr),
            }
        }
    }

    fn classify_restore_failure(stderr: &str) -> BrdrError {
        let store = StoreKind::Relational;
        let lowered = stderr.to_lowercase();
        if lowered.contains("does not exist")
            || lowered.contains("cannot be cast")
            || (lowered.contains("column") && lowered.contains("type"))
        {
            // The dump was taken against a different schema version than the
            // live database; the original tooling left this case undefined.
            BrdrError::SchemaMismatch {
                store,
                detail: first_line(stderr),
            }
        } else if lowered.contains("could not connect") || lowered.contains("connection refused") {
            BrdrError::TargetUnavailable {
                store,
                detail: first_line(stderr),
            }
        } else if lowered.contains("permission denied") {
            BrdrError::PermissionDenied {
                store,
                detail: first_line(stderr),
            }
        } else {
            BrdrError::WriteFailed {
                store,
                detail: first_line(stderr),
            }
        }
    }

    fn dump_command(url: &str) -> Command {
        let mut cmd = Command::new("pg_dump");
        cmd.arg("--no-owner")
            .arg("--no-acl")
            .arg(format!("--dbname={url}"));
        cmd
    }

    fn restore_command(url: &str) -> Command {
        let mut cmd = Command::new("psql");
        cmd.arg("--single-transaction")
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg(format!("--dbname={url}"));
        cmd
    }

    fn dump_to(url: &str, dest: &Path) -> Result<()> {
        Self::run_dump(Self::dump_command(url), dest)
    }

    fn feed_restore(url: &str, archive: &Path) -> Result<()> {
        Self::run_restore(Self::restore_command(url), archive)
    }

    fn run_dump(mut cmd: Command, dest: &Path) -> Result<()> {
        let store = StoreKind::Relational;
        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BrdrError::SourceUnavailable {
                store,
                detail: format!("spawning dump process: {e}"),
            })?;
        let stderr = drain_stderr(child.stderr.take().expect("stderr piped"));

        let out_file = std::fs::File::create(dest)?;
        let mut encoder = GzEncoder::new(out_file, Compression::default());

        // Pipeline: the dump never touches disk uncompressed.
        let mut stdout = child.stdout.take().expect("stdout piped");
        let copy_result = std::io::copy(&mut stdout, &mut encoder);
        drop(stdout);

        let status = child.wait()?;
        let stderr = stderr.join().unwrap_or_default();
        if !status.success() {
            // Discard the partial archive; a failed dump must not look like one.
            let _ = std::fs::remove_file(dest);
            return Err(Self::classify_dump_failure(&stderr));
        }
        if let Err(e) = copy_result {
            let _ = std::fs::remove_file(dest);
            return Err(BrdrError::SourceUnavailable {
                store,
                detail: format!("reading dump output: {e}"),
            });
        }
        encoder.finish()?.flush()?;
        Ok(())
    }

    fn run_restore(mut cmd: Command, archive: &Path) -> Result<()> {
        let store = StoreKind::Relational;
        let file = std::fs::File::open(archive).map_err(|e| BrdrError::Unreadable {
            store,
            detail: e.to_string(),
        })?;

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BrdrError::TargetUnavailable {
                store,
                detail: format!("spawning restore process: {e}"),
            })?;
        let stderr = drain_stderr(child.stderr.take().expect("stderr piped"));

        let mut decoder = GzDecoder::new(file);
        let mut stdin = child.stdin.take().expect("stdin piped");
        let copy_result = std::io::copy(&mut decoder, &mut stdin);
        drop(stdin); // close the pipe so the server process sees EOF

        let status = child.wait()?;
        let stderr = stderr.join().unwrap_or_default();
        if !status.success() {
            return Err(Self::classify_restore_failure(&stderr));
        }
        copy_result.map_err(|e| BrdrError::Unreadable {
            store,
            detail: format!("decompressing dump: {e}"),
        })?;
        Ok(())
    }
}

/// Drain the child's stderr on its own thread. The server tools chatter on
/// stderr (NOTICEs, ownership warnings) and the pipe holds about 64 KiB: if
/// nobody reads it while the main copy is in flight, the child blocks on
/// stderr, stops moving its stdout/stdin stream, and the run wedges while
/// holding the run lock.
fn drain_stderr(mut stderr: ChildStderr) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    })
}

fn first_line(s: &str) -> String {
    s.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no error output")
        .trim()
        .to_string()
}

#[async_trait]
impl StoreAdapter for RelationalStoreAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    async fn snapshot(&self, dest: &Path) -> Result<ArchiveInfo> {
        let url = self.handle.url.clone();
        let dest = dest.to_path_buf();
        debug!(dest = %dest.display(), "dumping relational store");

        let info = tokio::task::spawn_blocking(move || -> Result<ArchiveInfo> {
            Self::dump_to(&url, &dest)?;
            describe_archive(StoreKind::Relational, &dest).map_err(BrdrError::Io)
        })
        .await??;

        info!(
            size_bytes = info.size_bytes,
            checksum = %info.checksum,
            "relational store snapshot complete"
        );
        Ok(info)
    }

    async fn restore(&self, archive: &Path) -> Result<()> {
        let url = self.handle.url.clone();
        let archive = archive.to_path_buf();
        info!(archive = %archive.display(), "restoring relational store");

        tokio::task::spawn_blocking(move || Self::feed_restore(&url, &archive)).await??;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = sqlx::postgres::PgConnection::connect(&self.handle.url)
            .await
            .map_err(|e| BrdrError::TargetUnavailable {
                store: StoreKind::Relational,
                detail: e.to_string(),
            })?;
        sqlx::query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(|e| BrdrError::TargetUnavailable {
                store: StoreKind::Relational,
                detail: e.to_string(),
            })?;
        Ok(())
    }
}
