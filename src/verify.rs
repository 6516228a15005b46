//! Archive integrity verification.
//!
//! Structural checks only, run after archive creation and before an artifact
//! is marked valid: a vector archive gets a full table-of-contents
//! read-through, a relational dump gets a full gzip decode to a counting
//! sink. Neither check compares content against the live store.

use crate::{BrdrError, Result, StoreKind};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::debug;

/// Verify that the archive at `path` is complete and decompressible.
///
/// Returns `Truncated` when the stream ends early or the gzip footer is
/// missing, `Unreadable` when the file cannot be opened at all.
pub async fn verify(kind: StoreKind, path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || match kind {
        StoreKind::Vector => verify_tar_gz(&path),
        StoreKind::Relational => verify_sql_gz(&path),
    })
    .await?
}

fn open(kind: StoreKind, path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| BrdrError::Unreadable {
        store: kind,
        detail: format!("{}: {}", path.display(), e),
    })
}

/// Walk every tar entry header and drain its content to EOF.
fn verify_tar_gz(path: &Path) -> Result<()> {
    let store = StoreKind::Vector;
    let file = open(store, path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut entry_count = 0usize;
    let entries = archive.entries().map_err(|e| BrdrError::Truncated {
        store,
        detail: e.to_string(),
    })?;
    for entry in entries {
        let mut entry = entry.map_err(|e| BrdrError::Truncated {
            store,
            detail: format!("entry {}: {}", entry_count, e),
        })?;
        // Draining catches truncation inside file bodies, not just headers.
        std::io::copy(&mut entry, &mut std::io::sink()).map_err(|e| BrdrError::Truncated {
            store,
            detail: format!("entry {}: {}", entry_count, e),
        })?;
        entry_count += 1;
    }

    if entry_count == 0 {
        return Err(BrdrError::Truncated {
            store,
            detail: "archive contains no entries".to_string(),
        });
    }
    debug!(entries = entry_count, path = %path.display(), "vector archive verified");
    Ok(())
}

/// Decompress the whole stream; gzip validates its CRC footer on EOF.
fn verify_sql_gz(path: &Path) -> Result<()> {
    let store = StoreKind::Relational;
    let file = open(store, path)?;
    let mut decoder = GzDecoder::new(file);

    let mut total = 0u64;
    let mut buf = [0u8; 64 * 1024];
    loop {
        match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => total += n as u64,
            Err(e) => {
                return Err(BrdrError::Truncated {
                    store,
                    detail: e.to_string(),
                })
            }
        }
    }

    if total == 0 {
        // A zero-byte logical dump is never valid output from pg_dump.
        return Err(BrdrError::Truncated {
            store,
            detail: "dump decompressed to zero bytes".to_string(),
        });
    }
    debug!(decompressed_bytes = total, path = %path.display(), "relational dump verified");
    Ok(())
}
