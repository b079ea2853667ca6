//! Incremental file ingestion
//!
//! Each tracked file has a watermark `(mtime, size, offset)`. A pass either
//! skips the file, resumes reading at `offset`, or throws away everything
//! previously read from it and starts over.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::BuildStats;
use crate::error::{DbContext, IndexError, Result};
use crate::source::{json, SourceFile, SourceRegistry};

/// Persisted ingestion state of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Watermark {
    pub mtime: i64,
    pub size: i64,
    pub offset: i64,
}

/// What to do with a file on this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Never seen before
    Fresh,
    /// Fully consumed and not modified since
    Unchanged,
    /// Appended to; continue from the offset
    Resume(i64),
    /// Shrunk or rewritten; drop prior rows and read from the start
    Reset,
}

pub(crate) fn plan(prev: Option<Watermark>, mtime: i64, size: i64) -> Plan {
    let Some(prev) = prev else {
        return Plan::Fresh;
    };
    let rewritten = size < prev.offset
        || mtime < prev.mtime
        || (mtime != prev.mtime && size == prev.size);
    if rewritten {
        Plan::Reset
    } else if mtime == prev.mtime && size == prev.offset {
        Plan::Unchanged
    } else {
        Plan::Resume(prev.offset)
    }
}

fn read_watermark(conn: &Connection, path: &str) -> Result<Option<Watermark>> {
    conn.query_row(
        "SELECT mtime, size, offset FROM ingested_files WHERE path = ?",
        params![path],
        |row| {
            Ok(Watermark {
                mtime: row.get(0)?,
                size: row.get(1)?,
                offset: row.get(2)?,
            })
        },
    )
    .optional()
    .db_context(|| format!("read watermark for {path}"))
}

fn io_error(path: &Path, source: std::io::Error) -> IndexError {
    IndexError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Delete every message (and its text index row) read from `path`.
fn clear_path(tx: &Transaction, path: &str) -> Result<()> {
    tx.execute(
        "DELETE FROM messages_fts WHERE rowid IN (SELECT id FROM messages WHERE source_path = ?)",
        params![path],
    )
    .db_context(|| format!("clear index rows for {path}"))?;
    tx.execute("DELETE FROM messages WHERE source_path = ?", params![path])
        .db_context(|| format!("clear messages for {path}"))?;
    Ok(())
}

/// Ingest one file inside its own transaction.
///
/// A file that vanished since discovery is skipped. Malformed lines and
/// single failed inserts are logged and skipped; the watermark only advances
/// when the whole file commits.
pub(crate) fn ingest_file(
    conn: &mut Connection,
    sources: &SourceRegistry,
    file: &SourceFile,
    cancel: &CancellationToken,
    stats: &mut BuildStats,
) -> Result<()> {
    let path_str = file.path.to_string_lossy().to_string();

    let meta = match std::fs::metadata(&file.path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_error(&file.path, e)),
    };
    let size = meta.len() as i64;
    let mtime = meta
        .modified()
        .map(|t| DateTime::<Utc>::from(t).timestamp())
        .map_err(|e| io_error(&file.path, e))?;

    let (offset, reset) = match plan(read_watermark(conn, &path_str)?, mtime, size) {
        Plan::Unchanged => {
            stats.files_unchanged += 1;
            return Ok(());
        }
        Plan::Fresh => (0, false),
        Plan::Resume(offset) => (offset.max(0) as u64, false),
        Plan::Reset => {
            stats.files_reset += 1;
            tracing::debug!(path = %file.path.display(), "file rewritten, resetting");
            (0, true)
        }
    };

    let mut handle = match File::open(&file.path) {
        Ok(handle) => handle,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_error(&file.path, e)),
    };
    handle
        .seek(SeekFrom::Start(offset))
        .map_err(|e| io_error(&file.path, e))?;
    // Bytes appended after stat belong to the next pass
    let mut reader = BufReader::new(handle.take((size as u64).saturating_sub(offset)));

    let tx = conn
        .transaction()
        .db_context(|| format!("begin ingest {path_str}"))?;

    if reset {
        clear_path(&tx, &path_str)?;
    }

    {
        let mut insert_msg = tx
            .prepare(
                "INSERT INTO messages (session_id, ts, role, content, type, source, source_path, workdir)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .db_context(|| "prepare message insert".to_string())?;
        let mut insert_fts = tx
            .prepare(
                "INSERT INTO messages_fts (rowid, session_id, role, content)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .db_context(|| "prepare index insert".to_string())?;

        let mut buf = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }

            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| io_error(&file.path, e))?;
            if n == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let events = match sources.parse_line(file, line) {
                Ok(events) => events,
                Err(e) => {
                    stats.lines_skipped += 1;
                    tracing::debug!(path = %file.path.display(), error = %e, "skipping malformed line");
                    continue;
                }
            };

            for event in events {
                if event.text.trim().is_empty() {
                    continue;
                }
                let session_id = match event.session_id.trim() {
                    "" => json::session_id_from_path(&file.path),
                    id => id.to_string(),
                };

                let inserted = insert_msg.execute(params![
                    session_id,
                    event.timestamp,
                    event.role.as_str(),
                    event.text,
                    event.kind.as_str(),
                    file.kind.as_str(),
                    path_str,
                    event.workdir.as_deref().unwrap_or(""),
                ]);
                if let Err(e) = inserted {
                    tracing::debug!(path = %file.path.display(), error = %e, "message insert failed");
                    continue;
                }
                stats.messages_inserted += 1;

                let row_id = tx.last_insert_rowid();
                if let Err(e) =
                    insert_fts.execute(params![row_id, session_id, event.role.as_str(), event.text])
                {
                    tracing::debug!(path = %file.path.display(), error = %e, "index insert failed");
                }
            }
        }
    }

    tx.execute(
        "INSERT INTO ingested_files (path, mtime, size, offset, source)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(path) DO UPDATE SET
             mtime = excluded.mtime,
             size = excluded.size,
             offset = excluded.offset,
             source = excluded.source",
        params![path_str, mtime, size, size, file.kind.as_str()],
    )
    .db_context(|| format!("update watermark for {path_str}"))?;

    tx.commit()
        .db_context(|| format!("commit ingest {path_str}"))?;
    stats.files_ingested += 1;
    Ok(())
}

/// Forget files that discovery no longer reports. Returns how many were
/// removed.
pub(crate) fn prune_missing(conn: &mut Connection, files: &[SourceFile]) -> Result<usize> {
    let keep: HashSet<String> = files
        .iter()
        .map(|f| f.path.to_string_lossy().to_string())
        .collect();

    let stale: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT path FROM ingested_files")
            .db_context(|| "query ingested files".to_string())?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .db_context(|| "query ingested files".to_string())?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context(|| "read ingested files".to_string())?;
        paths.into_iter().filter(|p| !keep.contains(p)).collect()
    };
    if stale.is_empty() {
        return Ok(0);
    }

    let tx = conn
        .transaction()
        .db_context(|| "begin prune".to_string())?;
    for path in &stale {
        clear_path(&tx, path)?;
        tx.execute("DELETE FROM ingested_files WHERE path = ?", params![path])
            .db_context(|| format!("delete watermark for {path}"))?;
        tracing::debug!(path = %path, "pruned missing file");
    }
    tx.commit().db_context(|| "commit prune".to_string())?;

    Ok(stale.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(mtime: i64, size: i64, offset: i64) -> Option<Watermark> {
        Some(Watermark { mtime, size, offset })
    }

    #[test]
    fn test_plan_fresh_and_unchanged() {
        assert_eq!(plan(None, 100, 10), Plan::Fresh);
        assert_eq!(plan(mark(100, 10, 10), 100, 10), Plan::Unchanged);
    }

    #[test]
    fn test_plan_append_resumes() {
        assert_eq!(plan(mark(100, 10, 10), 101, 25), Plan::Resume(10));
    }

    #[test]
    fn test_plan_rewrite_detection() {
        // Shrunk below the offset
        assert_eq!(plan(mark(100, 10, 10), 101, 5), Plan::Reset);
        // mtime went backwards
        assert_eq!(plan(mark(100, 10, 10), 99, 30), Plan::Reset);
        // Same size, new mtime
        assert_eq!(plan(mark(100, 10, 10), 105, 10), Plan::Reset);
    }
}
