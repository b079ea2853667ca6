//! Session index storage with SQLite
//!
//! One database file holds raw messages, per-file ingestion watermarks, the
//! derived session summaries and a text index over message content. All
//! access goes through a single connection behind a mutex, so an index build
//! and a read never interleave.

mod ingest;
mod schema;
mod search;
mod summary;

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::error::{DbContext, IndexError, Result};
use crate::source::{EventKind, Role, SourceRegistry};

pub use schema::{FtsMode, SCHEMA};
pub use search::{build_fts_query, tokenize_search_terms};
pub use summary::extract_workdir_from_content;

/// Default page size for [`Store::list_sessions`]
pub const DEFAULT_LIMIT: usize = 200;

/// Options applied when opening a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Delete the database (and its WAL/SHM siblings) before opening
    pub reindex: bool,
    /// Create an FTS5 index on a fresh database
    pub full_text: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            reindex: false,
            full_text: true,
        }
    }
}

/// Aggregated view of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub source: String,
    /// Unix seconds, 0 when no message carried a timestamp
    pub last_activity_ts: i64,
    pub message_count: i64,
    pub workdir: String,
    pub preview: String,
}

/// One stored message row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub timestamp: Option<i64>,
    pub role: Role,
    pub content: String,
    pub kind: EventKind,
    pub source: String,
    pub source_path: String,
    pub workdir: String,
}

/// Counters reported by one [`Store::build_index`] pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub files_discovered: usize,
    pub files_ingested: usize,
    pub files_unchanged: usize,
    pub files_reset: usize,
    pub files_pruned: usize,
    pub messages_inserted: usize,
    pub lines_skipped: usize,
    pub sessions: usize,
}

/// Row counts for the whole index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub sessions: i64,
    pub messages: i64,
    pub files: i64,
    pub full_text: FtsMode,
}

pub struct Store {
    conn: Mutex<Connection>,
    fts: FtsMode,
    path: PathBuf,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: &Path, opts: StoreOptions) -> Result<Self> {
        if opts.reindex {
            remove_database(path)?;
        }

        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|source| IndexError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        search::register_functions(&conn)
            .db_context(|| "register sql functions".to_string())?;
        let fts = schema::init_schema(&conn, opts.full_text)?;

        tracing::debug!(path = %path.display(), mode = fts.as_str(), "opened index");
        Ok(Self {
            conn: Mutex::new(conn),
            fts,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Text index form chosen when the database was created
    pub fn fts_mode(&self) -> FtsMode {
        self.fts
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a transaction open:
        // rusqlite rolls back on drop.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================
    // INDEX BUILD
    // ============================================

    /// Discover, prune, ingest every file, then rebuild session summaries.
    ///
    /// Each file is ingested in its own transaction. When `cancel` fires the
    /// pass stops with [`IndexError::Cancelled`]; files committed before that
    /// point stay indexed and the next pass resumes from their watermarks.
    pub fn build_index(
        &self,
        sources: &SourceRegistry,
        cancel: &CancellationToken,
    ) -> Result<BuildStats> {
        let mut conn = self.lock();

        let files = sources.discover_all();
        let mut stats = BuildStats {
            files_discovered: files.len(),
            ..Default::default()
        };

        stats.files_pruned = ingest::prune_missing(&mut conn, &files)?;

        for file in &files {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            ingest::ingest_file(&mut conn, sources, file, cancel, &mut stats)?;
        }

        stats.sessions = summary::refresh_sessions(&mut conn, cancel)?;

        tracing::info!(
            discovered = stats.files_discovered,
            ingested = stats.files_ingested,
            unchanged = stats.files_unchanged,
            reset = stats.files_reset,
            pruned = stats.files_pruned,
            messages = stats.messages_inserted,
            sessions = stats.sessions,
            "index build complete"
        );
        Ok(stats)
    }

    // ============================================
    // SESSIONS
    // ============================================

    /// Sessions with at least one conversational message, newest first, or
    /// ranked by match count when `query` is non-empty. A `limit` of 0 means
    /// [`DEFAULT_LIMIT`].
    pub fn list_sessions(&self, query: &str, limit: usize) -> Result<Vec<Session>> {
        let conn = self.lock();
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };
        let query = query.trim();

        if query.is_empty() {
            return search::recent_sessions(&conn, limit);
        }
        search::search_sessions(&conn, self.fts, query, limit)
    }

    pub fn get_session(&self, id: &str) -> Result<Session> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT {} FROM sessions s WHERE s.id = ?", search::SESSION_COLUMNS),
            params![id],
            search::session_from_row,
        )
        .optional()
        .db_context(|| format!("get session {id}"))?
        .ok_or_else(|| IndexError::SessionNotFound(id.to_string()))
    }

    // ============================================
    // MESSAGES
    // ============================================

    /// Messages of a session by timestamp, untimestamped rows last, ties
    /// broken by insertion order.
    pub fn get_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, ts, role, content, type, source, source_path, COALESCE(workdir, '')
                 FROM messages
                 WHERE session_id = ?
                 ORDER BY CASE WHEN ts IS NULL THEN 1 ELSE 0 END, ts, id",
            )
            .db_context(|| format!("query messages for {session_id}"))?;

        let messages = stmt
            .query_map(params![session_id], |row| {
                let role: String = row.get(3)?;
                let kind: String = row.get(5)?;
                Ok(Message {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    role: Role::from_stored(&role),
                    content: row.get(4)?,
                    kind: EventKind::from_tag(&kind),
                    source: row.get(6)?,
                    source_path: row.get(7)?,
                    workdir: row.get(8)?,
                })
            })
            .db_context(|| format!("query messages for {session_id}"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context(|| format!("read messages for {session_id}"))?;

        Ok(messages)
    }

    // ============================================
    // STATS
    // ============================================

    pub fn stats(&self) -> Result<IndexStats> {
        let conn = self.lock();
        let count = |table: &str| -> Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .db_context(|| format!("count {table}"))
        };

        Ok(IndexStats {
            sessions: count("sessions")?,
            messages: count("messages")?,
            files: count("ingested_files")?,
            full_text: self.fts,
        })
    }
}

/// Remove a database file together with its WAL and SHM siblings.
fn remove_database(path: &Path) -> Result<()> {
    let mut targets = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut sibling = path.as_os_str().to_owned();
        sibling.push(suffix);
        targets.push(PathBuf::from(sibling));
    }

    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => tracing::debug!(path = %target.display(), "removed for reindex"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(IndexError::Io { path: target, source }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_and_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/index.sqlite");
        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.fts_mode(), FtsMode::Fts5);

        let stats = store.stats().unwrap();
        assert_eq!((stats.sessions, stats.messages, stats.files), (0, 0, 0));
    }

    #[test]
    fn test_reindex_removes_existing_database() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.sqlite");
        {
            let store = Store::open_with(
                &path,
                StoreOptions {
                    reindex: false,
                    full_text: false,
                },
            )
            .unwrap();
            assert_eq!(store.fts_mode(), FtsMode::Substring);
        }

        let store = Store::open_with(
            &path,
            StoreOptions {
                reindex: true,
                full_text: true,
            },
        )
        .unwrap();
        assert_eq!(store.fts_mode(), FtsMode::Fts5);
    }

    #[test]
    fn test_get_session_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(&tmp.path().join("index.sqlite")).unwrap();
        let err = store.get_session("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_empty_index_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(&tmp.path().join("index.sqlite")).unwrap();
        assert!(store.list_sessions("", 0).unwrap().is_empty());
        assert!(store.list_sessions("anything", 10).unwrap().is_empty());
        assert!(store.get_messages("missing").unwrap().is_empty());
    }
}
