//! SQLite schema definition
//!
//! `messages_fts` has two physical forms, chosen when the database is first
//! created and never changed afterwards:
//! - an FTS5 virtual table (ranked `MATCH` queries)
//! - a plain table with a session index, for SQLite builds without FTS5

use rusqlite::{Connection, OptionalExtension};

use crate::error::{DbContext, Result};

pub const SCHEMA: &str = r#"
-- ============================================
-- SESSIONS (derived, rebuilt every pass)
-- ============================================

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    source TEXT,                           -- 'rollout' | 'history' | 'claude'
    last_activity_ts INTEGER,              -- unix seconds, 0 when unknown
    message_count INTEGER,                 -- canonical conversational messages
    workdir TEXT,
    preview TEXT
);

-- ============================================
-- MESSAGES
-- ============================================

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT,
    ts INTEGER,                            -- unix seconds, NULL when unknown
    role TEXT,                             -- 'user', 'assistant', 'tool', 'system', 'event'
    content TEXT,
    type TEXT,                             -- 'message', 'user_message', 'tool_use', ...
    source TEXT,
    source_path TEXT,
    workdir TEXT
);

-- ============================================
-- INGESTION WATERMARKS
-- ============================================

CREATE TABLE IF NOT EXISTS ingested_files (
    path TEXT PRIMARY KEY,
    mtime INTEGER,
    size INTEGER,
    offset INTEGER,                        -- bytes consumed so far
    source TEXT
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id);
CREATE INDEX IF NOT EXISTS idx_messages_session_ts ON messages(session_id, ts, id);
CREATE INDEX IF NOT EXISTS idx_messages_source_path ON messages(source_path);
"#;

const FTS5_TABLE: &str = "CREATE VIRTUAL TABLE messages_fts USING fts5(
    session_id UNINDEXED,
    role UNINDEXED,
    content
);";

const PLAIN_TABLE: &str = "
CREATE TABLE IF NOT EXISTS messages_fts (
    rowid INTEGER PRIMARY KEY,
    session_id TEXT,
    role TEXT,
    content TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_fts_session_id ON messages_fts(session_id);
";

/// Physical form of the message text index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtsMode {
    /// FTS5 virtual table
    Fts5,
    /// Plain table, searched with substring matching
    Substring,
}

impl FtsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FtsMode::Fts5 => "fts5",
            FtsMode::Substring => "substring",
        }
    }
}

pub(crate) fn init_schema(conn: &Connection, prefer_fts: bool) -> Result<FtsMode> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;",
    )
    .db_context(|| "configure database".to_string())?;
    conn.execute_batch(SCHEMA)
        .db_context(|| "init schema".to_string())?;
    ensure_fts_table(conn, prefer_fts)
}

/// Detect the existing index form, or create one.
fn ensure_fts_table(conn: &Connection, prefer_fts: bool) -> Result<FtsMode> {
    let existing: Option<Option<String>> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE name = 'messages_fts'",
            [],
            |row| row.get(0),
        )
        .optional()
        .db_context(|| "inspect messages_fts table".to_string())?;

    if let Some(sql) = existing {
        let lower = sql.unwrap_or_default().to_lowercase();
        let mode = if lower.contains("virtual table") && lower.contains("fts5") {
            FtsMode::Fts5
        } else {
            FtsMode::Substring
        };
        return Ok(mode);
    }

    if prefer_fts {
        match conn.execute_batch(FTS5_TABLE) {
            Ok(()) => return Ok(FtsMode::Fts5),
            Err(e) if e.to_string().to_lowercase().contains("no such module: fts5") => {
                tracing::warn!("sqlite has no fts5 module, using substring search");
            }
            Err(e) => {
                return Err(e).db_context(|| "create messages_fts".to_string());
            }
        }
    }

    conn.execute_batch(PLAIN_TABLE)
        .db_context(|| "create messages_fts fallback table".to_string())?;
    Ok(FtsMode::Substring)
}
