//! Session summary recomputation
//!
//! Sessions are derived data: every pass deletes them all and rebuilds one
//! row per distinct `session_id` found in `messages`.

use rusqlite::{params, OptionalExtension, Transaction};
use tokio_util::sync::CancellationToken;

use super::Session;
use crate::error::{DbContext, IndexError, Result};
use crate::source::claude;
use crate::source::SourceKind;
use crate::transcript::is_non_conversational_preview_content;

const PREVIEW_LIMIT: usize = 120;
const SCAN_ROWS: i64 = 40;

/// Rebuild the `sessions` table. Returns the number of sessions written.
pub(crate) fn refresh_sessions(
    conn: &mut rusqlite::Connection,
    cancel: &CancellationToken,
) -> Result<usize> {
    let tx = conn
        .transaction()
        .db_context(|| "begin refresh sessions".to_string())?;

    tx.execute("DELETE FROM sessions", [])
        .db_context(|| "clear sessions".to_string())?;

    let ids: Vec<String> = {
        let mut stmt = tx
            .prepare("SELECT DISTINCT session_id FROM messages ORDER BY session_id")
            .db_context(|| "list session ids".to_string())?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .db_context(|| "list session ids".to_string())?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context(|| "read session ids".to_string())?;
        ids
    };

    for id in &ids {
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        let session = compute_summary(&tx, id)?;
        tx.execute(
            "INSERT INTO sessions (id, source, last_activity_ts, message_count, workdir, preview)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 source = excluded.source,
                 last_activity_ts = excluded.last_activity_ts,
                 message_count = excluded.message_count,
                 workdir = excluded.workdir,
                 preview = excluded.preview",
            params![
                session.id,
                session.source,
                session.last_activity_ts,
                session.message_count,
                session.workdir,
                session.preview
            ],
        )
        .db_context(|| format!("upsert session {id}"))?;
    }

    tx.commit()
        .db_context(|| "commit refresh sessions".to_string())?;
    Ok(ids.len())
}

fn strings(tx: &Transaction, sql: &str, session_id: &str) -> Result<Vec<String>> {
    let mut stmt = tx
        .prepare(sql)
        .db_context(|| format!("summary query for {session_id}"))?;
    let rows = stmt
        .query_map(params![session_id], |row| {
            row.get::<_, Option<String>>(0).map(Option::unwrap_or_default)
        })
        .db_context(|| format!("summary query for {session_id}"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .db_context(|| format!("summary rows for {session_id}"))?;
    Ok(rows)
}

fn compute_summary(tx: &Transaction, session_id: &str) -> Result<Session> {
    let (last_activity_ts, source): (i64, String) = tx
        .query_row(
            "SELECT
                 COALESCE(MAX(ts), 0),
                 COALESCE((SELECT source FROM messages m2 WHERE m2.session_id = ?1 ORDER BY m2.id DESC LIMIT 1), 'unknown')
             FROM messages
             WHERE session_id = ?1",
            params![session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .db_context(|| format!("summary for session {session_id}"))?;

    let message_count = if has_real_user(tx, session_id)? {
        count_conversational(tx, session_id)?
    } else {
        0
    };

    let mut workdir: String = tx
        .query_row(
            "SELECT workdir FROM messages
             WHERE session_id = ? AND workdir IS NOT NULL AND workdir != ''
             ORDER BY id DESC
             LIMIT 1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()
        .db_context(|| format!("workdir for session {session_id}"))?
        .unwrap_or_default();

    if workdir.is_empty() {
        workdir = infer_workdir(tx, session_id)?;
    }
    if workdir.is_empty() && source == SourceKind::Claude.as_str() {
        let source_path: Option<String> = tx
            .query_row(
                "SELECT source_path FROM messages
                 WHERE session_id = ? AND source_path IS NOT NULL AND source_path != ''
                 ORDER BY id
                 LIMIT 1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
            .db_context(|| format!("source path for session {session_id}"))?;
        if let Some(path) = source_path {
            workdir = claude::workdir_from_path(std::path::Path::new(&path));
        }
    }

    Ok(Session {
        id: session_id.to_string(),
        source,
        last_activity_ts,
        message_count,
        workdir,
        preview: trim_preview(&pick_preview(tx, session_id)?),
    })
}

fn has_real_user(tx: &Transaction, session_id: &str) -> Result<bool> {
    let contents = strings(
        tx,
        "SELECT content FROM messages
         WHERE session_id = ? AND type = 'message' AND role = 'user'",
        session_id,
    )?;
    Ok(contents
        .iter()
        .any(|c| !is_non_conversational_preview_content(c)))
}

fn count_conversational(tx: &Transaction, session_id: &str) -> Result<i64> {
    let mut stmt = tx
        .prepare(
            "SELECT role, content FROM messages
             WHERE session_id = ? AND type = 'message' AND role IN ('user', 'assistant')",
        )
        .db_context(|| format!("count messages for {session_id}"))?;
    let rows = stmt
        .query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            ))
        })
        .db_context(|| format!("count messages for {session_id}"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .db_context(|| format!("count messages for {session_id}"))?;

    let count = rows
        .iter()
        .filter(|(role, content)| {
            if content.trim().is_empty() {
                return false;
            }
            role == "assistant" || !is_non_conversational_preview_content(content)
        })
        .count();
    Ok(count as i64)
}

fn infer_workdir(tx: &Transaction, session_id: &str) -> Result<String> {
    let contents = strings(
        tx,
        &format!(
            "SELECT content FROM messages
             WHERE session_id = ? AND role = 'user'
             ORDER BY id ASC
             LIMIT {SCAN_ROWS}"
        ),
        session_id,
    )?;
    Ok(contents
        .iter()
        .map(|c| extract_workdir_from_content(c))
        .find(|wd| !wd.is_empty())
        .unwrap_or_default())
}

/// First conversational user message, else the latest one.
fn pick_preview(tx: &Transaction, session_id: &str) -> Result<String> {
    let queries = [
        format!(
            "SELECT content FROM messages
             WHERE session_id = ? AND role = 'user' AND type = 'message'
             ORDER BY id ASC
             LIMIT {SCAN_ROWS}"
        ),
        format!(
            "SELECT content FROM messages
             WHERE session_id = ? AND role = 'user'
             ORDER BY id DESC
             LIMIT {SCAN_ROWS}"
        ),
    ];

    for sql in &queries {
        let found = strings(tx, sql, session_id)?
            .into_iter()
            .find(|c| !is_non_conversational_preview_content(c));
        if let Some(content) = found {
            return Ok(content);
        }
    }
    Ok(String::new())
}

fn trim_preview(s: &str) -> String {
    let s = s.replace("\r\n", " ").replace(['\r', '\n'], " ");
    let s = s.trim();
    if s.chars().count() <= PREVIEW_LIMIT {
        return s.to_string();
    }
    let mut out: String = s.chars().take(PREVIEW_LIMIT - 3).collect();
    out.push_str("...");
    out
}

fn looks_like_path(s: &str) -> bool {
    let s = s.trim();
    s.starts_with('/') || s.starts_with("~/")
}

/// Recover a working directory from harness framing in a user message: a
/// `<cwd>` tag, or the first path-like token inside an
/// `<environment_context>` block.
pub fn extract_workdir_from_content(content: &str) -> String {
    let content = content.trim();
    if content.is_empty() {
        return String::new();
    }
    // ASCII lowercasing keeps byte offsets aligned with `content`
    let lower = content.to_ascii_lowercase();

    if let Some(start) = lower.find("<cwd>").map(|i| i + "<cwd>".len()) {
        if let Some(end) = lower[start..].find("</cwd>") {
            let wd = content[start..start + end].trim();
            if looks_like_path(wd) {
                return wd.to_string();
            }
        }
    }

    const OPEN: &str = "<environment_context>";
    if lower.starts_with(OPEN) {
        let inner = &content[OPEN.len()..];
        let inner = match inner.to_ascii_lowercase().find("</environment_context>") {
            Some(end) => &inner[..end],
            None => inner,
        };
        if let Some(token) = inner.split_whitespace().find(|t| looks_like_path(t)) {
            return token.to_string();
        }
    }

    String::new()
}
