//! Session listing and ranked search
//!
//! With an FTS5 index, every query token becomes a quoted prefix match and
//! sessions rank by matching message count. Without one (or when the FTS
//! query fails) the same ranking is computed with `LIKE` over message text.

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Row, ToSql};

use super::{FtsMode, Session};
use crate::error::{DbContext, IndexError, Result};

pub(crate) const SESSION_COLUMNS: &str = "s.id, COALESCE(s.source, ''), COALESCE(s.last_activity_ts, 0), \
     COALESCE(s.message_count, 0), COALESCE(s.workdir, ''), COALESCE(s.preview, '')";

const TRIM_CHARS: &[char] = &[
    '`', '"', '\'', '.', ',', ':', ';', '!', '?', '(', ')', '[', ']', '{', '}', '<', '>', '|',
];

/// SQL function folding case with Unicode rules, matching how query terms
/// are lowercased. SQLite's built-in `LOWER` only folds ASCII.
const FOLD_FN: &str = "unicode_lower";

pub(crate) fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

pub(crate) fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        source: row.get(1)?,
        last_activity_ts: row.get(2)?,
        message_count: row.get(3)?,
        workdir: row.get(4)?,
        preview: row.get(5)?,
    })
}

fn query_sessions(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    context: &str,
) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(sql).db_context(|| context.to_string())?;
    let sessions = stmt
        .query_map(params, session_from_row)
        .db_context(|| context.to_string())?
        .collect::<rusqlite::Result<Vec<_>>>()
        .db_context(|| context.to_string())?;
    Ok(sessions)
}

/// Sessions with conversation, newest first.
pub(crate) fn recent_sessions(conn: &Connection, limit: usize) -> Result<Vec<Session>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS}
         FROM sessions s
         WHERE COALESCE(s.message_count, 0) > 0
         ORDER BY s.last_activity_ts DESC, s.id
         LIMIT ?"
    );
    query_sessions(conn, &sql, &[&(limit as i64)], "list sessions")
}

pub(crate) fn search_sessions(
    conn: &Connection,
    mode: FtsMode,
    query: &str,
    limit: usize,
) -> Result<Vec<Session>> {
    let fts_query = build_fts_query(query);
    if mode == FtsMode::Substring || fts_query.is_empty() {
        return like_search(conn, query, limit);
    }

    match fts_search(conn, &fts_query, limit) {
        Ok(sessions) => Ok(sessions),
        Err(fts) => {
            tracing::warn!(query = %fts_query, error = %fts, "fts query failed, using substring search");
            like_search(conn, query, limit).map_err(|fallback| IndexError::Search {
                fts: Box::new(fts),
                fallback: Box::new(fallback),
            })
        }
    }
}

fn fts_search(conn: &Connection, fts_query: &str, limit: usize) -> Result<Vec<Session>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS}
         FROM sessions s
         JOIN (
             SELECT session_id, COUNT(*) AS score
             FROM messages_fts
             WHERE messages_fts MATCH ?
             GROUP BY session_id
         ) ranked ON ranked.session_id = s.id
         WHERE COALESCE(s.message_count, 0) > 0
         ORDER BY ranked.score DESC, s.last_activity_ts DESC
         LIMIT ?"
    );
    query_sessions(conn, &sql, &[&fts_query, &(limit as i64)], "fts search")
}

fn like_search(conn: &Connection, query: &str, limit: usize) -> Result<Vec<Session>> {
    let mut terms = tokenize_search_terms(query);
    if terms.is_empty() {
        terms.push(query.trim().to_lowercase());
    }

    let patterns: Vec<String> = terms
        .iter()
        .map(|t| format!("%{}%", escape_like(t)))
        .collect();
    let clause = format!(r"{FOLD_FN}(content) LIKE ? ESCAPE '\'");
    let clauses = vec![clause; patterns.len()].join(" OR ");

    let sql = format!(
        "SELECT {SESSION_COLUMNS}
         FROM sessions s
         JOIN (
             SELECT session_id, COUNT(*) AS score
             FROM messages
             WHERE {clauses}
             GROUP BY session_id
         ) ranked ON ranked.session_id = s.id
         WHERE COALESCE(s.message_count, 0) > 0
         ORDER BY ranked.score DESC, s.last_activity_ts DESC
         LIMIT ?"
    );

    let limit = limit as i64;
    let mut params: Vec<&dyn ToSql> = patterns.iter().map(|p| p as &dyn ToSql).collect();
    params.push(&limit);
    query_sessions(conn, &sql, &params, "substring search")
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Lowercase, split on whitespace and strip surrounding punctuation.
pub fn tokenize_search_terms(raw: &str) -> Vec<String> {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .map(|p| p.trim_matches(TRIM_CHARS))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// AND of quoted prefix matches, one per token. Empty when no token
/// survives tokenization.
pub fn build_fts_query(raw: &str) -> String {
    tokenize_search_terms(raw)
        .iter()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\"*"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_fts_query() {
        assert_eq!(
            build_fts_query(r#"hello "world" /path:test"#),
            r#""hello"* AND "world"* AND "/path:test"*"#
        );
        assert_eq!(build_fts_query("  !!  "), "");
    }

    #[test]
    fn test_tokenize_search_terms() {
        assert_eq!(
            tokenize_search_terms("  hello,   \"world\"   (test)  "),
            vec!["hello", "world", "test"]
        );
        assert_eq!(tokenize_search_terms("Hello World"), vec!["hello", "world"]);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
