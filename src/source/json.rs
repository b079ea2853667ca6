//! Helpers for walking loosely-shaped JSON log lines

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::LazyLock;

/// A list of candidate key paths, tried in order
pub(crate) type Candidates = &'static [&'static [&'static str]];

static ROLLOUT_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sessions[/\\]([^/\\]+)[/\\]rollout-.*\.jsonl$").unwrap());
static ROLLOUT_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rollout-.*-([0-9a-fA-F-]{36})\.jsonl$").unwrap());
static UUID_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9a-fA-F-]{36})\.jsonl$").unwrap());

/// Millisecond epochs are above this; seconds are not.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Follow `path` through nested objects.
pub(crate) fn lookup<'a>(obj: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut cur = obj.get(*first)?;
    for seg in rest {
        cur = cur.as_object()?.get(*seg)?;
    }
    Some(cur)
}

/// First candidate whose value renders as a non-empty scalar string.
pub(crate) fn first_string(obj: &Map<String, Value>, candidates: Candidates) -> String {
    candidates
        .iter()
        .filter_map(|path| lookup(obj, path))
        .map(as_text)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// First candidate that coerces to non-empty text.
pub(crate) fn first_text(obj: &Map<String, Value>, candidates: Candidates) -> String {
    candidates
        .iter()
        .filter_map(|path| lookup(obj, path))
        .map(coerce_text)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// First candidate that parses as a timestamp.
pub(crate) fn first_timestamp(obj: &Map<String, Value>, candidates: Candidates) -> Option<i64> {
    candidates
        .iter()
        .filter_map(|path| lookup(obj, path))
        .find_map(parse_unix)
}

/// Scalar rendering: strings trimmed, other values in their JSON form.
pub(crate) fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Recursively turn an arbitrary JSON value into display text.
///
/// Objects are checked for well-known text-bearing keys before falling back
/// to a compact JSON dump; arrays join their non-empty parts with newlines.
pub fn coerce_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(coerce_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        Value::Object(map) => {
            for key in [
                "text",
                "content",
                "input",
                "output",
                "result",
                "message",
                "arguments",
            ] {
                if let Some(inner) = map.get(key) {
                    let text = coerce_text(inner);
                    if !text.is_empty() {
                        return text;
                    }
                }
            }
            serde_json::to_string(map).unwrap_or_default()
        }
    }
}

/// Parse epoch seconds or milliseconds, numeric strings, RFC 3339 and
/// `YYYY-MM-DD HH:MM:SS` (UTC) into unix seconds.
pub fn parse_unix(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let raw = n
                .as_i64()
                .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
                .or_else(|| n.as_f64().map(|f| f as i64))?;
            Some(from_epoch(raw))
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(raw) = s.parse::<i64>() {
                return Some(from_epoch(raw));
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp());
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.and_utc().timestamp())
        }
        _ => None,
    }
}

fn from_epoch(raw: i64) -> i64 {
    if raw > MILLIS_THRESHOLD {
        raw / 1000
    } else {
        raw
    }
}

/// UUID that forms the tail of a `*.jsonl` file name.
pub(crate) fn uuid_from_file_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let caps = UUID_FILE_RE.captures(name)?;
    let candidate = caps.get(1)?.as_str();
    uuid::Uuid::parse_str(candidate)
        .ok()
        .map(|_| candidate.to_string())
}

/// Derive a session id for a Codex-style log path.
///
/// Order: `sessions/<id>/rollout-*.jsonl`, a UUID at the end of a rollout
/// file name, `history` for `history.jsonl`, the parent directory name,
/// then `unknown-session`.
pub fn session_id_from_path(path: &Path) -> String {
    let norm = path.to_string_lossy().replace('\\', "/");
    if let Some(caps) = ROLLOUT_DIR_RE.captures(&norm) {
        return caps[1].to_string();
    }
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if let Some(caps) = ROLLOUT_FILE_RE.captures(name) {
            return caps[1].to_string();
        }
    }
    if norm.ends_with("/history.jsonl") {
        return "history".to_string();
    }
    match path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
        Some(base) if !base.is_empty() && base != "." && base != "/" => base.to_string(),
        _ => "unknown-session".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_lookup_nested() {
        let o = obj(json!({"payload": {"message": {"role": "user"}}, "text": 3}));
        assert_eq!(
            lookup(&o, &["payload", "message", "role"]),
            Some(&json!("user"))
        );
        assert_eq!(lookup(&o, &["text", "inner"]), None);
        assert_eq!(lookup(&o, &["missing"]), None);
    }

    #[test]
    fn test_first_string_skips_empty_candidates() {
        const PATHS: Candidates = &[&["role"], &["payload", "role"]];
        let o = obj(json!({"role": "  ", "payload": {"role": "assistant"}}));
        assert_eq!(first_string(&o, PATHS), "assistant");
    }

    #[test]
    fn test_coerce_text_shapes() {
        assert_eq!(coerce_text(&json!("  hi ")), "hi");
        assert_eq!(coerce_text(&json!(42)), "42");
        assert_eq!(coerce_text(&json!(true)), "true");
        assert_eq!(
            coerce_text(&json!([{"type": "input_text", "text": "a"}, "", {"content": "b"}])),
            "a\nb"
        );
        assert_eq!(coerce_text(&json!({"output": {"result": "deep"}})), "deep");
        assert_eq!(coerce_text(&json!({"b": 1, "a": 2})), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_parse_unix_variants() {
        assert_eq!(parse_unix(&json!(1_700_000_000)), Some(1_700_000_000));
        assert_eq!(parse_unix(&json!(1_700_000_000_123_i64)), Some(1_700_000_000));
        assert_eq!(parse_unix(&json!("1700000000")), Some(1_700_000_000));
        assert_eq!(parse_unix(&json!("2024-01-01T00:00:00Z")), Some(1_704_067_200));
        assert_eq!(
            parse_unix(&json!("2025-11-27T15:23:34.609Z")),
            Some(1_764_257_014)
        );
        assert_eq!(parse_unix(&json!("2024-01-01 00:00:00")), Some(1_704_067_200));
        assert_eq!(parse_unix(&json!("yesterday")), None);
        assert_eq!(parse_unix(&json!(null)), None);
    }

    #[test]
    fn test_session_id_from_path() {
        let cases = [
            (
                "/home/u/.codex/sessions/2025/11/27/rollout-2025-11-27T09-23-19-019ac5e9-684f-7741-9974-4246554edb05.jsonl",
                "019ac5e9-684f-7741-9974-4246554edb05",
            ),
            ("/home/u/.codex/sessions/abc/rollout-1.jsonl", "abc"),
            ("/home/u/.codex/history.jsonl", "history"),
            ("/var/logs/proj/other.jsonl", "proj"),
        ];
        for (path, want) in cases {
            assert_eq!(session_id_from_path(Path::new(path)), want, "path={path}");
        }
    }

    #[test]
    fn test_uuid_from_file_name() {
        assert_eq!(
            uuid_from_file_name(Path::new(
                "/x/projects/-Users-eric/4256a303-4485-4516-8565-464a3379e0fa.jsonl"
            ))
            .as_deref(),
            Some("4256a303-4485-4516-8565-464a3379e0fa")
        );
        assert_eq!(uuid_from_file_name(Path::new("/some/other/path.jsonl")), None);
    }
}
