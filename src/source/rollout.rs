//! Codex log source
//!
//! Data format: JSONL event streams in `<codex_home>/sessions/**/rollout-*.jsonl`,
//! or a flat `<codex_home>/history.jsonl` for older installs.
//! Lines are either bare events or `response_item` / `event_msg` envelopes
//! around a typed `payload`.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::json::{self, Candidates};
use super::{Event, EventKind, LogSource, Role, SourceFile, SourceKind};

const ENVELOPE_TYPES: &[&str] = &["response_item", "event_msg"];

const TYPE_PATH: Candidates = &[&["type"]];
const PAYLOAD_TYPE_PATH: Candidates = &[&["payload", "type"]];

const ROLE_PATHS: Candidates = &[
    &["role"],
    &["payload", "role"],
    &["message", "role"],
    &["payload", "message", "role"],
    &["data", "role"],
];

const SESSION_ID_PATHS: Candidates = &[
    &["session_id"],
    &["sessionId"],
    &["conversation_id"],
    &["conversationId"],
    &["session", "id"],
    &["data", "session_id"],
    &["payload", "session_id"],
    &["payload", "sessionId"],
    &["payload", "conversation_id"],
    &["payload", "conversationId"],
    &["payload", "id"],
];

const WORKDIR_PATHS: Candidates = &[
    &["workdir"],
    &["cwd"],
    &["payload", "cwd"],
    &["payload", "workdir"],
    &["workspace"],
    &["workspace_path"],
    &["project", "path"],
    &["data", "workdir"],
];

const TIMESTAMP_PATHS: Candidates = &[
    &["timestamp"],
    &["ts"],
    &["time"],
    &["payload", "timestamp"],
    &["payload", "time"],
    &["created_at"],
    &["createdAt"],
    &["message", "timestamp"],
    &["data", "timestamp"],
];

const CONTENT_PATHS: Candidates = &[
    &["content"],
    &["payload", "content"],
    &["message", "content"],
    &["payload", "message", "content"],
    &["data", "content"],
    &["text"],
    &["payload", "text"],
    &["output"],
    &["payload", "output"],
    &["input"],
    &["payload", "input"],
    &["message", "text"],
    &["payload", "message", "text"],
    &["delta", "content"],
    &["payload", "delta", "content"],
    &["payload", "message"],
    &["payload", "arguments"],
    &["payload", "reason"],
];

/// Last-resort content containers, tried after [`CONTENT_PATHS`]
const FALLBACK_CONTENT_PATHS: Candidates = &[&["tool"], &["data"], &["message"]];

pub struct CodexSource {
    home: PathBuf,
}

impl CodexSource {
    pub fn new(home: PathBuf) -> Self {
        Self { home }
    }

    fn sessions_root(&self) -> PathBuf {
        self.home.join("sessions")
    }

    fn history_path(&self) -> PathBuf {
        self.home.join("history.jsonl")
    }
}

impl LogSource for CodexSource {
    fn id(&self) -> &str {
        "codex"
    }

    fn description(&self) -> &str {
        "Codex CLI rollouts and history"
    }

    fn handles(&self, kind: SourceKind) -> bool {
        matches!(kind, SourceKind::Rollout | SourceKind::History)
    }

    fn is_available(&self) -> bool {
        self.sessions_root().exists() || self.history_path().is_file()
    }

    fn discover(&self) -> Vec<SourceFile> {
        let root = self.sessions_root();
        if !root.exists() {
            tracing::debug!(root = %root.display(), "codex sessions root missing");
        }

        let mut rollouts: Vec<SourceFile> = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| is_rollout_name(&e.file_name().to_string_lossy()))
            .map(|e| SourceFile::new(e.into_path(), SourceKind::Rollout))
            .collect();
        rollouts.sort_by(|a, b| a.path.cmp(&b.path));

        if !rollouts.is_empty() {
            return rollouts;
        }

        let history = self.history_path();
        if history.is_file() {
            vec![SourceFile::new(history, SourceKind::History)]
        } else {
            Vec::new()
        }
    }

    fn parse_line(&self, line: &str, path: &Path) -> Result<Vec<Event>, serde_json::Error> {
        let obj: Map<String, Value> = serde_json::from_str(line)?;
        Ok(parse_event(&obj, path).into_iter().collect())
    }
}

fn is_rollout_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with("rollout-") && lower.ends_with(".jsonl")
}

/// Effective event type: the payload type wins inside envelopes, and fills
/// in when the root has none.
fn effective_type(obj: &Map<String, Value>) -> String {
    let root = json::first_string(obj, TYPE_PATH);
    let payload = json::first_string(obj, PAYLOAD_TYPE_PATH);

    let typ = if ENVELOPE_TYPES.contains(&root.as_str()) || root.is_empty() {
        if payload.is_empty() {
            root
        } else {
            payload
        }
    } else {
        root
    };

    if typ.is_empty() {
        "unknown".to_string()
    } else {
        typ
    }
}

fn parse_event(obj: &Map<String, Value>, path: &Path) -> Option<Event> {
    let kind = EventKind::from_tag(&effective_type(obj));

    let text = extract_content(obj);
    if text.is_empty() {
        return None;
    }

    let role = Role::normalize(&json::first_string(obj, ROLE_PATHS));
    let role = match kind {
        EventKind::UserMessage => Role::User,
        EventKind::Message => role.unwrap_or(Role::Event),
        _ => role.unwrap_or(if kind.is_tool() { Role::Tool } else { Role::Event }),
    };

    let session_id = match json::first_string(obj, SESSION_ID_PATHS) {
        id if id.is_empty() => json::session_id_from_path(path),
        id => id,
    };
    let workdir = Some(json::first_string(obj, WORKDIR_PATHS)).filter(|w| !w.is_empty());

    Some(Event {
        session_id,
        timestamp: json::first_timestamp(obj, TIMESTAMP_PATHS),
        role,
        kind,
        text,
        workdir,
    })
}

fn extract_content(obj: &Map<String, Value>) -> String {
    let text = json::first_text(obj, CONTENT_PATHS);
    if !text.is_empty() {
        return text;
    }
    json::first_text(obj, FALLBACK_CONTENT_PATHS)
}
