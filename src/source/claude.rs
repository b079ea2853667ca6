//! Claude Code log source
//!
//! Data format: JSONL files in `<claude_home>/projects/<encoded-cwd>/<session_id>.jsonl`.
//! The project directory name is the session's working directory with `/`
//! replaced by `-`.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::json::{self, Candidates};
use super::{Event, EventKind, LogSource, Role, SourceFile, SourceKind};

/// Directories under `projects/` that never hold top-level sessions
const SKIP_DIRS: &[&str] = &["subagents", "memory"];

/// Maximum rendered length of a tool call's JSON input
const TOOL_INPUT_LIMIT: usize = 500;

const TYPE_PATH: Candidates = &[&["type"]];
const SESSION_ID_PATH: Candidates = &[&["sessionId"]];
const CWD_PATH: Candidates = &[&["cwd"]];
const CONTENT_PATH: Candidates = &[&["content"]];

pub struct ClaudeSource {
    homes: Vec<PathBuf>,
}

impl ClaudeSource {
    pub fn new(homes: Vec<PathBuf>) -> Self {
        Self { homes }
    }

    fn project_roots(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.homes.iter().map(|home| home.join("projects"))
    }
}

impl LogSource for ClaudeSource {
    fn id(&self) -> &str {
        "claude"
    }

    fn description(&self) -> &str {
        "Claude Code project sessions"
    }

    fn handles(&self, kind: SourceKind) -> bool {
        kind == SourceKind::Claude
    }

    fn is_available(&self) -> bool {
        self.project_roots().any(|root| root.exists())
    }

    fn discover(&self) -> Vec<SourceFile> {
        let mut seen = HashSet::new();
        let mut files = vec![];

        for root in self.project_roots() {
            if !root.exists() {
                tracing::debug!(root = %root.display(), "claude projects root missing");
                continue;
            }

            let entries = WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0
                        || !e.file_type().is_dir()
                        || !SKIP_DIRS.iter().any(|skip| e.file_name() == *skip)
                })
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file());

            for entry in entries {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                if !name.ends_with(".jsonl") {
                    continue;
                }
                let path = entry.into_path();
                let key = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
                if seen.insert(key) {
                    files.push(SourceFile::new(path, SourceKind::Claude));
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    fn parse_line(&self, line: &str, path: &Path) -> Result<Vec<Event>, serde_json::Error> {
        let obj: Map<String, Value> = serde_json::from_str(line)?;
        Ok(parse_entry(&obj, path))
    }
}

/// Fields shared by every event produced from one entry
struct EntryContext {
    session_id: String,
    timestamp: Option<i64>,
    workdir: Option<String>,
}

impl EntryContext {
    fn event(&self, role: Role, kind: EventKind, text: String) -> Event {
        Event {
            session_id: self.session_id.clone(),
            timestamp: self.timestamp,
            role,
            kind,
            text,
            workdir: self.workdir.clone(),
        }
    }
}

fn parse_entry(obj: &Map<String, Value>, path: &Path) -> Vec<Event> {
    let entry_type = json::first_string(obj, TYPE_PATH);
    if !matches!(entry_type.as_str(), "user" | "assistant" | "system") {
        // progress, file-history-snapshot and anything unknown
        return Vec::new();
    }

    let session_id = match json::first_string(obj, SESSION_ID_PATH) {
        id if id.is_empty() => {
            json::uuid_from_file_name(path).unwrap_or_else(|| "unknown-session".to_string())
        }
        id => id,
    };
    let ctx = EntryContext {
        session_id,
        timestamp: obj.get("timestamp").and_then(json::parse_unix),
        workdir: Some(json::first_string(obj, CWD_PATH)).filter(|w| !w.is_empty()),
    };

    match entry_type.as_str() {
        "user" => parse_user(obj, &ctx),
        "assistant" => parse_assistant(obj, &ctx),
        _ => parse_system(obj, &ctx),
    }
}

fn message_content(obj: &Map<String, Value>) -> Option<&Value> {
    obj.get("message")?.as_object()?.get("content")
}

fn block_text(block: &Map<String, Value>) -> String {
    block.get("text").map(json::as_text).unwrap_or_default()
}

fn parse_user(obj: &Map<String, Value>, ctx: &EntryContext) -> Vec<Event> {
    match message_content(obj) {
        Some(Value::String(s)) => {
            let text = s.trim();
            if text.is_empty() {
                return Vec::new();
            }
            vec![ctx.event(Role::User, EventKind::Message, text.to_string())]
        }
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|block| match block.get("type").map(json::as_text).as_deref() {
                Some("tool_result") => {
                    Some((Role::Tool, EventKind::ToolResult, tool_result_text(block)))
                }
                Some("text") => Some((Role::User, EventKind::Message, block_text(block))),
                _ => None,
            })
            .filter(|(_, _, text)| !text.is_empty())
            .map(|(role, kind, text)| ctx.event(role, kind, text))
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_assistant(obj: &Map<String, Value>, ctx: &EntryContext) -> Vec<Event> {
    let Some(Value::Array(blocks)) = message_content(obj) else {
        return Vec::new();
    };

    let mut text_parts = vec![];
    let mut events = vec![];

    for block in blocks.iter().filter_map(Value::as_object) {
        match block.get("type").map(json::as_text).as_deref() {
            Some("text") => {
                let text = block_text(block);
                if !text.is_empty() {
                    text_parts.push(text);
                }
            }
            Some("tool_use") => {
                let name = block.get("name").map(json::as_text).unwrap_or_default();
                if let Some(text) = format_tool_use(&name, block.get("input")) {
                    events.push(ctx.event(Role::Tool, EventKind::ToolUse, text));
                }
            }
            _ => {}
        }
    }

    let combined = text_parts.join("\n\n");
    let combined = combined.trim();
    if !combined.is_empty() {
        events.insert(
            0,
            ctx.event(Role::Assistant, EventKind::Message, combined.to_string()),
        );
    }
    events
}

fn parse_system(obj: &Map<String, Value>, ctx: &EntryContext) -> Vec<Event> {
    let text = json::first_string(obj, CONTENT_PATH);
    if text.is_empty() {
        return Vec::new();
    }
    vec![ctx.event(Role::System, EventKind::System, text)]
}

fn tool_result_text(block: &Map<String, Value>) -> String {
    match block.get("content") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(block_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

/// Render a tool call as `name: {json}` (truncated) or `name()`.
fn format_tool_use(name: &str, input: Option<&Value>) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let args = match input {
        Some(Value::Object(map)) if !map.is_empty() => map,
        _ => return Some(format!("{name}()")),
    };
    let Ok(rendered) = serde_json::to_string(args) else {
        return Some(format!("{name}()"));
    };
    Some(format!("{name}: {}", truncate_chars(&rendered, TOOL_INPUT_LIMIT)))
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let head: String = s.chars().take(limit - 3).collect();
    format!("{head}...")
}

/// Decode the working directory encoded in a Claude project directory name,
/// e.g. `-Users-eric-projects-foo` becomes `/Users/eric/projects/foo`.
pub fn workdir_from_path(path: &Path) -> String {
    let Some(dir) = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
    else {
        return String::new();
    };
    if dir == "projects" || !dir.starts_with('-') {
        return String::new();
    }
    let parts: Vec<&str> = dir.split('-').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return String::new();
    }
    format!("/{}", parts.join("/"))
}
