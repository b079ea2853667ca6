//! Log sources: discovery and per-line event parsing
//!
//! Two log families are supported:
//! - Codex: rollout JSONL files under `<codex_home>/sessions/`, or a single
//!   `<codex_home>/history.jsonl` when no rollouts exist
//! - Claude: session JSONL files under `<claude_home>/projects/` for one or
//!   more Claude homes
//!
//! Each family discovers its own files and turns raw lines into [`Event`]s.

pub(crate) mod claude;
pub(crate) mod json;
mod rollout;

pub use claude::ClaudeSource;
pub use rollout::CodexSource;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::Config;

/// Which log family (and storage flavour) a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Codex `rollout-*.jsonl` session file
    Rollout,
    /// Codex global `history.jsonl`
    History,
    /// Claude project session file
    Claude,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Rollout => "rollout",
            SourceKind::History => "history",
            SourceKind::Claude => "claude",
        }
    }
}

/// A discovered log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, kind: SourceKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Normalized message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
    Event,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
            Role::Event => "event",
        }
    }

    /// Normalize a raw role string. Empty input yields `None`; unknown roles
    /// become `Tool` when they mention tools and `Event` otherwise.
    pub fn normalize(raw: &str) -> Option<Self> {
        let role = raw.trim().to_lowercase();
        match role.as_str() {
            "" => None,
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            "system" => Some(Role::System),
            "event" => Some(Role::Event),
            other if other.contains("tool") => Some(Role::Tool),
            _ => Some(Role::Event),
        }
    }

    /// Read back a stored role; anything unrecognized is an event.
    pub fn from_stored(raw: &str) -> Self {
        Self::normalize(raw).unwrap_or(Role::Event)
    }
}

/// Event type tag, closed over the tags downstream logic branches on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    UserMessage,
    ToolUse,
    ToolResult,
    System,
    Other(String),
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "message" => EventKind::Message,
            "user_message" => EventKind::UserMessage,
            "tool_use" => EventKind::ToolUse,
            "tool_result" => EventKind::ToolResult,
            "system" => EventKind::System,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Message => "message",
            EventKind::UserMessage => "user_message",
            EventKind::ToolUse => "tool_use",
            EventKind::ToolResult => "tool_result",
            EventKind::System => "system",
            EventKind::Other(tag) => tag,
        }
    }

    pub fn is_tool(&self) -> bool {
        self.as_str().to_lowercase().contains("tool")
    }
}

/// One normalized event parsed from a log line
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Session id found in the line or derived from its path; may be empty
    pub session_id: String,
    /// Unix seconds
    pub timestamp: Option<i64>,
    pub role: Role,
    pub kind: EventKind,
    pub text: String,
    pub workdir: Option<String>,
}

/// A family of conversation logs
pub trait LogSource: Send + Sync {
    /// Unique identifier, e.g. "codex" or "claude"
    fn id(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Whether this source handles files of the given kind
    fn handles(&self, kind: SourceKind) -> bool;

    /// Check if any of this source's roots exist
    fn is_available(&self) -> bool;

    /// Discover log files, sorted by path. Missing roots yield nothing.
    fn discover(&self) -> Vec<SourceFile>;

    /// Parse one raw line. A JSON decode failure is returned as an error so
    /// the caller can skip the line.
    fn parse_line(&self, line: &str, path: &Path) -> Result<Vec<Event>, serde_json::Error>;
}

/// Registry of configured log sources
pub struct SourceRegistry {
    sources: Vec<Box<dyn LogSource>>,
}

impl SourceRegistry {
    pub fn new(config: &Config) -> Self {
        let mut registry = Self { sources: vec![] };
        registry.register(Box::new(CodexSource::new(config.codex_home())));
        registry.register(Box::new(ClaudeSource::new(config.claude_homes())));
        registry
    }

    pub fn empty() -> Self {
        Self { sources: vec![] }
    }

    pub fn register(&mut self, source: Box<dyn LogSource>) {
        self.sources.push(source);
    }

    pub fn available_sources(&self) -> Vec<&dyn LogSource> {
        self.sources
            .iter()
            .filter(|s| s.is_available())
            .map(|s| s.as_ref())
            .collect()
    }

    pub fn source_for(&self, kind: SourceKind) -> Option<&dyn LogSource> {
        self.sources
            .iter()
            .find(|s| s.handles(kind))
            .map(|s| s.as_ref())
    }

    /// Every file from every source, deduplicated by path and sorted
    /// lexicographically.
    pub fn discover_all(&self) -> Vec<SourceFile> {
        let mut seen = HashSet::new();
        let mut files: Vec<SourceFile> = self
            .sources
            .iter()
            .flat_map(|s| s.discover())
            .filter(|f| seen.insert(f.path.clone()))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Parse a line with the source responsible for `file`.
    pub fn parse_line(
        &self,
        file: &SourceFile,
        line: &str,
    ) -> Result<Vec<Event>, serde_json::Error> {
        match self.source_for(file.kind) {
            Some(source) => source.parse_line(line, &file.path),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_normalize() {
        assert_eq!(Role::normalize(" Assistant "), Some(Role::Assistant));
        assert_eq!(Role::normalize("function_tool"), Some(Role::Tool));
        assert_eq!(Role::normalize("developer"), Some(Role::Event));
        assert_eq!(Role::normalize(""), None);
    }

    #[test]
    fn test_event_kind_tags() {
        assert_eq!(EventKind::from_tag("tool_result"), EventKind::ToolResult);
        assert_eq!(
            EventKind::from_tag("function_call").as_str(),
            "function_call"
        );
        assert!(EventKind::from_tag("custom_tool_call").is_tool());
        assert!(!EventKind::from_tag("reasoning").is_tool());
    }

    #[test]
    fn test_registry_dedups_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        let projects = tmp.path().join("projects").join("-tmp-a");
        std::fs::create_dir_all(&projects).unwrap();
        std::fs::write(projects.join("b.jsonl"), "{}\n").unwrap();
        std::fs::write(projects.join("a.jsonl"), "{}\n").unwrap();

        let mut registry = SourceRegistry::empty();
        registry.register(Box::new(ClaudeSource::new(vec![
            tmp.path().to_path_buf(),
            tmp.path().to_path_buf(),
        ])));

        let files = registry.discover_all();
        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("a.jsonl"));
        assert!(files[1].path.ends_with("b.jsonl"));
        assert!(files.iter().all(|f| f.kind == SourceKind::Claude));
    }
}
