//! Configuration management with YAML support

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::store::StoreOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Delete the database before opening it
    #[serde(default)]
    pub reindex: bool,

    /// Use the FTS5 index when creating a new database
    #[serde(default = "default_enabled")]
    pub full_text: bool,
}

/// Log root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub codex_home: Option<String>,

    #[serde(default)]
    pub claude_homes: Vec<String>,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/agent-trace/index.sqlite".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_limit() -> usize {
    200
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            reindex: false,
            full_text: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default()
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./agent-trace.yaml (current directory)
    /// 3. ~/.config/agent-trace/agent-trace.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "agent-trace.yaml".to_string(),
            shellexpand::tilde("~/.config/agent-trace/agent-trace.yaml").to_string(),
        ];

        for search_path in &search_paths {
            if Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        expand(&self.database.path)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            reindex: self.database.reindex,
            full_text: self.database.full_text,
        }
    }

    /// Codex home: configured value, else `$CODEX_HOME`, else `~/.codex`
    pub fn codex_home(&self) -> PathBuf {
        if let Some(home) = self.sources.codex_home.as_deref().filter(|h| !h.is_empty()) {
            return expand(home);
        }
        match std::env::var("CODEX_HOME") {
            Ok(home) if !home.is_empty() => PathBuf::from(home),
            _ => home_dir().join(".codex"),
        }
    }

    /// Claude homes: configured list, else `$CLAUDE_HOME`, else every
    /// `~/.claude*` directory holding a `projects/` subdirectory
    pub fn claude_homes(&self) -> Vec<PathBuf> {
        if !self.sources.claude_homes.is_empty() {
            return self.sources.claude_homes.iter().map(|h| expand(h)).collect();
        }
        match std::env::var("CLAUDE_HOME") {
            Ok(home) if !home.is_empty() => vec![PathBuf::from(home)],
            _ => discover_claude_homes(&home_dir()),
        }
    }
}

/// Glob `<home>/.claude*` for directories that look like a Claude session
/// store. Falls back to `<home>/.claude`.
pub fn discover_claude_homes(home: &Path) -> Vec<PathBuf> {
    let pattern = home.join(".claude*");
    let mut homes: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .map(|paths| {
            paths
                .filter_map(|p| p.ok())
                .filter(|p| p.is_dir() && p.join("projects").is_dir())
                .collect()
        })
        .unwrap_or_default();
    homes.sort();

    if homes.is_empty() {
        homes.push(home.join(".claude"));
    }
    homes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.full_text);
        assert!(!config.database.reindex);
        assert_eq!(config.search.default_limit, 200);
        assert!(config.database_path().ends_with("agent-trace/index.sqlite"));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
database:
  path: /tmp/agent-trace/test.sqlite
  full_text: false

sources:
  codex_home: /data/codex
  claude_homes:
    - /data/claude
    - /data/claude-work
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/agent-trace/test.sqlite"));
        assert!(!config.store_options().full_text);
        assert_eq!(config.codex_home(), PathBuf::from("/data/codex"));
        assert_eq!(
            config.claude_homes(),
            vec![PathBuf::from("/data/claude"), PathBuf::from("/data/claude-work")]
        );
        assert_eq!(config.search.default_limit, 200);
    }

    #[test]
    fn test_discover_claude_homes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".claude/projects")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".claude-container/projects")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".claude-empty")).unwrap();
        std::fs::write(tmp.path().join(".claude.json"), "{}").unwrap();

        let homes = discover_claude_homes(tmp.path());
        assert_eq!(
            homes,
            vec![tmp.path().join(".claude"), tmp.path().join(".claude-container")]
        );
    }

    #[test]
    fn test_discover_claude_homes_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(discover_claude_homes(tmp.path()), vec![tmp.path().join(".claude")]);
    }
}
