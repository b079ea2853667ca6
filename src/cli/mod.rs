//! Command handlers for the `agent-trace` binary

pub mod index;
pub mod list;
pub mod show;
pub mod stats;

use chrono::{Local, TimeZone};

/// Render unix seconds as local `YYYY-MM-DD HH:MM`, or `n/a` when unknown.
pub fn format_unix(ts: i64) -> String {
    if ts <= 0 {
        return "n/a".to_string();
    }
    match Local.timestamp_opt(ts, 0).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        None => "n/a".to_string(),
    }
}

/// First line of `s`, cut to `max` characters with a trailing ellipsis.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        return line.to_string();
    }
    let cut: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_unix() {
        assert_eq!(format_unix(0), "n/a");
        assert_eq!(format_unix(-5), "n/a");
        let rendered = format_unix(1_704_067_200);
        assert_eq!(rendered.len(), 16);
        assert_eq!(&rendered[4..5], "-");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("first\nsecond", 10), "first");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
