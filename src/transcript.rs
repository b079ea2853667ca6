//! Transcript filtering and boilerplate classification
//!
//! Agent logs interleave real user turns with framing the harness injects
//! (`<environment_context>` blocks, `<turn_aborted>` markers, AGENTS.md
//! preambles). These helpers decide what counts as conversation.

use std::collections::HashSet;

use crate::source::{EventKind, Role};
use crate::store::Message;

/// Which non-canonical rows a transcript view includes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscriptToggles {
    /// Tool calls and tool results
    pub include_tools: bool,
    /// `user_message` rows (aborted or orphaned user input)
    pub include_aborted: bool,
    /// Everything else: system rows, reasoning, generic events
    pub include_events: bool,
}

const AGENTS_HEADING: &str = "# agents.md instructions for ";

/// Harness framing that is never a real user utterance.
pub fn is_boilerplate_user_content(content: &str) -> bool {
    let lower = content.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    if lower.starts_with("<turn_aborted>") && lower.contains("</turn_aborted>") {
        return true;
    }
    if lower.starts_with("<environment_context>") {
        return true;
    }
    lower.contains("<environment_context>") && lower.contains("<cwd>")
}

/// Content unsuitable as a session preview or as evidence of a real user:
/// empty, boilerplate, or an AGENTS.md instruction dump.
pub fn is_non_conversational_preview_content(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return true;
    }
    if is_boilerplate_user_content(trimmed) {
        return true;
    }
    trimmed.to_lowercase().starts_with(AGENTS_HEADING)
}

fn is_boilerplate_user_message(m: &Message) -> bool {
    m.role == Role::User && is_boilerplate_user_content(&m.content)
}

fn is_tool_message(m: &Message) -> bool {
    m.role == Role::Tool || m.kind.is_tool()
}

/// Lowercase and collapse whitespace for duplicate detection.
fn normalize_content(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Select the messages a transcript view shows.
///
/// Canonical user/assistant messages always pass and boilerplate user rows
/// never do. Aborted inputs that repeat a canonical user message are
/// suppressed even when `include_aborted` is set.
pub fn filter_messages(messages: &[Message], toggles: TranscriptToggles) -> Vec<Message> {
    let canonical_users: HashSet<String> = messages
        .iter()
        .filter(|m| m.kind == EventKind::Message && m.role == Role::User)
        .filter(|m| !is_boilerplate_user_content(&m.content))
        .map(|m| normalize_content(&m.content))
        .filter(|n| !n.is_empty())
        .collect();

    messages
        .iter()
        .filter(|m| {
            if m.content.trim().is_empty() || is_boilerplate_user_message(m) {
                return false;
            }
            if m.kind == EventKind::Message && matches!(m.role, Role::User | Role::Assistant) {
                return true;
            }
            if m.kind == EventKind::UserMessage {
                return toggles.include_aborted
                    && !canonical_users.contains(&normalize_content(&m.content));
            }
            if is_tool_message(m) {
                return toggles.include_tools;
            }
            toggles.include_events
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, kind: EventKind, content: &str) -> Message {
        Message {
            id: 0,
            session_id: "s".into(),
            timestamp: None,
            role,
            content: content.into(),
            kind,
            source: "rollout".into(),
            source_path: "/x".into(),
            workdir: String::new(),
        }
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_skips_preamble_user_messages() {
        let msgs = vec![
            msg(Role::User, EventKind::Message, "<environment_context> /Users/eric/dev/app zsh </environment_context>"),
            msg(Role::User, EventKind::Message, "real user question"),
            msg(Role::Assistant, EventKind::Message, "real answer"),
        ];
        let out = filter_messages(&msgs, TranscriptToggles::default());
        assert_eq!(contents(&out), vec!["real user question", "real answer"]);
    }

    #[test]
    fn test_toggles_select_extra_rows() {
        let msgs = vec![
            msg(Role::User, EventKind::Message, "question"),
            msg(Role::Tool, EventKind::ToolUse, "Read: {}"),
            msg(Role::Event, EventKind::Other("function_call".into()), "{\"cmd\":\"ls\"}"),
            msg(Role::Event, EventKind::Other("agent_reasoning".into()), "thinking"),
            msg(Role::System, EventKind::System, "init"),
            msg(Role::User, EventKind::UserMessage, "stopped halfway"),
        ];

        let none = filter_messages(&msgs, TranscriptToggles::default());
        assert_eq!(contents(&none), vec!["question"]);

        let tools = filter_messages(
            &msgs,
            TranscriptToggles { include_tools: true, ..Default::default() },
        );
        assert_eq!(contents(&tools), vec!["question", "Read: {}"]);

        let events = filter_messages(
            &msgs,
            TranscriptToggles { include_events: true, ..Default::default() },
        );
        assert_eq!(
            contents(&events),
            vec!["question", "{\"cmd\":\"ls\"}", "thinking", "init"]
        );

        let aborted = filter_messages(
            &msgs,
            TranscriptToggles { include_aborted: true, ..Default::default() },
        );
        assert_eq!(contents(&aborted), vec!["question", "stopped halfway"]);
    }

    #[test]
    fn test_duplicate_aborted_input_suppressed() {
        let msgs = vec![
            msg(Role::User, EventKind::UserMessage, "Fix   the BUILD"),
            msg(Role::User, EventKind::Message, "fix the build"),
        ];
        let out = filter_messages(
            &msgs,
            TranscriptToggles { include_aborted: true, include_tools: true, include_events: true },
        );
        assert_eq!(contents(&out), vec!["fix the build"]);
    }

    #[test]
    fn test_boilerplate_user_excluded_regardless_of_toggles() {
        let msgs = vec![
            msg(Role::User, EventKind::UserMessage, "<turn_aborted>x</turn_aborted>"),
            msg(Role::User, EventKind::Other("note".into()), "<environment_context><cwd>/a</cwd></environment_context>"),
        ];
        let out = filter_messages(
            &msgs,
            TranscriptToggles { include_aborted: true, include_tools: true, include_events: true },
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_is_boilerplate_user_content() {
        let cases = [
            ("# AGENTS.md instructions for /path", false),
            ("<turn_aborted>... </turn_aborted>", true),
            ("<turn_aborted> never closed", false),
            ("<environment_context> /Users/x zsh </environment_context>", true),
            ("see <environment_context> with <cwd>/x</cwd>", true),
            ("normal message", false),
            ("", false),
        ];
        for (content, want) in cases {
            assert_eq!(is_boilerplate_user_content(content), want, "content={content:?}");
        }
    }

    #[test]
    fn test_is_non_conversational_preview_content() {
        let cases = [
            ("# AGENTS.md instructions for /path", true),
            ("<environment_context> /Users/x zsh </environment_context>", true),
            ("   ", true),
            ("normal message", false),
        ];
        for (content, want) in cases {
            assert_eq!(is_non_conversational_preview_content(content), want, "content={content:?}");
        }
    }
}
