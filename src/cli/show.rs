//! Show command implementation

use anyhow::{Context, Result};

use super::format_unix;
use crate::store::Store;
use crate::transcript::{filter_messages, TranscriptToggles};

pub fn run(store: &Store, session_id: &str, toggles: TranscriptToggles) -> Result<()> {
    let session = match store.get_session(session_id) {
        Ok(s) => s,
        Err(e) if e.is_not_found() => {
            println!("Session '{}' not found.", session_id);
            return Ok(());
        }
        Err(e) => return Err(e).context("load session"),
    };

    println!("\n{}", "=".repeat(80));
    println!("Session: {}", session.id);
    println!(
        "Source: {} | Last activity: {} | Messages: {}",
        session.source,
        format_unix(session.last_activity_ts),
        session.message_count
    );
    if !session.workdir.is_empty() {
        println!("Workdir: {}", session.workdir);
    }
    println!("{}", "=".repeat(80));

    let messages = store
        .get_messages(&session.id)
        .with_context(|| format!("load messages for {}", session.id))?;
    let visible = filter_messages(&messages, toggles);

    if visible.is_empty() {
        println!("\nNo messages to show (try --tools, --aborted or --events).");
        return Ok(());
    }

    let hidden = messages.len() - visible.len();
    for msg in visible {
        let ts = msg
            .timestamp
            .map(format_unix)
            .unwrap_or_else(|| "?".to_string());
        println!(
            "\n[{} | {}] ({})",
            msg.role.as_str().to_uppercase(),
            msg.kind.as_str(),
            ts
        );
        println!("{}", msg.content);
        println!("{}", "-".repeat(40));
    }

    if hidden > 0 {
        println!("\n({} rows hidden)", hidden);
    }

    Ok(())
}
