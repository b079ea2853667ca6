//! List command implementation

use anyhow::{Context, Result};

use super::{format_unix, truncate};
use crate::store::Store;

pub fn run(store: &Store, query: &str, limit: usize) -> Result<()> {
    let sessions = store
        .list_sessions(query, limit)
        .with_context(|| format!("list sessions matching {query:?}"))?;

    if sessions.is_empty() {
        if query.trim().is_empty() {
            println!("No sessions found. Run 'agent-trace index' first.");
        } else {
            println!("No sessions match '{}'.", query.trim());
        }
        return Ok(());
    }

    println!(
        "{:<17} {:<38} {:<8} {:>5} {:<30} {}",
        "Last Activity", "ID", "Source", "Msgs", "Workdir", "Preview"
    );
    println!("{}", "-".repeat(140));

    for session in sessions {
        let workdir = if session.workdir.is_empty() {
            "-".to_string()
        } else {
            truncate(&session.workdir, 30)
        };

        println!(
            "{:<17} {:<38} {:<8} {:>5} {:<30} {}",
            format_unix(session.last_activity_ts),
            session.id,
            session.source,
            session.message_count,
            workdir,
            truncate(&session.preview, 50),
        );
    }

    Ok(())
}
