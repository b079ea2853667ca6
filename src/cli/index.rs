//! Index command implementation

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::source::SourceRegistry;
use crate::store::Store;

pub async fn run(store: Arc<Store>, registry: SourceRegistry) -> Result<()> {
    let available = registry.available_sources();
    if available.is_empty() {
        println!("No log roots found. Check your configuration.");
    }
    for source in available {
        println!("📡 {} ({})", source.id(), source.description());
    }

    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let mut task =
        tokio::task::spawn_blocking(move || store.build_index(&registry, &task_cancel));

    let joined = tokio::select! {
        res = &mut task => res,
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted, stopping after the current line...");
            cancel.cancel();
            task.await
        }
    };

    match joined.context("index task failed")? {
        Ok(stats) => {
            println!("\n✅ Index complete");
            println!("   Files discovered: {}", stats.files_discovered);
            println!("   Files ingested:   {}", stats.files_ingested);
            println!("   Files unchanged:  {}", stats.files_unchanged);
            println!("   Files reset:      {}", stats.files_reset);
            println!("   Files pruned:     {}", stats.files_pruned);
            println!("   Messages added:   {}", stats.messages_inserted);
            println!("   Lines skipped:    {}", stats.lines_skipped);
            println!("   Sessions:         {}", stats.sessions);
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("Index build cancelled; completed files are kept.");
            Ok(())
        }
        Err(e) => Err(e).context("build index"),
    }
}
