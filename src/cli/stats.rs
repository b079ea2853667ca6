//! Stats command implementation

use anyhow::{Context, Result};

use crate::store::Store;

pub fn run(store: &Store) -> Result<()> {
    let stats = store.stats().context("read index stats")?;

    println!("Database:  {}", store.path().display());
    println!("Sessions:  {}", stats.sessions);
    println!("Messages:  {}", stats.messages);
    println!("Files:     {}", stats.files);
    println!("Search:    {}", stats.full_text.as_str());
    Ok(())
}
