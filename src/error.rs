//! Errors surfaced by the index

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`crate::Store`] operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("open database {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Db {
        context: String,
        source: rusqlite::Error,
    },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("search failed (fts: {fts}; fallback: {fallback})")]
    Search {
        fts: Box<IndexError>,
        fallback: Box<IndexError>,
    },

    #[error("index build cancelled")]
    Cancelled,
}

impl IndexError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IndexError::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::SessionNotFound(_))
    }
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;

/// Attach operation context to SQLite results
pub(crate) trait DbContext<T> {
    fn db_context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> DbContext<T> for rusqlite::Result<T> {
    fn db_context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| IndexError::Db {
            context: context(),
            source,
        })
    }
}
