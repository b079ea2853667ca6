pub mod cli;
pub mod config;
pub mod error;
pub mod source;
pub mod store;
pub mod transcript;

pub use config::Config;
pub use error::{IndexError, Result};
pub use source::{LogSource, SourceRegistry};
pub use store::{BuildStats, IndexStats, Message, Session, Store, StoreOptions};
pub use transcript::{filter_messages, TranscriptToggles};
