use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use agent_trace::cli::{index, list, show, stats};
use agent_trace::config::Config;
use agent_trace::source::SourceRegistry;
use agent_trace::store::Store;
use agent_trace::transcript::TranscriptToggles;

#[derive(Parser)]
#[command(name = "agent-trace")]
#[command(about = "Index and search local coding-agent session logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "agent-trace.yaml", global = true)]
    config: String,

    /// Database file (overrides config)
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Codex home directory (overrides config and $CODEX_HOME)
    #[arg(long, global = true)]
    codex_home: Option<String>,

    /// Claude home directory; repeat or comma-separate for several
    #[arg(long, value_delimiter = ',', global = true)]
    claude_home: Vec<String>,

    /// Delete the database and rebuild from scratch
    #[arg(long, global = true)]
    reindex: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan log roots and update the index
    Index,

    /// List sessions, optionally ranked by a search query
    List {
        /// Search terms
        query: Option<String>,

        /// Maximum sessions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a session transcript
    Show {
        /// Session ID
        session_id: String,

        /// Include tool calls and results
        #[arg(long)]
        tools: bool,

        /// Include aborted user inputs
        #[arg(long)]
        aborted: bool,

        /// Include other events (reasoning, system rows)
        #[arg(long)]
        events: bool,
    },

    /// Show index statistics
    Stats,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Load config, then apply command-line overrides
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("load config {}", cli.config))?;
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    if let Some(home) = cli.codex_home {
        config.sources.codex_home = Some(home);
    }
    if !cli.claude_home.is_empty() {
        config.sources.claude_homes = cli.claude_home;
    }
    if cli.reindex {
        config.database.reindex = true;
    }

    let db_path = config.database_path();
    let store = Store::open_with(&db_path, config.store_options())
        .with_context(|| format!("open index {}", db_path.display()))?;

    match cli.command {
        Commands::Index => {
            let registry = SourceRegistry::new(&config);
            index::run(Arc::new(store), registry).await?;
        }
        Commands::List { query, limit } => {
            let limit = limit.unwrap_or(config.search.default_limit);
            list::run(&store, query.as_deref().unwrap_or(""), limit)?;
        }
        Commands::Show {
            session_id,
            tools,
            aborted,
            events,
        } => {
            let toggles = TranscriptToggles {
                include_tools: tools,
                include_aborted: aborted,
                include_events: events,
            };
            show::run(&store, &session_id, toggles)?;
        }
        Commands::Stats => {
            stats::run(&store)?;
        }
    }

    Ok(())
}
