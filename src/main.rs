//! # Shelf CLI (`shelf`)
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the database and the catalog table |
//! | `shelf scrape [URL]` | Fetch, parse, and store one catalog page |
//! | `shelf ask "<question>"` | Answer a question and show the SQL used |
//! | `shelf chat` | Ask questions line by line from stdin |
//! | `shelf schema` | Print the schema description given to the agent |
//! | `shelf list` | Print the stored catalog |
//! | `shelf trace <file>` | Extract the executed SQL from a saved trace |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shelf::trace::SQL_QUERY_TOOL;
use shelf::{cli, config, logging};

/// Shelf: scrape a catalog into SQLite and ask questions about it.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Scrape a product catalog into SQLite and ask questions about it in plain language",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply if it does not exist.
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    /// Override `[db].path` from the config file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database file and the catalog table.
    ///
    /// Idempotent: running it again is safe.
    Init,

    /// Run one scrape cycle: fetch, parse, validate, replace the catalog.
    ///
    /// Failures are logged and leave the existing catalog untouched.
    Scrape {
        /// Page to scrape. Defaults to `[scrape].url`.
        url: Option<String>,
    },

    /// Ask a question about the catalog.
    Ask {
        /// The question. Multiple words are joined with spaces.
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        question: Vec<String>,

        /// Print `{question, answer, sql}` as one JSON line.
        #[arg(long)]
        json: bool,

        /// Write the agent's execution trace to this file as JSON.
        #[arg(long)]
        save_trace: Option<PathBuf>,
    },

    /// Read questions from stdin, one per line, and answer each.
    Chat,

    /// Print the schema description (DDL plus sample rows) given to the agent.
    Schema,

    /// Print every row in the catalog.
    List,

    /// Extract the executed SQL from a trace saved with `ask --save-trace`.
    Trace {
        /// Trace file (JSON array of steps).
        path: PathBuf,

        /// Tool name that marks SQL-executing steps.
        #[arg(long, default_value = SQL_QUERY_TOOL)]
        tool: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let mut cfg = config::load_config(&args.config)?;
    if let Some(db) = args.db {
        cfg.db.path = db;
    }
    logging::init(&cfg.log);
    if !args.config.exists() {
        tracing::debug!(path = %args.config.display(), "config file not found, using defaults");
    }

    match args.command {
        Commands::Init => cli::run_init(&cfg).await?,
        Commands::Scrape { url } => cli::run_scrape(&cfg, url.as_deref()).await?,
        Commands::Ask {
            question,
            json,
            save_trace,
        } => {
            let question = question.join(" ");
            cli::run_ask(&cfg, &question, json, save_trace.as_deref()).await?;
        }
        Commands::Chat => cli::run_chat(&cfg).await?,
        Commands::Schema => cli::run_schema(&cfg).await?,
        Commands::List => cli::run_list(&cfg).await?,
        Commands::Trace { path, tool } => cli::run_trace(&path, &tool)?,
    }

    Ok(())
}
