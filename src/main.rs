//! # Review Desk CLI (`desk`)
//!
//! ## Usage
//!
//! ```bash
//! desk --config ./config/desk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `desk init` | Create the SQLite database and run schema migrations |
//! | `desk collections` | Show allow-lists, viewers, and stored collections |
//! | `desk import <collection> <file.json>` | Load documents from a JSON file |
//! | `desk serve` | Start the HTTP API |
//! | `desk load <target>` | Show a collection as a grid |
//! | `desk review <target> <id>` | Mark one document reviewed |
//! | `desk export <target> <id>` | Write a document's record lists as CSV |
//! | `desk completions <shell>` | Print shell completions |
//!
//! `<target>` is a viewer name from `[viewers]` or a bare collection name.
//!
//! ## Examples
//!
//! ```bash
//! desk init
//! desk import dailytotals_t3global ./totals.json
//! desk load dailytotals_t3global --start 2024-01-01 --end 2024-01-31 --unreviewed
//! desk review oba 2024-01-05 --reviewer ana@example.com
//! desk export locates 2024-01-05 --out ./csv
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use review_desk::backend;
use review_desk::collections;
use review_desk::config;
use review_desk::db;
use review_desk::import;
use review_desk::migrate;
use review_desk::server;
use review_desk::sqlite_store::SqliteStore;
use review_desk::view::{self, ReviewOptions};
use review_desk_core::viewer::ViewFilters;

/// Review Desk: browse dated compliance collections, mark documents
/// reviewed, and export record lists as CSV.
#[derive(Parser)]
#[command(name = "desk", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/desk.toml")]
    config: PathBuf,

    /// Talk to the server at `[client].endpoint` instead of the local store.
    #[arg(long, global = true)]
    remote: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List allow-listed collections, configured viewers, and stored counts.
    Collections,

    /// Import documents from a JSON file into a collection.
    Import {
        collection: String,
        file: PathBuf,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Load a collection and print it as a grid.
    Load {
        /// Viewer name or collection name.
        target: String,

        /// Exact date: a document id, else the `date` field.
        #[arg(long)]
        date: Option<String>,

        /// Range start (inclusive).
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Range end (inclusive).
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Hide documents already reviewed.
        #[arg(long)]
        unreviewed: bool,

        /// Print documents as JSON instead of a grid.
        #[arg(long)]
        json: bool,
    },

    /// Mark a document reviewed.
    ///
    /// Gated by the review allow-list only. The current state is shown first
    /// when the collection is also readable.
    Review {
        target: String,
        id: String,

        /// Reviewer identity; defaults to `[client].reviewer`.
        #[arg(long, env = "DESK_REVIEWER")]
        reviewer: Option<String>,

        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,

        /// Review again even if already reviewed.
        #[arg(long)]
        force: bool,
    },

    /// Export a document's record lists as `<id>_<field>.csv` files.
    Export {
        target: String,
        id: String,

        /// Output directory.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "desk", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Collections => {
            collections::list_collections(&cfg).await?;
        }
        Commands::Import { collection, file } => {
            let store = SqliteStore::new(db::connect(&cfg).await?);
            import::run_import(&store, &collection, &file).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Load {
            target,
            date,
            start,
            end,
            unreviewed,
            json,
        } => {
            let desk = backend::connect(&cfg, cli.remote).await?;
            let filters = ViewFilters {
                date,
                start_date: start,
                end_date: end,
                unreviewed_only: unreviewed,
            };
            view::run_load(desk.as_ref(), cfg.viewer(&target), &filters, json).await?;
        }
        Commands::Review {
            target,
            id,
            reviewer,
            yes,
            force,
        } => {
            let desk = backend::connect(&cfg, cli.remote).await?;
            let opts = ReviewOptions {
                reviewer: reviewer.or_else(|| cfg.client.reviewer.clone()),
                assume_yes: yes,
                force,
            };
            view::run_review(desk.as_ref(), cfg.viewer(&target), &id, &opts).await?;
        }
        Commands::Export { target, id, out } => {
            let desk = backend::connect(&cfg, cli.remote).await?;
            view::run_export(desk.as_ref(), cfg.viewer(&target), &id, &out).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
