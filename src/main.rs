//! Movetrace CLI - inspect and maintain the rename/copy provenance cache

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(name = "movetrace")]
#[command(version)]
#[command(about = "Rename/copy provenance cache - local SQLite backed by a shared remote store")]
#[command(long_about = r#"
Movetrace records which files each revision moved or copied, caches it per
clone, and falls back to the shared remote store for revisions it lacks.

Example usage:
  movetrace record --rev <hash> --move new.rs=old.rs
  movetrace show --rev <hash> --kind copy
  movetrace pull --rev <hash> --rev <hash>
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root (defaults to the current directory)
    #[arg(short, long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Path to movetrace.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the moves table if it does not exist yet
    Init {
        /// Target the remote store instead of the local cache
        #[arg(long)]
        remote: bool,
    },

    /// Record the moves and copies of one revision
    Record {
        /// Revision hash, or 0 for staged data
        #[arg(long)]
        rev: String,

        /// Moved file as DEST=SOURCE (repeatable)
        #[arg(long = "move", value_name = "DEST=SOURCE")]
        moves: Vec<String>,

        /// Copied file as DEST=SOURCE (repeatable)
        #[arg(long = "copy", value_name = "DEST=SOURCE")]
        copies: Vec<String>,

        /// Write to the remote store instead of the local cache
        #[arg(long)]
        remote: bool,
    },

    /// Show the rename map of revisions
    Show {
        /// Revision hashes
        #[arg(long = "rev", required = true)]
        revs: Vec<String>,

        /// move or copy
        #[arg(short, long, default_value = "move")]
        kind: String,

        /// Read the remote store directly
        #[arg(long)]
        remote: bool,

        /// Do not ask the remote store for missing revisions
        #[arg(long)]
        no_fetch: bool,
    },

    /// Show raw rows of revisions, both kinds
    Raw {
        #[arg(long = "rev", required = true)]
        revs: Vec<String>,

        #[arg(long)]
        remote: bool,

        #[arg(long)]
        no_fetch: bool,
    },

    /// List which revisions have data
    Present {
        #[arg(long = "rev", required = true)]
        revs: Vec<String>,

        #[arg(long)]
        remote: bool,
    },

    /// Delete all rows of a revision
    Delete {
        #[arg(long)]
        rev: String,

        #[arg(long)]
        remote: bool,
    },

    /// Pull revisions missing from the local cache
    Pull {
        #[arg(long = "rev", required = true)]
        revs: Vec<String>,
    },

    /// Upload local rows of revisions to the remote store
    Push {
        #[arg(long = "rev", required = true)]
        revs: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let ctx = Context::open(&cli.repo, cli.config.as_deref(), cli.json)?;

    match cli.command {
        Commands::Init { remote } => commands::run_init(&ctx, remote),
        Commands::Record { rev, moves, copies, remote } => {
            commands::run_record(&ctx, &rev, &moves, &copies, remote)
        }
        Commands::Show { revs, kind, remote, no_fetch } => {
            commands::run_show(&ctx, &revs, &kind, remote, no_fetch)
        }
        Commands::Raw { revs, remote, no_fetch } => commands::run_raw(&ctx, &revs, remote, no_fetch),
        Commands::Present { revs, remote } => commands::run_present(&ctx, &revs, remote),
        Commands::Delete { rev, remote } => commands::run_delete(&ctx, &rev, remote),
        Commands::Pull { revs } => commands::run_pull(&ctx, &revs),
        Commands::Push { revs } => commands::run_push(&ctx, &revs),
    }
}
