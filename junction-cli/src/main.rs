//! Junction: publish a git-tracked markdown tree to a Confluence space.
//!
//! # Usage
//!
//! ```text
//! junction [-v...] delta [SINCE] [UNTIL] --space <KEY> [--content-path <DIR>] [--dry-run] [--json]
//! junction [-v...] status --space <KEY> [--json]
//! ```

mod commands;
mod confluence;
mod git;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use commands::{delta::DeltaArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "junction",
    version,
    about = "Publish markdown files from a git repository to a Confluence space",
    long_about = None,
)]
struct Cli {
    /// Raise log verbosity (-v warn, -vv info, -vvv debug). `RUST_LOG` wins.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay the commits since SINCE onto the wiki.
    Delta(DeltaArgs),

    /// Show the pages tracked for a space.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Delta(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

fn verbosity_filter(count: u8) -> &'static str {
    match count {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_filter(verbose)));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
