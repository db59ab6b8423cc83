//! # Main — CLI Entry Point
//!
//! Parses arguments, initialises logging, and hands off to [`cli`].
//!
//! ## Subcommands
//!
//! - `search`: run the parallel vanity search (default mode: 8-char vanity).
//! - `estimate`: print the match probability and expected effort for a mode.
//! - `verify`: check that a private key derives a public key.
//! - `selftest`: generator diagnostics (`compat`, `distribution`, `entropy`, `node-id`).
//!
//! ## Global Options
//!
//! - `--threads` / `MESHVANITY_THREADS`: worker count (defaults per platform).
//! - `--checkpoint`: JSON file accumulating attempts spent on a target.

mod cli;

use anyhow::Result;
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use meshvanity::params;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "meshvanity",
    version,
    about = "Search for MeshCore Ed25519 keys with vanity public keys"
)]
struct Cli {
    /// Number of search workers (defaults to all logical cores; fewer on Windows)
    #[arg(long, global = true, env = "MESHVANITY_THREADS")]
    threads: Option<usize>,

    /// Checkpoint file recording attempts already spent on the same target
    #[arg(long, global = true)]
    checkpoint: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for a key matching the selected pattern
    Search(SearchArgs),
    /// Print the odds and expected effort for a pattern
    Estimate {
        #[command(flatten)]
        mode: ModeArgs,
        /// Keys per second to turn attempt counts into times
        #[arg(long)]
        rate: Option<f64>,
    },
    /// Check that a private key derives the given public key
    Verify {
        /// 64-byte private key as 128 hex chars
        #[arg(long)]
        private: String,
        /// 32-byte public key as 64 hex chars
        #[arg(long)]
        public: String,
    },
    /// Diagnostics for the key generator
    Selftest {
        #[command(subcommand)]
        check: SelftestCheck,
    },
}

#[derive(Subcommand)]
pub enum SelftestCheck {
    /// Verify a known MeshCore keypair and a freshly generated one
    Compat,
    /// Histogram of first-two hex chars over many keys
    Distribution {
        /// Keys to generate, in millions
        #[arg(long, default_value_t = 1.0)]
        millions: f64,
    },
    /// Key collisions and byte frequencies
    Entropy {
        /// Keys to generate, in thousands
        #[arg(long, default_value_t = 10.0)]
        thousands: f64,
    },
    /// Node id coverage over a small sample
    NodeId {
        /// Keys to generate, in thousands
        #[arg(long, default_value_t = 1.0)]
        thousands: f64,
    },
}

#[derive(Args, Clone, Debug, Default)]
#[command(group(ArgGroup::new("mode").multiple(false)))]
pub struct ModeArgs {
    /// First two hex chars of the key (e.g. F8); constrains default, simple and four-char modes
    #[arg(long)]
    first_two: Option<String>,
    /// Only check the first two hex chars (requires --first-two)
    #[arg(long, group = "mode", requires = "first_two")]
    simple: bool,
    /// Keys starting with this hex prefix (1-8 chars)
    #[arg(long, group = "mode")]
    prefix: Option<String>,
    /// Legacy 4-char vanity, optionally with --first-two
    #[arg(long, group = "mode")]
    four_char: bool,
    /// Hex prefix plus 8-char vanity
    #[arg(long, group = "mode")]
    prefix_vanity: Option<String>,
    /// First 2 hex chars equal the last 2, directly or mirrored
    #[arg(long = "vanity-2", group = "mode")]
    vanity_2: bool,
    /// First 4 hex chars equal the last 4, directly or mirrored
    #[arg(long = "vanity-4", group = "mode")]
    vanity_4: bool,
    /// First 6 hex chars equal the last 6, directly or mirrored
    #[arg(long = "vanity-6", group = "mode")]
    vanity_6: bool,
    /// First 8 hex chars equal the last 8, directly or mirrored (default)
    #[arg(long = "vanity-8", group = "mode")]
    vanity_8: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    #[command(flatten)]
    mode: ModeArgs,

    /// Keys to check across all workers (e.g. 100 for 100M, 1b for 1B)
    #[arg(long, value_parser = params::parse_key_count, conflicts_with = "time")]
    keys: Option<u64>,

    /// Maximum runtime (e.g. 2 for 2 hours, 2:30 for 2h30m)
    #[arg(long, value_parser = params::parse_time_limit)]
    time: Option<Duration>,

    /// Keys per worker batch (e.g. 500K, 1M, 2M)
    #[arg(long, value_parser = params::parse_batch_size)]
    batch_size: Option<u64>,

    /// Watchlist file (watchlist.txt is loaded automatically if present)
    #[arg(long)]
    watchlist: Option<PathBuf>,

    /// Disable health monitoring and worker restarts
    #[arg(long)]
    no_health_check: bool,

    /// Per-worker progress and health details
    #[arg(short, long)]
    verbose: bool,

    /// Save the found key as one JSON file for MeshCore app import
    #[arg(long)]
    json: bool,

    /// Directory for key files
    #[arg(long, env = "MESHVANITY_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let verbose = matches!(&cli.command, Commands::Search(args) if args.verbose);

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    match &cli.command {
        Commands::Search(args) => cli::run_search(&cli, args),
        Commands::Estimate { mode, rate } => cli::run_estimate(mode, *rate),
        Commands::Verify { private, public } => cli::run_verify(private, public),
        Commands::Selftest { check } => cli::run_selftest(check),
    }
}
