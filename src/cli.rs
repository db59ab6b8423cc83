//! # CLI Execution Functions
//!
//! Kept out of `main.rs` so the entry point stays declarative. Each subcommand
//! has one `run_*` function here: the search banner and result summary, the
//! estimate table, keypair verification and the generator diagnostics.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use meshvanity::config::{MatchMode, SearchConfig, VanityWidth};
use meshvanity::coordinator::{SearchCoordinator, SearchOutcome, SearchReport};
use meshvanity::events::LogSink;
use meshvanity::keygen::{meshcore_factory, verify_hex, MeshcoreGenerator};
use meshvanity::metrics::{default_worker_count, SystemStatus};
use meshvanity::params::{build_mode, scale_sample_count, ModeFlags};
use meshvanity::pattern::{load_watchlist, WatchlistPattern};
use meshvanity::persist::{FileKeySink, KeyFormat};
use meshvanity::probability::{
    confident_attempts, expected_attempts, format_probability, group_thousands, probability_of,
};
use meshvanity::selftest::{
    check_compatibility, entropy_check, node_id_histogram, ByteHistogram, KNOWN_PRIVATE_HEX,
    KNOWN_PUBLIC_HEX, NODE_IDS,
};
use meshvanity::tracker::format_duration;
use rand::seq::IndexedRandom;

use super::{Cli, ModeArgs, SearchArgs, SelftestCheck};

const DEFAULT_WATCHLIST: &str = "watchlist.txt";

// ── Mode Selection ──────────────────────────────────────────────

fn mode_from_args(args: &ModeArgs) -> Result<MatchMode> {
    let vanity = if args.vanity_2 {
        Some(VanityWidth::Two)
    } else if args.vanity_4 {
        Some(VanityWidth::Four)
    } else if args.vanity_6 {
        Some(VanityWidth::Six)
    } else if args.vanity_8 {
        Some(VanityWidth::Eight)
    } else {
        None
    };
    build_mode(&ModeFlags {
        first_two: args.first_two.clone(),
        simple: args.simple,
        prefix: args.prefix.clone(),
        four_char: args.four_char,
        prefix_vanity: args.prefix_vanity.clone(),
        vanity,
    })
}

/// Explicit `--watchlist` must load; the implicit `watchlist.txt` is optional.
fn resolve_watchlist(explicit: Option<&Path>) -> Result<Vec<WatchlistPattern>> {
    match explicit {
        Some(path) => load_watchlist(path),
        None => {
            let default = Path::new(DEFAULT_WATCHLIST);
            if default.is_file() {
                load_watchlist(default)
            } else {
                Ok(Vec::new())
            }
        }
    }
}

// ── Search ──────────────────────────────────────────────────────

pub fn run_search(cli: &Cli, args: &SearchArgs) -> Result<()> {
    let mode = mode_from_args(&args.mode)?;
    let workers = match cli.threads {
        Some(0) => bail!("--threads must be at least 1"),
        Some(n) => n,
        None => default_worker_count(),
    };
    let watchlist = resolve_watchlist(args.watchlist.as_deref())?;

    let mut config = SearchConfig::new(mode)
        .with_workers(workers)
        .with_max_attempts(args.keys)
        .with_max_time(args.time)
        .with_watchlist(watchlist)
        .with_health_check(!args.no_health_check)
        .with_verbose(args.verbose);
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating output directory {}", args.output_dir.display()))?;
    let format = if args.json {
        KeyFormat::Json
    } else {
        KeyFormat::Text
    };
    let sink = Arc::new(FileKeySink::new(args.output_dir.clone(), format));

    let coordinator =
        SearchCoordinator::new(config, meshcore_factory(), sink, Arc::new(LogSink))?
            .with_checkpoint(cli.checkpoint.clone());

    print_banner(coordinator.config());

    let cancel = coordinator.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, stopping workers...");
        cancel.cancel();
    }) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    let report = coordinator.run()?;
    print_report(&report);
    Ok(())
}

fn print_banner(config: &SearchConfig) {
    let status = SystemStatus::collect();
    let probability = probability_of(&config.mode);

    eprintln!("MeshCore vanity key search");
    eprintln!("{}", "-".repeat(60));
    eprintln!("Mode:         {}", config.mode);
    eprintln!("Probability:  {}", format_probability(probability));
    if let Some(expected) = expected_attempts(probability) {
        eprintln!("Expected:     ~{} keys (50% chance)", group_thousands(expected));
    }
    eprintln!(
        "Workers:      {} (batch size {})",
        config.workers,
        group_thousands(config.batch_size)
    );
    if let Some(keys) = config.max_attempts {
        eprintln!("Key limit:    {}", group_thousands(keys));
    }
    if let Some(time) = config.max_time {
        eprintln!("Time limit:   {}", format_duration(time));
    }
    if !config.watchlist.is_empty() {
        eprintln!("Watchlist:    {} patterns", config.watchlist.len());
    }
    eprintln!(
        "Health:       {}",
        if config.health_check {
            "monitoring enabled"
        } else {
            "disabled"
        }
    );
    eprintln!(
        "System:       CPU {:.1}% of {} cores | RAM {:.1}/{:.1} GB ({:.1}%) | disk {:.1} GB free",
        status.cpu_usage_percent,
        status.logical_cores,
        status.memory_used_gb,
        status.memory_total_gb,
        status.memory_usage_percent,
        status.disk_free_gb
    );
    if status.memory_usage_percent > 90.0 {
        warn!(
            memory_usage_percent = status.memory_usage_percent,
            "host memory is nearly exhausted"
        );
    }
    eprintln!("{}", "-".repeat(60));
}

fn print_report(report: &SearchReport) {
    eprintln!("{}", "-".repeat(60));
    match &report.outcome {
        SearchOutcome::Found {
            key,
            worker_id,
            worker_attempts,
        } => {
            eprintln!(
                "Found a match on worker {} after {} of its attempts",
                worker_id,
                group_thousands(*worker_attempts)
            );
            println!("Public key:  {}", key.public_hex.to_ascii_uppercase());
            println!("Private key: {}", key.private_hex().to_ascii_uppercase());
            println!("Node ID:     {}", key.node_id());
            println!(
                "Pattern:     {}...{}",
                key.first_8().to_ascii_uppercase(),
                key.last_8().to_ascii_uppercase()
            );
            for path in &report.saved_to {
                eprintln!("Saved: {}", path.display());
            }
            if report.saved_to.is_empty() {
                eprintln!("Key was NOT saved to disk; copy it from the output above");
            }
        }
        SearchOutcome::Exhausted => {
            eprintln!("No match found within the configured limits");
        }
        SearchOutcome::Interrupted => {
            eprintln!("Search interrupted");
        }
    }

    eprintln!(
        "Checked {} keys in {} ({:.0} keys/s)",
        group_thousands(report.total_attempts),
        format_duration(report.elapsed),
        report.rate()
    );
    if report.prior_attempts > 0 {
        eprintln!(
            "Including earlier runs: {} keys",
            group_thousands(report.prior_attempts + report.total_attempts)
        );
    }
    if report.watchlist_hits > 0 {
        eprintln!("Watchlist hits: {}", report.watchlist_hits);
    }
    if report.restarts > 0 || report.retired_slots > 0 {
        eprintln!(
            "Worker restarts: {} | retired slots: {}",
            report.restarts, report.retired_slots
        );
    }
    if report.generator_faults > 0 {
        warn!(
            generator_faults = report.generator_faults,
            "keypairs discarded after failed verification"
        );
    }
    info!(outcome = report.outcome.label(), "search complete");
}

// ── Estimate ────────────────────────────────────────────────────

pub fn run_estimate(args: &ModeArgs, rate: Option<f64>) -> Result<()> {
    let mode = mode_from_args(args)?;
    SearchConfig::new(mode.clone()).validate()?;
    let probability = probability_of(&mode);

    eprintln!("Mode:         {}", mode);
    eprintln!("Probability:  {}", format_probability(probability));

    let rows = [
        ("50% chance", expected_attempts(probability)),
        ("90% chance", confident_attempts(probability)),
    ];
    for (label, attempts) in rows {
        let Some(attempts) = attempts else {
            continue;
        };
        match rate.filter(|r| *r > 0.0) {
            Some(r) => eprintln!(
                "{}:   ~{} keys (~{} at {:.0} keys/s)",
                label,
                group_thousands(attempts),
                Duration::try_from_secs_f64(attempts as f64 / r)
                    .map_or_else(|_| "unknown".to_string(), format_duration),
                r
            ),
            None => eprintln!("{}:   ~{} keys", label, group_thousands(attempts)),
        }
    }
    Ok(())
}

// ── Verify ──────────────────────────────────────────────────────

/// Fails (non-zero exit) when the private key does not derive the public key.
pub fn run_verify(private_hex: &str, public_hex: &str) -> Result<()> {
    if verify_hex(private_hex, public_hex)? {
        eprintln!("OK: private key derives {}", public_hex.trim().to_ascii_uppercase());
        Ok(())
    } else {
        bail!("private key does not derive the given public key")
    }
}

// ── Selftest ────────────────────────────────────────────────────

pub fn run_selftest(check: &SelftestCheck) -> Result<()> {
    match check {
        SelftestCheck::Compat => selftest_compat(),
        SelftestCheck::Distribution { millions } => {
            let samples = scale_sample_count(*millions, 1_000_000)?;
            let log_every = (samples / 10).clamp(10_000, 100_000);
            let histogram = node_id_histogram(&mut MeshcoreGenerator::new(), samples, log_every);
            print_histogram("first-two patterns", &histogram, 20);
            let mut rng = rand::rng();
            let seen = histogram.seen();
            if seen.len() > 10 {
                let mut sample: Vec<u8> = seen.choose_multiple(&mut rng, 10).copied().collect();
                sample.sort_unstable();
                let names: Vec<String> = sample.iter().map(|b| format!("{:02X}", b)).collect();
                eprintln!("Sample of found patterns: {}", names.join(", "));
            }
            Ok(())
        }
        SelftestCheck::Entropy { thousands } => {
            let samples = scale_sample_count(*thousands, 1_000)?;
            let report = entropy_check(&mut MeshcoreGenerator::new(), samples, 1_000);
            eprintln!("Keys generated:  {}", group_thousands(report.samples));
            eprintln!("Unique keys:     {}", group_thousands(report.unique));
            eprintln!("Repeated keys:   {}", report.repeated);
            eprintln!("Collision rate:  {:.6}%", report.collision_percent());
            eprintln!("Verdict:         {}", report.verdict());
            eprintln!("Most common first bytes:");
            for (byte, count) in report.first_byte.top(10) {
                eprintln!(
                    "  {:3} (0x{:02X}): {} ({:.3}%)",
                    byte,
                    byte,
                    group_thousands(count),
                    report.first_byte.share_percent(count)
                );
            }
            eprintln!(
                "Byte values seen: {}/{} (any position), {}/{} (second byte)",
                report.all_bytes.unique(),
                NODE_IDS,
                report.second_byte.unique(),
                NODE_IDS
            );
            Ok(())
        }
        SelftestCheck::NodeId { thousands } => {
            let samples = scale_sample_count(*thousands, 1_000)?;
            let histogram = node_id_histogram(&mut MeshcoreGenerator::new(), samples, 100);
            print_histogram("node IDs", &histogram, 10);
            Ok(())
        }
    }
}

fn selftest_compat() -> Result<()> {
    let report = check_compatibility(&mut MeshcoreGenerator::new())?;
    let verdict = |ok: bool| if ok { "PASS" } else { "FAIL" };

    eprintln!("Known public key:  {}", KNOWN_PUBLIC_HEX);
    eprintln!("Known private key: {}", KNOWN_PRIVATE_HEX);
    eprintln!(
        "Known key:         {} (clamped: {})",
        verdict(report.known_verifies),
        report.known_clamped
    );

    let private = report.generated.private_hex();
    eprintln!("Generated public:  {}", report.generated.public_hex);
    eprintln!("Clamped scalar:    {}", &private[..64]);
    eprintln!("Random filler:     {}", &private[64..]);
    eprintln!(
        "Generated key:     {} (clamped: {})",
        verdict(report.generated_verifies),
        report.generated_clamped
    );

    if !report.passed() {
        bail!("key generation is not MeshCore compatible");
    }
    Ok(())
}

fn print_histogram(what: &str, histogram: &ByteHistogram, top: usize) {
    eprintln!("Keys analysed:   {}", group_thousands(histogram.samples));
    eprintln!(
        "Unique {}: {} of {} ({:.1}% coverage)",
        what,
        histogram.unique(),
        NODE_IDS,
        histogram.coverage_percent()
    );
    eprintln!("Expected share:  1 in 256 = {:.3}%", 100.0 / NODE_IDS as f64);
    eprintln!("Most common:");
    for (rank, (byte, count)) in histogram.top(top).into_iter().enumerate() {
        eprintln!(
            "{:3}. {:02X}: {} ({:.3}%)",
            rank + 1,
            byte,
            group_thousands(count),
            histogram.share_percent(count)
        );
    }
}
