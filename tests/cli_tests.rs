//! CLI integration tests using assert_cmd.
//!
//! Argument validation runs without touching the filesystem. The search tests
//! run a real (easy) vanity-2 search inside a temporary directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

use meshvanity::keygen::{CandidateKey, KeypairGenerator, MeshcoreGenerator};

#[allow(deprecated)]
fn meshvanity() -> Command {
    let mut cmd = Command::cargo_bin("meshvanity").unwrap();
    cmd.env_remove("MESHVANITY_THREADS")
        .env_remove("MESHVANITY_OUTPUT_DIR")
        .env_remove("RUST_LOG")
        .env_remove("LOG_FORMAT");
    cmd
}

fn sample_key(seed: u64) -> CandidateKey {
    CandidateKey::new(MeshcoreGenerator::from_seed(seed).generate())
}

// --- Help and arg validation ---

#[test]
fn help_shows_all_subcommands() {
    meshvanity().arg("--help").assert().success().stdout(
        predicate::str::contains("search")
            .and(predicate::str::contains("estimate"))
            .and(predicate::str::contains("verify"))
            .and(predicate::str::contains("selftest")),
    );
}

#[test]
fn help_search_shows_mode_flags() {
    meshvanity()
        .args(["search", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--first-two")
                .and(predicate::str::contains("--prefix-vanity"))
                .and(predicate::str::contains("--vanity-6"))
                .and(predicate::str::contains("--keys"))
                .and(predicate::str::contains("--watchlist"))
                .and(predicate::str::contains("--output-dir")),
        );
}

#[test]
fn unknown_subcommand_fails() {
    meshvanity()
        .arg("nonexistent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn conflicting_modes_fail() {
    meshvanity()
        .args(["search", "--vanity-4", "--prefix", "F8"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn simple_requires_first_two() {
    meshvanity()
        .args(["search", "--simple"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--first-two"));
}

#[test]
fn keys_and_time_are_exclusive() {
    meshvanity()
        .args(["search", "--keys", "10", "--time", "1"])
        .assert()
        .failure();
}

#[test]
fn out_of_range_limits_fail() {
    meshvanity()
        .args(["search", "--keys", "0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("minimum key count"));
    meshvanity()
        .args(["search", "--batch-size", "50"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("minimum batch size"));
}

#[test]
fn bad_prefix_fails_before_searching() {
    meshvanity()
        .args(["search", "--prefix", "XYZ"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hex"));
}

// --- Estimate ---

#[test]
fn estimate_prints_odds() {
    meshvanity()
        .args(["estimate", "--vanity-2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("1 in 128").and(predicate::str::contains("50% chance")));
}

#[test]
fn estimate_with_rate_prints_times() {
    meshvanity()
        .args(["estimate", "--prefix", "ABCD", "--rate", "1000"])
        .assert()
        .success()
        .stderr(predicate::str::contains("keys/s"));
}

#[test]
fn estimate_with_tiny_rate_reports_unknown_time() {
    meshvanity()
        .args(["estimate", "--vanity-8", "--rate", "1e-300"])
        .assert()
        .success()
        .stderr(predicate::str::contains("unknown"));
}

// --- Verify ---

#[test]
fn verify_accepts_matching_pair() {
    let key = sample_key(9);
    meshvanity()
        .args([
            "verify",
            "--private",
            &key.private_hex(),
            "--public",
            &key.public_hex,
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("OK"));
}

#[test]
fn verify_rejects_mismatched_pair() {
    let key = sample_key(9);
    let other = sample_key(10);
    meshvanity()
        .args([
            "verify",
            "--private",
            &key.private_hex(),
            "--public",
            &other.public_hex,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not derive"));
}

#[test]
fn verify_rejects_malformed_hex() {
    meshvanity()
        .args(["verify", "--private", "abc", "--public", "def"])
        .assert()
        .failure();
}

// --- Selftest ---

#[test]
fn selftest_compat_passes() {
    meshvanity()
        .args(["selftest", "compat"])
        .assert()
        .success()
        .stderr(
            predicate::str::contains("d86fff61471b086d87d895ed10c86e67a6cd5bfef551f6a81f33a54f9bc0c219")
                .and(predicate::str::contains("Known key:         PASS"))
                .and(predicate::str::contains("Generated key:     PASS")),
        );
}

#[test]
fn selftest_entropy_reports_no_collisions() {
    meshvanity()
        .args(["selftest", "entropy", "--thousands", "0.5"])
        .assert()
        .success()
        .stderr(
            predicate::str::contains("Unique keys:     500")
                .and(predicate::str::contains("Repeated keys:   0")),
        );
}

#[test]
fn selftest_node_id_reports_coverage() {
    meshvanity()
        .args(["selftest", "node-id", "--thousands", "0.2"])
        .assert()
        .success()
        .stderr(
            predicate::str::contains("Keys analysed:   200")
                .and(predicate::str::contains("Unique node IDs")),
        );
}

#[test]
fn selftest_distribution_rejects_empty_sample() {
    meshvanity()
        .args(["selftest", "distribution", "--millions", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one key"));
}

// --- Search ---

#[test]
fn vanity_2_search_writes_key_files() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("keys");
    let output = meshvanity()
        .current_dir(dir.path())
        .args(["--threads", "1", "search", "--vanity-2", "--keys", "1", "--output-dir"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Public key:"))
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    let public = stdout
        .lines()
        .find_map(|l| l.strip_prefix("Public key:"))
        .unwrap()
        .trim()
        .to_ascii_lowercase();
    let private = stdout
        .lines()
        .find_map(|l| l.strip_prefix("Private key:"))
        .unwrap()
        .trim()
        .to_ascii_lowercase();
    assert!(meshvanity::pattern::vanity_match(
        &public,
        meshvanity::config::VanityWidth::Two
    ));
    assert!(meshvanity::keygen::verify_hex(&private, &public).unwrap());

    let id = public[..8].to_ascii_uppercase();
    let saved = fs::read_to_string(out.join(format!("meshcore_{}_public.txt", id))).unwrap();
    assert_eq!(saved.trim().to_ascii_lowercase(), public);
    assert!(out.join(format!("meshcore_{}_private.txt", id)).exists());
}

#[test]
fn json_search_writes_single_file() {
    let dir = tempfile::tempdir().unwrap();
    meshvanity()
        .current_dir(dir.path())
        .args([
            "--threads",
            "2",
            "search",
            "--vanity-2",
            "--keys",
            "1",
            "--json",
            "--no-health-check",
            "--output-dir",
            ".",
        ])
        .assert()
        .success();

    let json_files: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("meshcore_") && name.ends_with(".json"))
        .collect();
    assert_eq!(json_files.len(), 1);

    let raw = fs::read_to_string(dir.path().join(&json_files[0])).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let public = value["public_key"].as_str().unwrap();
    let private = value["private_key"].as_str().unwrap();
    assert!(meshvanity::keygen::verify_hex(private, public).unwrap());
}
