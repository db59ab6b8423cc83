//! Shared test helpers for integration tests.
//!
//! Deterministic [`KeypairGenerator`] stubs emit public keys chosen so the
//! tests know exactly which trial matches what; a [`RecordingSink`] captures
//! what the coordinator and workers try to persist.

#![allow(dead_code)]

use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use meshvanity::config::{MatchMode, SearchConfig, VanityWidth};
use meshvanity::keygen::{CandidateKey, GeneratorFactory, Keypair, KeypairGenerator};
use meshvanity::pattern::WatchlistPattern;
use meshvanity::persist::KeySink;

/// Never matches vanity-N, `Prefix("ffffffff")` or the `AA...AAAA` watchlist entry.
pub fn filler_hex(worker: usize, n: u64) -> String {
    format!("0123{:04x}{:052x}cdef", worker, n)
}

/// Vanity-4 match unique to `worker`.
pub fn vanity4_hex(worker: usize) -> String {
    format!("abcd{:056x}abcd", worker)
}

/// Starts `aa` and ends `aaaa`: hits the `AA...AAAA` watchlist entry and
/// never `Prefix("ffffffff")`.
pub fn watchlist_hex(worker: usize) -> String {
    format!("aa{:058x}aaaa", worker)
}

fn keypair(public_hex: &str, valid: bool) -> Keypair {
    let mut public = [0u8; 32];
    hex::decode_to_slice(public_hex, &mut public).expect("stub hex must be 64 chars");
    let mut private = [0u8; 64];
    private[..32].copy_from_slice(&public);
    private[63] = u8::from(valid);
    Keypair { public, private }
}

/// Verification passes unless the stub marked the keypair invalid.
fn stub_verify(keypair: &Keypair) -> bool {
    keypair.private[63] == 1 && keypair.private[..32] == keypair.public
}

// ── Scripted Generator ──────────────────────────────────────────

/// Fillers, except for scripted trials (1-based) that return special keys.
pub struct ScriptedGenerator {
    worker: usize,
    calls: u64,
    match_at: Option<u64>,
    watchlist_at: Option<u64>,
    /// Every Nth trial fails verification.
    invalid_every: Option<u64>,
}

impl ScriptedGenerator {
    pub fn new(worker: usize) -> Self {
        ScriptedGenerator {
            worker,
            calls: 0,
            match_at: None,
            watchlist_at: None,
            invalid_every: None,
        }
    }

    pub fn matching_at(mut self, trial: u64) -> Self {
        self.match_at = Some(trial);
        self
    }

    pub fn watchlist_at(mut self, trial: u64) -> Self {
        self.watchlist_at = Some(trial);
        self
    }

    pub fn invalid_every(mut self, n: u64) -> Self {
        self.invalid_every = Some(n);
        self
    }
}

impl KeypairGenerator for ScriptedGenerator {
    fn generate(&mut self) -> Keypair {
        self.calls += 1;
        let n = self.calls;
        if self.invalid_every.is_some_and(|every| n % every == 0) {
            return keypair(&filler_hex(self.worker, n), false);
        }
        if self.match_at == Some(n) {
            return keypair(&vanity4_hex(self.worker), true);
        }
        if self.watchlist_at == Some(n) {
            return keypair(&watchlist_hex(self.worker), true);
        }
        keypair(&filler_hex(self.worker, n), true)
    }

    fn verify(&self, keypair: &Keypair) -> bool {
        stub_verify(keypair)
    }
}

// ── Failure Generators ──────────────────────────────────────────

/// Fast for `fast_calls` trials, then sleeps `delay` per trial.
pub struct SlowingGenerator {
    inner: ScriptedGenerator,
    fast_calls: u64,
    delay: Duration,
}

impl SlowingGenerator {
    pub fn new(worker: usize, fast_calls: u64, delay: Duration) -> Self {
        SlowingGenerator {
            inner: ScriptedGenerator::new(worker),
            fast_calls,
            delay,
        }
    }
}

impl KeypairGenerator for SlowingGenerator {
    fn generate(&mut self) -> Keypair {
        if self.inner.calls >= self.fast_calls {
            std::thread::sleep(self.delay);
        }
        self.inner.generate()
    }

    fn verify(&self, keypair: &Keypair) -> bool {
        stub_verify(keypair)
    }
}

/// Panics on trial `panic_at`.
pub struct PanickingGenerator {
    inner: ScriptedGenerator,
    panic_at: u64,
}

impl PanickingGenerator {
    pub fn new(worker: usize, panic_at: u64) -> Self {
        PanickingGenerator {
            inner: ScriptedGenerator::new(worker),
            panic_at,
        }
    }
}

impl KeypairGenerator for PanickingGenerator {
    fn generate(&mut self) -> Keypair {
        if self.inner.calls + 1 >= self.panic_at {
            panic!("generator exploded on trial {}", self.panic_at);
        }
        self.inner.generate()
    }

    fn verify(&self, keypair: &Keypair) -> bool {
        stub_verify(keypair)
    }
}

/// Wraps a closure building one stub per worker id.
pub fn factory<G, F>(build: F) -> GeneratorFactory
where
    G: KeypairGenerator + 'static,
    F: Fn(usize) -> G + Send + Sync + 'static,
{
    Arc::new(move |id: usize| -> Box<dyn KeypairGenerator> { Box::new(build(id)) })
}

// ── Recording Sink ──────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub matches: Mutex<Vec<String>>,
    /// `(pattern, public_hex)` per watchlist hit.
    pub watchlist: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn match_count(&self) -> usize {
        self.matches.lock().unwrap().len()
    }

    pub fn watchlist_hits(&self) -> Vec<(String, String)> {
        self.watchlist.lock().unwrap().clone()
    }
}

impl KeySink for RecordingSink {
    fn store_match(&self, key: &CandidateKey) -> Result<Vec<PathBuf>> {
        self.matches.lock().unwrap().push(key.public_hex.clone());
        Ok(vec![PathBuf::from(format!("meshcore_{}_public.txt", key.key_id()))])
    }

    fn store_watchlist(
        &self,
        key: &CandidateKey,
        pattern: &WatchlistPattern,
    ) -> Result<Vec<PathBuf>> {
        self.watchlist
            .lock()
            .unwrap()
            .push((pattern.to_string(), key.public_hex.clone()));
        Ok(Vec::new())
    }
}

// ── Configs ─────────────────────────────────────────────────────

/// Vanity-4 search with small batches and no health supervision.
pub fn vanity4_config(workers: usize) -> SearchConfig {
    SearchConfig::new(MatchMode::Vanity {
        width: VanityWidth::Four,
    })
    .with_workers(workers)
    .with_batch_size(1000)
    .with_poll_interval(100)
    .with_health_check(false)
}

/// A target no stub ever produces.
pub fn unreachable_config(workers: usize) -> SearchConfig {
    SearchConfig::new(MatchMode::Prefix {
        prefix: "ffffffff".into(),
    })
    .with_workers(workers)
    .with_batch_size(1000)
    .with_poll_interval(100)
    .with_health_check(false)
}

pub fn watchlist_entry() -> WatchlistPattern {
    WatchlistPattern::from_string("AA...AAAA", "test entry").unwrap()
}
