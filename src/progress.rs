//! # Progress — Atomic Run-Wide Counters
//!
//! Lock-free counters shared by every worker and read by the coordinator's
//! aggregate reporter. Workers flush their local trial counts at each poll
//! point, so the coordinator's view lags by at most one poll interval per
//! worker.
//!
//! The run-wide attempt budget (`--keys`) is enforced against `attempts`
//! rather than per worker, so N workers never overshoot it by N batches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Progress {
    pub attempts: AtomicU64,
    pub watchlist_hits: AtomicU64,
    /// Trials discarded because the generator failed its round-trip check.
    pub generator_faults: AtomicU64,
    start: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSnapshot {
    pub attempts: u64,
    pub watchlist_hits: u64,
    pub generator_faults: u64,
    pub elapsed: Duration,
    /// Attempts per second since the run started.
    pub rate: f64,
}

impl Progress {
    pub fn new() -> Arc<Self> {
        Arc::new(Progress {
            attempts: AtomicU64::new(0),
            watchlist_hits: AtomicU64::new(0),
            generator_faults: AtomicU64::new(0),
            start: Instant::now(),
        })
    }

    pub fn add_attempts(&self, n: u64) {
        if n > 0 {
            self.attempts.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// True once the shared counter has reached `max_attempts`.
    pub fn budget_exhausted(&self, max_attempts: Option<u64>) -> bool {
        max_attempts.is_some_and(|max| self.attempts() >= max)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let attempts = self.attempts();
        let elapsed = self.start.elapsed();
        let secs = elapsed.as_secs_f64();
        ProgressSnapshot {
            attempts,
            watchlist_hits: self.watchlist_hits.load(Ordering::Relaxed),
            generator_faults: self.generator_faults.load(Ordering::Relaxed),
            elapsed,
            rate: if secs > 0.0 { attempts as f64 / secs } else { 0.0 },
        }
    }
}
