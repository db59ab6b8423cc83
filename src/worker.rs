//! # Worker — Batch Search Loop
//!
//! A worker runs fixed-size batches until something stops it. Per trial it:
//!
//! 1. draws a keypair from its own [`KeypairGenerator`],
//! 2. discards it if the private half does not re-derive the public half,
//! 3. saves and reports any watchlist hits (the search continues),
//! 4. on a primary-target hit, re-verifies and publishes the key to the
//!    shared found slot, which also raises the termination flag.
//!
//! Every `poll_interval` trials it flushes its count into the shared
//! [`Progress`], then re-checks the termination flag, the wall-clock deadline
//! and the run-wide attempt budget. Nothing finer than that is synchronized.
//!
//! ## States
//!
//! ```text
//! Running ──► Completed      attempt budget reached
//!         ├─► Stopped(..)    flag raised, deadline passed, or user interrupt
//!         ├─► Degraded       N consecutive unhealthy batches
//!         └─► MatchFound     this worker won the found slot
//! ```
//!
//! A panic inside the loop is caught by the coordinator and becomes `Faulted`.

use crossbeam_channel::Sender;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::coordinator::SharedState;
use crate::events::{Event, EventSink};
use crate::health::HealthMonitor;
use crate::keygen::{CandidateKey, KeypairGenerator};
use crate::pattern::{matches_target, matches_watchlist};
use crate::persist::KeySink;
use crate::probability::probability_of;
use crate::progress::Progress;
use crate::tracker::PerformanceTracker;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Another worker found the key.
    Terminated,
    TimeLimit,
    Interrupted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Completed,
    Stopped(StopReason),
    Degraded,
    MatchFound,
    Faulted(String),
}

/// One report from a worker. Non-final reports (`state == Running`) are sent
/// after every full batch; exactly one final report ends each worker.
#[derive(Clone, Debug)]
pub struct BatchResult {
    pub worker_id: usize,
    /// Attempts in this reporting unit (the batch, or the partial batch at exit).
    pub attempts: u64,
    /// Attempts over this worker's whole life.
    pub total_attempts: u64,
    pub found_key: Option<CandidateKey>,
    /// True when the batch ran its full size.
    pub completed: bool,
    pub state: WorkerState,
}

impl BatchResult {
    pub fn is_final(&self) -> bool {
        self.state != WorkerState::Running
    }

    pub fn faulted(worker_id: usize, message: String) -> Self {
        BatchResult {
            worker_id,
            attempts: 0,
            total_attempts: 0,
            found_key: None,
            completed: false,
            state: WorkerState::Faulted(message),
        }
    }
}

/// Everything a worker shares with the coordinator and its siblings.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<SearchConfig>,
    pub shared: Arc<SharedState>,
    pub progress: Arc<Progress>,
    pub sink: Arc<dyn KeySink>,
    pub events: Arc<dyn EventSink>,
    pub results: Sender<BatchResult>,
    pub deadline: Option<Instant>,
}

enum BatchEnd {
    Full,
    Found(CandidateKey),
    Stopped(StopReason),
    Budget,
}

struct BatchRun {
    end: BatchEnd,
    attempts: u64,
    elapsed: Duration,
}

pub struct Worker {
    id: usize,
    ctx: WorkerContext,
    generator: Box<dyn KeypairGenerator>,
    tracker: PerformanceTracker,
    health: Option<HealthMonitor>,
    total: u64,
    last_sample: (u64, Instant),
}

impl Worker {
    pub fn new(id: usize, ctx: WorkerContext, generator: Box<dyn KeypairGenerator>) -> Self {
        let tracker = PerformanceTracker::new(Some(probability_of(&ctx.config.mode)))
            .with_report_interval(ctx.config.report_interval);
        let health = ctx
            .config
            .health_check
            .then(|| HealthMonitor::new(Some(id)));
        Worker {
            id,
            ctx,
            generator,
            tracker,
            health,
            total: 0,
            last_sample: (0, Instant::now()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    fn stop_reason(&self) -> Option<StopReason> {
        if let Some(reason) = self.ctx.shared.stop_reason() {
            return Some(reason);
        }
        match self.ctx.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StopReason::TimeLimit),
            _ => None,
        }
    }

    fn budget_reached(&self) -> bool {
        self.ctx
            .progress
            .budget_exhausted(self.ctx.config.max_attempts)
    }

    /// Runs until a final state; returns the final report.
    pub fn run(mut self) -> BatchResult {
        debug!(worker = self.id, "worker started");
        let mut batch_no = 0u64;
        let mut slow_batches = 0u32;

        loop {
            if let Some(reason) = self.stop_reason() {
                return self.finish(0, None, WorkerState::Stopped(reason));
            }
            if self.budget_reached() {
                return self.finish(0, None, WorkerState::Completed);
            }

            let batch = self.run_batch();
            self.total += batch.attempts;
            match batch.end {
                BatchEnd::Found(key) => {
                    return if self.ctx.shared.publish_found(self.id, key.clone()) {
                        self.finish(batch.attempts, Some(key), WorkerState::MatchFound)
                    } else {
                        self.finish(
                            batch.attempts,
                            None,
                            WorkerState::Stopped(StopReason::Terminated),
                        )
                    };
                }
                BatchEnd::Stopped(reason) => {
                    return self.finish(batch.attempts, None, WorkerState::Stopped(reason));
                }
                BatchEnd::Budget => {
                    return self.finish(batch.attempts, None, WorkerState::Completed);
                }
                BatchEnd::Full => {}
            }

            batch_no += 1;
            let secs = batch.elapsed.as_secs_f64();
            let rate = if secs > 0.0 {
                batch.attempts as f64 / secs
            } else {
                0.0
            };
            if self.ctx.config.verbose {
                self.ctx.events.emit(Event::BatchCompleted {
                    worker_id: self.id,
                    batch: batch_no,
                    attempts: batch.attempts,
                    rate,
                });
            }
            let _ = self.ctx.results.send(BatchResult {
                worker_id: self.id,
                attempts: batch.attempts,
                total_attempts: self.total,
                found_key: None,
                completed: true,
                state: WorkerState::Running,
            });

            if self.batch_unhealthy(batch.attempts, batch.elapsed) {
                slow_batches += 1;
                if slow_batches >= self.ctx.config.max_slow_batches {
                    warn!(worker = self.id, slow_batches, "worker degraded");
                    return self.finish(0, None, WorkerState::Degraded);
                }
            } else {
                slow_batches = 0;
            }
        }
    }

    fn batch_unhealthy(&mut self, attempts: u64, elapsed: Duration) -> bool {
        let Some(health) = self.health.as_mut() else {
            return false;
        };
        let status = health.check(attempts, elapsed);
        if status.healthy {
            return false;
        }
        self.ctx.events.emit(Event::HealthReport {
            worker_id: Some(self.id),
            healthy: false,
            performance_ratio: status.performance_ratio,
            memory_mb: status.memory_usage as f64 / 1_048_576.0,
            warnings: status.warnings,
            actions_taken: status.actions_taken,
        });
        true
    }

    fn run_batch(&mut self) -> BatchRun {
        let started = Instant::now();
        let poll = self.ctx.config.poll_interval;
        let mut attempts = 0u64;
        let mut unflushed = 0u64;

        let end = 'batch: {
            for i in 0..self.ctx.config.batch_size {
                if i > 0 && i % poll == 0 {
                    self.ctx.progress.add_attempts(unflushed);
                    unflushed = 0;
                    if let Some(reason) = self.stop_reason() {
                        break 'batch BatchEnd::Stopped(reason);
                    }
                    if self.budget_reached() {
                        break 'batch BatchEnd::Budget;
                    }
                    self.maybe_report(self.total + attempts);
                }

                let keypair = self.generator.generate();
                if !self.generator.verify(&keypair) {
                    self.ctx
                        .progress
                        .generator_faults
                        .fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                attempts += 1;
                unflushed += 1;

                let key = CandidateKey::new(keypair);
                if !self.ctx.config.watchlist.is_empty() {
                    self.report_watchlist(&key);
                }
                if matches_target(&key.public_hex, &self.ctx.config.mode) {
                    if self.generator.verify(&key.keypair) {
                        break 'batch BatchEnd::Found(key);
                    }
                    self.ctx
                        .progress
                        .generator_faults
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
            BatchEnd::Full
        };

        self.ctx.progress.add_attempts(unflushed);
        BatchRun {
            end,
            attempts,
            elapsed: started.elapsed(),
        }
    }

    fn report_watchlist(&self, key: &CandidateKey) {
        for pattern in matches_watchlist(&key.public_hex, &self.ctx.config.watchlist) {
            self.ctx
                .progress
                .watchlist_hits
                .fetch_add(1, Ordering::Relaxed);
            let saved_to = match self.ctx.sink.store_watchlist(key, pattern) {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(worker = self.id, %pattern, error = %e, "failed to save watchlist key");
                    Vec::new()
                }
            };
            self.ctx.events.emit(Event::WatchlistHit {
                worker_id: self.id,
                pattern: pattern.to_string(),
                description: pattern.description.clone(),
                public_key: key.public_hex.clone(),
                saved_to,
            });
        }
    }

    /// Samples the interval rate and, in verbose mode, emits a worker report.
    fn maybe_report(&mut self, attempts: u64) {
        if !self.tracker.should_report_now(attempts) {
            return;
        }
        let (prev_attempts, prev_at) = self.last_sample;
        let secs = prev_at.elapsed().as_secs_f64();
        let rate = if secs > 0.0 {
            (attempts - prev_attempts) as f64 / secs
        } else {
            0.0
        };
        self.tracker.record_sample(attempts, rate);
        self.last_sample = (attempts, Instant::now());

        if self.ctx.config.verbose {
            let (degraded, ratio) = self.tracker.degraded();
            if degraded {
                warn!(
                    worker = self.id,
                    ratio = format_args!("{:.2}", ratio),
                    "worker throughput degrading"
                );
            }
            self.ctx.events.emit(Event::WorkerProgress {
                worker_id: self.id,
                attempts,
                rate,
                eta: self.tracker.estimate_eta(attempts, rate).to_string(),
            });
        }
    }

    fn finish(
        &self,
        attempts: u64,
        found_key: Option<CandidateKey>,
        state: WorkerState,
    ) -> BatchResult {
        debug!(
            worker = self.id,
            total_attempts = self.total,
            state = ?state,
            "worker finished"
        );
        BatchResult {
            worker_id: self.id,
            attempts,
            total_attempts: self.total,
            found_key,
            completed: false,
            state,
        }
    }
}
