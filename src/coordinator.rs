//! # Coordinator — Worker Pool Supervision
//!
//! Owns the worker pool and is the run's top-level control loop:
//!
//! 1. Launch one worker per slot on a dedicated rayon pool.
//! 2. Wait on the result channel for whichever worker reports first.
//! 3. A found key ends the run: the flag is already raised, so give the other
//!    workers a short grace period, persist the key once, and return.
//! 4. A degraded worker is replaced under the same slot id while the slot has
//!    restart budget; otherwise (and for stopped, completed or faulted workers)
//!    the slot is retired.
//! 5. With no active slots left the run ends as exhausted, or interrupted if
//!    the user cancelled.
//!
//! Between results, `recv_timeout` wakes the loop every progress interval to
//! publish one aggregate progress event (non-verbose mode) and save the
//! checkpoint.
//!
//! ## Shared State
//!
//! [`SharedState`] is the only mutable state visible across workers: a
//! termination flag, a cancellation flag and a first-writer-wins found slot
//! (`OnceLock`). Workers poll the flags; nothing is pre-empted.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::checkpoint::{self, RunCheckpoint};
use crate::config::SearchConfig;
use crate::events::{Event, EventSink};
use crate::health::HealthMonitor;
use crate::keygen::{CandidateKey, GeneratorFactory};
use crate::persist::KeySink;
use crate::probability::probability_of;
use crate::progress::Progress;
use crate::tracker::PerformanceTracker;
use crate::worker::{BatchResult, StopReason, Worker, WorkerContext, WorkerState};

#[derive(Default)]
pub struct SharedState {
    terminate: AtomicBool,
    cancelled: AtomicBool,
    found: OnceLock<(usize, CandidateKey)>,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claims the found slot. Returns false if another worker got there first;
    /// the flag is raised either way.
    pub fn publish_found(&self, worker_id: usize, key: CandidateKey) -> bool {
        let won = self.found.set((worker_id, key)).is_ok();
        self.terminate.store(true, Ordering::SeqCst);
        won
    }

    pub fn found(&self) -> Option<&(usize, CandidateKey)> {
        self.found.get()
    }

    pub fn request_stop(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            Some(StopReason::Interrupted)
        } else if self.terminate.load(Ordering::Relaxed) {
            Some(StopReason::Terminated)
        } else {
            None
        }
    }
}

/// Lets a signal handler or another thread interrupt a running search.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<SharedState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}

#[derive(Clone, Debug)]
pub enum SearchOutcome {
    Found {
        key: CandidateKey,
        worker_id: usize,
        /// Attempts the winning worker spent, including the match.
        worker_attempts: u64,
    },
    Exhausted,
    Interrupted,
}

impl SearchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SearchOutcome::Found { .. } => "found",
            SearchOutcome::Exhausted => "exhausted",
            SearchOutcome::Interrupted => "interrupted",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    /// Attempts in this run across all workers.
    pub total_attempts: u64,
    /// Attempts carried in from a checkpoint.
    pub prior_attempts: u64,
    pub elapsed: Duration,
    pub watchlist_hits: u64,
    pub generator_faults: u64,
    pub restarts: u32,
    pub retired_slots: usize,
    pub saved_to: Vec<PathBuf>,
}

impl SearchReport {
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_attempts as f64 / secs
        } else {
            0.0
        }
    }
}

/// Supervisor bookkeeping for one worker slot.
#[derive(Clone, Debug)]
struct Slot {
    restarts: u32,
    active: bool,
    /// Lifetime attempts of the slot's current worker, as last reported.
    attempts: u64,
}

pub struct SearchCoordinator {
    config: Arc<SearchConfig>,
    factory: GeneratorFactory,
    sink: Arc<dyn KeySink>,
    events: Arc<dyn EventSink>,
    shared: Arc<SharedState>,
    checkpoint_path: Option<PathBuf>,
}

impl SearchCoordinator {
    /// Validates `config`; configuration faults surface here, before any worker starts.
    pub fn new(
        config: SearchConfig,
        factory: GeneratorFactory,
        sink: Arc<dyn KeySink>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(SearchCoordinator {
            config: Arc::new(config),
            factory,
            sink,
            events,
            shared: SharedState::new(),
            checkpoint_path: None,
        })
    }

    pub fn with_checkpoint(mut self, path: Option<PathBuf>) -> Self {
        self.checkpoint_path = path;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn spawn(&self, pool: &rayon::ThreadPool, id: usize, ctx: &WorkerContext) {
        let worker = Worker::new(id, ctx.clone(), (self.factory)(id));
        let results = ctx.results.clone();
        pool.spawn(move || {
            let report = catch_unwind(AssertUnwindSafe(move || worker.run()))
                .unwrap_or_else(|panic| BatchResult::faulted(id, panic_message(&*panic)));
            let _ = results.send(report);
        });
    }

    pub fn run(&self) -> Result<SearchReport> {
        let config = &self.config;
        let start = Instant::now();
        let progress = Progress::new();
        let probability = probability_of(&config.mode);
        let label = config.mode.label();

        let prior = self
            .checkpoint_path
            .as_deref()
            .and_then(|p| checkpoint::load_for(p, &label))
            .unwrap_or_else(|| RunCheckpoint::new(label.clone()));
        if prior.attempts > 0 {
            info!(
                prior_attempts = prior.attempts,
                prior_runs = prior.runs,
                "resuming search statistics from checkpoint"
            );
        }
        let mut tracker = PerformanceTracker::new(Some(probability))
            .with_prior_attempts(prior.attempts);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("vanity-worker-{}", i))
            .build()
            .context("building worker pool")?;
        let (tx, rx) = unbounded();
        let ctx = WorkerContext {
            config: Arc::clone(config),
            shared: Arc::clone(&self.shared),
            progress: Arc::clone(&progress),
            sink: Arc::clone(&self.sink),
            events: Arc::clone(&self.events),
            results: tx,
            deadline: config.max_time.map(|d| start + d),
        };

        let mut slots = vec![
            Slot {
                restarts: 0,
                active: true,
                attempts: 0,
            };
            config.workers
        ];
        for id in 0..config.workers {
            self.spawn(&pool, id, &ctx);
        }
        self.events.emit(Event::SearchStarted {
            mode: label.clone(),
            workers: config.workers,
            batch_size: config.batch_size,
            probability,
            watchlist_patterns: config.watchlist.len(),
        });

        let mut global_health = config.health_check.then(|| HealthMonitor::new(None));
        let mut last_tick = Instant::now();
        let mut tick_attempts = 0u64;
        let mut restarts = 0u32;
        let mut retired = 0usize;

        let outcome = loop {
            if self.shared.is_cancelled() {
                self.drain(&rx, &mut slots);
                break match self.shared.found() {
                    Some((worker_id, key)) => SearchOutcome::Found {
                        key: key.clone(),
                        worker_id: *worker_id,
                        worker_attempts: slots.get(*worker_id).map_or(0, |s| s.attempts),
                    },
                    None => SearchOutcome::Interrupted,
                };
            }
            if slots.iter().all(|s| !s.active) {
                break SearchOutcome::Exhausted;
            }

            let wait = config.progress_interval.saturating_sub(last_tick.elapsed());
            match rx.recv_timeout(wait) {
                Ok(result) => {
                    let id = result.worker_id;
                    if let Some(slot) = slots.get_mut(id) {
                        slot.attempts = result.total_attempts;
                    }
                    match result.state {
                        WorkerState::Running => {}
                        WorkerState::MatchFound => {
                            if let Some(slot) = slots.get_mut(id) {
                                slot.active = false;
                            }
                            self.drain(&rx, &mut slots);
                            match self.shared.found() {
                                Some((worker_id, key)) => {
                                    break SearchOutcome::Found {
                                        key: key.clone(),
                                        worker_id: *worker_id,
                                        worker_attempts: result.total_attempts,
                                    };
                                }
                                None => {
                                    error!(worker = id, "match reported without a published key");
                                }
                            }
                        }
                        WorkerState::Degraded => {
                            let Some(slot) = slots.get_mut(id) else {
                                continue;
                            };
                            if slot.restarts < config.max_restarts && self.shared.stop_reason().is_none()
                            {
                                slot.restarts += 1;
                                slot.attempts = 0;
                                restarts += 1;
                                self.events.emit(Event::WorkerRestarted {
                                    worker_id: id,
                                    restarts: slot.restarts,
                                    reason: "throughput degraded".into(),
                                });
                                self.spawn(&pool, id, &ctx);
                            } else {
                                slot.active = false;
                                retired += 1;
                                self.events.emit(Event::WorkerRetired {
                                    worker_id: id,
                                    reason: format!(
                                        "degraded after {} restarts",
                                        slot.restarts
                                    ),
                                });
                            }
                        }
                        WorkerState::Faulted(message) => {
                            if let Some(slot) = slots.get_mut(id) {
                                slot.active = false;
                            }
                            retired += 1;
                            self.events.emit(Event::WorkerRetired {
                                worker_id: id,
                                reason: format!("worker fault: {}", message),
                            });
                        }
                        WorkerState::Completed | WorkerState::Stopped(_) => {
                            debug!(worker = id, state = ?result.state, "worker slot finished");
                            if let Some(slot) = slots.get_mut(id) {
                                slot.active = false;
                            }
                        }
                    }
                }
                // `ctx` owns a sender for restarts, so the channel never disconnects
                // here; the loop ends once every slot is inactive.
                Err(_) => {}
            }

            if last_tick.elapsed() >= config.progress_interval {
                let snap = progress.snapshot();
                let interval = last_tick.elapsed();
                let interval_attempts = snap.attempts - tick_attempts;
                tick_attempts = snap.attempts;
                last_tick = Instant::now();

                let interval_rate = interval_attempts as f64 / interval.as_secs_f64().max(1e-9);
                tracker.record_sample(snap.attempts, interval_rate);
                if !config.verbose {
                    self.events.emit(Event::Progress {
                        attempts: snap.attempts,
                        rate: snap.rate,
                        eta: tracker.estimate_eta(snap.attempts, snap.rate).to_string(),
                        elapsed_secs: snap.elapsed.as_secs_f64(),
                        active_workers: slots.iter().filter(|s| s.active).count(),
                    });
                }
                if let Some(health) = global_health.as_mut() {
                    let status = health.check(interval_attempts, interval);
                    if !status.healthy {
                        self.events.emit(Event::HealthReport {
                            worker_id: None,
                            healthy: false,
                            performance_ratio: status.performance_ratio,
                            memory_mb: status.memory_usage as f64 / 1_048_576.0,
                            warnings: status.warnings,
                            actions_taken: status.actions_taken,
                        });
                    }
                }
                self.save_checkpoint(&prior, &progress);
            }
        };

        // Stops any worker still running after an exhausted or interrupted run.
        self.shared.request_stop();

        let mut saved_to = Vec::new();
        if let SearchOutcome::Found { key, worker_id, .. } = &outcome {
            self.events.emit(Event::KeyFound {
                worker_id: *worker_id,
                public_key: key.public_hex.clone(),
                attempts: progress.attempts(),
            });
            match self.sink.store_match(key) {
                Ok(paths) => saved_to = paths,
                Err(e) => error!(error = %e, public_key = %key.public_hex, "failed to save matched key"),
            }
            if let Some(path) = &self.checkpoint_path {
                checkpoint::clear(path);
            }
        } else {
            self.save_checkpoint(&prior, &progress);
        }

        let snap = progress.snapshot();
        let elapsed = start.elapsed();
        self.events.emit(Event::SearchFinished {
            outcome: outcome.label().to_string(),
            attempts: snap.attempts,
            elapsed_secs: elapsed.as_secs_f64(),
        });
        Ok(SearchReport {
            outcome,
            total_attempts: snap.attempts,
            prior_attempts: prior.attempts,
            elapsed,
            watchlist_hits: snap.watchlist_hits,
            generator_faults: snap.generator_faults,
            restarts,
            retired_slots: retired,
            saved_to,
        })
    }

    /// Collects final reports for up to the grace period after a stop.
    fn drain(&self, rx: &Receiver<BatchResult>, slots: &mut [Slot]) {
        let deadline = Instant::now() + self.config.grace_period;
        while slots.iter().any(|s| s.active) {
            let wait = deadline.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                break;
            }
            match rx.recv_timeout(wait) {
                Ok(result) => {
                    if let Some(slot) = slots.get_mut(result.worker_id) {
                        slot.attempts = result.total_attempts;
                        if result.is_final() {
                            slot.active = false;
                        }
                    }
                }
                Err(_) => break,
            }
        }
        let still_running = slots.iter().filter(|s| s.active).count();
        if still_running > 0 {
            warn!(still_running, "workers still running after grace period");
        }
    }

    fn save_checkpoint(&self, prior: &RunCheckpoint, progress: &Progress) {
        let Some(path) = &self.checkpoint_path else {
            return;
        };
        let snap = progress.snapshot();
        let cp = RunCheckpoint {
            mode: prior.mode.clone(),
            attempts: prior.attempts + snap.attempts,
            elapsed_secs: prior.elapsed_secs + snap.elapsed.as_secs_f64(),
            watchlist_hits: prior.watchlist_hits + snap.watchlist_hits,
            runs: prior.runs + 1,
        };
        if let Err(e) = checkpoint::save(path, &cp) {
            warn!(error = %e, path = %path.display(), "failed to save checkpoint");
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::{KeypairGenerator, MeshcoreGenerator};

    fn key(seed: u64) -> CandidateKey {
        CandidateKey::new(MeshcoreGenerator::from_seed(seed).generate())
    }

    #[test]
    fn first_publisher_wins_the_slot() {
        let shared = SharedState::new();
        let a = key(1);
        let b = key(2);
        assert!(shared.publish_found(3, a.clone()));
        assert!(!shared.publish_found(5, b));
        let (id, stored) = shared.found().unwrap();
        assert_eq!(*id, 3);
        assert_eq!(stored, &a);
        assert_eq!(shared.stop_reason(), Some(StopReason::Terminated));
    }

    #[test]
    fn cancel_takes_precedence_over_terminate() {
        let shared = SharedState::new();
        assert_eq!(shared.stop_reason(), None);
        shared.request_stop();
        assert_eq!(shared.stop_reason(), Some(StopReason::Terminated));
        shared.cancel();
        assert_eq!(shared.stop_reason(), Some(StopReason::Interrupted));
        assert!(shared.is_cancelled());
    }

    #[test]
    fn concurrent_publishers_leave_one_winner() {
        let shared = SharedState::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.publish_found(i, key(i as u64)))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        let (id, stored) = shared.found().unwrap();
        assert_eq!(stored, &key(*id as u64));
    }

    #[test]
    fn panic_messages_are_extracted() {
        let p: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*p), "boom");
        let p: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*p), "bang");
        let p: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*p), "worker panicked");
    }
}
