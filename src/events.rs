//! # Events — Search Telemetry
//!
//! Workers and the coordinator never print. They emit [`Event`]s into an
//! injected [`EventSink`]; the binary installs a [`LogSink`] that renders them
//! as `tracing` records, while tests and embedders can use an [`EventLog`] to
//! inspect what happened.
//!
//! ## Event Types
//!
//! | Variant | Emitted When |
//! |---------|-------------|
//! | `SearchStarted` | Coordinator launched the pool |
//! | `Progress` | Aggregate tick (every 5 s, non-verbose only) |
//! | `WorkerProgress` | A worker's own report is due (verbose only) |
//! | `BatchCompleted` | A worker finished a full batch |
//! | `WatchlistHit` | A watchlist pattern matched; search continues |
//! | `HealthReport` | A health check came back unhealthy |
//! | `WorkerRestarted` | A degraded slot got a replacement worker |
//! | `WorkerRetired` | A slot was removed for good |
//! | `KeyFound` | The primary target matched |
//! | `SearchFinished` | The run ended (found, exhausted, interrupted) |

use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SearchStarted {
        mode: String,
        workers: usize,
        batch_size: u64,
        probability: f64,
        watchlist_patterns: usize,
    },
    Progress {
        attempts: u64,
        rate: f64,
        eta: String,
        elapsed_secs: f64,
        active_workers: usize,
    },
    WorkerProgress {
        worker_id: usize,
        attempts: u64,
        rate: f64,
        eta: String,
    },
    BatchCompleted {
        worker_id: usize,
        batch: u64,
        attempts: u64,
        rate: f64,
    },
    WatchlistHit {
        worker_id: usize,
        pattern: String,
        description: String,
        public_key: String,
        saved_to: Vec<PathBuf>,
    },
    HealthReport {
        worker_id: Option<usize>,
        healthy: bool,
        performance_ratio: f64,
        memory_mb: f64,
        warnings: Vec<String>,
        actions_taken: Vec<String>,
    },
    WorkerRestarted {
        worker_id: usize,
        restarts: u32,
        reason: String,
    },
    WorkerRetired {
        worker_id: usize,
        reason: String,
    },
    KeyFound {
        worker_id: usize,
        public_key: String,
        attempts: u64,
    },
    SearchFinished {
        outcome: String,
        attempts: u64,
        elapsed_secs: f64,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SearchStarted { .. } => "search_started",
            Event::Progress { .. } => "progress",
            Event::WorkerProgress { .. } => "worker_progress",
            Event::BatchCompleted { .. } => "batch_completed",
            Event::WatchlistHit { .. } => "watchlist_hit",
            Event::HealthReport { .. } => "health_report",
            Event::WorkerRestarted { .. } => "worker_restarted",
            Event::WorkerRetired { .. } => "worker_retired",
            Event::KeyFound { .. } => "key_found",
            Event::SearchFinished { .. } => "search_finished",
        }
    }
}

/// Observer for search telemetry. Called from pool threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Renders events as structured `tracing` records.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        match event {
            Event::SearchStarted {
                mode,
                workers,
                batch_size,
                probability,
                watchlist_patterns,
            } => info!(
                %mode,
                workers,
                batch_size,
                probability = format_args!("{:.3e}", probability),
                watchlist_patterns,
                "search started"
            ),
            Event::Progress {
                attempts,
                rate,
                eta,
                elapsed_secs,
                active_workers,
            } => info!(
                attempts,
                rate = format_args!("{:.0}", rate),
                %eta,
                elapsed = format_args!("{:.0}s", elapsed_secs),
                active_workers,
                "search progress"
            ),
            Event::WorkerProgress {
                worker_id,
                attempts,
                rate,
                eta,
            } => info!(
                worker = worker_id,
                attempts,
                rate = format_args!("{:.0}", rate),
                %eta,
                "worker progress"
            ),
            Event::BatchCompleted {
                worker_id,
                batch,
                attempts,
                rate,
            } => debug!(
                worker = worker_id,
                batch,
                attempts,
                rate = format_args!("{:.0}", rate),
                "batch completed"
            ),
            Event::WatchlistHit {
                worker_id,
                pattern,
                description,
                public_key,
                saved_to,
            } => info!(
                worker = worker_id,
                %pattern,
                %description,
                %public_key,
                saved_to = ?saved_to,
                "watchlist match"
            ),
            Event::HealthReport {
                worker_id,
                healthy,
                performance_ratio,
                memory_mb,
                warnings,
                actions_taken,
            } => warn!(
                worker = ?worker_id,
                healthy,
                ratio = format_args!("{:.2}", performance_ratio),
                memory_mb = format_args!("{:.1}", memory_mb),
                warnings = ?warnings,
                actions = ?actions_taken,
                "health report"
            ),
            Event::WorkerRestarted {
                worker_id,
                restarts,
                reason,
            } => warn!(worker = worker_id, restarts, %reason, "restarting worker"),
            Event::WorkerRetired { worker_id, reason } => {
                warn!(worker = worker_id, %reason, "worker slot retired")
            }
            Event::KeyFound {
                worker_id,
                public_key,
                attempts,
            } => info!(worker = worker_id, %public_key, attempts, "key found"),
            Event::SearchFinished {
                outcome,
                attempts,
                elapsed_secs,
            } => info!(
                %outcome,
                attempts,
                elapsed = format_args!("{:.1}s", elapsed_secs),
                "search finished"
            ),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EventRecord {
    pub elapsed_secs: f64,
    #[serde(flatten)]
    pub event: Event,
}

const EVENT_LOG_CAP: usize = 1000;

/// Bounded in-memory recorder; oldest records are dropped first.
pub struct EventLog {
    records: Mutex<VecDeque<EventRecord>>,
    capacity: usize,
    start: Instant,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAP)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        EventLog {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(EVENT_LOG_CAP))),
            capacity: capacity.max(1),
            start: Instant::now(),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().iter().map(|r| r.event.clone()).collect()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.lock().iter().filter(|r| r.event.kind() == kind).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<EventRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: Event) {
        let record = EventRecord {
            elapsed_secs: self.start.elapsed().as_secs_f64(),
            event,
        };
        let mut records = self.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }
}
