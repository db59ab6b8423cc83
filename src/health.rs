//! # Health — Worker Resource and Throughput Supervision
//!
//! One [`HealthMonitor`] per worker plus one global instance in the coordinator.
//! Each call to [`HealthMonitor::check`] runs three independent checks:
//!
//! 1. **Memory** (every 30 s): RSS growth beyond 200 MB since the monitor
//!    started records a warning and compacts the heap.
//! 2. **Scheduled compaction** (every 120 s): compacts regardless of health.
//! 3. **Throughput**: a 10-sample window of batch rates; the mean of the last
//!    three below 70% of the older mean marks the worker unhealthy.
//!
//! The monitor only reports. Deciding to restart is the worker's and
//! coordinator's job.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::metrics::{compact_heap, ProcessSampler};
use crate::tracker::recent_ratio;

pub const MEMORY_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const COMPACTION_INTERVAL: Duration = Duration::from_secs(120);
/// RSS growth since monitor start that counts as a leak.
pub const MEMORY_GROWTH_THRESHOLD: u64 = 200 * 1024 * 1024;
pub const PERFORMANCE_THRESHOLD: f64 = 0.7;
const HISTORY_CAPACITY: usize = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct HealthStatus {
    pub healthy: bool,
    pub warnings: Vec<String>,
    pub actions_taken: Vec<String>,
    /// Resident set size in bytes; 0 when unavailable.
    pub memory_usage: u64,
    /// Process CPU percent; 0 when unavailable.
    pub cpu_usage: f32,
    /// Recent throughput over baseline; 1.0 until a baseline exists.
    pub performance_ratio: f64,
}

pub struct HealthMonitor {
    worker_id: Option<usize>,
    sampler: ProcessSampler,
    baseline_memory: u64,
    rates: VecDeque<f64>,
    memory_check_interval: Duration,
    compaction_interval: Duration,
    last_memory_check: Instant,
    last_compaction: Instant,
}

impl HealthMonitor {
    /// `worker_id` is `None` for the coordinator's global monitor.
    pub fn new(worker_id: Option<usize>) -> Self {
        Self::with_intervals(worker_id, MEMORY_CHECK_INTERVAL, COMPACTION_INTERVAL)
    }

    pub fn with_intervals(
        worker_id: Option<usize>,
        memory_check_interval: Duration,
        compaction_interval: Duration,
    ) -> Self {
        let mut sampler = ProcessSampler::new();
        let baseline_memory = sampler.memory_bytes();
        let now = Instant::now();
        HealthMonitor {
            worker_id,
            sampler,
            baseline_memory,
            rates: VecDeque::with_capacity(HISTORY_CAPACITY),
            memory_check_interval,
            compaction_interval,
            last_memory_check: now,
            last_compaction: now,
        }
    }

    /// Feeds one batch (`attempts` over `elapsed`) and returns a snapshot.
    pub fn check(&mut self, attempts: u64, elapsed: Duration) -> HealthStatus {
        let (memory_usage, cpu_usage) = self.sampler.sample();
        let mut status = HealthStatus {
            healthy: true,
            warnings: Vec::new(),
            actions_taken: Vec::new(),
            memory_usage,
            cpu_usage,
            performance_ratio: 1.0,
        };

        if self.last_memory_check.elapsed() >= self.memory_check_interval {
            self.last_memory_check = Instant::now();
            let growth = memory_usage.saturating_sub(self.baseline_memory);
            if self.baseline_memory > 0 && growth > MEMORY_GROWTH_THRESHOLD {
                status.warnings.push(format!(
                    "memory grew {:.1} MB since start",
                    growth as f64 / 1_048_576.0
                ));
                compact_heap();
                status.actions_taken.push("heap compaction (memory growth)".into());
            }
        }

        if self.last_compaction.elapsed() >= self.compaction_interval {
            self.last_compaction = Instant::now();
            compact_heap();
            status.actions_taken.push("scheduled heap compaction".into());
        }

        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            if let Some(ratio) = self.record_rate(attempts as f64 / secs) {
                status.performance_ratio = ratio;
                if ratio < PERFORMANCE_THRESHOLD {
                    status.healthy = false;
                    status
                        .warnings
                        .push(format!("throughput fell to {:.0}% of baseline", ratio * 100.0));
                }
            }
        }

        if !status.healthy {
            warn!(
                worker = ?self.worker_id,
                ratio = format_args!("{:.2}", status.performance_ratio),
                warnings = ?status.warnings,
                "health check failed"
            );
        } else if !status.actions_taken.is_empty() {
            debug!(worker = ?self.worker_id, actions = ?status.actions_taken, "health actions");
        }
        status
    }

    /// Pushes a rate and returns the recent/baseline ratio once one exists.
    pub fn record_rate(&mut self, rate: f64) -> Option<f64> {
        if self.rates.len() == HISTORY_CAPACITY {
            self.rates.pop_front();
        }
        self.rates.push_back(rate);
        self.ratio()
    }

    pub fn ratio(&self) -> Option<f64> {
        let rates: Vec<f64> = self.rates.iter().copied().collect();
        recent_ratio(&rates)
    }

    /// `(degraded, ratio)` against the 0.7 threshold.
    pub fn degraded(&self) -> (bool, f64) {
        match self.ratio() {
            Some(r) => (r < PERFORMANCE_THRESHOLD, r),
            None => (false, 1.0),
        }
    }

    pub fn worker_id(&self) -> Option<usize> {
        self.worker_id
    }
}
