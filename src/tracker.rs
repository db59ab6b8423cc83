//! # Tracker — Rolling Throughput Window, ETA and Degradation
//!
//! Each worker owns a [`PerformanceTracker`]. It keeps a bounded ring of recent
//! rate samples, decides when a progress report is due, turns the a-priori
//! match probability into a human ETA, and flags throughput collapse by
//! comparing the last three samples against everything older.
//!
//! The same "recent three vs older" comparison backs [`crate::health`], with
//! a shorter window and a looser threshold.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Samples kept per tracker; oldest evicted first.
pub const SAMPLE_CAPACITY: usize = 20;
/// Recent/baseline ratio below which throughput counts as degraded.
pub const DEGRADATION_THRESHOLD: f64 = 0.6;
/// Samples required before any degradation verdict.
pub const MIN_SAMPLES: usize = 5;
/// Older samples required to form a baseline.
const MIN_BASELINE: usize = 2;
/// Samples forming the "recent" side of the comparison.
pub(crate) const RECENT: usize = 3;
const REPORT_EVERY: Duration = Duration::from_secs(5);

/// Mean of the last [`RECENT`] rates divided by the mean of the older ones.
///
/// `None` when there are fewer than [`RECENT`] samples or the baseline mean is
/// zero. The baseline divisor is clamped to 1, so with exactly three samples
/// the baseline is empty and the ratio is skipped.
pub(crate) fn recent_ratio(rates: &[f64]) -> Option<f64> {
    if rates.len() < RECENT {
        return None;
    }
    let split = rates.len() - RECENT;
    let recent = rates[split..].iter().sum::<f64>() / RECENT as f64;
    let older = rates[..split].iter().sum::<f64>() / split.max(1) as f64;
    if older > 0.0 {
        Some(recent / older)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub elapsed: Duration,
    pub rate: f64,
    pub attempts: u64,
}

/// Remaining-time estimate rendered as `calculating`, `unknown`, `42s`, `3.5m`, `1.2h`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Eta {
    Calculating,
    Unknown,
    Remaining(Duration),
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eta::Calculating => write!(f, "calculating"),
            Eta::Unknown => write!(f, "unknown"),
            Eta::Remaining(d) => write!(f, "{}", format_duration(*d)),
        }
    }
}

/// Auto-selects seconds, minutes or hours.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.0}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

pub struct PerformanceTracker {
    start: Instant,
    last_report: Instant,
    samples: VecDeque<Sample>,
    probability: Option<f64>,
    report_interval: u64,
    /// Attempts carried over from a checkpoint; counted towards the ETA horizon.
    prior_attempts: u64,
}

impl PerformanceTracker {
    pub fn new(probability: Option<f64>) -> Self {
        let now = Instant::now();
        PerformanceTracker {
            start: now,
            last_report: now,
            samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
            probability: probability.filter(|p| *p > 0.0),
            report_interval: 1_000_000,
            prior_attempts: 0,
        }
    }

    pub fn with_report_interval(mut self, interval: u64) -> Self {
        self.report_interval = interval.max(1);
        self
    }

    pub fn with_prior_attempts(mut self, attempts: u64) -> Self {
        self.prior_attempts = attempts;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Due every 5 s, or whenever `attempts` lands on a report-interval multiple.
    pub fn should_report_now(&self, attempts: u64) -> bool {
        self.last_report.elapsed() >= REPORT_EVERY
            || (attempts > 0 && attempts % self.report_interval == 0)
    }

    /// Records a rate sample and restarts the 5 s report timer.
    pub fn record_sample(&mut self, attempts: u64, rate: f64) {
        if self.samples.len() == SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            elapsed: self.start.elapsed(),
            rate,
            attempts,
        });
        self.last_report = Instant::now();
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn estimate_eta(&self, attempts: u64, rate: f64) -> Eta {
        let total = attempts + self.prior_attempts;
        if total == 0 || rate <= 0.0 {
            return Eta::Calculating;
        }
        let Some(p) = self.probability else {
            return Eta::Unknown;
        };
        let done = total as f64;
        let mut remaining = std::f64::consts::LN_2 / p - done;
        if remaining <= 0.0 {
            // Past the 50% horizon: quote the 90% one instead.
            remaining = 2.3 / p - done;
        }
        Duration::try_from_secs_f64(remaining.max(0.0) / rate).map_or(Eta::Unknown, Eta::Remaining)
    }

    /// `(degraded, ratio)`; ratio is 1.0 until enough samples exist.
    pub fn degraded(&self) -> (bool, f64) {
        if self.samples.len() < MIN_SAMPLES || self.samples.len() - RECENT < MIN_BASELINE {
            return (false, 1.0);
        }
        let rates: Vec<f64> = self.samples.iter().map(|s| s.rate).collect();
        match recent_ratio(&rates) {
            Some(ratio) => (ratio < DEGRADATION_THRESHOLD, ratio),
            None => (false, 1.0),
        }
    }
}
