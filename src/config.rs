//! # Config — Search Parameters and Match Modes
//!
//! Immutable run parameters shared by every worker. A [`SearchConfig`] is built
//! once from CLI flags (or directly by an embedder), validated, then cloned into
//! each worker job behind an `Arc`.
//!
//! ## Match Modes
//!
//! | Mode | Predicate over the public-key hex |
//! |------|-----------------------------------|
//! | `FirstTwo` | `hex[0:2] == target` (vacuously true without a target) |
//! | `Prefix` | `hex` starts with `prefix` |
//! | `Vanity` | first N == last N, or first N == reverse(last N) |
//! | `FourChar` | vanity-4 plus optional first-two constraint |
//! | `PrefixVanity` | prefix AND vanity-8 |
//! | `Default` | vanity-8 plus optional first-two constraint |
//!
//! Hex payloads are stored lowercase; matching is case-insensitive anyway.

use anyhow::{bail, Result};
use std::fmt;
use std::time::Duration;

use crate::pattern::WatchlistPattern;

/// Default number of trials per batch.
pub const DEFAULT_BATCH_SIZE: u64 = 1_000_000;
/// Trials between termination-flag polls inside a batch.
pub const DEFAULT_POLL_INTERVAL: u64 = 100_000;
/// Restarts allowed per worker slot before it is retired.
pub const DEFAULT_MAX_RESTARTS: u32 = 5;
/// Consecutive unhealthy batches before a worker reports itself degraded.
pub const DEFAULT_MAX_SLOW_BATCHES: u32 = 3;
/// Longest prefix the probability model and CLI accept.
pub const MAX_PREFIX_LEN: usize = 8;

/// Width of a vanity cross-match (first N hex chars vs last N).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VanityWidth {
    Two,
    Four,
    Six,
    Eight,
}

impl VanityWidth {
    pub const ALL: [VanityWidth; 4] = [
        VanityWidth::Two,
        VanityWidth::Four,
        VanityWidth::Six,
        VanityWidth::Eight,
    ];

    pub fn chars(self) -> usize {
        match self {
            VanityWidth::Two => 2,
            VanityWidth::Four => 4,
            VanityWidth::Six => 6,
            VanityWidth::Eight => 8,
        }
    }

    pub fn from_chars(n: usize) -> Option<Self> {
        match n {
            2 => Some(VanityWidth::Two),
            4 => Some(VanityWidth::Four),
            6 => Some(VanityWidth::Six),
            8 => Some(VanityWidth::Eight),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchMode {
    FirstTwo { target: Option<String> },
    Prefix { prefix: String },
    Vanity { width: VanityWidth },
    FourChar { first_two: Option<String> },
    PrefixVanity { prefix: String },
    Default { first_two: Option<String> },
}

impl MatchMode {
    /// Lowercases every hex payload so the matcher compares like with like.
    pub fn normalized(self) -> Self {
        let lower = |s: String| s.to_ascii_lowercase();
        match self {
            MatchMode::FirstTwo { target } => MatchMode::FirstTwo {
                target: target.map(lower),
            },
            MatchMode::Prefix { prefix } => MatchMode::Prefix {
                prefix: lower(prefix),
            },
            MatchMode::Vanity { width } => MatchMode::Vanity { width },
            MatchMode::FourChar { first_two } => MatchMode::FourChar {
                first_two: first_two.map(lower),
            },
            MatchMode::PrefixVanity { prefix } => MatchMode::PrefixVanity {
                prefix: lower(prefix),
            },
            MatchMode::Default { first_two } => MatchMode::Default {
                first_two: first_two.map(lower),
            },
        }
    }

    /// Stable identifier used in checkpoints and log fields.
    pub fn label(&self) -> String {
        match self {
            MatchMode::FirstTwo { target } => {
                format!("first-two:{}", target.as_deref().unwrap_or("*"))
            }
            MatchMode::Prefix { prefix } => format!("prefix:{}", prefix),
            MatchMode::Vanity { width } => format!("vanity-{}", width.chars()),
            MatchMode::FourChar { first_two } => {
                format!("four-char:{}", first_two.as_deref().unwrap_or("*"))
            }
            MatchMode::PrefixVanity { prefix } => format!("prefix-vanity:{}", prefix),
            MatchMode::Default { first_two } => {
                format!("default:{}", first_two.as_deref().unwrap_or("*"))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            MatchMode::FirstTwo { target: None } => {
                bail!("first-two mode requires a two-character hex target (e.g. F8)")
            }
            MatchMode::FirstTwo { target: Some(t) }
            | MatchMode::FourChar { first_two: Some(t) }
            | MatchMode::Default { first_two: Some(t) } => check_first_two(t),
            MatchMode::Prefix { prefix } | MatchMode::PrefixVanity { prefix } => {
                check_prefix(prefix)
            }
            MatchMode::Vanity { .. }
            | MatchMode::FourChar { first_two: None }
            | MatchMode::Default { first_two: None } => Ok(()),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::FirstTwo { target } => write!(
                f,
                "first two hex chars = {}",
                target.as_deref().unwrap_or("any").to_ascii_uppercase()
            ),
            MatchMode::Prefix { prefix } => {
                write!(f, "prefix {}", prefix.to_ascii_uppercase())
            }
            MatchMode::Vanity { width } => write!(
                f,
                "{}-char vanity (first {n} == last {n} or mirrored)",
                width.chars(),
                n = width.chars()
            ),
            MatchMode::FourChar { first_two } => match first_two {
                Some(t) => write!(f, "4-char vanity starting {}", t.to_ascii_uppercase()),
                None => write!(f, "4-char vanity"),
            },
            MatchMode::PrefixVanity { prefix } => write!(
                f,
                "prefix {} + 8-char vanity",
                prefix.to_ascii_uppercase()
            ),
            MatchMode::Default { first_two } => match first_two {
                Some(t) => write!(f, "8-char vanity starting {}", t.to_ascii_uppercase()),
                None => write!(f, "8-char vanity"),
            },
        }
    }
}

fn check_first_two(t: &str) -> Result<()> {
    if t.len() != 2 || !t.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!(
            "first-two target must be exactly 2 hex characters (e.g. F8, 1A, 00), got {:?}",
            t
        );
    }
    Ok(())
}

fn check_prefix(p: &str) -> Result<()> {
    if p.is_empty() {
        bail!("prefix must be at least 1 character long");
    }
    if p.len() > MAX_PREFIX_LEN {
        bail!("prefix cannot be longer than {} characters", MAX_PREFIX_LEN);
    }
    if !p.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!("prefix must be a valid hex string (e.g. F8A1, 1234), got {:?}", p);
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub mode: MatchMode,
    pub batch_size: u64,
    /// Run-wide trial budget across all workers.
    pub max_attempts: Option<u64>,
    pub max_time: Option<Duration>,
    pub workers: usize,
    pub health_check: bool,
    pub verbose: bool,
    pub watchlist: Vec<WatchlistPattern>,
    pub poll_interval: u64,
    pub report_interval: u64,
    pub max_restarts: u32,
    pub max_slow_batches: u32,
    pub progress_interval: Duration,
    pub grace_period: Duration,
}

impl SearchConfig {
    pub fn new(mode: MatchMode) -> Self {
        SearchConfig {
            mode: mode.normalized(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: None,
            max_time: None,
            workers: 1,
            health_check: true,
            verbose: false,
            watchlist: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_interval: 1_000_000,
            max_restarts: DEFAULT_MAX_RESTARTS,
            max_slow_batches: DEFAULT_MAX_SLOW_BATCHES,
            progress_interval: Duration::from_secs(5),
            grace_period: Duration::from_millis(500),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_time(mut self, max_time: Option<Duration>) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn with_watchlist(mut self, watchlist: Vec<WatchlistPattern>) -> Self {
        self.watchlist = watchlist;
        self
    }

    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: u64) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Rejects configurations that can never run. Called before any worker starts.
    pub fn validate(&self) -> Result<()> {
        self.mode.validate()?;
        if self.batch_size == 0 {
            bail!("batch size must be positive");
        }
        if self.workers == 0 {
            bail!("worker count must be positive");
        }
        if self.poll_interval == 0 || self.report_interval == 0 {
            bail!("poll and report intervals must be positive");
        }
        if self.max_attempts == Some(0) {
            bail!("max attempts must be positive when set");
        }
        if self.max_time == Some(Duration::ZERO) {
            bail!("max time must be positive when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_hex_payloads() {
        let cfg = SearchConfig::new(MatchMode::Prefix {
            prefix: "F8A1".into(),
        });
        assert_eq!(
            cfg.mode,
            MatchMode::Prefix {
                prefix: "f8a1".into()
            }
        );
    }

    #[test]
    fn defaults_match_historical_values() {
        let cfg = SearchConfig::new(MatchMode::Default { first_two: None });
        assert_eq!(cfg.batch_size, 1_000_000);
        assert_eq!(cfg.poll_interval, 100_000);
        assert_eq!(cfg.max_restarts, 5);
        assert_eq!(cfg.max_slow_batches, 3);
        assert!(cfg.health_check);
        assert!(!cfg.verbose);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn first_two_mode_requires_target() {
        let cfg = SearchConfig::new(MatchMode::FirstTwo { target: None });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn first_two_rejects_bad_hex() {
        for bad in ["F", "F8A", "ZZ", "g1"] {
            let cfg = SearchConfig::new(MatchMode::Default {
                first_two: Some(bad.into()),
            });
            assert!(cfg.validate().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn prefix_length_bounds() {
        let empty = SearchConfig::new(MatchMode::Prefix { prefix: "".into() });
        assert!(empty.validate().is_err());
        let long = SearchConfig::new(MatchMode::PrefixVanity {
            prefix: "123456789".into(),
        });
        assert!(long.validate().is_err());
        let ok = SearchConfig::new(MatchMode::Prefix {
            prefix: "abcdef12".into(),
        });
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn zero_limits_rejected() {
        let mode = MatchMode::Vanity {
            width: VanityWidth::Four,
        };
        assert!(SearchConfig::new(mode.clone())
            .with_batch_size(0)
            .validate()
            .is_err());
        assert!(SearchConfig::new(mode.clone())
            .with_workers(0)
            .validate()
            .is_err());
        assert!(SearchConfig::new(mode.clone())
            .with_max_attempts(Some(0))
            .validate()
            .is_err());
        assert!(SearchConfig::new(mode)
            .with_max_time(Some(Duration::ZERO))
            .validate()
            .is_err());
    }

    #[test]
    fn vanity_width_roundtrip() {
        for w in VanityWidth::ALL {
            assert_eq!(VanityWidth::from_chars(w.chars()), Some(w));
        }
        assert_eq!(VanityWidth::from_chars(3), None);
    }

    #[test]
    fn labels_are_distinct_per_mode() {
        let a = MatchMode::Vanity {
            width: VanityWidth::Six,
        }
        .label();
        let b = MatchMode::Default { first_two: None }.label();
        assert_eq!(a, "vanity-6");
        assert_ne!(a, b);
    }
}
