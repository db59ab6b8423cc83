//! # Params — Command-Line Value Parsing
//!
//! Human-friendly parsers used as clap `value_parser`s, plus [`build_mode`],
//! which turns the mutually exclusive mode flags into one [`MatchMode`].
//!
//! | Flag | Accepts | Range |
//! |------|---------|-------|
//! | `--keys` | `100` (millions when ≤ 1000), `1b`, `2500000000` | 1M ..= 10B |
//! | `--time` | `2` (hours), `2:30` (hours:minutes) | 1 min ..= 24 h |
//! | `--batch-size` | `500K`, `2M`, `250000` | 10K ..= 10M |

use anyhow::{anyhow, bail, Context, Result};
use std::time::Duration;
use tracing::warn;

use crate::config::{MatchMode, VanityWidth, MAX_PREFIX_LEN};

pub const MIN_KEYS: u64 = 1_000_000;
pub const MAX_KEYS: u64 = 10_000_000_000;
pub const MIN_TIME: Duration = Duration::from_secs(60);
pub const MAX_TIME: Duration = Duration::from_secs(24 * 3600);
pub const MIN_BATCH: u64 = 10_000;
pub const MAX_BATCH: u64 = 10_000_000;

fn parse_number(s: &str) -> Result<f64> {
    let n: f64 = s
        .trim()
        .parse()
        .with_context(|| format!("invalid number {:?}", s))?;
    if !n.is_finite() || n < 0.0 {
        bail!("invalid number {:?}", s);
    }
    Ok(n)
}

fn in_range(value: u64, min: u64, max: u64, what: &str) -> Result<u64> {
    if value < min {
        bail!("minimum {} is {}", what, min);
    }
    if value > max {
        bail!("maximum {} is {}", what, max);
    }
    Ok(value)
}

/// `--keys`: values up to 1000 are millions; a `b` suffix means billions.
pub fn parse_key_count(s: &str) -> Result<u64> {
    let s = s.trim();
    let keys = match s.strip_suffix(['b', 'B']) {
        Some(billions) => parse_number(billions)? * 1e9,
        None => {
            let n = parse_number(s)?;
            if n <= 1000.0 {
                n * 1e6
            } else {
                n
            }
        }
    };
    in_range(keys as u64, MIN_KEYS, MAX_KEYS, "key count")
}

/// `--time`: `H` or `H:MM`.
pub fn parse_time_limit(s: &str) -> Result<Duration> {
    let s = s.trim();
    let secs = match s.split_once(':') {
        Some((h, m)) => {
            let hours: u64 = h.trim().parse().with_context(|| format!("invalid hours in {:?}", s))?;
            let minutes: u64 = m
                .trim()
                .parse()
                .with_context(|| format!("invalid minutes in {:?}", s))?;
            hours
                .checked_mul(3600)
                .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
        }
        None => {
            let hours: u64 = s.parse().with_context(|| format!("invalid time {:?}", s))?;
            hours.checked_mul(3600)
        }
    };
    let Some(secs) = secs else {
        bail!("maximum runtime is 24 hours");
    };
    let d = Duration::from_secs(secs);
    if d < MIN_TIME {
        bail!("minimum runtime is 1 minute");
    }
    if d > MAX_TIME {
        bail!("maximum runtime is 24 hours");
    }
    Ok(d)
}

/// `--batch-size`: optional `K`/`M` suffix.
pub fn parse_batch_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let size = if let Some(k) = s.strip_suffix(['k', 'K']) {
        parse_number(k)? * 1e3
    } else if let Some(m) = s.strip_suffix(['m', 'M']) {
        parse_number(m)? * 1e6
    } else {
        s.parse::<u64>()
            .map_err(|_| anyhow!("invalid batch size {:?}", s))? as f64
    };
    in_range(size as u64, MIN_BATCH, MAX_BATCH, "batch size")
}

/// Diagnostic sample sizes, given in units of `unit` keys (thousands, millions).
pub fn scale_sample_count(value: f64, unit: u64) -> Result<u64> {
    let keys = (value * unit as f64).round();
    if !keys.is_finite() || keys < 1.0 {
        bail!("sample must contain at least one key");
    }
    in_range(keys as u64, 1, MAX_KEYS, "sample size")
}

/// Validates a hex argument of `min_len..=max_len` chars; returns it lowercased.
pub fn parse_hex(label: &str, value: &str, min_len: usize, max_len: usize) -> Result<String> {
    let v = value.trim();
    if v.len() < min_len || v.len() > max_len {
        if min_len == max_len {
            bail!("--{} must be exactly {} hex characters, got {:?}", label, min_len, v);
        }
        bail!(
            "--{} must be {} to {} hex characters, got {:?}",
            label,
            min_len,
            max_len,
            v
        );
    }
    if !v.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!("--{} must be a valid hex string (e.g. F8A1), got {:?}", label, v);
    }
    Ok(v.to_ascii_lowercase())
}

/// Raw mode flags as they come off the command line.
#[derive(Clone, Debug, Default)]
pub struct ModeFlags {
    pub first_two: Option<String>,
    pub simple: bool,
    pub prefix: Option<String>,
    pub four_char: bool,
    pub prefix_vanity: Option<String>,
    pub vanity: Option<VanityWidth>,
}

/// At most one mode flag; none selects the default 8-char vanity search.
/// `--first-two` is a constraint, not a mode, and only applies to the
/// simple, four-char and default modes.
pub fn build_mode(flags: &ModeFlags) -> Result<MatchMode> {
    let selected = [
        flags.simple,
        flags.prefix.is_some(),
        flags.four_char,
        flags.prefix_vanity.is_some(),
        flags.vanity.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if selected > 1 {
        bail!(
            "cannot combine vanity modes; choose one of --simple, --prefix, --four-char, \
             --prefix-vanity, --vanity-2, --vanity-4, --vanity-6 or --vanity-8"
        );
    }

    let first_two = flags
        .first_two
        .as_deref()
        .map(|t| parse_hex("first-two", t, 2, 2))
        .transpose()?;

    let mode = if flags.simple {
        if first_two.is_none() {
            bail!("--simple requires --first-two");
        }
        MatchMode::FirstTwo { target: first_two }
    } else if let Some(prefix) = &flags.prefix {
        MatchMode::Prefix {
            prefix: parse_hex("prefix", prefix, 1, MAX_PREFIX_LEN)?,
        }
    } else if flags.four_char {
        MatchMode::FourChar { first_two }
    } else if let Some(prefix) = &flags.prefix_vanity {
        MatchMode::PrefixVanity {
            prefix: parse_hex("prefix-vanity", prefix, 1, MAX_PREFIX_LEN)?,
        }
    } else if let Some(width) = flags.vanity {
        MatchMode::Vanity { width }
    } else {
        MatchMode::Default { first_two }
    };

    if flags.first_two.is_some()
        && matches!(
            mode,
            MatchMode::Prefix { .. } | MatchMode::PrefixVanity { .. } | MatchMode::Vanity { .. }
        )
    {
        warn!(mode = %mode.label(), "--first-two is ignored in this mode");
    }
    Ok(mode)
}
