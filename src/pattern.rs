//! # Pattern — Primary Target and Watchlist Matching
//!
//! Pure predicates over the hex text of a candidate public key. Nothing here
//! interprets the key numerically: every check is an anchored, ASCII
//! case-insensitive substring comparison.
//!
//! ## Watchlist File Format
//!
//! ```text
//! # comment lines and blank lines are ignored
//! ABCD...EF01
//! ABCD...ABCDEF01|My cool pattern
//! ```
//!
//! Malformed lines are skipped with a warning; they never abort a run.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::config::{MatchMode, VanityWidth};

/// A secondary pattern reported (and saved) without stopping the search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchlistPattern {
    /// Original text as written in the watchlist file.
    pub pattern: String,
    pub description: String,
    /// Upper-cased leading anchor.
    pub first: String,
    /// Upper-cased trailing anchor.
    pub last: String,
}

impl WatchlistPattern {
    /// Parses `FIRST...LAST`. Both sides must be non-empty hex.
    pub fn from_string(pattern: &str, description: &str) -> Result<Self> {
        let parts: Vec<&str> = pattern.split("...").collect();
        if parts.len() != 2 {
            bail!(
                "invalid pattern {:?}: must contain exactly one '...'",
                pattern
            );
        }
        let first = parts[0].trim();
        let last = parts[1].trim();
        if first.is_empty() || last.is_empty() {
            bail!("invalid pattern {:?}: both parts must be non-empty", pattern);
        }
        if !is_hex(first) || !is_hex(last) {
            bail!("invalid pattern {:?}: parts must be valid hex", pattern);
        }
        Ok(WatchlistPattern {
            pattern: pattern.trim().to_string(),
            description: description.trim().to_string(),
            first: first.to_ascii_uppercase(),
            last: last.to_ascii_uppercase(),
        })
    }

    /// Both anchors must match independently.
    pub fn matches(&self, public_hex: &str) -> bool {
        let hex = public_hex.as_bytes();
        let (first, last) = (self.first.as_bytes(), self.last.as_bytes());
        if hex.len() < first.len() || hex.len() < last.len() {
            return false;
        }
        hex[..first.len()].eq_ignore_ascii_case(first)
            && hex[hex.len() - last.len()..].eq_ignore_ascii_case(last)
    }

    /// Filesystem-safe form of the pattern, e.g. `ABCD_EF01`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.first, self.last)
    }
}

impl fmt::Display for WatchlistPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}...{}", self.first, self.last)
    }
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parses watchlist text, skipping blanks, `#` comments and invalid lines.
pub fn parse_watchlist(text: &str) -> Vec<WatchlistPattern> {
    let mut patterns = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (pattern, description) = match line.split_once('|') {
            Some((p, d)) => (p.trim(), d.trim()),
            None => (line, ""),
        };
        match WatchlistPattern::from_string(pattern, description) {
            Ok(p) => patterns.push(p),
            Err(e) => warn!(line = idx + 1, error = %e, "skipping invalid watchlist entry"),
        }
    }
    patterns
}

pub fn load_watchlist(path: &Path) -> Result<Vec<WatchlistPattern>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading watchlist {}", path.display()))?;
    let patterns = parse_watchlist(&text);
    info!(
        count = patterns.len(),
        path = %path.display(),
        "loaded watchlist patterns"
    );
    Ok(patterns)
}

// ── Primary Target ──────────────────────────────────────────────

/// Does `hex` start with `prefix` (ASCII case-insensitive)?
fn starts_with_ci(hex: &str, prefix: &str) -> bool {
    let (h, p) = (hex.as_bytes(), prefix.as_bytes());
    h.len() >= p.len() && h[..p.len()].eq_ignore_ascii_case(p)
}

fn first_two_ok(hex: &str, first_two: Option<&str>) -> bool {
    match first_two {
        Some(t) => starts_with_ci(hex, t),
        None => true,
    }
}

/// First N chars equal the last N, either directly or mirrored.
pub fn vanity_match(hex: &str, width: VanityWidth) -> bool {
    let n = width.chars();
    let h = hex.as_bytes();
    if h.len() < n {
        return false;
    }
    let head = &h[..n];
    let tail = &h[h.len() - n..];
    if head.eq_ignore_ascii_case(tail) {
        return true;
    }
    head.iter()
        .zip(tail.iter().rev())
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// Primary-target predicate, dispatched exhaustively on the match mode.
pub fn matches_target(hex: &str, mode: &MatchMode) -> bool {
    match mode {
        MatchMode::FirstTwo { target } => first_two_ok(hex, target.as_deref()),
        MatchMode::Prefix { prefix } => !prefix.is_empty() && starts_with_ci(hex, prefix),
        MatchMode::Vanity { width } => vanity_match(hex, *width),
        MatchMode::FourChar { first_two } => {
            vanity_match(hex, VanityWidth::Four) && first_two_ok(hex, first_two.as_deref())
        }
        MatchMode::PrefixVanity { prefix } => {
            !prefix.is_empty()
                && starts_with_ci(hex, prefix)
                && vanity_match(hex, VanityWidth::Eight)
        }
        MatchMode::Default { first_two } => {
            vanity_match(hex, VanityWidth::Eight) && first_two_ok(hex, first_two.as_deref())
        }
    }
}

/// Every watchlist entry matching `hex`; not short-circuited.
pub fn matches_watchlist<'a>(
    hex: &str,
    patterns: &'a [WatchlistPattern],
) -> Vec<&'a WatchlistPattern> {
    patterns.iter().filter(|p| p.matches(hex)).collect()
}
