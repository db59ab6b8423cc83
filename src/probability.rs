//! # Probability — A-Priori Match Odds per Mode
//!
//! Closed-form probability that a single uniformly random 64-char public key
//! satisfies the configured target. Only ever used for ETA and banner text.
//!
//! Vanity-N is modelled as `2 / 16^N` (direct match plus mirrored match). This
//! double counts the keys whose trailing N chars are a palindrome, so it
//! slightly overstates the odds; the figure is kept as-is so ETA text stays
//! comparable with earlier runs.

use crate::config::{MatchMode, VanityWidth};

const FIRST_TWO_ODDS: f64 = 1.0 / 256.0;

fn hex_odds(len: usize) -> f64 {
    16f64.powi(-(len as i32))
}

pub fn vanity_probability(width: VanityWidth) -> f64 {
    2.0 * hex_odds(width.chars())
}

fn first_two_factor(first_two: Option<&str>) -> f64 {
    if first_two.is_some() {
        FIRST_TWO_ODDS
    } else {
        1.0
    }
}

/// Probability in (0, 1] that one trial matches `mode`.
pub fn probability_of(mode: &MatchMode) -> f64 {
    match mode {
        MatchMode::FirstTwo { target } => first_two_factor(target.as_deref()),
        MatchMode::Prefix { prefix } => hex_odds(prefix.len()),
        MatchMode::Vanity { width } => vanity_probability(*width),
        MatchMode::FourChar { first_two } => {
            vanity_probability(VanityWidth::Four) * first_two_factor(first_two.as_deref())
        }
        MatchMode::PrefixVanity { prefix } => {
            hex_odds(prefix.len()) * vanity_probability(VanityWidth::Eight)
        }
        MatchMode::Default { first_two } => {
            vanity_probability(VanityWidth::Eight) * first_two_factor(first_two.as_deref())
        }
    }
}

/// Trials needed for a 50% chance of at least one match (`ln 2 / p`).
pub fn expected_attempts(probability: f64) -> Option<u64> {
    if probability > 0.0 {
        Some((std::f64::consts::LN_2 / probability) as u64)
    } else {
        None
    }
}

/// Trials needed for a 90% chance of at least one match (`2.3 / p`).
pub fn confident_attempts(probability: f64) -> Option<u64> {
    if probability > 0.0 {
        Some((2.3 / probability) as u64)
    } else {
        None
    }
}

/// e.g. `0.781% (1 in 128)` or `4.66e-10 (1 in 2,147,483,648)`.
pub fn format_probability(probability: f64) -> String {
    if probability <= 0.0 {
        return "0".to_string();
    }
    let one_in = group_thousands((1.0 / probability) as u64);
    let pct = probability * 100.0;
    if probability >= 0.1 {
        format!("{:.1}% (1 in {})", pct, one_in)
    } else if probability >= 0.01 {
        format!("{:.2}% (1 in {})", pct, one_in)
    } else if probability >= 0.001 {
        format!("{:.3}% (1 in {})", pct, one_in)
    } else {
        format!("{:.2e} (1 in {})", probability, one_in)
    }
}

pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
