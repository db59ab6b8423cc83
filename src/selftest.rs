//! # Selftest — Generator Diagnostics
//!
//! Offline checks of the production key generator, run from the `selftest`
//! subcommand. None of them search for anything.
//!
//! - **compat**: a known MeshCore keypair must verify, and a freshly
//!   generated key must survive a hex round trip through [`verify_hex`].
//! - **distribution** / **node-id**: histogram of the first public-key byte
//!   (the MeshCore node id). A healthy generator covers all 256 ids at roughly
//!   1/256 each.
//! - **entropy**: duplicate public keys and per-byte frequencies over a run.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::info;

use crate::keygen::{is_clamped, verify_hex, CandidateKey, KeypairGenerator, PRIVATE_KEY_LEN};

/// A keypair exported by MeshCore firmware.
pub const KNOWN_PUBLIC_HEX: &str =
    "d86fff61471b086d87d895ed10c86e67a6cd5bfef551f6a81f33a54f9bc0c219";
pub const KNOWN_PRIVATE_HEX: &str = "305e0b1b3142a95882915c43cd806df904247a2d505505f73dfb0cde9e666c4d656591bb4b5a23b6f47c786bf6cccfa0c4423c4617bbc9ab51dfb6f016f84144";

pub const NODE_IDS: usize = 256;

// ── Compatibility ───────────────────────────────────────────────

#[derive(Debug)]
pub struct CompatReport {
    pub known_verifies: bool,
    pub known_clamped: bool,
    pub generated: CandidateKey,
    pub generated_verifies: bool,
    pub generated_clamped: bool,
}

impl CompatReport {
    pub fn passed(&self) -> bool {
        self.known_verifies && self.generated_verifies && self.generated_clamped
    }
}

fn clamped_hex(private_hex: &str) -> Result<bool> {
    let bytes = hex::decode(private_hex).context("private key is not valid hex")?;
    let private: [u8; PRIVATE_KEY_LEN] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("private key must be {} bytes", PRIVATE_KEY_LEN))?;
    Ok(is_clamped(&private))
}

pub fn check_compatibility(generator: &mut dyn KeypairGenerator) -> Result<CompatReport> {
    let known_verifies = verify_hex(KNOWN_PRIVATE_HEX, KNOWN_PUBLIC_HEX)?;
    let known_clamped = clamped_hex(KNOWN_PRIVATE_HEX)?;

    let generated = CandidateKey::new(generator.generate());
    let private_hex = generated.private_hex();
    let generated_verifies = verify_hex(&private_hex, &generated.public_hex)?;

    Ok(CompatReport {
        known_verifies,
        known_clamped,
        generated_clamped: is_clamped(&generated.keypair.private),
        generated,
        generated_verifies,
    })
}

// ── Node Id Histogram ───────────────────────────────────────────

/// Counts of one byte value over a sample.
#[derive(Clone, Debug)]
pub struct ByteHistogram {
    pub samples: u64,
    pub counts: [u64; NODE_IDS],
}

impl ByteHistogram {
    fn new() -> Self {
        ByteHistogram {
            samples: 0,
            counts: [0; NODE_IDS],
        }
    }

    fn record(&mut self, byte: u8) {
        self.samples += 1;
        self.counts[byte as usize] += 1;
    }

    /// Distinct byte values seen at least once.
    pub fn unique(&self) -> usize {
        self.counts.iter().filter(|c| **c > 0).count()
    }

    pub fn coverage_percent(&self) -> f64 {
        self.unique() as f64 / NODE_IDS as f64 * 100.0
    }

    pub fn share_percent(&self, count: u64) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        count as f64 / self.samples as f64 * 100.0
    }

    /// Most frequent values first; ties keep ascending byte order.
    pub fn top(&self, n: usize) -> Vec<(u8, u64)> {
        let mut seen: Vec<(u8, u64)> = self
            .counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(b, c)| (b as u8, *c))
            .collect();
        seen.sort_by(|a, b| b.1.cmp(&a.1));
        seen.truncate(n);
        seen
    }

    pub fn seen(&self) -> Vec<u8> {
        (0..NODE_IDS)
            .filter(|b| self.counts[*b] > 0)
            .map(|b| b as u8)
            .collect()
    }
}

/// Draws `samples` keys and histograms their node ids, logging every `log_every` keys.
pub fn node_id_histogram(
    generator: &mut dyn KeypairGenerator,
    samples: u64,
    log_every: u64,
) -> ByteHistogram {
    let mut histogram = ByteHistogram::new();
    for i in 1..=samples {
        histogram.record(generator.generate().public[0]);
        if log_every > 0 && i % log_every == 0 {
            info!(keys = i, total = samples, "node id sampling");
        }
    }
    histogram
}

// ── Entropy ─────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct EntropyReport {
    pub samples: u64,
    pub unique: u64,
    pub repeated: u64,
    pub first_byte: ByteHistogram,
    pub second_byte: ByteHistogram,
    /// Every public-key byte, all positions pooled.
    pub all_bytes: ByteHistogram,
}

impl EntropyReport {
    pub fn collision_percent(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.repeated as f64 / self.samples as f64 * 100.0
    }

    pub fn verdict(&self) -> &'static str {
        if self.repeated == 0 {
            "excellent: no key collisions detected"
        } else if (self.repeated as f64) < self.samples as f64 * 0.0001 {
            "good: very low collision rate"
        } else {
            "warning: higher than expected collision rate"
        }
    }
}

pub fn entropy_check(
    generator: &mut dyn KeypairGenerator,
    samples: u64,
    log_every: u64,
) -> EntropyReport {
    let mut seen = HashSet::new();
    let mut repeated = 0;
    let mut first_byte = ByteHistogram::new();
    let mut second_byte = ByteHistogram::new();
    let mut all_bytes = ByteHistogram::new();

    for i in 1..=samples {
        let public = generator.generate().public;
        if !seen.insert(public) {
            repeated += 1;
        }
        first_byte.record(public[0]);
        second_byte.record(public[1]);
        for byte in public {
            all_bytes.record(byte);
        }
        if log_every > 0 && i % log_every == 0 {
            info!(keys = i, total = samples, "entropy sampling");
        }
    }

    EntropyReport {
        samples,
        unique: seen.len() as u64,
        repeated,
        first_byte,
        second_byte,
        all_bytes,
    }
}
