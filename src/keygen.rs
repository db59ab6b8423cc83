//! # Keygen — MeshCore Ed25519 Keypair Generation
//!
//! MeshCore stores a 64-byte "expanded" private key: a clamped 32-byte scalar
//! followed by 32 random filler bytes. The public key is the clamped scalar
//! times the Ed25519 basepoint, used as-is (no second clamp).
//!
//! ## Algorithm
//!
//! 1. Draw a 32-byte seed from an OS-seeded CSPRNG.
//! 2. `digest = SHA-512(seed)`.
//! 3. Clamp `digest[0..32]`: `b[0] &= 248`, `b[31] &= 63`, `b[31] |= 64`.
//! 4. `public = compress(scalar · B)`.
//! 5. `private = clamped ‖ filler`.
//!
//! The search core only depends on the [`KeypairGenerator`] trait, so tests
//! substitute deterministic generators.

use anyhow::{bail, Context, Result};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha512};
use std::fmt;
use std::sync::Arc;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const PRIVATE_KEY_LEN: usize = 64;

#[derive(Clone, PartialEq, Eq)]
pub struct Keypair {
    pub public: [u8; PUBLIC_KEY_LEN],
    pub private: [u8; PRIVATE_KEY_LEN],
}

/// Source of candidate keypairs. One instance per worker; never shared.
pub trait KeypairGenerator: Send {
    fn generate(&mut self) -> Keypair;

    /// Round-trip check: does `keypair.private` derive `keypair.public`?
    fn verify(&self, keypair: &Keypair) -> bool;
}

/// A generated keypair plus the hex text every matcher works on.
#[derive(Clone, PartialEq, Eq)]
pub struct CandidateKey {
    pub keypair: Keypair,
    pub public_hex: String,
}

impl CandidateKey {
    pub fn new(keypair: Keypair) -> Self {
        let public_hex = hex::encode(keypair.public);
        CandidateKey {
            keypair,
            public_hex,
        }
    }

    pub fn private_hex(&self) -> String {
        hex::encode(self.keypair.private)
    }

    /// Upper-cased first 8 hex chars; names output files.
    pub fn key_id(&self) -> String {
        self.public_hex[..8].to_ascii_uppercase()
    }

    pub fn first_8(&self) -> &str {
        &self.public_hex[..8]
    }

    pub fn last_8(&self) -> &str {
        &self.public_hex[self.public_hex.len() - 8..]
    }

    /// MeshCore node id: the first public-key byte.
    pub fn node_id(&self) -> String {
        self.public_hex[..2].to_ascii_uppercase()
    }
}

impl fmt::Debug for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateKey")
            .field("public_hex", &self.public_hex)
            .field("private", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &hex::encode(self.public))
            .field("private", &"<redacted>")
            .finish()
    }
}

fn clamp(scalar: &mut [u8; 32]) {
    scalar[0] &= 248;
    scalar[31] &= 63;
    scalar[31] |= 64;
}

/// `scalar · B` without clamping; `B` has prime order so reducing mod ℓ first is exact.
fn derive_public(scalar: &[u8; 32]) -> [u8; PUBLIC_KEY_LEN] {
    let s = Scalar::from_bytes_mod_order(*scalar);
    EdwardsPoint::mul_base(&s).compress().to_bytes()
}

fn scalar_half(private: &[u8; PRIVATE_KEY_LEN]) -> [u8; 32] {
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&private[..32]);
    scalar
}

pub struct MeshcoreGenerator {
    rng: StdRng,
}

impl MeshcoreGenerator {
    pub fn new() -> Self {
        MeshcoreGenerator {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator for reproducible benchmarks and tests.
    pub fn from_seed(seed: u64) -> Self {
        MeshcoreGenerator {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for MeshcoreGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeypairGenerator for MeshcoreGenerator {
    fn generate(&mut self) -> Keypair {
        let mut seed = [0u8; 32];
        self.rng.fill_bytes(&mut seed);
        let digest = Sha512::digest(seed);

        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&digest[..32]);
        clamp(&mut scalar);

        let mut private = [0u8; PRIVATE_KEY_LEN];
        private[..32].copy_from_slice(&scalar);
        self.rng.fill_bytes(&mut private[32..]);

        Keypair {
            public: derive_public(&scalar),
            private,
        }
    }

    fn verify(&self, keypair: &Keypair) -> bool {
        derive_public(&scalar_half(&keypair.private)) == keypair.public
    }
}

/// Builds one generator per worker (and per restart) for a slot id.
pub type GeneratorFactory = Arc<dyn Fn(usize) -> Box<dyn KeypairGenerator> + Send + Sync>;

/// Production factory: an independently OS-seeded generator per worker.
pub fn meshcore_factory() -> GeneratorFactory {
    Arc::new(|_: usize| -> Box<dyn KeypairGenerator> { Box::new(MeshcoreGenerator::new()) })
}

/// Checks a hex keypair the way MeshCore will load it.
pub fn verify_hex(private_hex: &str, public_hex: &str) -> Result<bool> {
    let private = hex::decode(private_hex.trim()).context("private key is not valid hex")?;
    let public = hex::decode(public_hex.trim()).context("public key is not valid hex")?;
    if private.len() != PRIVATE_KEY_LEN {
        bail!(
            "private key must be {} bytes, got {}",
            PRIVATE_KEY_LEN,
            private.len()
        );
    }
    if public.len() != PUBLIC_KEY_LEN {
        bail!(
            "public key must be {} bytes, got {}",
            PUBLIC_KEY_LEN,
            public.len()
        );
    }
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&private[..32]);
    Ok(derive_public(&scalar)[..] == public[..])
}

/// True when the first 32 private bytes carry MeshCore's clamp bits.
pub fn is_clamped(private: &[u8; PRIVATE_KEY_LEN]) -> bool {
    private[0] & 7 == 0 && private[31] & 0xC0 == 0x40
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_round_trip() {
        let mut generator = MeshcoreGenerator::from_seed(7);
        for _ in 0..16 {
            let kp = generator.generate();
            assert!(generator.verify(&kp));
            assert!(is_clamped(&kp.private));
        }
    }

    #[test]
    fn tampered_public_fails_verification() {
        let mut generator = MeshcoreGenerator::from_seed(11);
        let mut kp = generator.generate();
        kp.public[5] ^= 0x01;
        assert!(!generator.verify(&kp));
    }

    #[test]
    fn filler_does_not_affect_public() {
        let mut generator = MeshcoreGenerator::from_seed(3);
        let mut kp = generator.generate();
        kp.private[40] ^= 0xFF;
        assert!(generator.verify(&kp));
    }

    #[test]
    fn seeded_generators_are_reproducible() {
        let a = MeshcoreGenerator::from_seed(42).generate();
        let b = MeshcoreGenerator::from_seed(42).generate();
        assert_eq!(a, b);
    }

    /// Basepoint multiple for scalar 1 is the basepoint itself.
    #[test]
    fn scalar_one_derives_basepoint() {
        let mut scalar = [0u8; 32];
        scalar[0] = 1;
        assert_eq!(
            hex::encode(derive_public(&scalar)),
            "5866666666666666666666666666666666666666666666666666666666666666"
        );
    }

    /// A keypair exported by MeshCore firmware must verify unchanged.
    #[test]
    fn known_meshcore_keypair_verifies() {
        use crate::selftest::{KNOWN_PRIVATE_HEX, KNOWN_PUBLIC_HEX};
        assert!(verify_hex(KNOWN_PRIVATE_HEX, KNOWN_PUBLIC_HEX).unwrap());

        let mut private = [0u8; PRIVATE_KEY_LEN];
        hex::decode_to_slice(KNOWN_PRIVATE_HEX, &mut private).unwrap();
        assert!(is_clamped(&private));
        assert_eq!(
            hex::encode(derive_public(&scalar_half(&private))),
            KNOWN_PUBLIC_HEX
        );

        let mut tampered = KNOWN_PUBLIC_HEX.to_string();
        tampered.replace_range(..2, "d9");
        assert!(!verify_hex(KNOWN_PRIVATE_HEX, &tampered).unwrap());
    }

    #[test]
    fn hex_keys_verify() {
        let key = CandidateKey::new(MeshcoreGenerator::from_seed(5).generate());
        assert!(verify_hex(&key.private_hex(), &key.public_hex).unwrap());
        assert!(verify_hex(&key.private_hex().to_uppercase(), &key.public_hex).unwrap());

        let other = CandidateKey::new(MeshcoreGenerator::from_seed(6).generate());
        assert!(!verify_hex(&key.private_hex(), &other.public_hex).unwrap());
    }

    #[test]
    fn verify_hex_rejects_bad_lengths() {
        let key = CandidateKey::new(MeshcoreGenerator::from_seed(5).generate());
        assert!(verify_hex("00", &key.public_hex).is_err());
        assert!(verify_hex(&key.private_hex(), "00").is_err());
        assert!(verify_hex("zz", &key.public_hex).is_err());
    }

    #[test]
    fn candidate_key_accessors() {
        let mut generator = MeshcoreGenerator::from_seed(1);
        let key = CandidateKey::new(generator.generate());
        assert_eq!(key.public_hex.len(), 64);
        assert_eq!(key.private_hex().len(), 128);
        assert_eq!(key.key_id(), key.public_hex[..8].to_ascii_uppercase());
        assert_eq!(key.first_8().len(), 8);
        assert_eq!(key.last_8(), &key.public_hex[56..]);
        assert_eq!(key.node_id().len(), 2);
        assert!(!format!("{:?}", key).contains(&key.private_hex()));
    }
}
