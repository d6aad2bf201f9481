//! The primitive capability set the orchestration layer drives.
//!
//! An [`HeEngine`] performs exactly what it is asked: operands whose scales or
//! levels disagree are rejected, never silently adjusted. Alignment,
//! relinearization after multiply and rescaling are decided one layer up in
//! [`crate::coordinator`] and [`crate::ops`].

use std::path::Path;

use strata_core::{Ciphertext, Plaintext};

use crate::error::HeResult;

/// Primitive operations and key lifecycle of one CKKS engine.
pub trait HeEngine: Send + Sync {
    /// Short backend name.
    fn name(&self) -> &'static str;

    /// Backend and engine version.
    fn version(&self) -> String;

    /// One-line description of the parameter set.
    fn describe(&self) -> String;

    /// Values packed into one ciphertext.
    fn number_of_slots(&self) -> usize;

    /// Chain index of a freshly encrypted ciphertext.
    fn max_level(&self) -> usize;

    /// Scale used when the caller does not pick one.
    fn default_scale(&self) -> f64;

    /// The prime a rescale at `level` divides by.
    fn prime_at(&self, level: usize) -> Option<u64>;

    /// Total bits of the data modulus at `level`.
    fn modulus_bits_at(&self, level: usize) -> u32;

    /// Ring degree N.
    fn poly_degree(&self) -> usize;

    // Keys

    /// Make the public key available for encryption.
    fn create_public_key(&self) -> HeResult<()>;

    /// Make the secret key available for decryption.
    fn create_private_key(&self) -> HeResult<()>;

    /// Whether encryption is possible.
    fn has_public_key(&self) -> bool;

    /// Whether decryption is possible.
    fn has_secret_key(&self) -> bool;

    /// Whether ciphertext multiplication is possible.
    fn has_relin_key(&self) -> bool;

    /// Write the public key bundle (public, relinearization and rotation keys).
    fn save_public_key(&self, path: &Path) -> HeResult<()>;

    /// Write the secret key.
    fn save_private_key(&self, path: &Path) -> HeResult<()>;

    /// Replace the public key bundle with one read from `path`.
    fn load_public_key(&self, path: &Path) -> HeResult<()>;

    /// Replace the secret key with one read from `path`.
    fn load_private_key(&self, path: &Path) -> HeResult<()>;

    // Encoding and encryption

    /// Encode `values` at `scale` for chain index `level`.
    fn encode(&self, values: &[f64], scale: f64, level: usize) -> HeResult<Plaintext>;

    /// Decode all slots of a plaintext.
    fn decode(&self, pt: &Plaintext) -> HeResult<Vec<f64>>;

    /// Public-key encryption at the plaintext's level and scale.
    fn encrypt(&self, pt: &Plaintext) -> HeResult<Ciphertext>;

    /// Decrypt to an encoded plaintext.
    fn decrypt(&self, ct: &Ciphertext) -> HeResult<Plaintext>;

    /// Byte form of a ciphertext.
    fn serialize_ciphertext(&self, ct: &Ciphertext) -> Vec<u8>;

    /// Parse and validate a ciphertext against this parameter set.
    fn deserialize_ciphertext(&self, bytes: &[u8]) -> HeResult<Ciphertext>;

    // Arithmetic

    /// a += b.
    fn add_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()>;

    /// a -= b.
    fn sub_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()>;

    /// ct += pt.
    fn add_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()>;

    /// ct -= pt.
    fn sub_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()>;

    /// a *= b, leaving a three-component ciphertext.
    fn multiply_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()>;

    /// ct *= pt.
    fn multiply_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()>;

    /// Collapse a three-component ciphertext with the relinearization key.
    fn relinearize_inplace(&self, ct: &mut Ciphertext) -> HeResult<()>;

    /// Divide by the last prime, lowering the level by one.
    fn rescale_to_next_inplace(&self, ct: &mut Ciphertext) -> HeResult<()>;

    /// Drop primes down to `level` without touching the scale.
    fn mod_switch_to_inplace(&self, ct: &mut Ciphertext, level: usize) -> HeResult<()>;

    /// Rotate slots left by `steps`; negative steps rotate right.
    fn rotate_inplace(&self, ct: &mut Ciphertext, steps: i64) -> HeResult<()>;

    /// Begin a new memory group.
    fn start_new_group(&self, name: &str);

    /// Name of the current memory group.
    fn current_group(&self) -> String;

    // Copying forms

    /// a + b.
    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Ciphertext> {
        let mut out = a.clone();
        self.add_inplace(&mut out, b)?;
        Ok(out)
    }

    /// a - b.
    fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Ciphertext> {
        let mut out = a.clone();
        self.sub_inplace(&mut out, b)?;
        Ok(out)
    }

    /// a × b, unrelinearized.
    fn multiply(&self, a: &Ciphertext, b: &Ciphertext) -> HeResult<Ciphertext> {
        let mut out = a.clone();
        self.multiply_inplace(&mut out, b)?;
        Ok(out)
    }

    /// ct rotated by `steps`.
    fn rotate(&self, ct: &Ciphertext, steps: i64) -> HeResult<Ciphertext> {
        let mut out = ct.clone();
        self.rotate_inplace(&mut out, steps)?;
        Ok(out)
    }
}
