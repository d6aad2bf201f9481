//! SEAL-flavor backend.
//!
//! - Parameters are given as a ring degree, coefficient-modulus bit widths (the
//!   last one is the special prime) and a scale.
//! - The secret key exists from construction. `create_public_key` derives the
//!   public key, the relinearization key and rotation keys for every `±2^i`;
//!   `create_private_key` only enables decryption.
//! - Any rotation step is served by composing power-of-two rotations along the
//!   step's non-adjacent form.

use std::path::Path;

use strata_core::serialize::{ct_from_bytes_checked, ct_to_bytes};
use strata_core::{Ciphertext, CkksParams, Plaintext};
use tracing::{debug, info};

use super::native::NativeEngine;
use crate::config::SealParams;
use crate::engine::HeEngine;
use crate::error::HeResult;

/// SEAL-flavor engine.
pub struct SealBackend {
    native: NativeEngine,
    params: SealParams,
}

impl SealBackend {
    /// Build the parameter set and draw the secret key.
    pub fn new(params: SealParams, seed: Option<u64>) -> HeResult<Self> {
        params.validate()?;
        let core = CkksParams::new(
            params.poly_modulus_degree,
            &params.coeff_modulus_bits,
            params.scale_bits,
        )?;
        let native = NativeEngine::new(core, seed)?;
        native.generate_secret_key();
        info!(
            n = params.poly_modulus_degree,
            bits = ?params.coeff_modulus_bits,
            "created SEAL-flavor context"
        );
        Ok(Self { native, params })
    }

    /// Parameters this backend was built from.
    pub fn params(&self) -> &SealParams {
        &self.params
    }

    /// Steps `±2^i` that cover every rotation by composition.
    fn power_of_two_steps(&self) -> Vec<i64> {
        let slots = self.native.params().num_slots as i64;
        let mut steps = Vec::new();
        let mut step = 1i64;
        while step < slots {
            steps.push(step);
            steps.push(-step);
            step <<= 1;
        }
        steps
    }
}

/// Signed power-of-two decomposition of `step` modulo `slots`, choosing the
/// shorter direction. Terms that are multiples of `slots` are dropped.
pub(crate) fn naf_steps(step: i64, slots: i64) -> Vec<i64> {
    let mut r = step.rem_euclid(slots);
    if r > slots / 2 {
        r -= slots;
    }
    let negative = r < 0;
    let mut k = r.abs();
    let mut terms = Vec::new();
    let mut bit = 1i64;
    while k != 0 {
        if k & 1 == 1 {
            // Digit is +1 when k ≡ 1 mod 4, else -1.
            let digit = 2 - (k & 3);
            k -= digit;
            terms.push(if negative { -digit * bit } else { digit * bit });
        }
        k >>= 1;
        bit <<= 1;
    }
    terms.retain(|t| t % slots != 0);
    terms
}

impl HeEngine for SealBackend {
    fn name(&self) -> &'static str {
        "seal"
    }

    fn version(&self) -> String {
        format!("strata SEAL-flavor backend {}", env!("CARGO_PKG_VERSION"))
    }

    fn describe(&self) -> String {
        self.native.describe("SEAL")
    }

    fn number_of_slots(&self) -> usize {
        self.native.params().num_slots
    }

    fn max_level(&self) -> usize {
        self.native.params().max_level()
    }

    fn default_scale(&self) -> f64 {
        self.native.params().default_scale()
    }

    fn prime_at(&self, level: usize) -> Option<u64> {
        self.native.ctx().prime_at(level)
    }

    fn modulus_bits_at(&self, level: usize) -> u32 {
        self.native.params().modulus_bits_at(level)
    }

    fn poly_degree(&self) -> usize {
        self.native.params().poly_degree
    }

    fn create_public_key(&self) -> HeResult<()> {
        if !self.native.has_secret_material() {
            self.native.generate_secret_key();
        }
        info!("generating public, relinearization and rotation keys");
        self.native.generate_public_and_relin()?;
        self.native.generate_rotation_keys(&self.power_of_two_steps())?;
        self.native.mark_public_ready();
        Ok(())
    }

    fn create_private_key(&self) -> HeResult<()> {
        if !self.native.has_secret_material() {
            self.native.generate_secret_key();
        }
        info!("enabling decryption");
        self.native.mark_secret_ready();
        Ok(())
    }

    fn has_public_key(&self) -> bool {
        self.native.has_public_key()
    }

    fn has_secret_key(&self) -> bool {
        self.native.has_secret_key()
    }

    fn has_relin_key(&self) -> bool {
        self.native.has_relin_key()
    }

    fn save_public_key(&self, path: &Path) -> HeResult<()> {
        self.native.save_public_key(path)
    }

    fn save_private_key(&self, path: &Path) -> HeResult<()> {
        self.native.save_private_key(path)
    }

    fn load_public_key(&self, path: &Path) -> HeResult<()> {
        self.native.load_public_key(path)
    }

    fn load_private_key(&self, path: &Path) -> HeResult<()> {
        self.native.load_private_key(path)
    }

    fn encode(&self, values: &[f64], scale: f64, level: usize) -> HeResult<Plaintext> {
        self.native.encode(values, scale, level)
    }

    fn decode(&self, pt: &Plaintext) -> HeResult<Vec<f64>> {
        Ok(self.native.decode(pt))
    }

    fn encrypt(&self, pt: &Plaintext) -> HeResult<Ciphertext> {
        self.native.encrypt(pt)
    }

    fn decrypt(&self, ct: &Ciphertext) -> HeResult<Plaintext> {
        self.native.decrypt(ct)
    }

    fn serialize_ciphertext(&self, ct: &Ciphertext) -> Vec<u8> {
        ct_to_bytes(ct)
    }

    fn deserialize_ciphertext(&self, bytes: &[u8]) -> HeResult<Ciphertext> {
        Ok(ct_from_bytes_checked(bytes, self.native.params())?)
    }

    fn add_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()> {
        self.native.add_inplace(a, b)
    }

    fn sub_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()> {
        self.native.sub_inplace(a, b)
    }

    fn add_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()> {
        self.native.add_plain_inplace(ct, pt)
    }

    fn sub_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()> {
        self.native.sub_plain_inplace(ct, pt)
    }

    fn multiply_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()> {
        self.native.multiply_inplace(a, b)
    }

    fn multiply_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()> {
        self.native.multiply_plain_inplace(ct, pt)
    }

    fn relinearize_inplace(&self, ct: &mut Ciphertext) -> HeResult<()> {
        self.native.relinearize_inplace(ct)
    }

    fn rescale_to_next_inplace(&self, ct: &mut Ciphertext) -> HeResult<()> {
        self.native.rescale_to_next_inplace(ct)
    }

    fn mod_switch_to_inplace(&self, ct: &mut Ciphertext, level: usize) -> HeResult<()> {
        self.native.mod_switch_to_inplace(ct, level)
    }

    fn rotate_inplace(&self, ct: &mut Ciphertext, steps: i64) -> HeResult<()> {
        let slots = self.number_of_slots() as i64;
        let terms = naf_steps(steps, slots);
        debug!(steps, ?terms, "rotating by power-of-two composition");
        for term in terms {
            self.native.rotate_step(ct, term, steps)?;
        }
        Ok(())
    }

    fn start_new_group(&self, name: &str) {
        self.native.start_new_group(name);
    }

    fn current_group(&self) -> String {
        self.native.current_group()
    }
}
