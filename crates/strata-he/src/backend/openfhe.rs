//! OpenFHE-flavor backend.
//!
//! - The chain is `[first_mod_size, scaling_mod_size × depth, first_mod_size]`
//!   with a scale of `2^scaling_mod_size`.
//! - `create_private_key` generates the key pair, the relinearization key and
//!   one rotation key per configured index; `create_public_key` only releases
//!   the already generated public key for encryption.
//! - With a non-zero `batch_size`, inputs are repeated over the batch so that
//!   rotations act cyclically within it.

use std::path::Path;

use strata_core::serialize::{ct_from_bytes_checked, ct_to_bytes};
use strata_core::{Ciphertext, CkksParams, Plaintext};
use tracing::{debug, info};

use super::native::NativeEngine;
use crate::config::OpenFheParams;
use crate::engine::HeEngine;
use crate::error::{HeError, HeResult, KeyKind};

/// OpenFHE-flavor engine.
pub struct OpenFheBackend {
    native: NativeEngine,
    params: OpenFheParams,
}

impl OpenFheBackend {
    /// Build the chain. No keys exist until `create_private_key`.
    pub fn new(params: OpenFheParams, seed: Option<u64>) -> HeResult<Self> {
        params.validate()?;
        let core = CkksParams::new(
            params.ring_dim,
            &params.coeff_modulus_bits(),
            params.scaling_mod_size,
        )?;
        let native = NativeEngine::new(core, seed)?;
        info!(
            ring_dim = params.ring_dim,
            depth = params.multiplicative_depth,
            batch = params.batch_size,
            "created OpenFHE-flavor context"
        );
        Ok(Self { native, params })
    }

    /// Parameters this backend was built from.
    pub fn params(&self) -> &OpenFheParams {
        &self.params
    }

    /// Repeat `values` over one batch.
    fn fill_batch(&self, values: &[f64]) -> HeResult<Vec<f64>> {
        let slots = self.number_of_slots();
        if values.len() > slots {
            return Err(strata_core::CkksError::TooManyValues {
                len: values.len(),
                slots,
            }
            .into());
        }
        if values.is_empty() || self.params.batch_size == 0 {
            return Ok(values.to_vec());
        }
        Ok(values.iter().copied().cycle().take(slots).collect())
    }
}

impl HeEngine for OpenFheBackend {
    fn name(&self) -> &'static str {
        "openfhe"
    }

    fn version(&self) -> String {
        format!("strata OpenFHE-flavor backend {}", env!("CARGO_PKG_VERSION"))
    }

    fn describe(&self) -> String {
        format!(
            "{} depth={} batch={}",
            self.native.describe("OpenFHE"),
            self.params.multiplicative_depth,
            self.number_of_slots()
        )
    }

    fn number_of_slots(&self) -> usize {
        match self.params.batch_size {
            0 => self.native.params().num_slots,
            b => b,
        }
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
        if !self.native.has_public_material() {
            return Err(HeError::Misuse(
                "the OpenFHE flavor creates the public key with the private key; call create_private_key first"
                    .into(),
            ));
        }
        self.native.mark_public_ready();
        Ok(())
    }

    fn create_private_key(&self) -> HeResult<()> {
        info!("generating key pair");
        self.native.generate_secret_key();
        info!("generating relinearization key");
        self.native.generate_public_and_relin()?;
        if !self.params.rotation_indices.is_empty() {
            info!(indices = ?self.params.rotation_indices, "generating rotation keys");
            self.native.generate_rotation_keys(&self.params.rotation_indices)?;
        }
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
        let filled = self.fill_batch(values)?;
        self.native.encode(&filled, scale, level)
    }

    fn decode(&self, pt: &Plaintext) -> HeResult<Vec<f64>> {
        let mut values = self.native.decode(pt);
        values.truncate(self.number_of_slots());
        Ok(values)
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
        let reduced = steps.rem_euclid(slots);
        if reduced == 0 {
            return Ok(());
        }
        // Slots repeat every `slots`, so congruent steps rotate alike.
        let step = [steps, reduced, reduced - slots]
            .into_iter()
            .find(|&s| self.native.has_rotation_key(s))
            .ok_or(HeError::MissingKey(KeyKind::Rotation(steps)))?;
        debug!(steps, step, "rotating with a dedicated key");
        self.native.rotate_step(ct, step, steps)
    }

    fn start_new_group(&self, name: &str) {
        self.native.start_new_group(name);
    }

    fn current_group(&self) -> String {
        self.native.current_group()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> OpenFheParams {
        OpenFheParams {
            multiplicative_depth: 2,
            scaling_mod_size: 40,
            first_mod_size: 60,
            ring_dim: 1024,
            batch_size: 0,
            rotation_indices: vec![1, -1],
        }
    }

    #[test]
    fn test_chain_and_slots() {
        let backend = OpenFheBackend::new(params(), Some(3)).unwrap();
        assert_eq!(backend.max_level(), 2);
        assert_eq!(backend.number_of_slots(), 512);
        assert_eq!(backend.modulus_bits_at(0), 60);
        assert_eq!(backend.default_scale(), 2f64.powi(40));

        let batched = OpenFheBackend::new(
            OpenFheParams {
                batch_size: 8,
                ..params()
            },
            Some(3),
        )
        .unwrap();
        assert_eq!(batched.number_of_slots(), 8);
    }

    #[test]
    fn test_public_key_requires_private_key_first() {
        let backend = OpenFheBackend::new(params(), Some(3)).unwrap();
        assert!(matches!(backend.create_public_key(), Err(HeError::Misuse(_))));
        backend.create_private_key().unwrap();
        assert!(backend.has_secret_key());
        assert!(!backend.has_public_key());
        backend.create_public_key().unwrap();
        assert!(backend.has_public_key());
    }

    #[test]
    fn test_batch_fill_and_decode_truncation() {
        let backend = OpenFheBackend::new(
            OpenFheParams {
                batch_size: 4,
                ..params()
            },
            Some(3),
        )
        .unwrap();
        assert_eq!(backend.fill_batch(&[1.0, 2.0]).unwrap(), vec![1.0, 2.0, 1.0, 2.0]);
        assert!(backend.fill_batch(&[0.0; 5]).is_err());

        let pt = backend.encode(&[1.0, 2.0, 3.0, 4.0], backend.default_scale(), 2).unwrap();
        let decoded = backend.decode(&pt).unwrap();
        assert_eq!(decoded.len(), 4);
        for (d, e) in decoded.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert!((d - e).abs() < 1e-6);
        }
    }
}
