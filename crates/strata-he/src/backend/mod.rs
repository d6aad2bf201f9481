//! Backend selection.
//!
//! The flavor is resolved once when a context is built; every call afterwards
//! is a static `match` over [`Backend`].

mod native;
pub mod openfhe;
pub mod seal;

use std::path::Path;

use strata_core::{Ciphertext, Plaintext};

pub use native::DEFAULT_GROUP;
pub use openfhe::OpenFheBackend;
pub use seal::SealBackend;

use crate::config::{BackendConfig, BackendKind, ContextConfig};
use crate::engine::HeEngine;
use crate::error::HeResult;

/// Closed set of engine flavors.
pub enum Backend {
    /// SEAL flavor.
    Seal(SealBackend),
    /// OpenFHE flavor.
    OpenFhe(OpenFheBackend),
}

macro_rules! dispatch {
    ($self:ident, $b:ident => $body:expr) => {
        match $self {
            Backend::Seal($b) => $body,
            Backend::OpenFhe($b) => $body,
        }
    };
}

impl Backend {
    /// Build the backend a configuration names.
    pub fn from_config(config: &ContextConfig) -> HeResult<Self> {
        match &config.backend {
            BackendConfig::Seal(p) => Ok(Backend::Seal(SealBackend::new(p.clone(), config.seed)?)),
            BackendConfig::OpenFhe(p) => Ok(Backend::OpenFhe(OpenFheBackend::new(p.clone(), config.seed)?)),
        }
    }

    /// Which flavor this is.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Seal(_) => BackendKind::Seal,
            Backend::OpenFhe(_) => BackendKind::OpenFhe,
        }
    }
}

impl HeEngine for Backend {
    fn name(&self) -> &'static str {
        dispatch!(self, b => b.name())
    }

    fn version(&self) -> String {
        dispatch!(self, b => b.version())
    }

    fn describe(&self) -> String {
        dispatch!(self, b => b.describe())
    }

    fn number_of_slots(&self) -> usize {
        dispatch!(self, b => b.number_of_slots())
    }

    fn max_level(&self) -> usize {
        dispatch!(self, b => b.max_level())
    }

    fn default_scale(&self) -> f64 {
        dispatch!(self, b => b.default_scale())
    }

    fn prime_at(&self, level: usize) -> Option<u64> {
        dispatch!(self, b => b.prime_at(level))
    }

    fn modulus_bits_at(&self, level: usize) -> u32 {
        dispatch!(self, b => b.modulus_bits_at(level))
    }

    fn poly_degree(&self) -> usize {
        dispatch!(self, b => b.poly_degree())
    }

    fn create_public_key(&self) -> HeResult<()> {
        dispatch!(self, b => b.create_public_key())
    }

    fn create_private_key(&self) -> HeResult<()> {
        dispatch!(self, b => b.create_private_key())
    }

    fn has_public_key(&self) -> bool {
        dispatch!(self, b => b.has_public_key())
    }

    fn has_secret_key(&self) -> bool {
        dispatch!(self, b => b.has_secret_key())
    }

    fn has_relin_key(&self) -> bool {
        dispatch!(self, b => b.has_relin_key())
    }

    fn save_public_key(&self, path: &Path) -> HeResult<()> {
        dispatch!(self, b => b.save_public_key(path))
    }

    fn save_private_key(&self, path: &Path) -> HeResult<()> {
        dispatch!(self, b => b.save_private_key(path))
    }

    fn load_public_key(&self, path: &Path) -> HeResult<()> {
        dispatch!(self, b => b.load_public_key(path))
    }

    fn load_private_key(&self, path: &Path) -> HeResult<()> {
        dispatch!(self, b => b.load_private_key(path))
    }

    fn encode(&self, values: &[f64], scale: f64, level: usize) -> HeResult<Plaintext> {
        dispatch!(self, b => b.encode(values, scale, level))
    }

    fn decode(&self, pt: &Plaintext) -> HeResult<Vec<f64>> {
        dispatch!(self, b => b.decode(pt))
    }

    fn encrypt(&self, pt: &Plaintext) -> HeResult<Ciphertext> {
        dispatch!(self, b => b.encrypt(pt))
    }

    fn decrypt(&self, ct: &Ciphertext) -> HeResult<Plaintext> {
        dispatch!(self, b => b.decrypt(ct))
    }

    fn serialize_ciphertext(&self, ct: &Ciphertext) -> Vec<u8> {
        dispatch!(self, b => b.serialize_ciphertext(ct))
    }

    fn deserialize_ciphertext(&self, bytes: &[u8]) -> HeResult<Ciphertext> {
        dispatch!(self, b => b.deserialize_ciphertext(bytes))
    }

    fn add_inplace(&self, a: &mut Ciphertext, other: &Ciphertext) -> HeResult<()> {
        dispatch!(self, b => b.add_inplace(a, other))
    }

    fn sub_inplace(&self, a: &mut Ciphertext, other: &Ciphertext) -> HeResult<()> {
        dispatch!(self, b => b.sub_inplace(a, other))
    }

    fn add_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()> {
        dispatch!(self, b => b.add_plain_inplace(ct, pt))
    }

    fn sub_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()> {
        dispatch!(self, b => b.sub_plain_inplace(ct, pt))
    }

    fn multiply_inplace(&self, a: &mut Ciphertext, other: &Ciphertext) -> HeResult<()> {
        dispatch!(self, b => b.multiply_inplace(a, other))
    }

    fn multiply_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()> {
        dispatch!(self, b => b.multiply_plain_inplace(ct, pt))
    }

    fn relinearize_inplace(&self, ct: &mut Ciphertext) -> HeResult<()> {
        dispatch!(self, b => b.relinearize_inplace(ct))
    }

    fn rescale_to_next_inplace(&self, ct: &mut Ciphertext) -> HeResult<()> {
        dispatch!(self, b => b.rescale_to_next_inplace(ct))
    }

    fn mod_switch_to_inplace(&self, ct: &mut Ciphertext, level: usize) -> HeResult<()> {
        dispatch!(self, b => b.mod_switch_to_inplace(ct, level))
    }

    fn rotate_inplace(&self, ct: &mut Ciphertext, steps: i64) -> HeResult<()> {
        dispatch!(self, b => b.rotate_inplace(ct, steps))
    }

    fn start_new_group(&self, name: &str) {
        dispatch!(self, b => b.start_new_group(name))
    }

    fn current_group(&self) -> String {
        dispatch!(self, b => b.current_group())
    }
}
