//! Strata core: native RNS-CKKS primitives.
//!
//! This crate provides the primitive operation set that the orchestration layer
//! in `strata-he` drives:
//! - Encode/Decode (canonical embedding with power-of-five slot order)
//! - Encrypt (public key) / Decrypt
//! - ct + ct, ct + pt, ct × ct, ct × pt (element-wise in NTT domain)
//! - Relinearization and Galois rotation via hybrid key switching
//! - Rescale and modulus switch along the data-prime chain
//! - NTT/iNTT (negacyclic Number Theoretic Transform)
//!
//! Not implemented: bootstrapping.

pub mod ciphertext;
pub mod encoding;
pub mod error;
pub mod keys;
pub mod ntt;
pub mod params;
pub mod rns;
pub mod sampling;
pub mod serialize;

pub use ciphertext::{Ciphertext, CkksContext, Plaintext};
pub use error::{CkksError, CkksResult};
pub use keys::{GaloisKeys, KeySwitchKey, PublicKey, RelinKey, SecretKey};
pub use params::{CkksParams, Modulus};
