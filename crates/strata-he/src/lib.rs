//! Strata HE: backend-agnostic leveled CKKS with automatic scale and level
//! coordination.
//!
//! A [`HeContext`] wraps one of two backend flavors ([`Backend::Seal`] or
//! [`Backend::OpenFhe`]) and hands out [`Ciphertext`] and [`Plaintext`]
//! handles. Arithmetic on those handles never asks the caller to manage scales
//! or levels:
//! - operands at different levels are modulus-switched to the lower one
//! - addends at different scales are reconciled with an encoded constant `1`
//!   and a rescale; factors may differ in scale
//! - every multiplication is relinearized and rescaled
//!
//! ```no_run
//! use strata_he::{ContextConfig, HeContext};
//!
//! # fn main() -> strata_he::HeResult<()> {
//! let ctx = HeContext::new(ContextConfig::for_backend("seal".parse()?))?;
//! ctx.create_public_key()?;
//! ctx.create_private_key()?;
//! let x = ctx.encrypt_f64(&[2.0, 1.0, 34.0, 45.0], "x")?;
//! let y = ctx.encrypt_f64(&[1.0, 2.0, 3.0, 4.0], "y")?;
//! let product = x.mult(&y)?;
//! println!("{}: {:?}", product.label(), &ctx.decrypt_f64(&product)?[..4]);
//! # Ok(())
//! # }
//! ```

pub mod accountant;
pub mod backend;
pub mod ciphertext;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod logging;
pub mod monitor;
mod ops;
pub mod plaintext;

pub use accountant::{ObjectStats, ResourceAccountant};
pub use backend::{Backend, OpenFheBackend, SealBackend};
pub use ciphertext::{Ciphertext, ContentKind};
pub use config::{BackendConfig, BackendKind, ContextConfig, OpenFheParams, RuntimeConfig, SealParams};
pub use context::HeContext;
pub use engine::HeEngine;
pub use error::{HeError, HeResult, KeyKind, OperandInfo};
pub use monitor::Monitor;
pub use plaintext::Plaintext;
