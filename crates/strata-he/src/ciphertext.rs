//! Ciphertext store.
//!
//! A [`Ciphertext`] exclusively owns its native polynomial pair. Arithmetic
//! lives in [`crate::ops`]; every operation that returns a new value allocates
//! a fresh store, and every clone counts as a creation.

use std::fmt;

use strata_core::Ciphertext as CoreCiphertext;

use crate::accountant::ObjectToken;
use crate::context::HeContext;
use crate::engine::HeEngine;
use crate::error::OperandInfo;

/// Whether decrypted values are rounded to integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Rounded on decryption.
    Integer,
    /// Returned as approximate reals.
    Real,
}

/// An encrypted vector with its label and context.
pub struct Ciphertext {
    pub(crate) inner: CoreCiphertext,
    pub(crate) label: String,
    kind: ContentKind,
    ctx: HeContext,
    _token: ObjectToken,
}

impl Ciphertext {
    pub(crate) fn from_parts(
        ctx: HeContext,
        inner: CoreCiphertext,
        label: String,
        kind: ContentKind,
    ) -> Self {
        let _token = ctx.track_ciphertext();
        Self {
            inner,
            label,
            kind,
            ctx,
            _token,
        }
    }

    /// Debug label, e.g. `"x * y"` for a derived value.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Replace the label.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Integer or real content.
    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    /// Current scale.
    pub fn scale(&self) -> f64 {
        self.inner.scale
    }

    /// Current chain index.
    pub fn level(&self) -> usize {
        self.inner.level()
    }

    /// Scale and level together.
    pub fn operand_info(&self) -> OperandInfo {
        OperandInfo {
            scale: self.scale(),
            level: self.level(),
        }
    }

    /// Context this ciphertext belongs to.
    pub fn context(&self) -> &HeContext {
        &self.ctx
    }

    /// The native ciphertext.
    pub fn as_core(&self) -> &CoreCiphertext {
        &self.inner
    }

    /// Bytes held by the polynomial components.
    pub fn size_bytes(&self) -> usize {
        self.inner.size() * (self.level() + 1) * self.inner.poly_degree() * std::mem::size_of::<u64>()
    }

    /// Serialized form, readable with [`HeContext::ciphertext_from_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        self.ctx.engine().serialize_ciphertext(&self.inner)
    }

    /// One-line diagnostic.
    pub fn info(&self) -> String {
        format!(
            "Ciphertext '{}' ({:?}) {} size {} on {}",
            self.label,
            self.kind,
            self.operand_info(),
            self.inner.size(),
            self.ctx.backend_name()
        )
    }
}

impl Clone for Ciphertext {
    fn clone(&self) -> Self {
        Self::from_parts(self.ctx.clone(), self.inner.clone(), self.label.clone(), self.kind)
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ciphertext")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("scale_bits", &self.scale().log2())
            .field("level", &self.level())
            .field("context", &self.ctx.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextConfig, RuntimeConfig, SealParams};

    fn keyed() -> HeContext {
        let ctx = HeContext::with_runtime(
            ContextConfig::seal(SealParams {
                poly_modulus_degree: 1024,
                coeff_modulus_bits: vec![60, 40, 40, 60],
                scale_bits: 40,
            })
            .with_seed(42),
            RuntimeConfig::default(),
        )
        .unwrap();
        ctx.create_public_key().unwrap();
        ctx.create_private_key().unwrap();
        ctx
    }

    #[test]
    fn test_metadata_of_fresh_ciphertext() {
        let ctx = keyed();
        let ct = ctx.encrypt_f64(&[1.0, 2.0], "x").unwrap();
        assert_eq!(ct.label(), "x");
        assert_eq!(ct.kind(), ContentKind::Real);
        assert_eq!(ct.level(), 2);
        assert_eq!(ct.scale(), 2f64.powi(40));
        assert_eq!(ct.size_bytes(), 2 * 3 * 1024 * 8);
        assert!(ct.info().contains("'x'"));
        assert!(ct.info().contains("level 2"));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let ctx = keyed();
        let ct = ctx.encrypt_i64(&[5, 6, 7], "x").unwrap();
        let back = ctx
            .ciphertext_from_bytes(&ct.to_bytes(), "y", ContentKind::Integer)
            .unwrap();
        assert_eq!(back.as_core(), ct.as_core());
        assert_eq!(&ctx.decrypt_i64(&back).unwrap()[..3], &[5, 6, 7]);
    }
}
