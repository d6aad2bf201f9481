//! Plaintext store with lazy encoding.
//!
//! A [`Plaintext`] keeps its raw values so it can be re-encoded for any
//! ciphertext it meets. Encoding at the default scale and the top of the chain
//! happens at most once and is cached; [`Plaintext::rescaled`] never mutates
//! the receiver, it returns a new value. A broadcast constant can therefore be
//! shared across threads without locking.

use std::fmt;
use std::sync::{Arc, OnceLock};

use strata_core::Plaintext as CorePlaintext;

use crate::accountant::ObjectToken;
use crate::ciphertext::{Ciphertext, ContentKind};
use crate::context::HeContext;
use crate::engine::HeEngine;
use crate::error::{HeError, HeResult, OperandInfo};

/// Encoded or raw plaintext values.
pub struct Plaintext {
    raw: Option<Arc<[f64]>>,
    encoded: OnceLock<CorePlaintext>,
    all_zero: bool,
    all_one: bool,
    kind: ContentKind,
    ctx: HeContext,
    _token: ObjectToken,
}

impl Plaintext {
    fn build(ctx: HeContext, raw: Option<Arc<[f64]>>, encoded: OnceLock<CorePlaintext>, kind: ContentKind) -> Self {
        let (all_zero, all_one) = match raw.as_deref() {
            Some(values) => (
                values.iter().all(|&v| v == 0.0),
                !values.is_empty() && values.iter().all(|&v| v == 1.0),
            ),
            None => (false, false),
        };
        let _token = ctx.track_plaintext();
        Self {
            raw,
            encoded,
            all_zero,
            all_one,
            kind,
            ctx,
            _token,
        }
    }

    pub(crate) fn lazy(ctx: HeContext, values: Vec<f64>, kind: ContentKind) -> Self {
        Self::build(ctx, Some(values.into()), OnceLock::new(), kind)
    }

    pub(crate) fn eager(ctx: HeContext, values: Vec<f64>, kind: ContentKind) -> HeResult<Self> {
        let pt = Self::lazy(ctx, values, kind);
        pt.encoded()?;
        Ok(pt)
    }

    fn with_encoding(&self, encoded: CorePlaintext) -> Self {
        Self::build(
            self.ctx.clone(),
            self.raw.clone(),
            OnceLock::from(encoded),
            self.kind,
        )
    }

    /// The encoding, computed on first use at the default scale and the top of
    /// the chain.
    pub fn encoded(&self) -> HeResult<&CorePlaintext> {
        if let Some(pt) = self.encoded.get() {
            return Ok(pt);
        }
        let raw = self
            .raw
            .as_deref()
            .ok_or_else(|| HeError::Misuse("plaintext holds neither values nor an encoding".into()))?;
        let engine = self.ctx.engine();
        let pt = engine.encode(raw, engine.default_scale(), engine.max_level())?;
        // A racing thread may have won; both encodings are identical.
        Ok(self.encoded.get_or_init(|| pt))
    }

    /// Whether the encoding has been computed.
    pub fn is_encoded(&self) -> bool {
        self.encoded.get().is_some()
    }

    /// Scale of the encoding, or the scale it will be encoded at.
    pub fn scale(&self) -> f64 {
        self.encoded
            .get()
            .map_or_else(|| self.ctx.default_scale(), |pt| pt.scale)
    }

    /// Chain index of the encoding, or the one it will be encoded at.
    pub fn level(&self) -> usize {
        self.encoded
            .get()
            .map_or_else(|| self.ctx.max_level(), CorePlaintext::level)
    }

    /// Scale and level together.
    pub fn operand_info(&self) -> OperandInfo {
        OperandInfo {
            scale: self.scale(),
            level: self.level(),
        }
    }

    /// Every raw value is zero.
    pub fn is_all_zero(&self) -> bool {
        self.all_zero
    }

    /// Every raw value is one.
    pub fn is_all_one(&self) -> bool {
        self.all_one
    }

    /// Integer or real content.
    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    /// The values this plaintext was created from.
    pub fn raw_values(&self) -> Option<&[f64]> {
        self.raw.as_deref()
    }

    /// Context this plaintext belongs to.
    pub fn context(&self) -> &HeContext {
        &self.ctx
    }

    /// A plaintext encoded at exactly `scale` and `level`. Reuses the current
    /// encoding when it already matches.
    pub fn rescaled(&self, scale: f64, level: usize) -> HeResult<Plaintext> {
        if let Some(pt) = self.encoded.get() {
            if pt.scale == scale && pt.level() == level {
                return Ok(self.with_encoding(pt.clone()));
            }
        }
        let engine = self.ctx.engine();
        let encoded = match self.raw.as_deref() {
            Some(values) => engine.encode(values, scale, level)?,
            None => engine.encode(&engine.decode(self.encoded()?)?, scale, level)?,
        };
        Ok(self.with_encoding(encoded))
    }

    /// [`Plaintext::rescaled`] to the ciphertext's scale and level.
    pub fn scale_to_match(&self, ct: &Ciphertext) -> HeResult<Plaintext> {
        self.ctx.ensure_same(ct.context())?;
        self.rescaled(ct.scale(), ct.level())
    }

    /// Values as reals. Raw values are returned as given; otherwise the
    /// encoding is decoded. Integer plaintexts come back rounded.
    pub fn decode_f64(&self) -> HeResult<Vec<f64>> {
        let mut values = match self.raw.as_deref() {
            Some(values) => values.to_vec(),
            None => self.ctx.engine().decode(self.encoded()?)?,
        };
        if self.kind == ContentKind::Integer {
            values.iter_mut().for_each(|v| *v = v.round());
        }
        Ok(values)
    }

    /// Bytes held by raw values and encoding.
    pub fn size_bytes(&self) -> usize {
        let raw = self.raw.as_deref().map_or(0, |r| std::mem::size_of_val(r));
        let encoded = self
            .encoded
            .get()
            .map_or(0, |pt| pt.poly.limbs.len() * pt.poly.n * std::mem::size_of::<u64>());
        raw + encoded
    }

    /// One-line diagnostic.
    pub fn info(&self) -> String {
        format!(
            "Plaintext ({:?}) {} encoded={} raw={}",
            self.kind,
            self.operand_info(),
            self.is_encoded(),
            self.raw.as_ref().map_or(0, |r| r.len())
        )
    }
}

impl Clone for Plaintext {
    fn clone(&self) -> Self {
        let encoded = match self.encoded.get() {
            Some(pt) => OnceLock::from(pt.clone()),
            None => OnceLock::new(),
        };
        Self::build(self.ctx.clone(), self.raw.clone(), encoded, self.kind)
    }
}

impl fmt::Debug for Plaintext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plaintext")
            .field("kind", &self.kind)
            .field("encoded", &self.is_encoded())
            .field("all_zero", &self.all_zero)
            .field("all_one", &self.all_one)
            .field("context", &self.ctx.id())
            .finish()
    }
}
