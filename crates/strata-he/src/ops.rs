//! Ciphertext arithmetic.
//!
//! Every binary operation runs the same pipeline: check both operands share a
//! context, align them (ciphertexts through [`coordinator::execute`],
//! plaintexts by re-encoding at the ciphertext's scale and level), call the
//! primitive, and for multiplication relinearize and rescale. Addition and
//! subtraction need equal scales and levels; multiplication only equal levels. In-place forms
//! compute on a copy and only replace the receiver once everything succeeded.
//!
//! Multiplication by a plaintext of all ones returns the receiver unchanged
//! without spending a level. Multiplication by a plaintext of all zeros returns
//! a fresh encryption of zero at the scale and level the full product would
//! have, so the result never reveals that it is zero.

use strata_core::Ciphertext as CoreCiphertext;

use crate::ciphertext::Ciphertext;
use crate::coordinator::{self, computation_error, describe, Alignment};
use crate::engine::HeEngine;
use crate::error::{HeError, HeResult, OperandInfo};
use crate::monitor::Op;
use crate::plaintext::Plaintext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arith {
    Add,
    Sub,
    Mult,
}

impl Arith {
    fn name(self) -> &'static str {
        match self {
            Arith::Add => "add",
            Arith::Sub => "sub",
            Arith::Mult => "mult",
        }
    }

    fn alignment(self) -> Alignment {
        match self {
            Arith::Add | Arith::Sub => Alignment::Full,
            Arith::Mult => Alignment::LevelOnly,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mult => "*",
        }
    }
}

/// Relinearize then rescale a product. A product at level 0 has nowhere to go.
fn finish_multiply<E: HeEngine + ?Sized>(engine: &E, ct: &mut CoreCiphertext) -> HeResult<()> {
    engine.relinearize_inplace(ct)?;
    engine.rescale_to_next_inplace(ct)
}

fn ensure_level_for_mult(ct: &CoreCiphertext) -> HeResult<()> {
    if ct.level() == 0 {
        return Err(HeError::OutOfLevels {
            op: "mult",
            operand: describe(ct),
        });
    }
    Ok(())
}

impl Ciphertext {
    fn compute_ct(&self, op: Arith, other: &Ciphertext) -> HeResult<CoreCiphertext> {
        self.context().ensure_same(other.context())?;
        let engine = self.context().engine();
        let (lhs_info, rhs_info) = (describe(&self.inner), describe(&other.inner));

        let mut out = self.inner.clone();
        let rhs = coordinator::execute(
            engine,
            self.context().monitor(),
            op.name(),
            op.alignment(),
            &mut out,
            &other.inner,
        )?;
        let result = match op {
            Arith::Add => engine.add_inplace(&mut out, &rhs),
            Arith::Sub => engine.sub_inplace(&mut out, &rhs),
            Arith::Mult => ensure_level_for_mult(&out)
                .and_then(|()| engine.multiply_inplace(&mut out, &rhs))
                .and_then(|()| finish_multiply(engine, &mut out)),
        };
        result.map_err(|e| computation_error!(op.name(), lhs_info, rhs_info, e))?;

        self.context().monitor().record(match op {
            Arith::Mult => Op::CtxtCtxtMultiplication,
            Arith::Add | Arith::Sub => Op::CtxtCtxtAddition,
        });
        Ok(out)
    }

    fn compute_pt(&self, op: Arith, pt: &Plaintext) -> HeResult<CoreCiphertext> {
        self.context().ensure_same(pt.context())?;
        let engine = self.context().engine();
        let (lhs_info, rhs_info) = (describe(&self.inner), pt.operand_info());

        let result = if op == Arith::Mult && pt.is_all_one() {
            Ok(self.inner.clone())
        } else if op == Arith::Mult && pt.is_all_zero() {
            self.encrypted_zero_product()
        } else {
            self.apply_plain(op, pt)
        };
        let out = result.map_err(|e| computation_error!(op.name(), lhs_info, rhs_info, e))?;

        self.context().monitor().record(match op {
            Arith::Mult => Op::CtxtPtxtMultiplication,
            Arith::Add | Arith::Sub => Op::CtxtPtxtAddition,
        });
        Ok(out)
    }

    fn apply_plain(&self, op: Arith, pt: &Plaintext) -> HeResult<CoreCiphertext> {
        let engine = self.context().engine();
        if op == Arith::Mult {
            ensure_level_for_mult(&self.inner)?;
        }
        let matched = pt.scale_to_match(self)?;
        let encoded = matched.encoded()?;
        let mut out = self.inner.clone();
        match op {
            Arith::Add => engine.add_plain_inplace(&mut out, encoded)?,
            Arith::Sub => engine.sub_plain_inplace(&mut out, encoded)?,
            Arith::Mult => {
                engine.multiply_plain_inplace(&mut out, encoded)?;
                finish_multiply(engine, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Fresh encryption of zero at the scale and level `self × pt` would reach.
    fn encrypted_zero_product(&self) -> HeResult<CoreCiphertext> {
        ensure_level_for_mult(&self.inner)?;
        let engine = self.context().engine();
        let level = self.level();
        let q = engine
            .prime_at(level)
            .ok_or_else(|| HeError::Misuse(format!("no prime at level {level}")))? as f64;
        let scale = self.scale() * self.scale() / q;
        let zero = engine.encode(&[], scale, level - 1)?;
        engine.encrypt(&zero)
    }

    fn derived(&self, inner: CoreCiphertext, label: String) -> Ciphertext {
        Ciphertext::from_parts(self.context().clone(), inner, label, self.kind())
    }

    fn replace(&mut self, inner: CoreCiphertext, label: String) {
        self.inner = inner;
        self.label = label;
    }

    fn ct_label(&self, op: Arith, other: &Ciphertext) -> String {
        format!("{} {} {}", self.label(), op.symbol(), other.label())
    }

    fn pt_label(&self, op: Arith) -> String {
        format!("{} {} plaintext", self.label(), op.symbol())
    }

    fn scalar_label(&self, op: Arith, scalar: impl std::fmt::Display) -> String {
        format!("{} {} {}", self.label(), op.symbol(), scalar)
    }

    // Ciphertext ⊗ ciphertext

    /// `self + other`.
    pub fn add(&self, other: &Ciphertext) -> HeResult<Ciphertext> {
        let inner = self.compute_ct(Arith::Add, other)?;
        Ok(self.derived(inner, self.ct_label(Arith::Add, other)))
    }

    /// `self += other`.
    pub fn add_in_place(&mut self, other: &Ciphertext) -> HeResult<()> {
        let inner = self.compute_ct(Arith::Add, other)?;
        let label = self.ct_label(Arith::Add, other);
        self.replace(inner, label);
        Ok(())
    }

    /// `self - other`.
    pub fn sub(&self, other: &Ciphertext) -> HeResult<Ciphertext> {
        let inner = self.compute_ct(Arith::Sub, other)?;
        Ok(self.derived(inner, self.ct_label(Arith::Sub, other)))
    }

    /// `self -= other`.
    pub fn sub_in_place(&mut self, other: &Ciphertext) -> HeResult<()> {
        let inner = self.compute_ct(Arith::Sub, other)?;
        let label = self.ct_label(Arith::Sub, other);
        self.replace(inner, label);
        Ok(())
    }

    /// `self × other`, relinearized and rescaled. The result sits one level
    /// below the lower operand.
    pub fn mult(&self, other: &Ciphertext) -> HeResult<Ciphertext> {
        let inner = self.compute_ct(Arith::Mult, other)?;
        Ok(self.derived(inner, self.ct_label(Arith::Mult, other)))
    }

    /// `self *= other`.
    pub fn mult_in_place(&mut self, other: &Ciphertext) -> HeResult<()> {
        let inner = self.compute_ct(Arith::Mult, other)?;
        let label = self.ct_label(Arith::Mult, other);
        self.replace(inner, label);
        Ok(())
    }

    // Ciphertext ⊗ plaintext

    /// `self + pt`.
    pub fn add_plain(&self, pt: &Plaintext) -> HeResult<Ciphertext> {
        let inner = self.compute_pt(Arith::Add, pt)?;
        Ok(self.derived(inner, self.pt_label(Arith::Add)))
    }

    /// `self += pt`.
    pub fn add_plain_in_place(&mut self, pt: &Plaintext) -> HeResult<()> {
        let inner = self.compute_pt(Arith::Add, pt)?;
        let label = self.pt_label(Arith::Add);
        self.replace(inner, label);
        Ok(())
    }

    /// `self - pt`.
    pub fn sub_plain(&self, pt: &Plaintext) -> HeResult<Ciphertext> {
        let inner = self.compute_pt(Arith::Sub, pt)?;
        Ok(self.derived(inner, self.pt_label(Arith::Sub)))
    }

    /// `self -= pt`.
    pub fn sub_plain_in_place(&mut self, pt: &Plaintext) -> HeResult<()> {
        let inner = self.compute_pt(Arith::Sub, pt)?;
        let label = self.pt_label(Arith::Sub);
        self.replace(inner, label);
        Ok(())
    }

    /// `self × pt`, rescaled.
    pub fn mult_plain(&self, pt: &Plaintext) -> HeResult<Ciphertext> {
        let inner = self.compute_pt(Arith::Mult, pt)?;
        Ok(self.derived(inner, self.pt_label(Arith::Mult)))
    }

    /// `self *= pt`.
    pub fn mult_plain_in_place(&mut self, pt: &Plaintext) -> HeResult<()> {
        let inner = self.compute_pt(Arith::Mult, pt)?;
        let label = self.pt_label(Arith::Mult);
        self.replace(inner, label);
        Ok(())
    }

    // Ciphertext ⊗ scalar. The scalar is broadcast to every slot.

    /// `self + x`.
    pub fn add_f64(&self, x: f64) -> HeResult<Ciphertext> {
        let pt = self.context().create_ptxt_f64(&[x]);
        let inner = self.compute_pt(Arith::Add, &pt)?;
        Ok(self.derived(inner, self.scalar_label(Arith::Add, x)))
    }

    /// `self += x`.
    pub fn add_f64_in_place(&mut self, x: f64) -> HeResult<()> {
        let pt = self.context().create_ptxt_f64(&[x]);
        let inner = self.compute_pt(Arith::Add, &pt)?;
        let label = self.scalar_label(Arith::Add, x);
        self.replace(inner, label);
        Ok(())
    }

    /// `self + x`.
    pub fn add_i64(&self, x: i64) -> HeResult<Ciphertext> {
        let pt = self.context().create_ptxt_i64(&[x]);
        let inner = self.compute_pt(Arith::Add, &pt)?;
        Ok(self.derived(inner, self.scalar_label(Arith::Add, x)))
    }

    /// `self += x`.
    pub fn add_i64_in_place(&mut self, x: i64) -> HeResult<()> {
        let pt = self.context().create_ptxt_i64(&[x]);
        let inner = self.compute_pt(Arith::Add, &pt)?;
        let label = self.scalar_label(Arith::Add, x);
        self.replace(inner, label);
        Ok(())
    }

    /// `self - x`.
    pub fn sub_f64(&self, x: f64) -> HeResult<Ciphertext> {
        let pt = self.context().create_ptxt_f64(&[x]);
        let inner = self.compute_pt(Arith::Sub, &pt)?;
        Ok(self.derived(inner, self.scalar_label(Arith::Sub, x)))
    }

    /// `self -= x`.
    pub fn sub_f64_in_place(&mut self, x: f64) -> HeResult<()> {
        let pt = self.context().create_ptxt_f64(&[x]);
        let inner = self.compute_pt(Arith::Sub, &pt)?;
        let label = self.scalar_label(Arith::Sub, x);
        self.replace(inner, label);
        Ok(())
    }

    /// `self - x`.
    pub fn sub_i64(&self, x: i64) -> HeResult<Ciphertext> {
        let pt = self.context().create_ptxt_i64(&[x]);
        let inner = self.compute_pt(Arith::Sub, &pt)?;
        Ok(self.derived(inner, self.scalar_label(Arith::Sub, x)))
    }

    /// `self -= x`.
    pub fn sub_i64_in_place(&mut self, x: i64) -> HeResult<()> {
        let pt = self.context().create_ptxt_i64(&[x]);
        let inner = self.compute_pt(Arith::Sub, &pt)?;
        let label = self.scalar_label(Arith::Sub, x);
        self.replace(inner, label);
        Ok(())
    }

    /// `self × x`.
    pub fn mult_f64(&self, x: f64) -> HeResult<Ciphertext> {
        let pt = self.context().create_ptxt_f64(&[x]);
        let inner = self.compute_pt(Arith::Mult, &pt)?;
        Ok(self.derived(inner, self.scalar_label(Arith::Mult, x)))
    }

    /// `self *= x`.
    pub fn mult_f64_in_place(&mut self, x: f64) -> HeResult<()> {
        let pt = self.context().create_ptxt_f64(&[x]);
        let inner = self.compute_pt(Arith::Mult, &pt)?;
        let label = self.scalar_label(Arith::Mult, x);
        self.replace(inner, label);
        Ok(())
    }

    /// `self × x`.
    pub fn mult_i64(&self, x: i64) -> HeResult<Ciphertext> {
        let pt = self.context().create_ptxt_i64(&[x]);
        let inner = self.compute_pt(Arith::Mult, &pt)?;
        Ok(self.derived(inner, self.scalar_label(Arith::Mult, x)))
    }

    /// `self *= x`.
    pub fn mult_i64_in_place(&mut self, x: i64) -> HeResult<()> {
        let pt = self.context().create_ptxt_i64(&[x]);
        let inner = self.compute_pt(Arith::Mult, &pt)?;
        let label = self.scalar_label(Arith::Mult, x);
        self.replace(inner, label);
        Ok(())
    }

    // Rotation

    fn compute_rotation(&self, steps: i64) -> HeResult<CoreCiphertext> {
        let engine = self.context().engine();
        let info: OperandInfo = describe(&self.inner);
        let mut out = self.inner.clone();
        engine
            .rotate_inplace(&mut out, steps)
            .map_err(|e| computation_error!("rotate", info, info, e))?;
        self.context().monitor().record(Op::Rotation);
        Ok(out)
    }

    /// Slots shifted left by `steps`; negative steps shift right. Scale and
    /// level are unchanged.
    pub fn rotate(&self, steps: i64) -> HeResult<Ciphertext> {
        let inner = self.compute_rotation(steps)?;
        Ok(self.derived(inner, self.label().to_string()))
    }

    /// In-place [`Ciphertext::rotate`].
    pub fn rot_in_place(&mut self, steps: i64) -> HeResult<()> {
        self.inner = self.compute_rotation(steps)?;
        Ok(())
    }
}
