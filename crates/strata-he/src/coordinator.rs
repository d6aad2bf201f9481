//! Scale and level reconciliation before a binary primitive.
//!
//! [`plan`] is pure: given the scale and level of both operands and the chain's
//! primes it returns the corrections to apply, in order.
//!
//! 1. Levels differ: the fresher operand is modulus-switched down to the other's
//!    level. Scales are untouched.
//! 2. Scales still differ beyond [`scales_close`]: the smaller-scale side at
//!    level ℓ is multiplied by an encoded constant `1` at scale
//!    `larger · q_ℓ / smaller` and rescaled, landing on the larger scale at
//!    ℓ − 1. The other side is modulus-switched to ℓ − 1 to follow.
//!
//! Multiplication does not need equal scales, so it only takes step 1 (see
//! [`plan_levels`]). Every path terminates after at most three corrections.
//! [`execute`] runs a plan against the engine; a failure is logged with both
//! operands' metadata and re-raised.

use std::borrow::Cow;

use strata_core::ciphertext::scales_close;
use strata_core::Ciphertext as CoreCiphertext;
use tracing::debug;

use crate::engine::HeEngine;
use crate::error::{HeError, HeResult, OperandInfo};
use crate::monitor::{Monitor, Op};

/// Which operand a correction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The receiver.
    Lhs,
    /// The argument.
    Rhs,
}

/// One corrective step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Drop primes down to `level`.
    ModSwitch {
        /// Operand to switch.
        side: Side,
        /// Target chain index.
        level: usize,
    },
    /// Multiply by `1` encoded at `compensator_scale`, then rescale.
    Compensate {
        /// Operand with the smaller scale.
        side: Side,
        /// Scale of the encoded constant.
        compensator_scale: f64,
    },
}

/// How far two operands must agree before a primitive runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Same level and same scale (addition, subtraction).
    Full,
    /// Same level only (multiplication).
    LevelOnly,
}

/// Corrections plus the aligned metadata they produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Steps in execution order.
    pub corrections: Vec<Correction>,
    /// Level both operands share afterwards, with the shared scale. A
    /// level-only plan keeps the receiver's scale here.
    pub aligned: OperandInfo,
}

impl Plan {
    /// Whether the operands were already aligned.
    pub fn is_noop(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Bring both operands to the lower of their two levels. Scales are left alone.
pub fn plan_levels(lhs: OperandInfo, rhs: OperandInfo) -> Plan {
    let mut corrections = Vec::new();
    let level = lhs.level.min(rhs.level);
    if lhs.level != rhs.level {
        let side = if lhs.level > rhs.level { Side::Lhs } else { Side::Rhs };
        corrections.push(Correction::ModSwitch { side, level });
    }
    Plan {
        corrections,
        aligned: OperandInfo {
            scale: lhs.scale,
            level,
        },
    }
}

/// Decide how to align `lhs` and `rhs`. `prime_at(ℓ)` is the prime a rescale
/// at level ℓ divides by.
pub fn plan(
    op: &'static str,
    lhs: OperandInfo,
    rhs: OperandInfo,
    prime_at: impl Fn(usize) -> Option<u64>,
) -> HeResult<Plan> {
    let Plan {
        mut corrections,
        aligned: OperandInfo { level, .. },
    } = plan_levels(lhs, rhs);

    if scales_close(lhs.scale, rhs.scale) {
        return Ok(Plan {
            corrections,
            aligned: OperandInfo {
                scale: lhs.scale,
                level,
            },
        });
    }

    let (smaller_side, smaller, larger) = if lhs.scale < rhs.scale {
        (Side::Lhs, lhs.scale, rhs.scale)
    } else {
        (Side::Rhs, rhs.scale, lhs.scale)
    };
    if level == 0 {
        return Err(HeError::OutOfLevels {
            op,
            operand: OperandInfo {
                scale: smaller,
                level,
            },
        });
    }
    let q = prime_at(level).ok_or_else(|| {
        HeError::Misuse(format!("no prime at level {level} while aligning {op}"))
    })? as f64;

    let compensator_scale = larger * q / smaller;
    let other = match smaller_side {
        Side::Lhs => Side::Rhs,
        Side::Rhs => Side::Lhs,
    };
    corrections.push(Correction::Compensate {
        side: smaller_side,
        compensator_scale,
    });
    corrections.push(Correction::ModSwitch {
        side: other,
        level: level - 1,
    });

    Ok(Plan {
        corrections,
        aligned: OperandInfo {
            scale: larger,
            level: level - 1,
        },
    })
}

/// Scale and level of a native ciphertext.
pub fn describe(ct: &CoreCiphertext) -> OperandInfo {
    OperandInfo {
        scale: ct.scale,
        level: ct.level(),
    }
}

/// Log a failed computation with both operands' metadata and wrap the error.
macro_rules! computation_error {
    ($op:expr, $lhs:expr, $rhs:expr, $err:expr) => {{
        let (op, lhs, rhs, err): (&'static str, $crate::error::OperandInfo, $crate::error::OperandInfo, $crate::error::HeError) =
            ($op, $lhs, $rhs, $err);
        ::tracing::error!(
            op,
            lhs_scale_bits = lhs.scale.log2(),
            lhs_level = lhs.level,
            rhs_scale_bits = rhs.scale.log2(),
            rhs_level = rhs.level,
            file = file!(),
            line = line!(),
            error = %err,
            "computation failed"
        );
        $crate::error::HeError::OperationFailed {
            op,
            lhs,
            rhs,
            source: Box::new(err),
        }
    }};
}
pub(crate) use computation_error;

fn apply_compensation<E: HeEngine + ?Sized>(
    engine: &E,
    monitor: &Monitor,
    ct: &mut CoreCiphertext,
    compensator_scale: f64,
) -> HeResult<()> {
    let one = engine.encode(&[1.0], compensator_scale, ct.level())?;
    engine.multiply_plain_inplace(ct, &one)?;
    monitor.record(Op::CtxtPtxtMultiplication);
    engine.relinearize_inplace(ct)?;
    engine.rescale_to_next_inplace(ct)
}

fn run<E: HeEngine + ?Sized>(
    engine: &E,
    monitor: &Monitor,
    plan: &Plan,
    lhs: &mut CoreCiphertext,
    rhs: &mut Cow<'_, CoreCiphertext>,
) -> HeResult<()> {
    for step in &plan.corrections {
        match *step {
            Correction::ModSwitch { side: Side::Lhs, level } => engine.mod_switch_to_inplace(lhs, level)?,
            Correction::ModSwitch { side: Side::Rhs, level } => {
                engine.mod_switch_to_inplace(rhs.to_mut(), level)?
            }
            Correction::Compensate {
                side: Side::Lhs,
                compensator_scale,
            } => apply_compensation(engine, monitor, lhs, compensator_scale)?,
            Correction::Compensate {
                side: Side::Rhs,
                compensator_scale,
            } => apply_compensation(engine, monitor, rhs.to_mut(), compensator_scale)?,
        }
    }
    Ok(())
}

/// Align `lhs` in place and return `rhs` aligned, borrowing it when untouched.
/// Compensating plaintext multiplications are recorded in `monitor`.
pub fn execute<'a, E: HeEngine + ?Sized>(
    engine: &E,
    monitor: &Monitor,
    op: &'static str,
    alignment: Alignment,
    lhs: &mut CoreCiphertext,
    rhs: &'a CoreCiphertext,
) -> HeResult<Cow<'a, CoreCiphertext>> {
    let before = (describe(lhs), describe(rhs));
    let plan = match alignment {
        Alignment::Full => plan(op, before.0, before.1, |l| engine.prime_at(l))
            .map_err(|e| computation_error!(op, before.0, before.1, e))?,
        Alignment::LevelOnly => plan_levels(before.0, before.1),
    };
    let mut rhs = Cow::Borrowed(rhs);
    if plan.is_noop() {
        return Ok(rhs);
    }
    debug!(op, corrections = ?plan.corrections, "aligning operands");
    run(engine, monitor, &plan, lhs, &mut rhs).map_err(|e| computation_error!(op, before.0, before.1, e))?;
    Ok(rhs)
}
