//! Error type for the native CKKS primitives.

use thiserror::Error;

/// Result alias used throughout `strata-core`.
pub type CkksResult<T> = Result<T, CkksError>;

/// Failures raised by parameter setup, encoding and ciphertext primitives.
#[derive(Debug, Error)]
pub enum CkksError {
    /// Parameter set cannot be constructed.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Input vector does not fit in the available slots.
    #[error("input length {len} exceeds slot count {slots}")]
    TooManyValues {
        /// Number of values supplied.
        len: usize,
        /// Slots available in one plaintext.
        slots: usize,
    },

    /// The requested scale does not fit under the modulus at this level.
    #[error("scale out of bounds: log2(scale)={scale_bits:.2} with {modulus_bits} modulus bits at level {level}")]
    ScaleOutOfBounds {
        /// log2 of the requested scale.
        scale_bits: f64,
        /// Total bit size of the data primes at `level`.
        modulus_bits: u32,
        /// Chain index the value was encoded for.
        level: usize,
    },

    /// Two operands sit at different chain indices.
    #[error("level mismatch: {lhs} vs {rhs}")]
    LevelMismatch {
        /// Level of the left operand.
        lhs: usize,
        /// Level of the right operand.
        rhs: usize,
    },

    /// Two operands carry different scales.
    #[error("scale mismatch: {lhs} vs {rhs}")]
    ScaleMismatch {
        /// Scale of the left operand.
        lhs: f64,
        /// Scale of the right operand.
        rhs: f64,
    },

    /// Rescale or modulus switch would go below level 0, or above the current level.
    #[error("cannot move from level {from} to level {to}")]
    InvalidLevel {
        /// Current level.
        from: usize,
        /// Requested level.
        to: usize,
    },

    /// Ciphertext has the wrong number of components for the operation.
    #[error("ciphertext size {size} not supported by {op}")]
    InvalidCiphertextSize {
        /// Number of polynomial components.
        size: usize,
        /// Operation that rejected it.
        op: &'static str,
    },

    /// Galois element is not an odd residue modulo 2N.
    #[error("invalid galois element {0}")]
    InvalidGaloisElement(usize),

    /// No key-switching key for the requested galois element.
    #[error("no galois key for element {0}")]
    MissingGaloisKey(usize),

    /// Byte input is malformed.
    #[error("deserialization failed: {0}")]
    Deserialize(String),
}
