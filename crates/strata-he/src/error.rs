//! Error type for the orchestration layer.

use std::fmt;

use strata_core::CkksError;
use thiserror::Error;

/// Result alias used throughout `strata-he`.
pub type HeResult<T> = Result<T, HeError>;

/// Which key an operation needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Public key, required for encryption.
    Public,
    /// Secret key, required for decryption.
    Secret,
    /// Relinearization key, required for ciphertext multiplication.
    Relin,
    /// Rotation key for the given step.
    Rotation(i64),
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Public => write!(f, "public key"),
            KeyKind::Secret => write!(f, "secret key"),
            KeyKind::Relin => write!(f, "relinearization key"),
            KeyKind::Rotation(step) => write!(f, "rotation key for step {step}"),
        }
    }
}

/// Scale and level of one operand, carried in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperandInfo {
    /// Operand scale.
    pub scale: f64,
    /// Operand chain index.
    pub level: usize,
}

impl fmt::Display for OperandInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scale 2^{:.4} level {}", self.scale.log2(), self.level)
    }
}

/// Failures surfaced to callers of the handle API.
#[derive(Debug, Error)]
pub enum HeError {
    /// An operation needed key material that has not been created or loaded.
    #[error("missing {0}")]
    MissingKey(KeyKind),

    /// Operands belong to different contexts.
    #[error("context mismatch: operand from context {rhs} used with context {lhs}")]
    ContextMismatch {
        /// Context id of the receiver.
        lhs: u64,
        /// Context id of the other operand.
        rhs: u64,
    },

    /// The API was used in a way it does not support.
    #[error("misuse: {0}")]
    Misuse(String),

    /// Alignment would need a rescale but the operand is already at level 0.
    #[error("out of levels: {op} needs a rescale below level 0 ({operand})")]
    OutOfLevels {
        /// Operation being prepared.
        op: &'static str,
        /// Operand that ran out of levels.
        operand: OperandInfo,
    },

    /// A primitive failed; carries both operands' metadata.
    #[error("{op} failed ({lhs} | {rhs}): {source}")]
    OperationFailed {
        /// Failing operation.
        op: &'static str,
        /// Left operand before the operation.
        lhs: OperandInfo,
        /// Right operand before the operation.
        rhs: OperandInfo,
        /// Underlying failure.
        #[source]
        source: Box<HeError>,
    },

    /// Native engine failure.
    #[error(transparent)]
    Core(#[from] CkksError),

    /// Configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backend name not recognized.
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Filesystem failure during key or config persistence.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed JSON configuration.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HeError {
    /// The error at the bottom of any `OperationFailed` wrapping.
    pub fn innermost(&self) -> &HeError {
        let mut err = self;
        while let HeError::OperationFailed { source, .. } = err {
            err = &**source;
        }
        err
    }
}
