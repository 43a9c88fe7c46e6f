//! Errors raised while running compiled routines.
//!
//! Only [`ExecutionError::Thrown`] takes part in exception handling: it is
//! what `throw` raises and what try/catch entries intercept. Everything else
//! describes a malformed unit or an exhausted resource and always propagates
//! to the outermost caller.

use ecow::EcoString;
use thiserror::Error;

use super::Value;
use crate::ops::Label;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    /// A thrown language exception.
    #[error("uncaught exception: {0}")]
    Thrown(Value),

    #[error("unknown routine `{name}`")]
    UnknownRoutine { name: EcoString },

    #[error("routine `{routine}` expects {expected} arguments, got {actual}")]
    ArgumentCount {
        routine: EcoString,
        expected: u16,
        actual: usize,
    },

    #[error("call stack overflow: depth {depth} exceeds maximum of {max_depth}")]
    StackOverflow { depth: usize, max_depth: usize },

    #[error("step limit of {limit} operations exceeded")]
    StepLimit { limit: u64 },

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("integer overflow in `{routine}`")]
    IntegerOverflow { routine: EcoString },

    #[error("index {index} out of bounds (length: {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("evaluation stack underflow in `{routine}`")]
    StackUnderflow { routine: EcoString },

    #[error("slot {slot} is outside the locals of `{routine}`")]
    UnknownSlot { routine: EcoString, slot: u16 },

    #[error("label {label} is not defined in `{routine}`")]
    UnknownLabel { routine: EcoString, label: Label },

    #[error("key index {index} is outside the key table")]
    UnknownKey { index: u32 },

    #[error("`{routine}` ran past its last operation")]
    FellOffEnd { routine: EcoString },

    #[error("cannot execute opaque operation `{mnemonic}`")]
    Unsupported { mnemonic: EcoString },

    /// A failure reported by the host runtime.
    #[error("{0}")]
    Host(String),
}

impl ExecutionError {
    pub fn type_mismatch(expected: &'static str, found: &Value) -> Self {
        ExecutionError::TypeMismatch {
            expected,
            found: found.type_name(),
        }
    }

    /// Whether a try/catch entry may intercept this error.
    pub fn is_catchable(&self) -> bool {
        matches!(self, ExecutionError::Thrown(_))
    }
}
