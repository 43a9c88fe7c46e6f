//! Configuration options for the backend.

use crate::ops::BYTECODE_SIZE_LIMIT;

/// Configuration options for compilation.
///
/// # Example
///
/// ```
/// use kindle_core::api::CompilerOptions;
///
/// let options = CompilerOptions {
///     size_limit: 20_000,
///     ..CompilerOptions::default()
/// };
/// assert!(!options.positions);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Estimated size at which a routine is split.
    ///
    /// Default: 55 000, below the 65 535-byte ceiling of a target method
    /// body so estimation slack never reaches the hard limit.
    pub size_limit: usize,

    /// Emit a `Position` marker with the source offset of every statement.
    ///
    /// Default: false
    pub positions: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            size_limit: BYTECODE_SIZE_LIMIT,
            positions: false,
        }
    }
}

/// Configuration options for running compiled routines.
///
/// # Example
///
/// ```
/// use kindle_core::api::ExecutionOptions;
///
/// let options = ExecutionOptions {
///     max_depth: 200,
///     max_steps: Some(1_000_000),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Maximum routine call depth (for recursion protection).
    ///
    /// Default: 1000
    pub max_depth: usize,

    /// Maximum number of operations a single top-level call may execute.
    ///
    /// Set to `None` for no limit (be careful with untrusted code!).
    ///
    /// Default: None
    pub max_steps: Option<u64>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_depth: 1000,
            max_steps: None,
        }
    }
}
