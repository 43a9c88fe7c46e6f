//! Public error types of the backend.
//!
//! Every failure of `compile_unit` is a [`CompileError`]. Errors are
//! deterministic: compiling the same tree again reproduces them, so nothing
//! here is retried.

use core::fmt;

use ecow::EcoString;
use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::tracker::TrackerError;
use crate::tree::{Node, Span};

/// Why a unit could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum CompileError {
    /// A node kind with no registered transformer.
    #[error("unsupported construct {kind}: `{text}`")]
    #[diagnostic(code(kindle::unsupported), help("this construct cannot be compiled by this backend"))]
    Unsupported {
        kind: &'static str,
        text: String,
        #[label("no transformer for {kind}")]
        span: Span,
    },

    /// A construct that is supported but used where it has no meaning.
    #[error("{message} in {kind}: `{text}`")]
    #[diagnostic(code(kindle::invalid))]
    Invalid {
        message: String,
        kind: &'static str,
        text: String,
        #[label("{message}")]
        span: Span,
    },

    /// Generation bookkeeping was violated; a defect in a transformer.
    #[error("internal generation inconsistency while compiling {kind} `{text}`: {reason}")]
    #[diagnostic(code(kindle::inconsistency))]
    Inconsistency {
        reason: String,
        kind: &'static str,
        text: String,
        #[label("while compiling this {kind}")]
        span: Span,
    },

    /// A routine too large for the target that cannot be split further.
    #[error("routine `{routine}` is estimated at {size} units, over the limit of {limit}, and has no safe split point")]
    #[diagnostic(
        code(kindle::unsplittable),
        help("break the code into smaller functions")
    )]
    Unsplittable {
        routine: EcoString,
        size: usize,
        limit: usize,
    },

    /// A hard limit of the target (slots, argument counts) was exceeded.
    #[error("{message} in {kind}: `{text}`")]
    #[diagnostic(code(kindle::resource))]
    ResourceLimit {
        message: String,
        kind: &'static str,
        text: String,
        #[label("{message}")]
        span: Span,
    },
}

impl CompileError {
    pub fn unsupported(node: &Node<'_>) -> Self {
        CompileError::Unsupported {
            kind: node.tag().name(),
            text: node.text.to_string(),
            span: node.span.clone(),
        }
    }

    pub fn invalid(node: &Node<'_>, message: impl Into<String>) -> Self {
        CompileError::Invalid {
            message: message.into(),
            kind: node.tag().name(),
            text: node.text.to_string(),
            span: node.span.clone(),
        }
    }

    pub fn inconsistency(node: &Node<'_>, reason: impl fmt::Display) -> Self {
        CompileError::Inconsistency {
            reason: reason.to_string(),
            kind: node.tag().name(),
            text: node.text.to_string(),
            span: node.span.clone(),
        }
    }

    pub fn resource(node: &Node<'_>, message: impl Into<String>) -> Self {
        CompileError::ResourceLimit {
            message: message.into(),
            kind: node.tag().name(),
            text: node.text.to_string(),
            span: node.span.clone(),
        }
    }

    /// Attribute a tracker violation to the node being compiled.
    pub fn from_tracker(node: &Node<'_>, error: TrackerError) -> Self {
        match error {
            TrackerError::SlotOverflow => Self::resource(node, error.to_string()),
            _ => Self::inconsistency(node, error),
        }
    }

    /// Source span of the offending node, if the error has one.
    pub fn span(&self) -> Option<&Span> {
        match self {
            CompileError::Unsupported { span, .. }
            | CompileError::Invalid { span, .. }
            | CompileError::Inconsistency { span, .. }
            | CompileError::ResourceLimit { span, .. } => Some(span),
            CompileError::Unsplittable { .. } => None,
        }
    }

    /// Convert to a [`Diagnostic`] for rendering.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            CompileError::Unsupported { .. } => "kindle::unsupported",
            CompileError::Invalid { .. } => "kindle::invalid",
            CompileError::Inconsistency { .. } => "kindle::inconsistency",
            CompileError::Unsplittable { .. } => "kindle::unsplittable",
            CompileError::ResourceLimit { .. } => "kindle::resource",
        };
        let help = match self {
            CompileError::Unsplittable { .. } => vec!["break the code into smaller functions".to_string()],
            _ => Vec::new(),
        };
        Diagnostic {
            severity: Severity::Error,
            message: self.to_string(),
            span: self.span().cloned().unwrap_or_default(),
            help,
            code: Some(code.to_string()),
        }
    }
}

/// Returned by lookups of units that were never compiled, or whose
/// compilation has not finished.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unit `{name}` has not been compiled")]
pub struct NotCompiled {
    pub name: EcoString,
}

/// A diagnostic message with a source location, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    /// Suggestions on how to fix the issue.
    pub help: Vec<String>,
    /// Error code (e.g. `kindle::unsupported`).
    pub code: Option<String>,
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}
