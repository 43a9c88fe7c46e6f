//! Kindle - a code-generation backend for dynamically-typed scripts
//!
//! # Overview
//!
//! Kindle takes the parsed tree of a script or class and produces a
//! [`CompiledUnit`]: a set of stack-machine routines sized for an execution
//! target with a hard per-routine limit. Large routines are split into
//! chained segments that emulate `return` across routine boundaries with
//! flow signals, so the split unit behaves exactly like the unsplit one.
//!
//! # Quick Start
//!
//! ```
//! use kindle::{Bump, Compiler, CompilerOptions, ExecutionOptions, Machine};
//! use kindle::tree::TreeBuilder;
//! use std::sync::Arc;
//!
//! let arena = Bump::new();
//! let t = TreeBuilder::new(&arena);
//! let script = t.alloc(t.script(vec![t.ret(Some(t.int(42)))]));
//!
//! let compiler = Compiler::new(CompilerOptions::default());
//! let unit = compiler.compile_unit("quickstart.answer", script).unwrap();
//! assert_eq!(unit.metadata.entry, "_invoke");
//!
//! // Units can be run against any runtime implementing `Host`.
//! let machine = Machine::new(unit, ExecutionOptions::default()).unwrap();
//! assert_eq!(machine.unit().routines.len(), 2);
//! ```
//!
//! # Errors
//!
//! Compilation fails with a [`CompileError`]. [`render_error_to_string`]
//! renders one against the unit's source text, [`to_report`] wraps it in a
//! `miette` report.

mod error_renderer;

pub use error_renderer::{
    render_error, render_error_to, render_error_to_string, render_error_to_string_no_color, to_report,
};

// Re-export public API from kindle_core
pub use kindle_core::api::{
    CompileError, Compiler, CompilerOptions, Diagnostic, ExecutionOptions, NotCompiled, Severity,
};
pub use kindle_core::cache::UnitCache;
pub use kindle_core::unit::{CompiledUnit, Routine, UnitKind};
pub use kindle_core::vm::{ExecutionError, FlowSignal, Host, Invoker, Machine, Value};
pub use kindle_core::{ops, tree};

// Trees are allocated in this arena type.
pub use bumpalo::Bump;
