//! Public API of the backend.
//!
//! A [`Compiler`] turns a parsed source tree into a [`CompiledUnit`]:
//! the tree is linearized into routines, every literal name lands in the
//! unit's key table, oversized routines are split, and the result is cached
//! under the unit's fully-qualified name.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use bumpalo::Bump;
//! use kindle_core::api::{Compiler, CompilerOptions};
//! use kindle_core::cache::UnitCache;
//! use kindle_core::tree::TreeBuilder;
//!
//! let arena = Bump::new();
//! let t = TreeBuilder::new(&arena);
//! let script = t.alloc(t.script(vec![t.expr_stmt(t.assign(t.ident("x"), t.int(1)))]));
//!
//! let compiler = Compiler::with_cache(CompilerOptions::default(), Arc::new(UnitCache::new()));
//! assert!(compiler.lookup_compiled_unit("docs.assign").is_err());
//!
//! let unit = compiler.compile_unit("docs.assign", script).unwrap();
//! assert!(unit.routine("_init_keys").is_some());
//! ```
//!
//! [`CompiledUnit`]: crate::unit::CompiledUnit

pub mod compiler;
pub mod error;
pub mod options;


pub use compiler::Compiler;
pub use error::{CompileError, Diagnostic, NotCompiled, Severity};
pub use options::{CompilerOptions, ExecutionOptions};
