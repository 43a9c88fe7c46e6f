//! Code-generation backend for a dynamically-typed scripting language.
//!
//! A parsed source unit (a script or a class, see [`tree`]) is linearized
//! into routines of a stack-machine instruction set ([`ops`]), every literal
//! name is interned into a per-unit key table ([`keys`]), routines that
//! exceed the target's size limit are split ([`splitter`]), and the finished
//! [`unit::CompiledUnit`] is published through a shared [`cache`]. The [`vm`]
//! module runs compiled units against a host runtime.

pub mod api;
pub mod cache;
pub mod keys;
pub mod ops;
pub mod splitter;
pub mod tracker;
pub mod transform;
pub mod tree;
pub mod unit;
pub mod vm;

pub use api::{CompileError, Compiler, CompilerOptions, ExecutionOptions, NotCompiled};
pub use unit::CompiledUnit;
