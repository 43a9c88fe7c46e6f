//! The backend entry point.

use core::iter;
use std::sync::Arc;

use tracing::{debug, trace};

use super::{CompileError, CompilerOptions, NotCompiled};
use crate::cache::UnitCache;
use crate::splitter::RoutineSplitter;
use crate::transform::{Generator, TransformerRegistry};
use crate::tree::Node;
use crate::unit::{CompiledUnit, UnitMetadata};

/// Compiles source trees into [`CompiledUnit`]s.
///
/// A compiler owns one transformer registry and one splitter, shared by
/// every unit it builds, and publishes finished units through a
/// [`UnitCache`] (the process-wide one unless another is supplied).
///
/// # Example
///
/// ```
/// use bumpalo::Bump;
/// use kindle_core::api::{Compiler, CompilerOptions};
/// use kindle_core::tree::TreeBuilder;
///
/// let arena = Bump::new();
/// let t = TreeBuilder::new(&arena);
/// let script = t.alloc(t.script(vec![t.ret(Some(t.int(42)))]));
///
/// let compiler = Compiler::new(CompilerOptions::default());
/// let unit = compiler.compile_unit("docs.answer", script).unwrap();
/// assert_eq!(unit.metadata.entry, "_invoke");
/// assert!(compiler.lookup_compiled_unit("docs.answer").is_ok());
/// ```
pub struct Compiler {
    options: CompilerOptions,
    registry: TransformerRegistry,
    splitter: RoutineSplitter,
    cache: Arc<UnitCache>,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self::with_cache(options, UnitCache::global())
    }

    /// Create a compiler publishing into `cache` instead of the global one.
    pub fn with_cache(options: CompilerOptions, cache: Arc<UnitCache>) -> Self {
        Self {
            splitter: RoutineSplitter::new(options.size_limit),
            registry: TransformerRegistry::standard(),
            options,
            cache,
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn cache(&self) -> &UnitCache {
        &self.cache
    }

    /// Compile the unit `name` unless it is already cached.
    ///
    /// Concurrent calls for the same name may both compile; all of them
    /// return the unit that was cached first.
    pub fn compile_unit<'a>(&self, name: &str, root: &'a Node<'a>) -> Result<Arc<CompiledUnit>, CompileError> {
        self.cache.get_or_create(name, || self.transpile(name, root))
    }

    /// Compile `root` without consulting or filling the cache.
    ///
    /// Appends the key initialization routine and splits every routine that
    /// exceeds the size limit.
    pub fn transpile<'a>(&self, name: &str, root: &'a Node<'a>) -> Result<CompiledUnit, CompileError> {
        let generated = Generator::new(&self.registry, name)
            .with_positions(self.options.positions)
            .generate(root)?;

        let init_keys = generated.keys.init_routine();
        let mut routines = Vec::with_capacity(generated.routines.len() + 1);
        let mut splits = Vec::new();
        for routine in generated.routines.into_iter().chain(iter::once(init_keys)) {
            trace!(routine = %routine.name, size = routine.estimated_size(), "estimated routine size");
            let parent = routine.name.clone();
            let mut produced = self.splitter.process_routine(routine)?;
            if produced.len() > 1 {
                splits.push((parent, produced[1..].iter().map(|r| r.name.clone()).collect()));
            }
            routines.append(&mut produced);
        }

        debug!(
            unit = name,
            routines = routines.len(),
            keys = generated.keys.len(),
            split = splits.len(),
            "produced compiled unit"
        );
        Ok(CompiledUnit {
            name: name.into(),
            routines,
            keys: generated.keys,
            metadata: UnitMetadata {
                kind: generated.kind,
                entry: generated.entry,
                splits,
            },
        })
    }

    /// The cached unit `name`, if its compilation has finished.
    pub fn lookup_compiled_unit(&self, name: &str) -> Result<Arc<CompiledUnit>, NotCompiled> {
        self.cache.lookup(name)
    }
}
