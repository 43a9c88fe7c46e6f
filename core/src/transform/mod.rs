//! Transformer dispatch: linearizes a source tree into routines.
//!
//! Each node kind maps to exactly one [`Transformer`] in a
//! [`TransformerRegistry`]. A transformer turns its node into a sequence of
//! operations, recursing into children through [`Generator::transform`]. The
//! generator owns everything that is per unit (key table, finished routines)
//! and per routine (tracker, finally blocks), so handlers stay stateless and a
//! registry can be shared by every unit a compiler builds.

mod expression;
mod function;
mod generator;
mod literal;
mod root;
mod statement;

#[cfg(test)]
mod statement_test;

pub use function::FUNCTION_ROUTINE_PREFIX;
pub use generator::{FinallyFrame, GeneratedUnit, Generator, RoutineSpec};
pub use root::{INVOKE_ROUTINE, PSEUDO_CONSTRUCTOR_ROUTINE};

use hashbrown::HashMap;

use crate::api::CompileError;
use crate::ops::Operation;
use crate::tree::{Node, NodeTag};

/// Evaluation mode handed down from parent to child.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TransformerContext {
    #[default]
    Normal,
    /// Null-safe evaluation: unknown names and null receivers yield null
    /// instead of raising (left side of `?:`).
    Safe,
}

impl TransformerContext {
    pub fn is_safe(self) -> bool {
        self == TransformerContext::Safe
    }
}

/// Emits the operations of one node kind.
pub trait Transformer: Send + Sync {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError>;
}

/// Node kind to handler table.
#[derive(Default)]
pub struct TransformerRegistry {
    handlers: HashMap<NodeTag, Box<dyn Transformer>>,
}

impl TransformerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with a handler for every kind the backend compiles.
    pub fn standard() -> Self {
        use expression::*;
        use function::*;
        use literal::*;
        use root::*;
        use statement::*;

        let mut registry = Self::empty();
        for tag in [
            NodeTag::Null,
            NodeTag::Boolean,
            NodeTag::Integer,
            NodeTag::Decimal,
            NodeTag::String,
        ] {
            registry.register(tag, LiteralTransformer);
        }
        registry.register(NodeTag::Interpolation, InterpolationTransformer);
        registry.register(NodeTag::Array, ArrayTransformer);
        registry.register(NodeTag::Struct, StructTransformer);

        registry.register(NodeTag::Identifier, IdentifierTransformer);
        registry.register(NodeTag::Binary, BinaryTransformer);
        registry.register(NodeTag::Unary, UnaryTransformer);
        registry.register(NodeTag::Ternary, TernaryTransformer);
        registry.register(NodeTag::Assignment, AssignmentTransformer);
        registry.register(NodeTag::DotAccess, AccessTransformer);
        registry.register(NodeTag::IndexAccess, AccessTransformer);
        registry.register(NodeTag::FunctionCall, InvocationTransformer);
        registry.register(NodeTag::MethodCall, InvocationTransformer);
        registry.register(NodeTag::New, InvocationTransformer);

        registry.register(NodeTag::Closure, ClosureTransformer);
        registry.register(NodeTag::Lambda, ClosureTransformer);
        registry.register(NodeTag::FunctionDeclaration, FunctionDeclarationTransformer);

        registry.register(NodeTag::ExpressionStatement, ExpressionStatementTransformer);
        registry.register(NodeTag::Block, BlockTransformer);
        registry.register(NodeTag::If, IfTransformer);
        registry.register(NodeTag::While, WhileTransformer);
        registry.register(NodeTag::ForIn, ForInTransformer);
        registry.register(NodeTag::Break, JumpTransformer);
        registry.register(NodeTag::Continue, JumpTransformer);
        registry.register(NodeTag::Return, ReturnTransformer);
        registry.register(NodeTag::Throw, ThrowTransformer);
        registry.register(NodeTag::Try, TryTransformer);

        registry.register(NodeTag::Script, ScriptTransformer);
        registry.register(NodeTag::Class, ClassTransformer);
        registry
    }

    /// Install `handler` for `tag`, replacing any previous one.
    pub fn register(&mut self, tag: NodeTag, handler: impl Transformer + 'static) {
        self.handlers.insert(tag, Box::new(handler));
    }

    pub fn get(&self, tag: NodeTag) -> Option<&dyn Transformer> {
        self.handlers.get(&tag).map(|h| h.as_ref())
    }

    pub fn supports(&self, tag: NodeTag) -> bool {
        self.handlers.contains_key(&tag)
    }
}

impl core::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut tags: Vec<_> = self.handlers.keys().collect();
        tags.sort();
        f.debug_struct("TransformerRegistry").field("kinds", &tags).finish()
    }
}
