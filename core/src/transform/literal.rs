use super::{Generator, Transformer, TransformerContext};
use crate::api::CompileError;
use crate::ops::{Constant, Intrinsic, Operation, RuntimeFn};
use crate::tree::{Node, NodeKind};

/// Scalar literals.
pub(super) struct LiteralTransformer;

impl Transformer for LiteralTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let constant = match &node.kind {
            NodeKind::Null => Constant::Null,
            NodeKind::Boolean(b) => Constant::Bool(*b),
            NodeKind::Integer(i) => Constant::Int(*i),
            NodeKind::Decimal(x) => Constant::Float(*x),
            NodeKind::String(s) => Constant::Str((*s).into()),
            _ => return Err(CompileError::unsupported(node)),
        };
        let mut ops = Vec::with_capacity(1);
        generator.emit(&mut ops, Operation::Push(constant))?;
        Ok(ops)
    }
}

/// `"a #b# c"`: the parts are concatenated at runtime.
pub(super) struct InterpolationTransformer;

impl Transformer for InterpolationTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let mut ops = Vec::new();
        generator.value_array(&mut ops, node.children, cx)?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::Concat))?;
        Ok(ops)
    }
}

pub(super) struct ArrayTransformer;

impl Transformer for ArrayTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let mut ops = Vec::new();
        generator.value_array(&mut ops, node.children, cx)?;
        Ok(ops)
    }
}

/// `{ key: value, ... }`. Names and literal keys go through the key table;
/// computed keys are converted at runtime.
pub(super) struct StructTransformer;

impl Transformer for StructTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        if node.children.len() % 2 != 0 {
            return Err(CompileError::invalid(node, "struct literal has a key without a value"));
        }
        let positions: Vec<usize> = (0..node.children.len()).collect();
        let mut ops = Vec::new();
        generator.build_array(&mut ops, &positions, |generator, ops, &position| {
            let entry = &node.children[position];
            if position % 2 == 0 {
                push_struct_key(generator, ops, entry, cx)
            } else {
                ops.extend(generator.transform(entry, cx)?);
                Ok(())
            }
        })?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::StructOf))?;
        Ok(ops)
    }
}

/// Push a struct literal key. A bare identifier names the member.
fn push_struct_key<'a>(
    generator: &mut Generator<'_, 'a>,
    ops: &mut Vec<Operation>,
    key: &'a Node<'a>,
    cx: TransformerContext,
) -> Result<(), CompileError> {
    match &key.kind {
        NodeKind::Identifier(name) => generator.push_key(ops, *name),
        _ => push_member_key(generator, ops, key, cx),
    }
}

/// Push the key an index expression addresses. Only string and integer
/// literals are interned; anything else, identifiers included, is evaluated
/// and converted at runtime.
pub(super) fn push_member_key<'a>(
    generator: &mut Generator<'_, 'a>,
    ops: &mut Vec<Operation>,
    key: &'a Node<'a>,
    cx: TransformerContext,
) -> Result<(), CompileError> {
    match &key.kind {
        NodeKind::String(name) => generator.push_key(ops, *name),
        NodeKind::Integer(i) => generator.push_key(ops, *i),
        _ => {
            ops.extend(generator.transform(key, cx)?);
            generator.emit(ops, Operation::intrinsic(Intrinsic::KeyOf))
        }
    }
}
