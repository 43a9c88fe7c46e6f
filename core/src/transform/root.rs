use super::{Generator, RoutineSpec, Transformer, TransformerContext};
use crate::api::CompileError;
use crate::ops::Operation;
use crate::tree::{Node, NodeKind, NodeTag};
use crate::unit::{Origin, ReturnKind, UnitKind};

/// Entry routine of a script unit.
pub const INVOKE_ROUTINE: &str = "_invoke";
/// Entry routine of a class unit; runs the class body against a new instance.
pub const PSEUDO_CONSTRUCTOR_ROUTINE: &str = "_pseudo_constructor";

pub(super) struct ScriptTransformer;

impl Transformer for ScriptTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        if generator.in_routine() {
            return Err(CompileError::invalid(node, "a script cannot be nested"));
        }
        let spec = RoutineSpec::with_context(INVOKE_ROUTINE, ReturnKind::Value, Origin::Body);
        generator.compile_routine(spec, |generator| hoisted(generator, node))?;
        generator.set_entry(UnitKind::Script, INVOKE_ROUTINE);
        Ok(Vec::new())
    }
}

pub(super) struct ClassTransformer;

impl Transformer for ClassTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        if generator.in_routine() || !matches!(node.kind, NodeKind::Class { .. }) {
            return Err(CompileError::invalid(node, "a class cannot be nested"));
        }
        let spec = RoutineSpec::method(PSEUDO_CONSTRUCTOR_ROUTINE, ReturnKind::Void, Origin::Body);
        generator.compile_routine(spec, |generator| {
            let previous = generator.set_declaring_methods(true);
            let generated = hoisted(generator, node);
            generator.set_declaring_methods(previous);
            generated
        })?;
        generator.set_entry(UnitKind::Class, PSEUDO_CONSTRUCTOR_ROUTINE);
        Ok(Vec::new())
    }
}

/// Function declarations first, then everything else in source order.
///
/// Only the declarations see `declaring_methods`; it is cleared for the rest
/// of the body so closures and nested functions stay static.
fn hoisted<'a>(generator: &mut Generator<'_, 'a>, root: &'a Node<'a>) -> Result<Vec<Operation>, CompileError> {
    let (declarations, rest): (Vec<&'a Node<'a>>, Vec<&'a Node<'a>>) = root
        .children
        .iter()
        .partition(|child| child.tag() == NodeTag::FunctionDeclaration);
    let mut ops = Vec::new();
    generator.statements(&mut ops, declarations)?;
    let methods = generator.set_declaring_methods(false);
    let generated = generator.statements(&mut ops, rest);
    generator.set_declaring_methods(methods);
    generated?;
    Ok(ops)
}
