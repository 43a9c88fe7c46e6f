use ecow::{EcoString, eco_format};

use super::{Generator, RoutineSpec, Transformer, TransformerContext};
use crate::api::CompileError;
use crate::ops::{Constant, Intrinsic, Operation, RuntimeFn};
use crate::tree::{Node, NodeKind, NodeTag};
use crate::unit::{Origin, ReturnKind};

/// Routines compiled from declared functions are named `fn_<name>`. Every
/// other generated routine starts with `_`, so the two never collide.
pub const FUNCTION_ROUTINE_PREFIX: &str = "fn_";

/// `function name(args) { ... }`: compiles the body into its own routine and
/// registers it under `name` in the active context.
pub(super) struct FunctionDeclarationTransformer;

impl Transformer for FunctionDeclarationTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let NodeKind::FunctionDeclaration { name } = node.kind else {
            return Err(CompileError::unsupported(node));
        };
        let (params, body) = split_signature(node)?;
        if body.tag() != NodeTag::Block {
            return Err(CompileError::invalid(node, "function body must be a block"));
        }

        let mangled = eco_format!("{FUNCTION_ROUTINE_PREFIX}{name}");
        let spec = if generator.declaring_methods() {
            RoutineSpec::method(mangled, ReturnKind::Value, Origin::Function)
        } else {
            RoutineSpec::with_context(mangled, ReturnKind::Value, Origin::Function)
        };
        let routine = spec.name.clone();
        let previous = generator.set_declaring_methods(false);
        let compiled = generator.compile_routine(spec, |generator| {
            let mut ops = Vec::new();
            generator.statements(&mut ops, body.children)?;
            Ok(ops)
        });
        generator.set_declaring_methods(previous);
        compiled?;

        let mut ops = Vec::new();
        generator.load_context(&mut ops)?;
        generator.push_key(&mut ops, name)?;
        generator.emit(&mut ops, Operation::intrinsic(Intrinsic::RoutineRef(routine)))?;
        descriptors(generator, &mut ops, params)?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::RegisterFunction))?;
        generator.emit(&mut ops, Operation::Pop)?;
        Ok(ops)
    }
}

/// Closures (`function(args) { ... }`) and lambdas (`(args) -> expr`).
pub(super) struct ClosureTransformer;

impl Transformer for ClosureTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let lambda = match node.kind {
            NodeKind::Closure => false,
            NodeKind::Lambda => true,
            _ => return Err(CompileError::unsupported(node)),
        };
        let (params, body) = split_signature(node)?;
        let name = generator.next_closure_name(lambda);
        let origin = if lambda { Origin::Lambda } else { Origin::Closure };
        let previous = generator.set_declaring_methods(false);
        let compiled = generator.compile_routine(
            RoutineSpec::with_context(name.clone(), ReturnKind::Value, origin),
            |generator| {
                let mut ops = Vec::new();
                if body.tag() == NodeTag::Block {
                    generator.statements(&mut ops, body.children)?;
                } else {
                    ops.extend(generator.transform(body, TransformerContext::Normal)?);
                    generator.emit(&mut ops, Operation::Return)?;
                }
                Ok(ops)
            },
        );
        generator.set_declaring_methods(previous);
        compiled?;

        let mut ops = Vec::new();
        generator.load_context(&mut ops)?;
        generator.emit(&mut ops, Operation::intrinsic(Intrinsic::RoutineRef(name)))?;
        descriptors(generator, &mut ops, params)?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::MakeClosure { lambda }))?;
        Ok(ops)
    }
}

/// Leading argument declarations and the trailing body.
fn split_signature<'a>(node: &'a Node<'a>) -> Result<(&'a [Node<'a>], &'a Node<'a>), CompileError> {
    let Some((body, params)) = node.children.split_last() else {
        return Err(CompileError::invalid(node, "missing body"));
    };
    if let Some(stray) = params.iter().find(|p| p.tag() != NodeTag::ArgumentDeclaration) {
        return Err(CompileError::invalid(stray, "expected an argument declaration"));
    }
    Ok((params, body))
}

/// Push one `[name, required, default]` descriptor per declared argument.
/// A default is a reference to a routine that evaluates it in the calling
/// context.
fn descriptors<'a>(
    generator: &mut Generator<'_, 'a>,
    ops: &mut Vec<Operation>,
    params: &'a [Node<'a>],
) -> Result<(), CompileError> {
    let params: Vec<&'a Node<'a>> = params.iter().collect();
    generator.build_array(ops, &params, |generator, ops, param| {
        let NodeKind::ArgumentDeclaration { name, required } = param.kind else {
            return Err(CompileError::invalid(param, "expected an argument declaration"));
        };
        let default = match param.children {
            [] => None,
            [value] => Some(default_routine(generator, value)?),
            _ => return Err(CompileError::invalid(param, "an argument has at most one default")),
        };
        let fields = [0u8, 1, 2];
        generator.build_array(ops, &fields, |generator, ops, field| match *field {
            0 => generator.push_key(ops, name),
            1 => generator.emit(ops, Operation::Push(Constant::Bool(required))),
            _ => match &default {
                Some(routine) => generator.emit(ops, Operation::intrinsic(Intrinsic::RoutineRef(routine.clone()))),
                None => generator.emit(ops, Operation::Push(Constant::Null)),
            },
        })
    })
}

fn default_routine<'a>(generator: &mut Generator<'_, 'a>, value: &'a Node<'a>) -> Result<EcoString, CompileError> {
    let name = generator.next_default_name();
    generator.compile_routine(
        RoutineSpec::with_context(name.clone(), ReturnKind::Value, Origin::Default),
        |generator| {
            let mut ops = generator.transform(value, TransformerContext::Normal)?;
            generator.emit(&mut ops, Operation::Return)?;
            Ok(ops)
        },
    )?;
    Ok(name)
}
