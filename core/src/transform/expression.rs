use super::literal::push_member_key;
use super::{Generator, Transformer, TransformerContext};
use crate::api::CompileError;
use crate::ops::{Condition, Operation, RuntimeFn};
use crate::tree::{BinaryOp, Node, NodeKind};

pub(super) struct IdentifierTransformer;

impl Transformer for IdentifierTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let NodeKind::Identifier(name) = node.kind else {
            return Err(CompileError::unsupported(node));
        };
        let mut ops = Vec::new();
        generator.load_context(&mut ops)?;
        generator.push_key(&mut ops, name)?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::ScopeFind { safe: cx.is_safe() }))?;
        Ok(ops)
    }
}

/// Binary operators. `&&` and `||` short-circuit through branches and
/// produce a boolean; `?:` evaluates its left side null-safely.
pub(super) struct BinaryTransformer;

impl Transformer for BinaryTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let NodeKind::Binary(op) = node.kind else {
            return Err(CompileError::unsupported(node));
        };
        let [left, right] = node.children else {
            return Err(CompileError::invalid(node, "binary operation needs two operands"));
        };
        let mut ops = Vec::new();
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let end = generator.new_label()?;
                let exit_when = if op == BinaryOp::And {
                    Condition::IfFalse
                } else {
                    Condition::IfTrue
                };
                ops.extend(generator.transform(left, cx)?);
                generator.emit_all(
                    &mut ops,
                    [
                        Operation::runtime(RuntimeFn::Truthy),
                        Operation::Dup,
                        Operation::Branch {
                            condition: exit_when,
                            target: end,
                        },
                        Operation::Pop,
                    ],
                )?;
                ops.extend(generator.transform(right, cx)?);
                generator.emit(&mut ops, Operation::runtime(RuntimeFn::Truthy))?;
                generator.emit(&mut ops, Operation::Label(end))?;
            }
            BinaryOp::Elvis => {
                let end = generator.new_label()?;
                ops.extend(generator.transform(left, TransformerContext::Safe)?);
                generator.emit_all(
                    &mut ops,
                    [
                        Operation::Dup,
                        Operation::Branch {
                            condition: Condition::IfNonNull,
                            target: end,
                        },
                        Operation::Pop,
                    ],
                )?;
                ops.extend(generator.transform(right, cx)?);
                generator.emit(&mut ops, Operation::Label(end))?;
            }
            _ => {
                ops.extend(generator.transform(left, cx)?);
                ops.extend(generator.transform(right, cx)?);
                generator.emit(&mut ops, Operation::runtime(RuntimeFn::Binary(op)))?;
            }
        }
        Ok(ops)
    }
}

pub(super) struct UnaryTransformer;

impl Transformer for UnaryTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let (NodeKind::Unary(op), [operand]) = (&node.kind, node.children) else {
            return Err(CompileError::invalid(node, "unary operation needs one operand"));
        };
        let mut ops = generator.transform(operand, cx)?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::Unary(*op)))?;
        Ok(ops)
    }
}

pub(super) struct TernaryTransformer;

impl Transformer for TernaryTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let [condition, then, otherwise] = node.children else {
            return Err(CompileError::invalid(node, "ternary needs a condition and two branches"));
        };
        let otherwise_label = generator.new_label()?;
        let end = generator.new_label()?;
        let mut ops = generator.transform(condition, cx)?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::Truthy))?;
        generator.emit(
            &mut ops,
            Operation::Branch {
                condition: Condition::IfFalse,
                target: otherwise_label,
            },
        )?;
        let base = generator.pending()?;
        ops.extend(generator.transform(then, cx)?);
        generator.emit(&mut ops, Operation::Jump(end))?;
        generator.restore_pending(base)?;
        generator.emit(&mut ops, Operation::Label(otherwise_label))?;
        ops.extend(generator.transform(otherwise, cx)?);
        generator.emit(&mut ops, Operation::Label(end))?;
        Ok(ops)
    }
}

/// `target = value`. Evaluates to the assigned value.
pub(super) struct AssignmentTransformer;

impl Transformer for AssignmentTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let [target, value] = node.children else {
            return Err(CompileError::invalid(node, "assignment needs a target and a value"));
        };
        let mut ops = Vec::new();
        generator.load_context(&mut ops)?;
        match &target.kind {
            NodeKind::Identifier(name) => {
                generator.push_key(&mut ops, *name)?;
                ops.extend(generator.transform(value, cx)?);
                generator.emit(&mut ops, Operation::runtime(RuntimeFn::ScopeAssign))?;
            }
            NodeKind::DotAccess { name, .. } => {
                let [object] = target.children else {
                    return Err(CompileError::invalid(target, "member access needs an object"));
                };
                ops.extend(generator.transform(object, cx)?);
                generator.push_key(&mut ops, *name)?;
                ops.extend(generator.transform(value, cx)?);
                generator.emit(&mut ops, Operation::runtime(RuntimeFn::AssignMember))?;
            }
            NodeKind::IndexAccess { .. } => {
                let [object, index] = target.children else {
                    return Err(CompileError::invalid(target, "index access needs an object and an index"));
                };
                ops.extend(generator.transform(object, cx)?);
                push_member_key(generator, &mut ops, index, cx)?;
                ops.extend(generator.transform(value, cx)?);
                generator.emit(&mut ops, Operation::runtime(RuntimeFn::AssignMember))?;
            }
            _ => {
                return Err(CompileError::invalid(
                    node,
                    format!("cannot assign to {}", target.tag().name()),
                ));
            }
        }
        Ok(ops)
    }
}

/// `object.name`, `object?.name` and `object[index]`.
pub(super) struct AccessTransformer;

impl Transformer for AccessTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let mut ops = Vec::new();
        generator.load_context(&mut ops)?;
        let safe = match (&node.kind, node.children) {
            (NodeKind::DotAccess { name, safe }, [object]) => {
                ops.extend(generator.transform(object, cx)?);
                generator.push_key(&mut ops, *name)?;
                *safe
            }
            (NodeKind::IndexAccess { safe }, [object, index]) => {
                ops.extend(generator.transform(object, cx)?);
                push_member_key(generator, &mut ops, index, cx)?;
                *safe
            }
            _ => return Err(CompileError::invalid(node, "malformed member access")),
        };
        generator.emit(
            &mut ops,
            Operation::runtime(RuntimeFn::Dereference {
                safe: safe || cx.is_safe(),
            }),
        )?;
        Ok(ops)
    }
}

/// Function calls, method calls and `new`.
pub(super) struct InvocationTransformer;

impl Transformer for InvocationTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let mut ops = Vec::new();
        generator.load_context(&mut ops)?;
        match &node.kind {
            NodeKind::FunctionCall { name } => {
                generator.push_key(&mut ops, *name)?;
                let named = arguments(generator, &mut ops, node, node.children, cx)?;
                generator.emit(&mut ops, Operation::runtime(RuntimeFn::InvokeFunction { named }))?;
            }
            NodeKind::MethodCall { name, safe } => {
                let Some((object, args)) = node.children.split_first() else {
                    return Err(CompileError::invalid(node, "method call needs a receiver"));
                };
                ops.extend(generator.transform(object, cx)?);
                generator.push_key(&mut ops, *name)?;
                let named = arguments(generator, &mut ops, node, args, cx)?;
                generator.emit(
                    &mut ops,
                    Operation::runtime(RuntimeFn::InvokeMember {
                        safe: *safe || cx.is_safe(),
                        named,
                    }),
                )?;
            }
            NodeKind::New { class } => {
                generator.push_key(&mut ops, *class)?;
                if arguments(generator, &mut ops, node, node.children, cx)? {
                    return Err(CompileError::invalid(node, "constructors take positional arguments only"));
                }
                generator.emit(&mut ops, Operation::runtime(RuntimeFn::NewObject))?;
            }
            _ => return Err(CompileError::unsupported(node)),
        }
        Ok(ops)
    }
}

/// Push the argument list of a call: an array of values, or for named
/// arguments an array alternating keys and values turned into a struct.
/// Returns whether the arguments are named.
fn arguments<'a>(
    generator: &mut Generator<'_, 'a>,
    ops: &mut Vec<Operation>,
    call: &'a Node<'a>,
    args: &'a [Node<'a>],
    cx: TransformerContext,
) -> Result<bool, CompileError> {
    let mut names = Vec::with_capacity(args.len());
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        match (&arg.kind, arg.children) {
            (NodeKind::Argument { name }, [value]) => {
                names.push(*name);
                values.push(value);
            }
            _ => return Err(CompileError::invalid(arg, "expected a call argument")),
        }
    }
    let named = names.iter().filter(|n| n.is_some()).count();
    if named != 0 && named != names.len() {
        return Err(CompileError::invalid(call, "cannot mix named and positional arguments"));
    }

    if named == 0 {
        generator.build_array(ops, &values, |generator, ops, value| {
            ops.extend(generator.transform(*value, cx)?);
            Ok(())
        })?;
        return Ok(false);
    }

    let pairs: Vec<(&'a str, &'a Node<'a>)> = names
        .into_iter()
        .flatten()
        .zip(values)
        .collect();
    let slots: Vec<(usize, bool)> = (0..pairs.len()).flat_map(|i| [(i, true), (i, false)]).collect();
    generator.build_array(ops, &slots, |generator, ops, &(i, is_key)| {
        let (name, value) = pairs[i];
        if is_key {
            generator.push_key(ops, name)
        } else {
            ops.extend(generator.transform(value, cx)?);
            Ok(())
        }
    })?;
    generator.emit(ops, Operation::runtime(RuntimeFn::StructOf))?;
    Ok(true)
}
