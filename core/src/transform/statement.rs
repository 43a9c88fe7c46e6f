use super::{Generator, Transformer, TransformerContext};
use crate::api::CompileError;
use crate::ops::{Condition, Constant, Intrinsic, Operation, RuntimeFn};
use crate::tracker::SlotKind;
use crate::tree::{Node, NodeKind};
use crate::unit::ReturnKind;

/// An expression evaluated for its side effects; the value is discarded.
pub(super) struct ExpressionStatementTransformer;

impl Transformer for ExpressionStatementTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let [expression] = node.children else {
            return Err(CompileError::invalid(node, "expression statement needs an expression"));
        };
        let baseline = generator.pending()?;
        let mut ops = generator.transform(expression, TransformerContext::Normal)?;
        generator.discard_to(&mut ops, baseline)?;
        Ok(ops)
    }
}

pub(super) struct BlockTransformer;

impl Transformer for BlockTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let mut ops = Vec::new();
        generator.statements(&mut ops, node.children)?;
        Ok(ops)
    }
}

pub(super) struct IfTransformer;

impl Transformer for IfTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let (condition, then, otherwise) = match node.children {
            [condition, then] => (condition, then, None),
            [condition, then, otherwise] => (condition, then, Some(otherwise)),
            _ => return Err(CompileError::invalid(node, "if needs a condition and a body")),
        };
        let otherwise_label = generator.new_label()?;
        let end = generator.new_label()?;

        let mut ops = generator.transform(condition, TransformerContext::Normal)?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::Truthy))?;
        generator.emit(
            &mut ops,
            Operation::Branch {
                condition: Condition::IfFalse,
                target: otherwise_label,
            },
        )?;
        ops.extend(generator.transform(then, TransformerContext::Normal)?);
        if let Some(otherwise) = otherwise {
            generator.emit(&mut ops, Operation::Jump(end))?;
            generator.emit(&mut ops, Operation::Label(otherwise_label))?;
            ops.extend(generator.transform(otherwise, TransformerContext::Normal)?);
            generator.emit(&mut ops, Operation::Label(end))?;
        } else {
            generator.emit(&mut ops, Operation::Label(otherwise_label))?;
        }
        Ok(ops)
    }
}

pub(super) struct WhileTransformer;

impl Transformer for WhileTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let (NodeKind::While { label }, [condition, body]) = (&node.kind, node.children) else {
            return Err(CompileError::invalid(node, "while needs a condition and a body"));
        };
        let top = generator.new_label()?;
        let end = generator.new_label()?;

        let mut ops = Vec::new();
        generator.emit(&mut ops, Operation::Label(top))?;
        ops.extend(generator.transform(condition, TransformerContext::Normal)?);
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::Truthy))?;
        generator.emit(
            &mut ops,
            Operation::Branch {
                condition: Condition::IfFalse,
                target: end,
            },
        )?;
        generator.push_loop(*label, end, top)?;
        let generated = generator.transform(body, TransformerContext::Normal);
        generator.pop_loop()?;
        ops.extend(generated?);
        generator.emit(&mut ops, Operation::Jump(top))?;
        generator.emit(&mut ops, Operation::Label(end))?;
        Ok(ops)
    }
}

/// `for (var in collection)`. The iterator lives in a slot so the loop body
/// starts on the same stack depth as the loop.
pub(super) struct ForInTransformer;

impl Transformer for ForInTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let (NodeKind::ForIn { var, label }, [collection, body]) = (&node.kind, node.children) else {
            return Err(CompileError::invalid(node, "for-in needs a collection and a body"));
        };
        let iterator = generator.allocate_slot(SlotKind::Iterator)?;
        let top = generator.new_label()?;
        let end = generator.new_label()?;

        let mut ops = generator.transform(collection, TransformerContext::Normal)?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::IterateStart))?;
        generator.emit(&mut ops, Operation::Store(iterator))?;
        generator.emit(&mut ops, Operation::Label(top))?;
        generator.emit(&mut ops, Operation::Load(iterator))?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::IterateHasNext))?;
        generator.emit(
            &mut ops,
            Operation::Branch {
                condition: Condition::IfFalse,
                target: end,
            },
        )?;
        generator.load_context(&mut ops)?;
        generator.push_key(&mut ops, *var)?;
        generator.emit(&mut ops, Operation::Load(iterator))?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::IterateNext))?;
        generator.emit(&mut ops, Operation::runtime(RuntimeFn::ScopeAssign))?;
        generator.emit(&mut ops, Operation::Pop)?;

        generator.push_loop(*label, end, top)?;
        let generated = generator.transform(body, TransformerContext::Normal);
        generator.pop_loop()?;
        ops.extend(generated?);
        generator.emit(&mut ops, Operation::Jump(top))?;
        generator.emit(&mut ops, Operation::Label(end))?;
        Ok(ops)
    }
}

/// `break` and `continue`, optionally labelled. Finally blocks between the
/// jump and its loop run first.
pub(super) struct JumpTransformer;

impl Transformer for JumpTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let (label, is_break) = match &node.kind {
            NodeKind::Break { label } => (*label, true),
            NodeKind::Continue { label } => (*label, false),
            _ => return Err(CompileError::unsupported(node)),
        };
        let verb = if is_break { "break" } else { "continue" };
        let Some(frame) = generator.find_loop(label)? else {
            return Err(CompileError::invalid(
                node,
                match label {
                    Some(label) => format!("{verb} to unknown loop `{label}`"),
                    None => format!("{verb} outside of a loop"),
                },
            ));
        };

        let mut ops = Vec::new();
        generator.discard_to(&mut ops, frame.pending)?;
        ops.extend(generator.inline_finally(frame.finally_depth)?);
        let target = if is_break { frame.break_to } else { frame.continue_to };
        generator.emit(&mut ops, Operation::Jump(target))?;
        Ok(ops)
    }
}

pub(super) struct ReturnTransformer;

impl Transformer for ReturnTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let returns = generator.returns()?;
        let mut ops = Vec::new();
        match node.children {
            [] => {
                if returns != ReturnKind::Void {
                    generator.emit(&mut ops, Operation::Push(Constant::Null))?;
                }
            }
            [value] => {
                ops.extend(generator.transform(value, TransformerContext::Normal)?);
                if returns == ReturnKind::Void {
                    generator.emit(&mut ops, Operation::Pop)?;
                }
            }
            _ => return Err(CompileError::invalid(node, "return takes at most one value")),
        }

        if generator.finally_depth()? > 0 {
            if returns == ReturnKind::Void {
                ops.extend(generator.inline_finally(0)?);
            } else {
                let held = generator.allocate_slot(SlotKind::Temporary)?;
                generator.emit(&mut ops, Operation::Store(held))?;
                ops.extend(generator.inline_finally(0)?);
                generator.emit(&mut ops, Operation::Load(held))?;
            }
        }

        match returns {
            ReturnKind::Void => generator.emit(&mut ops, Operation::ReturnVoid)?,
            ReturnKind::Value => generator.emit(&mut ops, Operation::Return)?,
            ReturnKind::Signal => {
                generator.emit(&mut ops, Operation::intrinsic(Intrinsic::SignalReturn))?;
                generator.emit(&mut ops, Operation::Return)?;
            }
        }
        Ok(ops)
    }
}

pub(super) struct ThrowTransformer;

impl Transformer for ThrowTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let [value] = node.children else {
            return Err(CompileError::invalid(node, "throw needs a value"));
        };
        let mut ops = generator.transform(value, TransformerContext::Normal)?;
        generator.emit(&mut ops, Operation::Throw)?;
        Ok(ops)
    }
}

/// `try { } catch (e) { } finally { }`.
///
/// ```text
/// start:    body
/// end:      [finally]                 jump after
/// handler:  store exc; ctx = CatchContext(ctx, exc); ctx.e = exc
///           catch body
/// catch_end:[finally]                 jump after
/// rethrow:  store exc; finally; load exc; throw
/// after:
/// ```
///
/// The catch entry covers `[start, end)`; the rethrow entry covers
/// `[start, end)` and `[handler, catch_end)`. Copies of finally blocks
/// inlined for an early exit are cut out of both.
pub(super) struct TryTransformer;

impl Transformer for TryTransformer {
    fn transform<'a>(
        &self,
        node: &'a Node<'a>,
        generator: &mut Generator<'_, 'a>,
        _cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let NodeKind::Try { catch_var } = node.kind else {
            return Err(CompileError::unsupported(node));
        };
        let (body, catch, finally) = match (catch_var, node.children) {
            (Some(var), [body, catch]) => (body, Some((var, catch)), None),
            (Some(var), [body, catch, finally]) => (body, Some((var, catch)), Some(finally)),
            (None, [body, finally]) => (body, None, Some(finally)),
            _ => return Err(CompileError::invalid(node, "try needs a catch or a finally block")),
        };
        if generator.pending()? != 0 {
            return Err(CompileError::inconsistency(node, "try entered with pending values"));
        }

        let depth = generator.finally_depth()?;
        if let Some(finally) = finally {
            generator.push_finally(finally)?;
        }

        let mut ops = Vec::new();
        let start = generator.new_label()?;
        generator.emit(&mut ops, Operation::Label(start))?;
        ops.extend(generator.transform(body, TransformerContext::Normal)?);
        let end = generator.new_label()?;
        generator.emit(&mut ops, Operation::Label(end))?;
        let after = generator.new_label()?;
        ops.extend(generator.inline_finally(depth)?);
        generator.emit(&mut ops, Operation::Jump(after))?;

        let mut handled = None;
        if let Some((var, catch)) = catch {
            let handler = generator.new_label()?;
            generator.restore_pending(1)?;
            generator.emit(&mut ops, Operation::Label(handler))?;
            let exception = generator.allocate_slot(SlotKind::Exception)?;
            generator.emit(&mut ops, Operation::Store(exception))?;
            generator.load_context(&mut ops)?;
            generator.emit(&mut ops, Operation::Load(exception))?;
            generator.emit(&mut ops, Operation::runtime(RuntimeFn::CatchContext))?;
            let context = generator.push_context()?;
            generator.emit(&mut ops, Operation::Store(context))?;
            generator.emit(&mut ops, Operation::Load(context))?;
            generator.push_key(&mut ops, var)?;
            generator.emit(&mut ops, Operation::Load(exception))?;
            generator.emit(&mut ops, Operation::runtime(RuntimeFn::ScopeAssign))?;
            generator.emit(&mut ops, Operation::Pop)?;

            let generated = generator.transform(catch, TransformerContext::Normal);
            generator.pop_context()?;
            ops.extend(generated?);
            let catch_end = generator.new_label()?;
            generator.emit(&mut ops, Operation::Label(catch_end))?;
            ops.extend(generator.inline_finally(depth)?);
            generator.emit(&mut ops, Operation::Jump(after))?;
            handled = Some((handler, catch_end));
        }

        let mut rethrow = None;
        if let Some(finally) = finally {
            let frame = generator.pop_finally()?;
            let handler = generator.new_label()?;
            generator.restore_pending(1)?;
            generator.emit(&mut ops, Operation::Label(handler))?;
            let exception = generator.allocate_slot(SlotKind::Exception)?;
            generator.emit(&mut ops, Operation::Store(exception))?;
            ops.extend(generator.transform(finally, TransformerContext::Normal)?);
            generator.emit(&mut ops, Operation::Load(exception))?;
            generator.emit(&mut ops, Operation::Throw)?;
            rethrow = Some((handler, frame.gaps));
        }
        generator.emit(&mut ops, Operation::Label(after))?;

        let no_gaps = Vec::new();
        let gaps = rethrow.as_ref().map_or(&no_gaps, |(_, gaps)| gaps);
        if let Some((handler, _)) = handled {
            generator.add_protected_range(start, end, handler, gaps)?;
        }
        if let Some((rethrow_handler, _)) = &rethrow {
            generator.add_protected_range(start, end, *rethrow_handler, gaps)?;
            if let Some((handler, catch_end)) = handled {
                generator.add_protected_range(handler, catch_end, *rethrow_handler, gaps)?;
            }
        }
        Ok(ops)
    }
}
