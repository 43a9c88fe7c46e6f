use bumpalo::Bump;
use pretty_assertions::assert_eq;

use super::*;
use crate::ops::{Condition, Constant, Label, RuntimeFn};
use crate::tree::{BinaryOp, TreeBuilder};
use crate::unit::{Routine, TryCatch};

fn compile_script<'a>(root: &'a Node<'a>) -> Result<Routine, CompileError> {
    let registry = TransformerRegistry::standard();
    let unit = Generator::new(&registry, "statements").generate(root)?;
    Ok(unit
        .routines
        .into_iter()
        .find(|r| r.name == unit.entry)
        .expect("entry routine"))
}

fn label(n: u32) -> Operation {
    Operation::Label(Label(n))
}

fn branch_if_false(n: u32) -> Operation {
    Operation::Branch {
        condition: Condition::IfFalse,
        target: Label(n),
    }
}

/// `cleanup();` as a statement, with `cleanup` at key 0.
fn cleanup_statement() -> Vec<Operation> {
    vec![
        Operation::Divider,
        Operation::Load(0),
        Operation::PushKey(0),
        Operation::push_int(0),
        Operation::NewArray,
        Operation::runtime(RuntimeFn::InvokeFunction { named: false }),
        Operation::Pop,
    ]
}

fn null_return() -> [Operation; 2] {
    [Operation::Push(Constant::Null), Operation::Return]
}

#[test]
fn test_if_else() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(vec![b.if_else(
        b.ident("c"),
        b.block(vec![b.expr_stmt(b.int(1))]),
        Some(b.block(vec![b.expr_stmt(b.int(2))])),
    )]));

    let invoke = compile_script(root).unwrap();
    let mut expected = vec![
        Operation::Divider,
        Operation::Load(0),
        Operation::PushKey(0),
        Operation::runtime(RuntimeFn::ScopeFind { safe: false }),
        Operation::runtime(RuntimeFn::Truthy),
        branch_if_false(0),
        Operation::Divider,
        Operation::push_int(1),
        Operation::Pop,
        Operation::Jump(Label(1)),
        label(0),
        Operation::Divider,
        Operation::push_int(2),
        Operation::Pop,
        label(1),
    ];
    expected.extend(null_return());
    assert_eq!(invoke.body, expected);
}

#[test]
fn test_while_with_break() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(vec![b.while_loop(
        None,
        b.boolean(true),
        b.block(vec![b.brk(None)]),
    )]));

    let invoke = compile_script(root).unwrap();
    let mut expected = vec![
        Operation::Divider,
        label(0),
        Operation::Push(Constant::Bool(true)),
        Operation::runtime(RuntimeFn::Truthy),
        branch_if_false(1),
        Operation::Divider,
        Operation::Jump(Label(1)),
        Operation::Jump(Label(0)),
        label(1),
    ];
    expected.extend(null_return());
    assert_eq!(invoke.body, expected);
}

#[test]
fn test_labelled_break_leaves_outer_loop() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let inner = b.while_loop(Some("inner"), b.boolean(true), b.block(vec![b.brk(Some("OUTER"))]));
    let root = b.alloc(b.script(vec![b.while_loop(
        Some("outer"),
        b.boolean(true),
        b.block(vec![inner]),
    )]));

    let invoke = compile_script(root).unwrap();
    let mut expected = vec![
        Operation::Divider,
        label(0),
        Operation::Push(Constant::Bool(true)),
        Operation::runtime(RuntimeFn::Truthy),
        branch_if_false(1),
        Operation::Divider,
        label(2),
        Operation::Push(Constant::Bool(true)),
        Operation::runtime(RuntimeFn::Truthy),
        branch_if_false(3),
        Operation::Divider,
        Operation::Jump(Label(1)),
        Operation::Jump(Label(2)),
        label(3),
        Operation::Jump(Label(0)),
        label(1),
    ];
    expected.extend(null_return());
    assert_eq!(invoke.body, expected);
}

#[test]
fn test_break_outside_loop_is_invalid() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(vec![b.brk(None)]));

    match compile_script(root) {
        Err(CompileError::Invalid { message, kind, text, .. }) => {
            assert_eq!(message, "break outside of a loop");
            assert_eq!(kind, "Break");
            assert_eq!(text, "break;");
        }
        other => panic!("expected an invalid break, got {other:?}"),
    }
}

#[test]
fn test_continue_to_unknown_label_is_invalid() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(vec![b.while_loop(
        Some("outer"),
        b.boolean(true),
        b.block(vec![b.cont(Some("inner"))]),
    )]));

    let error = compile_script(root).unwrap_err();
    assert!(matches!(
        error,
        CompileError::Invalid { ref message, .. } if message == "continue to unknown loop `inner`"
    ));
}

#[test]
fn test_loops_do_not_reach_into_closures() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let closure = b.closure(vec![], b.block(vec![b.brk(None)]));
    let root = b.alloc(b.script(vec![b.while_loop(
        None,
        b.boolean(true),
        b.block(vec![b.expr_stmt(closure)]),
    )]));

    let error = compile_script(root).unwrap_err();
    assert!(matches!(error, CompileError::Invalid { kind: "Break", .. }));
}

#[test]
fn test_for_in_keeps_iterator_in_a_slot() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(vec![b.for_in("x", b.ident("xs"), b.block(vec![]))]));

    let invoke = compile_script(root).unwrap();
    let mut expected = vec![
        Operation::Divider,
        Operation::Load(0),
        Operation::PushKey(0),
        Operation::runtime(RuntimeFn::ScopeFind { safe: false }),
        Operation::runtime(RuntimeFn::IterateStart),
        Operation::Store(1),
        label(0),
        Operation::Load(1),
        Operation::runtime(RuntimeFn::IterateHasNext),
        branch_if_false(1),
        Operation::Load(0),
        Operation::PushKey(1),
        Operation::Load(1),
        Operation::runtime(RuntimeFn::IterateNext),
        Operation::runtime(RuntimeFn::ScopeAssign),
        Operation::Pop,
        Operation::Jump(Label(0)),
        label(1),
    ];
    expected.extend(null_return());
    assert_eq!(invoke.body, expected);
    assert_eq!(invoke.max_locals, 2);
}

#[test]
fn test_try_catch_binds_exception_in_catch_context() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(vec![b.try_catch(
        b.block(vec![b.throw(b.string("boom"))]),
        Some(("e", b.block(vec![]))),
        None,
    )]));

    let invoke = compile_script(root).unwrap();
    let mut expected = vec![
        Operation::Divider,
        label(0),
        Operation::Divider,
        Operation::push_str("boom"),
        Operation::Throw,
        label(1),
        Operation::Jump(Label(2)),
        label(3),
        Operation::Store(1),
        Operation::Load(0),
        Operation::Load(1),
        Operation::runtime(RuntimeFn::CatchContext),
        Operation::Store(2),
        Operation::Load(2),
        Operation::PushKey(0),
        Operation::Load(1),
        Operation::runtime(RuntimeFn::ScopeAssign),
        Operation::Pop,
        label(4),
        Operation::Jump(Label(2)),
        label(2),
    ];
    expected.extend(null_return());
    assert_eq!(invoke.body, expected);
    assert_eq!(
        invoke.try_catches,
        vec![TryCatch {
            start: Label(0),
            end: Label(1),
            handler: Label(3),
        }]
    );
    assert_eq!(invoke.max_locals, 3);
}

#[test]
fn test_return_runs_finally_outside_protected_range() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(vec![b.try_catch(
        b.block(vec![b.ret(Some(b.int(1)))]),
        None,
        Some(b.block(vec![b.expr_stmt(b.call("cleanup", vec![]))])),
    )]));

    let invoke = compile_script(root).unwrap();
    let mut expected = vec![
        Operation::Divider,
        label(0),
        Operation::Divider,
        Operation::push_int(1),
        Operation::Store(1),
        label(1),
    ];
    expected.extend(cleanup_statement());
    expected.extend([label(2), Operation::Load(1), Operation::Return, label(3), label(5)]);
    expected.extend(cleanup_statement());
    expected.extend([label(6), Operation::Jump(Label(4)), label(7), Operation::Store(2)]);
    expected.extend(cleanup_statement());
    expected.extend([Operation::Load(2), Operation::Throw, label(4)]);
    expected.extend(null_return());
    assert_eq!(invoke.body, expected);

    assert_eq!(
        invoke.try_catches,
        vec![
            TryCatch {
                start: Label(0),
                end: Label(1),
                handler: Label(7),
            },
            TryCatch {
                start: Label(2),
                end: Label(3),
                handler: Label(7),
            },
        ]
    );
}

#[test]
fn test_break_through_finally_inlines_it() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let guarded = b.try_catch(
        b.block(vec![b.brk(None)]),
        None,
        Some(b.block(vec![b.expr_stmt(b.call("cleanup", vec![]))])),
    );
    let root = b.alloc(b.script(vec![b.while_loop(
        None,
        b.boolean(true),
        b.block(vec![guarded]),
    )]));

    let invoke = compile_script(root).unwrap();
    let calls = invoke
        .body
        .iter()
        .filter(|op| **op == Operation::runtime(RuntimeFn::InvokeFunction { named: false }))
        .count();
    // break path, normal path and rethrow handler
    assert_eq!(calls, 3);
    assert_eq!(invoke.try_catches.len(), 2);
}

#[test]
fn test_return_from_void_routine() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.class("C", vec![b.ret(Some(b.int(1)))]));

    let registry = TransformerRegistry::standard();
    let unit = Generator::new(&registry, "C").generate(root).unwrap();
    assert_eq!(
        unit.routines[0].body,
        vec![
            Operation::Divider,
            Operation::push_int(1),
            Operation::Pop,
            Operation::ReturnVoid,
        ]
    );
}

#[test]
fn test_elvis_reads_left_side_safely() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(vec![b.expr_stmt(b.binary(BinaryOp::Elvis, b.ident("a"), b.int(0)))]));

    let invoke = compile_script(root).unwrap();
    let mut expected = vec![
        Operation::Divider,
        Operation::Load(0),
        Operation::PushKey(0),
        Operation::runtime(RuntimeFn::ScopeFind { safe: true }),
        Operation::Dup,
        Operation::Branch {
            condition: Condition::IfNonNull,
            target: Label(0),
        },
        Operation::Pop,
        Operation::push_int(0),
        label(0),
        Operation::Pop,
    ];
    expected.extend(null_return());
    assert_eq!(invoke.body, expected);
    assert_eq!(invoke.max_stack, 2);
}

#[test]
fn test_assignment_to_call_is_invalid() {
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(vec![b.expr_stmt(b.assign(b.call("f", vec![]), b.int(1)))]));

    match compile_script(root) {
        Err(CompileError::Invalid { message, kind, .. }) => {
            assert_eq!(message, "cannot assign to FunctionInvocation");
            assert_eq!(kind, "Assignment");
        }
        other => panic!("expected an invalid assignment, got {other:?}"),
    }
}
