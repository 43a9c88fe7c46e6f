//! End-to-end runs of compiled scripts. Every scenario is also compiled
//! with a limit small enough to split the entry routine, and the split run
//! must behave exactly like the unsplit one.

mod common;

use common::{Comparison, eval, run_both};
use kindle_core::tree::BinaryOp;
use kindle_core::vm::{ExecutionError, Value};
use pretty_assertions::assert_eq;

fn assert_transparent(comparison: &Comparison) {
    assert_eq!(comparison.split, comparison.whole);
}

#[test]
fn test_arithmetic() {
    let comparison = run_both(|b| {
        vec![
            b.expr_stmt(b.assign(
                b.ident("x"),
                b.binary(BinaryOp::Add, b.int(2), b.binary(BinaryOp::Mul, b.int(3), b.int(4))),
            )),
            b.ret(Some(b.binary(BinaryOp::Sub, b.ident("x"), b.int(1)))),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::Int(13)));
}

#[test]
fn test_while_with_break_and_continue() {
    // Sum of the odd numbers up to 9.
    let comparison = run_both(|b| {
        vec![
            b.expr_stmt(b.assign(b.ident("i"), b.int(0))),
            b.expr_stmt(b.assign(b.ident("total"), b.int(0))),
            b.while_loop(
                None,
                b.boolean(true),
                b.block(vec![
                    b.expr_stmt(b.assign(b.ident("i"), b.binary(BinaryOp::Add, b.ident("i"), b.int(1)))),
                    b.if_else(
                        b.binary(BinaryOp::Gt, b.ident("i"), b.int(9)),
                        b.block(vec![b.brk(None)]),
                        None,
                    ),
                    b.if_else(
                        b.binary(
                            BinaryOp::Eq,
                            b.binary(BinaryOp::Mod, b.ident("i"), b.int(2)),
                            b.int(0),
                        ),
                        b.block(vec![b.cont(None)]),
                        None,
                    ),
                    b.expr_stmt(b.assign(
                        b.ident("total"),
                        b.binary(BinaryOp::Add, b.ident("total"), b.ident("i")),
                    )),
                ]),
            ),
            b.ret(Some(b.ident("total"))),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::Int(25)));
}

#[test]
fn test_labelled_loops() {
    let comparison = run_both(|b| {
        vec![
            b.expr_stmt(b.assign(b.ident("count"), b.int(0))),
            b.expr_stmt(b.assign(b.ident("i"), b.int(0))),
            b.while_loop(
                Some("outer"),
                b.binary(BinaryOp::Lt, b.ident("i"), b.int(3)),
                b.block(vec![
                    b.expr_stmt(b.assign(b.ident("i"), b.binary(BinaryOp::Add, b.ident("i"), b.int(1)))),
                    b.expr_stmt(b.assign(b.ident("j"), b.int(0))),
                    b.while_loop(
                        None,
                        b.boolean(true),
                        b.block(vec![
                            b.expr_stmt(b.assign(b.ident("j"), b.binary(BinaryOp::Add, b.ident("j"), b.int(1)))),
                            b.if_else(
                                b.binary(BinaryOp::Gt, b.ident("j"), b.int(2)),
                                b.block(vec![b.cont(Some("outer"))]),
                                None,
                            ),
                            b.if_else(
                                b.binary(BinaryOp::Eq, b.ident("i"), b.int(3)),
                                b.block(vec![b.brk(Some("outer"))]),
                                None,
                            ),
                            b.expr_stmt(b.assign(
                                b.ident("count"),
                                b.binary(BinaryOp::Add, b.ident("count"), b.int(1)),
                            )),
                        ]),
                    ),
                ]),
            ),
            b.ret(Some(b.ident("count"))),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::Int(4)));
}

#[test]
fn test_for_in_records_each_item() {
    let comparison = run_both(|b| {
        vec![b.for_in(
            "item",
            b.array(vec![b.int(1), b.int(2), b.int(3)]),
            b.block(vec![b.expr_stmt(b.call(
                "record",
                vec![b.binary(BinaryOp::Mul, b.ident("item"), b.int(10))],
            ))]),
        )]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::Null));
    assert_eq!(
        comparison.split.recorded,
        vec![Value::Int(10), Value::Int(20), Value::Int(30)]
    );
}

#[test]
fn test_try_catch_binds_exception() {
    let comparison = run_both(|b| {
        vec![
            b.try_catch(
                b.block(vec![
                    b.throw(b.string("boom")),
                    b.expr_stmt(b.call("record", vec![b.string("unreachable")])),
                ]),
                Some(("e", b.block(vec![b.expr_stmt(b.call("record", vec![b.ident("e")]))]))),
                None,
            ),
            b.ret(Some(b.string("after"))),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::str("after")));
    assert_eq!(comparison.split.recorded, vec![Value::str("boom")]);
}

#[test]
fn test_finally_runs_on_return() {
    let comparison = run_both(|b| {
        vec![
            b.function(
                "f",
                vec![],
                vec![b.try_catch(
                    b.block(vec![b.ret(Some(b.int(1)))]),
                    None,
                    Some(b.block(vec![b.expr_stmt(b.call("record", vec![b.string("cleanup")]))])),
                )],
            ),
            b.ret(Some(b.call("f", vec![]))),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::Int(1)));
    assert_eq!(comparison.split.recorded, vec![Value::str("cleanup")]);
}

#[test]
fn test_finally_rethrows() {
    let outcome = eval(|b| {
        vec![b.try_catch(
            b.block(vec![b.throw(b.string("inner"))]),
            None,
            Some(b.block(vec![b.expr_stmt(b.call("record", vec![b.string("cleanup")]))])),
        )]
    });
    assert_eq!(outcome.result, Err(ExecutionError::Thrown(Value::str("inner"))));
    assert_eq!(outcome.recorded, vec![Value::str("cleanup")]);
}

#[test]
fn test_default_and_named_arguments() {
    let comparison = run_both(|b| {
        vec![
            b.function(
                "greet",
                vec![
                    b.param("name", true, None),
                    b.param("greeting", false, Some(b.string("hello"))),
                ],
                vec![b.ret(Some(b.binary(
                    BinaryOp::Concat,
                    b.binary(BinaryOp::Concat, b.ident("greeting"), b.string(" ")),
                    b.ident("name"),
                )))],
            ),
            b.expr_stmt(b.call("record", vec![b.call("greet", vec![b.string("ada")])])),
            b.expr_stmt(b.call(
                "record",
                vec![b.call_with(
                    "greet",
                    vec![b.named_arg("greeting", b.string("hi")), b.named_arg("name", b.string("bob"))],
                )],
            )),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(
        comparison.split.recorded,
        vec![Value::str("hello ada"), Value::str("hi bob")]
    );
}

#[test]
fn test_missing_required_argument_throws() {
    let outcome = eval(|b| {
        vec![
            b.function("need", vec![b.param("x", true, None)], vec![b.ret(Some(b.ident("x")))]),
            b.try_catch(
                b.block(vec![b.expr_stmt(b.call("need", vec![]))]),
                Some(("e", b.block(vec![b.expr_stmt(b.call("record", vec![b.ident("e")]))]))),
                None,
            ),
        ]
    });
    assert_eq!(outcome.result, Ok(Value::Null));
    assert_eq!(outcome.recorded, vec![Value::str("argument `x` is required")]);
}

#[test]
fn test_closure_sees_later_assignments() {
    let comparison = run_both(|b| {
        vec![
            b.expr_stmt(b.assign(b.ident("base"), b.int(10))),
            b.expr_stmt(b.assign(
                b.ident("add"),
                b.closure(
                    vec![b.param("n", false, None)],
                    b.block(vec![b.ret(Some(b.binary(BinaryOp::Add, b.ident("n"), b.ident("base"))))]),
                ),
            )),
            b.expr_stmt(b.assign(b.ident("base"), b.int(20))),
            b.ret(Some(b.call("add", vec![b.int(5)]))),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::Int(25)));
}

#[test]
fn test_lambda_returns_expression() {
    let outcome = eval(|b| {
        vec![
            b.expr_stmt(b.assign(
                b.ident("double"),
                b.lambda(vec![b.param("n", false, None)], b.binary(BinaryOp::Mul, b.ident("n"), b.int(2))),
            )),
            b.ret(Some(b.call("double", vec![b.int(21)]))),
        ]
    });
    assert_eq!(outcome.result, Ok(Value::Int(42)));
}

#[test]
fn test_declarations_are_hoisted() {
    let comparison = run_both(|b| {
        vec![
            b.ret(Some(b.call("twice", vec![b.int(4)]))),
            b.function(
                "twice",
                vec![b.param("n", false, None)],
                vec![b.ret(Some(b.binary(BinaryOp::Mul, b.ident("n"), b.int(2))))],
            ),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::Int(8)));
}

#[test]
fn test_return_in_the_middle_skips_the_rest() {
    let comparison = run_both(|b| {
        let mut statements: Vec<_> = (0..10)
            .map(|i| b.expr_stmt(b.call("record", vec![b.int(i)])))
            .collect();
        statements.push(b.ret(Some(b.int(42))));
        statements.extend((10..20).map(|i| b.expr_stmt(b.call("record", vec![b.int(i)]))));
        statements
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::Int(42)));
    let expected: Vec<Value> = (0..10).map(Value::Int).collect();
    assert_eq!(comparison.split.recorded, expected);
    assert!(comparison.unit.metadata.splits[0].1.len() >= 2);
}

#[test]
fn test_uncaught_throw_reaches_the_caller() {
    let comparison = run_both(|b| {
        vec![
            b.expr_stmt(b.call("record", vec![b.string("before")])),
            b.throw(b.string("bad")),
            b.expr_stmt(b.call("record", vec![b.string("after")])),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Err(ExecutionError::Thrown(Value::str("bad"))));
    assert_eq!(comparison.split.recorded, vec![Value::str("before")]);
}

#[test]
fn test_undefined_variable_is_an_exception() {
    let outcome = eval(|b| vec![b.ret(Some(b.ident("missing")))]);
    assert_eq!(
        outcome.result,
        Err(ExecutionError::Thrown(Value::str("variable `missing` is undefined")))
    );
}

#[test]
fn test_struct_members() {
    let outcome = eval(|b| {
        vec![
            b.expr_stmt(b.assign(
                b.ident("point"),
                b.structure(vec![(b.ident("x"), b.int(1)), (b.ident("y"), b.int(2))]),
            )),
            b.expr_stmt(b.assign(b.dot(b.ident("point"), "x"), b.int(5))),
            b.ret(Some(b.binary(
                BinaryOp::Add,
                b.dot(b.ident("point"), "x"),
                b.dot(b.ident("point"), "y"),
            ))),
        ]
    });
    assert_eq!(outcome.result, Ok(Value::Int(7)));
}

#[test]
fn test_index_through_a_variable_is_evaluated() {
    let comparison = run_both(|b| {
        vec![
            b.expr_stmt(b.assign(
                b.ident("point"),
                b.structure(vec![(b.ident("x"), b.int(1)), (b.ident("k"), b.int(99))]),
            )),
            b.expr_stmt(b.assign(b.ident("k"), b.string("x"))),
            b.expr_stmt(b.call("record", vec![b.index(b.ident("point"), b.ident("k"))])),
            b.expr_stmt(b.assign(b.index(b.ident("point"), b.ident("k")), b.int(5))),
            b.expr_stmt(b.call("record", vec![b.dot(b.ident("point"), "x")])),
            b.expr_stmt(b.call("record", vec![b.index(b.ident("point"), b.string("k"))])),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(
        comparison.split.recorded,
        vec![Value::Int(1), Value::Int(5), Value::Int(99)]
    );
}

#[test]
fn test_functions_named_like_generated_routines() {
    let comparison = run_both(|b| {
        vec![
            b.function("_init_keys", vec![], vec![b.ret(Some(b.int(5)))]),
            b.function("_closure_0", vec![], vec![b.ret(Some(b.int(6)))]),
            b.expr_stmt(b.assign(
                b.ident("seven"),
                b.closure(vec![], b.block(vec![b.ret(Some(b.int(7)))])),
            )),
            b.expr_stmt(b.call("record", vec![b.call("_init_keys", vec![])])),
            b.expr_stmt(b.call("record", vec![b.call("_closure_0", vec![])])),
            b.expr_stmt(b.call("record", vec![b.call("seven", vec![])])),
        ]
    });
    assert_transparent(&comparison);
    assert_eq!(comparison.split.result, Ok(Value::Null));
    assert_eq!(
        comparison.split.recorded,
        vec![Value::Int(5), Value::Int(6), Value::Int(7)]
    );
}
