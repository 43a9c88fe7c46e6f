//! The `kindle` facade: compile through the shared cache, run against a
//! minimal host and render failures.

use std::sync::Arc;

use kindle::ops::RuntimeFn;
use kindle::tree::{BinaryOp, Span, TreeBuilder};
use kindle::{
    Bump, CompileError, CompiledUnit, Compiler, CompilerOptions, ExecutionError, ExecutionOptions, Host, Invoker,
    Machine, UnitCache, Value, render_error_to_string_no_color,
};
use once_cell::sync::Lazy;
use pretty_assertions::assert_eq;

/// Shared by every test in this file, like a long-running process would.
static COMPILER: Lazy<Compiler> =
    Lazy::new(|| Compiler::with_cache(CompilerOptions::default(), Arc::new(UnitCache::new())));

/// Host with only arithmetic; scripts here never touch variables.
struct Calculator;

impl Host for Calculator {
    fn call(&mut self, _invoker: &Invoker<'_>, function: &RuntimeFn, args: Vec<Value>) -> Result<Value, ExecutionError> {
        match (function, args.as_slice()) {
            (RuntimeFn::Binary(BinaryOp::Add), [Value::Int(a), Value::Int(b)]) => Ok(Value::Int(a + b)),
            (RuntimeFn::Binary(BinaryOp::Mul), [Value::Int(a), Value::Int(b)]) => Ok(Value::Int(a * b)),
            _ => Err(ExecutionError::Host(format!("{function:?} is not supported"))),
        }
    }
}

fn run(unit: Arc<CompiledUnit>) -> Result<Value, ExecutionError> {
    let machine = Machine::new(unit, ExecutionOptions::default())?;
    machine.call(&mut Calculator, "_invoke", vec![Value::Handle(0)])
}

#[test]
fn test_compile_and_run() {
    let arena = Bump::new();
    let t = TreeBuilder::new(&arena);
    let script = t.alloc(t.script(vec![t.ret(Some(t.binary(
        BinaryOp::Add,
        t.int(40),
        t.binary(BinaryOp::Mul, t.int(1), t.int(2)),
    )))]));

    let unit = COMPILER.compile_unit("facade.answer", script).unwrap();
    assert_eq!(run(unit), Ok(Value::Int(42)));
}

#[test]
fn test_units_are_shared_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(|| {
                let arena = Bump::new();
                let t = TreeBuilder::new(&arena);
                let script = t.alloc(t.script(vec![t.ret(Some(t.int(7)))]));
                COMPILER.compile_unit("facade.shared", script).unwrap()
            })
        })
        .collect();
    let units: Vec<Arc<CompiledUnit>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for unit in &units[1..] {
        assert!(Arc::ptr_eq(unit, &units[0]));
    }
    assert!(Arc::ptr_eq(&COMPILER.lookup_compiled_unit("facade.shared").unwrap(), &units[0]));
    assert_eq!(run(units[0].clone()), Ok(Value::Int(7)));
}

#[test]
fn test_encoded_unit_still_runs() {
    let arena = Bump::new();
    let t = TreeBuilder::new(&arena);
    let script = t.alloc(t.script(vec![t.ret(Some(t.binary(BinaryOp::Mul, t.int(6), t.int(7))))]));

    let unit = COMPILER.transpile("facade.encoded", script).unwrap();
    let bytes = unit.encode().unwrap();
    let decoded = CompiledUnit::decode(&bytes).unwrap();
    assert_eq!(decoded, unit);
    assert_eq!(run(Arc::new(decoded)), Ok(Value::Int(42)));
}

#[test]
fn test_unsupported_construct_is_rendered() {
    let source = "<bx:mail>";
    let arena = Bump::new();
    let t = TreeBuilder::new(&arena);
    let script = t.alloc(t.script(vec![t.at(t.component("mail"), Span::new(0, 9))]));

    let error = COMPILER.compile_unit("facade.template", script).unwrap_err();
    assert!(matches!(error, CompileError::Unsupported { .. }));
    assert!(COMPILER.lookup_compiled_unit("facade.template").is_err());

    let rendered = render_error_to_string_no_color(&error, source);
    assert!(rendered.contains("<bx:mail>"));
}
