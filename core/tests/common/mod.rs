//! A script runtime for end-to-end tests. Scopes, functions and structs are
//! host objects behind handles; the `record` builtin collects its arguments
//! so runs can be compared.

#![allow(dead_code)]

use std::sync::Arc;

use bumpalo::Bump;
use ecow::EcoString;
use hashbrown::HashMap;
use kindle_core::api::{Compiler, CompilerOptions, ExecutionOptions};
use kindle_core::cache::UnitCache;
use kindle_core::keys::Key;
use kindle_core::ops::RuntimeFn;
use kindle_core::tree::{BinaryOp, Node, TreeBuilder, UnaryOp};
use kindle_core::unit::CompiledUnit;
use kindle_core::vm::{ExecutionError, Host, Invoker, Machine, Value};

#[derive(Debug, Clone)]
struct Param {
    name: Key,
    required: bool,
    default: Option<EcoString>,
}

#[derive(Debug)]
enum Object {
    Scope {
        vars: HashMap<Key, Value>,
        parent: Option<u64>,
    },
    Function {
        routine: EcoString,
        params: Vec<Param>,
        scope: u64,
    },
    Struct(HashMap<Key, Value>),
    Iterator {
        items: Vec<Value>,
        next: usize,
    },
}

/// Outcome of running a script: its return value and everything `record`ed.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub result: Result<Value, ExecutionError>,
    pub recorded: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct ScriptHost {
    objects: Vec<Object>,
    pub recorded: Vec<Value>,
}

fn thrown(message: impl Into<EcoString>) -> ExecutionError {
    ExecutionError::Thrown(Value::Str(message.into()))
}

fn handle(value: &Value) -> Result<u64, ExecutionError> {
    match value {
        Value::Handle(id) => Ok(*id),
        other => Err(ExecutionError::type_mismatch("handle", other)),
    }
}

fn key(value: &Value) -> Result<Key, ExecutionError> {
    match value {
        Value::Key(key) => Ok(key.clone()),
        Value::Str(name) => Ok(Key::of(name.clone())),
        Value::Int(i) => Ok(Key::of_int(*i)),
        other => Err(ExecutionError::type_mismatch("key", other)),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> Result<bool, ExecutionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::Int(i) => Ok(*i != 0),
        Value::Float(x) => Ok(*x != 0.0),
        Value::Str(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" | "" => Ok(false),
            _ => Err(thrown(format!("cannot convert \"{s}\" to a boolean"))),
        },
        other => Err(ExecutionError::type_mismatch("boolean", other)),
    }
}

fn number(value: &Value) -> Result<f64, ExecutionError> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(x) => Ok(*x),
        Value::Str(s) => s
            .parse()
            .map_err(|_| thrown(format!("cannot convert \"{s}\" to a number"))),
        other => Err(ExecutionError::type_mismatch("number", other)),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExecutionError> {
    use BinaryOp::*;
    let value = match (op, left, right) {
        (Add, Value::Int(a), Value::Int(b)) => Value::Int(a.checked_add(*b).ok_or_else(|| thrown("overflow"))?),
        (Sub, Value::Int(a), Value::Int(b)) => Value::Int(a.checked_sub(*b).ok_or_else(|| thrown("overflow"))?),
        (Mul, Value::Int(a), Value::Int(b)) => Value::Int(a.checked_mul(*b).ok_or_else(|| thrown("overflow"))?),
        (Mod | IntDiv, Value::Int(_), Value::Int(0)) => return Err(thrown("division by zero")),
        (Mod, Value::Int(a), Value::Int(b)) => Value::Int(a % b),
        (IntDiv, Value::Int(a), Value::Int(b)) => Value::Int(a / b),
        (Add, _, _) => Value::Float(number(left)? + number(right)?),
        (Sub, _, _) => Value::Float(number(left)? - number(right)?),
        (Mul, _, _) => Value::Float(number(left)? * number(right)?),
        (Div, _, _) => Value::Float(number(left)? / number(right)?),
        (Pow, _, _) => Value::Float(number(left)?.powf(number(right)?)),
        (Concat, _, _) => Value::Str(format!("{}{}", text(left), text(right)).into()),
        (Eq, _, _) => Value::Bool(left == right),
        (Neq, _, _) => Value::Bool(left != right),
        (Lt | Le | Gt | Ge, _, _) => {
            let ordering = number(left)?
                .partial_cmp(&number(right)?)
                .ok_or_else(|| thrown("values are not comparable"))?;
            Value::Bool(match op {
                Lt => ordering.is_lt(),
                Le => ordering.is_le(),
                Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        (Xor, _, _) => Value::Bool(truthy(left)? ^ truthy(right)?),
        (Contains, _, _) => Value::Bool(text(left).contains(&text(right))),
        (And | Or | Elvis | Mod | IntDiv, _, _) => {
            return Err(ExecutionError::Host(format!("unexpected operator {op}")));
        }
    };
    Ok(value)
}

impl ScriptHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, object: Object) -> u64 {
        self.objects.push(object);
        (self.objects.len() - 1) as u64
    }

    fn object(&mut self, id: u64) -> Result<&mut Object, ExecutionError> {
        self.objects
            .get_mut(id as usize)
            .ok_or_else(|| ExecutionError::Host(format!("no object {id}")))
    }

    pub fn new_scope(&mut self, parent: Option<u64>) -> Value {
        Value::Handle(self.alloc(Object::Scope {
            vars: HashMap::new(),
            parent,
        }))
    }

    /// Scope in the chain starting at `scope` that defines `name`.
    fn defining_scope(&self, scope: u64, name: &Key) -> Option<u64> {
        let mut current = Some(scope);
        while let Some(id) = current {
            match self.objects.get(id as usize) {
                Some(Object::Scope { vars, parent }) => {
                    if vars.contains_key(name) {
                        return Some(id);
                    }
                    current = *parent;
                }
                _ => return None,
            }
        }
        None
    }

    fn define(&mut self, scope: u64, name: Key, value: Value) -> Result<(), ExecutionError> {
        match self.object(scope)? {
            Object::Scope { vars, .. } => {
                vars.insert(name, value);
                Ok(())
            }
            _ => Err(ExecutionError::Host(format!("object {scope} is not a scope"))),
        }
    }

    fn find(&self, scope: u64, name: &Key) -> Option<Value> {
        let id = self.defining_scope(scope, name)?;
        match self.objects.get(id as usize) {
            Some(Object::Scope { vars, .. }) => vars.get(name).cloned(),
            _ => None,
        }
    }

    fn function(&mut self, scope: u64, routine: &Value, descriptors: &Value) -> Result<Value, ExecutionError> {
        let Value::Routine(routine) = routine else {
            return Err(ExecutionError::type_mismatch("routine", routine));
        };
        let mut params = Vec::new();
        for descriptor in descriptors.elements().unwrap_or_default() {
            match descriptor.elements().as_deref() {
                Some([name, Value::Bool(required), default]) => params.push(Param {
                    name: key(name)?,
                    required: *required,
                    default: match default {
                        Value::Routine(routine) => Some(routine.clone()),
                        _ => None,
                    },
                }),
                _ => return Err(ExecutionError::Host("malformed argument descriptor".into())),
            }
        }
        Ok(Value::Handle(self.alloc(Object::Function {
            routine: routine.clone(),
            params,
            scope,
        })))
    }

    fn call_function(
        &mut self,
        invoker: &Invoker<'_>,
        function: u64,
        args: &Value,
        named: bool,
    ) -> Result<Value, ExecutionError> {
        let (routine, params, scope) = match self.object(function)? {
            Object::Function { routine, params, scope } => (routine.clone(), params.clone(), *scope),
            _ => return Err(thrown("value is not a function")),
        };
        let frame = self.new_scope(Some(scope));
        let frame_id = handle(&frame)?;

        let positional = args.elements();
        let by_name = match (named, args) {
            (true, Value::Handle(id)) => match self.object(*id)? {
                Object::Struct(fields) => fields.clone(),
                _ => HashMap::new(),
            },
            _ => HashMap::new(),
        };
        for (index, param) in params.iter().enumerate() {
            let supplied = match &positional {
                Some(values) => values.get(index).cloned(),
                None => by_name.get(&param.name).cloned(),
            };
            let value = match (supplied, &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => invoker.invoke(self, default, vec![frame.clone()])?,
                (None, None) if param.required => {
                    return Err(thrown(format!("argument `{}` is required", param.name)));
                }
                (None, None) => Value::Null,
            };
            self.define(frame_id, param.name.clone(), value)?;
        }

        let takes_receiver = invoker
            .machine()
            .unit()
            .routine(&routine)
            .is_some_and(|r| r.params == 2);
        let args = if takes_receiver { vec![Value::Null, frame] } else { vec![frame] };
        invoker.invoke(self, &routine, args)
    }

    fn builtin(&mut self, name: &Key, args: &Value) -> Result<Value, ExecutionError> {
        let args = args.elements().unwrap_or_default();
        match name.name().to_ascii_lowercase().as_str() {
            "record" => {
                self.recorded.extend(args);
                Ok(Value::Null)
            }
            "len" => match args.first() {
                Some(Value::Array(items)) => Ok(Value::Int(items.borrow().len() as i64)),
                Some(Value::Str(s)) => Ok(Value::Int(s.len() as i64)),
                _ => Err(thrown("len expects an array or a string")),
            },
            _ => Err(thrown(format!("function `{name}` is undefined"))),
        }
    }
}

impl Host for ScriptHost {
    fn call(&mut self, invoker: &Invoker<'_>, function: &RuntimeFn, args: Vec<Value>) -> Result<Value, ExecutionError> {
        match (function, args.as_slice()) {
            (RuntimeFn::ScopeFind { safe }, [ctx, name]) => {
                let name = key(name)?;
                match self.find(handle(ctx)?, &name) {
                    Some(value) => Ok(value),
                    None if *safe => Ok(Value::Null),
                    None => Err(thrown(format!("variable `{name}` is undefined"))),
                }
            }
            (RuntimeFn::ScopeAssign, [ctx, name, value]) => {
                let ctx = handle(ctx)?;
                let name = key(name)?;
                let target = self.defining_scope(ctx, &name).unwrap_or(ctx);
                self.define(target, name, value.clone())?;
                Ok(value.clone())
            }
            (RuntimeFn::Dereference { safe }, [_, object, name]) => {
                let name = key(name)?;
                let found = match object {
                    Value::Handle(id) => match self.object(*id)? {
                        Object::Struct(fields) => fields.get(&name).cloned(),
                        _ => None,
                    },
                    Value::Array(items) => name
                        .name()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| i.checked_sub(1))
                        .and_then(|i| items.borrow().get(i).cloned()),
                    _ => None,
                };
                match found {
                    Some(value) => Ok(value),
                    None if *safe => Ok(Value::Null),
                    None => Err(thrown(format!("member `{name}` is undefined"))),
                }
            }
            (RuntimeFn::AssignMember, [_, object, name, value]) => {
                let name = key(name)?;
                match self.object(handle(object)?)? {
                    Object::Struct(fields) => {
                        fields.insert(name, value.clone());
                        Ok(value.clone())
                    }
                    _ => Err(thrown("only structs have members")),
                }
            }
            (RuntimeFn::InvokeFunction { named }, [ctx, name, call_args]) => {
                let name = key(name)?;
                match self.find(handle(ctx)?, &name) {
                    Some(Value::Handle(function)) => self.call_function(invoker, function, call_args, *named),
                    Some(_) => Err(thrown(format!("`{name}` is not a function"))),
                    None => self.builtin(&name, call_args),
                }
            }
            (RuntimeFn::Binary(op), [left, right]) => binary(*op, left, right),
            (RuntimeFn::Unary(op), [operand]) => match (op, operand) {
                (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
                (UnaryOp::Neg, other) => Ok(Value::Float(-number(other)?)),
                (UnaryOp::Plus, other) => Ok(other.clone()),
                (UnaryOp::Not, other) => Ok(Value::Bool(!truthy(other)?)),
            },
            (RuntimeFn::Truthy, [value]) => Ok(Value::Bool(truthy(value)?)),
            (RuntimeFn::Concat, [parts]) => {
                let parts = parts.elements().unwrap_or_default();
                Ok(Value::Str(parts.iter().map(text).collect::<String>().into()))
            }
            (RuntimeFn::StructOf, [pairs]) => {
                let pairs = pairs.elements().unwrap_or_default();
                let mut fields = HashMap::new();
                for pair in pairs.chunks(2) {
                    if let [name, value] = pair {
                        fields.insert(key(name)?, value.clone());
                    }
                }
                Ok(Value::Handle(self.alloc(Object::Struct(fields))))
            }
            (RuntimeFn::MakeClosure { .. }, [ctx, routine, descriptors]) => {
                let scope = handle(ctx)?;
                self.function(scope, routine, descriptors)
            }
            (RuntimeFn::RegisterFunction, [ctx, name, routine, descriptors]) => {
                let scope = handle(ctx)?;
                let function = self.function(scope, routine, descriptors)?;
                self.define(scope, key(name)?, function)?;
                Ok(Value::Null)
            }
            (RuntimeFn::CatchContext, [ctx, _]) => Ok(self.new_scope(Some(handle(ctx)?))),
            (RuntimeFn::IterateStart, [collection]) => {
                let items = match collection {
                    Value::Array(items) => items.borrow().clone(),
                    Value::Handle(id) => match self.object(*id)? {
                        Object::Struct(fields) => fields.keys().map(|k| Value::Str(k.name().into())).collect(),
                        _ => return Err(thrown("value is not iterable")),
                    },
                    other => return Err(ExecutionError::type_mismatch("collection", other)),
                };
                Ok(Value::Handle(self.alloc(Object::Iterator { items, next: 0 })))
            }
            (RuntimeFn::IterateHasNext, [iterator]) => match self.object(handle(iterator)?)? {
                Object::Iterator { items, next } => Ok(Value::Bool(*next < items.len())),
                _ => Err(ExecutionError::Host("not an iterator".into())),
            },
            (RuntimeFn::IterateNext, [iterator]) => match self.object(handle(iterator)?)? {
                Object::Iterator { items, next } => {
                    let item = items.get(*next).cloned().unwrap_or(Value::Null);
                    *next += 1;
                    Ok(item)
                }
                _ => Err(ExecutionError::Host("not an iterator".into())),
            },
            _ => Err(ExecutionError::Host(format!("unsupported runtime service {function:?}"))),
        }
    }
}

/// Run the entry routine of `unit` against a fresh global scope.
pub fn run(unit: Arc<CompiledUnit>) -> Outcome {
    let machine = match Machine::new(unit, ExecutionOptions::default()) {
        Ok(machine) => machine,
        Err(error) => {
            return Outcome {
                result: Err(error),
                recorded: Vec::new(),
            };
        }
    };
    let mut host = ScriptHost::new();
    let global = host.new_scope(None);
    let entry = machine.unit().metadata.entry.clone();
    let result = machine.call(&mut host, &entry, vec![global]);
    Outcome {
        result,
        recorded: host.recorded,
    }
}

pub fn compiler(size_limit: usize) -> Compiler {
    let options = CompilerOptions {
        size_limit,
        ..CompilerOptions::default()
    };
    Compiler::with_cache(options, Arc::new(UnitCache::new()))
}

/// Number of `pad = k` assignments placed in front of every split script.
pub const PADDING: usize = 30;

/// A split run next to an unsplit run of the same script.
#[derive(Debug)]
pub struct Comparison {
    pub whole: Outcome,
    pub split: Outcome,
    pub unit: Arc<CompiledUnit>,
}

/// Compile the statements built by `build` behind [`PADDING`] cheap
/// assignments, once with the default size limit and once with a limit of
/// half the entry routine, and run both.
pub fn run_both<F>(build: F) -> Comparison
where
    F: for<'a> Fn(&TreeBuilder<'a>) -> Vec<Node<'a>>,
{
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let mut statements: Vec<Node<'_>> = (0..PADDING)
        .map(|k| b.expr_stmt(b.assign(b.ident("pad"), b.int((k % 6) as i64))))
        .collect();
    statements.extend(build(&b));
    let root = b.alloc(b.script(statements));

    let whole = match compiler(CompilerOptions::default().size_limit).transpile("test.script", root) {
        Ok(unit) => unit,
        Err(error) => panic!("compilation failed: {error}"),
    };
    let limit = whole.entry().map_or(0, |entry| entry.estimated_size()) / 2 + 1;
    let unit = match compiler(limit).transpile("test.script", root) {
        Ok(unit) => Arc::new(unit),
        Err(error) => panic!("compilation with limit {limit} failed: {error}"),
    };
    assert!(
        unit.metadata.splits.iter().any(|(parent, _)| parent == "_invoke"),
        "entry routine was not split at limit {limit}"
    );
    Comparison {
        whole: run(Arc::new(whole)),
        split: run(unit.clone()),
        unit,
    }
}

/// Compile and run a script of the statements built by `build`.
pub fn eval<F>(build: F) -> Outcome
where
    F: for<'a> Fn(&TreeBuilder<'a>) -> Vec<Node<'a>>,
{
    let arena = Bump::new();
    let b = TreeBuilder::new(&arena);
    let root = b.alloc(b.script(build(&b)));
    match compiler(CompilerOptions::default().size_limit).transpile("test.script", root) {
        Ok(unit) => run(Arc::new(unit)),
        Err(error) => panic!("compilation failed: {error}"),
    }
}
