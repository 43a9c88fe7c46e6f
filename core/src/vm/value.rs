use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

use ecow::EcoString;

use crate::keys::Key;
use crate::ops::Constant;

/// A runtime value as seen by compiled routines.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(EcoString),
    Key(Key),
    Array(Rc<RefCell<Vec<Value>>>),
    Signal(Rc<FlowSignal>),
    /// Reference to a routine of the running unit.
    Routine(EcoString),
    /// Opaque object owned by the host (scopes, functions, iterators...).
    Handle(u64),
}

/// How a split segment finished.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowSignal {
    Normal,
    Return(Value),
    Break(Option<EcoString>),
    Continue(Option<EcoString>),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn signal(signal: FlowSignal) -> Self {
        Value::Signal(Rc::new(signal))
    }

    pub fn str(s: impl Into<EcoString>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "decimal",
            Value::Str(_) => "string",
            Value::Key(_) => "key",
            Value::Array(_) => "array",
            Value::Signal(_) => "signal",
            Value::Routine(_) => "routine",
            Value::Handle(_) => "handle",
        }
    }

    /// Snapshot of an array's elements.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(x) => Value::Float(*x),
            Constant::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Key(k) => write!(f, "#{k}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Signal(signal) => write!(f, "{signal}"),
            Value::Routine(name) => write!(f, "<routine {name}>"),
            Value::Handle(id) => write!(f, "<handle {id}>"),
        }
    }
}

impl fmt::Display for FlowSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowSignal::Normal => write!(f, "normal"),
            FlowSignal::Return(value) => write!(f, "return {value}"),
            FlowSignal::Break(None) => write!(f, "break"),
            FlowSignal::Break(Some(label)) => write!(f, "break {label}"),
            FlowSignal::Continue(None) => write!(f, "continue"),
            FlowSignal::Continue(Some(label)) => write!(f, "continue {label}"),
        }
    }
}
