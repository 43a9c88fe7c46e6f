//! Operation model: the abstract instruction set routines are generated into.
//!
//! The instruction set is shaped after the JVM (the size-constrained engine
//! compiled units are ultimately loaded into): a stack machine with numbered
//! local slots, symbolic labels, structured switches and a handful of call
//! flavours. Every operation can be priced in backend size units, see
//! [`size_of`] and [`estimate`].
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`.
//! `Call` always pushes exactly one value (calls to void routines push null),
//! which keeps pending-depth bookkeeping uniform across callee kinds.

mod cost;


pub use cost::{BYTECODE_SIZE_LIMIT, UNCLASSIFIED_SIZE, estimate, estimate_each, size_of};

use core::fmt;

use ecow::EcoString;
use serde::{Deserialize, Serialize};

use crate::tree::{BinaryOp, UnaryOp};

/// Symbolic jump target, unique within one routine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Literal operand of [`Operation::Push`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(EcoString),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Float(x) => write!(f, "{x:?}"),
            Constant::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Branch condition, tested against the popped top of stack.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Top is `true`.
    IfTrue,
    /// Top is `false`.
    IfFalse,
    IfNull,
    IfNonNull,
}

/// How a call is bound on the target engine. Interface and dynamic calls
/// carry extra operand bytes and are priced higher.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Static,
    Virtual,
    Interface,
    Dynamic,
}

/// Runtime services provided by the interpreter. Arguments are listed in push
/// order; every service leaves exactly one result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeFn {
    /// `[ctx, key] -> value`. Safe lookups yield null for unknown names.
    ScopeFind { safe: bool },
    /// `[ctx, key, value] -> value`
    ScopeAssign,
    /// `[ctx, object, key] -> value`
    Dereference { safe: bool },
    /// `[ctx, object, key, value] -> value`
    AssignMember,
    /// `[ctx, key, args] -> value`. Named calls pass a struct instead of an array.
    InvokeFunction { named: bool },
    /// `[ctx, object, key, args] -> value`
    InvokeMember { safe: bool, named: bool },
    /// `[left, right] -> value`
    Binary(BinaryOp),
    /// `[operand] -> value`
    Unary(UnaryOp),
    /// `[value] -> bool`
    Truthy,
    /// `[parts] -> string`
    Concat,
    /// `[pairs] -> struct`, where `pairs` alternates keys and values.
    StructOf,
    /// `[ctx, class key, args] -> object`
    NewObject,
    /// `[ctx, routine, arguments] -> function`
    MakeClosure { lambda: bool },
    /// `[ctx, exception] -> ctx`
    CatchContext,
    /// `[collection] -> iterator`
    IterateStart,
    /// `[iterator] -> bool`
    IterateHasNext,
    /// `[iterator] -> value`
    IterateNext,
    /// `[ctx, key, routine, arguments] -> null`
    RegisterFunction,
}

impl RuntimeFn {
    pub fn arity(&self) -> u8 {
        match self {
            RuntimeFn::Unary(_)
            | RuntimeFn::Truthy
            | RuntimeFn::Concat
            | RuntimeFn::StructOf
            | RuntimeFn::IterateStart
            | RuntimeFn::IterateHasNext
            | RuntimeFn::IterateNext => 1,
            RuntimeFn::ScopeFind { .. } | RuntimeFn::Binary(_) | RuntimeFn::CatchContext => 2,
            RuntimeFn::ScopeAssign
            | RuntimeFn::Dereference { .. }
            | RuntimeFn::InvokeFunction { .. }
            | RuntimeFn::NewObject
            | RuntimeFn::MakeClosure { .. } => 3,
            RuntimeFn::AssignMember | RuntimeFn::InvokeMember { .. } | RuntimeFn::RegisterFunction => 4,
        }
    }

    /// Scope and context services are reached through the context interface;
    /// everything else is a static helper.
    pub fn dispatch(&self) -> Dispatch {
        match self {
            RuntimeFn::ScopeFind { .. }
            | RuntimeFn::ScopeAssign
            | RuntimeFn::InvokeFunction { .. }
            | RuntimeFn::NewObject
            | RuntimeFn::CatchContext
            | RuntimeFn::RegisterFunction => Dispatch::Interface,
            RuntimeFn::IterateHasNext | RuntimeFn::IterateNext => Dispatch::Interface,
            RuntimeFn::MakeClosure { .. } => Dispatch::Dynamic,
            _ => Dispatch::Static,
        }
    }
}

/// Operations the backend understands natively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    /// `[] -> signal`
    SignalNormal,
    /// `[value] -> signal`
    SignalReturn,
    /// `[label or null] -> signal`
    SignalBreak,
    /// `[label or null] -> signal`
    SignalContinue,
    /// `[signal] -> bool`
    SignalIsNormal,
    /// `[signal] -> value`, the carried value of a `Return`, otherwise null.
    SignalUnwrap,
    /// `[literal] -> key`
    KeyOf,
    /// `[] -> routine reference`
    RoutineRef(EcoString),
}

impl Intrinsic {
    pub fn arity(&self) -> u8 {
        match self {
            Intrinsic::SignalNormal | Intrinsic::RoutineRef(_) => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Callee {
    Runtime(RuntimeFn),
    /// Another routine of the same unit.
    Routine(EcoString),
    Intrinsic(Intrinsic),
}

impl Callee {
    pub fn dispatch(&self) -> Dispatch {
        match self {
            Callee::Runtime(f) => f.dispatch(),
            Callee::Routine(_) => Dispatch::Static,
            Callee::Intrinsic(Intrinsic::SignalIsNormal | Intrinsic::SignalUnwrap) => Dispatch::Virtual,
            Callee::Intrinsic(Intrinsic::RoutineRef(_)) => Dispatch::Dynamic,
            Callee::Intrinsic(_) => Dispatch::Static,
        }
    }
}

impl fmt::Display for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Runtime(func) => write!(f, "runtime {func:?}"),
            Callee::Routine(name) => write!(f, "routine {name}"),
            Callee::Intrinsic(Intrinsic::RoutineRef(name)) => write!(f, "ref {name}"),
            Callee::Intrinsic(i) => write!(f, "{i:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    // ========================================================================
    // Stack & Constants
    // ========================================================================
    /// Stack: `[...] -> [..., constant]`
    Push(Constant),
    /// Load entry `index` of the unit's key array.
    /// Stack: `[...] -> [..., key]`
    PushKey(u32),
    Dup,
    Pop,
    Swap,

    // ========================================================================
    // Locals
    // ========================================================================
    Load(u16),
    Store(u16),
    /// Add `delta` to an integer slot in place.
    Increment { slot: u16, delta: i32 },

    // ========================================================================
    // Arrays
    // ========================================================================
    /// Stack: `[..., length] -> [..., array]`
    NewArray,
    /// Stack: `[..., array, index, value] -> [...]`
    ArrayStore,
    /// Stack: `[..., array, index] -> [..., value]`
    ArrayLoad,
    ArrayLength,

    // ========================================================================
    // Calls
    // ========================================================================
    /// Stack: `[..., arg1, ..., argN] -> [..., result]`
    Call { callee: Callee, argc: u8 },

    // ========================================================================
    // Control Flow
    // ========================================================================
    Branch { condition: Condition, target: Label },
    Jump(Label),
    /// Dense dispatch on the popped integer: `low + i` goes to `targets[i]`.
    TableSwitch { low: i32, default: Label, targets: Vec<Label> },
    /// Sparse dispatch on the popped integer.
    LookupSwitch { default: Label, arms: Vec<(i32, Label)> },
    Label(Label),
    Return,
    ReturnVoid,
    Throw,

    // ========================================================================
    // Markers
    // ========================================================================
    /// Source offset of the statement that follows (debug info only).
    Position(u32),
    /// Statement boundary with an empty evaluation stack; the only place a
    /// routine may be split.
    Divider,

    /// An instruction the model does not classify. Priced conservatively.
    Opaque { mnemonic: EcoString, pops: u8, pushes: u8 },
}

impl Operation {
    pub fn call(callee: Callee, argc: u8) -> Self {
        Operation::Call { callee, argc }
    }

    pub fn runtime(func: RuntimeFn) -> Self {
        let argc = func.arity();
        Operation::Call { callee: Callee::Runtime(func), argc }
    }

    pub fn intrinsic(intrinsic: Intrinsic) -> Self {
        let argc = intrinsic.arity();
        Operation::Call { callee: Callee::Intrinsic(intrinsic), argc }
    }

    pub fn push_int(value: i64) -> Self {
        Operation::Push(Constant::Int(value))
    }

    pub fn push_str(value: impl Into<EcoString>) -> Self {
        Operation::Push(Constant::Str(value.into()))
    }

    /// Values popped and pushed by this operation.
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Operation::Push(_) | Operation::PushKey(_) | Operation::Load(_) => (0, 1),
            Operation::Dup => (1, 2),
            Operation::Pop | Operation::Store(_) => (1, 0),
            Operation::Swap => (2, 2),
            Operation::Increment { .. } => (0, 0),
            Operation::NewArray | Operation::ArrayLength => (1, 1),
            Operation::ArrayStore => (3, 0),
            Operation::ArrayLoad => (2, 1),
            Operation::Call { argc, .. } => (*argc as usize, 1),
            Operation::Branch { .. } => (1, 0),
            Operation::Jump(_) => (0, 0),
            Operation::TableSwitch { .. } | Operation::LookupSwitch { .. } => (1, 0),
            Operation::Label(_) | Operation::Position(_) | Operation::Divider => (0, 0),
            Operation::Return | Operation::Throw => (1, 0),
            Operation::ReturnVoid => (0, 0),
            Operation::Opaque { pops, pushes, .. } => (*pops as usize, *pushes as usize),
        }
    }

    /// Labels this operation may transfer control to.
    pub fn label_refs(&self) -> Vec<Label> {
        match self {
            Operation::Branch { target, .. } | Operation::Jump(target) => vec![*target],
            Operation::TableSwitch { default, targets, .. } => {
                let mut labels = targets.clone();
                labels.push(*default);
                labels
            }
            Operation::LookupSwitch { default, arms } => {
                let mut labels: Vec<_> = arms.iter().map(|(_, l)| *l).collect();
                labels.push(*default);
                labels
            }
            _ => Vec::new(),
        }
    }

    /// Control never continues to the next operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Operation::Return
                | Operation::ReturnVoid
                | Operation::Throw
                | Operation::Jump(_)
                | Operation::TableSwitch { .. }
                | Operation::LookupSwitch { .. }
        )
    }

    pub fn is_switch(&self) -> bool {
        matches!(self, Operation::TableSwitch { .. } | Operation::LookupSwitch { .. })
    }

    /// Slot read or written by this operation, if any.
    pub fn slot(&self) -> Option<u16> {
        match self {
            Operation::Load(s) | Operation::Store(s) | Operation::Increment { slot: s, .. } => Some(*s),
            _ => None,
        }
    }

    pub fn writes_slot(&self) -> bool {
        matches!(self, Operation::Store(_) | Operation::Increment { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Push(c) => write!(f, "push {c}"),
            Operation::PushKey(i) => write!(f, "key #{i}"),
            Operation::Dup => f.write_str("dup"),
            Operation::Pop => f.write_str("pop"),
            Operation::Swap => f.write_str("swap"),
            Operation::Load(s) => write!(f, "load {s}"),
            Operation::Store(s) => write!(f, "store {s}"),
            Operation::Increment { slot, delta } => write!(f, "inc {slot} {delta:+}"),
            Operation::NewArray => f.write_str("newarray"),
            Operation::ArrayStore => f.write_str("astore"),
            Operation::ArrayLoad => f.write_str("aload"),
            Operation::ArrayLength => f.write_str("alength"),
            Operation::Call { callee, argc } => write!(f, "call {callee} /{argc}"),
            Operation::Branch { condition, target } => write!(f, "branch {condition:?} (to {target})"),
            Operation::Jump(target) => write!(f, "jump (to {target})"),
            Operation::TableSwitch { low, default, targets } => {
                write!(f, "tableswitch low={low} [")?;
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "] default {default}")
            }
            Operation::LookupSwitch { default, arms } => {
                f.write_str("lookupswitch [")?;
                for (i, (value, t)) in arms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}: {t}")?;
                }
                write!(f, "] default {default}")
            }
            Operation::Label(l) => write!(f, "{l}:"),
            Operation::Return => f.write_str("return"),
            Operation::ReturnVoid => f.write_str("return void"),
            Operation::Throw => f.write_str("throw"),
            Operation::Position(offset) => write!(f, "@{offset}"),
            Operation::Divider => f.write_str("--"),
            Operation::Opaque { mnemonic, .. } => write!(f, "{mnemonic}"),
        }
    }
}
