use core::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use ecow::EcoString;
use hashbrown::HashMap;
use tracing::{debug, trace};

use super::{ExecutionError, FlowSignal, Stack, Value};
use crate::api::ExecutionOptions;
use crate::keys::{INIT_KEYS_ROUTINE, Key};
use crate::ops::{Callee, Condition, Intrinsic, Label, Operation, RuntimeFn};
use crate::unit::{CompiledUnit, Routine};

/// The runtime services compiled routines call into: scopes, operators,
/// invocation of functions and closures, iteration.
///
/// A host that needs to run a routine of the unit (a user function, a
/// closure, an argument default) does so through the [`Invoker`] it is
/// handed, which keeps the call depth accounted for.
pub trait Host {
    fn call(
        &mut self,
        invoker: &Invoker<'_>,
        function: &RuntimeFn,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionError>;
}

/// Host used while loading a unit; key initialization needs no services.
struct Detached;

impl Host for Detached {
    fn call(
        &mut self,
        _invoker: &Invoker<'_>,
        function: &RuntimeFn,
        _args: Vec<Value>,
    ) -> Result<Value, ExecutionError> {
        Err(ExecutionError::Host(format!(
            "runtime service {function:?} is unavailable while loading"
        )))
    }
}

struct LoadedRoutine {
    index: usize,
    /// Label to operation index.
    labels: HashMap<Label, usize>,
}

/// A compiled unit ready to run.
pub struct Machine {
    unit: Arc<CompiledUnit>,
    options: ExecutionOptions,
    routines: HashMap<EcoString, LoadedRoutine>,
    keys: Vec<Key>,
}

impl Machine {
    /// Resolve every routine's labels and run `_init_keys`.
    pub fn new(unit: Arc<CompiledUnit>, options: ExecutionOptions) -> Result<Self, ExecutionError> {
        let mut routines = HashMap::with_capacity(unit.routines.len());
        for (index, routine) in unit.routines.iter().enumerate() {
            let labels = resolve_labels(routine)?;
            routines.insert(routine.name.clone(), LoadedRoutine { index, labels });
        }
        let mut machine = Self {
            unit,
            options,
            routines,
            keys: Vec::new(),
        };
        machine.keys = machine.initialize_keys()?;
        debug!(
            unit = %machine.unit.name,
            routines = machine.routines.len(),
            keys = machine.keys.len(),
            "loaded unit"
        );
        Ok(machine)
    }

    fn initialize_keys(&self) -> Result<Vec<Key>, ExecutionError> {
        let count = self.unit.keys.len();
        if count == 0 && !self.routines.contains_key(INIT_KEYS_ROUTINE) {
            return Ok(Vec::new());
        }
        let table = Rc::new(RefCell::new(vec![Value::Null; count]));
        self.call(&mut Detached, INIT_KEYS_ROUTINE, vec![Value::Array(table.clone())])?;
        let entries = table.borrow();
        entries
            .iter()
            .map(|entry| match entry {
                Value::Key(key) => Ok(key.clone()),
                other => Err(ExecutionError::type_mismatch("key", other)),
            })
            .collect()
    }

    pub fn unit(&self) -> &CompiledUnit {
        &self.unit
    }

    /// Runtime keys, indexed like the unit's key table.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Run `routine` with `args` (receiver first for instance routines, the
    /// context last).
    pub fn call(&self, host: &mut dyn Host, routine: &str, args: Vec<Value>) -> Result<Value, ExecutionError> {
        let steps = Cell::new(0);
        let invoker = Invoker {
            machine: self,
            depth: 0,
            steps: &steps,
        };
        invoker.invoke(host, routine, args)
    }

    fn intrinsic(&self, intrinsic: &Intrinsic, args: Vec<Value>) -> Result<Value, ExecutionError> {
        let mut args = args.into_iter();
        let mut arg = || args.next().unwrap_or(Value::Null);
        let value = match intrinsic {
            Intrinsic::SignalNormal => Value::signal(FlowSignal::Normal),
            Intrinsic::SignalReturn => Value::signal(FlowSignal::Return(arg())),
            Intrinsic::SignalBreak => Value::signal(FlowSignal::Break(loop_label(arg())?)),
            Intrinsic::SignalContinue => Value::signal(FlowSignal::Continue(loop_label(arg())?)),
            Intrinsic::SignalIsNormal => match arg() {
                Value::Signal(signal) => Value::Bool(*signal == FlowSignal::Normal),
                other => return Err(ExecutionError::type_mismatch("signal", &other)),
            },
            Intrinsic::SignalUnwrap => match arg() {
                Value::Signal(signal) => match &*signal {
                    FlowSignal::Return(value) => value.clone(),
                    _ => Value::Null,
                },
                other => return Err(ExecutionError::type_mismatch("signal", &other)),
            },
            Intrinsic::KeyOf => match arg() {
                Value::Str(name) => Value::Key(Key::of(name)),
                Value::Int(i) => Value::Key(Key::of_int(i)),
                key @ Value::Key(_) => key,
                other => return Err(ExecutionError::type_mismatch("key literal", &other)),
            },
            Intrinsic::RoutineRef(name) => {
                if !self.routines.contains_key(name) {
                    return Err(ExecutionError::UnknownRoutine { name: name.clone() });
                }
                Value::Routine(name.clone())
            }
        };
        Ok(value)
    }
}

fn loop_label(value: Value) -> Result<Option<EcoString>, ExecutionError> {
    match value {
        Value::Null => Ok(None),
        Value::Str(label) => Ok(Some(label)),
        Value::Key(key) => Ok(Some(key.name().into())),
        other => Err(ExecutionError::type_mismatch("loop label", &other)),
    }
}

fn resolve_labels(routine: &Routine) -> Result<HashMap<Label, usize>, ExecutionError> {
    let labels: HashMap<Label, usize> = routine
        .body
        .iter()
        .enumerate()
        .filter_map(|(index, op)| match op {
            Operation::Label(label) => Some((*label, index)),
            _ => None,
        })
        .collect();
    let referenced = routine
        .body
        .iter()
        .flat_map(|op| op.label_refs())
        .chain(routine.try_catches.iter().flat_map(|entry| entry.labels()));
    for label in referenced {
        if !labels.contains_key(&label) {
            return Err(ExecutionError::UnknownLabel {
                routine: routine.name.clone(),
                label,
            });
        }
    }
    Ok(labels)
}

/// Entry point back into the machine, tracking call depth and the step budget.
pub struct Invoker<'m> {
    machine: &'m Machine,
    depth: usize,
    steps: &'m Cell<u64>,
}

impl<'m> Invoker<'m> {
    pub fn machine(&self) -> &'m Machine {
        self.machine
    }

    /// Number of routine activations below this point.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn invoke(&self, host: &mut dyn Host, name: &str, args: Vec<Value>) -> Result<Value, ExecutionError> {
        let Some(loaded) = self.machine.routines.get(name) else {
            return Err(ExecutionError::UnknownRoutine { name: name.into() });
        };
        let routine = &self.machine.unit.routines[loaded.index];
        if args.len() != routine.params as usize {
            return Err(ExecutionError::ArgumentCount {
                routine: routine.name.clone(),
                expected: routine.params,
                actual: args.len(),
            });
        }
        let depth = self.depth + 1;
        let max_depth = self.machine.options.max_depth;
        if depth > max_depth {
            return Err(ExecutionError::StackOverflow { depth, max_depth });
        }
        let inner = Invoker {
            machine: self.machine,
            depth,
            steps: self.steps,
        };
        Activation::new(routine, &loaded.labels, args).run(&inner, host)
    }

    fn tick(&self) -> Result<(), ExecutionError> {
        let Some(limit) = self.machine.options.max_steps else {
            return Ok(());
        };
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        if steps > limit {
            return Err(ExecutionError::StepLimit { limit });
        }
        Ok(())
    }
}

enum Step {
    Next,
    Jump(Label),
    Return(Value),
}

/// One running routine: its locals and evaluation stack.
struct Activation<'r> {
    routine: &'r Routine,
    labels: &'r HashMap<Label, usize>,
    locals: Vec<Value>,
    stack: Stack<Value>,
}

impl<'r> Activation<'r> {
    fn new(routine: &'r Routine, labels: &'r HashMap<Label, usize>, args: Vec<Value>) -> Self {
        let size = usize::from(routine.max_locals).max(args.len());
        let mut locals = args;
        locals.resize(size, Value::Null);
        Self {
            routine,
            labels,
            locals,
            stack: Stack::new(usize::from(routine.max_stack)),
        }
    }

    fn run(mut self, invoker: &Invoker<'_>, host: &mut dyn Host) -> Result<Value, ExecutionError> {
        let routine = self.routine;
        let mut pc = 0;
        loop {
            let at = pc;
            let Some(op) = routine.body.get(at) else {
                return Err(ExecutionError::FellOffEnd {
                    routine: routine.name.clone(),
                });
            };
            invoker.tick()?;
            pc += 1;
            match self.execute(op, invoker, host) {
                Ok(Step::Next) => {}
                Ok(Step::Jump(target)) => pc = self.position(target)?,
                Ok(Step::Return(value)) => return Ok(value),
                Err(ExecutionError::Thrown(value)) => {
                    let Some(handler) = self.handler_for(at)? else {
                        return Err(ExecutionError::Thrown(value));
                    };
                    trace!(routine = %routine.name, at, handler, "exception caught");
                    self.stack.clear();
                    self.stack.push(value);
                    pc = handler;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn position(&self, label: Label) -> Result<usize, ExecutionError> {
        self.labels.get(&label).copied().ok_or_else(|| ExecutionError::UnknownLabel {
            routine: self.routine.name.clone(),
            label,
        })
    }

    /// First entry whose range covers the operation at `at`.
    fn handler_for(&self, at: usize) -> Result<Option<usize>, ExecutionError> {
        for entry in &self.routine.try_catches {
            let start = self.position(entry.start)?;
            let end = self.position(entry.end)?;
            if start <= at && at < end {
                return self.position(entry.handler).map(Some);
            }
        }
        Ok(None)
    }

    fn underflow(&self) -> ExecutionError {
        ExecutionError::StackUnderflow {
            routine: self.routine.name.clone(),
        }
    }

    fn pop(&mut self) -> Result<Value, ExecutionError> {
        self.stack.pop().ok_or_else(|| self.underflow())
    }

    fn pop_int(&mut self) -> Result<i64, ExecutionError> {
        match self.pop()? {
            Value::Int(i) => Ok(i),
            other => Err(ExecutionError::type_mismatch("integer", &other)),
        }
    }

    fn pop_array(&mut self) -> Result<Rc<RefCell<Vec<Value>>>, ExecutionError> {
        match self.pop()? {
            Value::Array(items) => Ok(items),
            other => Err(ExecutionError::type_mismatch("array", &other)),
        }
    }

    fn local(&mut self, slot: u16) -> Result<&mut Value, ExecutionError> {
        let routine = &self.routine.name;
        self.locals
            .get_mut(usize::from(slot))
            .ok_or_else(|| ExecutionError::UnknownSlot {
                routine: routine.clone(),
                slot,
            })
    }

    fn execute(&mut self, op: &Operation, invoker: &Invoker<'_>, host: &mut dyn Host) -> Result<Step, ExecutionError> {
        match op {
            Operation::Push(constant) => self.stack.push(Value::from(constant)),
            Operation::PushKey(index) => {
                let key = invoker
                    .machine
                    .keys
                    .get(*index as usize)
                    .ok_or(ExecutionError::UnknownKey { index: *index })?;
                self.stack.push(Value::Key(key.clone()));
            }
            Operation::Dup => {
                if !self.stack.dup() {
                    return Err(self.underflow());
                }
            }
            Operation::Pop => {
                self.pop()?;
            }
            Operation::Swap => {
                let top = self.pop()?;
                let below = self.pop()?;
                self.stack.push(top);
                self.stack.push(below);
            }
            Operation::Load(slot) => {
                let value = self.local(*slot)?.clone();
                self.stack.push(value);
            }
            Operation::Store(slot) => {
                let value = self.pop()?;
                *self.local(*slot)? = value;
            }
            Operation::Increment { slot, delta } => {
                let routine = self.routine;
                let local = self.local(*slot)?;
                match local {
                    Value::Int(i) => {
                        *i = i.checked_add(i64::from(*delta)).ok_or_else(|| ExecutionError::IntegerOverflow {
                            routine: routine.name.clone(),
                        })?;
                    }
                    other => return Err(ExecutionError::type_mismatch("integer", other)),
                }
            }
            Operation::NewArray => {
                let len = self.pop_int()?;
                let Ok(len) = usize::try_from(len) else {
                    return Err(ExecutionError::IndexOutOfBounds { index: len, len: 0 });
                };
                self.stack.push(Value::array(vec![Value::Null; len]));
            }
            Operation::ArrayStore => {
                let value = self.pop()?;
                let index = self.pop_int()?;
                let items = self.pop_array()?;
                let mut items = items.borrow_mut();
                let len = items.len();
                let slot = usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or(ExecutionError::IndexOutOfBounds { index, len })?;
                *slot = value;
            }
            Operation::ArrayLoad => {
                let index = self.pop_int()?;
                let items = self.pop_array()?;
                let items = items.borrow();
                let value = usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or(ExecutionError::IndexOutOfBounds { index, len: items.len() })?;
                self.stack.push(value);
            }
            Operation::ArrayLength => {
                let items = self.pop_array()?;
                let len = items.borrow().len();
                self.stack.push(Value::Int(len as i64));
            }
            Operation::Call { callee, argc } => {
                let args = self.stack.pop_n(usize::from(*argc)).ok_or_else(|| self.underflow())?;
                let result = match callee {
                    Callee::Runtime(function) => host.call(invoker, function, args)?,
                    Callee::Routine(name) => invoker.invoke(host, name, args)?,
                    Callee::Intrinsic(intrinsic) => invoker.machine.intrinsic(intrinsic, args)?,
                };
                self.stack.push(result);
            }
            Operation::Branch { condition, target } => {
                let value = self.pop()?;
                let taken = match (condition, &value) {
                    (Condition::IfTrue, Value::Bool(b)) => *b,
                    (Condition::IfFalse, Value::Bool(b)) => !*b,
                    (Condition::IfTrue | Condition::IfFalse, other) => {
                        return Err(ExecutionError::type_mismatch("boolean", other));
                    }
                    (Condition::IfNull, value) => value.is_null(),
                    (Condition::IfNonNull, value) => !value.is_null(),
                };
                if taken {
                    return Ok(Step::Jump(*target));
                }
            }
            Operation::Jump(target) => return Ok(Step::Jump(*target)),
            Operation::TableSwitch { low, default, targets } => {
                let key = self.pop_int()?;
                let target = key
                    .checked_sub(i64::from(*low))
                    .and_then(|offset| usize::try_from(offset).ok())
                    .and_then(|offset| targets.get(offset))
                    .unwrap_or(default);
                return Ok(Step::Jump(*target));
            }
            Operation::LookupSwitch { default, arms } => {
                let key = self.pop_int()?;
                let target = arms
                    .iter()
                    .find(|(value, _)| i64::from(*value) == key)
                    .map_or(default, |(_, label)| label);
                return Ok(Step::Jump(*target));
            }
            Operation::Label(_) | Operation::Position(_) | Operation::Divider => {}
            Operation::Return => return Ok(Step::Return(self.pop()?)),
            Operation::ReturnVoid => return Ok(Step::Return(Value::Null)),
            Operation::Throw => return Err(ExecutionError::Thrown(self.pop()?)),
            Operation::Opaque { mnemonic, .. } => {
                return Err(ExecutionError::Unsupported {
                    mnemonic: mnemonic.clone(),
                });
            }
        }
        Ok(Step::Next)
    }
}
