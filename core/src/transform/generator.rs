//! Unit- and routine-level state shared by all transformers.

use ecow::{EcoString, eco_format};
use hashbrown::HashSet;
use tracing::trace;

use super::{TransformerContext, TransformerRegistry};
use crate::api::CompileError;
use crate::keys::{FrozenKeys, INIT_KEYS_ROUTINE, KeyTable, Literal};
use crate::ops::{Constant, Intrinsic, Label, Operation};
use crate::tracker::{ContextTracker, LoopFrame, SlotKind, TrackerError};
use crate::tree::{Node, NodeTag, Span};
use crate::unit::{Origin, ReturnKind, Routine, RoutineKind, TryCatch, UnitKind};

/// Shape of a routine about to be generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineSpec {
    pub name: EcoString,
    pub kind: RoutineKind,
    /// Parameter count, receiver included. The last parameter is the
    /// lexical context the routine runs in.
    pub params: u16,
    pub returns: ReturnKind,
    pub origin: Origin,
}

impl RoutineSpec {
    /// Static routine taking only a context.
    pub fn with_context(name: impl Into<EcoString>, returns: ReturnKind, origin: Origin) -> Self {
        Self {
            name: name.into(),
            kind: RoutineKind::Static,
            params: 1,
            returns,
            origin,
        }
    }

    /// Instance routine taking the receiver and a context.
    pub fn method(name: impl Into<EcoString>, returns: ReturnKind, origin: Origin) -> Self {
        Self {
            name: name.into(),
            kind: RoutineKind::Instance,
            params: 2,
            returns,
            origin,
        }
    }
}

/// A finally block enclosing the code being generated.
#[derive(Debug, Clone)]
pub struct FinallyFrame<'a> {
    pub block: &'a Node<'a>,
    /// Label pairs bracketing inlined copies of finally blocks that leave
    /// this frame. Exceptions raised there must not reach this try's handlers.
    pub gaps: Vec<(Label, Label)>,
}

struct RoutineFrame<'a> {
    spec: RoutineSpec,
    tracker: ContextTracker,
    finally: Vec<FinallyFrame<'a>>,
}

/// Everything a unit's tree produced.
#[derive(Debug)]
pub struct GeneratedUnit {
    pub kind: UnitKind,
    pub entry: EcoString,
    pub routines: Vec<Routine>,
    pub keys: FrozenKeys,
}

pub struct Generator<'r, 'a> {
    registry: &'r TransformerRegistry,
    unit_name: EcoString,
    positions: bool,
    keys: KeyTable,
    routines: Vec<Routine>,
    routine_names: HashSet<String>,
    frames: Vec<RoutineFrame<'a>>,
    /// Nodes currently being transformed, innermost last.
    nodes: Vec<&'a Node<'a>>,
    closures: u32,
    lambdas: u32,
    defaults: u32,
    declaring_methods: bool,
    entry: Option<(UnitKind, EcoString)>,
}

impl<'r, 'a> Generator<'r, 'a> {
    pub fn new(registry: &'r TransformerRegistry, unit_name: impl Into<EcoString>) -> Self {
        // Appended after generation; taken up front so nothing else claims it.
        let routine_names = HashSet::from_iter([INIT_KEYS_ROUTINE.to_ascii_lowercase()]);
        Self {
            registry,
            unit_name: unit_name.into(),
            positions: false,
            keys: KeyTable::new(),
            routines: Vec::new(),
            routine_names,
            frames: Vec::new(),
            nodes: Vec::new(),
            closures: 0,
            lambdas: 0,
            defaults: 0,
            declaring_methods: false,
            entry: None,
        }
    }

    /// Emit a `Position` marker before every statement.
    pub fn with_positions(mut self, positions: bool) -> Self {
        self.positions = positions;
        self
    }

    /// Generate every routine of the unit rooted at `root`.
    pub fn generate(mut self, root: &'a Node<'a>) -> Result<GeneratedUnit, CompileError> {
        if !matches!(root.tag(), NodeTag::Script | NodeTag::Class) {
            return Err(CompileError::invalid(root, "a unit must be a script or a class"));
        }
        let stray = self.transform(root, TransformerContext::Normal)?;
        if !stray.is_empty() {
            return Err(CompileError::inconsistency(root, "operations emitted outside of any routine"));
        }
        let Some((kind, entry)) = self.entry.take() else {
            return Err(CompileError::inconsistency(root, "unit has no entry routine"));
        };
        Ok(GeneratedUnit {
            kind,
            entry,
            routines: self.routines,
            keys: self.keys.freeze(),
        })
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    // === Dispatch ===

    /// Dispatch `node` to its registered transformer.
    pub fn transform(
        &mut self,
        node: &'a Node<'a>,
        cx: TransformerContext,
    ) -> Result<Vec<Operation>, CompileError> {
        let registry = self.registry;
        let Some(handler) = registry.get(node.tag()) else {
            return Err(CompileError::unsupported(node));
        };
        self.nodes.push(node);
        let result = handler.transform(node, self, cx);
        self.nodes.pop();
        result
    }

    fn attribute(&self, error: TrackerError) -> CompileError {
        match self.nodes.last() {
            Some(node) => CompileError::from_tracker(node, error),
            None => self.defect(error),
        }
    }

    /// Generation defect, attributed to the innermost node being transformed.
    fn defect(&self, reason: impl core::fmt::Display) -> CompileError {
        match self.nodes.last() {
            Some(node) => CompileError::inconsistency(node, reason),
            None => CompileError::Inconsistency {
                reason: reason.to_string(),
                kind: "Unit",
                text: self.unit_name.to_string(),
                span: Span::default(),
            },
        }
    }

    fn no_routine(&self) -> CompileError {
        self.defect("no routine under construction")
    }

    fn frame(&self) -> Result<&RoutineFrame<'a>, CompileError> {
        self.frames.last().ok_or_else(|| self.no_routine())
    }

    fn frame_mut(&mut self) -> Result<&mut RoutineFrame<'a>, CompileError> {
        if self.frames.is_empty() {
            return Err(self.no_routine());
        }
        let last = self.frames.len() - 1;
        Ok(&mut self.frames[last])
    }

    pub fn in_routine(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Tracker of the routine under construction.
    pub fn tracker(&mut self) -> Result<&mut ContextTracker, CompileError> {
        Ok(&mut self.frame_mut()?.tracker)
    }

    pub fn returns(&self) -> Result<ReturnKind, CompileError> {
        Ok(self.frame()?.spec.returns)
    }

    // === Emission ===

    /// Append `op`, keeping the pending depth in step with its stack effect.
    pub fn emit(&mut self, ops: &mut Vec<Operation>, op: Operation) -> Result<(), CompileError> {
        let (pops, pushes) = op.stack_effect();
        let tracker = self.tracker()?;
        let consumed = tracker.consume_pending(pops);
        if let Err(error) = consumed {
            return Err(self.attribute(error));
        }
        self.tracker()?.track_pending(pushes);
        ops.push(op);
        Ok(())
    }

    pub fn emit_all(
        &mut self,
        ops: &mut Vec<Operation>,
        batch: impl IntoIterator<Item = Operation>,
    ) -> Result<(), CompileError> {
        for op in batch {
            self.emit(ops, op)?;
        }
        Ok(())
    }

    pub fn intern(&mut self, literal: impl Into<Literal>) -> u32 {
        self.keys.intern(literal)
    }

    pub fn push_key(&mut self, ops: &mut Vec<Operation>, literal: impl Into<Literal>) -> Result<(), CompileError> {
        let index = self.intern(literal);
        self.emit(ops, Operation::PushKey(index))
    }

    /// Push the active lexical context.
    pub fn load_context(&mut self, ops: &mut Vec<Operation>) -> Result<(), CompileError> {
        let slot = self.context_slot()?;
        self.emit(ops, Operation::Load(slot))
    }

    pub fn context_slot(&mut self) -> Result<u16, CompileError> {
        let current = self.tracker()?.current_context();
        current.map_err(|e| self.attribute(e))
    }

    pub fn push_context(&mut self) -> Result<u16, CompileError> {
        let pushed = self.tracker()?.push_context();
        pushed.map_err(|e| self.attribute(e))
    }

    pub fn pop_context(&mut self) -> Result<u16, CompileError> {
        let popped = self.tracker()?.pop_context();
        popped.map_err(|e| self.attribute(e))
    }

    pub fn allocate_slot(&mut self, kind: SlotKind) -> Result<u16, CompileError> {
        let slot = self.tracker()?.allocate_slot(kind);
        slot.map_err(|e| self.attribute(e))
    }

    pub fn new_label(&mut self) -> Result<Label, CompileError> {
        Ok(self.tracker()?.new_label())
    }

    pub fn pending(&self) -> Result<usize, CompileError> {
        Ok(self.frame()?.tracker.pending())
    }

    pub fn restore_pending(&mut self, depth: usize) -> Result<(), CompileError> {
        self.tracker()?.restore_pending(depth);
        Ok(())
    }

    /// Pop everything above `baseline`.
    pub fn discard_to(&mut self, ops: &mut Vec<Operation>, baseline: usize) -> Result<(), CompileError> {
        let pops = self.tracker()?.discard_to(baseline);
        ops.extend(pops.map_err(|e| self.attribute(e))?);
        Ok(())
    }

    /// Generate a statement list.
    ///
    /// A `Divider` precedes every statement that starts on an empty stack,
    /// and each statement must leave the stack as it found it.
    pub fn statements(
        &mut self,
        ops: &mut Vec<Operation>,
        statements: impl IntoIterator<Item = &'a Node<'a>>,
    ) -> Result<(), CompileError> {
        for statement in statements {
            let baseline = self.pending()?;
            if baseline == 0 {
                self.emit(ops, Operation::Divider)?;
            }
            if self.positions {
                self.emit(ops, Operation::Position(statement.span.0.start as u32))?;
            }
            ops.extend(self.transform(statement, TransformerContext::Normal)?);
            let after = self.pending()?;
            if after != baseline {
                return Err(CompileError::inconsistency(
                    statement,
                    format!("statement left {after} pending values, expected {baseline}"),
                ));
            }
        }
        Ok(())
    }

    /// Build an array with one element per item; `each` must push exactly one value.
    pub fn build_array<T>(
        &mut self,
        ops: &mut Vec<Operation>,
        items: &[T],
        mut each: impl FnMut(&mut Self, &mut Vec<Operation>, &T) -> Result<(), CompileError>,
    ) -> Result<(), CompileError> {
        self.emit(ops, Operation::push_int(items.len() as i64))?;
        self.emit(ops, Operation::NewArray)?;
        for (index, item) in items.iter().enumerate() {
            self.emit(ops, Operation::Dup)?;
            self.emit(ops, Operation::push_int(index as i64))?;
            each(self, ops, item)?;
            self.emit(ops, Operation::ArrayStore)?;
        }
        Ok(())
    }

    /// Array of the values of `nodes`, each evaluated in `cx`.
    pub fn value_array(
        &mut self,
        ops: &mut Vec<Operation>,
        nodes: &'a [Node<'a>],
        cx: TransformerContext,
    ) -> Result<(), CompileError> {
        let nodes: Vec<&'a Node<'a>> = nodes.iter().collect();
        self.build_array(ops, &nodes, |generator, ops, node| {
            ops.extend(generator.transform(*node, cx)?);
            Ok(())
        })
    }

    // === Loops and Finally Blocks ===

    pub fn push_loop(&mut self, label: Option<&str>, break_to: Label, continue_to: Label) -> Result<(), CompileError> {
        let finally_depth = self.finally_depth()?;
        let pending = self.pending()?;
        self.tracker()?.push_loop(LoopFrame {
            label: label.map(EcoString::from),
            break_to,
            continue_to,
            finally_depth,
            pending,
        });
        Ok(())
    }

    pub fn pop_loop(&mut self) -> Result<(), CompileError> {
        self.tracker()?.pop_loop();
        Ok(())
    }

    pub fn find_loop(&self, label: Option<&str>) -> Result<Option<LoopFrame>, CompileError> {
        Ok(self.frame()?.tracker.find_loop(label).cloned())
    }

    pub fn finally_depth(&self) -> Result<usize, CompileError> {
        Ok(self.frame()?.finally.len())
    }

    pub fn push_finally(&mut self, block: &'a Node<'a>) -> Result<(), CompileError> {
        self.frame_mut()?.finally.push(FinallyFrame {
            block,
            gaps: Vec::new(),
        });
        Ok(())
    }

    pub fn pop_finally(&mut self) -> Result<FinallyFrame<'a>, CompileError> {
        let popped = self.frame_mut()?.finally.pop();
        popped.ok_or_else(|| self.defect("popped an empty finally stack"))
    }

    /// Inline every finally block above `down_to`, innermost first, for a
    /// jump or return that leaves them.
    ///
    /// While a block is generated, it and everything inside it are hidden, so
    /// a `return` within a finally block only runs the blocks enclosing it.
    pub fn inline_finally(&mut self, down_to: usize) -> Result<Vec<Operation>, CompileError> {
        let top = self.finally_depth()?;
        let mut ops = Vec::new();
        if top <= down_to {
            return Ok(ops);
        }
        let gap_start = self.new_label()?;
        self.emit(&mut ops, Operation::Label(gap_start))?;
        for index in (down_to..top).rev() {
            let hidden = self.frame_mut()?.finally.split_off(index);
            let block = hidden[0].block;
            let generated = self.transform(block, TransformerContext::Normal);
            self.frame_mut()?.finally.extend(hidden);
            ops.extend(generated?);
        }
        let gap_end = self.new_label()?;
        self.emit(&mut ops, Operation::Label(gap_end))?;
        for frame in &mut self.frame_mut()?.finally[down_to..top] {
            frame.gaps.push((gap_start, gap_end));
        }
        Ok(ops)
    }

    /// Protect `[start, end)` minus the gaps that fall inside it.
    pub fn add_protected_range(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        gaps: &[(Label, Label)],
    ) -> Result<(), CompileError> {
        // Labels are allocated in emission order, so numbering orders them.
        let mut inside: Vec<_> = gaps
            .iter()
            .filter(|(from, to)| start.0 < from.0 && to.0 < end.0)
            .copied()
            .collect();
        inside.sort();
        let tracker = self.tracker()?;
        let mut from = start;
        for (gap_start, gap_end) in inside {
            tracker.add_try_catch(TryCatch {
                start: from,
                end: gap_start,
                handler,
            });
            from = gap_end;
        }
        tracker.add_try_catch(TryCatch { start: from, end, handler });
        Ok(())
    }

    // === Routines ===

    /// Generate a routine with its own tracker and register it with the unit.
    ///
    /// The body runs with the routine's context parameter as the active
    /// context. A body that can fall off its end gets the implicit return
    /// (`null` for value routines).
    pub fn compile_routine(
        &mut self,
        spec: RoutineSpec,
        body: impl FnOnce(&mut Self) -> Result<Vec<Operation>, CompileError>,
    ) -> Result<(), CompileError> {
        self.reserve_name(&spec.name)?;

        let mut tracker = ContextTracker::new(spec.kind, spec.params);
        if spec.params > 0 {
            tracker.enter_context(spec.params - 1);
        }
        self.frames.push(RoutineFrame {
            spec,
            tracker,
            finally: Vec::new(),
        });
        let generated = body(self);
        let result = generated.and_then(|ops| self.finish_routine(ops));
        let frame = self.frames.pop();
        let (mut routine, frame) = match (result, frame) {
            (Ok(routine), Some(frame)) => (routine, frame),
            (Err(error), _) => return Err(error),
            (Ok(_), None) => return Err(self.no_routine()),
        };
        let mut tracker = frame.tracker;
        routine.try_catches = tracker.take_try_catches();
        routine.max_locals = tracker.max_locals();
        routine.max_stack = tracker.max_pending() as u16;
        trace!(
            unit = %self.unit_name,
            routine = %routine.name,
            ops = routine.body.len(),
            "generated routine"
        );
        self.routines.push(routine);
        Ok(())
    }

    fn finish_routine(&mut self, mut ops: Vec<Operation>) -> Result<Routine, CompileError> {
        let pending = self.pending()?;
        if pending != 0 {
            return Err(self.defect(format!("routine body ended with {pending} pending values")));
        }
        let falls_through = ops
            .iter()
            .rev()
            .find(|op| !matches!(op, Operation::Position(_) | Operation::Divider))
            .is_none_or(|op| !op.is_terminal());
        let spec = self.frame()?.spec.clone();
        if falls_through {
            match spec.returns {
                ReturnKind::Void => self.emit(&mut ops, Operation::ReturnVoid)?,
                ReturnKind::Value => {
                    self.emit(&mut ops, Operation::Push(Constant::Null))?;
                    self.emit(&mut ops, Operation::Return)?;
                }
                ReturnKind::Signal => {
                    self.emit(&mut ops, Operation::intrinsic(Intrinsic::SignalNormal))?;
                    self.emit(&mut ops, Operation::Return)?;
                }
            }
        }
        Ok(Routine {
            name: spec.name,
            kind: spec.kind,
            params: spec.params,
            returns: spec.returns,
            body: ops,
            try_catches: Vec::new(),
            max_locals: 0,
            max_stack: 0,
            origin: spec.origin,
        })
    }

    fn reserve_name(&mut self, name: &str) -> Result<(), CompileError> {
        if self.routine_names.insert(name.to_ascii_lowercase()) {
            return Ok(());
        }
        let message = format!("duplicate routine `{name}`");
        Err(match self.nodes.last() {
            Some(node) => CompileError::invalid(node, message),
            None => CompileError::Inconsistency {
                reason: message,
                kind: "Unit",
                text: self.unit_name.to_string(),
                span: Span::default(),
            },
        })
    }

    pub fn next_closure_name(&mut self, lambda: bool) -> EcoString {
        if lambda {
            self.lambdas += 1;
            eco_format!("_lambda_{}", self.lambdas - 1)
        } else {
            self.closures += 1;
            eco_format!("_closure_{}", self.closures - 1)
        }
    }

    pub fn next_default_name(&mut self) -> EcoString {
        self.defaults += 1;
        eco_format!("_default_{}", self.defaults - 1)
    }

    /// Whether function declarations currently become instance methods.
    pub fn declaring_methods(&self) -> bool {
        self.declaring_methods
    }

    pub fn set_declaring_methods(&mut self, methods: bool) -> bool {
        core::mem::replace(&mut self.declaring_methods, methods)
    }

    pub fn set_entry(&mut self, kind: UnitKind, routine: impl Into<EcoString>) {
        self.entry = Some((kind, routine.into()));
    }
}
