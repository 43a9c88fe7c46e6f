//! Per-routine generation bookkeeping.
//!
//! A [`ContextTracker`] belongs to exactly one routine under construction. It
//! hands out local slots, keeps the stack of active lexical contexts, mirrors
//! the depth of the evaluation stack, and collects labels, loops and the
//! try/catch table. Nothing in here is shared between routines.


use ecow::EcoString;
use smallvec::SmallVec;
use thiserror::Error;

use crate::ops::{Label, Operation};
use crate::unit::{RoutineKind, TryCatch};

/// What a local slot holds. Informational; slots are untyped on the target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotKind {
    Receiver,
    Parameter,
    Context,
    Iterator,
    Exception,
    Temporary,
}

/// Bookkeeping violation. Always a generation defect, never a user error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("popped an empty context stack")]
    EmptyContextStack,
    #[error("no active lexical context")]
    NoActiveContext,
    #[error("consumed {requested} pending values but only {available} are tracked")]
    PendingUnderflow { requested: usize, available: usize },
    #[error("pending depth {actual} is below the expected baseline {baseline}")]
    BelowBaseline { baseline: usize, actual: usize },
    #[error("local slot space exhausted")]
    SlotOverflow,
}

/// An enclosing loop that `break` and `continue` may target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopFrame {
    pub label: Option<EcoString>,
    pub break_to: Label,
    pub continue_to: Label,
    /// Number of enclosing finally blocks when the loop was entered.
    pub finally_depth: usize,
    /// Pending depth when the loop was entered.
    pub pending: usize,
}

#[derive(Debug)]
pub struct ContextTracker {
    kind: RoutineKind,
    slots: Vec<SlotKind>,
    contexts: SmallVec<[u16; 4]>,
    pending: usize,
    max_pending: usize,
    next_label: u32,
    loops: Vec<LoopFrame>,
    try_catches: Vec<TryCatch>,
}

impl ContextTracker {
    /// Tracker for a routine taking `params` arguments. Instance routines
    /// count the receiver among them and get it in slot 0.
    pub fn new(kind: RoutineKind, params: u16) -> Self {
        let mut slots = Vec::with_capacity(params as usize + 4);
        for i in 0..params {
            slots.push(if i == 0 && kind == RoutineKind::Instance {
                SlotKind::Receiver
            } else {
                SlotKind::Parameter
            });
        }
        Self {
            kind,
            slots,
            contexts: SmallVec::new(),
            pending: 0,
            max_pending: 0,
            next_label: 0,
            loops: Vec::new(),
            try_catches: Vec::new(),
        }
    }

    pub fn kind(&self) -> RoutineKind {
        self.kind
    }

    // === Slots ===

    /// Allocate a fresh slot. Slots are never reused within a routine.
    pub fn allocate_slot(&mut self, kind: SlotKind) -> Result<u16, TrackerError> {
        let index = u16::try_from(self.slots.len()).map_err(|_| TrackerError::SlotOverflow)?;
        if index == u16::MAX {
            return Err(TrackerError::SlotOverflow);
        }
        self.slots.push(kind);
        Ok(index)
    }

    pub fn slot_kind(&self, slot: u16) -> Option<SlotKind> {
        self.slots.get(slot as usize).copied()
    }

    pub fn max_locals(&self) -> u16 {
        self.slots.len() as u16
    }

    // === Lexical Contexts ===

    /// Make an existing slot (typically the context parameter) the active context.
    pub fn enter_context(&mut self, slot: u16) {
        self.contexts.push(slot);
    }

    /// Allocate a context slot and make it the active context.
    pub fn push_context(&mut self) -> Result<u16, TrackerError> {
        let slot = self.allocate_slot(SlotKind::Context)?;
        self.contexts.push(slot);
        Ok(slot)
    }

    pub fn pop_context(&mut self) -> Result<u16, TrackerError> {
        self.contexts.pop().ok_or(TrackerError::EmptyContextStack)
    }

    /// Slot of the currently active lexical context.
    pub fn current_context(&self) -> Result<u16, TrackerError> {
        self.contexts.last().copied().ok_or(TrackerError::NoActiveContext)
    }

    pub fn context_depth(&self) -> usize {
        self.contexts.len()
    }

    // === Pending Values ===

    pub fn track_pending(&mut self, n: usize) {
        self.pending += n;
        self.max_pending = self.max_pending.max(self.pending);
    }

    pub fn consume_pending(&mut self, n: usize) -> Result<(), TrackerError> {
        if n > self.pending {
            return Err(TrackerError::PendingUnderflow {
                requested: n,
                available: self.pending,
            });
        }
        self.pending -= n;
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Pops needed to bring the stack back down to `baseline`.
    pub fn discard_to(&mut self, baseline: usize) -> Result<Vec<Operation>, TrackerError> {
        if self.pending < baseline {
            return Err(TrackerError::BelowBaseline {
                baseline,
                actual: self.pending,
            });
        }
        let count = self.pending - baseline;
        self.pending = baseline;
        Ok(vec![Operation::Pop; count])
    }

    /// Reset the depth after an unconditional transfer, where the next
    /// operation is only reachable through a jump from a known depth.
    pub fn restore_pending(&mut self, depth: usize) {
        self.pending = depth;
        self.max_pending = self.max_pending.max(depth);
    }

    // === Labels, Loops and Handlers ===

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn push_loop(&mut self, frame: LoopFrame) {
        self.loops.push(frame);
    }

    pub fn pop_loop(&mut self) -> Option<LoopFrame> {
        self.loops.pop()
    }

    /// Innermost loop, or the innermost loop carrying `label`.
    pub fn find_loop(&self, label: Option<&str>) -> Option<&LoopFrame> {
        match label {
            None => self.loops.last(),
            Some(name) => self
                .loops
                .iter()
                .rev()
                .find(|frame| frame.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(name))),
        }
    }

    pub fn add_try_catch(&mut self, entry: TryCatch) {
        self.try_catches.push(entry);
    }

    pub fn take_try_catches(&mut self) -> Vec<TryCatch> {
        core::mem::take(&mut self.try_catches)
    }
}
