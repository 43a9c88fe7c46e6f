//! Splitting of routines that exceed the target's size limit.
//!
//! A routine whose estimated size reaches the limit is cut at statement
//! dividers into segments, each compiled as its own routine returning a flow
//! signal. The original routine keeps its name and shape and becomes a header
//! that calls the segments in order, passing its parameters through:
//!
//! ```text
//! load params; call _split_r_0_n
//! dup; SignalIsNormal; branch IfTrue next
//! <return the signal to the caller, unwrapped for value routines>
//! next: pop
//! load params; call _split_r_1_n
//! ...
//! <implicit return>
//! ```
//!
//! A divider is only a valid cut when nothing crosses it: no jump, switch or
//! exception handler reaches across, and no local slot that is written
//! anywhere in the routine is referenced on both sides. Slots that are never
//! written (parameters, the context) are passed to every segment unchanged.


use core::sync::atomic::{AtomicU32, Ordering};

use ecow::{EcoString, eco_format};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, info, trace};

use crate::api::CompileError;
use crate::ops::{
    BYTECODE_SIZE_LIMIT, Callee, Condition, Constant, Intrinsic, Label, Operation, estimate, estimate_each,
};
use crate::unit::{Origin, ReturnKind, Routine, TryCatch};

/// A contiguous piece of a routine body, rewritten to return a flow signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub ops: Vec<Operation>,
    pub try_catches: Vec<TryCatch>,
    pub estimated_size: usize,
    /// Whether the segment contains a `return` of the original routine.
    pub may_exit_early: bool,
}

#[derive(Debug)]
pub struct RoutineSplitter {
    limit: usize,
    /// Distinguishes segment names across split calls.
    counter: AtomicU32,
}

impl Default for RoutineSplitter {
    fn default() -> Self {
        Self::new(BYTECODE_SIZE_LIMIT)
    }
}

impl RoutineSplitter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            counter: AtomicU32::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Return `routine` unchanged if it fits, otherwise the header followed
    /// by its segments.
    pub fn process_routine(&self, routine: Routine) -> Result<Vec<Routine>, CompileError> {
        let size = routine.estimated_size();
        if size < self.limit {
            return Ok(vec![routine]);
        }

        let cuts = self.cut_points(&routine);
        if cuts.is_empty() {
            return Err(unsplittable(&routine.name, size, self.limit));
        }

        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut names = Vec::with_capacity(cuts.len() + 1);
        let mut segments = Vec::with_capacity(cuts.len() + 1);
        for (index, segment) in split_segments(&routine, &cuts).into_iter().enumerate() {
            let name = eco_format!("_split_{}_{}_{}", routine.name, index, counter);
            if segment.estimated_size >= self.limit {
                return Err(unsplittable(&name, segment.estimated_size, self.limit));
            }
            debug!(
                segment = %name,
                size = segment.estimated_size,
                exits_early = segment.may_exit_early,
                "built segment"
            );
            segments.push(segment.into_routine(name.clone(), &routine));
            names.push(name);
        }

        let header = header(&routine, &names, size)?;
        info!(
            routine = %routine.name,
            size,
            limit = self.limit,
            segments = names.len(),
            "split oversized routine"
        );
        let mut routines = Vec::with_capacity(segments.len() + 1);
        routines.push(header);
        routines.extend(segments);
        Ok(routines)
    }

    /// Dividers to cut at: walking the body, cut at the first candidate once
    /// at least half the limit has accumulated since the previous cut.
    pub fn cut_points(&self, routine: &Routine) -> Vec<usize> {
        let candidates = candidate_points(routine);
        trace!(routine = %routine.name, candidates = candidates.len(), "located split candidates");
        let sizes = estimate_each(&routine.body);
        let threshold = self.limit / 2;

        let mut cuts = Vec::new();
        let mut pending = candidates.into_iter().peekable();
        let mut accumulated = 0;
        for (index, size) in sizes.into_iter().enumerate() {
            if pending.next_if_eq(&index).is_some() && accumulated >= threshold {
                cuts.push(index);
                accumulated = 0;
            }
            accumulated += size;
        }
        cuts
    }
}

/// Indices of the dividers a routine may be cut at. A cut at `i` puts
/// operation `i` first in the next segment.
pub fn candidate_points(routine: &Routine) -> Vec<usize> {
    let ops = &routine.body;
    let mut positions: HashMap<Label, usize> = HashMap::new();
    for (index, op) in ops.iter().enumerate() {
        if let Operation::Label(label) = op {
            if positions.insert(*label, index).is_some() {
                return Vec::new();
            }
        }
    }

    // Difference array: a span covering operations `a..=b` forbids every cut in `a+1..=b`.
    let mut crossing = vec![0i32; ops.len() + 1];
    let mut forbid = |a: usize, b: usize| {
        let (low, high) = (a.min(b), a.max(b));
        crossing[low + 1] += 1;
        crossing[high + 1] -= 1;
    };

    for (index, op) in ops.iter().enumerate() {
        for label in op.label_refs() {
            let Some(&target) = positions.get(&label) else {
                return Vec::new();
            };
            forbid(index, target);
        }
    }

    for entry in &routine.try_catches {
        let mut at = [0; 3];
        for (slot, label) in at.iter_mut().zip(entry.labels()) {
            let Some(&position) = positions.get(&label) else {
                return Vec::new();
            };
            *slot = position;
        }
        let (low, high) = (at.iter().min(), at.iter().max());
        if let (Some(&low), Some(&high)) = (low, high) {
            forbid(low, high);
        }
    }

    // slot -> (first reference, last reference, written)
    let mut references: HashMap<u16, (usize, usize, bool)> = HashMap::new();
    for (index, op) in ops.iter().enumerate() {
        if let Some(slot) = op.slot() {
            let entry = references.entry(slot).or_insert((index, index, false));
            entry.1 = index;
            entry.2 |= op.writes_slot();
        }
    }
    for &(first, last, written) in references.values() {
        if written {
            forbid(first, last);
        }
    }

    let mut depth = 0;
    let mut candidates = Vec::new();
    for (index, op) in ops.iter().enumerate() {
        depth += crossing[index];
        if index > 0 && depth == 0 && *op == Operation::Divider {
            candidates.push(index);
        }
    }
    candidates
}

/// Cut the body at `cuts` into segments.
pub fn split_segments(routine: &Routine, cuts: &[usize]) -> Vec<Segment> {
    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(0);
    bounds.extend_from_slice(cuts);
    bounds.push(routine.body.len());
    bounds
        .windows(2)
        .map(|w| Segment::build(&routine.body[w[0]..w[1]], routine.returns, &routine.try_catches))
        .collect()
}

impl Segment {
    fn build(slice: &[Operation], returns: ReturnKind, try_catches: &[TryCatch]) -> Self {
        let mut ops = Vec::with_capacity(slice.len() + 2);
        let mut may_exit_early = false;
        for op in slice {
            match op {
                Operation::Divider => {}
                Operation::Return => {
                    may_exit_early = true;
                    if returns != ReturnKind::Signal {
                        ops.push(Operation::intrinsic(Intrinsic::SignalReturn));
                    }
                    ops.push(Operation::Return);
                }
                Operation::ReturnVoid => {
                    may_exit_early = true;
                    ops.push(Operation::Push(Constant::Null));
                    ops.push(Operation::intrinsic(Intrinsic::SignalReturn));
                    ops.push(Operation::Return);
                }
                _ => ops.push(op.clone()),
            }
        }

        let falls_through = ops
            .iter()
            .rev()
            .find(|op| !matches!(op, Operation::Position(_)))
            .is_none_or(|op| !op.is_terminal());
        if falls_through {
            ops.push(Operation::intrinsic(Intrinsic::SignalNormal));
            ops.push(Operation::Return);
        }

        let defined: HashSet<Label> = ops
            .iter()
            .filter_map(|op| match op {
                Operation::Label(label) => Some(*label),
                _ => None,
            })
            .collect();
        let try_catches = try_catches
            .iter()
            .filter(|entry| entry.labels().iter().all(|label| defined.contains(label)))
            .copied()
            .collect();

        Segment {
            estimated_size: estimate(&ops),
            ops,
            try_catches,
            may_exit_early,
        }
    }

    fn into_routine(self, name: EcoString, parent: &Routine) -> Routine {
        Routine {
            name,
            kind: parent.kind,
            params: parent.params,
            returns: ReturnKind::Signal,
            body: self.ops,
            try_catches: self.try_catches,
            max_locals: parent.max_locals,
            max_stack: parent.max_stack.max(1),
            origin: Origin::Segment {
                parent: parent.name.clone(),
            },
        }
    }
}

/// The routine that replaces `parent`: calls each segment and returns early
/// on the first signal that is not `Normal`.
fn header(parent: &Routine, segments: &[EcoString], size: usize) -> Result<Routine, CompileError> {
    let Ok(argc) = u8::try_from(parent.params) else {
        return Err(unsplittable(&parent.name, size, usize::from(u8::MAX)));
    };
    let mut body = Vec::with_capacity(segments.len() * (parent.params as usize + 8) + 2);
    for (index, name) in segments.iter().enumerate() {
        let next = Label(index as u32);
        body.extend((0..parent.params).map(Operation::Load));
        body.push(Operation::call(Callee::Routine(name.clone()), argc));
        body.push(Operation::Dup);
        body.push(Operation::intrinsic(Intrinsic::SignalIsNormal));
        body.push(Operation::Branch {
            condition: Condition::IfTrue,
            target: next,
        });
        match parent.returns {
            ReturnKind::Value => {
                body.push(Operation::intrinsic(Intrinsic::SignalUnwrap));
                body.push(Operation::Return);
            }
            ReturnKind::Void => {
                body.push(Operation::Pop);
                body.push(Operation::ReturnVoid);
            }
            ReturnKind::Signal => body.push(Operation::Return),
        }
        body.push(Operation::Label(next));
        body.push(Operation::Pop);
    }
    match parent.returns {
        ReturnKind::Value => {
            body.push(Operation::Push(Constant::Null));
            body.push(Operation::Return);
        }
        ReturnKind::Void => body.push(Operation::ReturnVoid),
        ReturnKind::Signal => {
            body.push(Operation::intrinsic(Intrinsic::SignalNormal));
            body.push(Operation::Return);
        }
    }

    Ok(Routine {
        name: parent.name.clone(),
        kind: parent.kind,
        params: parent.params,
        returns: parent.returns,
        body,
        try_catches: Vec::new(),
        max_locals: parent.params,
        max_stack: parent.params.max(2),
        origin: parent.origin.clone(),
    })
}

fn unsplittable(routine: &EcoString, size: usize, limit: usize) -> CompileError {
    CompileError::Unsplittable {
        routine: routine.clone(),
        size,
        limit,
    }
}
