//! Size model of the target engine.
//!
//! Prices are in bytes of the engine's instruction encoding and are always an
//! upper bound of the real encoding: an estimate may over-split a routine but
//! never lets one past the engine's ceiling.

use hashbrown::HashMap;

use super::{Constant, Dispatch, Label, Operation};

/// Largest estimated routine size accepted without splitting. The engine's
/// hard ceiling is 65 535 bytes; the gap absorbs header and metadata the
/// splitter does not account for.
pub const BYTECODE_SIZE_LIMIT: usize = 55_000;

/// Price of an operation the model does not classify.
pub const UNCLASSIFIED_SIZE: usize = 6;

const COMPACT_JUMP: usize = 3;
const WIDE_JUMP: usize = 5;
const COMPACT_BRANCH: usize = 3;
// Inverted compact branch over a wide jump.
const WIDE_BRANCH: usize = 8;

/// Largest forward or backward distance a compact jump can encode.
const COMPACT_RANGE: usize = i16::MAX as usize;

/// Size of one operation, assuming the wide form of every jump.
pub fn size_of(op: &Operation) -> usize {
    match op {
        Operation::Push(constant) => constant_size(constant),
        Operation::PushKey(index) => 3 + int_size(*index as i64) + 1,
        Operation::Load(slot) | Operation::Store(slot) => slot_size(*slot),
        Operation::Increment { slot, delta } => {
            if *slot <= u8::MAX as u16 && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Operation::Dup | Operation::Pop | Operation::Swap => 1,
        Operation::NewArray => 3,
        Operation::ArrayStore | Operation::ArrayLoad | Operation::ArrayLength => 1,
        Operation::Call { callee, .. } => match callee.dispatch() {
            Dispatch::Static | Dispatch::Virtual => 3,
            Dispatch::Interface | Dispatch::Dynamic => 5,
        },
        Operation::Branch { .. } => WIDE_BRANCH,
        Operation::Jump(_) => WIDE_JUMP,
        Operation::TableSwitch { targets, .. } => 16 + 4 * targets.len(),
        Operation::LookupSwitch { arms, .. } => 12 + 8 * arms.len(),
        Operation::Label(_) | Operation::Position(_) | Operation::Divider => 0,
        Operation::Return | Operation::ReturnVoid | Operation::Throw => 1,
        Operation::Opaque { .. } => UNCLASSIFIED_SIZE,
    }
}

fn slot_size(slot: u16) -> usize {
    match slot {
        0..=3 => 1,
        4..=255 => 2,
        _ => 4,
    }
}

fn int_size(value: i64) -> usize {
    if (-1..=5).contains(&value) {
        1
    } else if i8::try_from(value).is_ok() {
        2
    } else {
        // sipush, or a constant-pool load for anything wider
        3
    }
}

fn constant_size(constant: &Constant) -> usize {
    match constant {
        Constant::Null => 1,
        Constant::Int(i) => int_size(*i),
        // Boxed booleans are static field loads.
        Constant::Bool(_) => 3,
        Constant::Float(_) | Constant::Str(_) => 3,
    }
}

/// Estimated size of a whole stream.
pub fn estimate(ops: &[Operation]) -> usize {
    estimate_each(ops).into_iter().sum()
}

/// Per-operation estimate of a stream.
///
/// Jumps start out wide; a second pass narrows every jump whose distance,
/// measured with the upper-bound prices, fits the compact range. Narrowing
/// only shrinks the stream, so distances measured before it remain bounds.
pub fn estimate_each(ops: &[Operation]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(ops.len());
    let mut labels: HashMap<Label, usize> = HashMap::new();
    let mut offset = 0;
    for op in ops {
        offsets.push(offset);
        if let Operation::Label(label) = op {
            labels.insert(*label, offset);
        }
        offset += size_of(op);
    }

    let fits = |from: usize, label: &Label| {
        labels
            .get(label)
            .is_some_and(|&to| from.abs_diff(to) <= COMPACT_RANGE)
    };

    ops.iter()
        .zip(&offsets)
        .map(|(op, &at)| match op {
            Operation::Jump(target) if fits(at, target) => COMPACT_JUMP,
            Operation::Branch { target, .. } if fits(at, target) => COMPACT_BRANCH,
            _ => size_of(op),
        })
        .collect()
}
