//! Routines and compiled units: the artifacts the backend produces.


use core::fmt;

use ecow::EcoString;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::keys::FrozenKeys;
use crate::ops::{self, Label, Operation};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutineKind {
    Static,
    /// Slot 0 holds the receiver.
    Instance,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnKind {
    Void,
    Value,
    /// A flow-control signal (split segments).
    Signal,
}

/// Where a routine came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Entry point of a script or pseudo-constructor of a class.
    Body,
    Function,
    Closure,
    Lambda,
    /// Default-value expression of a declared argument.
    Default,
    KeyInit,
    Segment { parent: EcoString },
}

/// Protected range `[start, end)` whose exceptions transfer to `handler` with
/// the thrown value as the only stack entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryCatch {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
}

impl TryCatch {
    pub fn labels(&self) -> [Label; 3] {
        [self.start, self.end, self.handler]
    }
}

/// One independently callable routine.
///
/// Calling convention: a static routine receives `params` arguments in slots
/// `0..params`; an instance routine receives the receiver in slot 0 and its
/// arguments after it, `params` counting the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub name: EcoString,
    pub kind: RoutineKind,
    pub params: u16,
    pub returns: ReturnKind,
    pub body: Vec<Operation>,
    pub try_catches: Vec<TryCatch>,
    pub max_locals: u16,
    pub max_stack: u16,
    pub origin: Origin,
}

impl Routine {
    pub fn estimated_size(&self) -> usize {
        ops::estimate(&self.body)
    }

    /// Labels defined by a `Label` operation in the body.
    pub fn defined_labels(&self) -> HashSet<Label> {
        self.body
            .iter()
            .filter_map(|op| match op {
                Operation::Label(l) => Some(*l),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RoutineKind::Static => "static",
            RoutineKind::Instance => "instance",
        };
        writeln!(
            f,
            "{kind} {}({}) -> {:?}  [locals {}, stack {}, size {}]",
            self.name,
            self.params,
            self.returns,
            self.max_locals,
            self.max_stack,
            self.estimated_size()
        )?;
        for entry in &self.try_catches {
            writeln!(f, "  try {} .. {} catch {}", entry.start, entry.end, entry.handler)?;
        }
        for (addr, op) in self.body.iter().enumerate() {
            match op {
                Operation::Label(_) => writeln!(f, "  {op}")?,
                _ => writeln!(f, "    {addr:4}  {op}")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    Script,
    Class,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitMetadata {
    pub kind: UnitKind,
    /// Routine that runs the unit body (`_invoke` or `_pseudo_constructor`).
    pub entry: EcoString,
    /// Routines that were split, with the names of their segments.
    pub splits: Vec<(EcoString, Vec<EcoString>)>,
}

/// Finalized output of compiling one fully-qualified source entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub name: EcoString,
    pub routines: Vec<Routine>,
    pub keys: FrozenKeys,
    pub metadata: UnitMetadata,
}

impl CompiledUnit {
    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routines.iter().find(|r| r.name == name)
    }

    pub fn entry(&self) -> Option<&Routine> {
        self.routine(&self.metadata.entry)
    }

    /// Encode to bytes.
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl fmt::Display for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "unit {} ({:?}, {} keys)", self.name, self.metadata.kind, self.keys.len())?;
        for routine in &self.routines {
            writeln!(f)?;
            write!(f, "{routine}")?;
        }
        Ok(())
    }
}
