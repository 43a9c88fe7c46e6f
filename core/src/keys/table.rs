use ecow::EcoString;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::ops::{Constant, Intrinsic, Operation};
use crate::unit::{Origin, ReturnKind, Routine, RoutineKind};

/// Name of the routine that fills a unit's key array.
pub const INIT_KEYS_ROUTINE: &str = "_init_keys";

/// A literal that can name something at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Str(EcoString),
    Int(i64),
}

impl Literal {
    fn constant(&self) -> Constant {
        match self {
            Literal::Str(s) => Constant::Str(s.clone()),
            Literal::Int(i) => Constant::Int(*i),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.into())
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

/// Insertion-ordered, deduplicating literal table of one unit.
#[derive(Debug, Default)]
pub struct KeyTable {
    entries: Vec<Literal>,
    index: HashMap<Literal, u32>,
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `literal`, appending it on first sight.
    pub fn intern(&mut self, literal: impl Into<Literal>) -> u32 {
        let literal = literal.into();
        if let Some(&index) = self.index.get(&literal) {
            return index;
        }
        let index = self.entries.len() as u32;
        self.entries.push(literal.clone());
        self.index.insert(literal, index);
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn freeze(self) -> FrozenKeys {
        FrozenKeys(self.entries)
    }
}

/// The finalized key table: index `i` holds the `i`-th interned literal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrozenKeys(Vec<Literal>);

impl FrozenKeys {
    pub fn get(&self, index: u32) -> Option<&Literal> {
        self.0.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Literal> {
        self.0.iter()
    }

    /// Build `_init_keys(keys)`, storing `KeyOf(literal)` into `keys[i]` for
    /// every entry in insertion order.
    ///
    /// The array arrives as the only parameter so that each store is an
    /// independent statement; huge tables split like any other routine.
    pub fn init_routine(&self) -> Routine {
        let mut body = Vec::with_capacity(self.0.len() * 6 + 1);
        for (index, literal) in self.0.iter().enumerate() {
            body.push(Operation::Load(0));
            body.push(Operation::push_int(index as i64));
            body.push(Operation::Push(literal.constant()));
            body.push(Operation::intrinsic(Intrinsic::KeyOf));
            body.push(Operation::ArrayStore);
            body.push(Operation::Divider);
        }
        body.push(Operation::ReturnVoid);

        Routine {
            name: INIT_KEYS_ROUTINE.into(),
            kind: RoutineKind::Static,
            params: 1,
            returns: ReturnKind::Void,
            body,
            try_catches: Vec::new(),
            max_locals: 1,
            max_stack: 3,
            origin: Origin::KeyInit,
        }
    }
}
