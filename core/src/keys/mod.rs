//! Literal identifiers shared across a compiled unit.
//!
//! During generation every member name, variable name and argument name is
//! interned into the unit's [`KeyTable`]; routines refer to it by index with
//! [`Operation::PushKey`](crate::ops::Operation::PushKey). At load time the
//! `_init_keys` routine turns the frozen literals into runtime [`Key`]s.

mod table;


pub use table::{FrozenKeys, INIT_KEYS_ROUTINE, KeyTable, Literal};

use core::fmt;
use core::hash::{Hash, Hasher};

use ecow::EcoString;
use serde::{Deserialize, Serialize};

/// Runtime name of a variable, member or argument.
///
/// Names are case-insensitive: `Key::of("Foo") == Key::of("FOO")`. The
/// original spelling is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    name: EcoString,
}

impl Key {
    pub fn of(name: impl Into<EcoString>) -> Self {
        Self { name: name.into() }
    }

    pub fn of_int(value: i64) -> Self {
        Self { name: ecow::eco_format!("{value}") }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.name.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&Literal> for Key {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Str(s) => Key::of(s.clone()),
            Literal::Int(i) => Key::of_int(*i),
        }
    }
}
