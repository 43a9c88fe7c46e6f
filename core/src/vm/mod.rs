//! Reference stack machine for compiled units.
//!
//! The machine runs [`Operation`](crate::ops::Operation) streams directly and
//! delegates every runtime service to a [`Host`]. It exists so that split and
//! unsplit units can be executed side by side and compared.

mod error;
mod machine;
mod stack;
mod value;


pub use error::ExecutionError;
pub use machine::{Host, Invoker, Machine};
pub use value::{FlowSignal, Value};

pub(crate) use stack::Stack;
