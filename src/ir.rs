//! Function-body IR consumed by the dataflow engine.
//!
//! A function body is a list of basic blocks, each holding an ordered
//! sequence of program elements, plus explicit predecessor and successor
//! edges and a designated entry block. Bodies are built either through
//! the `FunctionBody` builder methods or by parsing the text format (see
//! [`parse_function`]).

use crate::declare_entity;

declare_entity!(Block, "block");
declare_entity!(Var, "v");

mod display;
mod element;
mod func;
mod parse;

pub use display::*;
pub use element::*;
pub use func::*;
pub use parse::*;

/// The declared type of a variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    I64,
    Bool,
    /// An aggregate known only by name. Representable in the IR, but not
    /// in the environment model.
    Record(String),
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Type::I64 => write!(f, "i64"),
            Type::Bool => write!(f, "bool"),
            Type::Record(name) => write!(f, "record {}", name),
        }
    }
}
