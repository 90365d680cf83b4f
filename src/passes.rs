//! Reference analyses built on the pass framework.

pub mod constants;
pub mod definite_assignment;

pub use constants::ConstantPropagation;
pub use definite_assignment::DefiniteAssignment;
