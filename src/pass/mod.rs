//! Pass framework: lattices, analyses and the fixed-point engine.
//!
//! Terminology note: a "pass" is a readonly analysis of a function
//! body. It does not mutate code; it only traverses the code in a
//! certain order, possibly multiple times (to converge), in order to
//! compute some derived information.

pub mod analysis;
pub use analysis::*;
pub mod dataflow;
pub use dataflow::*;
pub mod erased;
pub use erased::*;
pub mod lattice;
pub use lattice::*;
