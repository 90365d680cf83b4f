//! flowsense: a flow-sensitive dataflow analysis framework.
//!
//! Analyses describe a program property as a [`pass::Lattice`] value plus
//! per-element transfer functions ([`pass::DataflowAnalysis`]); the engine
//! in [`pass::dataflow`] solves them to a fixed point over the blocks of a
//! [`ir::FunctionBody`].

pub mod cfg;
pub mod entity;
pub mod env;
mod errors;
pub mod ir;
pub mod pass;
pub mod passes;

pub use errors::*;
