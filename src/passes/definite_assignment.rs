//! Definite-assignment analysis.
//!
//! A variable is definitely assigned at a point if every path from the
//! entry to that point writes it (by assignment or initializer) and does
//! not leave its scope afterward.

use crate::env::Environment;
use crate::ir::{Element, Var};
use crate::pass::{DataflowAnalysis, IntersectionSet};

#[derive(Clone, Copy, Debug, Default)]
pub struct DefiniteAssignment;

impl DataflowAnalysis for DefiniteAssignment {
    type Lattice = IntersectionSet<Var>;

    fn transfer_element(
        &self,
        element: &Element,
        assigned: &mut IntersectionSet<Var>,
        _: &mut Environment,
    ) {
        match element {
            Element::ScopeEnd(var) => {
                assigned.remove(var);
            }
            _ => {
                if let Some(var) = element.def() {
                    assigned.insert(var);
                }
            }
        }
    }
}
