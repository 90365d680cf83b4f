//! Error types.

use crate::ir::{Block, Type, Var};

/// An error that prevents a dataflow analysis run from producing a
/// result. A run that fails never returns a partial block-state table.
#[derive(Debug)]
pub enum DataflowError {
    /// The entry block is not part of the graph.
    InvalidEntry(Block),
    /// An edge names a block that is not part of the graph.
    DanglingEdge { from: Block, to: Block },
    /// The successor list of `from` and the predecessor list of `to`
    /// disagree about the edge between them.
    InconsistentEdge { from: Block, to: Block },
    /// An element names a variable the environment does not declare.
    UnknownVariable { block: Block, index: usize, var: Var },
    /// An element uses a variable whose type the environment cannot
    /// model.
    UnsupportedType {
        block: Block,
        index: usize,
        var: Var,
        ty: Type,
    },
    /// The observer callback failed.
    Observer(anyhow::Error),
}

impl std::fmt::Display for DataflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DataflowError::InvalidEntry(block) => {
                write!(f, "entry block {} is not part of the graph", block)
            }
            DataflowError::DanglingEdge { from, to } => {
                write!(f, "edge {} -> {} names a block outside the graph", from, to)
            }
            DataflowError::InconsistentEdge { from, to } => write!(
                f,
                "edge {} -> {} is missing from one side of the predecessor/successor lists",
                from, to
            ),
            DataflowError::UnknownVariable { block, index, var } => write!(
                f,
                "element {} of {} uses undeclared variable {}",
                index, block, var
            ),
            DataflowError::UnsupportedType {
                block,
                index,
                var,
                ty,
            } => write!(
                f,
                "element {} of {} uses variable {} of type `{}`, \
                 which the environment cannot model",
                index, block, var, ty
            ),
            DataflowError::Observer(err) => write!(f, "observer failed: {}", err),
        }
    }
}

impl std::error::Error for DataflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataflowError::Observer(err) => Some(&**err),
            _ => None,
        }
    }
}
