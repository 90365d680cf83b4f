//! Lightweight CFG analyses: structural validation and block ordering.

use crate::declare_entity;
use crate::entity::{EntityRef, EntityVec, PerEntity};
use crate::errors::DataflowError;
use crate::ir::{Block, FunctionBody};
use smallvec::SmallVec;

declare_entity!(RPOIndex, "rpo");

/// Auxiliary analyses of the control-flow graph.
#[derive(Clone, Debug)]
pub struct CFGInfo {
    /// Entry block.
    pub entry: Block,
    /// Reverse-postorder traversal of the blocks reachable from entry.
    pub rpo: EntityVec<RPOIndex, Block>,
    /// Position of each block in RPO, if reachable.
    pub rpo_pos: PerEntity<Block, Option<RPOIndex>>,
}

impl CFGInfo {
    /// Validates the graph's edges and computes the block order.
    ///
    /// Every successor edge must be mirrored by a predecessor edge (with
    /// the same multiplicity) and name a block that exists.
    pub fn new(f: &FunctionBody) -> Result<CFGInfo, DataflowError> {
        if !f.blocks.contains(f.entry) {
            return Err(DataflowError::InvalidEntry(f.entry));
        }
        for (block, def) in f.blocks.entries() {
            for &succ in &def.succs {
                let succ_def = match f.blocks.get(succ) {
                    Some(succ_def) => succ_def,
                    None => {
                        return Err(DataflowError::DanglingEdge {
                            from: block,
                            to: succ,
                        })
                    }
                };
                let forward = def.succs.iter().filter(|&&b| b == succ).count();
                let backward = succ_def.preds.iter().filter(|&&b| b == block).count();
                if forward != backward {
                    return Err(DataflowError::InconsistentEdge {
                        from: block,
                        to: succ,
                    });
                }
            }
            for &pred in &def.preds {
                let pred_def = match f.blocks.get(pred) {
                    Some(pred_def) => pred_def,
                    None => {
                        return Err(DataflowError::DanglingEdge {
                            from: pred,
                            to: block,
                        })
                    }
                };
                if !pred_def.succs.contains(&block) {
                    return Err(DataflowError::InconsistentEdge {
                        from: pred,
                        to: block,
                    });
                }
            }
        }

        let rpo = EntityVec::from(reverse_postorder(f));
        let mut rpo_pos = PerEntity::default();
        for (index, &block) in rpo.entries() {
            rpo_pos[block] = Some(index);
        }
        log::debug!("cfg {}: rpo {:?}", f.name, rpo.values().collect::<Vec<_>>());

        Ok(CFGInfo {
            entry: f.entry,
            rpo,
            rpo_pos,
        })
    }

    pub fn is_reachable(&self, block: Block) -> bool {
        self.rpo_pos[block].is_some()
    }

    pub fn reachable_blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.rpo.values().copied()
    }
}

/// Computes the reverse postorder of the blocks reachable from the entry
/// block, visiting successors in their listed order.
fn reverse_postorder(f: &FunctionBody) -> Vec<Block> {
    let mut postorder = Vec::with_capacity(f.blocks.len());
    let mut visited: EntityVec<Block, bool> = EntityVec::from_fn(f.blocks.len(), |_| false);

    // Explicit DFS stack of (block, index of next successor to visit).
    let mut stack: SmallVec<[(Block, usize); 64]> = SmallVec::new();
    visited[f.entry] = true;
    stack.push((f.entry, 0));

    while let Some((block, next_succ)) = stack.last_mut() {
        let succs = &f.blocks[*block].succs;
        if *next_succ < succs.len() {
            let succ = succs[*next_succ];
            *next_succ += 1;
            if !visited[succ] {
                log::trace!("rpo: {} -> visiting {}", block, succ);
                visited[succ] = true;
                stack.push((succ, 0));
            }
        } else {
            log::trace!("rpo: retreating from {}", block);
            postorder.push(*block);
            stack.pop();
        }
    }

    postorder.reverse();
    postorder
}
