//! Lightweight CFG analyses: reachability, RPO and dominance.

use crate::entity::{PerEntity, Slots};
use crate::ir::{Block, FunctionBody};

pub mod domtree;
pub mod postorder;

/// Auxiliary analyses of the control-flow graph.
#[derive(Clone, Debug)]
pub struct CFGInfo {
    /// Entry block.
    pub entry: Block,
    /// Reachable blocks numbered in reverse postorder.
    pub rpo: Slots<Block>,
    /// Immediate dominator of each block; invalid for the entry and
    /// for unreachable blocks.
    pub domtree: PerEntity<Block, Block>,
}

impl CFGInfo {
    pub fn new(f: &FunctionBody) -> CFGInfo {
        let rpo: Slots<Block> = postorder::calculate(f).into_iter().rev().collect();
        let domtree = domtree::calculate(f, &rpo);
        CFGInfo {
            entry: f.entry,
            rpo,
            domtree,
        }
    }

    /// Reflexive dominance. Unreachable blocks are dominated by nothing
    /// but themselves.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        domtree::dominates(&self.domtree, a, b)
    }

    pub fn is_reachable(&self, block: Block) -> bool {
        self.rpo.contains(block)
    }
}
