//! Postorder of the blocks reachable from the entry.

use crate::entity::PerEntity;
use crate::ir::{Block, FunctionBody};
use smallvec::SmallVec;

/// Blocks reachable from `body.entry`, in postorder. Successors are
/// visited in terminator order; unreachable blocks are omitted.
pub fn calculate(body: &FunctionBody) -> Vec<Block> {
    let mut order = Vec::with_capacity(body.blocks.len());
    let mut visited: PerEntity<Block, bool> = PerEntity::default();

    // Explicit DFS stack of (block, index of next successor to visit).
    let mut stack: SmallVec<[(Block, usize); 64]> = SmallVec::new();
    visited[body.entry] = true;
    stack.push((body.entry, 0));

    while let Some(&mut (block, ref mut next)) = stack.last_mut() {
        let succs = &body.blocks[block].succs;
        match succs.get(*next) {
            Some(&succ) => {
                *next += 1;
                if !visited[succ] {
                    visited[succ] = true;
                    stack.push((succ, 0));
                }
            }
            None => {
                log::trace!("postorder: {} is #{}", block, order.len());
                order.push(block);
                stack.pop();
            }
        }
    }

    order
}
