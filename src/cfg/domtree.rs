//! Dominator tree, after "A Simple, Fast Dominance Algorithm" (Cooper,
//! Harvey and Kennedy, Rice TR-06-33870).

use crate::entity::{EntityRef, PerEntity, Slots};
use crate::ir::{Block, FunctionBody};

/// Immediate dominators of the blocks numbered by `rpo_index` (reverse
/// postorder, entry first). The entry and unreachable blocks map to
/// `Block::invalid()`.
pub fn calculate(body: &FunctionBody, rpo_index: &Slots<Block>) -> PerEntity<Block, Block> {
    let rpo = rpo_index.order();

    // Work on RPO numbers: idom[i] is the RPO number of block i's
    // immediate dominator, once known.
    let mut idom: Vec<Option<usize>> = vec![None; rpo.len()];
    if !rpo.is_empty() {
        idom[0] = Some(0);
    }

    let intersect = |idom: &[Option<usize>], mut a: usize, mut b: usize| -> usize {
        while a != b {
            while a > b {
                a = idom[a].unwrap_or(0);
            }
            while b > a {
                b = idom[b].unwrap_or(0);
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for i in 1..rpo.len() {
            let mut new_idom = None;
            for &pred in &body.blocks[rpo[i]].preds {
                let p = match rpo_index.get(pred) {
                    Some(p) if idom[p].is_some() => p,
                    _ => continue,
                };
                new_idom = Some(match new_idom {
                    None => p,
                    Some(current) => intersect(&idom, p, current),
                });
            }
            if new_idom.is_some() && new_idom != idom[i] {
                idom[i] = new_idom;
                changed = true;
            }
        }
    }

    let mut result = PerEntity::default();
    for (i, &block) in rpo.iter().enumerate().skip(1) {
        result[block] = idom[i].map_or(Block::invalid(), |d| rpo[d]);
    }
    if let Some(&entry) = rpo.first() {
        result[entry] = Block::invalid();
    }
    log::trace!("domtree: {:?}", result);
    result
}

/// Whether `a` dominates `b` (reflexively), walking up from `b`.
pub fn dominates(idom: &PerEntity<Block, Block>, a: Block, mut b: Block) -> bool {
    loop {
        if a == b {
            return true;
        }
        if b.is_invalid() {
            return false;
        }
        b = idom[b];
    }
}
