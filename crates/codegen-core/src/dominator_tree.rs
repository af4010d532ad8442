//! Dominator and post-dominator trees, computed with the iterative
//! Cooper–Harvey–Kennedy algorithm, plus dominance-frontier queries (spec
//! §4.5).
//!
//! New module — grounded algorithmically on spec §4.5's description, with
//! the `SecondaryMap`-of-idom / reverse-postorder-number idiom borrowed
//! from the real Cranelift `dominator_tree.rs` file retrieved into the
//! pack (`…cranelift-codegen-src-dominator_tree.rs.rs`), adapted to this
//! crate's `cfg::ControlFlowGraph` rather than Cranelift's own.

use std::collections::HashSet;

use cranelift_entity::SecondaryMap;

use crate::cfg::ControlFlowGraph;
use crate::error::DomTreeError;
use crate::ir::entities::Block;

/// A dominator (or, built over a reversed graph, post-dominator) tree.
#[derive(Clone, Debug, Default)]
pub struct DomTree {
    idom: SecondaryMap<Block, Option<Block>>,
    rpo_number: SecondaryMap<Block, Option<u32>>,
    rpo: Vec<Block>,
    entry: Option<Block>,
}

impl DomTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the dominator tree of `cfg` rooted at `entry`.
    pub fn compute(cfg: &ControlFlowGraph, entry: Block) -> Self {
        Self::compute_generic(entry, |b| cfg.successors(b).to_vec(), |b| {
            cfg.predecessors(b).iter().map(|p| p.block).collect()
        })
    }

    /// Build the post-dominator tree of `cfg` rooted at `exit` (edges
    /// reversed: a post-dominator-tree "successor" is a CFG predecessor).
    pub fn compute_post(cfg: &ControlFlowGraph, exit: Block) -> Self {
        Self::compute_generic(
            exit,
            |b| cfg.predecessors(b).iter().map(|p| p.block).collect(),
            |b| cfg.successors(b).to_vec(),
        )
    }

    fn compute_generic(
        entry: Block,
        successors: impl Fn(Block) -> Vec<Block>,
        predecessors: impl Fn(Block) -> Vec<Block>,
    ) -> Self {
        let mut tree = DomTree { entry: Some(entry), ..Default::default() };

        // Reverse-postorder numbering over reachable blocks via an explicit
        // post-order DFS (so deep CFGs don't blow the Rust call stack).
        let mut postorder = Vec::new();
        let mut visited: HashSet<Block> = HashSet::new();
        let mut stack: Vec<(Block, usize)> = vec![(entry, 0)];
        visited.insert(entry);
        while let Some((block, next_child)) = stack.pop() {
            let succs = successors(block);
            if next_child < succs.len() {
                let child = succs[next_child];
                stack.push((block, next_child + 1));
                if visited.insert(child) {
                    stack.push((child, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        tree.rpo = postorder.into_iter().rev().collect();
        for (i, &b) in tree.rpo.iter().enumerate() {
            tree.rpo_number[b] = Some(i as u32);
        }

        tree.idom[entry] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &b in tree.rpo.iter().skip(1) {
                let preds = predecessors(b);
                let mut new_idom: Option<Block> = None;
                for p in preds {
                    if tree.idom[p].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => tree.intersect(cur, p),
                    });
                }
                if new_idom != tree.idom[b] {
                    tree.idom[b] = new_idom;
                    changed = true;
                }
            }
        }

        // The entry's self-loop idom is a computational sentinel; expose
        // it as "no idom" per spec's "entry has no idom".
        tree.idom[entry] = None;
        log::trace!("dominator_tree: computed over {} reachable block(s)", tree.rpo.len());
        tree
    }

    fn intersect(&self, a: Block, b: Block) -> Block {
        let mut finger1 = a;
        let mut finger2 = b;
        loop {
            while self.rpo_num(finger1) > self.rpo_num(finger2) {
                finger1 = self.idom[finger1].expect("walked past entry while intersecting");
            }
            while self.rpo_num(finger2) > self.rpo_num(finger1) {
                finger2 = self.idom[finger2].expect("walked past entry while intersecting");
            }
            if finger1 == finger2 {
                return finger1;
            }
        }
    }

    fn rpo_num(&self, b: Block) -> u32 {
        self.rpo_number[b].expect("rpo_num queried for an unreachable block")
    }

    pub fn entry(&self) -> Option<Block> {
        self.entry
    }

    pub fn is_reachable(&self, b: Block) -> bool {
        self.rpo_number[b].is_some()
    }

    /// The immediate dominator of `b`, or `None` for the entry / an
    /// unreachable block.
    pub fn idom(&self, b: Block) -> Option<Block> {
        self.idom[b]
    }

    /// `true` iff `a` appears on `b`'s idom chain, including `a == b`.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if !self.is_reachable(b) {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom[cur] {
                Some(next) => cur = next,
                None => return cur == a,
            }
        }
    }

    pub fn strictly_dominates(&self, a: Block, b: Block) -> bool {
        a != b && self.dominates(a, b)
    }

    /// The dominance frontier of `x`: blocks `Y` such that `x` dominates
    /// some predecessor of `Y` but does not strictly dominate `Y` itself.
    /// Computed per spec §4.5: collect every block `x` dominates, then
    /// scan their successors.
    pub fn dominance_frontier(
        &self,
        x: Block,
        all_blocks: impl IntoIterator<Item = Block>,
        successors: impl Fn(Block) -> Vec<Block>,
    ) -> HashSet<Block> {
        let dominated: Vec<Block> = all_blocks.into_iter().filter(|&b| self.dominates(x, b)).collect();
        let mut frontier = HashSet::new();
        for d in dominated {
            for s in successors(d) {
                if !self.strictly_dominates(x, s) {
                    frontier.insert(s);
                }
            }
        }
        frontier
    }

    /// Checks: entry has no idom; every reachable non-entry block has one;
    /// `idom(b)` dominates every predecessor of `b`; no cycles in the idom
    /// chain.
    pub fn verify(&self, predecessors: impl Fn(Block) -> Vec<Block>) -> Result<(), DomTreeError> {
        let result = self.verify_inner(predecessors);
        match &result {
            Ok(()) => log::trace!("dominator_tree: verify passed"),
            Err(e) => log::warn!("dominator_tree: verify failed: {e}"),
        }
        result
    }

    fn verify_inner(&self, predecessors: impl Fn(Block) -> Vec<Block>) -> Result<(), DomTreeError> {
        let Some(entry) = self.entry else { return Ok(()) };
        if self.idom[entry].is_some() {
            return Err(DomTreeError::EntryBlockHasIdom);
        }
        for &b in &self.rpo {
            if b == entry {
                continue;
            }
            let Some(idom) = self.idom[b] else {
                return Err(DomTreeError::ReachableBlockWithoutIdom);
            };
            for p in predecessors(b) {
                if self.is_reachable(p) && !self.dominates(idom, p) {
                    return Err(DomTreeError::IdomDoesNotDominatePredecessor);
                }
            }
            let mut cur = b;
            let mut steps = 0usize;
            loop {
                debug_assert!(steps <= self.rpo.len(), "dominator cycle check must terminate finitely");
                steps += 1;
                match self.idom[cur] {
                    None => break,
                    Some(next) if next == cur => return Err(DomTreeError::DominatorTreeCycle),
                    Some(next) => cur = next,
                }
                if steps > self.rpo.len() {
                    return Err(DomTreeError::DominatorTreeCycle);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::{CallConv, Function, Signature};
    use crate::ir::instructions::InstructionData;

    fn diamond() -> (Function, Block, Block, Block, Block) {
        let mut f = Function::with_name_str("diamond", Signature::new(CallConv::SystemV));
        let entry = f.create_block();
        let left = f.create_block();
        let right = f.create_block();
        let join = f.create_block();
        let cond = f.dfg.append_block_param(entry, crate::ir::types::Type::I32);
        let to_left = f.dfg.block_call(left, &[]);
        let to_right = f.dfg.block_call(right, &[]);
        f.append_inst(InstructionData::Branch { arg: cond, blocks: [to_left, to_right] }, entry);
        let l_to_join = f.dfg.block_call(join, &[]);
        f.append_inst(InstructionData::Jump { destination: l_to_join }, left);
        let r_to_join = f.dfg.block_call(join, &[]);
        f.append_inst(InstructionData::Jump { destination: r_to_join }, right);
        (f, entry, left, right, join)
    }

    #[test]
    fn diamond_dominators() {
        let (mut f, entry, left, right, join) = diamond();
        let cfg = f.compute_cfg();
        let dt = DomTree::compute(cfg, entry);
        assert_eq!(dt.idom(entry), None);
        assert_eq!(dt.idom(left), Some(entry));
        assert_eq!(dt.idom(right), Some(entry));
        assert_eq!(dt.idom(join), Some(entry));
        assert!(dt.dominates(entry, join));
        assert!(!dt.strictly_dominates(left, join));
        assert!(dt.verify(|b| cfg.predecessors(b).iter().map(|p| p.block).collect()).is_ok());
    }

    #[test]
    fn loop_dominators() {
        // entry -> header -> body -> header (back edge), header -> exit
        let mut f = Function::with_name_str("loop", Signature::new(CallConv::SystemV));
        let entry = f.create_block();
        let header = f.create_block();
        let body = f.create_block();
        let exit = f.create_block();

        let to_header = f.dfg.block_call(header, &[]);
        f.append_inst(InstructionData::Jump { destination: to_header }, entry);

        let cond = f.dfg.append_block_param(header, crate::ir::types::Type::I32);
        let to_body = f.dfg.block_call(body, &[]);
        let to_exit = f.dfg.block_call(exit, &[]);
        f.append_inst(InstructionData::Branch { arg: cond, blocks: [to_body, to_exit] }, header);

        let back_to_header = f.dfg.block_call(header, &[]);
        f.append_inst(InstructionData::Jump { destination: back_to_header }, body);

        let cfg = f.compute_cfg();
        let dt = DomTree::compute(cfg, entry);
        assert_eq!(dt.idom(header), Some(entry));
        assert_eq!(dt.idom(body), Some(header));
        assert_eq!(dt.idom(exit), Some(header));
        assert!(dt.dominates(header, body));
        assert!(dt.verify(|b| cfg.predecessors(b).iter().map(|p| p.block).collect()).is_ok());
    }

    #[test]
    fn dominance_frontier_of_diamond_branches() {
        let (mut f, entry, left, right, join) = diamond();
        let cfg = f.compute_cfg();
        let dt = DomTree::compute(cfg, entry);
        let all = [entry, left, right, join];
        let frontier = dt.dominance_frontier(left, all, |b| cfg.successors(b).to_vec());
        assert_eq!(frontier, HashSet::from([join]));
        let entry_frontier = dt.dominance_frontier(entry, all, |b| cfg.successors(b).to_vec());
        assert!(entry_frontier.is_empty());
    }
}
