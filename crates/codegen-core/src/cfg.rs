//! The control-flow graph derived from a function's terminators: a cache
//! the builder/verifier/dominator-tree passes all read, invalidated by any
//! terminator edit (spec §4.4).
//!
//! New module — the teacher's Mu IR has no derived-CFG cache; its blocks
//! carry no notion of "compute predecessors from terminators" at all.
//! Grounded algorithmically on spec §4.4 and, for the `SecondaryMap`-of-
//! `Vec` predecessor/successor idiom, on the real Cranelift
//! `ir/dfg.rs`/`flowgraph.rs` sources retrieved into the pack.

use cranelift_entity::SecondaryMap;
use log::debug;

use crate::error::CfgError;
use crate::ir::entities::{Block, Inst};
use crate::ir::function::Function;
use crate::ir::instructions::InstructionData;

/// A single predecessor edge: the block that branches, and the
/// instruction (always a terminator) that performs the branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPredecessor {
    pub block: Block,
    pub inst: Inst,
}

impl BlockPredecessor {
    pub fn new(block: Block, inst: Inst) -> Self {
        Self { block, inst }
    }
}

#[derive(Clone, Debug, Default)]
struct CfgNode {
    predecessors: Vec<BlockPredecessor>,
    successors: Vec<Block>,
}

/// Predecessor/successor edges for every block in a function, derived from
/// terminators. A stale cache (after a terminator edit with no matching
/// `recompute_block`/`invalidate_cfg` call) is a correctness bug in the
/// caller, not something this type can detect on its own.
#[derive(Clone, Debug, Default)]
pub struct ControlFlowGraph {
    nodes: SecondaryMap<Block, CfgNode>,
    valid: bool,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn compute(&mut self, func: &Function) {
        self.clear();
        let mut count = 0usize;
        for block in func.layout.blocks() {
            self.compute_block_edges(func, block);
            count += 1;
        }
        self.valid = true;
        debug!("cfg: computed {count} block(s)");
    }

    /// Re-derive only the edges leaving `block`, removing `block` as a
    /// predecessor everywhere it used to appear before recomputing.
    pub fn recompute_block(&mut self, func: &Function, block: Block) {
        let old_successors = std::mem::take(&mut self.nodes[block].successors);
        for succ in old_successors {
            self.nodes[succ].predecessors.retain(|p| p.block != block);
        }
        self.compute_block_edges(func, block);
        debug!("cfg: recomputed {block}, {} successor(s)", self.nodes[block].successors.len());
    }

    /// Insert a new, empty block on the critical edge `a -> b` and return
    /// the `jump` instruction the new block now ends with.
    ///
    /// `a`'s terminator is rewritten to target the new block instead of
    /// `b`, carrying whatever arguments it used to pass to `b`; those
    /// arguments are forwarded unchanged by a fresh `jump` appended to the
    /// new block. The predecessor edge this method records against `b` is
    /// that fresh jump's own handle, not `a`'s original terminator — a
    /// caller walking `predecessors(b)` afterwards must see an instruction
    /// that actually still branches to `b`.
    pub fn split_critical_edge(
        &mut self,
        func: &mut Function,
        a: Block,
        b: Block,
    ) -> Result<Inst, CfgError> {
        debug_assert!(self.is_critical_edge(a, b), "split_critical_edge called on a non-critical edge");

        let new_block = func.create_block();
        func.layout.insert_block_after(new_block, a);

        let term = func.layout.last_inst(a).ok_or(CfgError::InvalidTerminator)?;

        let mut forwarded_args = None;
        func.dfg.insts[term].visit_block_calls(&func.jump_tables, |call| {
            if forwarded_args.is_none() && call.block(&func.dfg.value_lists) == b {
                forwarded_args = Some(call.args(&func.dfg.value_lists));
            }
        });
        let forwarded_args = forwarded_args.ok_or(CfgError::MissingBranchTarget)?;

        {
            let pool = &mut func.dfg.value_lists;
            func.dfg.insts[term].visit_block_calls_mut(&mut func.jump_tables, |call| {
                if call.block(pool) == b {
                    call.set_block(new_block, pool);
                    call.clear(pool);
                }
            });
        }

        let to_b = func.dfg.block_call(b, &forwarded_args);
        let jump = func.append_inst(InstructionData::Jump { destination: to_b }, new_block);

        for succ in &mut self.nodes[a].successors {
            if *succ == b {
                *succ = new_block;
            }
        }
        self.nodes[b].predecessors.retain(|p| !(p.block == a && p.inst == term));
        self.nodes[new_block].successors.push(b);
        self.nodes[new_block].predecessors.push(BlockPredecessor::new(a, term));
        self.nodes[b].predecessors.push(BlockPredecessor::new(new_block, jump));

        debug!("cfg: split critical edge {a} -> {b} through {new_block}");
        Ok(jump)
    }

    fn compute_block_edges(&mut self, func: &Function, block: Block) {
        let Some(term) = func.layout.last_inst(block) else { return };
        for dest in Self::terminator_targets(&func.dfg.insts[term], func) {
            self.nodes[block].successors.push(dest);
            self.nodes[dest].predecessors.push(BlockPredecessor::new(block, term));
        }
    }

    fn terminator_targets(data: &InstructionData, func: &Function) -> Vec<Block> {
        let pool = &func.dfg.value_lists;
        match data {
            InstructionData::Jump { destination } => vec![destination.block(pool)],
            InstructionData::Branch { blocks, .. } => {
                blocks.iter().map(|b| b.block(pool)).collect()
            }
            InstructionData::BranchTable { table, .. } => {
                func.jump_tables.get(*table).all_target_blocks(pool)
            }
            _ => Vec::new(),
        }
    }

    pub fn predecessors(&self, block: Block) -> &[BlockPredecessor] {
        &self.nodes[block].predecessors
    }

    pub fn successors(&self, block: Block) -> &[Block] {
        &self.nodes[block].successors
    }

    pub fn predecessor_count(&self, block: Block) -> usize {
        self.nodes[block].predecessors.len()
    }

    pub fn successor_count(&self, block: Block) -> usize {
        self.nodes[block].successors.len()
    }

    /// An edge `(a, b)` is critical iff `a` has more than one successor and
    /// `b` has more than one predecessor.
    pub fn is_critical_edge(&self, a: Block, b: Block) -> bool {
        self.successor_count(a) > 1 && self.predecessor_count(b) > 1
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.valid = false;
    }
}
