//! Intrusive orderings: the sequence of blocks in a function, and the
//! sequence of instructions within each block.
//!
//! The teacher's IR has no analogue — Mu's `Function` stores instructions
//! directly inside `BlockContent` vectors and never needs to reorder or
//! move them between blocks independently of the DFG. This module is new,
//! grounded on spec §4.2's "two side tables keyed by Block/Inst storing
//! `(prev, next)` handles" guidance and on the real Cranelift
//! `ir/layout.rs` file retrieved into the pack for the doubly-linked-list
//! idiom (`SecondaryMap` of link nodes rather than an intrusive pointer,
//! since handles are indices, not references).

use cranelift_entity::SecondaryMap;
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use super::entities::{Block, Inst};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
struct BlockNode {
    prev: Option<Block>,
    next: Option<Block>,
    first_inst: Option<Inst>,
    last_inst: Option<Inst>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
struct InstNode {
    prev: Option<Inst>,
    next: Option<Inst>,
    block: Option<Block>,
}

/// The intrusive double linked ordering of blocks, and of instructions
/// within each block.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Layout {
    blocks: SecondaryMap<Block, BlockNode>,
    insts: SecondaryMap<Inst, InstNode>,
    first_block: Option<Block>,
    last_block: Option<Block>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_block_inserted(&self, block: Block) -> bool {
        Some(block) == self.first_block || self.blocks[block].prev.is_some() || self.blocks[block].next.is_some()
    }

    pub fn entry_block(&self) -> Option<Block> {
        self.first_block
    }

    pub fn blocks(&self) -> BlockIter<'_> {
        BlockIter { layout: self, next: self.first_block }
    }

    pub fn append_block(&mut self, block: Block) {
        debug_assert!(!self.is_block_inserted(block), "block already in layout");
        self.blocks[block] = BlockNode { prev: self.last_block, next: None, first_inst: None, last_inst: None };
        if let Some(last) = self.last_block {
            self.blocks[last].next = Some(block);
        } else {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
    }

    pub fn insert_block_before(&mut self, block: Block, anchor: Block) {
        debug_assert!(!self.is_block_inserted(block));
        let prev = self.blocks[anchor].prev;
        self.blocks[block] = BlockNode { prev, next: Some(anchor), first_inst: None, last_inst: None };
        self.blocks[anchor].prev = Some(block);
        match prev {
            Some(p) => self.blocks[p].next = Some(block),
            None => self.first_block = Some(block),
        }
    }

    pub fn insert_block_after(&mut self, block: Block, anchor: Block) {
        debug_assert!(!self.is_block_inserted(block));
        let next = self.blocks[anchor].next;
        self.blocks[block] = BlockNode { prev: Some(anchor), next, first_inst: None, last_inst: None };
        self.blocks[anchor].next = Some(block);
        match next {
            Some(n) => self.blocks[n].prev = Some(block),
            None => self.last_block = Some(block),
        }
    }

    pub fn remove_block(&mut self, block: Block) {
        let BlockNode { prev, next, .. } = self.blocks[block];
        match prev {
            Some(p) => self.blocks[p].next = next,
            None => self.first_block = next,
        }
        match next {
            Some(n) => self.blocks[n].prev = prev,
            None => self.last_block = prev,
        }
        self.blocks[block] = BlockNode::default();
    }

    pub fn block_insts(&self, block: Block) -> InstIter<'_> {
        InstIter { layout: self, next: self.blocks[block].first_inst }
    }

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts[inst].block
    }

    pub fn is_inst_inserted(&self, inst: Inst) -> bool {
        self.insts[inst].block.is_some()
    }

    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert!(!self.is_inst_inserted(inst), "instruction already in layout");
        let last = self.blocks[block].last_inst;
        self.insts[inst] = InstNode { prev: last, next: None, block: Some(block) };
        match last {
            Some(l) => self.insts[l].next = Some(inst),
            None => self.blocks[block].first_inst = Some(inst),
        }
        self.blocks[block].last_inst = Some(inst);
    }

    pub fn insert_inst_before(&mut self, inst: Inst, anchor: Inst) {
        debug_assert!(!self.is_inst_inserted(inst));
        let block = self.insts[anchor].block.expect("anchor instruction not in layout");
        let prev = self.insts[anchor].prev;
        self.insts[inst] = InstNode { prev, next: Some(anchor), block: Some(block) };
        self.insts[anchor].prev = Some(inst);
        match prev {
            Some(p) => self.insts[p].next = Some(inst),
            None => self.blocks[block].first_inst = Some(inst),
        }
    }

    pub fn insert_inst_after(&mut self, inst: Inst, anchor: Inst) {
        debug_assert!(!self.is_inst_inserted(inst));
        let block = self.insts[anchor].block.expect("anchor instruction not in layout");
        let next = self.insts[anchor].next;
        self.insts[inst] = InstNode { prev: Some(anchor), next, block: Some(block) };
        self.insts[anchor].next = Some(inst);
        match next {
            Some(n) => self.insts[n].prev = Some(inst),
            None => self.blocks[block].last_inst = Some(inst),
        }
    }

    /// Remove `inst` from whichever block currently owns it. The caller is
    /// responsible for re-inserting it (e.g. via `append_inst` into a
    /// different block) if the instruction is being moved rather than
    /// deleted; either way the block's previously cached CFG edges must be
    /// treated as stale.
    pub fn remove_inst(&mut self, inst: Inst) {
        let InstNode { prev, next, block } = self.insts[inst];
        let block = block.expect("instruction not in layout");
        match prev {
            Some(p) => self.insts[p].next = next,
            None => self.blocks[block].first_inst = next,
        }
        match next {
            Some(n) => self.insts[n].prev = prev,
            None => self.blocks[block].last_inst = prev,
        }
        self.insts[inst] = InstNode::default();
    }

    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last_inst
    }
}

pub struct BlockIter<'a> {
    layout: &'a Layout,
    next: Option<Block>,
}

impl Iterator for BlockIter<'_> {
    type Item = Block;
    fn next(&mut self) -> Option<Block> {
        let block = self.next?;
        self.next = self.layout.blocks[block].next;
        Some(block)
    }
}

pub struct InstIter<'a> {
    layout: &'a Layout,
    next: Option<Inst>,
}

impl Iterator for InstIter<'_> {
    type Item = Inst;
    fn next(&mut self) -> Option<Inst> {
        let inst = self.next?;
        self.next = self.layout.insts[inst].next;
        Some(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_entity::EntityRef;

    #[test]
    fn blocks_iterate_in_append_order() {
        let mut layout = Layout::new();
        let (b0, b1, b2) = (Block::new(0), Block::new(1), Block::new(2));
        layout.append_block(b0);
        layout.append_block(b1);
        layout.append_block(b2);
        assert_eq!(layout.blocks().collect::<Vec<_>>(), vec![b0, b1, b2]);
    }

    #[test]
    fn insert_block_before_and_after() {
        let mut layout = Layout::new();
        let (b0, b1, b2, b3) = (Block::new(0), Block::new(1), Block::new(2), Block::new(3));
        layout.append_block(b0);
        layout.append_block(b2);
        layout.insert_block_before(b1, b2);
        layout.insert_block_after(b3, b2);
        assert_eq!(layout.blocks().collect::<Vec<_>>(), vec![b0, b1, b2, b3]);
    }

    #[test]
    fn remove_block_relinks_neighbors() {
        let mut layout = Layout::new();
        let (b0, b1, b2) = (Block::new(0), Block::new(1), Block::new(2));
        layout.append_block(b0);
        layout.append_block(b1);
        layout.append_block(b2);
        layout.remove_block(b1);
        assert_eq!(layout.blocks().collect::<Vec<_>>(), vec![b0, b2]);
        assert!(!layout.is_block_inserted(b1));
    }

    #[test]
    fn inst_ordering_within_block() {
        let mut layout = Layout::new();
        let b0 = Block::new(0);
        layout.append_block(b0);
        let (i0, i1, i2) = (Inst::new(0), Inst::new(1), Inst::new(2));
        layout.append_inst(i0, b0);
        layout.append_inst(i2, b0);
        layout.insert_inst_before(i1, i2);
        assert_eq!(layout.block_insts(b0).collect::<Vec<_>>(), vec![i0, i1, i2]);
        assert_eq!(layout.inst_block(i1), Some(b0));
    }

    #[test]
    fn moving_inst_between_blocks_updates_owner() {
        let mut layout = Layout::new();
        let (b0, b1) = (Block::new(0), Block::new(1));
        layout.append_block(b0);
        layout.append_block(b1);
        let inst = Inst::new(0);
        layout.append_inst(inst, b0);
        layout.remove_inst(inst);
        layout.append_inst(inst, b1);
        assert_eq!(layout.inst_block(inst), Some(b1));
        assert!(layout.block_insts(b0).next().is_none());
    }
}
