//! Jump-table pool for `br_table`.
//!
//! Named in spec §3 ("Function owns: … jump-table pool …"); modeled as a
//! `PrimaryMap`-backed pool, same convention as [`super::stackslot`].

use cranelift_entity::PrimaryMap;
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use super::entities::{Block, JumpTable};
use super::instructions::BlockCall;

/// A `br_table`'s targets: the `default` destination taken when the
/// argument is out of range of `entries`, plus `entries` themselves
/// (spec §4.4: "br_table → edges for each distinct destination (default +
/// entries)").
#[derive(Clone, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct JumpTableData {
    default: BlockCall,
    entries: Vec<BlockCall>,
}

impl JumpTableData {
    pub fn new(default: BlockCall, entries: Vec<BlockCall>) -> Self {
        Self { default, entries }
    }

    pub fn default_call(&self) -> BlockCall {
        self.default
    }

    pub fn entries(&self) -> &[BlockCall] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push_entry(&mut self, target: BlockCall) {
        self.entries.push(target);
    }

    /// Every `BlockCall` this table carries, default first: the uniform
    /// walk passes like `replace_all_uses`/SSA phi insertion use so a
    /// `br_table` terminator is treated the same as `Jump`/`Branch`.
    pub fn calls(&self) -> impl Iterator<Item = &BlockCall> {
        std::iter::once(&self.default).chain(self.entries.iter())
    }

    pub fn calls_mut(&mut self) -> impl Iterator<Item = &mut BlockCall> {
        std::iter::once(&mut self.default).chain(self.entries.iter_mut())
    }

    /// The distinct destination blocks this table can branch to: default
    /// plus entries, deduplicated in first-seen order (spec §4.4).
    pub fn all_target_blocks(&self, pool: &super::entities::ValueListPool) -> Vec<Block> {
        let mut distinct = Vec::new();
        for call in self.calls() {
            let block = call.block(pool);
            if !distinct.contains(&block) {
                distinct.push(block);
            }
        }
        distinct
    }
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct JumpTables(PrimaryMap<JumpTable, JumpTableData>);

impl JumpTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: JumpTableData) -> JumpTable {
        self.0.push(data)
    }

    pub fn get(&self, jt: JumpTable) -> &JumpTableData {
        &self.0[jt]
    }

    pub fn get_mut(&mut self, jt: JumpTable) -> &mut JumpTableData {
        &mut self.0[jt]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::entities::{Value, ValueListPool};
    use super::super::instructions::BlockArg;

    #[test]
    fn push_and_resolve_targets() {
        let mut pool = ValueListPool::new();
        let mut tables = JumpTables::new();
        let b0 = Block::from_u32(0);
        let b1 = Block::from_u32(1);
        let default = BlockCall::new(b0, &[], &mut pool);
        let entry0 = BlockCall::new(b0, &[], &mut pool);
        let entry1 = BlockCall::new(b1, &[BlockArg::Value(Value::from_u32(3))], &mut pool);
        let jt = tables.push(JumpTableData::new(default, vec![entry0, entry1]));
        assert_eq!(tables.get(jt).len(), 2);
        // b0 appears as both the default and entry 0: only one edge.
        assert_eq!(tables.get(jt).all_target_blocks(&pool), vec![b0, b1]);
    }

    #[test]
    fn default_distinct_from_entries() {
        let mut pool = ValueListPool::new();
        let mut tables = JumpTables::new();
        let default = Block::from_u32(0);
        let b1 = Block::from_u32(1);
        let b2 = Block::from_u32(2);
        let default_call = BlockCall::new(default, &[], &mut pool);
        let e1 = BlockCall::new(b1, &[], &mut pool);
        let e2 = BlockCall::new(b2, &[], &mut pool);
        let jt = tables.push(JumpTableData::new(default_call, vec![e1, e2]));
        assert_eq!(tables.get(jt).all_target_blocks(&pool), vec![default, b1, b2]);
        assert_eq!(tables.get(jt).default_call().block(&pool), default);
    }
}
