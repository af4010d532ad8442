//! The data-flow graph: instructions, blocks, and the packed SSA value
//! table that ties them together.
//!
//! Adapted from the teacher's `mu-ir/src/ir/dfg.rs` — the `Insts`/`Blocks`
//! newtype wrappers and the `ValueDef`/`Values` shapes are kept, but
//! `values` is now backed by [`packed_value`](super::packed_value)'s 64-bit
//! records instead of a `ValueData` enum holding a `P<Type>`.

use std::ops::{Index, IndexMut};

use cranelift_entity::{packed_option::ReservedValue, PrimaryMap, SecondaryMap};
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use super::entities::{Block, Inst, Value, ValueList, ValueListPool};
use super::instructions::{BlockArg, BlockCall, InstructionData};
use super::jumptable::JumpTables;
use super::packed_value::PackedValueData;
use super::types::Type;

#[derive(Clone, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Insts(PrimaryMap<Inst, InstructionData>);

impl Index<Inst> for Insts {
    type Output = InstructionData;
    fn index(&self, inst: Inst) -> &InstructionData {
        self.0.index(inst)
    }
}

impl IndexMut<Inst> for Insts {
    fn index_mut(&mut self, inst: Inst) -> &mut InstructionData {
        self.0.index_mut(inst)
    }
}

/// Storage for basic blocks within the DFG.
#[derive(Clone, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Blocks(PrimaryMap<Block, BlockData>);

impl Blocks {
    pub fn add(&mut self) -> Block {
        self.0.push(BlockData::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_valid(&self, block: Block) -> bool {
        self.0.is_valid(block)
    }
}

impl Index<Block> for Blocks {
    type Output = BlockData;
    fn index(&self, block: Block) -> &BlockData {
        &self.0[block]
    }
}

impl IndexMut<Block> for Blocks {
    fn index_mut(&mut self, block: Block) -> &mut BlockData {
        &mut self.0[block]
    }
}

#[derive(Clone, Debug, PartialEq, Hash, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct BlockData {
    params: ValueList,
}

impl BlockData {
    fn new() -> Self {
        Self::default()
    }

    pub fn params<'a>(&self, pool: &'a ValueListPool) -> &'a [Value] {
        self.params.as_slice(pool)
    }
}

/// Where a value came from — a thin view over the decoded
/// [`PackedValueData`], kept as its own type because `Alias`/`Union`
/// resolve differently for callers that want "the defining instruction or
/// block parameter" versus callers that want the raw record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    Result(Inst, usize),
    Param(Block, usize),
    Union(Value, Value),
}

impl ValueDef {
    pub fn unwrap_inst(&self) -> Inst {
        self.inst().expect("Value is not an instruction result")
    }

    pub fn inst(&self) -> Option<Inst> {
        match *self {
            Self::Result(inst, _) => Some(inst),
            _ => None,
        }
    }

    pub fn unwrap_block(&self) -> Block {
        match *self {
            Self::Param(block, _) => block,
            _ => panic!("Value is not a block parameter"),
        }
    }

    pub fn num(self) -> usize {
        match self {
            Self::Result(_, n) | Self::Param(_, n) => n,
            Self::Union(_, _) => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct DataFlowGraph {
    pub insts: Insts,
    results: SecondaryMap<Inst, ValueList>,
    pub blocks: Blocks,
    pub value_lists: ValueListPool,
    values: PrimaryMap<Value, u64>,
}

impl Default for DataFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self {
            insts: Insts(PrimaryMap::new()),
            results: SecondaryMap::new(),
            blocks: Blocks(PrimaryMap::new()),
            value_lists: ValueListPool::new(),
            values: PrimaryMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.insts.0.clear();
        self.results.clear();
        self.blocks.0.clear();
        self.value_lists.clear();
        self.values.clear();
    }

    pub fn num_insts(&self) -> usize {
        self.insts.0.len()
    }

    pub fn inst_is_valid(&self, inst: Inst) -> bool {
        self.insts.0.is_valid(inst)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_is_valid(&self, block: Block) -> bool {
        self.blocks.is_valid(block)
    }

    pub fn make_block(&mut self) -> Block {
        self.blocks.add()
    }

    pub fn block_params(&self, block: Block) -> &[Value] {
        self.blocks[block].params(&self.value_lists)
    }

    /// Append a new parameter of type `ty` to `block`, returning the fresh
    /// value that represents it.
    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let num = self.blocks[block].params.len(&self.value_lists) as u32;
        let v = self.make_value(PackedValueData::Param { ty, num, block });
        self.blocks[block].params.push(v, &mut self.value_lists);
        v
    }

    pub fn block_call(&mut self, block: Block, args: &[BlockArg]) -> BlockCall {
        BlockCall::new(block, args, &mut self.value_lists)
    }

    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        self.insts.0.push(data)
    }

    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        self.results[inst].as_slice(&self.value_lists)
    }

    /// Append a new result of type `ty` to `inst`, returning the fresh
    /// value.
    pub fn append_inst_result(&mut self, inst: Inst, ty: Type) -> Value {
        let num = self.results[inst].len(&self.value_lists) as u32;
        let v = self.make_value(PackedValueData::Inst { ty, num, inst });
        self.results[inst].push(v, &mut self.value_lists);
        v
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    fn make_value(&mut self, data: PackedValueData) -> Value {
        self.values.push(data.encode())
    }

    pub fn values(&self) -> Values<'_> {
        Values { inner: self.values.iter() }
    }

    pub fn value_is_valid(&self, v: Value) -> bool {
        self.values.is_valid(v)
    }

    pub fn value_is_real(&self, v: Value) -> bool {
        self.value_is_valid(v) && !matches!(PackedValueData::decode(self.values[v]), PackedValueData::Alias { .. })
    }

    /// The type the value was defined with. For an alias, this is the
    /// alias's own recorded type (which tracks the original's type at the
    /// time `change_to_alias` ran), not a re-derivation through the chain.
    pub fn value_type(&self, v: Value) -> Type {
        PackedValueData::decode(self.values[v]).ty()
    }

    pub fn value_def(&self, v: Value) -> ValueDef {
        match PackedValueData::decode(self.values[v]) {
            PackedValueData::Inst { num, inst, .. } => ValueDef::Result(inst, num as usize),
            PackedValueData::Param { num, block, .. } => ValueDef::Param(block, num as usize),
            PackedValueData::Alias { original, .. } => self.value_def(self.resolve_aliases(original)),
            PackedValueData::Union { x, y, .. } => ValueDef::Union(x, y),
        }
    }

    /// Follow a chain of `Alias` records to the underlying non-alias value.
    pub fn resolve_aliases(&self, mut v: Value) -> Value {
        let mut steps = 0usize;
        while let PackedValueData::Alias { original, .. } = PackedValueData::decode(self.values[v]) {
            v = original;
            steps += 1;
            debug_assert!(
                steps <= self.values.len(),
                "alias chain longer than the value table: a cycle slipped past change_to_alias"
            );
        }
        v
    }

    /// Turn `v` into an alias of `original`, preserving `v`'s declared
    /// type. Panics (debug builds) if this would create a cycle, i.e. if
    /// `v` is reachable by following `original`'s own alias chain.
    pub fn change_to_alias(&mut self, v: Value, original: Value) {
        debug_assert_ne!(v, original, "a value cannot alias itself");
        debug_assert_ne!(
            self.resolve_aliases(original),
            v,
            "change_to_alias would introduce an alias cycle"
        );
        let ty = self.value_type(v);
        self.values[v] = PackedValueData::Alias { ty, original }.encode();
    }

    /// Make `v` a `Union` of `x` and `y` (used by the e-graph's congruence
    /// rebuild to merge two values discovered to be equal).
    pub fn make_union(&mut self, ty: Type, x: Value, y: Value) -> Value {
        self.make_value(PackedValueData::Union { ty, x, y })
    }

    /// Rewrite every operand slot across the whole function body that reads
    /// `old` so it reads `new` instead: inline operands, variadic
    /// `ValueList` operands, and `BlockCall` argument lists (including a
    /// `br_table`'s default and entries, via `jump_tables`).
    pub fn replace_all_uses(&mut self, old: Value, new: Value, jump_tables: &mut JumpTables) {
        for inst in self.insts.0.keys().collect::<Vec<_>>() {
            for arg in self.insts[inst].inline_args_mut() {
                if *arg == old {
                    *arg = new;
                }
            }
            if let Some(list) = self.insts[inst].variadic_args_mut() {
                for slot in list.as_mut_slice(&mut self.value_lists) {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
            self.insts[inst].visit_block_calls_mut(jump_tables, |call| {
                call.for_each_value_mut(&mut self.value_lists, |slot| {
                    if *slot == old {
                        *slot = new;
                    }
                });
            });
        }
    }
}

pub struct Values<'a> {
    inner: cranelift_entity::Iter<'a, Value, u64>,
}

fn valid_packed_record(bits: u64) -> bool {
    if let PackedValueData::Alias { original, .. } = PackedValueData::decode(bits) {
        if original == Value::reserved_value() {
            return false;
        }
    }
    true
}

impl Iterator for Values<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find(|kv| valid_packed_record(*kv.1)).map(|kv| kv.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::instructions::BlockArg;
    use super::super::opcode::Opcode;

    #[test]
    fn block_params_and_inst_results_round_trip() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let p0 = dfg.append_block_param(block, Type::I32);
        let p1 = dfg.append_block_param(block, Type::I64);
        assert_eq!(dfg.block_params(block), &[p0, p1]);
        assert_eq!(dfg.value_type(p0), Type::I32);
        assert_eq!(dfg.value_def(p1), ValueDef::Param(block, 1));

        let inst = dfg.make_inst(InstructionData::Binary { opcode: Opcode::Iadd, args: [p0, p0] });
        let r0 = dfg.append_inst_result(inst, Type::I32);
        assert_eq!(dfg.inst_results(inst), &[r0]);
        assert_eq!(dfg.value_def(r0), ValueDef::Result(inst, 0));
    }

    #[test]
    fn alias_resolves_through_chain() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let a = dfg.append_block_param(block, Type::I32);
        let b = dfg.append_block_param(block, Type::I32);
        let c = dfg.append_block_param(block, Type::I32);
        dfg.change_to_alias(b, a);
        dfg.change_to_alias(c, b);
        assert_eq!(dfg.resolve_aliases(c), a);
        assert_eq!(dfg.value_def(c), dfg.value_def(a));
    }

    #[test]
    #[should_panic(expected = "cycle")]
    fn change_to_alias_rejects_cycles() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let a = dfg.append_block_param(block, Type::I32);
        let b = dfg.append_block_param(block, Type::I32);
        dfg.change_to_alias(b, a);
        dfg.change_to_alias(a, b);
    }

    #[test]
    fn replace_all_uses_rewrites_every_slot_shape() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let target = dfg.make_block();
        let a = dfg.append_block_param(block, Type::I32);
        let old = dfg.append_block_param(block, Type::I32);
        let new = dfg.append_block_param(block, Type::I32);

        let bin = dfg.make_inst(InstructionData::Binary { opcode: Opcode::Iadd, args: [a, old] });
        let call = dfg.block_call(target, &[BlockArg::Value(old)]);
        let jump = dfg.make_inst(InstructionData::Jump { destination: call });

        let mut jump_tables = JumpTables::new();
        dfg.replace_all_uses(old, new, &mut jump_tables);

        assert_eq!(dfg.insts[bin].inline_args(), &[a, new]);
        let InstructionData::Jump { destination } = &dfg.insts[jump] else { panic!() };
        assert_eq!(destination.args(&dfg.value_lists), vec![BlockArg::Value(new)]);
    }
}
