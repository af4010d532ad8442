//! Instruction formats: a discriminated union over the instruction's
//! payload shape, plus the `BlockCall`/`BlockArg` value-list-packing trick
//! used for branch destinations.
//!
//! `BlockCall` is adapted directly from the teacher's
//! `mu-ir/src/ir/instructions.rs`: a branch target and its argument list
//! share one `EntityList<Value>`, with the target block stored as a
//! reinterpreted `Value` in slot 0. `BlockArg` is new: per spec §3, the
//! remaining slots don't store plain `Value`s, they store a 2-bit-tagged
//! `BlockArg` (ordinary value / `try_call_ret(index)` / `try_call_exn(index)`)
//! packed into the same 32 bits, so the same list can feed a normal jump's
//! arguments or a `try_call`'s resume-with-return-value arguments.

use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use super::condcodes::{AtomicRmwOp, FloatCC, IntCC, MemoryOrdering};
use super::entities::{Block, ExceptionTag, FuncRef, JumpTable, SigRef, Value, ValueList, ValueListPool};
use super::memflags::MemFlags;
use super::opcode::Opcode;

/// A packed argument slot inside a [`BlockCall`]'s argument list.
///
/// Top 2 bits of the underlying `u32` select the variant, low 30 bits are
/// the payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockArg {
    /// An ordinary SSA value flowing into the target block's parameter.
    Value(Value),
    /// The `index`-th normal return value of the enclosing `try_call`.
    TryCallRet(u32),
    /// The `index`-th exception payload value of the enclosing `try_call`.
    TryCallExn(u32),
}

const BLOCK_ARG_TAG_SHIFT: u32 = 30;
const BLOCK_ARG_PAYLOAD_MASK: u32 = (1 << BLOCK_ARG_TAG_SHIFT) - 1;

impl BlockArg {
    fn pack(self) -> Value {
        let (tag, payload) = match self {
            BlockArg::Value(v) => (0u32, v.as_u32()),
            BlockArg::TryCallRet(i) => (1u32, i),
            BlockArg::TryCallExn(i) => (2u32, i),
        };
        debug_assert!(payload <= BLOCK_ARG_PAYLOAD_MASK, "BlockArg payload overflow");
        Value::from_u32((tag << BLOCK_ARG_TAG_SHIFT) | (payload & BLOCK_ARG_PAYLOAD_MASK))
    }

    fn unpack(v: Value) -> BlockArg {
        let raw = v.as_u32();
        let tag = raw >> BLOCK_ARG_TAG_SHIFT;
        let payload = raw & BLOCK_ARG_PAYLOAD_MASK;
        match tag {
            0 => BlockArg::Value(Value::from_u32(payload)),
            1 => BlockArg::TryCallRet(payload),
            2 => BlockArg::TryCallExn(payload),
            _ => panic!("invalid BlockArg tag {tag}"),
        }
    }

    /// The plain `Value` this argument reads, if it is an ordinary value
    /// (not a `try_call` resume placeholder).
    pub fn as_value(self) -> Option<Value> {
        match self {
            BlockArg::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A branch's destination: a target [`Block`] plus its argument list,
/// packed into a single [`ValueList`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct BlockCall {
    values: ValueList,
}

impl BlockCall {
    fn value_to_block(val: Value) -> Block {
        Block::from_u32(val.as_u32())
    }

    fn block_to_value(block: Block) -> Value {
        Value::from_u32(block.as_u32())
    }

    pub fn new(block: Block, args: &[BlockArg], pool: &mut ValueListPool) -> Self {
        let mut values = ValueList::default();
        values.push(Self::block_to_value(block), pool);
        for a in args {
            values.push(a.pack(), pool);
        }
        Self { values }
    }

    pub fn block(&self, pool: &ValueListPool) -> Block {
        Self::value_to_block(self.values.get(0, pool).expect("BlockCall always has a block slot"))
    }

    pub fn set_block(&mut self, block: Block, pool: &mut ValueListPool) {
        self.values.as_mut_slice(pool)[0] = Self::block_to_value(block);
    }

    pub fn append_argument(&mut self, arg: BlockArg, pool: &mut ValueListPool) {
        self.values.push(arg.pack(), pool);
    }

    pub fn args(&self, pool: &ValueListPool) -> Vec<BlockArg> {
        self.values.as_slice(pool)[1..].iter().map(|&v| BlockArg::unpack(v)).collect()
    }

    pub fn num_args(&self, pool: &ValueListPool) -> usize {
        self.values.len(pool).saturating_sub(1)
    }

    /// Visit every plain `Value` operand (skipping `try_call` resume
    /// placeholders), for use-rewriting passes like `replace_all_uses`.
    pub fn for_each_value_mut(&mut self, pool: &mut ValueListPool, mut f: impl FnMut(&mut Value)) {
        for slot in self.values.as_mut_slice(pool)[1..].iter_mut() {
            let mut arg = BlockArg::unpack(*slot);
            if let BlockArg::Value(ref mut v) = arg {
                f(v);
                *slot = arg.pack();
            }
        }
    }

    pub fn clear(&mut self, pool: &mut ValueListPool) {
        self.values.truncate(1, pool);
    }

    pub fn deep_clone(&self, pool: &mut ValueListPool) -> Self {
        Self { values: self.values.deep_clone(pool) }
    }

    pub fn display<'a>(&self, pool: &'a ValueListPool) -> DisplayBlockCall<'a> {
        DisplayBlockCall { call: *self, pool }
    }
}

pub struct DisplayBlockCall<'a> {
    call: BlockCall,
    pool: &'a ValueListPool,
}

impl fmt::Display for DisplayBlockCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.call.block(self.pool))?;
        let args = self.call.args(self.pool);
        if !args.is_empty() {
            write!(f, "(")?;
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match a {
                    BlockArg::Value(v) => write!(f, "{v}")?,
                    BlockArg::TryCallRet(n) => write!(f, "try_call_ret({n})")?,
                    BlockArg::TryCallExn(n) => write!(f, "try_call_exn({n})")?,
                }
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// A table of `(tag -> handler)` edges attached to a `try_call`/
/// `try_call_indirect`, plus the normal-return edge.
#[derive(Clone, Debug)]
pub struct ExceptionTableData {
    pub normal: BlockCall,
    pub handlers: Vec<(ExceptionTag, BlockCall)>,
}

/// The discriminated union of instruction payload shapes (spec §3). Each
/// variant is the smallest struct that fits its operand shape, the way the
/// teacher's `InstructionData` keeps `New`/`Alloca`/`GetIRef` minimal rather
/// than a single all-fields struct.
#[derive(Clone, Debug, PartialEq, Hash)]
pub enum InstructionData {
    Nullary { opcode: Opcode },
    UnaryImm { opcode: Opcode, imm: i64 },
    UnaryIeee32 { opcode: Opcode, imm: u32 },
    UnaryIeee64 { opcode: Opcode, imm: u64 },
    Unary { opcode: Opcode, arg: Value },
    Binary { opcode: Opcode, args: [Value; 2] },
    Ternary { opcode: Opcode, args: [Value; 3] },
    IntCompare { cond: IntCC, args: [Value; 2] },
    FloatCompare { cond: FloatCC, args: [Value; 2] },
    Load { flags: MemFlags, arg: Value, offset: i32 },
    Store { flags: MemFlags, args: [Value; 2], offset: i32 },
    AtomicLoad { flags: MemFlags, arg: Value, ordering: MemoryOrdering },
    AtomicStore { flags: MemFlags, args: [Value; 2], ordering: MemoryOrdering },
    AtomicRmw {
        flags: MemFlags,
        op: AtomicRmwOp,
        args: [Value; 2],
        ordering: MemoryOrdering,
    },
    AtomicCas {
        flags: MemFlags,
        args: [Value; 3],
        success: MemoryOrdering,
        failure: MemoryOrdering,
    },
    Fence { ordering: MemoryOrdering },
    /// `extract_lane`'s source vector and which lane to pull out of it
    /// (spec §4.6 pass 3: "requires vector source, bounded lane index,
    /// result = lane type"). `opcode` is always `Opcode::ExtractLane`, kept
    /// explicit to match the sibling payload shapes rather than implied.
    ExtractLane { opcode: Opcode, arg: Value, lane: u8 },
    Jump { destination: BlockCall },
    Branch { arg: Value, blocks: [BlockCall; 2] },
    BranchTable { arg: Value, table: JumpTable },
    Call { func_ref: FuncRef, args: ValueList },
    CallIndirect { sig_ref: SigRef, callee: Value, args: ValueList },
    TryCall { func_ref: FuncRef, args: ValueList, exception_table: super::entities::ExceptionTable },
    TryCallIndirect {
        sig_ref: SigRef,
        callee: Value,
        args: ValueList,
        exception_table: super::entities::ExceptionTable,
    },
    MultiAry { opcode: Opcode, args: ValueList },
}

impl InstructionData {
    pub fn opcode(&self) -> Opcode {
        match self {
            InstructionData::Nullary { opcode }
            | InstructionData::UnaryImm { opcode, .. }
            | InstructionData::UnaryIeee32 { opcode, .. }
            | InstructionData::UnaryIeee64 { opcode, .. }
            | InstructionData::Unary { opcode, .. }
            | InstructionData::Binary { opcode, .. }
            | InstructionData::Ternary { opcode, .. }
            | InstructionData::ExtractLane { opcode, .. }
            | InstructionData::MultiAry { opcode, .. } => *opcode,
            InstructionData::IntCompare { .. } => Opcode::Icmp,
            InstructionData::FloatCompare { .. } => Opcode::Fcmp,
            InstructionData::Load { .. } => Opcode::Load,
            InstructionData::Store { .. } => Opcode::Store,
            InstructionData::AtomicLoad { .. } => Opcode::AtomicLoad,
            InstructionData::AtomicStore { .. } => Opcode::AtomicStore,
            InstructionData::AtomicRmw { .. } => Opcode::AtomicRmw,
            InstructionData::AtomicCas { .. } => Opcode::AtomicCas,
            InstructionData::Fence { .. } => Opcode::Fence,
            InstructionData::Jump { .. } => Opcode::Jump,
            InstructionData::Branch { .. } => Opcode::Brif,
            InstructionData::BranchTable { .. } => Opcode::BrTable,
            InstructionData::Call { .. } => Opcode::Call,
            InstructionData::CallIndirect { .. } => Opcode::CallIndirect,
            InstructionData::TryCall { .. } => Opcode::TryCall,
            InstructionData::TryCallIndirect { .. } => Opcode::TryCallIndirect,
        }
    }

    /// Plain-`Value` operands stored inline (not via a `ValueList` or a
    /// `BlockCall`). Used by the verifier's SSA pass and `replace_all_uses`.
    pub fn inline_args(&self) -> &[Value] {
        match self {
            InstructionData::Unary { arg, .. }
            | InstructionData::Load { arg, .. }
            | InstructionData::AtomicLoad { arg, .. }
            | InstructionData::BranchTable { arg, .. }
            | InstructionData::Branch { arg, .. }
            | InstructionData::ExtractLane { arg, .. }
            | InstructionData::CallIndirect { callee: arg, .. }
            | InstructionData::TryCallIndirect { callee: arg, .. } => std::slice::from_ref(arg),
            InstructionData::Binary { args, .. }
            | InstructionData::IntCompare { args, .. }
            | InstructionData::FloatCompare { args, .. }
            | InstructionData::Store { args, .. }
            | InstructionData::AtomicStore { args, .. }
            | InstructionData::AtomicRmw { args, .. } => args,
            InstructionData::Ternary { args, .. } | InstructionData::AtomicCas { args, .. } => args,
            _ => &[],
        }
    }

    pub fn inline_args_mut(&mut self) -> &mut [Value] {
        match self {
            InstructionData::Unary { arg, .. }
            | InstructionData::Load { arg, .. }
            | InstructionData::AtomicLoad { arg, .. }
            | InstructionData::BranchTable { arg, .. }
            | InstructionData::Branch { arg, .. }
            | InstructionData::ExtractLane { arg, .. }
            | InstructionData::CallIndirect { callee: arg, .. }
            | InstructionData::TryCallIndirect { callee: arg, .. } => std::slice::from_mut(arg),
            InstructionData::Binary { args, .. }
            | InstructionData::IntCompare { args, .. }
            | InstructionData::FloatCompare { args, .. }
            | InstructionData::Store { args, .. }
            | InstructionData::AtomicStore { args, .. }
            | InstructionData::AtomicRmw { args, .. } => args,
            InstructionData::Ternary { args, .. } | InstructionData::AtomicCas { args, .. } => args,
            _ => &mut [],
        }
    }

    /// `ValueList`-backed variadic arguments (calls, multi-ary ops), not
    /// including `BlockCall` argument lists.
    pub fn variadic_args(&self) -> Option<&ValueList> {
        match self {
            InstructionData::Call { args, .. }
            | InstructionData::CallIndirect { args, .. }
            | InstructionData::TryCall { args, .. }
            | InstructionData::TryCallIndirect { args, .. }
            | InstructionData::MultiAry { args, .. } => Some(args),
            _ => None,
        }
    }

    pub fn variadic_args_mut(&mut self) -> Option<&mut ValueList> {
        match self {
            InstructionData::Call { args, .. }
            | InstructionData::CallIndirect { args, .. }
            | InstructionData::TryCall { args, .. }
            | InstructionData::TryCallIndirect { args, .. }
            | InstructionData::MultiAry { args, .. } => Some(args),
            _ => None,
        }
    }

    /// Every `BlockCall` stored inline in this instruction, in encounter
    /// order. A `BranchTable`'s targets live in the function's jump-table
    /// pool rather than inline, so they are never returned here; use
    /// [`Self::visit_block_calls`]/[`Self::visit_block_calls_mut`] for a
    /// walk that covers `Jump`/`Branch`/`BranchTable` uniformly.
    pub fn block_calls(&self) -> smallvec::SmallVec<[BlockCall; 2]> {
        let mut v = smallvec::SmallVec::new();
        match self {
            InstructionData::Jump { destination } => v.push(*destination),
            InstructionData::Branch { blocks, .. } => v.extend_from_slice(blocks),
            _ => {}
        }
        v
    }

    pub fn block_calls_mut(&mut self) -> smallvec::SmallVec<[&mut BlockCall; 2]> {
        let mut v = smallvec::SmallVec::new();
        match self {
            InstructionData::Jump { destination } => v.push(destination),
            InstructionData::Branch { blocks, .. } => {
                for b in blocks.iter_mut() {
                    v.push(b);
                }
            }
            _ => {}
        }
        v
    }

    /// Every `BlockCall` this instruction branches to, default-then-entries
    /// for a `BranchTable`, via the jump-table pool it indexes into. Passes
    /// that rewrite or forward branch arguments (`replace_all_uses`, SSA
    /// phi-argument insertion, critical-edge splitting) use this instead of
    /// `block_calls`/`block_calls_mut` so a `br_table` terminator isn't
    /// silently skipped.
    pub fn visit_block_calls(&self, jump_tables: &super::jumptable::JumpTables, mut f: impl FnMut(BlockCall)) {
        match self {
            InstructionData::BranchTable { table, .. } => {
                for call in jump_tables.get(*table).calls() {
                    f(*call);
                }
            }
            _ => {
                for call in self.block_calls() {
                    f(call);
                }
            }
        }
    }

    pub fn visit_block_calls_mut(
        &mut self,
        jump_tables: &mut super::jumptable::JumpTables,
        mut f: impl FnMut(&mut BlockCall),
    ) {
        match self {
            InstructionData::BranchTable { table, .. } => {
                for call in jump_tables.get_mut(*table).calls_mut() {
                    f(call);
                }
            }
            _ => {
                for call in self.block_calls_mut() {
                    f(call);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_arg_roundtrip() {
        let v = Value::from_u32(12345);
        assert_eq!(BlockArg::unpack(BlockArg::Value(v).pack()), BlockArg::Value(v));
        assert_eq!(
            BlockArg::unpack(BlockArg::TryCallRet(7).pack()),
            BlockArg::TryCallRet(7)
        );
        assert_eq!(
            BlockArg::unpack(BlockArg::TryCallExn(3).pack()),
            BlockArg::TryCallExn(3)
        );
    }

    #[test]
    fn block_call_round_trip() {
        let mut pool = ValueListPool::new();
        let block = Block::from_u32(4);
        let args = [BlockArg::Value(Value::from_u32(1)), BlockArg::Value(Value::from_u32(2))];
        let call = BlockCall::new(block, &args, &mut pool);
        assert_eq!(call.block(&pool), block);
        assert_eq!(call.args(&pool), args.to_vec());
    }

    #[test]
    fn block_call_mutates_values_in_place() {
        let mut pool = ValueListPool::new();
        let mut call = BlockCall::new(
            Block::from_u32(0),
            &[BlockArg::Value(Value::from_u32(1)), BlockArg::TryCallRet(0)],
            &mut pool,
        );
        call.for_each_value_mut(&mut pool, |v| *v = Value::from_u32(v.as_u32() + 100));
        assert_eq!(
            call.args(&pool),
            vec![BlockArg::Value(Value::from_u32(101)), BlockArg::TryCallRet(0)]
        );
    }
}
