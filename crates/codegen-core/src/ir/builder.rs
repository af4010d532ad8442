//! `FunctionBuilder`: an imperative, position-based facade over the raw
//! `DataFlowGraph`/`Layout` primitives (spec §4.1's "Builder" row, 6%
//! share). The spec names Builder as a first-class component but only
//! describes DFG/Layout operations directly; this is the ergonomic
//! surface every other module's tests are written against, in the
//! `cursor + ins().opcode(args)` shape Cranelift's own `FunctionBuilder`
//! popularized.

use super::condcodes::{FloatCC, IntCC};
use super::entities::{Block, FuncRef, Inst, JumpTable, SigRef, Value};
use super::function::Function;
use super::instructions::{BlockArg, BlockCall, InstructionData};
use super::jumptable::JumpTableData;
use super::memflags::MemFlags;
use super::opcode::Opcode;
use super::types::Type;
use crate::error::{BuilderError, StructuralError};

/// Positions the builder at a block; instructions are appended to the
/// layout at the current position in order.
pub struct FunctionBuilder<'f> {
    pub func: &'f mut Function,
    position: Option<Block>,
}

impl<'f> FunctionBuilder<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        Self { func, position: None }
    }

    pub fn create_block(&mut self) -> Block {
        self.func.create_block()
    }

    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        self.func.dfg.append_block_param(block, ty)
    }

    /// Position the cursor at `block`, which must already exist in this
    /// function (spec §7 "Structural": `InvalidBlock` — caller passed an
    /// unregistered handle).
    pub fn switch_to_block(&mut self, block: Block) -> Result<(), StructuralError> {
        if !self.func.dfg.blocks.is_valid(block) {
            return Err(StructuralError::InvalidBlock);
        }
        self.position = Some(block);
        Ok(())
    }

    pub fn current_block(&self) -> Option<Block> {
        self.position
    }

    fn current(&self) -> Result<Block, BuilderError> {
        self.position.ok_or(BuilderError::NoCurrentBlock)
    }

    fn emit(&mut self, data: InstructionData) -> Result<Inst, BuilderError> {
        let block = self.current()?;
        Ok(self.func.append_inst(data, block))
    }

    fn emit_one_result(&mut self, data: InstructionData, ty: Type) -> Result<Value, BuilderError> {
        let inst = self.emit(data)?;
        Ok(self.func.dfg.append_inst_result(inst, ty))
    }

    pub fn block_call(&mut self, block: Block, args: &[Value]) -> BlockCall {
        let args: Vec<BlockArg> = args.iter().copied().map(BlockArg::Value).collect();
        self.func.dfg.block_call(block, &args)
    }

    /// Register a `br_table`'s jump-table data in the function's pool, for
    /// use with [`InsertBuilder::br_table`].
    pub fn push_jump_table(&mut self, default: BlockCall, entries: Vec<BlockCall>) -> JumpTable {
        self.func.jump_tables.push(JumpTableData::new(default, entries))
    }

    pub fn ins(&mut self) -> InsertBuilder<'_, 'f> {
        InsertBuilder { builder: self }
    }
}

/// The instruction-format helpers, split into their own type the way
/// Cranelift's `FuncInstBuilder` is, so `builder.ins().iadd(a, b)` reads as
/// one fluent call instead of repeating `builder` on every line.
pub struct InsertBuilder<'b, 'f> {
    builder: &'b mut FunctionBuilder<'f>,
}

impl InsertBuilder<'_, '_> {
    pub fn iadd(&mut self, ty: Type, a: Value, b: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Binary { opcode: Opcode::Iadd, args: [a, b] }, ty)
    }

    pub fn isub(&mut self, ty: Type, a: Value, b: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Binary { opcode: Opcode::Isub, args: [a, b] }, ty)
    }

    pub fn imul(&mut self, ty: Type, a: Value, b: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Binary { opcode: Opcode::Imul, args: [a, b] }, ty)
    }

    pub fn band(&mut self, ty: Type, a: Value, b: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Binary { opcode: Opcode::Band, args: [a, b] }, ty)
    }

    pub fn bor(&mut self, ty: Type, a: Value, b: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Binary { opcode: Opcode::Bor, args: [a, b] }, ty)
    }

    pub fn bxor(&mut self, ty: Type, a: Value, b: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Binary { opcode: Opcode::Bxor, args: [a, b] }, ty)
    }

    pub fn ineg(&mut self, ty: Type, a: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Unary { opcode: Opcode::Ineg, arg: a }, ty)
    }

    pub fn bnot(&mut self, ty: Type, a: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Unary { opcode: Opcode::Bnot, arg: a }, ty)
    }

    pub fn iconst(&mut self, ty: Type, imm: i64) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::UnaryImm { opcode: Opcode::Iconst, imm }, ty)
    }

    pub fn icmp(&mut self, ty: Type, cond: IntCC, a: Value, b: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::IntCompare { cond, args: [a, b] }, ty)
    }

    pub fn fcmp(&mut self, ty: Type, cond: FloatCC, a: Value, b: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::FloatCompare { cond, args: [a, b] }, ty)
    }

    pub fn select(&mut self, ty: Type, cond: Value, a: Value, b: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(
            InstructionData::Ternary { opcode: Opcode::Select, args: [cond, a, b] },
            ty,
        )
    }

    pub fn load(&mut self, ty: Type, flags: MemFlags, addr: Value, offset: i32) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Load { flags, arg: addr, offset }, ty)
    }

    pub fn store(&mut self, flags: MemFlags, value: Value, addr: Value, offset: i32) -> Result<Inst, BuilderError> {
        self.builder.emit(InstructionData::Store { flags, args: [addr, value], offset })
    }

    pub fn jump(&mut self, destination: BlockCall) -> Result<Inst, BuilderError> {
        self.builder.emit(InstructionData::Jump { destination })
    }

    pub fn brif(&mut self, cond: Value, then: BlockCall, else_: BlockCall) -> Result<Inst, BuilderError> {
        self.builder.emit(InstructionData::Branch { arg: cond, blocks: [then, else_] })
    }

    /// `br_table`: `table` must already have been registered via
    /// [`FunctionBuilder::push_jump_table`].
    pub fn br_table(&mut self, arg: Value, table: JumpTable) -> Result<Inst, BuilderError> {
        self.builder.emit(InstructionData::BranchTable { arg, table })
    }

    pub fn call(&mut self, func_ref: FuncRef, args: &[Value]) -> Result<Inst, BuilderError> {
        let mut list = super::entities::ValueList::default();
        for &a in args {
            list.push(a, &mut self.builder.func.dfg.value_lists);
        }
        self.builder.emit(InstructionData::Call { func_ref, args: list })
    }

    pub fn call_indirect(&mut self, sig_ref: SigRef, callee: Value, args: &[Value]) -> Result<Inst, BuilderError> {
        let mut list = super::entities::ValueList::default();
        for &a in args {
            list.push(a, &mut self.builder.func.dfg.value_lists);
        }
        self.builder.emit(InstructionData::CallIndirect { sig_ref, callee, args: list })
    }

    pub fn return_(&mut self, args: &[Value]) -> Result<Inst, BuilderError> {
        let mut list = super::entities::ValueList::default();
        for &a in args {
            list.push(a, &mut self.builder.func.dfg.value_lists);
        }
        self.builder.emit(InstructionData::MultiAry { opcode: Opcode::Return, args: list })
    }

    pub fn trap(&mut self) -> Result<Inst, BuilderError> {
        self.builder.emit(InstructionData::Nullary { opcode: Opcode::Trap })
    }

    pub fn extract_lane(&mut self, ty: Type, arg: Value, lane: u8) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::ExtractLane { opcode: Opcode::ExtractLane, arg, lane }, ty)
    }

    pub fn swiden_low(&mut self, ty: Type, a: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Unary { opcode: Opcode::SwidenLow, arg: a }, ty)
    }

    pub fn swiden_high(&mut self, ty: Type, a: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Unary { opcode: Opcode::SwidenHigh, arg: a }, ty)
    }

    pub fn uwiden_low(&mut self, ty: Type, a: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Unary { opcode: Opcode::UwidenLow, arg: a }, ty)
    }

    pub fn uwiden_high(&mut self, ty: Type, a: Value) -> Result<Value, BuilderError> {
        self.builder.emit_one_result(InstructionData::Unary { opcode: Opcode::UwidenHigh, arg: a }, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::{CallConv, Function, Signature};

    #[test]
    fn builds_a_straight_line_function() {
        let mut func = Function::with_name_str("straight_line", Signature::new(CallConv::SystemV));
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let p0 = b.append_block_param(entry, Type::I32);
        b.switch_to_block(entry).unwrap();
        let one = b.ins().iconst(Type::I32, 1).unwrap();
        let sum = b.ins().iadd(Type::I32, p0, one).unwrap();
        b.ins().return_(&[sum]).unwrap();

        assert_eq!(func.layout.block_insts(entry).count(), 3);
        assert_eq!(func.dfg.value_type(sum), Type::I32);
    }

    #[test]
    fn builds_a_diamond_with_jumps() {
        let mut func = Function::with_name_str("diamond", Signature::new(CallConv::SystemV));
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let left = b.create_block();
        let right = b.create_block();
        let join = b.create_block();
        let cond = b.append_block_param(entry, Type::I32);

        b.switch_to_block(entry).unwrap();
        let to_left = b.block_call(left, &[]);
        let to_right = b.block_call(right, &[]);
        b.ins().brif(cond, to_left, to_right).unwrap();

        b.switch_to_block(left).unwrap();
        let l_to_join = b.block_call(join, &[]);
        b.ins().jump(l_to_join).unwrap();

        b.switch_to_block(right).unwrap();
        let r_to_join = b.block_call(join, &[]);
        b.ins().jump(r_to_join).unwrap();

        let cfg = func.compute_cfg();
        assert_eq!(cfg.predecessor_count(join), 2);
    }

    #[test]
    fn builds_a_br_table_with_default_and_entries() {
        let mut func = Function::with_name_str("switch", Signature::new(CallConv::SystemV));
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let case0 = b.create_block();
        let case1 = b.create_block();
        let default = b.create_block();

        b.switch_to_block(entry).unwrap();
        let index = b.append_block_param(entry, Type::I32);
        let to_default = b.block_call(default, &[]);
        let to_case0 = b.block_call(case0, &[]);
        let to_case1 = b.block_call(case1, &[]);
        let table = b.push_jump_table(to_default, vec![to_case0, to_case1]);
        b.ins().br_table(index, table).unwrap();

        let cfg = func.compute_cfg();
        assert_eq!(cfg.successors(entry).len(), 3);
        assert!(cfg.successors(entry).contains(&default));
        assert!(cfg.successors(entry).contains(&case0));
        assert!(cfg.successors(entry).contains(&case1));
    }

    #[test]
    fn current_without_switch_to_block_is_an_error() {
        let mut func = Function::with_name_str("no_block", Signature::new(CallConv::SystemV));
        let mut b = FunctionBuilder::new(&mut func);
        assert_eq!(b.ins().trap().unwrap_err(), crate::error::BuilderError::NoCurrentBlock);
    }
}
