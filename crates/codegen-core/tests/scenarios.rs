//! Whole-crate integration tests for the seven concrete scenarios: one
//! test per scenario, built only against the public API rather than
//! `#[cfg(test)]`-only internals.

use codegen_core::dominator_tree::DomTree;
use codegen_core::egraph::{built_in_rules, saturate, EGraph, SaturationConfig};
use codegen_core::ir::builder::FunctionBuilder;
use codegen_core::ir::entities::Value;
use codegen_core::ir::function::{CallConv, Function, Signature};
use codegen_core::ir::opcode::Opcode;
use codegen_core::ir::packed_value::{encode_raw, PackedValueData, Tag};
use codegen_core::ir::types::Type;
use codegen_core::riscv::Inst;
use std::collections::HashSet;

#[test]
fn scenario_1_packed_value_decode() {
    let bits = encode_raw(Tag::Inst, Type::I64, 2, 42);
    let decoded = PackedValueData::decode(bits);
    match decoded {
        PackedValueData::Inst { ty, num, inst } => {
            assert_eq!(ty, Type::I64);
            assert_eq!(num, 2);
            assert_eq!(inst.as_u32(), 42);
        }
        other => panic!("expected an Inst record, got {other:?}"),
    }
}

fn diamond() -> (Function, codegen_core::ir::entities::Block, codegen_core::ir::entities::Block) {
    let mut func = Function::with_name_str("diamond", Signature::new(CallConv::SystemV));
    let mut b = FunctionBuilder::new(&mut func);
    let b0 = b.create_block();
    let b1 = b.create_block();
    let b2 = b.create_block();
    let b3 = b.create_block();

    b.switch_to_block(b0).unwrap();
    let cond = b.append_block_param(b0, Type::I32);
    let to_b1 = b.block_call(b1, &[]);
    let to_b2 = b.block_call(b2, &[]);
    b.ins().brif(cond, to_b1, to_b2).unwrap();

    b.switch_to_block(b1).unwrap();
    let to_b3a = b.block_call(b3, &[]);
    b.ins().jump(to_b3a).unwrap();

    b.switch_to_block(b2).unwrap();
    let to_b3b = b.block_call(b3, &[]);
    b.ins().jump(to_b3b).unwrap();

    (func, b0, b3)
}

#[test]
fn scenario_2_diamond_dominator() {
    let (mut func, b0, b3) = diamond();
    let blocks: Vec<_> = func.layout.blocks().collect();
    let (_, b1, b2, _) = (blocks[0], blocks[1], blocks[2], blocks[3]);
    let cfg = func.compute_cfg();

    let dt = DomTree::compute(cfg, b0);
    assert_eq!(dt.idom(b1), Some(b0));
    assert_eq!(dt.idom(b2), Some(b0));
    assert_eq!(dt.idom(b3), Some(b0));

    let all = blocks.clone();
    let df = |x| dt.dominance_frontier(x, all.clone(), |b| cfg.successors(b).to_vec());
    assert_eq!(df(b1), HashSet::from([b3]));
    assert_eq!(df(b2), HashSet::from([b3]));
    assert!(df(b0).is_empty());
}

#[test]
fn scenario_3_loop_dominator() {
    let mut func = Function::with_name_str("loop", Signature::new(CallConv::SystemV));
    let mut b = FunctionBuilder::new(&mut func);
    let b0 = b.create_block();
    let b1 = b.create_block();
    let b2 = b.create_block();

    b.switch_to_block(b0).unwrap();
    let to_b1 = b.block_call(b1, &[]);
    b.ins().jump(to_b1).unwrap();

    b.switch_to_block(b1).unwrap();
    let cond = b.append_block_param(b1, Type::I32);
    let to_b2 = b.block_call(b2, &[]);
    let back_to_b1 = b.block_call(b1, &[cond]);
    b.ins().brif(cond, to_b2, back_to_b1).unwrap();

    b.switch_to_block(b2).unwrap();
    let to_b1_again = b.block_call(b1, &[cond]);
    b.ins().jump(to_b1_again).unwrap();

    let cfg = func.compute_cfg();
    let dt = DomTree::compute(cfg, b0);
    assert_eq!(dt.idom(b1), Some(b0));
    assert_eq!(dt.idom(b2), Some(b1));

    let all = [b0, b1, b2];
    let df = dt.dominance_frontier(b2, all, |b| cfg.successors(b).to_vec());
    assert_eq!(df, HashSet::from([b1]));
}

#[test]
fn scenario_4_egraph_congruence() {
    let mut g = EGraph::new();
    let x = g.add_opaque(Value::from_u32(0));
    let y = g.add_opaque(Value::from_u32(1));
    let one = g.add_const(1);
    let x_plus_1 = g.add_op(Opcode::Iadd, &[x, one]);
    let y_plus_1 = g.add_op(Opcode::Iadd, &[y, one]);

    g.merge(x, y);
    g.rebuild();

    assert_eq!(g.find(x_plus_1), g.find(y_plus_1));
}

#[test]
fn scenario_5_saturation_rewrite() {
    let mut g = EGraph::new();
    let a = g.add_opaque(Value::from_u32(0));
    let zero = g.add_const(0);
    let sum = g.add_op(Opcode::Iadd, &[a, zero]);

    let rules: Vec<_> = built_in_rules().into_iter().filter(|r| r.rule.name == "iadd_zero_right").collect();
    saturate(&mut g, &rules, SaturationConfig { max_iterations: 1, ..Default::default() });

    assert_eq!(g.find(sum), g.find(a));
}

#[test]
fn scenario_6_riscv_r_encoding() {
    let inst = Inst::Add { rd: codegen_core::riscv::Reg(10), rs1: codegen_core::riscv::Reg(11), rs2: codegen_core::riscv::Reg(12) };
    assert_eq!(inst.encode(), 0x00C58533);
    assert_eq!(inst.encode().to_le_bytes(), [0x33, 0x85, 0xC5, 0x00]);
}

#[test]
fn scenario_7_riscv_i_encoding() {
    let inst = Inst::Addi { rd: codegen_core::riscv::Reg(10), rs1: codegen_core::riscv::Reg(11), imm: 42 };
    assert_eq!(inst.encode(), 0x02A58513);
}
