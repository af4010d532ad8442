//! Interval range analysis: a forward dataflow pass computing a bounded
//! `[min, max]` lattice value for every value in a function (spec §4.9).
//!
//! New module — grounded on spec §4.9 directly; no teacher or pack file
//! implements an interval-lattice dataflow pass over an SSA IR. The
//! "blocks in layout order, join at merge points, cap at 100 iterations"
//! driver shape follows the same layout-order-traversal idiom the e-graph
//! builder (`egraph.rs::build_from_function`) and the verifier use.

use std::collections::HashMap;

use crate::ir::entities::Value;
use crate::ir::function::Function;
use crate::ir::instructions::InstructionData;
use crate::ir::opcode::{Arity, Opcode};
use crate::ir::types::Type;

/// The analysis never runs more dataflow rounds than this, regardless of
/// whether it has reached a fixpoint (spec §4.9's "hard cap of 100
/// iterations").
pub const MAX_ITERATIONS: usize = 100;

/// A `[min, max]` interval over `bits`-wide two's-complement integers,
/// tagged with the signedness under which `min`/`max` should be read.
/// `min`/`max` are carried in `i128` so a full 64-bit unsigned range
/// (`[0, u64::MAX]`) never overflows the interval's own arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    min: i128,
    max: i128,
    bits: u32,
    signed: bool,
}

impl Range {
    /// The empty range, spec's `[1, 0]` (`min > max` so every operation
    /// that meets it collapses to empty too).
    pub fn empty(bits: u32, signed: bool) -> Range {
        Range { min: 1, max: 0, bits, signed }
    }

    /// The full range of every value representable in `bits` bits under
    /// `signed`'s interpretation.
    pub fn full(bits: u32, signed: bool) -> Range {
        let (min, max) = Self::type_bounds(bits, signed);
        Range { min, max, bits, signed }
    }

    pub fn of_type(ty: Type, signed: bool) -> Range {
        Range::full(ty.bits(), signed)
    }

    pub fn constant(value: i64, bits: u32, signed: bool) -> Range {
        Range { min: value as i128, max: value as i128, bits, signed }
    }

    fn type_bounds(bits: u32, signed: bool) -> (i128, i128) {
        if signed {
            let half = 1i128 << (bits - 1);
            (-half, half - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    pub fn is_empty(self) -> bool {
        self.min > self.max
    }

    pub fn min(self) -> i128 {
        self.min
    }

    pub fn max(self) -> i128 {
        self.max
    }

    fn clamp_to_full(self) -> Range {
        let (lo, hi) = Self::type_bounds(self.bits, self.signed);
        if self.min < lo || self.max > hi {
            Range::full(self.bits, self.signed)
        } else {
            self
        }
    }

    /// Lattice intersection: the narrowest range both `self` and `other`
    /// agree on.
    pub fn meet(self, other: Range) -> Range {
        if self.is_empty() || other.is_empty() {
            return Range::empty(self.bits, self.signed);
        }
        Range { min: self.min.max(other.min), max: self.max.min(other.max), bits: self.bits, signed: self.signed }
    }

    /// Lattice union: the narrowest range containing both `self` and
    /// `other`. Used at control-flow merge points.
    pub fn join(self, other: Range) -> Range {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Range { min: self.min.min(other.min), max: self.max.max(other.max), bits: self.bits, signed: self.signed }
            .clamp_to_full()
    }

    /// Fixed-point acceleration: once an endpoint has moved past where it
    /// started, jump straight to the type bound instead of creeping toward
    /// it one iteration at a time.
    pub fn widen(self, previous: Range) -> Range {
        if previous.is_empty() {
            return self;
        }
        let (lo, hi) = Self::type_bounds(self.bits, self.signed);
        let min = if self.min < previous.min { lo } else { self.min };
        let max = if self.max > previous.max { hi } else { self.max };
        Range { min, max, bits: self.bits, signed: self.signed }
    }

    pub fn add(self, rhs: Range) -> Range {
        if self.is_empty() || rhs.is_empty() {
            return Range::empty(self.bits, self.signed);
        }
        Range { min: self.min + rhs.min, max: self.max + rhs.max, bits: self.bits, signed: self.signed }
            .clamp_to_full()
    }

    pub fn sub(self, rhs: Range) -> Range {
        if self.is_empty() || rhs.is_empty() {
            return Range::empty(self.bits, self.signed);
        }
        Range { min: self.min - rhs.max, max: self.max - rhs.min, bits: self.bits, signed: self.signed }
            .clamp_to_full()
    }

    pub fn mul(self, rhs: Range) -> Range {
        if self.is_empty() || rhs.is_empty() {
            return Range::empty(self.bits, self.signed);
        }
        let candidates = [self.min * rhs.min, self.min * rhs.max, self.max * rhs.min, self.max * rhs.max];
        let min = candidates.iter().copied().min().unwrap();
        let max = candidates.iter().copied().max().unwrap();
        Range { min, max, bits: self.bits, signed: self.signed }.clamp_to_full()
    }

    /// `and`: the result can never exceed the narrower operand's max, and
    /// clearing bits only ever lowers a nonnegative value, so the floor is
    /// always 0 in the unsigned interpretation this analysis uses for
    /// bitwise ops (spec §4.9).
    pub fn bitand(self, rhs: Range) -> Range {
        if self.is_empty() || rhs.is_empty() {
            return Range::empty(self.bits, false);
        }
        Range { min: 0, max: self.max.max(0).min(rhs.max.max(0)), bits: self.bits, signed: false }
    }

    pub fn bitor(self, rhs: Range) -> Range {
        if self.is_empty() || rhs.is_empty() {
            return Range::empty(self.bits, false);
        }
        let (_, hi) = Self::type_bounds(self.bits, false);
        Range { min: self.min.max(0).max(rhs.min.max(0)), max: hi, bits: self.bits, signed: false }
    }

    pub fn bitxor(self) -> Range {
        Range::full(self.bits, false)
    }

    pub fn shl(self, amount: u32) -> Range {
        if self.is_empty() {
            return self;
        }
        match (self.min.checked_shl(amount), self.max.checked_shl(amount)) {
            (Some(min), Some(max)) => Range { min, max, bits: self.bits, signed: self.signed }.clamp_to_full(),
            _ => Range::full(self.bits, self.signed),
        }
    }

    pub fn ushr(self, amount: u32) -> Range {
        if self.is_empty() {
            return self;
        }
        let (_, hi) = Self::type_bounds(self.bits, false);
        let min = self.min.max(0) >> amount.min(self.bits);
        let max = self.max.clamp(0, hi) >> amount.min(self.bits);
        Range { min, max, bits: self.bits, signed: false }
    }

    pub fn sshr(self, amount: u32) -> Range {
        if self.is_empty() {
            return self;
        }
        let shift = amount.min(self.bits - 1);
        Range { min: self.min >> shift, max: self.max >> shift, bits: self.bits, signed: true }
    }
}

/// Runs the range analysis over `func`: block parameters start at `full`,
/// every instruction's result range is computed from its operands' ranges
/// and joined into whatever range that value already had, and the whole
/// sweep repeats until no value's range changes or [`MAX_ITERATIONS`] is
/// reached. A value whose defining instruction has no per-opcode rule above
/// still gets a sound `full` range as long as that opcode takes fixed
/// `Value` operands (`Arity::One`/`Two`/`Three`); a variadic or operand-less
/// opcode (calls, other constants, traps) gets no entry at all, and any
/// later lookup of such a value falls back to `full` at the use site.
pub fn analyze(func: &Function) -> HashMap<Value, Range> {
    let mut ranges: HashMap<Value, Range> = HashMap::new();

    for block in func.layout.blocks() {
        for &p in func.dfg.block_params(block) {
            let ty = func.dfg.value_type(p);
            ranges.insert(p, Range::of_type(ty, false));
        }
    }

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for block in func.layout.blocks() {
            for inst in func.layout.block_insts(block) {
                let data = &func.dfg.insts[inst];
                let Some(&result) = func.dfg.inst_results(inst).first() else { continue };
                let ty = func.dfg.value_type(result);
                let Some(computed) = compute_range(data, ty, &ranges) else { continue };

                let previous = ranges.get(&result).copied().unwrap_or_else(|| Range::empty(ty.bits(), computed.signed));
                let widened = computed.join(previous).widen(previous);
                if Some(widened) != ranges.get(&result).copied() {
                    ranges.insert(result, widened);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    ranges
}

fn compute_range(data: &InstructionData, ty: Type, ranges: &HashMap<Value, Range>) -> Option<Range> {
    let bits = ty.bits();
    let of = |v: Value| ranges.get(&v).copied().unwrap_or_else(|| Range::full(bits, false));

    match data {
        InstructionData::UnaryImm { opcode: Opcode::Iconst, imm } => Some(Range::constant(*imm, bits, true)),
        InstructionData::Binary { opcode, args } => {
            let lhs = of(args[0]);
            let rhs = of(args[1]);
            match opcode {
                Opcode::Iadd => Some(lhs.add(rhs)),
                Opcode::Isub => Some(lhs.sub(rhs)),
                Opcode::Imul => Some(lhs.mul(rhs)),
                Opcode::Band => Some(lhs.bitand(rhs)),
                Opcode::Bor => Some(lhs.bitor(rhs)),
                Opcode::Bxor => Some(lhs.bitxor()),
                Opcode::Ishl => constant_shift(rhs, bits).map(|n| lhs.shl(n)),
                Opcode::Ushr => constant_shift(rhs, bits).map(|n| lhs.ushr(n)),
                Opcode::Sshr => constant_shift(rhs, bits).map(|n| lhs.sshr(n)),
                Opcode::Sdiv | Opcode::Srem => Some(Range::full(bits, true)),
                Opcode::Udiv | Opcode::Urem => Some(Range::full(bits, false)),
                _ => None,
            }
        }
        // No per-opcode rule above applies. An unmodeled op that still takes
        // real `Value` operands (sign/zero-extends, bit ops, comparisons,
        // loads, …) produces a value this analysis can't narrow, but `full`
        // is still a sound bound; an unmodeled op with no operands at all
        // (other constants, traps) or a variadic one (calls) has nothing
        // here to derive even that from, so it's left unranged instead.
        _ => match data.opcode().arity() {
            Arity::One | Arity::Two | Arity::Three => Some(Range::full(bits, false)),
            Arity::Zero | Arity::Variadic => None,
        },
    }
}

/// Only a shift by a value already proven to be a single constant narrows
/// the result; anything else is conservatively unbounded (spec's "shifts
/// by constant" rule doesn't say what a variable shift does, so this
/// falls through to the `None` → caller leaves the value at `full`).
fn constant_shift(amount: Range, bits: u32) -> Option<u32> {
    if amount.min() == amount.max() && (0..bits as i128).contains(&amount.min()) {
        Some(amount.min() as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::function::{CallConv, Function, Signature};

    #[test]
    fn meet_is_intersection() {
        let a = Range { min: 0, max: 10, bits: 32, signed: false };
        let b = Range { min: 5, max: 20, bits: 32, signed: false };
        let m = a.meet(b);
        assert_eq!((m.min(), m.max()), (5, 10));
    }

    #[test]
    fn join_is_union_and_clamps_to_full_on_overflow() {
        let a = Range::full(8, false);
        let b = Range::constant(300, 8, false);
        let j = a.join(b);
        assert_eq!(j, Range::full(8, false));
    }

    #[test]
    fn add_of_two_constants_is_exact() {
        let a = Range::constant(3, 32, true);
        let b = Range::constant(4, 32, true);
        let sum = a.add(b);
        assert_eq!((sum.min(), sum.max()), (7, 7));
    }

    #[test]
    fn add_overflowing_type_bounds_collapses_to_full() {
        let a = Range::constant(i64::from(u8::MAX), 8, false);
        let b = Range::constant(1, 8, false);
        let sum = a.add(b);
        assert_eq!(sum, Range::full(8, false));
    }

    #[test]
    fn widen_jumps_straight_to_the_type_bound() {
        let ty_full = Range::full(8, false);
        let prev = Range::constant(5, 8, false);
        let grown = Range { min: 0, max: 6, bits: 8, signed: false };
        assert_eq!(grown.widen(prev), ty_full);
    }

    #[test]
    fn analysis_narrows_a_constant_through_an_add() {
        let mut func = Function::with_name_str("range_add", Signature::new(CallConv::SystemV));
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry).unwrap();
        let one = b.ins().iconst(Type::I32, 1).unwrap();
        let two = b.ins().iconst(Type::I32, 2).unwrap();
        let sum = b.ins().iadd(Type::I32, one, two).unwrap();
        b.ins().return_(&[sum]).unwrap();

        let ranges = analyze(&func);
        let r = ranges[&sum];
        assert_eq!((r.min(), r.max()), (3, 3));
    }

    #[test]
    fn block_parameters_start_at_full_range() {
        let mut func = Function::with_name_str("range_param", Signature::new(CallConv::SystemV));
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        let p0 = b.append_block_param(entry, Type::I32);
        b.switch_to_block(entry).unwrap();
        b.ins().return_(&[p0]).unwrap();

        let ranges = analyze(&func);
        assert_eq!(ranges[&p0], Range::full(32, false));
    }

    #[test]
    fn unmodeled_unary_op_still_gets_a_sound_full_range() {
        // `ineg` has no per-opcode rule in `compute_range`; its arity (One)
        // should still route it to a sound `full` range instead of leaving
        // its result unranged forever.
        let mut func = Function::with_name_str("range_ineg", Signature::new(CallConv::SystemV));
        let mut b = FunctionBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry).unwrap();
        let one = b.ins().iconst(Type::I32, 1).unwrap();
        let negated = b.ins().ineg(Type::I32, one).unwrap();
        b.ins().return_(&[negated]).unwrap();

        let ranges = analyze(&func);
        assert_eq!(ranges[&negated], Range::full(32, false));
    }

    #[test]
    fn unmodeled_zero_arity_op_computes_no_range() {
        // `debugtrap` takes no `Value` operands at all, unlike the
        // one/two/three-arity case above, so there's nothing to derive even
        // a sound `full` bound from.
        let ranges = HashMap::new();
        let data = InstructionData::Nullary { opcode: Opcode::Debugtrap };
        assert_eq!(compute_range(&data, Type::I32, &ranges), None);
    }
}
