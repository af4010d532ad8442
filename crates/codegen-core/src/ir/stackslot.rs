//! Stack-slot and dynamic-stack-slot pools.
//!
//! Named in spec §3 ("Function owns: … stack-slot map …") but not further
//! specified; modeled as a `PrimaryMap`-backed pool following the
//! teacher's `Insts`/`Blocks` wrapper-over-`PrimaryMap` convention in
//! `mu-ir/src/ir/dfg.rs`.

use cranelift_entity::PrimaryMap;
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use super::entities::{DynamicStackSlot, DynamicType, StackSlot};

/// What a fixed-size stack slot is used for; affects frame layout and
/// alias analysis but is opaque to this crate's core passes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum StackSlotKind {
    ExplicitSlot,
    SpillSlot,
    IncomingArg,
    OutgoingArg,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct StackSlotData {
    pub kind: StackSlotKind,
    pub size: u32,
    pub align_shift: u8,
}

impl StackSlotData {
    pub fn new(kind: StackSlotKind, size: u32, align_shift: u8) -> Self {
        Self { kind, size, align_shift }
    }
}

/// A stack allocation whose size is resolved at runtime via a
/// [`GlobalValue`] (e.g. a dynamic-vector spill slot).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct DynamicStackSlotData {
    pub dyn_type: DynamicType,
    pub align_shift: u8,
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct StackSlots {
    slots: PrimaryMap<StackSlot, StackSlotData>,
    dynamic_slots: PrimaryMap<DynamicStackSlot, DynamicStackSlotData>,
}

impl StackSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: StackSlotData) -> StackSlot {
        self.slots.push(data)
    }

    pub fn push_dynamic(&mut self, data: DynamicStackSlotData) -> DynamicStackSlot {
        self.dynamic_slots.push(data)
    }

    pub fn get(&self, slot: StackSlot) -> &StackSlotData {
        &self.slots[slot]
    }

    pub fn get_dynamic(&self, slot: DynamicStackSlot) -> &DynamicStackSlotData {
        &self.dynamic_slots[slot]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total frame-relative size needed, each slot rounded up to its own
    /// alignment. Dynamic slots (unknown size at this layer) are not
    /// included; the layer that resolves `DynamicType` lane counts is out
    /// of scope for this crate's core.
    pub fn frame_size(&self) -> u32 {
        self.slots.values().map(|s| align_up(s.size, 1u32 << s.align_shift)).sum()
    }
}

fn align_up(n: u32, align: u32) -> u32 {
    (n + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_frame_size() {
        let mut slots = StackSlots::new();
        slots.push(StackSlotData::new(StackSlotKind::ExplicitSlot, 3, 2));
        slots.push(StackSlotData::new(StackSlotKind::SpillSlot, 8, 3));
        assert_eq!(slots.frame_size(), 4 + 8);
    }
}
