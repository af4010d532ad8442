//! Opaque, strongly typed references to the entities that live inside a
//! [`Function`](super::function::Function).
//!
//! Every entity kind gets its own 32-bit handle type so the compiler can
//! catch "passed a `Block` where an `Inst` was expected" at the type level.
//! Handles never leak across function boundaries and are only meaningful
//! relative to the `Function` that allocated them.

use cranelift_entity::entity_impl;
#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// An opaque reference to a basic block in a [`Function`](super::function::Function).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an SSA value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Value(u32);
entity_impl!(Value, "v");

impl Value {
    /// Values reserve the top bit of their index space so a `Value` can be
    /// reinterpreted as a `Block` handle (see
    /// [`BlockCall`](super::instructions::BlockCall)) without losing
    /// distinguishability from ordinary parser-facing numbers.
    pub fn with_number(n: u32) -> Option<Self> {
        if n < u32::MAX / 2 {
            Some(Self(n))
        } else {
            None
        }
    }
}

/// An opaque reference to an instruction in a [`Function`](super::function::Function).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A fixed-size stack allocation.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// A stack allocation whose size is only known at runtime, via a
/// [`GlobalValue`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct DynamicStackSlot(u32);
entity_impl!(DynamicStackSlot, "dss");

/// A reference to a vector type whose lane count is determined dynamically
/// by a [`GlobalValue`] rather than being fixed at compile time.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct DynamicType(u32);
entity_impl!(DynamicType, "dt");

/// A reference to a value computed once at function entry (e.g. the
/// address of a symbol, or a load from a fixed offset).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct GlobalValue(u32);
entity_impl!(GlobalValue, "gv");

/// A reference to a struct-like memory layout description, used to teach
/// alias analysis about field boundaries. Opaque to this crate's core.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct MemoryType(u32);
entity_impl!(MemoryType, "mt");

/// A reference into the function's constant pool.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Constant(u32);
entity_impl!(Constant, "const");

/// A reference to an immediate value too large to fit inline in an
/// `InstructionData` payload.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Immediate(u32);
entity_impl!(Immediate, "imm");

/// A reference to a jump table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct JumpTable(u32);
entity_impl!(JumpTable, "jt");

/// A reference to an external function, declared in the function's
/// preamble.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// A reference into the table of externally visible names (user-defined
/// namespace:index pairs, or test-case names).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct UserExternalNameRef(u32);
entity_impl!(UserExternalNameRef, "userextname");

/// A reference to a function signature, declared in the function's
/// preamble (used by `call_indirect`).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

/// A reference to an exception tag, used by `try_call`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct ExceptionTag(u32);
entity_impl!(ExceptionTag, "tag");

/// A reference to an exception table: the set of tag -> handler-block
/// mappings attached to a `try_call`/`try_call_indirect`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct ExceptionTable(u32);
entity_impl!(ExceptionTable, "extable");

/// Values in an instruction's argument list, or a block's parameter list,
/// live in a shared pool indexed by this handle (index 0 is the empty
/// list). See [`ValueListPool`].
pub type ValueList = cranelift_entity::EntityList<Value>;

/// Backing storage for every [`ValueList`] in a [`Function`](super::function::Function).
pub type ValueListPool = cranelift_entity::ListPool<Value>;

/// A reference to any of the entities defined in this module, for error
/// reporting that needs to name "whichever entity failed" generically.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AnyEntity {
    Function,
    Block(Block),
    Inst(Inst),
    Value(Value),
    StackSlot(StackSlot),
    DynamicStackSlot(DynamicStackSlot),
    GlobalValue(GlobalValue),
    Constant(Constant),
    Immediate(Immediate),
    JumpTable(JumpTable),
    FuncRef(FuncRef),
    SigRef(SigRef),
    ExceptionTag(ExceptionTag),
    ExceptionTable(ExceptionTable),
}

impl std::fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            AnyEntity::Function => write!(f, "function"),
            AnyEntity::Block(r) => r.fmt(f),
            AnyEntity::Inst(r) => r.fmt(f),
            AnyEntity::Value(r) => r.fmt(f),
            AnyEntity::StackSlot(r) => r.fmt(f),
            AnyEntity::DynamicStackSlot(r) => r.fmt(f),
            AnyEntity::GlobalValue(r) => r.fmt(f),
            AnyEntity::Constant(r) => r.fmt(f),
            AnyEntity::Immediate(r) => r.fmt(f),
            AnyEntity::JumpTable(r) => r.fmt(f),
            AnyEntity::FuncRef(r) => r.fmt(f),
            AnyEntity::SigRef(r) => r.fmt(f),
            AnyEntity::ExceptionTag(r) => r.fmt(f),
            AnyEntity::ExceptionTable(r) => r.fmt(f),
        }
    }
}

macro_rules! any_entity_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for AnyEntity {
                fn from(r: $ty) -> Self {
                    AnyEntity::$variant(r)
                }
            }
        )*
    };
}

any_entity_from! {
    Block(Block),
    Inst(Inst),
    Value(Value),
    StackSlot(StackSlot),
    DynamicStackSlot(DynamicStackSlot),
    GlobalValue(GlobalValue),
    Constant(Constant),
    Immediate(Immediate),
    JumpTable(JumpTable),
    FuncRef(FuncRef),
    SigRef(SigRef),
    ExceptionTag(ExceptionTag),
    ExceptionTable(ExceptionTable),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_with_number_rejects_top_half() {
        assert_eq!(Value::with_number(u32::MAX / 2), None);
        assert!(Value::with_number(u32::MAX / 2 - 1).is_some());
    }

    #[test]
    fn handle_roundtrip() {
        use cranelift_entity::EntityRef;
        for i in 0..1000u32 {
            assert_eq!(Block::new(i as usize).index(), i as usize);
            assert_eq!(Inst::new(i as usize).index(), i as usize);
            assert_eq!(Value::new(i as usize).index(), i as usize);
        }
    }

    #[test]
    fn any_entity_display_matches_prefix() {
        let b = Block::from_u32(3);
        assert_eq!(AnyEntity::from(b).to_string(), "block3");
        let v = Value::from_u32(7);
        assert_eq!(AnyEntity::from(v).to_string(), "v7");
    }
}
