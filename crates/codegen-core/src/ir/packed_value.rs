//! The bit-packed 64-bit encoding of a single SSA value's definition.
//!
//! Every [`Value`] maps to one `u64` record: `tag:2 | type:14 | x:24 | y:24`.
//! `x`/`y` are reinterpreted per tag:
//!
//! | tag     | x                | y             |
//! |---------|------------------|---------------|
//! | `Inst`  | result index     | inst index    |
//! | `Param` | param index      | block index   |
//! | `Alias` | (unused, 0)      | original value index |
//! | `Union` | value index (x)  | value index (y) |
//!
//! Keeping this as a flat integer (rather than an enum with a `Type`
//! field, as the teacher's `ValueData` does) is what the spec's "Packed
//! value table" component and its decode-roundtrip property are about; the
//! logical view (`ValueData`/`ValueDef`) is adapted from the teacher's
//! `dfg.rs` on top of this representation.

use super::entities::{Block, Inst, Value};
use super::types::Type;
use cranelift_entity::EntityRef;

const TAG_BITS: u32 = 2;
const TYPE_BITS: u32 = 14;
const X_BITS: u32 = 24;
const Y_BITS: u32 = 24;

const TAG_SHIFT: u32 = TYPE_BITS + X_BITS + Y_BITS;
const TYPE_SHIFT: u32 = X_BITS + Y_BITS;
const X_SHIFT: u32 = Y_BITS;
const Y_SHIFT: u32 = 0;

const TAG_MASK: u64 = (1 << TAG_BITS) - 1;
const TYPE_MASK: u64 = (1 << TYPE_BITS) - 1;
const X_MASK: u64 = (1 << X_BITS) - 1;
const Y_MASK: u64 = (1 << Y_BITS) - 1;

const _: () = assert!(TAG_BITS + TYPE_BITS + X_BITS + Y_BITS == 64);

/// Which of the four shapes a packed value record has.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Tag {
    Inst = 0,
    Param = 1,
    Alias = 2,
    Union = 3,
}

impl Tag {
    fn from_bits(bits: u64) -> Tag {
        match bits {
            0 => Tag::Inst,
            1 => Tag::Param,
            2 => Tag::Alias,
            3 => Tag::Union,
            _ => unreachable!("tag is masked to 2 bits"),
        }
    }
}

/// A decoded packed value record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PackedValueData {
    Inst { ty: Type, num: u32, inst: Inst },
    Param { ty: Type, num: u32, block: Block },
    Alias { ty: Type, original: Value },
    Union { ty: Type, x: Value, y: Value },
}

impl PackedValueData {
    pub fn ty(self) -> Type {
        match self {
            PackedValueData::Inst { ty, .. }
            | PackedValueData::Param { ty, .. }
            | PackedValueData::Alias { ty, .. }
            | PackedValueData::Union { ty, .. } => ty,
        }
    }

    pub fn with_type(self, ty: Type) -> Self {
        match self {
            PackedValueData::Inst { num, inst, .. } => PackedValueData::Inst { ty, num, inst },
            PackedValueData::Param { num, block, .. } => PackedValueData::Param { ty, num, block },
            PackedValueData::Alias { original, .. } => PackedValueData::Alias { ty, original },
            PackedValueData::Union { x, y, .. } => PackedValueData::Union { ty, x, y },
        }
    }

    /// Encode into the 64-bit on-disk record.
    pub fn encode(self) -> u64 {
        let (tag, ty, x, y) = match self {
            PackedValueData::Inst { ty, num, inst } => (Tag::Inst, ty, num, inst.index() as u32),
            PackedValueData::Param { ty, num, block } => {
                (Tag::Param, ty, num, block.index() as u32)
            }
            PackedValueData::Alias { ty, original } => (Tag::Alias, ty, 0, original.index() as u32),
            PackedValueData::Union { ty, x, y } => {
                (Tag::Union, ty, x.index() as u32, y.index() as u32)
            }
        };
        encode_raw(tag, ty, x, y)
    }

    /// Decode a 64-bit record previously produced by [`Self::encode`].
    pub fn decode(bits: u64) -> PackedValueData {
        let (tag, ty, x, y) = decode_raw(bits);
        match tag {
            Tag::Inst => PackedValueData::Inst {
                ty,
                num: x,
                inst: Inst::new(y as usize),
            },
            Tag::Param => PackedValueData::Param {
                ty,
                num: x,
                block: Block::new(y as usize),
            },
            Tag::Alias => PackedValueData::Alias {
                ty,
                original: Value::new(y as usize),
            },
            Tag::Union => PackedValueData::Union {
                ty,
                x: Value::new(x as usize),
                y: Value::new(y as usize),
            },
        }
    }
}

/// Pack raw fields into the 64-bit record. Panics (via debug assertion) if
/// any field overflows its allotted bits, matching the spec's "debug
/// assertions" requirement for the packing routines.
pub fn encode_raw(tag: Tag, ty: Type, x: u32, y: u32) -> u64 {
    let ty_bits = u16::from(TypeBits(ty)) as u64;
    debug_assert!(ty_bits <= TYPE_MASK, "type index overflows 14 bits");
    debug_assert!((x as u64) <= X_MASK, "x overflows 24 bits");
    debug_assert!((y as u64) <= Y_MASK, "y overflows 24 bits");
    ((tag as u64) << TAG_SHIFT)
        | ((ty_bits & TYPE_MASK) << TYPE_SHIFT)
        | (((x as u64) & X_MASK) << X_SHIFT)
        | (((y as u64) & Y_MASK) << Y_SHIFT)
}

pub fn decode_raw(bits: u64) -> (Tag, Type, u32, u32) {
    let tag = Tag::from_bits((bits >> TAG_SHIFT) & TAG_MASK);
    let ty = Type::from(((bits >> TYPE_SHIFT) & TYPE_MASK) as u16);
    let x = ((bits >> X_SHIFT) & X_MASK) as u32;
    let y = ((bits >> Y_SHIFT) & Y_MASK) as u32;
    (tag, ty, x, y)
}

/// A thin bridge so `Type`'s private repr doesn't need to be exposed
/// outside this module: `Type` round-trips through a raw `u16` via its
/// `Default`/bit pattern, which is exactly its internal representation.
struct TypeBits(Type);

impl From<TypeBits> for u16 {
    fn from(t: TypeBits) -> u16 {
        // SAFETY-free: `Type` is `#[repr(transparent)]`-equivalent over a
        // `u16`; we go through Display-free field access via `Type`'s own
        // public round-trip helpers instead of transmuting.
        t.0.bits_repr()
    }
}

impl From<u16> for Type {
    fn from(bits: u16) -> Type {
        Type::from_bits_repr(bits)
    }
}

impl From<TypeBits> for Type {
    fn from(t: TypeBits) -> Type {
        t.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_scenario_packed_value_decode() {
        // encode(tag=0, ty=I64=0x77, x=2, y=42) -> decode -> Result{inst=42, num=2}
        let bits = encode_raw(Tag::Inst, Type::I64, 2, 42);
        let decoded = PackedValueData::decode(bits);
        assert_eq!(
            decoded,
            PackedValueData::Inst {
                ty: Type::I64,
                num: 2,
                inst: Inst::new(42),
            }
        );
    }

    #[test]
    fn roundtrip_all_tags() {
        for (tag, x, y) in [
            (Tag::Inst, 5u32, 9u32),
            (Tag::Param, 0, 0),
            (Tag::Alias, 0, 123),
            (Tag::Union, 7, 8),
        ] {
            let bits = encode_raw(tag, Type::I32, x, y);
            let (t2, ty2, x2, y2) = decode_raw(bits);
            assert_eq!(t2, tag);
            assert_eq!(ty2, Type::I32);
            assert_eq!(x2, x);
            assert_eq!(y2, y);
        }
    }

    #[test]
    fn field_bounds_roundtrip_property() {
        // for every (tag, ty, x, y) with tag<4, ty<2^14, x,y<2^24,
        // decode(encode(tag,ty,x,y)) == (tag,ty,x,y)
        for tag in [Tag::Inst, Tag::Param, Tag::Alias, Tag::Union] {
            for ty_bits in [0u16, 1, 0x77, (1 << 14) - 1] {
                for x in [0u32, 1, (1 << 24) - 1] {
                    for y in [0u32, 1, (1 << 24) - 1] {
                        let ty = Type::from(ty_bits);
                        let bits = encode_raw(tag, ty, x, y);
                        let (t2, ty2, x2, y2) = decode_raw(bits);
                        assert_eq!(t2, tag);
                        assert_eq!(u16::from(TypeBits(ty2)), ty_bits);
                        assert_eq!(x2, x);
                        assert_eq!(y2, y);
                    }
                }
            }
        }
    }
}
