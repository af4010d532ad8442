//! Memory access flags and trap codes.
//!
//! `MemFlags` is the 16-bit bitfield from spec §3: `aligned`, `readonly`,
//! endianness, `checked`, an alias-region tag, an 8-bit trap code, and
//! `can_move`. Grounded on the `bitflags` idiom (see
//! `messense-llvm-bitcode-rs` in the retrieval pack for bit-packed wire
//! fields in the same style); the teacher has no memory-flags analogue.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    struct Bits: u8 {
        const ALIGNED    = 0b0000_0001;
        const READONLY   = 0b0000_0010;
        const BIG_ENDIAN = 0b0000_0100;
        const CHECKED    = 0b0000_1000;
        const CAN_MOVE   = 0b0001_0000;
    }
}

/// Byte order of a memory access.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Endianness {
    Little,
    Big,
    /// Whatever the target's native order is.
    Native,
}

/// Which address space an access falls in, for alias analysis.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AliasRegion {
    Heap,
    Table,
    VmCtx,
}

/// A single byte identifying which trap this access (or `trap`/`trapz`/
/// `trapnz` instruction) raises. `0` is invalid; `1..=250` are
/// user-defined; `251..=255` are the well-known traps below.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TrapCode(u8);

impl TrapCode {
    pub const STACK_OVERFLOW: TrapCode = TrapCode(251);
    pub const INTEGER_OVERFLOW: TrapCode = TrapCode(252);
    pub const HEAP_OUT_OF_BOUNDS: TrapCode = TrapCode(253);
    pub const INTEGER_DIVISION_BY_ZERO: TrapCode = TrapCode(254);
    pub const BAD_CONVERSION_TO_INTEGER: TrapCode = TrapCode(255);

    /// A user-defined trap code in `1..=250`.
    pub fn user(code: u8) -> Option<TrapCode> {
        if (1..=250).contains(&code) {
            Some(TrapCode(code))
        } else {
            None
        }
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn is_well_known(self) -> bool {
        self.0 >= 251
    }
}

impl fmt::Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TrapCode::STACK_OVERFLOW => write!(f, "stk_ovf"),
            TrapCode::INTEGER_OVERFLOW => write!(f, "int_ovf"),
            TrapCode::HEAP_OUT_OF_BOUNDS => write!(f, "heap_oob"),
            TrapCode::INTEGER_DIVISION_BY_ZERO => write!(f, "int_divz"),
            TrapCode::BAD_CONVERSION_TO_INTEGER => write!(f, "bad_toint"),
            TrapCode(n) => write!(f, "user{n}"),
        }
    }
}

/// The 16-bit memory-access flag bitfield from spec §3.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemFlags {
    bits: Bits,
    region: Option<AliasRegion>,
    trap_code: Option<TrapCode>,
}

impl Default for MemFlags {
    fn default() -> Self {
        MemFlags {
            bits: Bits::empty(),
            region: None,
            trap_code: None,
        }
    }
}

impl MemFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trusted() -> Self {
        let mut f = Self::new();
        f.set_aligned();
        f
    }

    pub fn is_aligned(self) -> bool {
        self.bits.contains(Bits::ALIGNED)
    }

    pub fn set_aligned(&mut self) {
        self.bits.insert(Bits::ALIGNED);
    }

    pub fn is_readonly(self) -> bool {
        self.bits.contains(Bits::READONLY)
    }

    pub fn set_readonly(&mut self) {
        self.bits.insert(Bits::READONLY);
    }

    pub fn is_checked(self) -> bool {
        self.bits.contains(Bits::CHECKED)
    }

    pub fn set_checked(&mut self) {
        self.bits.insert(Bits::CHECKED);
    }

    pub fn can_move(self) -> bool {
        self.bits.contains(Bits::CAN_MOVE)
    }

    pub fn set_can_move(&mut self) {
        self.bits.insert(Bits::CAN_MOVE);
    }

    pub fn endianness(self) -> Endianness {
        if self.bits.contains(Bits::BIG_ENDIAN) {
            Endianness::Big
        } else {
            Endianness::Native
        }
    }

    pub fn set_endianness(&mut self, e: Endianness) {
        match e {
            Endianness::Big => self.bits.insert(Bits::BIG_ENDIAN),
            Endianness::Little | Endianness::Native => self.bits.remove(Bits::BIG_ENDIAN),
        }
    }

    pub fn alias_region(self) -> Option<AliasRegion> {
        self.region
    }

    pub fn set_alias_region(&mut self, region: Option<AliasRegion>) {
        self.region = region;
    }

    pub fn trap_code(self) -> Option<TrapCode> {
        self.trap_code
    }

    pub fn set_trap_code(&mut self, code: Option<TrapCode>) {
        self.trap_code = code;
    }
}

impl fmt::Debug for MemFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemFlags(")?;
        let mut first = true;
        let mut tag = |f: &mut fmt::Formatter<'_>, s: &str| -> fmt::Result {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{s}")
        };
        if self.is_aligned() {
            tag(f, "aligned")?;
        }
        if self.is_readonly() {
            tag(f, "readonly")?;
        }
        if self.is_checked() {
            tag(f, "checked")?;
        }
        if self.can_move() {
            tag(f, "can_move")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_code_ranges() {
        assert!(TrapCode::user(0).is_none());
        assert!(TrapCode::user(251).is_none());
        assert!(TrapCode::user(1).is_some());
        assert!(TrapCode::STACK_OVERFLOW.is_well_known());
    }

    #[test]
    fn flags_default_to_unset() {
        let f = MemFlags::new();
        assert!(!f.is_aligned());
        assert!(!f.is_readonly());
        assert_eq!(f.alias_region(), None);
    }

    #[test]
    fn flags_setters() {
        let mut f = MemFlags::new();
        f.set_aligned();
        f.set_alias_region(Some(AliasRegion::Heap));
        f.set_trap_code(Some(TrapCode::HEAP_OUT_OF_BOUNDS));
        assert!(f.is_aligned());
        assert_eq!(f.alias_region(), Some(AliasRegion::Heap));
        assert_eq!(f.trap_code(), Some(TrapCode::HEAP_OUT_OF_BOUNDS));
    }
}
