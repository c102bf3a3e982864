#![forbid(unsafe_code)]

//! Leaf types shared between the Opal IR, its interpreter, and the JIT
//! backends: SSA value identifiers, compare condition codes, and the
//! float-compare flag set.
//!
//! Operation widths are carried as raw byte counts (`1, 2, 4, 8, 16`)
//! rather than an enum, because a handful of IR operations key their
//! behavior off sizes that no enum variant would name.

use bitflags::bitflags;

/// Identifier of an SSA value: an index into the per-block node table.
///
/// Node 0 is a legal value id. Containers that need an out-of-band "no
/// value" encoding use [`NodeId::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel for unused operand slots in fixed-width argument arrays.
    pub const INVALID: NodeId = NodeId(u32::MAX);

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

/// Compare condition for `Select`.
///
/// The first letter names the operand interpretation: `U*` compares are
/// unsigned, `S*` signed, `F*` reinterpret the operand bit patterns as
/// floats. `Eq`/`Neq` compare the raw (unsigned) bit patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CondCode {
    Eq,
    Neq,
    Uge,
    Ult,
    Mi,
    Pl,
    Vs,
    Vc,
    Ugt,
    Ule,
    Sge,
    Slt,
    Sgt,
    Sle,
    /// Float: less than, or unordered.
    Flu,
    /// Float: greater than or equal (false on NaN).
    Fge,
    /// Float: less than or equal, or unordered.
    Fleu,
    /// Float: greater than (false on NaN).
    Fgt,
    /// Float: unordered (either operand NaN).
    Fu,
    /// Float: not unordered.
    Fnu,
}

bitflags! {
    /// Flag bits requested from and produced by `FCmp`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FcmpFlags: u32 {
        const LT = 1 << 0;
        const UNORDERED = 1 << 1;
        const EQ = 1 << 2;
    }
}

/// All-ones mask covering the low `bits` bits of a `u64`.
///
/// `bits >= 64` yields the full mask, which is the convention the
/// bitfield operations rely on for 64-bit-wide fields.
#[inline]
#[must_use]
pub const fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
