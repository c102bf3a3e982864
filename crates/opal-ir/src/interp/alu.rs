//! ALU operation handlers.
//!
//! Results at or below 8 bytes are written as a full 64-bit value into the
//! destination slot (`gd`); wider results are copied byte-wise. Operands
//! are read at the width the opcode's semantics dictate, which the IR
//! guarantees is compatible with the operand's declared width.
//!
//! Guest-level arithmetic exceptions (divide by zero, signed divide
//! overflow) are not checked here; the lowering front end guards them with
//! explicit IR before a divide reaches this core.

use opal_types::{low_mask, CondCode, FcmpFlags, NodeId};

use super::{fatal, ExecContext, OpHandler};
use crate::ops::{IrOp, OpPayload, Opcode};
use crate::ssa::ScratchValue;

#[inline]
fn src<T: ScratchValue>(op: &IrOp, ctx: &ExecContext<'_>, arg: usize) -> T {
    ctx.scratch.read::<T>(op.header.args[arg])
}

#[inline]
fn gd(ctx: &mut ExecContext<'_>, node: NodeId, value: u64) {
    ctx.scratch.write(node, value);
}

trait Zext: ScratchValue {
    fn zext(self) -> u64;
}

macro_rules! impl_zext {
    ($($ty:ty),*) => {
        $(impl Zext for $ty {
            #[inline]
            fn zext(self) -> u64 {
                self.into()
            }
        })*
    };
}

impl_zext!(u8, u16, u32, u64);

/// Reads both operands as `T`, applies `f`, and writes the zero-extended
/// result. The scalar kernel behind the bitwise and wrapping-arithmetic
/// families.
#[inline]
fn binop<T: Zext>(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId, f: impl FnOnce(T, T) -> T) {
    let a = src::<T>(op, ctx, 0);
    let b = src::<T>(op, ctx, 1);
    gd(ctx, node, f(a, b).zext());
}

fn op_trunc_element_pair(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        4 => {
            let pair = src::<u128>(op, ctx, 0);
            let lane0 = pair as u64;
            let lane1 = (pair >> 64) as u64;
            gd(ctx, node, (lane0 & 0xFFFF_FFFF) | (lane1 << 32));
        }
        size => fatal!("unhandled TruncElementPair size: {size}"),
    }
}

fn op_constant(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let OpPayload::Constant { value } = op.payload else {
        fatal!("malformed Constant payload");
    };
    gd(ctx, node, value);
}

fn op_entrypoint_offset(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let OpPayload::EntrypointOffset { offset } = op.payload else {
        fatal!("malformed EntrypointOffset payload");
    };
    gd(ctx, node, ctx.current_entry.wrapping_add(offset));
}

fn op_inline_constant(_op: &IrOp, _ctx: &mut ExecContext<'_>, _node: NodeId) {
    // Fused into the consuming operation; this slot is never read.
}

fn op_inline_entrypoint_offset(_op: &IrOp, _ctx: &mut ExecContext<'_>, _node: NodeId) {
    // Fused into the consuming operation; this slot is never read.
}

fn op_cycle_counter(_op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    #[cfg(feature = "debug-cycles")]
    {
        gd(ctx, node, 0);
    }
    #[cfg(not(feature = "debug-cycles"))]
    {
        // Wall clock, subject to adjustment.
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        gd(ctx, node, now.as_nanos() as u64);
    }
}

fn op_add(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        4 => binop::<u32>(op, ctx, node, u32::wrapping_add),
        8 => binop::<u64>(op, ctx, node, u64::wrapping_add),
        size => fatal!("unhandled Add size: {size}"),
    }
}

fn op_sub(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        4 => binop::<u32>(op, ctx, node, u32::wrapping_sub),
        8 => binop::<u64>(op, ctx, node, u64::wrapping_sub),
        size => fatal!("unhandled Sub size: {size}"),
    }
}

fn op_neg(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let val = src::<u64>(op, ctx, 0);
    match op.header.size {
        4 => gd(ctx, node, (val as i32).wrapping_neg() as i64 as u64),
        8 => gd(ctx, node, (val as i64).wrapping_neg() as u64),
        size => fatal!("unhandled Neg size: {size}"),
    }
}

fn op_mul(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    match op.header.size {
        4 => gd(ctx, node, ((a as i32 as i64) * (b as i32 as i64)) as u64),
        8 => gd(ctx, node, (a as i64).wrapping_mul(b as i64) as u64),
        16 => {
            let wide = (a as i64 as i128) * (b as i64 as i128);
            ctx.scratch.copy_bytes(node, &wide.to_le_bytes());
        }
        size => fatal!("unhandled Mul size: {size}"),
    }
}

fn op_umul(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    match op.header.size {
        4 => gd(ctx, node, (a as u32).wrapping_mul(b as u32) as u64),
        8 => gd(ctx, node, a.wrapping_mul(b)),
        16 => {
            let wide = (a as u128) * (b as u128);
            ctx.scratch.copy_bytes(node, &wide.to_le_bytes());
        }
        size => fatal!("unhandled UMul size: {size}"),
    }
}

fn op_div(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    match op.header.size {
        1 => gd(ctx, node, ((a as i8 as i64) / (b as i8 as i64)) as u64),
        2 => gd(ctx, node, ((a as i16 as i64) / (b as i16 as i64)) as u64),
        4 => gd(ctx, node, ((a as i32 as i64) / (b as i32 as i64)) as u64),
        8 => gd(ctx, node, ((a as i64) / (b as i64)) as u64),
        16 => {
            let wide = src::<i128>(op, ctx, 0) / src::<i128>(op, ctx, 1);
            ctx.scratch.copy_bytes(node, &wide.to_le_bytes());
        }
        size => fatal!("unhandled Div size: {size}"),
    }
}

fn op_udiv(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    match op.header.size {
        1 => gd(ctx, node, (a as u8 as u64) / (b as u8 as u64)),
        2 => gd(ctx, node, (a as u16 as u64) / (b as u16 as u64)),
        4 => gd(ctx, node, (a as u32 as u64) / (b as u32 as u64)),
        8 => gd(ctx, node, a / b),
        16 => {
            let wide = src::<u128>(op, ctx, 0) / src::<u128>(op, ctx, 1);
            ctx.scratch.copy_bytes(node, &wide.to_le_bytes());
        }
        size => fatal!("unhandled UDiv size: {size}"),
    }
}

fn op_rem(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    match op.header.size {
        1 => gd(ctx, node, ((a as i8 as i64) % (b as i8 as i64)) as u64),
        2 => gd(ctx, node, ((a as i16 as i64) % (b as i16 as i64)) as u64),
        4 => gd(ctx, node, ((a as i32 as i64) % (b as i32 as i64)) as u64),
        8 => gd(ctx, node, ((a as i64) % (b as i64)) as u64),
        16 => {
            let wide = src::<i128>(op, ctx, 0) % src::<i128>(op, ctx, 1);
            ctx.scratch.copy_bytes(node, &wide.to_le_bytes());
        }
        size => fatal!("unhandled Rem size: {size}"),
    }
}

fn op_urem(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    match op.header.size {
        1 => gd(ctx, node, (a as u8 as u64) % (b as u8 as u64)),
        2 => gd(ctx, node, (a as u16 as u64) % (b as u16 as u64)),
        4 => gd(ctx, node, (a as u32 as u64) % (b as u32 as u64)),
        8 => gd(ctx, node, a % b),
        16 => {
            let wide = src::<u128>(op, ctx, 0) % src::<u128>(op, ctx, 1);
            ctx.scratch.copy_bytes(node, &wide.to_le_bytes());
        }
        size => fatal!("unhandled URem size: {size}"),
    }
}

fn op_mulh(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    match op.header.size {
        4 => {
            let wide = (a as i32 as i64) * (b as i32 as i64);
            gd(ctx, node, (wide >> 32) as u64);
        }
        8 => {
            let wide = (a as i64 as i128) * (b as i64 as i128);
            gd(ctx, node, (wide >> 64) as u64);
        }
        size => fatal!("unhandled MulH size: {size}"),
    }
}

fn op_umulh(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    match op.header.size {
        4 => gd(ctx, node, a.wrapping_mul(b) >> 32),
        8 => {
            let wide = (a as u128) * (b as u128);
            gd(ctx, node, (wide >> 64) as u64);
        }
        16 => {
            // TODO: widen to the full 128-bit operands; this is the high
            // half of the 64x64 product, and the lowering currently
            // depends on getting exactly that.
            let wide = (a as u128) * (b as u128);
            gd(ctx, node, (wide >> 64) as u64);
        }
        size => fatal!("unhandled UMulH size: {size}"),
    }
}

fn op_or(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        1 => binop::<u8>(op, ctx, node, |a, b| a | b),
        2 => binop::<u16>(op, ctx, node, |a, b| a | b),
        4 => binop::<u32>(op, ctx, node, |a, b| a | b),
        8 => binop::<u64>(op, ctx, node, |a, b| a | b),
        16 => {
            let wide = src::<u128>(op, ctx, 0) | src::<u128>(op, ctx, 1);
            ctx.scratch.copy_bytes(node, &wide.to_le_bytes());
        }
        size => fatal!("unhandled Or size: {size}"),
    }
}

fn op_and(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        1 => binop::<u8>(op, ctx, node, |a, b| a & b),
        2 => binop::<u16>(op, ctx, node, |a, b| a & b),
        4 => binop::<u32>(op, ctx, node, |a, b| a & b),
        8 => binop::<u64>(op, ctx, node, |a, b| a & b),
        size => fatal!("unhandled And size: {size}"),
    }
}

fn op_andn(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        1 => binop::<u8>(op, ctx, node, |a, b| a & !b),
        2 => binop::<u16>(op, ctx, node, |a, b| a & !b),
        4 => binop::<u32>(op, ctx, node, |a, b| a & !b),
        8 => binop::<u64>(op, ctx, node, |a, b| a & !b),
        size => fatal!("unhandled Andn size: {size}"),
    }
}

fn op_xor(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        1 => binop::<u8>(op, ctx, node, |a, b| a ^ b),
        2 => binop::<u16>(op, ctx, node, |a, b| a ^ b),
        4 => binop::<u32>(op, ctx, node, |a, b| a ^ b),
        8 => binop::<u64>(op, ctx, node, |a, b| a ^ b),
        size => fatal!("unhandled Xor size: {size}"),
    }
}

fn op_lshl(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let amt = src::<u64>(op, ctx, 1);
    match op.header.size {
        4 => gd(ctx, node, ((a as u32) << (amt & 31)) as u64),
        8 => gd(ctx, node, a << (amt & 63)),
        size => fatal!("unhandled Lshl size: {size}"),
    }
}

fn op_lshr(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let amt = src::<u64>(op, ctx, 1);
    match op.header.size {
        4 => gd(ctx, node, ((a as u32) >> (amt & 31)) as u64),
        8 => gd(ctx, node, a >> (amt & 63)),
        size => fatal!("unhandled Lshr size: {size}"),
    }
}

fn op_ashr(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let amt = src::<u64>(op, ctx, 1);
    match op.header.size {
        4 => gd(ctx, node, ((a as i32) >> (amt & 31)) as u32 as u64),
        8 => gd(ctx, node, ((a as i64) >> (amt & 63)) as u64),
        size => fatal!("unhandled Ashr size: {size}"),
    }
}

fn op_ror(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let a = src::<u64>(op, ctx, 0);
    let amt = src::<u64>(op, ctx, 1);
    match op.header.size {
        4 => gd(ctx, node, (a as u32).rotate_right((amt & 31) as u32) as u64),
        8 => gd(ctx, node, a.rotate_right((amt & 63) as u32)),
        size => fatal!("unhandled Ror size: {size}"),
    }
}

fn op_extr(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let OpPayload::Extract { lsb } = op.payload else {
        fatal!("malformed Extr payload");
    };
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    match op.header.size {
        4 => {
            let cat = ((a as u32 as u128) << 32) | (b as u32 as u128);
            gd(ctx, node, (cat >> lsb) as u32 as u64);
        }
        8 => {
            let cat = ((a as u128) << 64) | (b as u128);
            gd(ctx, node, (cat >> lsb) as u64);
        }
        size => fatal!("unhandled Extr size: {size}"),
    }
}

// The long divides take `(low, high, divisor)` sources of the operation
// size each, so an x86-64 128/64 divide lowers to the size-8 form. The
// quotient/remainder is computed at twice the operation size and only the
// low half is stored.

fn op_ldiv(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        2 => {
            let low = src::<u16>(op, ctx, 0);
            let high = src::<u16>(op, ctx, 1);
            let divisor = src::<u16>(op, ctx, 2) as i16;
            let dividend = (((high as u32) << 16) | low as u32) as i32;
            let res = dividend / (divisor as i32);
            gd(ctx, node, res as i16 as i64 as u64);
        }
        4 => {
            let low = src::<u32>(op, ctx, 0);
            let high = src::<u32>(op, ctx, 1);
            let divisor = src::<u32>(op, ctx, 2) as i32;
            let dividend = (((high as u64) << 32) | low as u64) as i64;
            let res = dividend / (divisor as i64);
            gd(ctx, node, res as i32 as i64 as u64);
        }
        8 => {
            let low = src::<u64>(op, ctx, 0);
            let high = src::<u64>(op, ctx, 1);
            let divisor = src::<i64>(op, ctx, 2);
            let dividend = (((high as u128) << 64) | low as u128) as i128;
            let res = dividend / (divisor as i128);
            ctx.scratch.copy_bytes(node, &(res as i64).to_le_bytes());
        }
        size => fatal!("unhandled LDiv size: {size}"),
    }
}

fn op_ludiv(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        2 => {
            let low = src::<u16>(op, ctx, 0);
            let high = src::<u16>(op, ctx, 1);
            let divisor = src::<u16>(op, ctx, 2);
            let dividend = ((high as u32) << 16) | low as u32;
            let res = dividend / (divisor as u32);
            gd(ctx, node, res as u16 as u64);
        }
        4 => {
            let low = src::<u32>(op, ctx, 0);
            let high = src::<u32>(op, ctx, 1);
            let divisor = src::<u32>(op, ctx, 2);
            let dividend = ((high as u64) << 32) | low as u64;
            let res = dividend / (divisor as u64);
            gd(ctx, node, res as u32 as u64);
        }
        8 => {
            let low = src::<u64>(op, ctx, 0);
            let high = src::<u64>(op, ctx, 1);
            let divisor = src::<u64>(op, ctx, 2);
            let dividend = ((high as u128) << 64) | low as u128;
            let res = dividend / (divisor as u128);
            ctx.scratch.copy_bytes(node, &(res as u64).to_le_bytes());
        }
        size => fatal!("unhandled LUDiv size: {size}"),
    }
}

fn op_lrem(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        2 => {
            let low = src::<u16>(op, ctx, 0);
            let high = src::<u16>(op, ctx, 1);
            let divisor = src::<u16>(op, ctx, 2) as i16;
            let dividend = (((high as u32) << 16) | low as u32) as i32;
            let res = dividend % (divisor as i32);
            gd(ctx, node, res as i16 as i64 as u64);
        }
        4 => {
            let low = src::<u32>(op, ctx, 0);
            let high = src::<u32>(op, ctx, 1);
            let divisor = src::<u32>(op, ctx, 2) as i32;
            let dividend = (((high as u64) << 32) | low as u64) as i64;
            let res = dividend % (divisor as i64);
            gd(ctx, node, res as i32 as i64 as u64);
        }
        8 => {
            let low = src::<u64>(op, ctx, 0);
            let high = src::<u64>(op, ctx, 1);
            let divisor = src::<i64>(op, ctx, 2);
            let dividend = (((high as u128) << 64) | low as u128) as i128;
            let res = dividend % (divisor as i128);
            ctx.scratch.copy_bytes(node, &(res as i64).to_le_bytes());
        }
        size => fatal!("unhandled LRem size: {size}"),
    }
}

fn op_lurem(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        2 => {
            let low = src::<u16>(op, ctx, 0);
            let high = src::<u16>(op, ctx, 1);
            let divisor = src::<u16>(op, ctx, 2);
            let dividend = ((high as u32) << 16) | low as u32;
            let res = dividend % (divisor as u32);
            gd(ctx, node, res as u16 as u64);
        }
        4 => {
            let low = src::<u32>(op, ctx, 0);
            let high = src::<u32>(op, ctx, 1);
            let divisor = src::<u32>(op, ctx, 2);
            let dividend = ((high as u64) << 32) | low as u64;
            let res = dividend % (divisor as u64);
            gd(ctx, node, res as u32 as u64);
        }
        8 => {
            let low = src::<u64>(op, ctx, 0);
            let high = src::<u64>(op, ctx, 1);
            let divisor = src::<u64>(op, ctx, 2);
            let dividend = ((high as u128) << 64) | low as u128;
            let res = dividend % (divisor as u128);
            ctx.scratch.copy_bytes(node, &(res as u64).to_le_bytes());
        }
        size => fatal!("unhandled LURem size: {size}"),
    }
}

fn op_not(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    // Masks for the sizes Not is emitted at. The in-between sizes fall
    // through to a zero mask; they are believed unreachable from the
    // lowering, so flag them in debug builds while keeping the zero
    // result in release.
    const MASK: [u64; 9] = [0, 0xFF, 0xFFFF, 0, 0xFFFF_FFFF, 0, 0, 0, u64::MAX];

    let size = usize::from(op.header.size);
    if size >= MASK.len() {
        fatal!("unhandled Not size: {size}");
    }
    debug_assert!(matches!(op.header.size, 1 | 2 | 4 | 8), "Not at size {size}");
    let val = src::<u64>(op, ctx, 0);
    gd(ctx, node, !val & MASK[size]);
}

fn op_popcount(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let val = src::<u64>(op, ctx, 0);
    gd(ctx, node, u64::from(val.count_ones()));
}

fn op_find_lsb(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let val = src::<u64>(op, ctx, 0);
    // "First set bit" convention: one-based position, 0 when no bit is
    // set, minus one. A zero input therefore produces -1.
    let ffs = if val == 0 {
        0
    } else {
        u64::from(val.trailing_zeros()) + 1
    };
    gd(ctx, node, ffs.wrapping_sub(1));
}

fn op_find_msb(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let lz = match op.header.size {
        1 => src::<u8>(op, ctx, 0).leading_zeros(),
        2 => src::<u16>(op, ctx, 0).leading_zeros(),
        4 => src::<u32>(op, ctx, 0).leading_zeros(),
        8 => src::<u64>(op, ctx, 0).leading_zeros(),
        size => fatal!("unhandled FindMSB size: {size}"),
    };
    let bits = u64::from(op.header.size) * 8;
    gd(ctx, node, bits.wrapping_sub(u64::from(lz)).wrapping_sub(1));
}

fn op_find_trailing_zeros(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let tz = match op.header.size {
        1 => src::<u8>(op, ctx, 0).trailing_zeros(),
        2 => src::<u16>(op, ctx, 0).trailing_zeros(),
        4 => src::<u32>(op, ctx, 0).trailing_zeros(),
        8 => src::<u64>(op, ctx, 0).trailing_zeros(),
        size => fatal!("unhandled FindTrailingZeros size: {size}"),
    };
    gd(ctx, node, u64::from(tz));
}

fn op_count_leading_zeroes(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let lz = match op.header.size {
        1 => src::<u8>(op, ctx, 0).leading_zeros(),
        2 => src::<u16>(op, ctx, 0).leading_zeros(),
        4 => src::<u32>(op, ctx, 0).leading_zeros(),
        8 => src::<u64>(op, ctx, 0).leading_zeros(),
        size => fatal!("unhandled CountLeadingZeroes size: {size}"),
    };
    gd(ctx, node, u64::from(lz));
}

fn op_rev(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    match op.header.size {
        2 => gd(ctx, node, src::<u16>(op, ctx, 0).swap_bytes() as u64),
        4 => gd(ctx, node, src::<u32>(op, ctx, 0).swap_bytes() as u64),
        8 => gd(ctx, node, src::<u64>(op, ctx, 0).swap_bytes()),
        size => fatal!("unhandled Rev size: {size}"),
    }
}

fn op_bfi(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let OpPayload::Bitfield { width, lsb } = op.payload else {
        fatal!("malformed Bfi payload");
    };
    let source_mask = low_mask(u32::from(width));
    let dest_mask = !(source_mask << lsb);
    let a = src::<u64>(op, ctx, 0);
    let b = src::<u64>(op, ctx, 1);
    gd(ctx, node, (a & dest_mask) | ((b & source_mask) << lsb));
}

fn op_bfe(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let OpPayload::Bitfield { width, lsb } = op.payload else {
        fatal!("malformed Bfe payload");
    };
    debug_assert!(op.header.size <= 8, "Bfe size {} too large", op.header.size);
    let source_mask = low_mask(u32::from(width)) << lsb;
    let val = src::<u64>(op, ctx, 0);
    gd(ctx, node, (val & source_mask) >> lsb);
}

fn op_sbfe(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let OpPayload::Bitfield { width, lsb } = op.payload else {
        fatal!("malformed Sbfe payload");
    };
    debug_assert!(op.header.size <= 8, "Sbfe size {} too large", op.header.size);
    let val = src::<i64>(op, ctx, 0);
    let shift_left = 64 - (u32::from(width) + u32::from(lsb));
    let shift_right = shift_left + u32::from(lsb);
    gd(ctx, node, ((val << shift_left) >> shift_right) as u64);
}

fn condition_holds(cond: CondCode, u1: u64, u2: u64, s1: i64, s2: i64, f1: f64, f2: f64) -> bool {
    let unordered = f1.is_nan() || f2.is_nan();
    match cond {
        CondCode::Eq => u1 == u2,
        CondCode::Neq => u1 != u2,
        CondCode::Uge => u1 >= u2,
        CondCode::Ult => u1 < u2,
        CondCode::Ugt => u1 > u2,
        CondCode::Ule => u1 <= u2,
        CondCode::Sge => s1 >= s2,
        CondCode::Slt => s1 < s2,
        CondCode::Sgt => s1 > s2,
        CondCode::Sle => s1 <= s2,
        CondCode::Flu => f1 < f2 || unordered,
        CondCode::Fge => f1 >= f2,
        CondCode::Fleu => f1 <= f2 || unordered,
        CondCode::Fgt => f1 > f2,
        CondCode::Fu => unordered,
        CondCode::Fnu => !unordered,
        // The lowering never emits the flag-register conditions here.
        CondCode::Mi | CondCode::Pl | CondCode::Vs | CondCode::Vc => {
            fatal!("unsupported Select condition: {cond:?}")
        }
    }
}

fn op_select(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let OpPayload::Select { cond, compare_size } = op.payload else {
        fatal!("malformed Select payload");
    };
    let cmp1 = src::<u64>(op, ctx, 0);
    let cmp2 = src::<u64>(op, ctx, 1);

    let (if_true, if_false) = if op.header.size == 4 {
        (
            src::<u32>(op, ctx, 2) as u64,
            src::<u32>(op, ctx, 3) as u64,
        )
    } else {
        (src::<u64>(op, ctx, 2), src::<u64>(op, ctx, 3))
    };

    let taken = match compare_size {
        4 => condition_holds(
            cond,
            (cmp1 as u32) as u64,
            (cmp2 as u32) as u64,
            (cmp1 as u32 as i32) as i64,
            (cmp2 as u32 as i32) as i64,
            f64::from(f32::from_bits(cmp1 as u32)),
            f64::from(f32::from_bits(cmp2 as u32)),
        ),
        8 => condition_holds(
            cond,
            cmp1,
            cmp2,
            cmp1 as i64,
            cmp2 as i64,
            f64::from_bits(cmp1),
            f64::from_bits(cmp2),
        ),
        size => fatal!("unhandled Select compare size: {size}"),
    };

    gd(ctx, node, if taken { if_true } else { if_false });
}

fn op_vextract_to_gpr(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let OpPayload::Element { index } = op.payload else {
        fatal!("malformed VExtractToGPR payload");
    };
    debug_assert!(
        op.header.size <= 16,
        "VExtractToGPR size {} too large",
        op.header.size
    );
    let elem_size = op.header.elem_size;
    let source_size = ctx.ir.op_size(op.header.args[0]);
    let shift = u32::from(elem_size) * u32::from(index) * 8;
    let mask = low_mask(u32::from(elem_size) * 8);

    if source_size == 16 {
        let val = (src::<u128>(op, ctx, 0) >> shift) & u128::from(mask);
        let bytes = val.to_le_bytes();
        ctx.scratch.copy_bytes(node, &bytes[..usize::from(elem_size)]);
    } else {
        let val = (src::<u64>(op, ctx, 0) >> shift) & mask;
        gd(ctx, node, val);
    }
}

fn float_to_gpr(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId, round: impl Fn(f64) -> f64) {
    let OpPayload::FloatConv { src_elem_size } = op.payload else {
        fatal!("malformed float conversion payload");
    };
    let val = match src_elem_size {
        4 => f64::from(src::<f32>(op, ctx, 0)),
        8 => src::<f64>(op, ctx, 0),
        size => fatal!("unhandled float conversion source size: {size}"),
    };
    match op.header.size {
        4 => ctx
            .scratch
            .copy_bytes(node, &(round(val) as i32).to_le_bytes()),
        8 => ctx
            .scratch
            .copy_bytes(node, &(round(val) as i64).to_le_bytes()),
        size => fatal!("unhandled float conversion destination size: {size}"),
    }
}

fn op_float_to_gpr_zs(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    float_to_gpr(op, ctx, node, f64::trunc);
}

fn op_float_to_gpr_s(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    float_to_gpr(op, ctx, node, f64::round_ties_even);
}

fn op_fcmp(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let OpPayload::Fcmp { flags } = op.payload else {
        fatal!("malformed FCmp payload");
    };
    let (a, b) = match op.header.elem_size {
        4 => (
            f64::from(src::<f32>(op, ctx, 0)),
            f64::from(src::<f32>(op, ctx, 1)),
        ),
        8 => (src::<f64>(op, ctx, 0), src::<f64>(op, ctx, 1)),
        size => fatal!("unhandled FCmp element size: {size}"),
    };

    let unordered = a.is_nan() || b.is_nan();
    let mut result = FcmpFlags::empty();
    if flags.contains(FcmpFlags::LT) && (unordered || a < b) {
        result |= FcmpFlags::LT;
    }
    if flags.contains(FcmpFlags::UNORDERED) && unordered {
        result |= FcmpFlags::UNORDERED;
    }
    if flags.contains(FcmpFlags::EQ) && (unordered || a == b) {
        result |= FcmpFlags::EQ;
    }
    gd(ctx, node, u64::from(result.bits()));
}

pub(super) fn handler_table() -> [Option<OpHandler>; Opcode::COUNT] {
    let mut table: [Option<OpHandler>; Opcode::COUNT] = [None; Opcode::COUNT];
    table[Opcode::TruncElementPair.index()] = Some(op_trunc_element_pair);
    table[Opcode::Constant.index()] = Some(op_constant);
    table[Opcode::EntrypointOffset.index()] = Some(op_entrypoint_offset);
    table[Opcode::InlineConstant.index()] = Some(op_inline_constant);
    table[Opcode::InlineEntrypointOffset.index()] = Some(op_inline_entrypoint_offset);
    table[Opcode::CycleCounter.index()] = Some(op_cycle_counter);
    table[Opcode::Add.index()] = Some(op_add);
    table[Opcode::Sub.index()] = Some(op_sub);
    table[Opcode::Neg.index()] = Some(op_neg);
    table[Opcode::Mul.index()] = Some(op_mul);
    table[Opcode::Umul.index()] = Some(op_umul);
    table[Opcode::Div.index()] = Some(op_div);
    table[Opcode::Udiv.index()] = Some(op_udiv);
    table[Opcode::Rem.index()] = Some(op_rem);
    table[Opcode::Urem.index()] = Some(op_urem);
    table[Opcode::MulH.index()] = Some(op_mulh);
    table[Opcode::UmulH.index()] = Some(op_umulh);
    table[Opcode::Or.index()] = Some(op_or);
    table[Opcode::And.index()] = Some(op_and);
    table[Opcode::Andn.index()] = Some(op_andn);
    table[Opcode::Xor.index()] = Some(op_xor);
    table[Opcode::Lshl.index()] = Some(op_lshl);
    table[Opcode::Lshr.index()] = Some(op_lshr);
    table[Opcode::Ashr.index()] = Some(op_ashr);
    table[Opcode::Ror.index()] = Some(op_ror);
    table[Opcode::Extr.index()] = Some(op_extr);
    table[Opcode::Ldiv.index()] = Some(op_ldiv);
    table[Opcode::Ludiv.index()] = Some(op_ludiv);
    table[Opcode::Lrem.index()] = Some(op_lrem);
    table[Opcode::Lurem.index()] = Some(op_lurem);
    table[Opcode::Not.index()] = Some(op_not);
    table[Opcode::Popcount.index()] = Some(op_popcount);
    table[Opcode::FindLsb.index()] = Some(op_find_lsb);
    table[Opcode::FindMsb.index()] = Some(op_find_msb);
    table[Opcode::FindTrailingZeros.index()] = Some(op_find_trailing_zeros);
    table[Opcode::CountLeadingZeroes.index()] = Some(op_count_leading_zeroes);
    table[Opcode::Rev.index()] = Some(op_rev);
    table[Opcode::Bfi.index()] = Some(op_bfi);
    table[Opcode::Bfe.index()] = Some(op_bfe);
    table[Opcode::Sbfe.index()] = Some(op_sbfe);
    table[Opcode::Select.index()] = Some(op_select);
    table[Opcode::VExtractToGpr.index()] = Some(op_vextract_to_gpr);
    table[Opcode::FloatToGprZs.index()] = Some(op_float_to_gpr_zs);
    table[Opcode::FloatToGprS.index()] = Some(op_float_to_gpr_s);
    table[Opcode::Fcmp.index()] = Some(op_fcmp);
    table
}
