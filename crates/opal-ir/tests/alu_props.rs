//! Property tests for the ALU numeric kernels: every result must equal
//! the mathematical operation at the declared width.

use opal_ir::{execute, register_handlers, ExecContext, IrOp, IrProgram, Opcode, SsaScratch};
use proptest::prelude::*;

fn eval_binary(op: Opcode, size: u8, a: u64, b: u64) -> u64 {
    register_handlers();
    let mut prog = IrProgram::new();
    let na = prog.push(IrOp::constant(8, a));
    let nb = prog.push(IrOp::constant(8, b));
    let res = prog.push(IrOp::binary(op, size, na, nb));
    let mut scratch = SsaScratch::new(prog.len());
    let mut ctx = ExecContext {
        scratch: &mut scratch,
        ir: &prog,
        current_entry: 0,
    };
    for (node, record) in prog.iter() {
        execute(record, &mut ctx, node);
    }
    scratch.read::<u64>(res)
}

fn eval_unary(op: Opcode, size: u8, a: u64) -> u64 {
    register_handlers();
    let mut prog = IrProgram::new();
    let na = prog.push(IrOp::constant(8, a));
    let res = prog.push(IrOp::unary(op, size, na));
    let mut scratch = SsaScratch::new(prog.len());
    let mut ctx = ExecContext {
        scratch: &mut scratch,
        ir: &prog,
        current_entry: 0,
    };
    for (node, record) in prog.iter() {
        execute(record, &mut ctx, node);
    }
    scratch.read::<u64>(res)
}

fn eval_bitfield(op: Opcode, src: u64, width: u8, lsb: u8) -> u64 {
    register_handlers();
    let mut prog = IrProgram::new();
    let ns = prog.push(IrOp::constant(8, src));
    let res = prog.push(match op {
        Opcode::Bfe => IrOp::bfe(8, ns, width, lsb),
        Opcode::Sbfe => IrOp::sbfe(8, ns, width, lsb),
        _ => unreachable!("not a unary bitfield op"),
    });
    let mut scratch = SsaScratch::new(prog.len());
    let mut ctx = ExecContext {
        scratch: &mut scratch,
        ir: &prog,
        current_entry: 0,
    };
    for (node, record) in prog.iter() {
        execute(record, &mut ctx, node);
    }
    scratch.read::<u64>(res)
}

fn eval_bfi(dst: u64, src: u64, width: u8, lsb: u8) -> u64 {
    register_handlers();
    let mut prog = IrProgram::new();
    let nd = prog.push(IrOp::constant(8, dst));
    let ns = prog.push(IrOp::constant(8, src));
    let res = prog.push(IrOp::bfi(8, nd, ns, width, lsb));
    let mut scratch = SsaScratch::new(prog.len());
    let mut ctx = ExecContext {
        scratch: &mut scratch,
        ir: &prog,
        current_entry: 0,
    };
    for (node, record) in prog.iter() {
        execute(record, &mut ctx, node);
    }
    scratch.read::<u64>(res)
}

fn field_mask(width: u8) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

proptest! {
    #[test]
    fn add_is_modular(a in any::<u64>(), b in any::<u64>()) {
        prop_assert_eq!(
            eval_binary(Opcode::Add, 4, a, b),
            u64::from((a as u32).wrapping_add(b as u32))
        );
        prop_assert_eq!(eval_binary(Opcode::Add, 8, a, b), a.wrapping_add(b));
    }

    #[test]
    fn sub_is_modular(a in any::<u64>(), b in any::<u64>()) {
        prop_assert_eq!(
            eval_binary(Opcode::Sub, 4, a, b),
            u64::from((a as u32).wrapping_sub(b as u32))
        );
        prop_assert_eq!(eval_binary(Opcode::Sub, 8, a, b), a.wrapping_sub(b));
    }

    #[test]
    fn umul_is_modular(a in any::<u64>(), b in any::<u64>()) {
        prop_assert_eq!(
            eval_binary(Opcode::Umul, 4, a, b),
            u64::from((a as u32).wrapping_mul(b as u32))
        );
        prop_assert_eq!(eval_binary(Opcode::Umul, 8, a, b), a.wrapping_mul(b));
    }

    #[test]
    fn not_complements_at_the_declared_width(a in any::<u64>()) {
        prop_assert_eq!(eval_unary(Opcode::Not, 1, a), !a & 0xFF);
        prop_assert_eq!(eval_unary(Opcode::Not, 2, a), !a & 0xFFFF);
        prop_assert_eq!(eval_unary(Opcode::Not, 4, a), !a & 0xFFFF_FFFF);
        prop_assert_eq!(eval_unary(Opcode::Not, 8, a), !a);
    }

    #[test]
    fn andn_is_and_with_complement(a in any::<u64>(), b in any::<u64>()) {
        prop_assert_eq!(eval_binary(Opcode::Andn, 8, a, b), a & !b);
        prop_assert_eq!(
            eval_binary(Opcode::Andn, 4, a, b),
            u64::from((a as u32) & !(b as u32))
        );
    }

    #[test]
    fn shifts_reduce_the_amount_mod_width(a in any::<u64>(), s in any::<u64>()) {
        prop_assert_eq!(
            eval_binary(Opcode::Lshl, 4, a, s),
            u64::from((a as u32) << (s % 32))
        );
        prop_assert_eq!(eval_binary(Opcode::Lshl, 8, a, s), a << (s % 64));
        prop_assert_eq!(
            eval_binary(Opcode::Lshr, 4, a, s),
            u64::from((a as u32) >> (s % 32))
        );
        prop_assert_eq!(eval_binary(Opcode::Lshr, 8, a, s), a >> (s % 64));
    }

    #[test]
    fn ashr_shifts_in_the_sign(a in any::<u64>(), s in any::<u64>()) {
        prop_assert_eq!(
            eval_binary(Opcode::Ashr, 4, a, s),
            u64::from(((a as i32) >> (s % 32)) as u32)
        );
        prop_assert_eq!(
            eval_binary(Opcode::Ashr, 8, a, s),
            ((a as i64) >> (s % 64)) as u64
        );
    }

    #[test]
    fn ror_matches_the_rotate_identity(a in any::<u64>(), r in any::<u64>()) {
        let r32 = (r % 32) as u32;
        let expect32 = if r32 == 0 {
            a as u32
        } else {
            ((a as u32) >> r32) | ((a as u32) << (32 - r32))
        };
        prop_assert_eq!(eval_binary(Opcode::Ror, 4, a, r), u64::from(expect32));

        let r64 = (r % 64) as u32;
        let expect64 = if r64 == 0 { a } else { (a >> r64) | (a << (64 - r64)) };
        prop_assert_eq!(eval_binary(Opcode::Ror, 8, a, r), expect64);
    }

    #[test]
    fn bfe_then_bfi_round_trips(x in any::<u64>(), lsb in 0u8..64, width in 1u8..=64) {
        prop_assume!(u32::from(lsb) + u32::from(width) <= 64);
        let field = eval_bitfield(Opcode::Bfe, x, width, lsb);
        prop_assert_eq!(eval_bfi(x, field, width, lsb), x);
    }

    #[test]
    fn bfi_preserves_bits_outside_the_field(
        dst in any::<u64>(),
        src in any::<u64>(),
        lsb in 0u8..64,
        width in 1u8..=64,
    ) {
        prop_assume!(u32::from(lsb) + u32::from(width) <= 64);
        let inserted = eval_bfi(dst, src, width, lsb);
        let mask = field_mask(width) << lsb;
        prop_assert_eq!(inserted & !mask, dst & !mask);
        prop_assert_eq!((inserted & mask) >> lsb, src & field_mask(width));
    }

    #[test]
    fn sbfe_sign_extends_an_inserted_field(
        v in any::<u64>(),
        lsb in 0u8..64,
        width in 1u8..=64,
    ) {
        prop_assume!(u32::from(lsb) + u32::from(width) <= 64);
        let placed = eval_bfi(0, v, width, lsb);
        let got = eval_bitfield(Opcode::Sbfe, placed, width, lsb);
        let field = v & field_mask(width);
        let sign = 1u64 << (width - 1);
        let expect = if field & sign != 0 {
            field | !field_mask(width)
        } else {
            field
        };
        prop_assert_eq!(got, expect);
    }

    #[test]
    fn rev_is_an_involution(x in any::<u64>()) {
        for size in [2u8, 4, 8] {
            let once = eval_unary(Opcode::Rev, size, x);
            let twice = eval_unary(Opcode::Rev, size, once);
            let mask = if size == 8 { u64::MAX } else { (1u64 << (size * 8)) - 1 };
            prop_assert_eq!(twice, x & mask);
        }
    }

    #[test]
    fn popcount_matches_the_host(x in any::<u64>()) {
        prop_assert_eq!(eval_unary(Opcode::Popcount, 8, x), u64::from(x.count_ones()));
    }

    #[test]
    fn extr_is_a_window_into_the_concatenation(
        a in any::<u64>(),
        b in any::<u64>(),
        lsb in 0u8..64,
    ) {
        register_handlers();
        let mut prog = IrProgram::new();
        let na = prog.push(IrOp::constant(8, a));
        let nb = prog.push(IrOp::constant(8, b));
        let res = prog.push(IrOp::extr(8, na, nb, lsb));
        let mut scratch = SsaScratch::new(prog.len());
        let mut ctx = ExecContext {
            scratch: &mut scratch,
            ir: &prog,
            current_entry: 0,
        };
        for (node, record) in prog.iter() {
            execute(record, &mut ctx, node);
        }
        let cat = (u128::from(a) << 64) | u128::from(b);
        prop_assert_eq!(scratch.read::<u64>(res), (cat >> lsb) as u64);
    }
}
