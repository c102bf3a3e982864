//! IR operation records.
//!
//! Every operation starts with the shared [`OpHeader`] (opcode tag, result
//! size in bytes, element size where meaningful, fixed-width operand
//! array). Opcode-specific fields live in the [`OpPayload`] carried next to
//! the header. The interpreter reads these records and never mutates them.

use opal_types::{CondCode, FcmpFlags, NodeId};
use thiserror::Error;

/// Maximum number of operand slots in an operation header.
pub const MAX_ARGS: usize = 4;

/// Opcode tags for the scalar/ALU subset of the IR.
///
/// Control flow, memory, and vector arithmetic opcodes live in their own
/// dispatch domains; this enum covers exactly the set the ALU interpreter
/// core registers handlers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    TruncElementPair,
    Constant,
    EntrypointOffset,
    InlineConstant,
    InlineEntrypointOffset,
    CycleCounter,
    Add,
    Sub,
    Neg,
    Mul,
    Umul,
    Div,
    Udiv,
    Rem,
    Urem,
    MulH,
    UmulH,
    Or,
    And,
    Andn,
    Xor,
    Lshl,
    Lshr,
    Ashr,
    Ror,
    Extr,
    Ldiv,
    Ludiv,
    Lrem,
    Lurem,
    Not,
    Popcount,
    FindLsb,
    FindMsb,
    FindTrailingZeros,
    CountLeadingZeroes,
    Rev,
    Bfi,
    Bfe,
    Sbfe,
    Select,
    VExtractToGpr,
    FloatToGprZs,
    FloatToGprS,
    Fcmp,
}

impl Opcode {
    /// Number of distinct opcodes; sizes the dispatch table.
    pub const COUNT: usize = Opcode::Fcmp as usize + 1;

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Number of operand slots this opcode reads.
    #[must_use]
    pub const fn arg_count(self) -> usize {
        match self {
            Opcode::Constant
            | Opcode::EntrypointOffset
            | Opcode::InlineConstant
            | Opcode::InlineEntrypointOffset
            | Opcode::CycleCounter => 0,

            Opcode::TruncElementPair
            | Opcode::Neg
            | Opcode::Not
            | Opcode::Popcount
            | Opcode::FindLsb
            | Opcode::FindMsb
            | Opcode::FindTrailingZeros
            | Opcode::CountLeadingZeroes
            | Opcode::Rev
            | Opcode::Bfe
            | Opcode::Sbfe
            | Opcode::VExtractToGpr
            | Opcode::FloatToGprZs
            | Opcode::FloatToGprS => 1,

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Umul
            | Opcode::Div
            | Opcode::Udiv
            | Opcode::Rem
            | Opcode::Urem
            | Opcode::MulH
            | Opcode::UmulH
            | Opcode::Or
            | Opcode::And
            | Opcode::Andn
            | Opcode::Xor
            | Opcode::Lshl
            | Opcode::Lshr
            | Opcode::Ashr
            | Opcode::Ror
            | Opcode::Extr
            | Opcode::Bfi
            | Opcode::Fcmp => 2,

            Opcode::Ldiv | Opcode::Ludiv | Opcode::Lrem | Opcode::Lurem => 3,

            Opcode::Select => 4,
        }
    }

    /// Payload variant this opcode's record carries.
    #[must_use]
    pub const fn payload_kind(self) -> PayloadKind {
        match self {
            Opcode::Constant | Opcode::InlineConstant => PayloadKind::Constant,
            Opcode::EntrypointOffset | Opcode::InlineEntrypointOffset => {
                PayloadKind::EntrypointOffset
            }
            Opcode::Extr => PayloadKind::Extract,
            Opcode::Bfi | Opcode::Bfe | Opcode::Sbfe => PayloadKind::Bitfield,
            Opcode::Select => PayloadKind::Select,
            Opcode::VExtractToGpr => PayloadKind::Element,
            Opcode::FloatToGprZs | Opcode::FloatToGprS => PayloadKind::FloatConv,
            Opcode::Fcmp => PayloadKind::Fcmp,
            _ => PayloadKind::None,
        }
    }
}

/// Discriminant of [`OpPayload`], used by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    None,
    Constant,
    EntrypointOffset,
    Extract,
    Bitfield,
    Select,
    Element,
    FloatConv,
    Fcmp,
}

/// Shared prefix of every operation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpHeader {
    pub op: Opcode,
    /// Result width in bytes (1, 2, 4, 8, or 16).
    pub size: u8,
    /// Sub-unit width within a vector operand, in bytes; 0 when meaningless.
    pub elem_size: u8,
    /// Operand node ids; slots past [`Opcode::arg_count`] are
    /// [`NodeId::INVALID`].
    pub args: [NodeId; MAX_ARGS],
}

impl OpHeader {
    #[must_use]
    pub fn new(op: Opcode, size: u8, args: &[NodeId]) -> Self {
        let mut slots = [NodeId::INVALID; MAX_ARGS];
        slots[..args.len()].copy_from_slice(args);
        OpHeader {
            op,
            size,
            elem_size: 0,
            args: slots,
        }
    }

    #[must_use]
    pub fn with_elem_size(mut self, elem_size: u8) -> Self {
        self.elem_size = elem_size;
        self
    }
}

/// Opcode-specific fields following the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpPayload {
    None,
    Constant { value: u64 },
    EntrypointOffset { offset: u64 },
    Extract { lsb: u8 },
    Bitfield { width: u8, lsb: u8 },
    Select { cond: CondCode, compare_size: u8 },
    Element { index: u8 },
    FloatConv { src_elem_size: u8 },
    Fcmp { flags: FcmpFlags },
}

impl OpPayload {
    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        match self {
            OpPayload::None => PayloadKind::None,
            OpPayload::Constant { .. } => PayloadKind::Constant,
            OpPayload::EntrypointOffset { .. } => PayloadKind::EntrypointOffset,
            OpPayload::Extract { .. } => PayloadKind::Extract,
            OpPayload::Bitfield { .. } => PayloadKind::Bitfield,
            OpPayload::Select { .. } => PayloadKind::Select,
            OpPayload::Element { .. } => PayloadKind::Element,
            OpPayload::FloatConv { .. } => PayloadKind::FloatConv,
            OpPayload::Fcmp { .. } => PayloadKind::Fcmp,
        }
    }
}

/// One SSA operation record: shared header plus opcode-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrOp {
    pub header: OpHeader,
    pub payload: OpPayload,
}

impl IrOp {
    #[must_use]
    pub fn constant(size: u8, value: u64) -> Self {
        IrOp {
            header: OpHeader::new(Opcode::Constant, size, &[]),
            payload: OpPayload::Constant { value },
        }
    }

    #[must_use]
    pub fn entrypoint_offset(size: u8, offset: u64) -> Self {
        IrOp {
            header: OpHeader::new(Opcode::EntrypointOffset, size, &[]),
            payload: OpPayload::EntrypointOffset { offset },
        }
    }

    #[must_use]
    pub fn unary(op: Opcode, size: u8, src: NodeId) -> Self {
        IrOp {
            header: OpHeader::new(op, size, &[src]),
            payload: OpPayload::None,
        }
    }

    #[must_use]
    pub fn binary(op: Opcode, size: u8, lhs: NodeId, rhs: NodeId) -> Self {
        IrOp {
            header: OpHeader::new(op, size, &[lhs, rhs]),
            payload: OpPayload::None,
        }
    }

    /// Three-operand long divide/remainder: `(low, high, divisor)`.
    #[must_use]
    pub fn long_divide(op: Opcode, size: u8, low: NodeId, high: NodeId, divisor: NodeId) -> Self {
        IrOp {
            header: OpHeader::new(op, size, &[low, high, divisor]),
            payload: OpPayload::None,
        }
    }

    #[must_use]
    pub fn extr(size: u8, upper: NodeId, lower: NodeId, lsb: u8) -> Self {
        IrOp {
            header: OpHeader::new(Opcode::Extr, size, &[upper, lower]),
            payload: OpPayload::Extract { lsb },
        }
    }

    #[must_use]
    pub fn bfi(size: u8, dst: NodeId, src: NodeId, width: u8, lsb: u8) -> Self {
        IrOp {
            header: OpHeader::new(Opcode::Bfi, size, &[dst, src]),
            payload: OpPayload::Bitfield { width, lsb },
        }
    }

    #[must_use]
    pub fn bfe(size: u8, src: NodeId, width: u8, lsb: u8) -> Self {
        IrOp {
            header: OpHeader::new(Opcode::Bfe, size, &[src]),
            payload: OpPayload::Bitfield { width, lsb },
        }
    }

    #[must_use]
    pub fn sbfe(size: u8, src: NodeId, width: u8, lsb: u8) -> Self {
        IrOp {
            header: OpHeader::new(Opcode::Sbfe, size, &[src]),
            payload: OpPayload::Bitfield { width, lsb },
        }
    }

    #[must_use]
    pub fn select(
        size: u8,
        cond: CondCode,
        compare_size: u8,
        cmp_lhs: NodeId,
        cmp_rhs: NodeId,
        if_true: NodeId,
        if_false: NodeId,
    ) -> Self {
        IrOp {
            header: OpHeader::new(Opcode::Select, size, &[cmp_lhs, cmp_rhs, if_true, if_false]),
            payload: OpPayload::Select { cond, compare_size },
        }
    }

    #[must_use]
    pub fn vextract_to_gpr(size: u8, elem_size: u8, vector: NodeId, index: u8) -> Self {
        IrOp {
            header: OpHeader::new(Opcode::VExtractToGpr, size, &[vector]).with_elem_size(elem_size),
            payload: OpPayload::Element { index },
        }
    }

    #[must_use]
    pub fn float_to_gpr(op: Opcode, size: u8, src_elem_size: u8, src: NodeId) -> Self {
        IrOp {
            header: OpHeader::new(op, size, &[src]),
            payload: OpPayload::FloatConv { src_elem_size },
        }
    }

    #[must_use]
    pub fn fcmp(elem_size: u8, flags: FcmpFlags, lhs: NodeId, rhs: NodeId) -> Self {
        IrOp {
            header: OpHeader::new(Opcode::Fcmp, 8, &[lhs, rhs]).with_elem_size(elem_size),
            payload: OpPayload::Fcmp { flags },
        }
    }
}

/// Validation failure for a lowered block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrValidateError {
    #[error("node {node}: argument {arg} references node {value}, which is not defined yet")]
    ArgOutOfRange { node: u32, arg: usize, value: u32 },

    #[error("node {node}: argument {arg} of {opcode:?} is unset")]
    MissingArg { node: u32, arg: usize, opcode: Opcode },

    #[error("node {node}: {opcode:?} carries a {found:?} payload")]
    PayloadMismatch {
        node: u32,
        opcode: Opcode,
        found: PayloadKind,
    },
}

/// A lowered basic block: operation records indexed by [`NodeId`].
///
/// Nodes are appended in the order the enclosing execution loop will visit
/// them, so an operand always names an earlier node.
#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    ops: Vec<IrOp>,
}

impl IrProgram {
    #[must_use]
    pub fn new() -> Self {
        IrProgram::default()
    }

    /// Appends a record and returns the id of the node it defines.
    pub fn push(&mut self, op: IrOp) -> NodeId {
        let id = NodeId(u32::try_from(self.ops.len()).expect("IR block too large"));
        self.ops.push(op);
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn op(&self, node: NodeId) -> &IrOp {
        &self.ops[node.index()]
    }

    /// Declared result width of a node, in bytes.
    #[must_use]
    pub fn op_size(&self, node: NodeId) -> u8 {
        self.ops[node.index()].header.size
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &IrOp)> {
        self.ops
            .iter()
            .enumerate()
            .map(|(i, op)| (NodeId(i as u32), op))
    }

    /// Checks def-before-use ordering, operand-slot population, and payload
    /// kinds. Run once per block before handing it to the interpreter.
    pub fn validate(&self) -> Result<(), IrValidateError> {
        for (node, op) in self.iter() {
            let opcode = op.header.op;
            if op.payload.kind() != opcode.payload_kind() {
                return Err(IrValidateError::PayloadMismatch {
                    node: node.0,
                    opcode,
                    found: op.payload.kind(),
                });
            }
            for (arg, &value) in op.header.args.iter().enumerate() {
                if arg < opcode.arg_count() {
                    if !value.is_valid() {
                        return Err(IrValidateError::MissingArg {
                            node: node.0,
                            arg,
                            opcode,
                        });
                    }
                    if value.0 >= node.0 {
                        return Err(IrValidateError::ArgOutOfRange {
                            node: node.0,
                            arg,
                            value: value.0,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_sequential_ids() {
        let mut prog = IrProgram::new();
        let a = prog.push(IrOp::constant(8, 1));
        let b = prog.push(IrOp::constant(8, 2));
        assert_eq!(a, NodeId(0));
        assert_eq!(b, NodeId(1));
        assert_eq!(prog.op_size(a), 8);
    }

    #[test]
    fn validate_accepts_well_formed_block() {
        let mut prog = IrProgram::new();
        let a = prog.push(IrOp::constant(4, 7));
        let b = prog.push(IrOp::constant(4, 9));
        prog.push(IrOp::binary(Opcode::Add, 4, a, b));
        assert_eq!(prog.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_use_before_def() {
        let mut prog = IrProgram::new();
        let a = prog.push(IrOp::constant(4, 7));
        prog.push(IrOp::binary(Opcode::Add, 4, a, NodeId(5)));
        assert_eq!(
            prog.validate(),
            Err(IrValidateError::ArgOutOfRange {
                node: 1,
                arg: 1,
                value: 5
            })
        );
    }

    #[test]
    fn validate_rejects_payload_mismatch() {
        let mut prog = IrProgram::new();
        let a = prog.push(IrOp::constant(4, 7));
        prog.push(IrOp {
            header: OpHeader::new(Opcode::Bfe, 4, &[a]),
            payload: OpPayload::None,
        });
        assert!(matches!(
            prog.validate(),
            Err(IrValidateError::PayloadMismatch { node: 1, .. })
        ));
    }

    #[test]
    fn validate_rejects_missing_arg() {
        let mut prog = IrProgram::new();
        prog.push(IrOp::constant(4, 7));
        prog.push(IrOp {
            header: OpHeader::new(Opcode::Add, 4, &[NodeId(0)]),
            payload: OpPayload::None,
        });
        assert!(matches!(
            prog.validate(),
            Err(IrValidateError::MissingArg { node: 1, arg: 1, .. })
        ));
    }

    #[test]
    fn opcode_count_matches_last_discriminant() {
        assert_eq!(Opcode::COUNT, 45);
        assert_eq!(Opcode::Fcmp.index(), Opcode::COUNT - 1);
    }
}
