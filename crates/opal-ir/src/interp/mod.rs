//! Opcode→handler dispatch for the ALU subset of the IR.
//!
//! The dispatch table is a dense array of function pointers indexed by
//! opcode, populated exactly once by [`register_handlers`] and read-only
//! afterwards, so it can be shared freely across executor threads. Each
//! thread brings its own [`ExecContext`]; handlers never retain the
//! references they are given.

mod alu;

use opal_types::NodeId;
use std::sync::OnceLock;

use crate::ops::{IrOp, IrProgram, Opcode};
use crate::ssa::SsaScratch;

/// Logs through the host logger, then aborts. Malformed IR reaching the
/// interpreter has no recovery path.
macro_rules! fatal {
    ($($arg:tt)*) => {{
        tracing::error!($($arg)*);
        panic!($($arg)*);
    }};
}
pub(crate) use fatal;

/// Per-execution state lent to handlers by the enclosing execution loop.
pub struct ExecContext<'a> {
    /// Runtime values of the block's SSA nodes.
    pub scratch: &'a mut SsaScratch,
    /// The block being executed, for operand width lookups.
    pub ir: &'a IrProgram,
    /// Guest address of the block's first instruction; base for
    /// `EntrypointOffset`.
    pub current_entry: u64,
}

/// A registered operation handler.
///
/// Handlers read operand slots from the context, compute the node's
/// result, and write it to the destination slot. They do not return a
/// value; failure is fatal.
pub type OpHandler = fn(&IrOp, &mut ExecContext<'_>, NodeId);

static HANDLERS: OnceLock<[Option<OpHandler>; Opcode::COUNT]> = OnceLock::new();

/// Populates the dispatch table. Called once at process start; later calls
/// are no-ops.
pub fn register_handlers() {
    HANDLERS.get_or_init(alu::handler_table);
}

/// Dispatches `op` to its registered handler.
///
/// The handler computes the operation's result and writes it into the
/// destination slot at `node`. Aborts if [`register_handlers`] has not run
/// or the opcode has no handler registered here.
#[inline]
pub fn execute(op: &IrOp, ctx: &mut ExecContext<'_>, node: NodeId) {
    let Some(table) = HANDLERS.get() else {
        fatal!("execute called before register_handlers");
    };
    match table[op.header.op.index()] {
        Some(handler) => handler(op, ctx, node),
        None => fatal!("no ALU handler for {:?}", op.header.op),
    }
}
