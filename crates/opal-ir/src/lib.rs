#![forbid(unsafe_code)]

//! SSA IR operation records and the ALU interpreter core for Opal's
//! dynamic binary translator.
//!
//! A guest basic block is lowered into the SSA form described by
//! [`ops::IrProgram`]. Cold blocks are executed one node at a time by the
//! interpreter in [`interp`]: the enclosing execution loop walks the block
//! in order and calls [`interp::execute`] for each node, which dispatches
//! to the handler registered for the node's opcode and writes the result
//! into the node's slot in the [`ssa::SsaScratch`] buffer.
//!
//! [`bucket::BucketList`] is the small-set container the IR analyses use
//! for per-node reference tracking; it lives here because it is shaped
//! around the same `NodeId` space.

pub mod bucket;
pub mod interp;
pub mod ops;
pub mod ssa;

pub use bucket::BucketList;
pub use opal_types::{CondCode, FcmpFlags, NodeId};
pub use interp::{execute, register_handlers, ExecContext};
pub use ops::{IrOp, IrProgram, IrValidateError, OpHeader, OpPayload, Opcode};
pub use ssa::{ScratchValue, SsaScratch};
