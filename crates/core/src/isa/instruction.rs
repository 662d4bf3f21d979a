//! The common instruction record shared by every ISA.
//!
//! Per Design Note "Cross-ISA polymorphism" this is the payload side of the
//! tagged-enum-of-ISAs: an [`Instruction`] holds fields common to any ISA
//! (raw bytes, PC, operand values, trap) plus a [`DecodedFields`] variant
//! carrying the fields specific to the instruction's format.

use crate::common::{Addr, Trap};
use crate::isa::mips::MipsFields;
use crate::isa::riscv::RiscVFields;

/// Width and signedness of a load/store, and its direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemAccess {
    /// Access width in bytes (1, 2, 4, 8, or 16).
    pub width: u8,
    /// Whether a load sign-extends its result. Irrelevant for stores.
    pub signed: bool,
    /// True for a store, false for a load.
    pub is_store: bool,
}

/// Per-ISA decoded fields, dispatched on by the owning [`crate::isa::Isa`].
#[derive(Clone, Copy, Debug)]
pub enum DecodedFields {
    /// MIPS R/I/J-format fields.
    Mips(MipsFields),
    /// RISC-V R/I/S/B/U/J-format fields.
    RiscV(RiscVFields),
}

/// An instruction in flight: immutable raw bytes and decoded fields, plus
/// operand and result slots filled in as it moves through the driver.
#[derive(Clone, Copy, Debug)]
pub struct Instruction {
    /// The raw instruction word as fetched.
    pub raw: u32,
    /// The address this instruction was fetched from.
    pub pc: Addr,
    /// Per-ISA decoded fields.
    pub fields: DecodedFields,
    /// Source operand values, filled in after register read.
    pub src_values: [u128; 2],
    /// Destination operand value, filled in after execute.
    pub dst_value: u128,
    /// Effective memory address, filled in after execute if this is a
    /// memory operation.
    pub mem_addr: Addr,
    /// Memory access descriptor, `None` for non-memory instructions.
    pub mem_access: Option<MemAccess>,
    /// Next PC as computed by execute.
    pub computed_next_pc: Addr,
    /// Next PC as predicted at fetch time (performance driver only).
    pub predicted_next_pc: Addr,
    /// Whether this instruction's branch, if any, was actually taken.
    pub is_taken: bool,
    /// Trap raised by decode or execute, `Trap::NoTrap` on success.
    pub trap: Trap,
    /// True for MIPS branch-likely instructions, whose delay slot is
    /// annulled when the branch is not taken.
    pub is_likely_branch: bool,
}

impl Instruction {
    /// General-purpose register indices read as sources, in order.
    /// `None` where a source is an immediate rather than a register.
    #[must_use]
    pub fn src_regs(&self) -> [Option<usize>; 2] {
        match self.fields {
            DecodedFields::Mips(f) => f.op.src_regs(f),
            DecodedFields::RiscV(f) => f.op.src_regs(f),
        }
    }

    /// The destination register index, if this instruction writes one.
    #[must_use]
    pub fn dst_reg(&self) -> Option<usize> {
        match self.fields {
            DecodedFields::Mips(f) => f.op.dst_reg(f),
            DecodedFields::RiscV(f) => f.op.dst_reg(f),
        }
    }

    /// True if this instruction is any kind of branch or jump.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        match self.fields {
            DecodedFields::Mips(f) => f.op.is_branch(),
            DecodedFields::RiscV(f) => f.op.is_branch(),
        }
    }
}
