//! MIPS R/I/J-format decode and execute.
//!
//! Bit layouts and the funct/opcode split follow the classic MIPS32
//! encoding. The opcode table is deliberately a representative subset, not
//! an exhaustive ISA implementation: the decoder *shape* (fixed-field
//! extraction feeding a tag + operand-role table) is the contract, not the
//! table's contents.

use crate::common::{arith_shift_right, bitmask, sign_extend, zero_extend, Addr, Trap};
use crate::isa::instruction::{DecodedFields, Instruction, MemAccess};
use crate::regfile::RegisterFile;

/// A decoded MIPS semantic tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MipsOp {
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
    Sll,
    Srl,
    Sra,
    Sllv,
    Srlv,
    Srav,
    Div,
    Divu,
    Addi,
    Addiu,
    Andi,
    Ori,
    Xori,
    Slti,
    Sltiu,
    Lui,
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Sb,
    Sh,
    Sw,
    Beq,
    Bne,
    Blez,
    Bgtz,
    Beql,
    Bnel,
    J,
    Jal,
    Jr,
    Jalr,
    Syscall,
    Break,
    #[default]
    Unknown,
}

impl MipsOp {
    /// Source register indices, in `(rs, rt)` order where the operand role
    /// is a register rather than an immediate.
    #[must_use]
    pub fn src_regs(self, f: MipsFields) -> [Option<usize>; 2] {
        use MipsOp::{
            Add, Addu, And, Beq, Beql, Bgtz, Blez, Bne, Bnel, Div, Divu, Jalr, Jr, Nor, Or, Sb,
            Sh, Slt, Sltu, Sub, Subu, Sw, Xor,
        };
        match self {
            Add | Addu | Sub | Subu | And | Or | Xor | Nor | Slt | Sltu | Div | Divu => {
                [Some(f.rs as usize), Some(f.rt as usize)]
            }
            // Shift amount comes from rs, the value shifted from rt.
            MipsOp::Sllv | MipsOp::Srlv | MipsOp::Srav => {
                [Some(f.rt as usize), Some(f.rs as usize)]
            }
            Beq | Bne | Beql | Bnel => [Some(f.rs as usize), Some(f.rt as usize)],
            Blez | Bgtz | Jr | Jalr => [Some(f.rs as usize), None],
            Sb | Sh | Sw => [Some(f.rs as usize), Some(f.rt as usize)],
            MipsOp::Addi | MipsOp::Addiu | MipsOp::Andi | MipsOp::Ori | MipsOp::Xori
            | MipsOp::Slti | MipsOp::Sltiu | MipsOp::Lb | MipsOp::Lbu | MipsOp::Lh
            | MipsOp::Lhu | MipsOp::Lw => [Some(f.rs as usize), None],
            MipsOp::Sll | MipsOp::Srl | MipsOp::Sra => [Some(f.rt as usize), None],
            _ => [None, None],
        }
    }

    /// The destination register, if any.
    #[must_use]
    pub fn dst_reg(self, f: MipsFields) -> Option<usize> {
        use MipsOp::{
            Add, Addu, And, Jal, Jalr, Nor, Or, Sll, Sllv, Slt, Sltu, Sra, Srav, Srl, Srlv, Sub,
            Subu, Xor,
        };
        match self {
            Add | Addu | Sub | Subu | And | Or | Xor | Nor | Slt | Sltu | Sll | Srl | Sra
            | Sllv | Srlv | Srav | MipsOp::Div | MipsOp::Divu => Some(f.rd as usize),
            MipsOp::Addi | MipsOp::Addiu | MipsOp::Andi | MipsOp::Ori | MipsOp::Xori
            | MipsOp::Slti | MipsOp::Sltiu | MipsOp::Lui | MipsOp::Lb | MipsOp::Lbu
            | MipsOp::Lh | MipsOp::Lhu | MipsOp::Lw => Some(f.rt as usize),
            Jal => Some(31),
            Jalr => Some(f.rd as usize),
            _ => None,
        }
    }

    /// True if this tag is any kind of branch or jump.
    #[must_use]
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            MipsOp::Beq
                | MipsOp::Bne
                | MipsOp::Blez
                | MipsOp::Bgtz
                | MipsOp::Beql
                | MipsOp::Bnel
                | MipsOp::J
                | MipsOp::Jal
                | MipsOp::Jr
                | MipsOp::Jalr
        )
    }
}

/// Decoded fields of a MIPS R/I/J-format instruction.
#[derive(Clone, Copy, Debug, Default)]
pub struct MipsFields {
    pub opcode: u8,
    pub rs: u8,
    pub rt: u8,
    pub rd: u8,
    pub shamt: u8,
    pub funct: u8,
    /// Raw 16-bit immediate (I-type); sign/zero extend as the op requires.
    pub imm16: u32,
    /// Raw 26-bit target (J-type).
    pub imm26: u32,
    pub op: MipsOp,
}

fn funct_table(funct: u8) -> MipsOp {
    match funct {
        0x00 => MipsOp::Sll,
        0x02 => MipsOp::Srl,
        0x03 => MipsOp::Sra,
        0x04 => MipsOp::Sllv,
        0x06 => MipsOp::Srlv,
        0x07 => MipsOp::Srav,
        0x08 => MipsOp::Jr,
        0x09 => MipsOp::Jalr,
        0x0C => MipsOp::Syscall,
        0x0D => MipsOp::Break,
        0x1A => MipsOp::Div,
        0x1B => MipsOp::Divu,
        0x20 => MipsOp::Add,
        0x21 => MipsOp::Addu,
        0x22 => MipsOp::Sub,
        0x23 => MipsOp::Subu,
        0x24 => MipsOp::And,
        0x25 => MipsOp::Or,
        0x26 => MipsOp::Xor,
        0x27 => MipsOp::Nor,
        0x2A => MipsOp::Slt,
        0x2B => MipsOp::Sltu,
        _ => MipsOp::Unknown,
    }
}

fn opcode_table(opcode: u8) -> MipsOp {
    match opcode {
        0x02 => MipsOp::J,
        0x03 => MipsOp::Jal,
        0x04 => MipsOp::Beq,
        0x05 => MipsOp::Bne,
        0x06 => MipsOp::Blez,
        0x07 => MipsOp::Bgtz,
        0x08 => MipsOp::Addi,
        0x09 => MipsOp::Addiu,
        0x0A => MipsOp::Slti,
        0x0B => MipsOp::Sltiu,
        0x0C => MipsOp::Andi,
        0x0D => MipsOp::Ori,
        0x0E => MipsOp::Xori,
        0x0F => MipsOp::Lui,
        0x14 => MipsOp::Beql,
        0x15 => MipsOp::Bnel,
        0x20 => MipsOp::Lb,
        0x21 => MipsOp::Lh,
        0x23 => MipsOp::Lw,
        0x24 => MipsOp::Lbu,
        0x25 => MipsOp::Lhu,
        0x28 => MipsOp::Sb,
        0x29 => MipsOp::Sh,
        0x2B => MipsOp::Sw,
        _ => MipsOp::Unknown,
    }
}

/// Decodes a 32-bit MIPS instruction word fetched from `pc`.
#[must_use]
pub fn decode(raw: u32, pc: Addr) -> Instruction {
    let opcode = ((raw >> 26) & 0x3F) as u8;
    let rs = ((raw >> 21) & 0x1F) as u8;
    let rt = ((raw >> 16) & 0x1F) as u8;
    let rd = ((raw >> 11) & 0x1F) as u8;
    let shamt = ((raw >> 6) & 0x1F) as u8;
    let funct = (raw & 0x3F) as u8;
    let imm16 = raw & 0xFFFF;
    let imm26 = raw & 0x03FF_FFFF;

    let op = if opcode == 0 {
        funct_table(funct)
    } else {
        opcode_table(opcode)
    };

    let fields = MipsFields {
        opcode,
        rs,
        rt,
        rd,
        shamt,
        funct,
        imm16,
        imm26,
        op,
    };

    let trap = if op == MipsOp::Unknown {
        Trap::UnknownInstruction
    } else {
        Trap::NoTrap
    };

    Instruction {
        raw,
        pc,
        fields: DecodedFields::Mips(fields),
        src_values: [0; 2],
        dst_value: 0,
        mem_addr: Addr::new(0),
        mem_access: None,
        computed_next_pc: pc.wrapping_add(4),
        predicted_next_pc: pc.wrapping_add(4),
        is_taken: false,
        trap,
        is_likely_branch: matches!(op, MipsOp::Beql | MipsOp::Bnel),
    }
}

fn mem_access_for(op: MipsOp) -> Option<MemAccess> {
    match op {
        MipsOp::Lb => Some(MemAccess { width: 1, signed: true, is_store: false }),
        MipsOp::Lbu => Some(MemAccess { width: 1, signed: false, is_store: false }),
        MipsOp::Lh => Some(MemAccess { width: 2, signed: true, is_store: false }),
        MipsOp::Lhu => Some(MemAccess { width: 2, signed: false, is_store: false }),
        MipsOp::Lw => Some(MemAccess { width: 4, signed: true, is_store: false }),
        MipsOp::Sb => Some(MemAccess { width: 1, signed: false, is_store: true }),
        MipsOp::Sh => Some(MemAccess { width: 2, signed: false, is_store: true }),
        MipsOp::Sw => Some(MemAccess { width: 4, signed: false, is_store: true }),
        _ => None,
    }
}

fn as_signed(word_bits: u32, value: u128) -> i128 {
    sign_extend(value, word_bits) as i128
}

fn checked_add(word_bits: u32, a: u128, b: u128) -> (u128, bool) {
    let sum = as_signed(word_bits, a) + as_signed(word_bits, b);
    let min = -(1i128 << (word_bits - 1));
    let max = (1i128 << (word_bits - 1)) - 1;
    ((sum as u128) & bitmask(word_bits), sum < min || sum > max)
}

fn checked_sub(word_bits: u32, a: u128, b: u128) -> (u128, bool) {
    let diff = as_signed(word_bits, a) - as_signed(word_bits, b);
    let min = -(1i128 << (word_bits - 1));
    let max = (1i128 << (word_bits - 1)) - 1;
    ((diff as u128) & bitmask(word_bits), diff < min || diff > max)
}

/// Executes a decoded MIPS instruction whose source operands are already
/// filled in from the register file.
pub fn execute(instr: &mut Instruction, regs: &RegisterFile, word_bits: u32) {
    let DecodedFields::Mips(f) = instr.fields else {
        return;
    };
    let s0 = instr.src_values[0];
    let s1 = instr.src_values[1];
    let pc = instr.pc;

    instr.computed_next_pc = pc.wrapping_add(4);
    instr.mem_access = mem_access_for(f.op);

    match f.op {
        MipsOp::Add => {
            let (v, ovf) = checked_add(word_bits, s0, s1);
            instr.dst_value = v;
            if ovf {
                instr.trap = Trap::IntegerOverflow;
            }
        }
        MipsOp::Addu => instr.dst_value = s0.wrapping_add(s1) & bitmask(word_bits),
        MipsOp::Sub => {
            let (v, ovf) = checked_sub(word_bits, s0, s1);
            instr.dst_value = v;
            if ovf {
                instr.trap = Trap::IntegerOverflow;
            }
        }
        MipsOp::Subu => instr.dst_value = s0.wrapping_sub(s1) & bitmask(word_bits),
        MipsOp::And => instr.dst_value = s0 & s1,
        MipsOp::Or => instr.dst_value = s0 | s1,
        MipsOp::Xor => instr.dst_value = s0 ^ s1,
        MipsOp::Nor => instr.dst_value = !(s0 | s1) & bitmask(word_bits),
        MipsOp::Slt => instr.dst_value = u128::from(as_signed(word_bits, s0) < as_signed(word_bits, s1)),
        MipsOp::Sltu => instr.dst_value = u128::from(s0 < s1),
        // Shift-by-zero naturally reproduces the unchanged value; no special
        // NOP dispatch is needed.
        MipsOp::Sll => instr.dst_value = (s0 << f.shamt) & bitmask(word_bits),
        MipsOp::Srl => instr.dst_value = s0 >> f.shamt,
        MipsOp::Sra => instr.dst_value = arith_shift_right(s0, u32::from(f.shamt), word_bits),
        MipsOp::Sllv => instr.dst_value = (s0 << (s1 & 0x1F)) & bitmask(word_bits),
        MipsOp::Srlv => instr.dst_value = s0 >> (s1 & 0x1F),
        MipsOp::Srav => instr.dst_value = arith_shift_right(s0, (s1 & 0x1F) as u32, word_bits),
        MipsOp::Div => {
            if s1 == 0 {
                instr.trap = Trap::DivisionByZero;
            } else {
                instr.dst_value =
                    (as_signed(word_bits, s0) / as_signed(word_bits, s1)) as u128 & bitmask(word_bits);
            }
        }
        MipsOp::Divu => {
            if s1 == 0 {
                instr.trap = Trap::DivisionByZero;
            } else {
                instr.dst_value = s0 / s1;
            }
        }
        MipsOp::Addi => {
            let imm = sign_extend(u128::from(f.imm16), 16);
            let (v, ovf) = checked_add(word_bits, s0, imm);
            instr.dst_value = v;
            if ovf {
                instr.trap = Trap::IntegerOverflow;
            }
        }
        MipsOp::Addiu => {
            let imm = sign_extend(u128::from(f.imm16), 16);
            instr.dst_value = s0.wrapping_add(imm) & bitmask(word_bits);
        }
        MipsOp::Andi => instr.dst_value = s0 & zero_extend(u128::from(f.imm16), 16),
        MipsOp::Ori => instr.dst_value = s0 | zero_extend(u128::from(f.imm16), 16),
        MipsOp::Xori => instr.dst_value = s0 ^ zero_extend(u128::from(f.imm16), 16),
        MipsOp::Slti => {
            let imm = as_signed(16, u128::from(f.imm16));
            instr.dst_value = u128::from(as_signed(word_bits, s0) < imm);
        }
        MipsOp::Sltiu => {
            let imm = sign_extend(u128::from(f.imm16), 16) & bitmask(word_bits);
            instr.dst_value = u128::from(s0 < imm);
        }
        MipsOp::Lui => instr.dst_value = (u128::from(f.imm16) << 16) & bitmask(word_bits),
        MipsOp::Lb | MipsOp::Lbu | MipsOp::Lh | MipsOp::Lhu | MipsOp::Lw => {
            let imm = sign_extend(u128::from(f.imm16), 16);
            instr.mem_addr = Addr::new(s0.wrapping_add(imm) & bitmask(word_bits));
        }
        MipsOp::Sb | MipsOp::Sh | MipsOp::Sw => {
            let imm = sign_extend(u128::from(f.imm16), 16);
            instr.mem_addr = Addr::new(s0.wrapping_add(imm) & bitmask(word_bits));
            instr.dst_value = s1;
        }
        MipsOp::Beq | MipsOp::Beql => {
            instr.is_taken = s0 == s1;
            let offset = sign_extend(u128::from(f.imm16), 16) << 2;
            instr.computed_next_pc = if instr.is_taken {
                Addr::new(pc.wrapping_add(4).val().wrapping_add(offset) & bitmask(word_bits))
            } else if f.op == MipsOp::Beql {
                // Not-taken branch-likely annuls its delay slot.
                pc.wrapping_add(8)
            } else {
                pc.wrapping_add(4)
            };
        }
        MipsOp::Bne | MipsOp::Bnel => {
            instr.is_taken = s0 != s1;
            let offset = sign_extend(u128::from(f.imm16), 16) << 2;
            instr.computed_next_pc = if instr.is_taken {
                Addr::new(pc.wrapping_add(4).val().wrapping_add(offset) & bitmask(word_bits))
            } else if f.op == MipsOp::Bnel {
                pc.wrapping_add(8)
            } else {
                pc.wrapping_add(4)
            };
        }
        MipsOp::Blez => {
            instr.is_taken = as_signed(word_bits, s0) <= 0;
            let offset = sign_extend(u128::from(f.imm16), 16) << 2;
            instr.computed_next_pc = if instr.is_taken {
                Addr::new(pc.wrapping_add(4).val().wrapping_add(offset) & bitmask(word_bits))
            } else {
                pc.wrapping_add(4)
            };
        }
        MipsOp::Bgtz => {
            instr.is_taken = as_signed(word_bits, s0) > 0;
            let offset = sign_extend(u128::from(f.imm16), 16) << 2;
            instr.computed_next_pc = if instr.is_taken {
                Addr::new(pc.wrapping_add(4).val().wrapping_add(offset) & bitmask(word_bits))
            } else {
                pc.wrapping_add(4)
            };
        }
        MipsOp::J => {
            instr.is_taken = true;
            let target = (pc.wrapping_add(4).val() & !bitmask(28)) | (u128::from(f.imm26) << 2);
            instr.computed_next_pc = Addr::new(target & bitmask(word_bits));
        }
        MipsOp::Jal => {
            instr.is_taken = true;
            instr.dst_value = pc.wrapping_add(8).val() & bitmask(word_bits);
            let target = (pc.wrapping_add(4).val() & !bitmask(28)) | (u128::from(f.imm26) << 2);
            instr.computed_next_pc = Addr::new(target & bitmask(word_bits));
        }
        MipsOp::Jr => {
            instr.is_taken = true;
            instr.computed_next_pc = Addr::new(s0 & bitmask(word_bits));
        }
        MipsOp::Jalr => {
            instr.is_taken = true;
            instr.dst_value = pc.wrapping_add(8).val() & bitmask(word_bits);
            instr.computed_next_pc = Addr::new(s0 & bitmask(word_bits));
        }
        // $v0 == 10 is the conventional MARS/SPIM "exit" syscall number.
        MipsOp::Syscall => {
            instr.trap = if regs.read(2) == 10 {
                Trap::Halt
            } else {
                Trap::Syscall
            };
        }
        MipsOp::Break => instr.trap = Trap::Breakpoint,
        MipsOp::Unknown => instr.trap = Trap::UnknownInstruction,
    }
}

/// Renders a disassembly string for a decoded MIPS instruction.
#[must_use]
pub fn disasm(instr: &Instruction) -> String {
    let DecodedFields::Mips(f) = instr.fields else {
        return String::from("???");
    };
    match f.op {
        MipsOp::Add => format!("add ${}, ${}, ${}", f.rd, f.rs, f.rt),
        MipsOp::Addu => format!("addu ${}, ${}, ${}", f.rd, f.rs, f.rt),
        MipsOp::Sub => format!("sub ${}, ${}, ${}", f.rd, f.rs, f.rt),
        MipsOp::Subu => format!("subu ${}, ${}, ${}", f.rd, f.rs, f.rt),
        MipsOp::Addi => format!("addi ${}, ${}, {}", f.rt, f.rs, f.imm16 as i16),
        MipsOp::Addiu => format!("addiu ${}, ${}, {}", f.rt, f.rs, f.imm16 as i16),
        MipsOp::Lw => format!("lw ${}, {}(${})", f.rt, f.imm16 as i16, f.rs),
        MipsOp::Sw => format!("sw ${}, {}(${})", f.rt, f.imm16 as i16, f.rs),
        MipsOp::Beq => format!("beq ${}, ${}, {}", f.rs, f.rt, f.imm16 as i16),
        MipsOp::Bne => format!("bne ${}, ${}, {}", f.rs, f.rt, f.imm16 as i16),
        MipsOp::J => format!("j {:#x}", f.imm26),
        MipsOp::Jal => format!("jal {:#x}", f.imm26),
        MipsOp::Jr => format!("jr ${}", f.rs),
        MipsOp::Syscall => "syscall".to_string(),
        MipsOp::Break => "break".to_string(),
        MipsOp::Unknown => format!("unknown {:#010x}", instr.raw),
        _ => format!("{:?} (raw={:#010x})", f.op, instr.raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r_type(opcode: u8, rs: u8, rt: u8, rd: u8, shamt: u8, funct: u8) -> u32 {
        (u32::from(opcode) << 26)
            | (u32::from(rs) << 21)
            | (u32::from(rt) << 16)
            | (u32::from(rd) << 11)
            | (u32::from(shamt) << 6)
            | u32::from(funct)
    }

    fn i_type(opcode: u8, rs: u8, rt: u8, imm: u16) -> u32 {
        (u32::from(opcode) << 26) | (u32::from(rs) << 21) | (u32::from(rt) << 16) | u32::from(imm)
    }

    #[test]
    fn decode_preserves_raw_bytes() {
        let raw = r_type(0, 1, 2, 3, 0, 0x20);
        let instr = decode(raw, Addr::new(0));
        assert_eq!(instr.raw, raw);
    }

    #[test]
    fn add_sets_overflow_on_signed_overflow() {
        let raw = r_type(0, 1, 2, 3, 0, 0x20);
        let mut instr = decode(raw, Addr::new(0));
        instr.src_values = [0x7FFF_FFFF, 1];
        let regs = RegisterFile::new(32, true);
        execute(&mut instr, &regs, 32);
        assert_eq!(instr.trap, Trap::IntegerOverflow);
    }

    #[test]
    fn addu_wraps_without_trap() {
        let raw = r_type(0, 1, 2, 3, 0, 0x21);
        let mut instr = decode(raw, Addr::new(0));
        instr.src_values = [0xFFFF_FFFF, 1];
        let regs = RegisterFile::new(32, true);
        execute(&mut instr, &regs, 32);
        assert_eq!(instr.trap, Trap::NoTrap);
        assert_eq!(instr.dst_value, 0);
    }

    #[test]
    fn div_by_zero_traps() {
        let raw = r_type(0, 1, 2, 0, 0, 0x1A);
        let mut instr = decode(raw, Addr::new(0));
        instr.src_values = [10, 0];
        let regs = RegisterFile::new(32, true);
        execute(&mut instr, &regs, 32);
        assert_eq!(instr.trap, Trap::DivisionByZero);
    }

    #[test]
    fn sra_propagates_sign() {
        let raw = r_type(0, 0, 1, 2, 1, 0x03);
        let mut instr = decode(raw, Addr::new(0));
        instr.src_values = [0x8000_0000, 0];
        let regs = RegisterFile::new(32, true);
        execute(&mut instr, &regs, 32);
        assert_eq!(instr.dst_value, 0xC000_0000);
    }

    #[test]
    fn srav_shifts_value_from_rt_by_amount_from_rs() {
        // rs=2, rt=1, rd=3: rd = rt >> (rs & 0x1F), arithmetic.
        let raw = r_type(0, 2, 1, 3, 0, 0x07);
        let mut instr = decode(raw, Addr::new(0));
        instr.src_values = [0x8000_0000, 4];
        let regs = RegisterFile::new(32, true);
        execute(&mut instr, &regs, 32);
        assert_eq!(instr.dst_value, 0xF800_0000);
    }

    #[test]
    fn srlv_shifts_value_from_rt_by_amount_from_rs() {
        let raw = r_type(0, 2, 1, 3, 0, 0x06);
        let mut instr = decode(raw, Addr::new(0));
        instr.src_values = [0x8000_0000, 4];
        let regs = RegisterFile::new(32, true);
        execute(&mut instr, &regs, 32);
        assert_eq!(instr.dst_value, 0x0800_0000);
    }

    #[test]
    fn shift_by_zero_is_identity() {
        let raw = r_type(0, 0, 1, 2, 0, 0x00);
        let mut instr = decode(raw, Addr::new(0));
        instr.src_values = [0x1234, 0];
        let regs = RegisterFile::new(32, true);
        execute(&mut instr, &regs, 32);
        assert_eq!(instr.dst_value, 0x1234);
    }

    #[test]
    fn beq_taken_computes_branch_target() {
        let raw = i_type(0x04, 1, 2, 4);
        let mut instr = decode(raw, Addr::new(100));
        instr.src_values = [5, 5];
        let regs = RegisterFile::new(32, true);
        execute(&mut instr, &regs, 32);
        assert!(instr.is_taken);
        assert_eq!(instr.computed_next_pc, Addr::new(100 + 4 + 16));
    }

    #[test]
    fn unknown_instruction_traps_at_decode() {
        let raw = i_type(0x3F, 0, 0, 0);
        let instr = decode(raw, Addr::new(0));
        assert_eq!(instr.trap, Trap::UnknownInstruction);
    }
}
