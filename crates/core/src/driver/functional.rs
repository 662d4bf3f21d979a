//! Functional driver: one instruction at a time, no microarchitectural detail.
//!
//! Grounded on the teacher's `sim/simulator.rs` (owns CPU + drives it one
//! `tick` at a time) and `core/cpu/execution.rs` for the fetch-decode-execute
//! shape, simplified here to the single-issue, no-pipeline loop spec.md §4.6
//! describes.

use tracing::{info, warn};

use crate::common::{bitmask, sign_extend, Addr, SimError, Trap};
use crate::driver::{RunOutcome, TrapHandlerMode};
use crate::isa::{Instruction, Isa};
use crate::memory::PagedMemory;
use crate::regfile::RegisterFile;
use crate::stats::SimStats;

/// Consecutive all-zero fetches after which the driver gives up rather than
/// spin forever decoding a region that was never loaded.
const INVALID_FETCH_LIMIT: u32 = 8;

/// A single-instruction-at-a-time interpreter over one ISA.
#[derive(Debug)]
pub struct FunctionalDriver {
    isa: Isa,
    /// Guest memory. Public so a loader can populate it before [`Self::run`].
    pub memory: PagedMemory,
    /// Architectural register file.
    pub regs: RegisterFile,
    handler: TrapHandlerMode,
    instruction_budget: u64,
    /// Running statistics, updated as instructions retire.
    pub stats: SimStats,
}

impl FunctionalDriver {
    /// Builds a functional driver over `memory`, starting execution at the
    /// memory's sticky `start_pc`.
    #[must_use]
    pub fn new(
        isa: Isa,
        memory: PagedMemory,
        handler: TrapHandlerMode,
        instruction_budget: u64,
    ) -> Self {
        let mut regs = RegisterFile::new(isa.gpr_count(), true);
        regs.set_pc(memory.start_pc());
        Self {
            isa,
            memory,
            regs,
            handler,
            instruction_budget,
            stats: SimStats::default(),
        }
    }

    /// Runs until the instruction budget is exhausted or the trap-handler
    /// policy decides to stop.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::CriticalTrap`] if the configured handler policy
    /// is [`TrapHandlerMode::Critical`] and any instruction sets a trap.
    pub fn run(&mut self) -> Result<RunOutcome, SimError> {
        let mut invalid_fetch_streak = 0u32;

        for _ in 0..self.instruction_budget {
            let pc = self.regs.pc();
            let raw = self.fetch(pc);

            if raw == 0 {
                invalid_fetch_streak += 1;
                if invalid_fetch_streak >= INVALID_FETCH_LIMIT {
                    let trap = if self.isa.is_mips() {
                        Trap::BearingLost
                    } else {
                        Trap::UnknownInstruction
                    };
                    warn!(?trap, pc = %format!("{pc:#x}"), "giving up after consecutive invalid fetches");
                    return Ok(RunOutcome::Trapped(trap));
                }
            } else {
                invalid_fetch_streak = 0;
            }

            let mut instr = self.isa.decode(raw, pc);
            self.execute_one(&mut instr)?;
            let trap = instr.trap;

            if self.isa.is_mips() && instr.is_branch() {
                let delay_trap = self.resolve_mips_delay_slot(&instr)?;
                self.stats.cycles += 1;
                if let Some(stop) = self.handler.apply(trap)? {
                    return Ok(RunOutcome::Trapped(stop));
                }
                if let Some(stop) = self.handler.apply(delay_trap)? {
                    return Ok(RunOutcome::Trapped(stop));
                }
            } else {
                self.regs.set_pc(instr.computed_next_pc);
                self.stats.cycles += 1;
                if let Some(stop) = self.handler.apply(trap)? {
                    return Ok(RunOutcome::Trapped(stop));
                }
            }
        }
        info!(budget = self.instruction_budget, "instruction budget exhausted");
        Ok(RunOutcome::BudgetExhausted)
    }

    fn fetch(&self, pc: Addr) -> u32 {
        self.memory.read_word::<4>(pc) as u32
    }

    fn read_operands(&self, instr: &mut Instruction) {
        let mut values = [0u128; 2];
        for (slot, reg) in values.iter_mut().zip(instr.src_regs()) {
            if let Some(idx) = reg {
                *slot = self.regs.read(idx);
            }
        }
        instr.src_values = values;
    }

    /// Executes one already-decoded instruction: read operands, execute,
    /// perform its memory access if any, and write its destination register.
    /// Does not advance the PC or run the trap-handler policy.
    fn execute_one(&mut self, instr: &mut Instruction) -> Result<(), SimError> {
        self.read_operands(instr);
        self.isa.execute(instr, &self.regs);
        self.perform_memory_access(instr);
        if let Some(reg) = instr.dst_reg() {
            self.regs.write(reg, instr.dst_value & bitmask(self.isa.word_bits()));
        }
        self.stats.instructions_retired += 1;
        self.track_mix(instr);
        Ok(())
    }

    fn perform_memory_access(&mut self, instr: &mut Instruction) {
        let Some(access) = instr.mem_access else {
            return;
        };
        if !instr.trap.is_none() {
            return;
        }
        let addr = instr.mem_addr.val();
        if access.width > 1 && addr % u128::from(access.width) != 0 {
            instr.trap = if access.is_store {
                Trap::UnalignedStore
            } else {
                Trap::UnalignedLoad
            };
            return;
        }
        if access.is_store {
            match access.width {
                1 => self.memory.write_word::<1>(instr.dst_value, instr.mem_addr),
                2 => self.memory.write_word::<2>(instr.dst_value, instr.mem_addr),
                4 => self.memory.write_word::<4>(instr.dst_value, instr.mem_addr),
                8 => self.memory.write_word::<8>(instr.dst_value, instr.mem_addr),
                _ => {}
            }
        } else {
            let raw = match access.width {
                1 => self.memory.read_word::<1>(instr.mem_addr),
                2 => self.memory.read_word::<2>(instr.mem_addr),
                4 => self.memory.read_word::<4>(instr.mem_addr),
                8 => self.memory.read_word::<8>(instr.mem_addr),
                _ => 0,
            };
            instr.dst_value = if access.signed {
                sign_extend(raw, u32::from(access.width) * 8)
            } else {
                raw
            };
        }
    }

    fn track_mix(&mut self, instr: &Instruction) {
        if let Some(access) = instr.mem_access {
            if access.is_store {
                self.stats.inst_store += 1;
            } else {
                self.stats.inst_load += 1;
            }
        } else if instr.is_branch() {
            self.stats.inst_branch += 1;
        } else if matches!(instr.trap, Trap::Syscall | Trap::Breakpoint) {
            self.stats.inst_system += 1;
        } else {
            self.stats.inst_alu += 1;
        }
    }

    /// Runs a MIPS branch's delay slot, honoring branch-likely annulment,
    /// then sets the PC to the branch's resolved target. Returns the delay
    /// slot instruction's own trap, if any.
    fn resolve_mips_delay_slot(&mut self, branch: &Instruction) -> Result<Trap, SimError> {
        let delay_slot_pc = branch.pc.wrapping_add(4);
        if branch.is_likely_branch && !branch.is_taken {
            self.regs.set_pc(delay_slot_pc.wrapping_add(4));
            return Ok(Trap::NoTrap);
        }
        let raw = self.fetch(delay_slot_pc);
        let mut delay_instr = self.isa.decode(raw, delay_slot_pc);
        self.execute_one(&mut delay_instr)?;
        self.regs.set_pc(branch.computed_next_pc);
        Ok(delay_instr.trap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::TrapHandlerMode;

    fn mips_memory() -> PagedMemory {
        PagedMemory::new(32, 10, 12).unwrap()
    }

    fn riscv_memory() -> PagedMemory {
        PagedMemory::new(32, 10, 12).unwrap()
    }

    #[test]
    fn mips_empty_memory_gives_up_with_bearing_lost() {
        let mem = mips_memory();
        let mut driver = FunctionalDriver::new(Isa::Mips32, mem, TrapHandlerMode::Stop, 30);
        let outcome = driver.run().unwrap();
        assert_eq!(outcome, RunOutcome::Trapped(Trap::BearingLost));
    }

    #[test]
    fn riscv_empty_memory_surfaces_unknown_instruction() {
        let mem = riscv_memory();
        let mut driver = FunctionalDriver::new(Isa::RiscV32, mem, TrapHandlerMode::Stop, 30);
        let outcome = driver.run().unwrap();
        assert_eq!(outcome, RunOutcome::Trapped(Trap::UnknownInstruction));
    }

    #[test]
    fn pc_advances_by_four_after_one_straight_line_instruction() {
        let mut mem = mips_memory();
        // addiu $1, $0, 5
        let raw = (0x09u32 << 26) | (1u32 << 16);
        mem.write_word::<4>(u128::from(raw), Addr::new(0x1000));
        mem.set_start_pc(Addr::new(0x1000));
        let mut driver = FunctionalDriver::new(Isa::Mips32, mem, TrapHandlerMode::Stop, 1);
        driver.run().unwrap();
        assert_eq!(driver.regs.pc(), Addr::new(0x1004));
        assert_eq!(driver.regs.read(1), 5);
    }

    #[test]
    fn stop_on_halt_runs_until_halt_instruction() {
        let mut mem = mips_memory();
        // addiu $v0, $0, 10
        let addiu_v0_10 = (0x09u32 << 26) | (2u32 << 16) | 10;
        // syscall, with $v0 == 10 being the MARS "exit" convention.
        let syscall = 0x0Cu32;
        mem.write_word::<4>(u128::from(addiu_v0_10), Addr::new(0x1000));
        mem.write_word::<4>(u128::from(syscall), Addr::new(0x1004));
        mem.set_start_pc(Addr::new(0x1000));
        let mut driver = FunctionalDriver::new(Isa::Mips32, mem, TrapHandlerMode::StopOnHalt, 10_000);
        let outcome = driver.run().unwrap();
        assert_eq!(outcome, RunOutcome::Trapped(Trap::Halt));
    }

    #[test]
    fn critical_handler_is_fatal_on_breakpoint() {
        let mut mem = mips_memory();
        let break_raw = 0x0Du32;
        mem.write_word::<4>(u128::from(break_raw), Addr::new(0x1000));
        mem.set_start_pc(Addr::new(0x1000));
        let mut driver = FunctionalDriver::new(Isa::Mips32, mem, TrapHandlerMode::Critical, 10);
        assert!(driver.run().is_err());
    }
}
