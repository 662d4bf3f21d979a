//! End-to-end scenarios, spelled out literally rather than as unit tests
//! buried inside a module, since they each exercise several subsystems
//! wired together the way an external caller would.

use pretty_assertions::assert_eq;

use msim_core::common::{Addr, Trap};
use msim_core::driver::functional::FunctionalDriver;
use msim_core::driver::{RunOutcome, TrapHandlerMode};
use msim_core::isa::Isa;
use msim_core::memory::PagedMemory;

fn mem32() -> PagedMemory {
    PagedMemory::new(32, 10, 12).unwrap()
}

#[test]
fn mips32_empty_memory_loses_its_bearing_within_thirty_instructions() {
    let mem = mem32();
    let mut driver = FunctionalDriver::new(Isa::Mips32, mem, TrapHandlerMode::Stop, 30);
    let outcome = driver.run().unwrap();
    assert_eq!(outcome, RunOutcome::Trapped(Trap::BearingLost));
}

#[test]
fn riscv32_empty_memory_surfaces_unknown_instruction() {
    let mem = mem32();
    let mut driver = FunctionalDriver::new(Isa::RiscV32, mem, TrapHandlerMode::Stop, 30);
    let outcome = driver.run().unwrap();
    assert_eq!(outcome, RunOutcome::Trapped(Trap::UnknownInstruction));
}

#[test]
fn loaded_image_advances_pc_by_exactly_four_after_one_instruction() {
    let mut mem = mem32();
    // addiu $1, $0, 5, standing in for a loaded flat image at its entry point.
    let raw = (0x09u32 << 26) | (1u32 << 16) | 5;
    let image = raw.to_le_bytes();
    let start = Addr::new(0x8000_0000);
    mem.memcpy_host_to_guest(start, &image).unwrap();
    mem.set_start_pc(start);

    let mut driver = FunctionalDriver::new(Isa::Mips32, mem, TrapHandlerMode::Stop, 1);
    driver.run().unwrap();
    assert_eq!(driver.regs.pc(), start.wrapping_add(4));
}

#[test]
fn stop_on_halt_runs_ten_thousand_budget_and_returns_halt() {
    let mut mem = mem32();
    // addiu $v0, $0, 10 ; syscall  -- the MARS "exit" convention.
    let addiu_v0_10 = (0x09u32 << 26) | (2u32 << 16) | 10;
    let syscall = 0x0Cu32;
    mem.write_word::<4>(u128::from(addiu_v0_10), Addr::new(0x1000));
    mem.write_word::<4>(u128::from(syscall), Addr::new(0x1004));
    mem.set_start_pc(Addr::new(0x1000));

    let mut driver = FunctionalDriver::new(Isa::Mips32, mem, TrapHandlerMode::StopOnHalt, 10_000);
    let outcome = driver.run().unwrap();
    assert_eq!(outcome, RunOutcome::Trapped(Trap::Halt));
}

#[test]
fn critical_handler_turns_any_trap_into_a_host_error() {
    let mut mem = mem32();
    let break_raw = 0x0Du32; // MIPS BREAK
    mem.write_word::<4>(u128::from(break_raw), Addr::new(0x1000));
    mem.set_start_pc(Addr::new(0x1000));

    let mut driver = FunctionalDriver::new(Isa::Mips32, mem, TrapHandlerMode::Critical, 10);
    let err = driver.run().unwrap_err();
    assert!(matches!(err, msim_core::common::SimError::CriticalTrap(Trap::Breakpoint)));
}

#[test]
fn ignore_mode_absorbs_a_breakpoint_and_keeps_going() {
    let mut mem = mem32();
    let break_raw = 0x0Du32;
    mem.write_word::<4>(u128::from(break_raw), Addr::new(0x1000));
    mem.set_start_pc(Addr::new(0x1000));

    // Budget stays below the invalid-fetch limit, so the run ends on
    // exhausting the budget rather than on the trailing zero words reading
    // as a lost bearing.
    let mut driver = FunctionalDriver::new(Isa::Mips32, mem, TrapHandlerMode::Ignore, 5);
    let outcome = driver.run().unwrap();
    assert_eq!(outcome, RunOutcome::BudgetExhausted);
    assert_eq!(driver.stats.instructions_retired, 5);
}
