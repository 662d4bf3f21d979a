//! Performance driver: an in-order five-stage pipeline over the port fabric.
//!
//! Fetch, Decode, Execute, Memory, and Writeback are wired as a chain of
//! single-cycle-latency ports (Design Note: "Globally addressable port
//! registry" in [`crate::ports`]). Branch misprediction is resolved at
//! Execute and announced on a zero-latency `WritePort<bool>` flush port, per
//! the idiom documented on [`crate::ports`] itself: downstream stages read
//! the flush signal the same cycle it fires and discard what they were about
//! to forward.
//!
//! Stages run back-to-front within one [`Self::tick`] (Writeback, Memory,
//! Execute, Decode, Fetch) so that a stage's read this cycle always sees
//! what an earlier stage wrote on a prior cycle, and Fetch sees Execute's
//! branch redirect before it fetches.

use tracing::{debug, trace};

use crate::common::{bitmask, sign_extend, Addr, SimError, Trap};
use crate::driver::{RunOutcome, TrapHandlerMode};
use crate::isa::{Instruction, Isa};
use crate::memory::PagedMemory;
use crate::ports::{Cycle, Latency, PortMap, ReadPort, WritePort};
use crate::predictor::BranchPredictor;
use crate::regfile::RegisterFile;
use crate::stats::SimStats;

const INVALID_FETCH_LIMIT: u32 = 8;

/// What Fetch hands to Decode: the raw word plus the bookkeeping Execute
/// needs to detect a misprediction.
#[derive(Clone, Copy, Debug)]
struct FetchSlot {
    raw: u32,
    pc: Addr,
    predicted_next_pc: Addr,
    predicted_taken: bool,
}

fn try_read<T: 'static>(port: &mut ReadPort<Option<T>>, cycle: Cycle) -> Option<T> {
    if !port.is_ready(cycle) {
        return None;
    }
    port.read(cycle).ok().flatten()
}

/// A five-stage in-order pipeline interpreter over one ISA.
pub struct PerfDriver {
    isa: Isa,
    /// Guest memory. Public so a loader can populate it before [`Self::run`].
    pub memory: PagedMemory,
    /// Architectural register file, committed to at Writeback.
    pub regs: RegisterFile,
    predictor: BranchPredictor,
    handler: TrapHandlerMode,
    instruction_budget: u64,
    /// Running statistics, updated as instructions retire.
    pub stats: SimStats,

    ports: PortMap,
    if_id_w: WritePort<Option<FetchSlot>>,
    if_id_r: ReadPort<Option<FetchSlot>>,
    id_ex_w: WritePort<Option<Instruction>>,
    id_ex_r: ReadPort<Option<Instruction>>,
    ex_mem_w: WritePort<Option<Instruction>>,
    ex_mem_r: ReadPort<Option<Instruction>>,
    mem_wb_w: WritePort<Option<Instruction>>,
    mem_wb_r: ReadPort<Option<Instruction>>,
    flush_w: WritePort<bool>,
    flush_r: ReadPort<bool>,

    cycle: Cycle,
    next_fetch_pc: Addr,
    invalid_fetch_streak: u32,
    outcome: Option<RunOutcome>,
}

impl PerfDriver {
    /// Builds a performance driver over `memory`, with a branch predictor
    /// of `predictor_mode` backed by `predictor_sets` sets of `predictor_ways`
    /// ways each.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidMode`] for an unrecognized predictor mode,
    /// or [`SimError::Port`] if the internal port registry fails to validate
    /// (never expected in practice; every port here is wired by this
    /// constructor itself).
    pub fn new(
        isa: Isa,
        memory: PagedMemory,
        handler: TrapHandlerMode,
        instruction_budget: u64,
        predictor_mode: &str,
        predictor_sets: usize,
        predictor_ways: usize,
    ) -> Result<Self, SimError> {
        let mut regs = RegisterFile::new(isa.gpr_count(), true);
        let start_pc = memory.start_pc();
        regs.set_pc(start_pc);

        let mut ports = PortMap::new();
        let mut if_id_w = ports.write_port::<Option<FetchSlot>>("if_id", 1, 1);
        let if_id_r = ports.read_port::<Option<FetchSlot>>("if_id", Latency(1));
        let mut id_ex_w = ports.write_port::<Option<Instruction>>("id_ex", 1, 1);
        let id_ex_r = ports.read_port::<Option<Instruction>>("id_ex", Latency(1));
        let mut ex_mem_w = ports.write_port::<Option<Instruction>>("ex_mem", 1, 1);
        let ex_mem_r = ports.read_port::<Option<Instruction>>("ex_mem", Latency(1));
        let mut mem_wb_w = ports.write_port::<Option<Instruction>>("mem_wb", 1, 1);
        let mem_wb_r = ports.read_port::<Option<Instruction>>("mem_wb", Latency(1));
        let mut flush_w = ports.write_port::<bool>("flush", 1, 1);
        let flush_r = ports.read_port::<bool>("flush", Latency(0));
        ports.init()?;

        if_id_w.bind(&ports)?;
        id_ex_w.bind(&ports)?;
        ex_mem_w.bind(&ports)?;
        mem_wb_w.bind(&ports)?;
        flush_w.bind(&ports)?;

        let predictor = BranchPredictor::new(predictor_mode, predictor_sets, predictor_ways)?;

        Ok(Self {
            isa,
            memory,
            regs,
            predictor,
            handler,
            instruction_budget,
            stats: SimStats::default(),
            ports,
            if_id_w,
            if_id_r,
            id_ex_w,
            id_ex_r,
            ex_mem_w,
            ex_mem_r,
            mem_wb_w,
            mem_wb_r,
            flush_w,
            flush_r,
            cycle: Cycle(0),
            next_fetch_pc: start_pc,
            invalid_fetch_streak: 0,
            outcome: None,
        })
    }

    /// Runs the pipeline until the instruction budget is exhausted or the
    /// trap-handler policy decides to stop on a retiring instruction's trap.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::CriticalTrap`] if the configured handler policy
    /// is [`TrapHandlerMode::Critical`] and a retiring instruction carries a
    /// trap.
    pub fn run(&mut self) -> Result<RunOutcome, SimError> {
        while self.outcome.is_none() && self.stats.instructions_retired < self.instruction_budget {
            self.tick()?;
        }
        Ok(self.outcome.unwrap_or(RunOutcome::BudgetExhausted))
    }

    fn tick(&mut self) -> Result<(), SimError> {
        self.cycle = self.cycle.next();
        self.writeback()?;
        self.memory_stage();
        self.execute_stage();
        self.decode_stage();
        self.fetch_stage();
        self.ports.clean_up(self.cycle);
        Ok(())
    }

    fn writeback(&mut self) -> Result<(), SimError> {
        let Some(instr) = try_read(&mut self.mem_wb_r, self.cycle) else {
            return Ok(());
        };
        if let Some(reg) = instr.dst_reg() {
            self.regs.write(reg, instr.dst_value & bitmask(self.isa.word_bits()));
        }
        self.stats.instructions_retired += 1;
        self.track_mix(&instr);
        if let Some(stop) = self.handler.apply(instr.trap)? {
            trace!(?stop, pc = %format!("{:#x}", instr.pc.val()), "pipeline stopping at writeback");
            self.outcome = Some(RunOutcome::Trapped(stop));
        }
        Ok(())
    }

    fn memory_stage(&mut self) {
        let Some(mut instr) = try_read(&mut self.ex_mem_r, self.cycle) else {
            let _ = self.mem_wb_w.write(None, self.cycle);
            return;
        };
        self.perform_memory_access(&mut instr);
        let _ = self.mem_wb_w.write(Some(instr), self.cycle);
    }

    fn execute_stage(&mut self) {
        let Some(mut instr) = try_read(&mut self.id_ex_r, self.cycle) else {
            let _ = self.ex_mem_w.write(None, self.cycle);
            return;
        };

        let was_hit = instr.is_branch() && self.predictor.is_hit(instr.pc);
        let predicted_taken = instr.is_taken;
        let predicted = instr.predicted_next_pc;
        self.isa.execute(&mut instr, &self.regs);

        if instr.is_branch() {
            let actual_taken = instr.is_taken;
            let actual = instr.computed_next_pc;
            let likely = instr.is_likely_branch;
            // Mirrors the three-clause misprediction check: an ordinary
            // taken/not-taken disagreement misses, a taken prediction whose
            // target is wrong misses, and a branch-likely whose delay slot
            // was predicted-not-taken-but-actually-annulled misses too.
            let mispredicted = (predicted_taken != actual_taken && !likely)
                || (predicted_taken && predicted != actual)
                || (!predicted_taken && !actual_taken && likely);

            self.stats.cache_hits += u64::from(was_hit);
            self.stats.cache_misses += u64::from(!was_hit);
            if mispredicted {
                self.stats.branch_mispredictions += 1;
                debug!(
                    pc = %format!("{:#x}", instr.pc.val()),
                    predicted = %format!("{:#x}", predicted.val()),
                    actual = %format!("{:#x}", actual.val()),
                    "branch misprediction, flushing"
                );
                let _ = self.flush_w.write(true, self.cycle);
                self.next_fetch_pc = actual;
            } else {
                self.stats.branch_predictions += 1;
            }
            self.predictor.update(instr.pc, actual_taken, actual, was_hit);
        }

        let _ = self.ex_mem_w.write(Some(instr), self.cycle);
    }

    fn decode_stage(&mut self) {
        let flushed = self.flush_r.is_ready(self.cycle) && self.flush_r.read(self.cycle).unwrap_or(false);
        let slot = try_read(&mut self.if_id_r, self.cycle);
        if flushed || slot.is_none() {
            let _ = self.id_ex_w.write(None, self.cycle);
            return;
        }
        let slot = slot.unwrap();
        let mut instr = self.isa.decode(slot.raw, slot.pc);
        instr.predicted_next_pc = slot.predicted_next_pc;
        instr.is_taken = slot.predicted_taken;

        if slot.raw == 0 {
            self.invalid_fetch_streak += 1;
            if self.invalid_fetch_streak >= INVALID_FETCH_LIMIT {
                instr.trap = if self.isa.is_mips() {
                    Trap::BearingLost
                } else {
                    Trap::UnknownInstruction
                };
            }
        } else {
            self.invalid_fetch_streak = 0;
        }

        let mut values = [0u128; 2];
        for (dst, reg) in values.iter_mut().zip(instr.src_regs()) {
            if let Some(idx) = reg {
                *dst = self.regs.read(idx);
            }
        }
        instr.src_values = values;
        let _ = self.id_ex_w.write(Some(instr), self.cycle);
    }

    fn fetch_stage(&mut self) {
        if self.outcome.is_some() {
            let _ = self.if_id_w.write(None, self.cycle);
            return;
        }
        let pc = self.next_fetch_pc;
        let raw = self.memory.read_word::<4>(pc) as u32;
        let predicted_taken = self.predictor.is_taken(pc);
        let predicted_next_pc = if predicted_taken {
            self.predictor.get_target(pc)
        } else {
            pc.wrapping_add(4)
        };
        self.next_fetch_pc = predicted_next_pc;

        let slot = FetchSlot {
            raw,
            pc,
            predicted_next_pc,
            predicted_taken,
        };
        let _ = self.if_id_w.write(Some(slot), self.cycle);
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
}
