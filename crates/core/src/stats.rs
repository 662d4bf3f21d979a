//! Simulation statistics collection and reporting.
//!
//! Trimmed from the teacher's `stats.rs` to the counters this core can
//! actually produce: there is no real cache hierarchy or FP unit here, only
//! an instruction mix, cycle/IPC summary, and the LRU-tag-cache-backed
//! branch predictor's hit rate.

use std::time::Instant;

/// Simulation statistics tracked by either driver.
#[derive(Debug, Clone)]
pub struct SimStats {
    start_time: Instant,
    /// Total cycles elapsed (functional driver counts one per instruction;
    /// the performance driver counts pipeline clock ticks).
    pub cycles: u64,
    /// Number of instructions retired.
    pub instructions_retired: u64,

    /// Count of load instructions retired.
    pub inst_load: u64,
    /// Count of store instructions retired.
    pub inst_store: u64,
    /// Count of branch/jump instructions retired.
    pub inst_branch: u64,
    /// Count of ALU (non-load/store/branch/system) instructions retired.
    pub inst_alu: u64,
    /// Count of system (syscall/break) instructions retired.
    pub inst_system: u64,

    /// Number of predictor lookups that matched the resolved direction.
    pub branch_predictions: u64,
    /// Number of predictor lookups that did not match the resolved direction.
    pub branch_mispredictions: u64,

    /// LRU tag cache hits (branch predictor and any future L1 model).
    pub cache_hits: u64,
    /// LRU tag cache misses.
    pub cache_misses: u64,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: 0,
            instructions_retired: 0,
            inst_load: 0,
            inst_store: 0,
            inst_branch: 0,
            inst_alu: 0,
            inst_system: 0,
            branch_predictions: 0,
            branch_mispredictions: 0,
            cache_hits: 0,
            cache_misses: 0,
        }
    }
}

/// Section names for selective stats output.
pub const STATS_SECTIONS: &[&str] = &["summary", "instruction_mix", "branch"];

impl SimStats {
    /// Prints only the requested statistics sections to stdout.
    ///
    /// Pass an empty slice to print every section (same as [`Self::print`]).
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let seconds = self.start_time.elapsed().as_secs_f64();
        let cyc = self.cycles.max(1);
        let instr = self.instructions_retired.max(1);

        if want("summary") {
            let ipc = self.instructions_retired as f64 / cyc as f64;
            let mips = (self.instructions_retired as f64 / seconds) / 1_000_000.0;
            println!("==========================================================");
            println!("SIMULATION STATISTICS");
            println!("==========================================================");
            println!("host_seconds             {seconds:.4} s");
            println!("sim_cycles               {}", self.cycles);
            println!("sim_insts                {}", self.instructions_retired);
            println!("sim_ipc                  {ipc:.4}");
            println!("sim_mips                 {mips:.2}");
            println!("----------------------------------------------------------");
        }
        if want("instruction_mix") {
            let total = instr as f64;
            println!("INSTRUCTION MIX");
            println!("  op.alu                 {} ({:.2}%)", self.inst_alu, self.inst_alu as f64 / total * 100.0);
            println!("  op.load                {} ({:.2}%)", self.inst_load, self.inst_load as f64 / total * 100.0);
            println!("  op.store               {} ({:.2}%)", self.inst_store, self.inst_store as f64 / total * 100.0);
            println!("  op.branch              {} ({:.2}%)", self.inst_branch, self.inst_branch as f64 / total * 100.0);
            println!("  op.system              {} ({:.2}%)", self.inst_system, self.inst_system as f64 / total * 100.0);
            println!("----------------------------------------------------------");
        }
        if want("branch") {
            let total = self.branch_predictions + self.branch_mispredictions;
            let acc = if total > 0 {
                100.0 * self.branch_predictions as f64 / total as f64
            } else {
                0.0
            };
            println!("BRANCH PREDICTION");
            println!("  bp.lookups             {total}");
            println!("  bp.mispredicts         {}", self.branch_mispredictions);
            println!("  bp.accuracy            {acc:.2}%");
            let cache_total = self.cache_hits + self.cache_misses;
            let cache_rate = if cache_total > 0 {
                100.0 * self.cache_hits as f64 / cache_total as f64
            } else {
                0.0
            };
            println!("  cache.hit_rate         {cache_rate:.2}%");
        }
        println!("==========================================================");
    }

    /// Prints every statistics section to stdout. Equivalent to
    /// `print_sections(&[])`.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zeroed() {
        let stats = SimStats::default();
        assert_eq!(stats.instructions_retired, 0);
        assert_eq!(stats.cycles, 0);
    }

    #[test]
    fn print_does_not_panic_on_zero_counters() {
        SimStats::default().print();
    }
}
