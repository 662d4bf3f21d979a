//! Cycle-accurate CPU simulator CLI.
//!
//! Thin front end over `msim-core`: parse arguments into a [`Config`],
//! build the requested driver, load a flat binary image into guest memory,
//! and run it to completion.

use std::fs;
use std::process;

use clap::{Parser, Subcommand};

use msim_core::common::SimError;
use msim_core::config::Config;
use msim_core::driver::functional::FunctionalDriver;
use msim_core::driver::perf::PerfDriver;
use msim_core::driver::{RunOutcome, TrapHandlerMode};
use msim_core::isa::Isa;
use msim_core::memory::PagedMemory;

#[derive(Parser, Debug)]
#[command(
    name = "msim",
    author,
    version,
    about = "Multi-ISA cycle-accurate CPU simulator",
    long_about = "Runs a flat binary image against a MIPS or RISC-V functional or performance model.\n\nExample:\n  msim run -f boot.bin --isa riscv32 --driver perf"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a flat binary and run it.
    Run {
        /// Path to the flat binary image, loaded at `--load-addr`.
        #[arg(short, long)]
        file: String,

        /// Guest address the image is loaded at and execution starts from.
        #[arg(long, default_value_t = 0)]
        load_addr: u64,

        /// ISA token: `mips32|mips64|mars|riscv32|riscv64|riscv128`.
        #[arg(long, default_value = "mips32")]
        isa: String,

        /// Driver: `functional` (single-issue interpreter) or `perf`
        /// (five-stage pipeline with branch prediction).
        #[arg(long, default_value = "functional")]
        driver: String,

        /// Trap handler policy: `stop|stop_on_halt|ignore|critical`.
        #[arg(long, default_value = "stop")]
        trap_handler: String,

        /// Maximum instructions to execute before stopping.
        #[arg(long, default_value_t = 100_000)]
        budget: u64,

        /// Branch predictor mode (performance driver only).
        #[arg(long, default_value = "saturating_two_bits")]
        predictor_mode: String,

        /// Branch predictor set count (performance driver only).
        #[arg(long, default_value_t = 64)]
        predictor_sets: usize,

        /// Branch predictor ways per set (performance driver only).
        #[arg(long, default_value_t = 2)]
        predictor_ways: usize,

        /// Statistics sections to print (`summary|instruction_mix|branch`);
        /// omit to print all.
        #[arg(long)]
        stats: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            load_addr,
            isa,
            driver,
            trap_handler,
            budget,
            predictor_mode,
            predictor_sets,
            predictor_ways,
            stats,
        } => run(
            &file,
            load_addr,
            &isa,
            &driver,
            &trap_handler,
            budget,
            &predictor_mode,
            predictor_sets,
            predictor_ways,
            &stats,
        ),
    }
}

fn run(
    file: &str,
    load_addr: u64,
    isa: &str,
    driver: &str,
    trap_handler: &str,
    budget: u64,
    predictor_mode: &str,
    predictor_sets: usize,
    predictor_ways: usize,
    stats_sections: &[String],
) {
    let config = Config::default();
    let isa = die_on_err(Isa::parse(isa));
    let handler = die_on_err(TrapHandlerMode::parse(trap_handler));

    let bin = fs::read(file).unwrap_or_else(|e| {
        eprintln!("error reading {file}: {e}");
        process::exit(1);
    });

    let mut memory = die_on_err(PagedMemory::new(
        config.memory.addr_bits,
        config.memory.page_bits,
        config.memory.offset_bits,
    ));
    let load_addr = msim_core::common::Addr::new(u128::from(load_addr));
    die_on_err(memory.memcpy_host_to_guest(load_addr, &bin));
    memory.set_start_pc(load_addr);

    println!("msim: isa={isa:?} driver={driver} trap_handler={trap_handler} budget={budget}");

    let outcome = match driver {
        "functional" => {
            let mut d = FunctionalDriver::new(isa, memory, handler, budget);
            let outcome = die_on_err(d.run());
            d.stats.print_sections(stats_sections);
            outcome
        }
        "perf" => {
            let mut d = die_on_err(PerfDriver::new(
                isa,
                memory,
                handler,
                budget,
                predictor_mode,
                predictor_sets,
                predictor_ways,
            ));
            let outcome = die_on_err(d.run());
            d.stats.print_sections(stats_sections);
            outcome
        }
        other => {
            eprintln!("unknown driver '{other}', expected 'functional' or 'perf'");
            process::exit(1);
        }
    };

    match outcome {
        RunOutcome::BudgetExhausted => {
            println!("run ended: instruction budget exhausted");
        }
        RunOutcome::Trapped(trap) => {
            println!("run ended: trap {trap:?}");
            process::exit(1);
        }
    }
}

fn die_on_err<T>(result: Result<T, SimError>) -> T {
    result.unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    })
}
