//! Configuration for a simulator run.
//!
//! Mirrors the teacher's `config.rs` hierarchical style: a `defaults` module
//! of baseline constants, nested structs with `#[serde(default = "...")]`
//! field defaults, and a top-level `Config` deserializable from JSON.

use serde::Deserialize;

mod defaults {
    pub const ISA: &str = "mips32";
    pub const TRAP_HANDLER_MODE: &str = "stop";
    pub const INSTRUCTION_BUDGET: u64 = 100_000;
    pub const PREDICTOR_MODE: &str = "saturating_two_bits";
    pub const PREDICTOR_SETS: usize = 64;
    pub const PREDICTOR_WAYS: usize = 2;
    pub const ADDR_BITS: u32 = 32;
    pub const PAGE_BITS: u32 = 10;
    pub const OFFSET_BITS: u32 = 12;
}

/// Root configuration for a simulator run.
///
/// Supplied as JSON by an external front end, or via [`Config::default`]
/// for a runnable MIPS32 functional configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// ISA token (`mips32|mips64|mars|riscv32|riscv64|riscv128`).
    #[serde(default = "defaults_isa")]
    pub isa: String,
    /// Trap-handler policy.
    #[serde(default)]
    pub trap_handler: TrapHandlerConfig,
    /// Maximum instructions a `run` call executes before stopping.
    #[serde(default = "defaults_instruction_budget")]
    pub instruction_budget: u64,
    /// Branch predictor configuration.
    #[serde(default)]
    pub predictor: PredictorConfig,
    /// Guest memory geometry.
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn defaults_isa() -> String {
    defaults::ISA.to_string()
}

fn defaults_instruction_budget() -> u64 {
    defaults::INSTRUCTION_BUDGET
}

impl Default for Config {
    fn default() -> Self {
        Self {
            isa: defaults_isa(),
            trap_handler: TrapHandlerConfig::default(),
            instruction_budget: defaults::INSTRUCTION_BUDGET,
            predictor: PredictorConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

/// Trap-handler policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TrapHandlerConfig {
    /// One of `stop|stop_on_halt|ignore|critical`.
    #[serde(default = "TrapHandlerConfig::default_mode")]
    pub mode: String,
    /// When true, the driver logs every trap it observes via `tracing`,
    /// regardless of whether `mode` absorbs it.
    #[serde(default)]
    pub verbose: bool,
}

impl TrapHandlerConfig {
    fn default_mode() -> String {
        defaults::TRAP_HANDLER_MODE.to_string()
    }
}

impl Default for TrapHandlerConfig {
    fn default() -> Self {
        Self {
            mode: Self::default_mode(),
            verbose: false,
        }
    }
}

/// Branch predictor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    /// One of the six predictor mode tokens (spec.md §4.5).
    #[serde(default = "PredictorConfig::default_mode")]
    pub mode: String,
    /// Number of sets in the backing `LRUTagCache`.
    #[serde(default = "PredictorConfig::default_sets")]
    pub num_sets: usize,
    /// Ways per set.
    #[serde(default = "PredictorConfig::default_ways")]
    pub ways: usize,
}

impl PredictorConfig {
    fn default_mode() -> String {
        defaults::PREDICTOR_MODE.to_string()
    }

    fn default_sets() -> usize {
        defaults::PREDICTOR_SETS
    }

    fn default_ways() -> usize {
        defaults::PREDICTOR_WAYS
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            mode: Self::default_mode(),
            num_sets: defaults::PREDICTOR_SETS,
            ways: defaults::PREDICTOR_WAYS,
        }
    }
}

/// Guest memory geometry.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Total address width in bits.
    #[serde(default = "MemoryConfig::default_addr_bits")]
    pub addr_bits: u32,
    /// Page index width in bits.
    #[serde(default = "MemoryConfig::default_page_bits")]
    pub page_bits: u32,
    /// In-page offset width in bits.
    #[serde(default = "MemoryConfig::default_offset_bits")]
    pub offset_bits: u32,
}

impl MemoryConfig {
    fn default_addr_bits() -> u32 {
        defaults::ADDR_BITS
    }

    fn default_page_bits() -> u32 {
        defaults::PAGE_BITS
    }

    fn default_offset_bits() -> u32 {
        defaults::OFFSET_BITS
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            addr_bits: defaults::ADDR_BITS,
            page_bits: defaults::PAGE_BITS,
            offset_bits: defaults::OFFSET_BITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_runnable_mips32() {
        let cfg = Config::default();
        assert_eq!(cfg.isa, "mips32");
        assert_eq!(cfg.trap_handler.mode, "stop");
        assert_eq!(cfg.memory.addr_bits, 32);
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let json = r#"{"isa": "riscv64"}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.isa, "riscv64");
        assert_eq!(cfg.instruction_budget, 100_000);
        assert_eq!(cfg.predictor.mode, "saturating_two_bits");
    }
}
