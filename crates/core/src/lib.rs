//! Multi-ISA cycle-accurate CPU simulator core.
//!
//! This crate implements the hard core of a simulator that interprets programs
//! compiled for MIPS (32/64) or RISC-V (32/64/128) either functionally (one
//! instruction at a time, no microarchitectural detail) or through a classic
//! five-stage in-order pipeline with branch prediction and a tag-only cache
//! model. It consists of four tightly coupled subsystems:
//! 1. **Memory:** a sparsely-allocated, three-level paged guest address space.
//! 2. **ISA:** bit-field decode and semantic execution shared across ISAs.
//! 3. **Ports:** typed, latency-carrying, bandwidth-limited pipeline channels.
//! 4. **Prediction:** an LRU tag cache and a branch predictor built on it.
//!
//! The ELF loader, syscall shim, GDB front end, and CLI are external
//! collaborators; this crate names their contracts but does not implement them.

/// Bit utilities, address/word types, error and trap taxonomies.
pub mod common;
/// Simulator configuration.
pub mod config;
/// Functional and performance drivers.
pub mod driver;
/// Instruction set decode/execute engine (MIPS, RISC-V).
pub mod isa;
/// Generic LRU tag cache.
pub mod cache;
/// Sparsely-allocated paged guest memory.
pub mod memory;
/// Typed pipeline port fabric.
pub mod ports;
/// Branch prediction unit built on the LRU tag cache.
pub mod predictor;
/// Architectural register file.
pub mod regfile;
/// Simulation statistics collection and reporting.
pub mod stats;

pub use crate::common::error::SimError;
pub use crate::config::Config;
pub use crate::isa::Isa;
pub use crate::memory::PagedMemory;
