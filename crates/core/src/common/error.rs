//! Host-level error taxonomy.
//!
//! `SimError` covers every failure that is fatal to the host process rather
//! than guest-visible: construction-time configuration errors, memory bulk-copy
//! bounds violations, and port-contract violations (spec.md §7). Guest-visible
//! exceptional conditions are represented separately as [`crate::common::Trap`]
//! values carried on an `Instruction`, never as a `SimError`.

use crate::common::Trap;
use thiserror::Error;

/// Errors raised by host-level configuration, construction, or contract checks.
///
/// These are always fatal to the run that raised them: geometry and
/// configuration errors are fatal at construction, port-contract violations
/// are fatal at the cycle they are observed. Decoder failures are not part of
/// this enum — an unrecognized opcode surfaces as the guest-visible
/// `Trap::UnknownInstruction`, never a host error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Unknown ISA name passed to a constructor (`mips32|mips64|riscv32|riscv64|riscv128`).
    #[error("unknown ISA '{0}'")]
    InvalidIsa(String),

    /// Unknown trap-handler mode token (`stop|stop_on_halt|ignore` × `critical|verbose`).
    #[error("unknown trap handler driver '{0}'")]
    IncorrectDriver(String),

    /// Memory geometry exceeds native addressing, or `page_bits`/`offset_bits` are zero.
    #[error(
        "bad memory mapping: addr_bits={addr_bits} page_bits={page_bits} offset_bits={offset_bits}"
    )]
    BadMapping {
        /// Total address width in bits.
        addr_bits: u32,
        /// Page index width in bits.
        page_bits: u32,
        /// In-page offset width in bits.
        offset_bits: u32,
    },

    /// A bulk copy's destination range exceeds `2^addr_bits`.
    #[error("out of range: copy of {len} bytes at {addr:#x} exceeds the addressable range")]
    OutOfRange {
        /// Starting guest address of the attempted copy.
        addr: u128,
        /// Length in bytes of the attempted copy.
        len: usize,
    },

    /// Unsupported branch predictor mode name.
    #[error("unknown predictor mode '{0}'")]
    InvalidMode(String),

    /// Port-fabric contract violation (spec.md §4.3/§7).
    #[error(transparent)]
    Port(#[from] PortError),

    /// A guest trap reached the `critical` trap-handler policy, which treats
    /// every trap as fatal to the host run rather than resumable.
    #[error("trap {0:?} is fatal under the critical trap handler policy")]
    CriticalTrap(Trap),
}

/// Port-fabric contract violations (spec.md §4.3).
///
/// Every variant is always fatal to the run in which it occurs: ports carry
/// no recovery path, matching the original `PortError` exception in
/// `infra/ports/ports.h`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    /// More writes occurred in one cycle than the port's configured bandwidth.
    #[error("port '{key}' is overloaded: {attempted} writes exceed bandwidth {bandwidth}")]
    Overloaded {
        /// The port's registration key.
        key: String,
        /// Writes attempted this cycle.
        attempted: u32,
        /// Configured bandwidth.
        bandwidth: u32,
    },

    /// `read(cycle)` was called but the head of the queue was not ready.
    #[error("port '{key}' was not ready for read at cycle {cycle}")]
    NotReady {
        /// The port's registration key.
        key: String,
        /// The cycle at which the read was attempted.
        cycle: u64,
    },

    /// A registered reader has no writer, or vice versa.
    #[error("port '{0}' is dangling (writer/reader count mismatch)")]
    Dangling(String),

    /// A writer and reader share a key but differ in element type.
    #[error("port '{0}' has a type mismatch between its writer and reader")]
    TypeMismatch(String),
}
