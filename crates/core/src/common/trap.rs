//! Guest-visible trap taxonomy (spec.md §7).
//!
//! A `Trap` is carried as a plain value on an `Instruction`; it is never
//! thrown as a host-level error (Design Note: "Exception-driven control flow"
//! splits guest traps from host `SimError`s). The functional and performance
//! drivers consult the configured [`crate::driver::TrapHandlerMode`] to decide
//! whether a given trap halts the run.

/// A guest-visible exceptional condition produced by decode or execute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Trap {
    /// No exceptional condition; execution proceeds normally.
    #[default]
    NoTrap,
    /// Explicit halt request (ISA-specific halt/exit encoding).
    Halt,
    /// Breakpoint instruction executed (MIPS `BREAK` / RISC-V `EBREAK`).
    Breakpoint,
    /// System call instruction executed (MIPS `SYSCALL` / RISC-V `ECALL`).
    Syscall,
    /// The decoder could not classify the instruction bits.
    UnknownInstruction,
    /// A signed arithmetic operation overflowed.
    IntegerOverflow,
    /// Integer division or remainder by zero.
    DivisionByZero,
    /// A load's effective address was not aligned to its access width.
    UnalignedLoad,
    /// A store's effective address was not aligned to its access width.
    UnalignedStore,
    /// An explicit trap instruction (MIPS `TEQ`/`TNE`/... family) fired.
    ExplicitTrap,
    /// The driver exhausted its bounded retry budget fetching from unmapped
    /// memory that decodes to nothing the ISA can execute (MIPS policy).
    ///
    /// This is a driver-level condition rather than a per-instruction one —
    /// it is reported as the outcome of a `run` call, never stored on an
    /// `Instruction` — but is listed in the same taxonomy per spec.md §7.
    BearingLost,
}

impl Trap {
    /// Returns `true` if this value represents "no exceptional condition".
    #[must_use]
    pub fn is_none(self) -> bool {
        self == Trap::NoTrap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_no_trap() {
        assert!(Trap::default().is_none());
    }

    #[test]
    fn non_default_is_not_none() {
        assert!(!Trap::Halt.is_none());
    }
}
