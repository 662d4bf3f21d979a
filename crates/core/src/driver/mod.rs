//! Drivers: the loop that turns decoded instructions into state changes.
//!
//! Grounded on the teacher's `sim/simulator.rs` (a thin owner of CPU state
//! plus pipeline, `tick()` advancing both) and `core/cpu/trap.rs` for the
//! trap-handler-policy shape. [`functional`] runs one instruction at a time
//! with no microarchitectural detail; [`perf`] wires a five-stage pipeline
//! over the port fabric.

pub mod functional;
pub mod perf;

use crate::common::{SimError, Trap};

/// Selects how the driver reacts when an instruction sets a trap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapHandlerMode {
    /// Halt the run on any non-`NoTrap` trap.
    Stop,
    /// Halt only on `Trap::Halt`; every other trap is cleared and execution
    /// continues.
    StopOnHalt,
    /// Clear every trap and continue, including `Halt`.
    Ignore,
    /// Any non-`NoTrap` trap is fatal to the host run.
    Critical,
}

impl TrapHandlerMode {
    /// Parses a trap-handler token as accepted by the CLI surface.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::IncorrectDriver`] for an unrecognized token.
    pub fn parse(token: &str) -> Result<Self, SimError> {
        match token {
            "stop" => Ok(Self::Stop),
            "stop_on_halt" => Ok(Self::StopOnHalt),
            "ignore" => Ok(Self::Ignore),
            "critical" => Ok(Self::Critical),
            other => Err(SimError::IncorrectDriver(other.to_string())),
        }
    }

    /// Applies this policy to a trap raised by an instruction.
    ///
    /// Returns `Ok(Some(trap))` if the run should stop and report `trap`,
    /// `Ok(None)` if the trap was absorbed and the run continues, or
    /// `Err` if the policy treats the trap as a fatal host error.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::CriticalTrap`] under [`TrapHandlerMode::Critical`]
    /// for any non-[`Trap::NoTrap`] trap.
    pub fn apply(self, trap: Trap) -> Result<Option<Trap>, SimError> {
        if trap.is_none() {
            return Ok(None);
        }
        match self {
            Self::Stop => Ok(Some(trap)),
            Self::StopOnHalt => Ok(matches!(trap, Trap::Halt).then_some(trap)),
            Self::Ignore => Ok(None),
            Self::Critical => Err(SimError::CriticalTrap(trap)),
        }
    }
}

/// The terminal condition of a completed `run` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The instruction budget was exhausted without a halting trap.
    BudgetExhausted,
    /// The trap-handler policy decided to stop the run on this trap.
    Trapped(Trap),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_halts_on_any_trap() {
        let mode = TrapHandlerMode::Stop;
        assert_eq!(mode.apply(Trap::Syscall).unwrap(), Some(Trap::Syscall));
    }

    #[test]
    fn stop_on_halt_ignores_other_traps() {
        let mode = TrapHandlerMode::StopOnHalt;
        assert_eq!(mode.apply(Trap::Syscall).unwrap(), None);
        assert_eq!(mode.apply(Trap::Halt).unwrap(), Some(Trap::Halt));
    }

    #[test]
    fn ignore_clears_every_trap() {
        let mode = TrapHandlerMode::Ignore;
        assert_eq!(mode.apply(Trap::Halt).unwrap(), None);
    }

    #[test]
    fn critical_is_fatal() {
        let mode = TrapHandlerMode::Critical;
        assert!(mode.apply(Trap::Breakpoint).is_err());
    }

    #[test]
    fn no_trap_never_stops() {
        for mode in [
            TrapHandlerMode::Stop,
            TrapHandlerMode::StopOnHalt,
            TrapHandlerMode::Ignore,
            TrapHandlerMode::Critical,
        ] {
            assert_eq!(mode.apply(Trap::NoTrap).unwrap(), None);
        }
    }

    #[test]
    fn unknown_token_rejected() {
        assert!(matches!(
            TrapHandlerMode::parse("bogus"),
            Err(SimError::IncorrectDriver(_))
        ));
    }
}
