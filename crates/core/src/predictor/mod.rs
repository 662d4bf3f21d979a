//! Branch prediction unit.
//!
//! Grounded on the original simulator's `infra/bpucache/bpucache.h` (a
//! vector of per-set `LRUTagCache<Addr, uint32>`) and `modules/branch/branch.h`
//! (misprediction detection against the `BPInterface` the predictor is
//! trained with). Storage is a single [`LRUTagCache`] keyed by PC; the six
//! policy modes differ only in what per-entry state they keep and how they
//! read it back as a direction.

use crate::cache::LRUTagCache;
use crate::common::{Addr, SimError};
use tracing::debug;

/// Selects which state machine a [`BranchPredictor`] uses per entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictorMode {
    /// Always predicts taken; target is the last trained target, else `pc+4`.
    AlwaysTaken,
    /// Never predicts taken; target is always `pc+4`.
    AlwaysNotTaken,
    /// Predicts taken iff the last trained target is less than `pc`.
    BackwardJumps,
    /// 1-bit directional flip-flop; target replaced on every update.
    SaturatingOneBit,
    /// 2-bit saturating counter (0..=3), taken iff the counter is ≥ 2.
    SaturatingTwoBits,
    /// Classic two-level adaptive: a 2-bit per-entry history indexes a
    /// 4-entry table of 2-bit local saturating counters.
    AdaptiveTwoLevels,
}

impl PredictorMode {
    /// Parses a predictor mode token as accepted by the CLI surface.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidMode`] for an unrecognized token.
    pub fn parse(token: &str) -> Result<Self, SimError> {
        match token {
            "always_taken" => Ok(Self::AlwaysTaken),
            "always_not_taken" => Ok(Self::AlwaysNotTaken),
            "backward_jumps" => Ok(Self::BackwardJumps),
            "saturating_one_bit" => Ok(Self::SaturatingOneBit),
            "saturating_two_bits" => Ok(Self::SaturatingTwoBits),
            "adaptive_two_levels" => Ok(Self::AdaptiveTwoLevels),
            other => Err(SimError::InvalidMode(other.to_string())),
        }
    }
}

/// Per-entry predictor state. Which fields a mode reads or writes depends on
/// the owning [`BranchPredictor`]'s configured mode.
#[derive(Clone, Copy, Debug, Default)]
struct Entry {
    target: Addr,
    /// `saturating_one_bit`: 0/1 flip-flop. `saturating_two_bits`: 0..=3 counter.
    counter: u8,
    /// `adaptive_two_levels`: 2-bit branch history selecting `local`.
    history: u8,
    /// `adaptive_two_levels`: four 2-bit local saturating counters.
    local: [u8; 4],
}

/// `(pc, is_taken, target, was_hit)`, used to train the predictor after a
/// branch resolves.
pub type BpInterface = (Addr, bool, Addr, bool);

/// A set-associative branch predictor over one of six policy modes.
pub struct BranchPredictor {
    mode: PredictorMode,
    cache: LRUTagCache<Addr, Entry>,
}

impl BranchPredictor {
    /// Builds a predictor with `num_sets` sets of `ways` ways each.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidMode`] for an unrecognized mode token.
    pub fn new(mode: &str, num_sets: usize, ways: usize) -> Result<Self, SimError> {
        let mode = PredictorMode::parse(mode)?;
        debug!(?mode, num_sets, ways, "branch predictor constructed");
        Ok(Self {
            mode,
            cache: LRUTagCache::new(num_sets, ways),
        })
    }

    /// True iff `pc` currently has a trained entry.
    pub fn is_hit(&mut self, pc: Addr) -> bool {
        self.cache.lookup(&pc).is_some()
    }

    /// Predicted direction for a branch at `pc`.
    pub fn is_taken(&mut self, pc: Addr) -> bool {
        let Some(entry) = self.cache.lookup(&pc).copied() else {
            return false;
        };
        match self.mode {
            PredictorMode::AlwaysTaken => true,
            PredictorMode::AlwaysNotTaken => false,
            PredictorMode::BackwardJumps => entry.target.val() < pc.val(),
            PredictorMode::SaturatingOneBit => entry.counter != 0,
            PredictorMode::SaturatingTwoBits => entry.counter >= 2,
            PredictorMode::AdaptiveTwoLevels => entry.local[entry.history as usize] >= 2,
        }
    }

    /// Predicted target for a branch at `pc`. Falls back to `pc + 4` when
    /// there is no trained entry, or when the mode always falls through.
    pub fn get_target(&mut self, pc: Addr) -> Addr {
        if self.mode == PredictorMode::AlwaysNotTaken {
            return pc.wrapping_add(4);
        }
        self.cache
            .lookup(&pc)
            .map_or_else(|| pc.wrapping_add(4), |entry| entry.target)
    }

    /// Trains the predictor with the resolved outcome of a branch.
    pub fn update(&mut self, pc: Addr, taken: bool, target: Addr, was_hit: bool) {
        let mut entry = if was_hit {
            self.cache.lookup(&pc).copied().unwrap_or_default()
        } else {
            Entry::default()
        };
        entry.target = target;
        match self.mode {
            PredictorMode::AlwaysTaken | PredictorMode::AlwaysNotTaken | PredictorMode::BackwardJumps => {}
            PredictorMode::SaturatingOneBit => entry.counter = u8::from(taken),
            PredictorMode::SaturatingTwoBits => {
                entry.counter = if entry.counter == 0 && !was_hit {
                    1
                } else {
                    entry.counter
                };
                if taken {
                    entry.counter = entry.counter.saturating_add(1).min(3);
                } else {
                    entry.counter = entry.counter.saturating_sub(1);
                }
            }
            PredictorMode::AdaptiveTwoLevels => {
                let idx = entry.history as usize;
                if taken {
                    entry.local[idx] = entry.local[idx].saturating_add(1).min(3);
                } else {
                    entry.local[idx] = entry.local[idx].saturating_sub(1);
                }
                entry.history = ((entry.history << 1) | u8::from(taken)) & 0b11;
            }
        }
        self.cache.insert(pc, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mode_rejected() {
        assert!(matches!(
            BranchPredictor::new("bogus", 4, 2),
            Err(SimError::InvalidMode(_))
        ));
    }

    #[test]
    fn always_taken_predicts_taken_on_hit() {
        let mut bp = BranchPredictor::new("always_taken", 4, 2).unwrap();
        bp.update(Addr::new(12), true, Addr::new(28), false);
        assert!(bp.is_taken(Addr::new(12)));
        assert_eq!(bp.get_target(Addr::new(12)), Addr::new(28));
    }

    #[test]
    fn always_not_taken_never_taken() {
        let mut bp = BranchPredictor::new("always_not_taken", 4, 2).unwrap();
        bp.update(Addr::new(12), true, Addr::new(28), false);
        assert!(!bp.is_taken(Addr::new(12)));
        assert_eq!(bp.get_target(Addr::new(12)), Addr::new(16));
    }

    #[test]
    fn backward_jumps_taken_iff_target_less_than_pc() {
        let mut bp = BranchPredictor::new("backward_jumps", 4, 2).unwrap();
        bp.update(Addr::new(100), true, Addr::new(40), false);
        assert!(bp.is_taken(Addr::new(100)));
        bp.update(Addr::new(100), true, Addr::new(200), true);
        assert!(!bp.is_taken(Addr::new(100)));
    }

    #[test]
    fn saturating_two_bits_matches_scenario() {
        let mut bp = BranchPredictor::new("saturating_two_bits", 4, 2).unwrap();
        let pc = Addr::new(12);
        let target = Addr::new(28);
        bp.update(pc, true, target, false);
        bp.update(pc, true, target, true);
        bp.update(pc, false, target, true);
        bp.update(pc, false, target, true);
        bp.update(pc, false, target, true);
        bp.update(pc, false, target, true);
        assert!(!bp.is_taken(pc));
        bp.update(pc, true, target, true);
        assert!(!bp.is_taken(pc));
        bp.update(pc, true, target, true);
        assert!(bp.is_taken(pc));
        assert_eq!(bp.get_target(pc), target);
    }

    #[test]
    fn saturating_two_bits_monotone_on_cold_entry() {
        let mut bp = BranchPredictor::new("saturating_two_bits", 4, 2).unwrap();
        let pc = Addr::new(0);
        let mut hit = false;
        for _ in 0..4 {
            bp.update(pc, true, Addr::new(4), hit);
            hit = true;
        }
        assert!(bp.is_taken(pc));
        for _ in 0..4 {
            bp.update(pc, false, Addr::new(4), true);
        }
        assert!(!bp.is_taken(pc));
    }

    #[test]
    fn saturating_one_bit_tracks_last_update() {
        let mut bp = BranchPredictor::new("saturating_one_bit", 4, 2).unwrap();
        let pc = Addr::new(8);
        bp.update(pc, true, Addr::new(16), false);
        assert!(bp.is_taken(pc));
        bp.update(pc, false, Addr::new(12), true);
        assert!(!bp.is_taken(pc));
    }

    #[test]
    fn adaptive_two_levels_learns_alternating_pattern() {
        let mut bp = BranchPredictor::new("adaptive_two_levels", 4, 2).unwrap();
        let pc = Addr::new(40);
        let mut hit = false;
        for i in 0..8 {
            let taken = i % 2 == 0;
            bp.update(pc, taken, Addr::new(64), hit);
            hit = true;
        }
        assert!(bp.is_hit(pc));
    }
}
