use crate::core::candidate::Candidate;
use crate::core::moves::MoveKind;
use std::collections::BTreeMap;

/// Ephemeral result of a single Metropolis decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOutcome {
    pub accepted: bool,
    pub delta_score: f64,
    /// Score of the current candidate after the decision.
    pub score_after: f64,
}

/// One completed dispatcher trial, as seen by progress reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub kind: MoveKind,
    pub accepted: bool,
    pub closure_failed: bool,
    pub delta_score: f64,
    pub score: f64,
    pub best_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveCounters {
    pub accepted: u64,
    pub rejected: u64,
    /// Trials rejected because closure failed; also counted in `rejected`.
    pub closure_failures: u64,
}

impl MoveCounters {
    pub fn trials(&self) -> u64 {
        self.accepted + self.rejected
    }

    pub fn acceptance_rate(&self) -> f64 {
        match self.trials() {
            0 => 0.0,
            n => self.accepted as f64 / n as f64,
        }
    }

    pub(crate) fn record(&mut self, accepted: bool, closure_failed: bool) {
        if accepted {
            self.accepted += 1;
        } else {
            self.rejected += 1;
        }
        if closure_failed {
            self.closure_failures += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointFailure {
    pub attempt: usize,
    /// `None` for the final checkpoint.
    pub round: Option<usize>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    /// Per-kind counters accumulated over every attempt.
    pub counters: BTreeMap<MoveKind, MoveCounters>,
    pub attempts: usize,
    pub final_score: f64,
    pub checkpoints_passed: usize,
    pub checkpoint_failures: Vec<CheckpointFailure>,
    pub total_trials: u64,
    pub budget_exhausted: bool,
    /// Whether the returned candidate passed all of its checkpoints.
    pub converged: bool,
}

impl Diagnostics {
    pub fn accepted(&self) -> u64 {
        self.counters.values().map(|c| c.accepted).sum()
    }

    pub fn rejected(&self) -> u64 {
        self.counters.values().map(|c| c.rejected).sum()
    }

    pub fn closure_failures(&self) -> u64 {
        self.counters.values().map(|c| c.closure_failures).sum()
    }

    pub fn counters_for(&self, kind: MoveKind) -> MoveCounters {
        self.counters.get(&kind).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct TrajectoryResult<S> {
    pub candidate: Candidate<S>,
    pub diagnostics: Diagnostics,
}

impl<S> TrajectoryResult<S> {
    pub fn score(&self) -> f64 {
        self.candidate.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_accepts_rejects_and_closure_failures() {
        let mut counters = MoveCounters::default();
        counters.record(true, false);
        counters.record(false, true);
        counters.record(false, false);
        assert_eq!(counters.accepted, 1);
        assert_eq!(counters.rejected, 2);
        assert_eq!(counters.closure_failures, 1);
        assert_eq!(counters.trials(), 3);
        assert!((counters.acceptance_rate() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn acceptance_rate_of_empty_counters_is_zero() {
        assert_eq!(MoveCounters::default().acceptance_rate(), 0.0);
    }

    #[test]
    fn diagnostics_sum_over_kinds() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.counters.insert(
            MoveKind::Fragment,
            MoveCounters {
                accepted: 3,
                rejected: 4,
                closure_failures: 1,
            },
        );
        diagnostics.counters.insert(
            MoveKind::Jump,
            MoveCounters {
                accepted: 2,
                rejected: 1,
                closure_failures: 0,
            },
        );
        assert_eq!(diagnostics.accepted(), 5);
        assert_eq!(diagnostics.rejected(), 5);
        assert_eq!(diagnostics.closure_failures(), 1);
        assert_eq!(diagnostics.counters_for(MoveKind::Chunk), MoveCounters::default());
    }
}
