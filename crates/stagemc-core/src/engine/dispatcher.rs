use super::config::ClosureAcceptance;
use super::controller::SearchController;
use super::state::{MoveCounters, TrialRecord};
use super::utils::sampling::{self, SamplingError};
use crate::core::closure::Closer;
use crate::core::moves::{Granularity, MoveKind, MoveSpec};
use crate::core::scoring::ScoreFunction;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::trace;

/// Closure settings for one trial.
pub struct ClosureStep<'a, S> {
    pub closer: &'a dyn Closer<S>,
    pub acceptance: ClosureAcceptance,
    pub tolerance: f64,
}

impl<S> Clone for ClosureStep<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for ClosureStep<'_, S> {}

/// Weighted random choice among registered moves, with closure applied to
/// accepted results and per-kind bookkeeping.
#[derive(Debug)]
pub struct MoveDispatcher<S> {
    moves: Vec<MoveSpec<S>>,
    counters: BTreeMap<MoveKind, MoveCounters>,
}

impl<S: Clone> MoveDispatcher<S> {
    pub fn new(moves: Vec<MoveSpec<S>>) -> Self {
        Self {
            moves,
            counters: BTreeMap::new(),
        }
    }

    pub fn moves(&self) -> &[MoveSpec<S>] {
        &self.moves
    }

    pub fn counters(&self) -> &BTreeMap<MoveKind, MoveCounters> {
        &self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters.clear();
    }

    /// Sets the granularity of every registered move of `kind`.
    pub fn set_granularity(&mut self, kind: MoveKind, granularity: Granularity) {
        for spec in self.moves.iter_mut().filter(|m| m.kind == kind) {
            spec.granularity = granularity;
        }
    }

    /// Picks a move index with probability proportional to its weight among
    /// the moves that can act on `state`. `None` when none can.
    pub fn select_move<R: Rng>(
        &self,
        state: &S,
        rng: &mut R,
    ) -> Result<Option<usize>, SamplingError> {
        let excluded = vec![false; self.moves.len()];
        self.select_excluding(state, &excluded, rng)
    }

    fn select_excluding<R: Rng>(
        &self,
        state: &S,
        excluded: &[bool],
        rng: &mut R,
    ) -> Result<Option<usize>, SamplingError> {
        let weights: Vec<f64> = self
            .moves
            .iter()
            .zip(excluded)
            .map(|(spec, &skip)| {
                if skip || spec.weight <= 0.0 || !spec.generator.is_movable(state) {
                    0.0
                } else {
                    spec.weight
                }
            })
            .collect();

        match sampling::weighted_index(&weights, rng) {
            Ok(index) => Ok(Some(index)),
            Err(SamplingError::EmptyWeights | SamplingError::ZeroTotalWeight) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Applies one randomly selected move to `state` without any acceptance
    /// test. Used to randomize a starting conformation.
    pub fn perturb<R: Rng>(&self, state: &S, rng: &mut R) -> Result<Option<S>, SamplingError> {
        let mut excluded = vec![false; self.moves.len()];
        while let Some(index) = self.select_excluding(state, &excluded, rng)? {
            if let Some(next) = self.moves[index].generate(state, &mut *rng) {
                return Ok(Some(next));
            }
            excluded[index] = true;
        }
        Ok(None)
    }

    /// Runs one trial on `controller`. A move whose generator declines is
    /// excluded and another one is drawn, so `None` means no registered move
    /// could act on the current state.
    pub fn apply_trial<F, R>(
        &mut self,
        controller: &mut SearchController<S, F>,
        rng: &mut R,
        closure: Option<ClosureStep<'_, S>>,
    ) -> Result<Option<TrialRecord>, SamplingError>
    where
        F: ScoreFunction<S>,
        R: Rng,
    {
        let mut excluded = vec![false; self.moves.len()];

        loop {
            let Some(index) = self.select_excluding(&controller.current().state, &excluded, rng)?
            else {
                return Ok(None);
            };

            let spec = &self.moves[index];
            let kind = spec.kind;
            let Some(outcome) = controller.propose_and_accept(spec, rng) else {
                trace!(move_kind = %kind, "Generator declined, reselecting");
                excluded[index] = true;
                continue;
            };

            let mut accepted = outcome.accepted;
            let mut closure_failed = false;

            if let (true, Some(step)) = (accepted, closure) {
                let closed = step.closer.close(&controller.current().state);
                if !closed.success || closed.residual_error > step.tolerance {
                    trace!(
                        move_kind = %kind,
                        residual = closed.residual_error,
                        "Closure failed, rolling trial back"
                    );
                    controller.rollback_trial();
                    accepted = false;
                    closure_failed = true;
                } else {
                    match step.acceptance {
                        ClosureAcceptance::Mandatory => {
                            controller.commit_post_processed(closed.state);
                        }
                        ClosureAcceptance::SeparateMetropolis => {
                            controller.consider_post_processed(closed.state, rng);
                        }
                    }
                }
            }

            self.counters
                .entry(kind)
                .or_default()
                .record(accepted, closure_failed);

            return Ok(Some(TrialRecord {
                kind,
                accepted,
                closure_failed,
                delta_score: outcome.delta_score,
                score: controller.current().score,
                best_score: controller.best().score,
            }));
        }
    }
}
