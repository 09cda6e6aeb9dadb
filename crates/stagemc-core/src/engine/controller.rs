use super::state::TrialOutcome;
use super::transaction::TrialUndo;
use super::utils::sampling::metropolis_accept;
use crate::core::candidate::Candidate;
use crate::core::moves::MoveSpec;
use crate::core::scoring::ScoreFunction;
use rand::Rng;
use tracing::trace;

/// Owns the current and best-so-far candidates of one trajectory and makes
/// the Metropolis decisions that move them.
pub struct SearchController<S, F> {
    score_function: F,
    current: Candidate<S>,
    best: Candidate<S>,
    temperature: f64,
    undo: TrialUndo<S>,
}

fn assert_temperature(temperature: f64) {
    assert!(
        temperature.is_finite() && temperature > 0.0,
        "temperature must be positive and finite, got {}",
        temperature
    );
}

impl<S, F> SearchController<S, F>
where
    S: Clone,
    F: ScoreFunction<S>,
{
    /// # Panics
    ///
    /// Panics if `temperature` is not positive and finite.
    pub fn new(score_function: F, initial: Candidate<S>, temperature: f64) -> Self {
        assert_temperature(temperature);
        Self {
            score_function,
            best: initial.clone(),
            current: initial,
            temperature,
            undo: TrialUndo::default(),
        }
    }

    pub fn current(&self) -> &Candidate<S> {
        &self.current
    }

    pub fn best(&self) -> &Candidate<S> {
        &self.best
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn score_function(&self) -> &F {
        &self.score_function
    }

    pub fn score_function_mut(&mut self) -> &mut F {
        &mut self.score_function
    }

    pub fn score(&self, state: &S) -> f64 {
        self.score_function.score(state)
    }

    /// Starts over from `candidate`: current and best become copies of it.
    ///
    /// # Panics
    ///
    /// Panics if `temperature` is not positive and finite.
    pub fn reset(&mut self, candidate: Candidate<S>, temperature: f64) {
        assert_temperature(temperature);
        self.undo.clear();
        self.best = candidate.clone();
        self.current = candidate;
        self.temperature = temperature;
    }

    /// # Panics
    ///
    /// Panics if `temperature` is not positive and finite.
    pub fn set_temperature(&mut self, temperature: f64) {
        assert_temperature(temperature);
        self.temperature = temperature;
    }

    /// Generates a proposal from `spec` and runs it through [`Self::consider`].
    ///
    /// Returns `None` when the generator declined to move, in which case
    /// nothing changed and no trial happened.
    pub fn propose_and_accept<R: Rng>(
        &mut self,
        spec: &MoveSpec<S>,
        rng: &mut R,
    ) -> Option<TrialOutcome> {
        let proposal = spec.generate(&self.current.state, &mut *rng)?;
        Some(self.consider(proposal, rng))
    }

    /// Metropolis decision on a proposed state. Starts a new trial, so the
    /// previous trial can no longer be rolled back.
    pub fn consider<R: Rng + ?Sized>(&mut self, state: S, rng: &mut R) -> TrialOutcome {
        self.undo.clear();
        self.decide(state, rng)
    }

    /// Metropolis decision on a post-processed version of the trial result,
    /// within the same trial.
    pub fn consider_post_processed<R: Rng + ?Sized>(
        &mut self,
        state: S,
        rng: &mut R,
    ) -> TrialOutcome {
        self.decide(state, rng)
    }

    fn decide<R: Rng + ?Sized>(&mut self, state: S, rng: &mut R) -> TrialOutcome {
        let score = self.score_function.score(&state);
        let delta = score - self.current.score;
        let accepted = score.is_finite() && metropolis_accept(delta, self.temperature, rng);
        trace!(score, delta, accepted, "Metropolis decision");

        if accepted {
            let next = self.current.successor(state, score);
            let previous = std::mem::replace(&mut self.current, next);
            self.undo.stash_current(previous);
            self.promote_if_lower();
        }

        TrialOutcome {
            accepted,
            delta_score: delta,
            score_after: self.current.score,
        }
    }

    fn promote_if_lower(&mut self) {
        if self.current.is_lower_than(&self.best) {
            let previous = std::mem::replace(&mut self.best, self.current.clone());
            self.undo.stash_best(previous);
        }
    }

    /// Replaces current with a post-processed version of this trial's result,
    /// without a Metropolis test. Any best update made by the unprocessed
    /// result is undone first.
    pub fn commit_post_processed(&mut self, state: S) -> f64 {
        if let Some(previous_best) = self.undo.take_best() {
            self.best = previous_best;
        }
        let score = self.score_function.score(&state);
        let next = self.current.successor(state, score);
        let previous = std::mem::replace(&mut self.current, next);
        self.undo.stash_current(previous);
        self.promote_if_lower();
        score
    }

    /// Restores current and best to their values before the last trial.
    /// Returns whether anything was restored.
    pub fn rollback_trial(&mut self) -> bool {
        let mut restored = false;
        if let Some(previous) = self.undo.take_current() {
            self.current = previous;
            restored = true;
        }
        if let Some(previous) = self.undo.take_best() {
            self.best = previous;
            restored = true;
        }
        restored
    }

    /// Unconditionally makes `state` both current and best, e.g. after heat-up
    /// or a final closure.
    pub fn adopt(&mut self, state: S) -> f64 {
        self.undo.clear();
        let score = self.score_function.score(&state);
        self.current = self.current.successor(state, score);
        self.best = self.current.clone();
        score
    }

    /// current := copy of best. A no-op when they already agree.
    pub fn recover_low(&mut self) {
        self.undo.clear();
        if self.current == self.best {
            return;
        }
        self.current = self.best.clone();
    }

    /// Re-evaluates current and best after the weight table changed.
    pub fn rescore(&mut self) {
        self.undo.clear();
        self.current.score = self.score_function.score(&self.current.state);
        self.best.score = self.score_function.score(&self.best.state);
        if self.current.is_lower_than(&self.best) {
            self.best = self.current.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moves::{Granularity, MoveKind};
    use crate::core::scoring::WeightedScoreFunction;
    use rand::{RngCore, SeedableRng, rngs::StdRng};

    fn identity_score() -> WeightedScoreFunction<f64> {
        WeightedScoreFunction::new().with_term("energy", 1.0, |s: &f64| *s)
    }

    fn controller_at(
        score: f64,
        temperature: f64,
    ) -> SearchController<f64, WeightedScoreFunction<f64>> {
        SearchController::new(identity_score(), Candidate::new(score, score), temperature)
    }

    fn constant_move(value: f64) -> MoveSpec<f64> {
        MoveSpec::new(
            MoveKind::Fragment,
            1.0,
            move |_: &f64, _: &Granularity, _: &mut dyn RngCore| Some(value),
        )
    }

    #[test]
    fn reset_copies_candidate_into_current_and_best() {
        let mut controller = controller_at(5.0, 1.0);
        controller.reset(Candidate::new(3.0, 3.0), 2.0);
        assert_eq!(controller.current().score, 3.0);
        assert_eq!(controller.best().score, 3.0);
        assert_eq!(controller.temperature(), 2.0);
    }

    #[test]
    #[should_panic(expected = "temperature must be positive")]
    fn reset_panics_on_zero_temperature() {
        let mut controller = controller_at(5.0, 1.0);
        controller.reset(Candidate::new(3.0, 3.0), 0.0);
    }

    #[test]
    #[should_panic(expected = "temperature must be positive")]
    fn set_temperature_panics_on_nan() {
        controller_at(5.0, 1.0).set_temperature(f64::NAN);
    }

    #[test]
    fn downhill_proposal_is_accepted_and_becomes_best() {
        let mut controller = controller_at(100.0, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = controller
            .propose_and_accept(&constant_move(90.0), &mut rng)
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.delta_score, -10.0);
        assert_eq!(outcome.score_after, 90.0);
        assert_eq!(controller.best().score, 90.0);
        assert_eq!(controller.current().generation, 1);
    }

    #[test]
    fn steep_uphill_proposal_is_rejected_at_low_temperature() {
        let mut controller = controller_at(100.0, 0.001);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let outcome = controller
                .propose_and_accept(&constant_move(110.0), &mut rng)
                .unwrap();
            assert!(!outcome.accepted);
        }
        assert_eq!(controller.current().score, 100.0);
        assert_eq!(controller.best().score, 100.0);
    }

    #[test]
    fn non_finite_proposals_are_rejected() {
        let mut controller = controller_at(1.0, 1e6);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(!controller.consider(f64::NAN, &mut rng).accepted);
        assert!(!controller.consider(f64::INFINITY, &mut rng).accepted);
        assert_eq!(controller.current().score, 1.0);
    }

    #[test]
    fn declined_generator_is_not_a_trial() {
        let mut controller = controller_at(1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        let declining = MoveSpec::new(
            MoveKind::Chunk,
            1.0,
            |_: &f64, _: &Granularity, _: &mut dyn RngCore| None,
        );
        assert!(controller.propose_and_accept(&declining, &mut rng).is_none());
        assert_eq!(controller.current().generation, 0);
    }

    #[test]
    fn uphill_acceptance_keeps_best_unchanged() {
        let mut controller = controller_at(0.0, 1e9);
        let mut rng = StdRng::seed_from_u64(9);
        let outcome = controller.consider(1.0, &mut rng);
        assert!(outcome.accepted);
        assert_eq!(controller.current().score, 1.0);
        assert_eq!(controller.best().score, 0.0);
    }

    #[test]
    fn recover_low_restores_best_and_is_idempotent() {
        let mut controller = controller_at(0.0, 1e9);
        let mut rng = StdRng::seed_from_u64(9);
        controller.consider(4.0, &mut rng);
        controller.recover_low();
        assert_eq!(controller.current().score, 0.0);
        let generation = controller.current().generation;
        controller.recover_low();
        assert_eq!(controller.current().score, 0.0);
        assert_eq!(controller.current().generation, generation);
        assert!(controller.current() == controller.best());
    }

    #[test]
    fn rollback_restores_current_and_best() {
        let mut controller = controller_at(10.0, 1.0);
        let mut rng = StdRng::seed_from_u64(2);
        controller.consider(5.0, &mut rng);
        assert_eq!(controller.best().score, 5.0);
        assert!(controller.rollback_trial());
        assert_eq!(controller.current().score, 10.0);
        assert_eq!(controller.best().score, 10.0);
        assert!(!controller.rollback_trial());
    }

    #[test]
    fn rollback_spans_post_processing_within_one_trial() {
        let mut controller = controller_at(10.0, 1.0);
        let mut rng = StdRng::seed_from_u64(2);
        controller.consider(6.0, &mut rng);
        controller.consider_post_processed(4.0, &mut rng);
        assert_eq!(controller.best().score, 4.0);
        controller.rollback_trial();
        assert_eq!(controller.current().score, 10.0);
        assert_eq!(controller.best().score, 10.0);
    }

    #[test]
    fn commit_post_processed_undoes_premature_best_update() {
        let mut controller = controller_at(10.0, 1.0);
        let mut rng = StdRng::seed_from_u64(2);
        controller.consider(5.0, &mut rng);
        let score = controller.commit_post_processed(12.0);
        assert_eq!(score, 12.0);
        assert_eq!(controller.current().score, 12.0);
        assert_eq!(controller.best().score, 10.0);
        assert_eq!(controller.current().generation, 2);
    }

    #[test]
    fn rescore_follows_new_weights() {
        let mut controller = controller_at(3.0, 1.0);
        controller
            .score_function_mut()
            .set_weight("energy", 2.0)
            .unwrap();
        controller.rescore();
        assert_eq!(controller.current().score, 6.0);
        assert_eq!(controller.best().score, 6.0);
    }

    #[test]
    fn adopt_replaces_current_and_best() {
        let mut controller = controller_at(3.0, 1.0);
        let score = controller.adopt(7.0);
        assert_eq!(score, 7.0);
        assert_eq!(controller.best().state, 7.0);
        assert_eq!(controller.current().state, 7.0);
    }

    #[test]
    fn best_is_monotone_under_random_walk() {
        let mut controller = controller_at(0.0, 1.0);
        let mut rng = StdRng::seed_from_u64(77);
        let mut last_best = controller.best().score;
        for _ in 0..2000 {
            let step: f64 = rng.gen_range(-1.0..1.0);
            let proposal = controller.current().state + step;
            controller.consider(proposal, &mut rng);
            assert!(controller.best().score <= last_best);
            assert!(controller.best().score <= controller.current().score);
            last_best = controller.best().score;
        }
    }
}
