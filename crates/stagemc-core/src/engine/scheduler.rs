use super::config::{ClosurePolicy, ConfigError, ExhaustionPolicy, ScheduleConfig};
use super::controller::SearchController;
use super::dispatcher::{ClosureStep, MoveDispatcher};
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use super::state::{CheckpointFailure, Diagnostics, TrajectoryResult};
use crate::core::candidate::Candidate;
use crate::core::closure::Closer;
use crate::core::filters::QualityFilter;
use crate::core::moves::MoveSpec;
use crate::core::scoring::ScoreFunction;
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

/// When a checkpoint is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointRound {
    /// After round 2, or round 1 of a single-round schedule.
    Early,
    /// After round `R / 2`, or round 1 of a single-round schedule.
    Halfway,
    At(usize),
    /// After the last round and the optional end-of-run closure.
    Final,
}

impl CheckpointRound {
    /// The round this checkpoint follows; `None` for [`CheckpointRound::Final`].
    pub fn resolve(&self, rounds: usize) -> Option<usize> {
        match *self {
            CheckpointRound::Early => Some(if rounds == 1 { 1 } else { 2 }),
            CheckpointRound::Halfway => Some(if rounds == 1 { 1 } else { rounds / 2 }),
            CheckpointRound::At(n) => Some(n),
            CheckpointRound::Final => None,
        }
    }
}

pub struct Checkpoint<'r, S> {
    pub round: CheckpointRound,
    pub tolerance: f64,
    filter: Box<dyn QualityFilter<S> + 'r>,
}

enum AttemptEnd {
    Passed,
    Failed { round: Option<usize>, reason: String },
    OutOfBudget,
}

/// Drives one trajectory: nested rounds and cycles of dispatcher trials,
/// parameter ramps between rounds, checkpoints with bounded retry.
pub struct RoundScheduler<'r, S, F, R> {
    config: ScheduleConfig,
    score_function: F,
    dispatcher: MoveDispatcher<S>,
    rng: R,
    closer: Option<Box<dyn Closer<S> + 'r>>,
    checkpoints: Vec<Checkpoint<'r, S>>,
    reporter: Option<&'r ProgressReporter<'r>>,
    final_weights: BTreeMap<String, f64>,
}

impl<'r, S, F, R> RoundScheduler<'r, S, F, R>
where
    S: Clone,
    F: ScoreFunction<S>,
    R: Rng,
{
    pub fn new(
        config: ScheduleConfig,
        score_function: F,
        moves: Vec<MoveSpec<S>>,
        rng: R,
    ) -> Result<Self, ConfigError> {
        if moves.is_empty() {
            return Err(ConfigError::NoMoves);
        }
        if let Some(bad) = moves
            .iter()
            .find(|m| !m.weight.is_finite() || m.weight < 0.0)
        {
            return Err(ConfigError::InvalidMoveWeight {
                kind: bad.kind,
                weight: bad.weight,
            });
        }
        if moves.iter().all(|m| m.weight == 0.0) {
            return Err(ConfigError::AllMoveWeightsZero);
        }

        let mut final_weights = BTreeMap::new();
        for (term, ramp) in &config.weight_ramps {
            let configured = score_function
                .weight(term)
                .ok_or_else(|| ConfigError::UnknownTerm(term.clone()))?;
            let target = ramp.target.unwrap_or(configured);
            ramp.validate(target)
                .map_err(|reason| ConfigError::InvalidRamp {
                    term: term.clone(),
                    reason,
                })?;
            final_weights.insert(term.clone(), target);
        }

        Ok(Self {
            config,
            score_function,
            dispatcher: MoveDispatcher::new(moves),
            rng,
            closer: None,
            checkpoints: Vec::new(),
            reporter: None,
            final_weights,
        })
    }

    pub fn with_closer(mut self, closer: impl Closer<S> + 'r) -> Self {
        self.closer = Some(Box::new(closer));
        self
    }

    pub fn with_checkpoint(
        mut self,
        round: CheckpointRound,
        tolerance: f64,
        filter: impl QualityFilter<S> + 'r,
    ) -> Result<Self, ConfigError> {
        let rounds = self.config.rounds;
        if let CheckpointRound::At(n) = round {
            if n == 0 || n > rounds {
                return Err(ConfigError::CheckpointOutOfRange { round: n, rounds });
            }
        }
        if tolerance.is_nan() {
            return Err(ConfigError::InvalidParameter {
                name: "tolerance",
                reason: "checkpoint tolerance is NaN".to_string(),
            });
        }
        self.checkpoints.push(Checkpoint {
            round,
            tolerance,
            filter: Box::new(filter),
        });
        Ok(self)
    }

    pub fn with_reporter(mut self, reporter: &'r ProgressReporter<'r>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn score_function(&self) -> &F {
        &self.score_function
    }

    #[instrument(skip_all, name = "trajectory")]
    pub fn run_trajectory(&mut self, initial: S) -> Result<TrajectoryResult<S>, EngineError> {
        if self.config.needs_closer() && self.closer.is_none() {
            return Err(ConfigError::MissingParameter("closer").into());
        }
        self.dispatcher.reset_counters();

        let Self {
            config,
            score_function,
            dispatcher,
            rng,
            closer,
            checkpoints,
            reporter,
            final_weights,
        } = self;

        let initial_score = score_function.score(&initial);
        let initial = Candidate::new(initial, initial_score);
        info!(
            rounds = config.rounds,
            cycles_per_round = config.cycles_per_round(),
            max_tries = config.max_tries,
            initial_score,
            "Starting staged Monte Carlo trajectory."
        );

        let run = TrajectoryRun {
            config,
            controller: SearchController::new(
                score_function,
                initial.clone(),
                config.temperature.initial(),
            ),
            dispatcher,
            rng,
            closer: closer.as_deref(),
            checkpoints,
            reporter: *reporter,
            final_weights,
            diagnostics: Diagnostics::default(),
            started: Instant::now(),
        };
        run.execute(&initial)
    }
}

struct TrajectoryRun<'a, S, F, R> {
    config: &'a ScheduleConfig,
    controller: SearchController<S, &'a mut F>,
    dispatcher: &'a mut MoveDispatcher<S>,
    rng: &'a mut R,
    closer: Option<&'a dyn Closer<S>>,
    checkpoints: &'a [Checkpoint<'a, S>],
    reporter: Option<&'a ProgressReporter<'a>>,
    final_weights: &'a BTreeMap<String, f64>,
    diagnostics: Diagnostics,
    started: Instant,
}

impl<S, F, R> TrajectoryRun<'_, S, F, R>
where
    S: Clone,
    F: ScoreFunction<S>,
    R: Rng,
{
    fn report(&self, event: impl FnOnce() -> Progress) {
        if let Some(reporter) = self.reporter.filter(|r| r.is_active()) {
            reporter.report(event());
        }
    }

    fn execute(mut self, initial: &Candidate<S>) -> Result<TrajectoryResult<S>, EngineError> {
        let max_tries = self.config.max_tries;
        let exhaustion = self.config.exhaustion;
        let mut kept: Option<Candidate<S>> = None;
        let mut last_reason = String::new();

        for attempt in 1..=max_tries {
            self.diagnostics.attempts = attempt;
            debug!(attempt, max_tries, "Starting attempt.");
            self.report(|| Progress::AttemptStart { attempt, max_tries });

            match self.run_attempt(initial)? {
                AttemptEnd::Passed => {
                    self.diagnostics.converged = true;
                    let candidate = self.controller.best().clone();
                    return Ok(self.finish(candidate));
                }
                AttemptEnd::OutOfBudget => {
                    warn!(
                        attempt,
                        trials = self.diagnostics.total_trials,
                        "Search budget exhausted, stopping without retry."
                    );
                    self.diagnostics.budget_exhausted = true;
                    self.report(|| {
                        Progress::Message(format!(
                            "Search budget exhausted after {} trials",
                            self.diagnostics.total_trials
                        ))
                    });
                    self.controller.recover_low();
                    let candidate = self.settle_attempt()?;
                    let candidate = match kept {
                        Some(previous)
                            if exhaustion == ExhaustionPolicy::KeepBest
                                && previous.is_lower_than(&candidate) =>
                        {
                            previous
                        }
                        _ => candidate,
                    };
                    return Ok(self.finish(candidate));
                }
                AttemptEnd::Failed { round, reason } => {
                    info!(attempt, ?round, %reason, "Attempt failed a checkpoint.");
                    self.diagnostics.checkpoint_failures.push(CheckpointFailure {
                        attempt,
                        round,
                        reason: reason.clone(),
                    });
                    last_reason = reason;

                    let candidate = self.settle_attempt()?;
                    if exhaustion == ExhaustionPolicy::KeepLast
                        || kept
                            .as_ref()
                            .is_none_or(|previous| candidate.is_lower_than(previous))
                    {
                        kept = Some(candidate);
                    }
                }
            }
        }

        warn!(
            attempts = max_tries,
            reason = %last_reason,
            policy = ?exhaustion,
            "Every attempt failed its checkpoints."
        );
        match (exhaustion, kept) {
            (ExhaustionPolicy::Strict, _) => Err(EngineError::NotConverged {
                attempts: max_tries,
                last_reason,
            }),
            (_, Some(candidate)) => Ok(self.finish(candidate)),
            (_, None) => Err(EngineError::Internal(
                "no attempt produced a candidate".to_string(),
            )),
        }
    }

    fn run_attempt(&mut self, initial: &Candidate<S>) -> Result<AttemptEnd, EngineError> {
        let config = self.config;
        let rounds = config.rounds;
        let cycles = config.cycles_per_round();

        self.controller
            .reset(initial.clone(), config.temperature.initial());
        self.apply_granularity(1);
        self.heat_up()?;
        if config.closure == ClosurePolicy::EveryMove {
            self.close_and_adopt("initial");
        }

        for round in 1..=rounds {
            self.ramp(round)?;
            let temperature = self.controller.temperature();
            debug!(
                round,
                rounds,
                temperature,
                score = self.controller.current().score,
                "Starting round."
            );
            self.report(|| Progress::RoundStart {
                round,
                rounds,
                temperature,
            });

            let closure = if config.closure.is_active(round, rounds) {
                self.closer.map(|closer| ClosureStep {
                    closer,
                    acceptance: config.closure_acceptance,
                    tolerance: config.closure_tolerance,
                })
            } else {
                None
            };

            for cycle in 0..cycles {
                if config.temperature.is_ladder() {
                    self.controller
                        .set_temperature(config.temperature.at_cycle(cycle, cycles));
                }

                let record =
                    self.dispatcher
                        .apply_trial(&mut self.controller, &mut *self.rng, closure)?;
                let Some(record) = record else {
                    warn!(round, "No registered move can act on the current state.");
                    self.report(|| {
                        Progress::Message(format!("Round {} ended early: no movable move", round))
                    });
                    break;
                };

                self.diagnostics.total_trials += 1;
                trace!(
                    round,
                    cycle,
                    move_kind = %record.kind,
                    accepted = record.accepted,
                    closure_failed = record.closure_failed,
                    score = record.score,
                    best = record.best_score,
                    "Trial completed."
                );
                self.report(|| Progress::Trial(record));

                if self.budget_exhausted() {
                    return Ok(AttemptEnd::OutOfBudget);
                }
            }

            self.controller.recover_low();
            if let Some(reason) = self.run_checkpoints(Some(round)) {
                return Ok(AttemptEnd::Failed {
                    round: Some(round),
                    reason,
                });
            }
        }

        self.controller.recover_low();
        if config.close_at_end {
            self.close_and_adopt("final");
        }

        Ok(match self.run_checkpoints(None) {
            Some(reason) => AttemptEnd::Failed {
                round: None,
                reason,
            },
            None => AttemptEnd::Passed,
        })
    }

    fn ramp(&mut self, round: usize) -> Result<(), EngineError> {
        let config = self.config;
        let final_weights = self.final_weights;

        for (term, ramp) in &config.weight_ramps {
            let target = final_weights.get(term).copied().ok_or_else(|| {
                EngineError::Internal(format!("no final weight recorded for term '{}'", term))
            })?;
            let weight = ramp.weight_at(target, round, config.rounds);
            self.controller
                .score_function_mut()
                .set_weight(term, weight)?;
            debug!(round, term = %term, weight, "Ramped score weight.");
        }

        self.apply_granularity(round);
        self.controller.set_temperature(config.temperature.initial());
        self.controller.rescore();
        if config.recover_low_each_round {
            self.controller.recover_low();
        }
        Ok(())
    }

    fn apply_granularity(&mut self, round: usize) {
        let config = self.config;
        for (kind, schedule) in &config.granularity {
            let granularity = schedule.at(round, config.rounds);
            debug!(round, move_kind = %kind, %granularity, "Set move granularity.");
            self.dispatcher.set_granularity(*kind, granularity);
        }
    }

    fn heat_up(&mut self) -> Result<(), EngineError> {
        let heat_cycles = self.config.heat_cycles;
        if heat_cycles == 0 {
            return Ok(());
        }

        let mut state = self.controller.current().state.clone();
        let mut applied = 0;
        while applied < heat_cycles {
            match self.dispatcher.perturb(&state, &mut *self.rng)? {
                Some(next) => state = next,
                None => break,
            }
            applied += 1;
        }
        let score = self.controller.adopt(state);
        debug!(applied, score, "Heat-up finished.");
        Ok(())
    }

    fn close_and_adopt(&mut self, stage: &'static str) {
        let Some(closer) = self.closer else {
            return;
        };
        let closed = closer.close(&self.controller.current().state);
        if closed.success {
            let score = self.controller.adopt(closed.state);
            debug!(stage, score, residual = closed.residual_error, "Closed chain.");
        } else {
            debug!(
                stage,
                residual = closed.residual_error,
                "Closure failed, keeping the open chain."
            );
        }
    }

    fn run_checkpoints(&mut self, round: Option<usize>) -> Option<String> {
        let checkpoints = self.checkpoints;
        let rounds = self.config.rounds;

        for checkpoint in checkpoints
            .iter()
            .filter(|c| c.round.resolve(rounds) == round)
        {
            let result = checkpoint
                .filter
                .check(self.controller.best(), checkpoint.tolerance);
            debug!(
                ?round,
                filter = checkpoint.filter.name(),
                passed = result.passed,
                reason = %result.reason,
                "Checkpoint evaluated."
            );
            let passed = result.passed;
            let reason = format!("{}: {}", checkpoint.filter.name(), result.reason);
            self.report(|| Progress::Checkpoint {
                round,
                passed,
                reason: result.reason,
            });

            if !passed {
                return Some(reason);
            }
            self.diagnostics.checkpoints_passed += 1;
        }
        None
    }

    fn budget_exhausted(&self) -> bool {
        let budget = &self.config.budget;
        budget
            .max_trials
            .is_some_and(|max| self.diagnostics.total_trials >= max)
            || budget
                .max_wall_time
                .is_some_and(|limit| self.started.elapsed() >= limit)
    }

    /// The recovered low of the attempt, scored with the final weights so
    /// candidates from different attempts compare on the same scale.
    fn settle_attempt(&mut self) -> Result<Candidate<S>, EngineError> {
        for (term, weight) in self.final_weights {
            self.controller
                .score_function_mut()
                .set_weight(term, *weight)?;
        }
        let mut candidate = self.controller.best().clone();
        candidate.score = self.controller.score(&candidate.state);
        Ok(candidate)
    }

    fn finish(mut self, candidate: Candidate<S>) -> TrajectoryResult<S> {
        self.diagnostics.final_score = candidate.score;
        self.diagnostics.counters = self.dispatcher.counters().clone();
        info!(
            score = candidate.score,
            attempts = self.diagnostics.attempts,
            trials = self.diagnostics.total_trials,
            accepted = self.diagnostics.accepted(),
            converged = self.diagnostics.converged,
            "Trajectory finished."
        );
        TrajectoryResult {
            candidate,
            diagnostics: self.diagnostics,
        }
    }
}
