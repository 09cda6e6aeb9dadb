use crate::core::scoring::ScoreFunction;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::scheduler::RoundScheduler;
use crate::engine::state::TrajectoryResult;
use rand::{SeedableRng, rngs::StdRng};
use tracing::{info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Number of independent trajectories (output models).
    pub nstruct: usize,
    /// Model `i` runs with seed `base_seed + i`.
    pub base_seed: u64,
    /// Score quantile in `(0, 1]` for the running autofilter, if enabled.
    pub autofilter: Option<f64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            nstruct: 1,
            base_seed: 0,
            autofilter: None,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nstruct == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "nstruct",
                reason: "at least one model must be requested".to_string(),
            });
        }
        if let Some(quantile) = self.autofilter {
            if !(quantile > 0.0 && quantile <= 1.0) {
                return Err(ConfigError::InvalidParameter {
                    name: "autofilter",
                    reason: format!("quantile {} must lie in (0, 1]", quantile),
                });
            }
        }
        Ok(())
    }

    pub fn seed_for(&self, index: usize) -> u64 {
        self.base_seed.wrapping_add(index as u64)
    }
}

#[derive(Debug, Clone)]
pub enum ModelOutcome<S> {
    Finished(TrajectoryResult<S>),
    /// The trajectory ran under the strict exhaustion policy and never passed its checkpoints.
    NotConverged { attempts: usize, reason: String },
}

#[derive(Debug, Clone)]
pub struct ModelResult<S> {
    pub index: usize,
    pub seed: u64,
    pub outcome: ModelOutcome<S>,
    pub autofilter_passed: bool,
}

impl<S> ModelResult<S> {
    pub fn trajectory(&self) -> Option<&TrajectoryResult<S>> {
        match &self.outcome {
            ModelOutcome::Finished(trajectory) => Some(trajectory),
            ModelOutcome::NotConverged { .. } => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.trajectory().map(TrajectoryResult::score)
    }

    fn sort_key(&self) -> f64 {
        self.score().unwrap_or(f64::INFINITY)
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult<S> {
    /// Models sorted by final score, lowest first; failed models last.
    pub models: Vec<ModelResult<S>>,
}

impl<S> BatchResult<S> {
    pub fn best(&self) -> Option<&ModelResult<S>> {
        self.models.first().filter(|m| m.trajectory().is_some())
    }

    pub fn passed(&self) -> impl Iterator<Item = &ModelResult<S>> {
        self.models.iter().filter(|m| m.autofilter_passed)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Running quantile filter over scores in arrival order.
///
/// A score passes when it is at or below the score at 1-based position
/// `floor(n * quantile) + 1` of the sorted scores seen so far, itself included.
pub fn autofilter(scores: &[f64], quantile: f64) -> Vec<bool> {
    let mut seen: Vec<f64> = Vec::with_capacity(scores.len());
    scores
        .iter()
        .map(|&score| {
            let position = seen.partition_point(|s| s.total_cmp(&score).is_lt());
            seen.insert(position, score);
            let cutoff = ((seen.len() as f64 * quantile).floor() as usize).min(seen.len() - 1);
            score <= seen[cutoff]
        })
        .collect()
}

/// Runs `config.nstruct` independent trajectories from `initial`.
///
/// `build` receives the model index and a freshly seeded RNG and returns the
/// scheduler for that model, so every trajectory owns its scoring, moves and
/// random stream. Results do not depend on thread scheduling.
#[instrument(skip_all, name = "batch_workflow")]
pub fn run<'r, S, F, B>(
    initial: &S,
    config: &BatchConfig,
    build: B,
    reporter: &ProgressReporter,
) -> Result<BatchResult<S>, EngineError>
where
    S: Clone + Send + Sync,
    F: ScoreFunction<S>,
    B: Fn(usize, StdRng) -> Result<RoundScheduler<'r, S, F, StdRng>, ConfigError> + Sync,
{
    config.validate()?;
    info!(
        nstruct = config.nstruct,
        base_seed = config.base_seed,
        "Starting batch of trajectories."
    );

    reporter.report(Progress::PhaseStart {
        name: "Sampling Trajectories",
    });
    reporter.report(Progress::TaskStart {
        total_steps: config.nstruct as u64,
    });

    let indices: Vec<usize> = (0..config.nstruct).collect();

    #[cfg(not(feature = "parallel"))]
    let iterator = indices.iter();

    #[cfg(feature = "parallel")]
    let iterator = indices.par_iter();

    let outcomes: Vec<Result<ModelResult<S>, EngineError>> = iterator
        .map(|&index| {
            let result = run_model(initial, index, config.seed_for(index), &build);
            reporter.report(Progress::TaskIncrement);
            result
        })
        .collect();

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let mut models = outcomes.into_iter().collect::<Result<Vec<_>, _>>()?;

    if let Some(quantile) = config.autofilter {
        let finished: Vec<f64> = models.iter().filter_map(ModelResult::score).collect();
        let mut verdicts = autofilter(&finished, quantile).into_iter();
        for model in &mut models {
            if model.score().is_some() {
                model.autofilter_passed = verdicts.next().unwrap_or(false);
            }
        }
    }

    models.sort_by(|a, b| {
        a.sort_key()
            .total_cmp(&b.sort_key())
            .then(a.index.cmp(&b.index))
    });

    let result = BatchResult { models };
    info!(
        models = result.len(),
        passed = result.passed().count(),
        best_score = result.best().and_then(ModelResult::score),
        "Batch complete."
    );
    Ok(result)
}

fn run_model<'r, S, F, B>(
    initial: &S,
    index: usize,
    seed: u64,
    build: &B,
) -> Result<ModelResult<S>, EngineError>
where
    S: Clone,
    F: ScoreFunction<S>,
    B: Fn(usize, StdRng) -> Result<RoundScheduler<'r, S, F, StdRng>, ConfigError>,
{
    let mut scheduler = build(index, StdRng::seed_from_u64(seed))?;
    let outcome = match scheduler.run_trajectory(initial.clone()) {
        Ok(trajectory) => ModelOutcome::Finished(trajectory),
        Err(EngineError::NotConverged {
            attempts,
            last_reason,
        }) => {
            warn!(model = index, attempts, reason = %last_reason, "Model did not converge.");
            ModelOutcome::NotConverged {
                attempts,
                reason: last_reason,
            }
        }
        Err(e) => return Err(e),
    };

    let autofilter_passed = matches!(outcome, ModelOutcome::Finished(_));
    Ok(ModelResult {
        index,
        seed,
        outcome,
        autofilter_passed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::candidate::Candidate;
    use crate::core::filters::CheckpointResult;
    use crate::core::moves::{Granularity, MoveKind, MoveSpec};
    use crate::core::scoring::WeightedScoreFunction;
    use crate::engine::config::{CycleBudget, ExhaustionPolicy, ScheduleConfig, ScheduleConfigBuilder};
    use crate::engine::ramp::TemperatureSchedule;
    use crate::engine::scheduler::CheckpointRound;
    use rand::{Rng, RngCore};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn schedule() -> ScheduleConfig {
        ScheduleConfigBuilder::new()
            .rounds(2)
            .cycles(CycleBudget::PerRound(40))
            .temperature(TemperatureSchedule::Constant(0.5))
            .build()
            .unwrap()
    }

    fn walker() -> MoveSpec<f64> {
        MoveSpec::new(
            MoveKind::Fragment,
            1.0,
            |s: &f64, _: &Granularity, rng: &mut dyn RngCore| Some(s + rng.gen_range(-1.0..1.0)),
        )
    }

    fn parabola() -> WeightedScoreFunction<f64> {
        WeightedScoreFunction::new().with_term("energy", 1.0, |s: &f64| (s - 3.0).powi(2))
    }

    fn batch(nstruct: usize, autofilter: Option<f64>) -> BatchConfig {
        BatchConfig {
            nstruct,
            base_seed: 100,
            autofilter,
        }
    }

    #[test]
    fn autofilter_compares_against_running_quantile() {
        let verdicts = autofilter(&[5.0, 3.0, 4.0, 1.0, 10.0], 0.5);
        assert_eq!(verdicts, vec![true, true, true, true, false]);
    }

    #[test]
    fn autofilter_first_model_always_passes() {
        assert_eq!(autofilter(&[1e9], 0.01), vec![true]);
        assert!(autofilter(&[2.0, 1.0, 3.0], 1.0).iter().all(|&p| p));
    }

    #[test]
    fn validate_rejects_empty_batch_and_bad_quantile() {
        assert!(batch(0, None).validate().is_err());
        assert!(batch(3, Some(0.0)).validate().is_err());
        assert!(batch(3, Some(1.5)).validate().is_err());
        assert!(batch(3, Some(1.0)).validate().is_ok());
    }

    #[test]
    fn run_derives_seeds_and_sorts_by_score() {
        let config = schedule();
        let reporter = ProgressReporter::new();
        let result = run(
            &0.0,
            &batch(6, None),
            |_, rng| RoundScheduler::new(config.clone(), parabola(), vec![walker()], rng),
            &reporter,
        )
        .unwrap();

        assert_eq!(result.len(), 6);
        let mut seeds: Vec<u64> = result.models.iter().map(|m| m.seed).collect();
        seeds.sort_unstable();
        assert_eq!(seeds, (100..106).collect::<Vec<_>>());
        let scores: Vec<f64> = result.models.iter().filter_map(ModelResult::score).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
        assert!(result.models.iter().all(|m| m.autofilter_passed));
    }

    #[test]
    fn run_is_reproducible_regardless_of_threads() {
        let config = schedule();
        let reporter = ProgressReporter::new();
        let go = || {
            run(
                &0.0,
                &batch(8, Some(0.5)),
                |_, rng| RoundScheduler::new(config.clone(), parabola(), vec![walker()], rng),
                &reporter,
            )
            .unwrap()
            .models
            .into_iter()
            .map(|m| (m.index, m.score(), m.autofilter_passed))
            .collect::<Vec<_>>()
        };
        assert_eq!(go(), go());
    }

    #[test]
    fn progress_counts_every_model() {
        let config = schedule();
        let increments = AtomicU64::new(0);
        let reporter = ProgressReporter::with_callback(Box::new(|event: Progress| {
            if let Progress::TaskIncrement = event {
                increments.fetch_add(1, Ordering::SeqCst);
            }
        }));
        run(
            &0.0,
            &batch(5, None),
            |_, rng| RoundScheduler::new(config.clone(), parabola(), vec![walker()], rng),
            &reporter,
        )
        .unwrap();
        assert_eq!(increments.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn strict_failures_are_recorded_per_model() {
        let config = ScheduleConfigBuilder::new()
            .rounds(1)
            .cycles(CycleBudget::PerRound(5))
            .temperature(TemperatureSchedule::Constant(1.0))
            .exhaustion(ExhaustionPolicy::Strict)
            .build()
            .unwrap();
        let reporter = ProgressReporter::new();
        let result = run(
            &0.0,
            &batch(3, Some(0.5)),
            |index, rng| {
                let scheduler =
                    RoundScheduler::new(config.clone(), parabola(), vec![walker()], rng)?;
                if index == 1 {
                    scheduler.with_checkpoint(
                        CheckpointRound::Final,
                        0.0,
                        |_: &Candidate<f64>, _: f64| CheckpointResult::fail("rejected"),
                    )
                } else {
                    Ok(scheduler)
                }
            },
            &reporter,
        )
        .unwrap();

        assert_eq!(result.len(), 3);
        let failed = result.models.last().unwrap();
        assert_eq!(failed.index, 1);
        assert!(matches!(failed.outcome, ModelOutcome::NotConverged { attempts: 1, .. }));
        assert!(!failed.autofilter_passed);
        assert!(result.best().is_some());
    }

    #[test]
    fn configuration_errors_abort_the_batch() {
        let config = schedule();
        let reporter = ProgressReporter::new();
        let result = run(
            &0.0,
            &batch(2, None),
            |_, rng| RoundScheduler::new(config.clone(), parabola(), Vec::new(), rng),
            &reporter,
        );
        assert!(matches!(
            result,
            Err(EngineError::Config {
                source: ConfigError::NoMoves
            })
        ));
    }

    #[test]
    fn bead_chain_batch_keeps_gaps_closed() {
        use crate::core::filters::ClosureResidualFilter;
        use crate::engine::config::{ClosureAcceptance, ClosurePolicy};
        use crate::models::{chain::BeadChain, closure::CcdCloser, movers, terms};

        let chain = BeadChain::extended(&[5, 5], 1.0).unwrap();
        let config = ScheduleConfigBuilder::new()
            .rounds(3)
            .cycles(CycleBudget::PerRound(30))
            .temperature(TemperatureSchedule::Ladder {
                start: 2.0,
                end: 0.5,
            })
            .closure(ClosurePolicy::EveryMove)
            .closure_acceptance(ClosureAcceptance::Mandatory)
            .closure_tolerance(0.1)
            .build()
            .unwrap();
        let reporter = ProgressReporter::new();
        let result = run(
            &chain,
            &batch(3, Some(1.0)),
            |_, rng| {
                RoundScheduler::new(
                    config.clone(),
                    terms::default_score_function(1.0),
                    movers::default_moves(None),
                    rng,
                )?
                .with_closer(CcdCloser::new(0.1))
                .with_checkpoint(
                    CheckpointRound::Final,
                    0.1,
                    ClosureResidualFilter::new(CcdCloser::new(0.1)),
                )
            },
            &reporter,
        )
        .unwrap();

        assert_eq!(result.len(), 3);
        for model in &result.models {
            let trajectory = model.trajectory().unwrap();
            assert!(trajectory.candidate.state.max_gap_error() <= 0.1);
            assert!(trajectory.diagnostics.converged);
        }
    }
}
