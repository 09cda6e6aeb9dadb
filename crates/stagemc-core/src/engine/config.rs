use super::ramp::{GranularitySchedule, TemperatureSchedule, WeightRamp};
use crate::core::moves::MoveKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Temperature must be positive and finite, got {0}")]
    NonPositiveTemperature(f64),
    #[error("The number of rounds must be at least 1")]
    ZeroRounds,
    #[error("At least one move must be registered")]
    NoMoves,
    #[error("Move '{kind}' has weight {weight}; weights must be finite and non-negative")]
    InvalidMoveWeight { kind: MoveKind, weight: f64 },
    #[error("All move weights are zero")]
    AllMoveWeightsZero,
    #[error("Weight ramp refers to unknown score term '{0}'")]
    UnknownTerm(String),
    #[error("Invalid weight ramp for term '{term}': {reason}")]
    InvalidRamp { term: String, reason: String },
    #[error("Invalid granularity schedule for '{kind}' moves: {reason}")]
    InvalidGranularity { kind: MoveKind, reason: String },
    #[error("max_tries must be at least 1")]
    ZeroMaxTries,
    #[error("Checkpoint round {round} is outside 1..={rounds}")]
    CheckpointOutOfRange { round: usize, rounds: usize },
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// What to return when every attempt failed a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExhaustionPolicy {
    /// The lowest-scoring recovered candidate over all attempts.
    #[default]
    KeepBest,
    /// The recovered candidate of the last attempt.
    KeepLast,
    /// Fail with [`super::error::EngineError::NotConverged`].
    Strict,
}

/// When the closure collaborator runs after an accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosurePolicy {
    #[default]
    Never,
    EveryMove,
    /// Only during the last `n` rounds.
    FinalRounds(usize),
}

impl ClosurePolicy {
    pub fn is_active(&self, round: usize, rounds: usize) -> bool {
        match *self {
            ClosurePolicy::Never => false,
            ClosurePolicy::EveryMove => true,
            ClosurePolicy::FinalRounds(n) => round > rounds.saturating_sub(n),
        }
    }
}

/// How a closed candidate is folded back into the trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClosureAcceptance {
    /// The closed candidate is a second Metropolis proposal against the accepted state.
    #[default]
    SeparateMetropolis,
    /// The closed candidate replaces the accepted state unconditionally.
    Mandatory,
}

/// Degree-of-freedom counts a model reports for cycle estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DofCounts {
    pub moving_units: usize,
    pub chunks: usize,
    pub moving_bodies: usize,
}

pub const DEFAULT_CYCLES_PER_UNIT: usize = 2_000;
pub const DEFAULT_CYCLES_PER_BODY: usize = 20_000;
pub const DEFAULT_MAX_CYCLES: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleBudget {
    /// Total cycles over all rounds.
    Total(usize),
    PerRound(usize),
    Estimated {
        dof: DofCounts,
        per_unit: usize,
        per_body: usize,
        max: usize,
    },
}

impl CycleBudget {
    pub fn estimated(dof: DofCounts) -> Self {
        CycleBudget::Estimated {
            dof,
            per_unit: DEFAULT_CYCLES_PER_UNIT,
            per_body: DEFAULT_CYCLES_PER_BODY,
            max: DEFAULT_MAX_CYCLES,
        }
    }

    pub fn total(&self, rounds: usize) -> usize {
        match *self {
            CycleBudget::Total(n) => n,
            CycleBudget::PerRound(n) => n.saturating_mul(rounds),
            CycleBudget::Estimated {
                dof,
                per_unit,
                per_body,
                max,
            } => per_unit
                .saturating_mul(dof.moving_units.saturating_add(dof.chunks))
                .saturating_add(per_body.saturating_mul(dof.moving_bodies))
                .min(max),
        }
    }

    pub fn per_round(&self, rounds: usize) -> usize {
        match *self {
            CycleBudget::PerRound(n) => n.max(1),
            _ => (self.total(rounds) / rounds.max(1)).max(1),
        }
    }
}

/// Optional limits that stop a trajectory early, without retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchBudget {
    pub max_trials: Option<u64>,
    pub max_wall_time: Option<Duration>,
}

impl SearchBudget {
    pub fn is_unlimited(&self) -> bool {
        self.max_trials.is_none() && self.max_wall_time.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub rounds: usize,
    pub cycles: CycleBudget,
    pub temperature: TemperatureSchedule,
    pub weight_ramps: BTreeMap<String, WeightRamp>,
    pub granularity: BTreeMap<MoveKind, GranularitySchedule>,
    pub max_tries: usize,
    pub exhaustion: ExhaustionPolicy,
    pub closure: ClosurePolicy,
    pub closure_acceptance: ClosureAcceptance,
    /// Largest residual a closure may leave and still count as successful.
    pub closure_tolerance: f64,
    pub close_at_end: bool,
    pub recover_low_each_round: bool,
    pub heat_cycles: usize,
    pub budget: SearchBudget,
}

impl ScheduleConfig {
    pub fn cycles_per_round(&self) -> usize {
        self.cycles.per_round(self.rounds)
    }

    pub fn needs_closer(&self) -> bool {
        self.closure != ClosurePolicy::Never || self.close_at_end
    }
}

#[derive(Default)]
pub struct ScheduleConfigBuilder {
    rounds: Option<usize>,
    cycles: Option<CycleBudget>,
    temperature: Option<TemperatureSchedule>,
    weight_ramps: BTreeMap<String, WeightRamp>,
    granularity: BTreeMap<MoveKind, GranularitySchedule>,
    max_tries: Option<usize>,
    exhaustion: ExhaustionPolicy,
    closure: ClosurePolicy,
    closure_acceptance: ClosureAcceptance,
    closure_tolerance: Option<f64>,
    close_at_end: bool,
    recover_low_each_round: Option<bool>,
    heat_cycles: usize,
    budget: SearchBudget,
}

impl ScheduleConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rounds(mut self, rounds: usize) -> Self {
        self.rounds = Some(rounds);
        self
    }
    pub fn cycles(mut self, cycles: CycleBudget) -> Self {
        self.cycles = Some(cycles);
        self
    }
    pub fn temperature(mut self, schedule: TemperatureSchedule) -> Self {
        self.temperature = Some(schedule);
        self
    }
    pub fn weight_ramp(mut self, term: impl Into<String>, ramp: WeightRamp) -> Self {
        self.weight_ramps.insert(term.into(), ramp);
        self
    }
    pub fn granularity(mut self, kind: MoveKind, schedule: GranularitySchedule) -> Self {
        self.granularity.insert(kind, schedule);
        self
    }
    pub fn max_tries(mut self, tries: usize) -> Self {
        self.max_tries = Some(tries);
        self
    }
    pub fn exhaustion(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion = policy;
        self
    }
    pub fn closure(mut self, policy: ClosurePolicy) -> Self {
        self.closure = policy;
        self
    }
    pub fn closure_acceptance(mut self, acceptance: ClosureAcceptance) -> Self {
        self.closure_acceptance = acceptance;
        self
    }
    pub fn closure_tolerance(mut self, tolerance: f64) -> Self {
        self.closure_tolerance = Some(tolerance);
        self
    }
    pub fn close_at_end(mut self, enabled: bool) -> Self {
        self.close_at_end = enabled;
        self
    }
    pub fn recover_low_each_round(mut self, enabled: bool) -> Self {
        self.recover_low_each_round = Some(enabled);
        self
    }
    pub fn heat_cycles(mut self, cycles: usize) -> Self {
        self.heat_cycles = cycles;
        self
    }
    pub fn max_trials(mut self, trials: u64) -> Self {
        self.budget.max_trials = Some(trials);
        self
    }
    pub fn max_wall_time(mut self, limit: Duration) -> Self {
        self.budget.max_wall_time = Some(limit);
        self
    }

    pub fn build(self) -> Result<ScheduleConfig, ConfigError> {
        let rounds = self.rounds.ok_or(ConfigError::MissingParameter("rounds"))?;
        if rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }

        let cycles = self.cycles.ok_or(ConfigError::MissingParameter("cycles"))?;
        if cycles.total(rounds) == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "cycles",
                reason: "the cycle budget must allow at least one cycle".to_string(),
            });
        }

        let temperature = self
            .temperature
            .ok_or(ConfigError::MissingParameter("temperature"))?;
        if let Some(bad) = temperature
            .values()
            .into_iter()
            .find(|t| !t.is_finite() || *t <= 0.0)
        {
            return Err(ConfigError::NonPositiveTemperature(bad));
        }

        let max_tries = self.max_tries.unwrap_or(1);
        if max_tries == 0 {
            return Err(ConfigError::ZeroMaxTries);
        }

        for (term, ramp) in &self.weight_ramps {
            if let Some(target) = ramp.target {
                ramp.validate(target)
                    .map_err(|reason| ConfigError::InvalidRamp {
                        term: term.clone(),
                        reason,
                    })?;
            }
        }

        for (kind, schedule) in &self.granularity {
            schedule
                .validate()
                .map_err(|reason| ConfigError::InvalidGranularity {
                    kind: *kind,
                    reason,
                })?;
        }

        let closure_tolerance = self.closure_tolerance.unwrap_or(0.1);
        if !closure_tolerance.is_finite() || closure_tolerance < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "closure_tolerance",
                reason: format!("{} is not a finite non-negative distance", closure_tolerance),
            });
        }

        if let ClosurePolicy::FinalRounds(0) = self.closure {
            return Err(ConfigError::InvalidParameter {
                name: "closure",
                reason: "closure over the final rounds needs at least one round".to_string(),
            });
        }

        Ok(ScheduleConfig {
            rounds,
            cycles,
            temperature,
            weight_ramps: self.weight_ramps,
            granularity: self.granularity,
            max_tries,
            exhaustion: self.exhaustion,
            closure: self.closure,
            closure_acceptance: self.closure_acceptance,
            closure_tolerance,
            close_at_end: self.close_at_end,
            recover_low_each_round: self.recover_low_each_round.unwrap_or(true),
            heat_cycles: self.heat_cycles,
            budget: self.budget,
        })
    }
}
