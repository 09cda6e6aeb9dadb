use crate::core::moves::Granularity;

/// Fraction of the rounds after which interpolated granularities reach their final value.
const INTERPOLATION_PLATEAU: f64 = 0.75;

/// How the Metropolis temperature evolves inside a round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureSchedule {
    Constant(f64),
    /// Geometric ladder from `start` to `end` over the cycles of a round; reset every round.
    Ladder { start: f64, end: f64 },
}

impl Default for TemperatureSchedule {
    fn default() -> Self {
        TemperatureSchedule::Constant(1.0)
    }
}

impl TemperatureSchedule {
    pub fn initial(&self) -> f64 {
        match *self {
            TemperatureSchedule::Constant(t) => t,
            TemperatureSchedule::Ladder { start, .. } => start,
        }
    }

    pub fn is_ladder(&self) -> bool {
        matches!(self, TemperatureSchedule::Ladder { .. })
    }

    /// Temperature for the zero-based `cycle` of a round with `total_cycles` cycles.
    pub fn at_cycle(&self, cycle: usize, total_cycles: usize) -> f64 {
        match *self {
            TemperatureSchedule::Constant(t) => t,
            TemperatureSchedule::Ladder { start, end } => {
                if total_cycles == 0 {
                    return start;
                }
                let fraction = cycle as f64 / total_cycles as f64;
                start * (end / start).powf(fraction)
            }
        }
    }

    pub(crate) fn values(&self) -> [f64; 2] {
        match *self {
            TemperatureSchedule::Constant(t) => [t, t],
            TemperatureSchedule::Ladder { start, end } => [start, end],
        }
    }
}

/// Shape of a score-term weight ramp across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RampShape {
    #[default]
    Constant,
    /// `W(r) = W_final * r / R`.
    Linear,
    /// Zero until `onset * R`, then linear up to `W_final`, never below `floor`.
    Delayed { onset: f64, floor: f64 },
}

/// A per-term weight ramp. When `target` is `None` the final weight is the one the
/// score function carried when the scheduler was built.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeightRamp {
    pub shape: RampShape,
    pub target: Option<f64>,
}

impl WeightRamp {
    pub fn constant() -> Self {
        Self::default()
    }

    pub fn linear() -> Self {
        Self {
            shape: RampShape::Linear,
            target: None,
        }
    }

    pub fn delayed(onset: f64, floor: f64) -> Self {
        Self {
            shape: RampShape::Delayed { onset, floor },
            target: None,
        }
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target = Some(target);
        self
    }

    /// Weight for round `round` of `rounds` (both 1-based).
    pub fn weight_at(&self, final_weight: f64, round: usize, rounds: usize) -> f64 {
        let r = round as f64;
        let total = rounds as f64;
        match self.shape {
            RampShape::Constant => final_weight,
            RampShape::Linear => final_weight * (r / total),
            RampShape::Delayed { onset, floor } => {
                let onset_round = onset * total;
                let suppress = ((r - onset_round) / (total - onset_round)).clamp(0.0, 1.0);
                (final_weight * suppress).max(floor)
            }
        }
    }

    /// Checks the ramp parameters against the final weight it will ramp to.
    pub fn validate(&self, final_weight: f64) -> Result<(), String> {
        if !final_weight.is_finite() {
            return Err(format!("final weight {} is not finite", final_weight));
        }
        if let RampShape::Delayed { onset, floor } = self.shape {
            if !(0.0..1.0).contains(&onset) {
                return Err(format!("onset {} must lie in [0, 1)", onset));
            }
            if !floor.is_finite() || floor > final_weight {
                return Err(format!(
                    "floor {} must be finite and not above the final weight {}",
                    floor, final_weight
                ));
            }
        }
        Ok(())
    }
}

/// Round-indexed schedule for a move family's granularity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GranularitySchedule {
    Fixed(Granularity),
    /// Coarse lengths in the first third of the rounds, medium in the second, fine after.
    Stepped {
        coarse: usize,
        medium: usize,
        fine: usize,
    },
    /// Linear interpolation reaching `end` at three quarters of the rounds.
    Interpolated { start: Granularity, end: Granularity },
}

impl GranularitySchedule {
    pub fn at(&self, round: usize, rounds: usize) -> Granularity {
        match *self {
            GranularitySchedule::Fixed(g) => g,
            GranularitySchedule::Stepped {
                coarse,
                medium,
                fine,
            } => {
                if 3 * round <= rounds {
                    Granularity::Length(coarse)
                } else if 3 * round <= 2 * rounds {
                    Granularity::Length(medium)
                } else {
                    Granularity::Length(fine)
                }
            }
            GranularitySchedule::Interpolated { start, end } => {
                let suppress =
                    (round as f64 / (INTERPOLATION_PLATEAU * rounds as f64)).min(1.0);
                interpolate(start, end, suppress)
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            GranularitySchedule::Fixed(_) => Ok(()),
            GranularitySchedule::Stepped {
                coarse,
                medium,
                fine,
            } => {
                if coarse == 0 || medium == 0 || fine == 0 {
                    Err("stepped lengths must be at least 1".to_string())
                } else {
                    Ok(())
                }
            }
            GranularitySchedule::Interpolated { start, end } => match (start, end) {
                (Granularity::Length(a), Granularity::Length(b)) if a > 0 && b > 0 => Ok(()),
                (
                    Granularity::Perturbation {
                        rotation: r0,
                        translation: t0,
                    },
                    Granularity::Perturbation {
                        rotation: r1,
                        translation: t1,
                    },
                ) if [r0, t0, r1, t1].iter().all(|v| v.is_finite() && *v >= 0.0) => Ok(()),
                _ => Err(format!(
                    "cannot interpolate between '{}' and '{}'",
                    start, end
                )),
            },
        }
    }
}

fn interpolate(start: Granularity, end: Granularity, fraction: f64) -> Granularity {
    let lerp = |a: f64, b: f64| a * (1.0 - fraction) + b * fraction;
    match (start, end) {
        (Granularity::Length(a), Granularity::Length(b)) => {
            Granularity::Length(lerp(a as f64, b as f64).round().max(1.0) as usize)
        }
        (
            Granularity::Perturbation {
                rotation: r0,
                translation: t0,
            },
            Granularity::Perturbation {
                rotation: r1,
                translation: t1,
            },
        ) => Granularity::Perturbation {
            rotation: lerp(r0, r1),
            translation: lerp(t0, t1),
        },
        _ => end,
    }
}
