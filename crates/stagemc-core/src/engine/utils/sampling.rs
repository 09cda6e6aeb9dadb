use rand::{
    Rng,
    distributions::{Distribution, WeightedError, WeightedIndex},
};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("Weight list is empty, cannot perform sampling")]
    EmptyWeights,
    #[error("All weights are zero, nothing can be selected")]
    ZeroTotalWeight,
    #[error("Failed to create weighted distribution: {source}")]
    DistributionError {
        #[from]
        source: WeightedError,
    },
}

/// Cumulative-weight selection of an index, deterministic for a given RNG stream.
#[instrument(level = "trace", skip_all)]
pub fn weighted_index<R>(weights: &[f64], rng: &mut R) -> Result<usize, SamplingError>
where
    R: Rng + ?Sized,
{
    if weights.is_empty() {
        return Err(SamplingError::EmptyWeights);
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(SamplingError::ZeroTotalWeight);
    }

    let dist = WeightedIndex::new(weights)?;
    Ok(dist.sample(rng))
}

/// The Metropolis criterion.
///
/// Downhill and level moves are accepted without drawing a random number, so
/// the RNG stream only advances on uphill proposals.
#[inline]
pub fn metropolis_accept<R>(delta: f64, temperature: f64, rng: &mut R) -> bool
where
    R: Rng + ?Sized,
{
    if delta <= 0.0 {
        return true;
    }
    if !delta.is_finite() {
        return false;
    }
    let probability = (-delta / temperature).exp();
    rng.r#gen::<f64>() < probability
}
