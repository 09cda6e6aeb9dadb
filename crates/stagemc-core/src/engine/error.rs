use thiserror::Error;

use super::config::ConfigError;
use crate::core::scoring::ScoringError;

pub use super::utils::sampling::SamplingError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid search configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Score function rejected a weight update: {source}")]
    Scoring {
        #[from]
        source: ScoringError,
    },

    #[error("Move sampling failed: {source}")]
    Sampling {
        #[from]
        source: SamplingError,
    },

    #[error("Trajectory did not pass its checkpoints after {attempts} attempt(s): {last_reason}")]
    NotConverged { attempts: usize, last_reason: String },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
