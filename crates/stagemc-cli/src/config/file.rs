use crate::error::{CliError, Result};
use serde::Deserialize;
use stagemc::engine::config::{ClosureAcceptance, ExhaustionPolicy};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileChainConfig {
    pub segments: Option<Vec<usize>>,
    pub bond_length: Option<f64>,
    pub chunk_lengths: Option<Vec<usize>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileScheduleConfig {
    pub rounds: Option<usize>,
    pub cycles: Option<usize>,
    pub temperature: Option<f64>,
    pub final_temperature: Option<f64>,
    pub max_tries: Option<usize>,
    pub exhaustion: Option<ExhaustionPolicy>,
    pub heat_cycles: Option<usize>,
    pub recover_low: Option<bool>,
    pub max_trials: Option<u64>,
    pub max_wall_time_secs: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileClosurePolicy {
    Never,
    EveryMove,
    FinalRounds,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileClosureConfig {
    pub policy: Option<FileClosurePolicy>,
    pub final_rounds: Option<usize>,
    pub acceptance: Option<ClosureAcceptance>,
    pub tolerance: Option<f64>,
    pub close_at_end: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileBatchConfig {
    pub nstruct: Option<usize>,
    pub seed: Option<u64>,
    pub autofilter: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileRampShape {
    Constant,
    Linear,
    Delayed,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRampConfig {
    pub shape: FileRampShape,
    pub onset: Option<f64>,
    pub floor: Option<f64>,
    pub target: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileFilterKind {
    ClosureResidual,
    ScoreCeiling,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileCheckpointConfig {
    pub round: toml::Value,
    pub filter: FileFilterKind,
    pub tolerance: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub chain: Option<FileChainConfig>,
    pub schedule: Option<FileScheduleConfig>,
    pub closure: Option<FileClosureConfig>,
    pub batch: Option<FileBatchConfig>,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub ramps: BTreeMap<String, FileRampConfig>,
    #[serde(default)]
    pub moves: BTreeMap<String, f64>,
    pub checkpoints: Option<Vec<FileCheckpointConfig>>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
