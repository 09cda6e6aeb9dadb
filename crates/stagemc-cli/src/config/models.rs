use stagemc::engine::config::ScheduleConfig;
use stagemc::engine::scheduler::CheckpointRound;
use stagemc::workflows::batch::BatchConfig;
use stagemc::core::moves::MoveKind;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    pub segments: Vec<usize>,
    pub bond_length: f64,
    pub chunk_lengths: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFilter {
    ClosureResidual,
    ScoreCeiling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointSpec {
    pub round: CheckpointRound,
    pub filter: CheckpointFilter,
    pub tolerance: f64,
}

/// Fully resolved settings for one `fold` run.
#[derive(Debug, Clone)]
pub struct FoldConfig {
    pub output: PathBuf,
    pub write_models: bool,
    pub chain: ChainSpec,
    pub schedule: ScheduleConfig,
    /// Final score weights by term name.
    pub weights: BTreeMap<String, f64>,
    pub move_weights: BTreeMap<MoveKind, f64>,
    pub checkpoints: Vec<CheckpointSpec>,
    pub batch: BatchConfig,
}
