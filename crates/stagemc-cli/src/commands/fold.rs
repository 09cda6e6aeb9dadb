use crate::cli::FoldArgs;
use crate::config::models::CheckpointFilter;
use crate::config::{FoldConfig, build_config};
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use rand::rngs::StdRng;
use serde::Serialize;
use stagemc::core::filters::{ClosureResidualFilter, ScoreCeilingFilter};
use stagemc::core::scoring::{ScoreFunction, WeightedScoreFunction};
use stagemc::engine::config::ConfigError;
use stagemc::engine::progress::ProgressReporter;
use stagemc::engine::scheduler::RoundScheduler;
use stagemc::models::chain::BeadChain;
use stagemc::models::closure::CcdCloser;
use stagemc::models::movers::{self, ChunkLibrary};
use stagemc::models::terms;
use stagemc::workflows::{self, batch::BatchResult, batch::ModelOutcome};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

type BeadScheduler = RoundScheduler<'static, BeadChain, WeightedScoreFunction<BeadChain>, StdRng>;

pub fn run(args: FoldArgs) -> Result<()> {
    info!("Resolving configuration from defaults, file and CLI arguments...");
    let config = build_config(&args)?;

    let initial = BeadChain::extended(&config.chain.segments, config.chain.bond_length)?;
    let library = ChunkLibrary::helices(&config.chain.chunk_lengths)?;
    info!(
        beads = initial.num_beads(),
        segments = initial.segments().len(),
        chunks = library.len(),
        "Built initial extended chain."
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting staged Monte Carlo search ({} model(s), {} round(s))...",
        config.batch.nstruct, config.schedule.rounds
    );

    let batch = workflows::batch::run(
        &initial,
        &config.batch,
        |_, rng| build_scheduler(&config, &library, rng),
        &reporter,
    )?;

    info!("Batch finished with {} model(s).", batch.len());

    write_summary(&config.output, &batch)?;
    println!("Score summary written to: {}", config.output.display());

    if config.write_models {
        write_models(&config, &batch)?;
    }

    match batch.best() {
        Some(best) => println!(
            "✓ Best model #{} (seed {}) scored {:.4}",
            best.index,
            best.seed,
            best.score().unwrap_or(f64::NAN)
        ),
        None => {
            warn!("No model finished; every trajectory failed its checkpoints.");
            println!("Warning: no model converged.");
        }
    }

    Ok(())
}

fn build_scheduler(
    config: &FoldConfig,
    library: &ChunkLibrary,
    rng: StdRng,
) -> std::result::Result<BeadScheduler, ConfigError> {
    let mut score_function = terms::default_score_function(config.chain.bond_length);
    for (term, &weight) in &config.weights {
        score_function
            .set_weight(term, weight)
            .map_err(|e| ConfigError::InvalidParameter {
                name: "weights",
                reason: e.to_string(),
            })?;
    }

    let library = (!library.is_empty()).then(|| library.clone());
    let mut moves = movers::default_moves(library);
    for spec in &mut moves {
        if let Some(&weight) = config.move_weights.get(&spec.kind) {
            spec.weight = weight;
        }
    }

    let closure_tolerance = config.schedule.closure_tolerance;
    let mut scheduler =
        RoundScheduler::new(config.schedule.clone(), score_function, moves, rng)?;
    if config.schedule.needs_closer() {
        scheduler = scheduler.with_closer(CcdCloser::new(closure_tolerance));
    }
    for checkpoint in &config.checkpoints {
        scheduler = match checkpoint.filter {
            CheckpointFilter::ClosureResidual => scheduler.with_checkpoint(
                checkpoint.round,
                checkpoint.tolerance,
                ClosureResidualFilter::new(CcdCloser::new(closure_tolerance)),
            )?,
            CheckpointFilter::ScoreCeiling => scheduler.with_checkpoint(
                checkpoint.round,
                checkpoint.tolerance,
                ScoreCeilingFilter,
            )?,
        };
    }
    Ok(scheduler)
}

#[derive(Debug, Serialize)]
struct SummaryRow {
    rank: usize,
    model: usize,
    seed: u64,
    score: Option<f64>,
    attempts: usize,
    accepted: Option<u64>,
    rejected: Option<u64>,
    closure_failures: Option<u64>,
    checkpoints_passed: Option<usize>,
    autofilter_passed: bool,
}

fn write_summary(path: &Path, batch: &BatchResult<BeadChain>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (rank, model) in batch.models.iter().enumerate() {
        let row = match &model.outcome {
            ModelOutcome::Finished(trajectory) => {
                let diagnostics = &trajectory.diagnostics;
                SummaryRow {
                    rank: rank + 1,
                    model: model.index,
                    seed: model.seed,
                    score: Some(trajectory.score()),
                    attempts: diagnostics.attempts,
                    accepted: Some(diagnostics.accepted()),
                    rejected: Some(diagnostics.rejected()),
                    closure_failures: Some(diagnostics.closure_failures()),
                    checkpoints_passed: Some(diagnostics.checkpoints_passed),
                    autofilter_passed: model.autofilter_passed,
                }
            }
            ModelOutcome::NotConverged { attempts, reason } => {
                warn!(model = model.index, %reason, "Model did not converge.");
                SummaryRow {
                    rank: rank + 1,
                    model: model.index,
                    seed: model.seed,
                    score: None,
                    attempts: *attempts,
                    accepted: None,
                    rejected: None,
                    closure_failures: None,
                    checkpoints_passed: None,
                    autofilter_passed: model.autofilter_passed,
                }
            }
        };
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn model_path(summary: &Path, rank: usize) -> PathBuf {
    let stem = summary
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model");
    summary.with_file_name(format!("{}_{}.xyz", stem, rank))
}

/// Writes every finished model as an XYZ file of bead coordinates, named
/// after the summary and numbered by rank.
fn write_models(config: &FoldConfig, batch: &BatchResult<BeadChain>) -> Result<()> {
    for (rank, model) in batch.models.iter().enumerate() {
        let Some(trajectory) = model.trajectory() else {
            continue;
        };
        let path = model_path(&config.output, rank + 1);
        let beads = trajectory.candidate.state.bead_positions();

        let mut file = BufWriter::new(File::create(&path)?);
        writeln!(file, "{}", beads.len())?;
        writeln!(
            file,
            "model={} seed={} score={:.6} gap_error={:.6}",
            model.index,
            model.seed,
            trajectory.score(),
            trajectory.candidate.state.max_gap_error()
        )?;
        for bead in &beads {
            writeln!(file, "B {:.6} {:.6} {:.6}", bead.x, bead.y, bead.z)?;
        }
        file.flush()?;

        info!("Wrote model {} to {:?}", model.index, &path);
    }
    Ok(())
}
