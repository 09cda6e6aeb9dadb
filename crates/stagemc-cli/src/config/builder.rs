use super::defaults::DefaultsConfig;
use super::file::{
    FileCheckpointConfig, FileClosureConfig, FileClosurePolicy, FileConfig, FileFilterKind,
    FileRampConfig, FileRampShape,
};
use super::models::{ChainSpec, CheckpointFilter, CheckpointSpec, FoldConfig};
use crate::cli::FoldArgs;
use crate::error::{CliError, Result};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IntoDeserializer};
use stagemc::core::moves::MoveKind;
use stagemc::engine::config::{ClosurePolicy, CycleBudget, ExhaustionPolicy, ScheduleConfigBuilder};
use stagemc::engine::ramp::{TemperatureSchedule, WeightRamp};
use stagemc::engine::scheduler::CheckpointRound;
use stagemc::models::chain::BeadChain;
use stagemc::models::movers::{self, ChunkLibrary};
use stagemc::models::terms;
use stagemc::workflows::batch::BatchConfig;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub fn build_config(args: &FoldArgs) -> Result<FoldConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let chain_file = file_config.chain.take().unwrap_or_default();
    let chain = ChainSpec {
        segments: chain_file.segments.unwrap_or(defaults.segments.clone()),
        bond_length: chain_file.bond_length.unwrap_or(defaults.bond_length),
        chunk_lengths: chain_file
            .chunk_lengths
            .unwrap_or(defaults.chunk_lengths.clone()),
    };
    let initial = BeadChain::extended(&chain.segments, chain.bond_length)?;
    let library = ChunkLibrary::helices(&chain.chunk_lengths)?;

    let schedule_file = file_config.schedule.take().unwrap_or_default();
    let rounds = args
        .rounds
        .or(schedule_file.rounds)
        .unwrap_or(defaults.rounds);
    let cycles = match args.cycles.or(schedule_file.cycles) {
        Some(per_round) => CycleBudget::PerRound(per_round),
        None => CycleBudget::estimated(initial.dof_counts(Some(&library))),
    };
    let start = schedule_file.temperature.unwrap_or(defaults.temperature);
    let temperature = match schedule_file.final_temperature {
        Some(end) => TemperatureSchedule::Ladder { start, end },
        None => TemperatureSchedule::Constant(start),
    };
    let exhaustion = if args.strict {
        ExhaustionPolicy::Strict
    } else {
        schedule_file.exhaustion.unwrap_or_default()
    };

    let closure_file = file_config.closure.take().unwrap_or_default();
    let closure_tolerance = closure_file
        .tolerance
        .unwrap_or(defaults.closure_tolerance);
    let (closure, close_at_end) = merge_closure(args.no_closure, &closure_file, &defaults);

    let mut builder = ScheduleConfigBuilder::new()
        .rounds(rounds)
        .cycles(cycles)
        .temperature(temperature)
        .max_tries(
            args.max_tries
                .or(schedule_file.max_tries)
                .unwrap_or(defaults.max_tries),
        )
        .exhaustion(exhaustion)
        .closure(closure)
        .closure_acceptance(closure_file.acceptance.unwrap_or_default())
        .closure_tolerance(closure_tolerance)
        .close_at_end(close_at_end)
        .recover_low_each_round(schedule_file.recover_low.unwrap_or(defaults.recover_low))
        .heat_cycles(schedule_file.heat_cycles.unwrap_or(defaults.heat_cycles));

    if let Some(trials) = schedule_file.max_trials {
        builder = builder.max_trials(trials);
    }
    if let Some(secs) = schedule_file.max_wall_time_secs {
        let limit = Duration::try_from_secs_f64(secs).map_err(|e| {
            CliError::Config(format!(
                "Invalid `schedule.max-wall-time-secs` value {}: {}",
                secs, e
            ))
        })?;
        builder = builder.max_wall_time(limit);
    }
    for (kind, schedule) in movers::default_granularity() {
        builder = builder.granularity(kind, schedule);
    }
    for (term, ramp) in merge_ramps(std::mem::take(&mut file_config.ramps))? {
        builder = builder.weight_ramp(term, ramp);
    }
    let schedule = builder.build()?;

    let weights = merge_weights(&file_config.weights)?;
    let move_weights = merge_move_weights(&file_config.moves)?;
    let checkpoints = merge_checkpoints(
        file_config.checkpoints.take(),
        closure_tolerance,
        args.no_closure,
        rounds,
    )?;

    let batch_file = file_config.batch.take().unwrap_or_default();
    let batch = BatchConfig {
        nstruct: args
            .nstruct
            .or(batch_file.nstruct)
            .unwrap_or(defaults.nstruct),
        base_seed: args.seed.or(batch_file.seed).unwrap_or(defaults.seed),
        autofilter: batch_file.autofilter,
    };
    batch.validate()?;

    debug!(?schedule, ?batch, "Resolved fold configuration.");

    Ok(FoldConfig {
        output: args.output.clone(),
        write_models: args.write_models,
        chain,
        schedule,
        weights,
        move_weights,
        checkpoints,
        batch,
    })
}

fn merge_closure(
    cli_no_closure: bool,
    file_val: &FileClosureConfig,
    defaults: &DefaultsConfig,
) -> (ClosurePolicy, bool) {
    if cli_no_closure {
        return (ClosurePolicy::Never, false);
    }
    let policy = match file_val.policy.unwrap_or(FileClosurePolicy::FinalRounds) {
        FileClosurePolicy::Never => ClosurePolicy::Never,
        FileClosurePolicy::EveryMove => ClosurePolicy::EveryMove,
        FileClosurePolicy::FinalRounds => ClosurePolicy::FinalRounds(
            file_val
                .final_rounds
                .unwrap_or(defaults.closure_final_rounds),
        ),
    };
    (
        policy,
        file_val.close_at_end.unwrap_or(defaults.close_at_end),
    )
}

fn require_term(term: &str, context: &str) -> Result<()> {
    if terms::TERM_NAMES.contains(&term) {
        Ok(())
    } else {
        Err(CliError::Config(format!(
            "Unknown score term '{}' in `{}`. Expected one of: {}",
            term,
            context,
            terms::TERM_NAMES.join(", ")
        )))
    }
}

fn merge_ramps(file_val: BTreeMap<String, FileRampConfig>) -> Result<BTreeMap<String, WeightRamp>> {
    let mut ramps = BTreeMap::from([(terms::CHAINBREAK.to_string(), WeightRamp::linear())]);
    for (term, ramp) in file_val {
        require_term(&term, "ramps")?;
        let mut resolved = match ramp.shape {
            FileRampShape::Constant => WeightRamp::constant(),
            FileRampShape::Linear => WeightRamp::linear(),
            FileRampShape::Delayed => {
                let onset = ramp.onset.ok_or_else(|| {
                    CliError::Config(format!("Delayed ramp for '{}' requires `onset`", term))
                })?;
                WeightRamp::delayed(onset, ramp.floor.unwrap_or(0.0))
            }
        };
        if let Some(target) = ramp.target {
            resolved = resolved.with_target(target);
        }
        ramps.insert(term, resolved);
    }
    Ok(ramps)
}

fn merge_weights(file_val: &BTreeMap<String, f64>) -> Result<BTreeMap<String, f64>> {
    let mut weights: BTreeMap<String, f64> = terms::TERM_NAMES
        .iter()
        .map(|&term| (term.to_string(), terms::default_weight(term).unwrap_or(0.0)))
        .collect();
    for (term, &weight) in file_val {
        require_term(term, "weights")?;
        if !weight.is_finite() {
            return Err(CliError::Config(format!(
                "Weight for '{}' must be finite, got {}",
                term, weight
            )));
        }
        weights.insert(term.clone(), weight);
    }
    Ok(weights)
}

fn parse_move_kind(name: &str) -> Result<MoveKind> {
    MoveKind::ALL
        .into_iter()
        .find(|kind| kind.as_str() == name)
        .ok_or_else(|| {
            CliError::Config(format!(
                "Unknown move kind '{}'. Expected one of: fragment, rigid-body, chunk, jump",
                name
            ))
        })
}

fn merge_move_weights(file_val: &BTreeMap<String, f64>) -> Result<BTreeMap<MoveKind, f64>> {
    let mut weights: BTreeMap<MoveKind, f64> = MoveKind::ALL
        .into_iter()
        .map(|kind| (kind, movers::default_move_weight(kind)))
        .collect();
    for (name, &weight) in file_val {
        let kind = parse_move_kind(name)?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(CliError::Config(format!(
                "Move weight for '{}' must be finite and non-negative, got {}",
                name, weight
            )));
        }
        weights.insert(kind, weight);
    }
    Ok(weights)
}

fn parse_checkpoint_round(value: &toml::Value, rounds: usize) -> Result<CheckpointRound> {
    let round = match value {
        toml::Value::String(name) => match name.as_str() {
            "early" => CheckpointRound::Early,
            "halfway" => CheckpointRound::Halfway,
            "final" => CheckpointRound::Final,
            other => {
                return Err(CliError::Config(format!(
                    "Unknown checkpoint round '{}'. Expected early, halfway, final, or a round number",
                    other
                )));
            }
        },
        toml::Value::Integer(n) if *n >= 1 && (*n as u64) <= rounds as u64 => {
            CheckpointRound::At(*n as usize)
        }
        other => {
            return Err(CliError::Config(format!(
                "Checkpoint round {} is outside 1..={}",
                other, rounds
            )));
        }
    };
    Ok(round)
}

fn merge_checkpoints(
    file_val: Option<Vec<FileCheckpointConfig>>,
    closure_tolerance: f64,
    cli_no_closure: bool,
    rounds: usize,
) -> Result<Vec<CheckpointSpec>> {
    let Some(entries) = file_val else {
        if cli_no_closure {
            return Ok(Vec::new());
        }
        return Ok(vec![CheckpointSpec {
            round: CheckpointRound::Final,
            filter: CheckpointFilter::ClosureResidual,
            tolerance: closure_tolerance,
        }]);
    };

    let mut checkpoints = Vec::with_capacity(entries.len());
    for entry in entries {
        let round = parse_checkpoint_round(&entry.round, rounds)?;
        let spec = match entry.filter {
            FileFilterKind::ClosureResidual => {
                if cli_no_closure {
                    debug!(?round, "Dropping closure-residual checkpoint: closure is disabled.");
                    continue;
                }
                CheckpointSpec {
                    round,
                    filter: CheckpointFilter::ClosureResidual,
                    tolerance: entry.tolerance.unwrap_or(closure_tolerance),
                }
            }
            FileFilterKind::ScoreCeiling => CheckpointSpec {
                round,
                filter: CheckpointFilter::ScoreCeiling,
                tolerance: entry.tolerance.ok_or_else(|| {
                    CliError::Config(
                        "A `score-ceiling` checkpoint requires `tolerance` (the ceiling)".to_string(),
                    )
                })?,
            },
        };
        checkpoints.push(spec);
    }
    Ok(checkpoints)
}

fn parse_value<T: FromStr>(key: &str, value_str: &str) -> Result<T> {
    value_str
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value_str)))
}

fn parse_enum<T: DeserializeOwned>(key: &str, value_str: &str) -> Result<T> {
    T::deserialize(value_str.trim().into_deserializer()).map_err(|e: serde::de::value::Error| {
        CliError::Config(format!("Invalid value for {}: {} ({})", key, value_str, e))
    })
}

fn parse_list(key: &str, value_str: &str) -> Result<Vec<usize>> {
    value_str
        .split(',')
        .map(|item| parse_value(key, item))
        .collect()
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();

        match key {
            "chain.segments" => {
                config.chain.get_or_insert_with(Default::default).segments =
                    Some(parse_list(key, value_str)?);
            }
            "chain.bond-length" => {
                config.chain.get_or_insert_with(Default::default).bond_length =
                    Some(parse_value(key, value_str)?);
            }
            "chain.chunk-lengths" => {
                config.chain.get_or_insert_with(Default::default).chunk_lengths =
                    Some(parse_list(key, value_str)?);
            }
            "schedule.rounds" => {
                config.schedule.get_or_insert_with(Default::default).rounds =
                    Some(parse_value(key, value_str)?);
            }
            "schedule.cycles" => {
                config.schedule.get_or_insert_with(Default::default).cycles =
                    Some(parse_value(key, value_str)?);
            }
            "schedule.temperature" => {
                config.schedule.get_or_insert_with(Default::default).temperature =
                    Some(parse_value(key, value_str)?);
            }
            "schedule.final-temperature" => {
                config
                    .schedule
                    .get_or_insert_with(Default::default)
                    .final_temperature = Some(parse_value(key, value_str)?);
            }
            "schedule.max-tries" => {
                config.schedule.get_or_insert_with(Default::default).max_tries =
                    Some(parse_value(key, value_str)?);
            }
            "schedule.exhaustion" => {
                config.schedule.get_or_insert_with(Default::default).exhaustion =
                    Some(parse_enum(key, value_str)?);
            }
            "schedule.heat-cycles" => {
                config.schedule.get_or_insert_with(Default::default).heat_cycles =
                    Some(parse_value(key, value_str)?);
            }
            "schedule.recover-low" => {
                config.schedule.get_or_insert_with(Default::default).recover_low =
                    Some(parse_value(key, value_str)?);
            }
            "schedule.max-trials" => {
                config.schedule.get_or_insert_with(Default::default).max_trials =
                    Some(parse_value(key, value_str)?);
            }
            "schedule.max-wall-time-secs" => {
                config
                    .schedule
                    .get_or_insert_with(Default::default)
                    .max_wall_time_secs = Some(parse_value(key, value_str)?);
            }
            "closure.policy" => {
                config.closure.get_or_insert_with(Default::default).policy =
                    Some(parse_enum(key, value_str)?);
            }
            "closure.final-rounds" => {
                config.closure.get_or_insert_with(Default::default).final_rounds =
                    Some(parse_value(key, value_str)?);
            }
            "closure.acceptance" => {
                config.closure.get_or_insert_with(Default::default).acceptance =
                    Some(parse_enum(key, value_str)?);
            }
            "closure.tolerance" => {
                config.closure.get_or_insert_with(Default::default).tolerance =
                    Some(parse_value(key, value_str)?);
            }
            "closure.close-at-end" => {
                config.closure.get_or_insert_with(Default::default).close_at_end =
                    Some(parse_value(key, value_str)?);
            }
            "batch.nstruct" => {
                config.batch.get_or_insert_with(Default::default).nstruct =
                    Some(parse_value(key, value_str)?);
            }
            "batch.seed" => {
                config.batch.get_or_insert_with(Default::default).seed =
                    Some(parse_value(key, value_str)?);
            }
            "batch.autofilter" => {
                config.batch.get_or_insert_with(Default::default).autofilter =
                    Some(parse_value(key, value_str)?);
            }
            _ => {
                if let Some(term) = key.strip_prefix("weights.") {
                    config
                        .weights
                        .insert(term.to_string(), parse_value(key, value_str)?);
                } else if let Some(kind) = key.strip_prefix("moves.") {
                    config
                        .moves
                        .insert(kind.to_string(), parse_value(key, value_str)?);
                } else if let Some(term) = key.strip_prefix("ramps.") {
                    let shape: FileRampShape = parse_enum(key, value_str)?;
                    config.ramps.insert(
                        term.to_string(),
                        FileRampConfig {
                            shape,
                            onset: None,
                            floor: None,
                            target: None,
                        },
                    );
                } else {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::TEMPLATE;
    use stagemc::engine::config::ClosureAcceptance;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn base_fold_args() -> FoldArgs {
        FoldArgs {
            output: PathBuf::from("summary.csv"),
            ..Default::default()
        }
    }

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn build_config_without_file_uses_defaults() {
        let cfg = build_config(&base_fold_args()).expect("build ok");
        let defaults = DefaultsConfig::default();

        assert_eq!(cfg.chain.segments, defaults.segments);
        assert_eq!(cfg.schedule.rounds, defaults.rounds);
        assert_eq!(
            cfg.schedule.temperature,
            TemperatureSchedule::Constant(defaults.temperature)
        );
        assert!(matches!(cfg.schedule.cycles, CycleBudget::Estimated { .. }));
        assert_eq!(
            cfg.schedule.closure,
            ClosurePolicy::FinalRounds(defaults.closure_final_rounds)
        );
        assert!(cfg.schedule.close_at_end);
        assert_eq!(cfg.schedule.exhaustion, ExhaustionPolicy::KeepBest);
        assert_eq!(
            cfg.schedule.weight_ramps.get(terms::CHAINBREAK),
            Some(&WeightRamp::linear())
        );
        assert_eq!(cfg.weights.len(), 4);
        assert_eq!(cfg.weights[terms::CLASH], 4.0);
        assert_eq!(cfg.move_weights[&MoveKind::Fragment], 1.0);
        assert_eq!(
            cfg.checkpoints,
            vec![CheckpointSpec {
                round: CheckpointRound::Final,
                filter: CheckpointFilter::ClosureResidual,
                tolerance: defaults.closure_tolerance,
            }]
        );
        assert_eq!(cfg.batch.nstruct, 1);
        assert_eq!(cfg.batch.autofilter, None);
    }

    #[test]
    fn template_matches_builtin_defaults() {
        let dir = tempdir().unwrap();
        let mut args = base_fold_args();
        args.config = Some(write_config(dir.path(), TEMPLATE));

        let from_template = build_config(&args).expect("template builds");
        let from_defaults = build_config(&base_fold_args()).unwrap();

        assert_eq!(from_template.schedule, from_defaults.schedule);
        assert_eq!(from_template.chain, from_defaults.chain);
        assert_eq!(from_template.weights, from_defaults.weights);
        assert_eq!(from_template.move_weights, from_defaults.move_weights);
        assert_eq!(from_template.checkpoints, from_defaults.checkpoints);
        assert_eq!(from_template.batch, from_defaults.batch);
    }

    #[test]
    fn build_config_reads_file_and_cli_overrides_it() {
        let dir = tempdir().unwrap();
        let toml = r#"
            [chain]
            segments = [5, 6]
            bond-length = 1.5

            [schedule]
            rounds = 5
            cycles = 100
            temperature = 3.0
            final-temperature = 0.5
            max-tries = 2

            [batch]
            nstruct = 4
            seed = 9
            autofilter = 0.5

            [[checkpoints]]
            round = 2
            filter = "score-ceiling"
            tolerance = 10.0
            "#;
        let mut args = base_fold_args();
        args.config = Some(write_config(dir.path(), toml));
        args.rounds = Some(2);
        args.nstruct = Some(6);
        args.strict = true;

        let cfg = build_config(&args).expect("build ok");

        assert_eq!(cfg.chain.segments, vec![5, 6]);
        assert_eq!(cfg.chain.bond_length, 1.5);
        assert_eq!(cfg.schedule.rounds, 2);
        assert_eq!(cfg.schedule.cycles, CycleBudget::PerRound(100));
        assert_eq!(
            cfg.schedule.temperature,
            TemperatureSchedule::Ladder {
                start: 3.0,
                end: 0.5
            }
        );
        assert_eq!(cfg.schedule.max_tries, 2);
        assert_eq!(cfg.schedule.exhaustion, ExhaustionPolicy::Strict);
        assert_eq!(cfg.batch.nstruct, 6);
        assert_eq!(cfg.batch.base_seed, 9);
        assert_eq!(cfg.batch.autofilter, Some(0.5));
        assert_eq!(
            cfg.checkpoints,
            vec![CheckpointSpec {
                round: CheckpointRound::At(2),
                filter: CheckpointFilter::ScoreCeiling,
                tolerance: 10.0,
            }]
        );
    }

    #[test]
    fn no_closure_disables_closure_and_its_checkpoints() {
        let mut args = base_fold_args();
        args.no_closure = true;

        let cfg = build_config(&args).expect("build ok");
        assert_eq!(cfg.schedule.closure, ClosurePolicy::Never);
        assert!(!cfg.schedule.close_at_end);
        assert!(!cfg.schedule.needs_closer());
        assert!(cfg.checkpoints.is_empty());
    }

    #[test]
    fn set_values_override_file_and_defaults() {
        let mut args = base_fold_args();
        args.set_values = vec![
            "schedule.cycles=50".to_string(),
            "schedule.exhaustion=keep-last".to_string(),
            "closure.policy=final-rounds".to_string(),
            "closure.final-rounds=2".to_string(),
            "closure.acceptance=mandatory".to_string(),
            "batch.autofilter=0.25".to_string(),
            "weights.chainbreak=3.5".to_string(),
            "moves.jump=0".to_string(),
            "chain.segments=4,4".to_string(),
            "ramps.compactness=linear".to_string(),
        ];

        let cfg = build_config(&args).expect("build ok");

        assert_eq!(cfg.schedule.cycles, CycleBudget::PerRound(50));
        assert_eq!(cfg.schedule.exhaustion, ExhaustionPolicy::KeepLast);
        assert_eq!(cfg.schedule.closure, ClosurePolicy::FinalRounds(2));
        assert_eq!(cfg.schedule.closure_acceptance, ClosureAcceptance::Mandatory);
        assert_eq!(cfg.batch.autofilter, Some(0.25));
        assert_eq!(cfg.weights[terms::CHAINBREAK], 3.5);
        assert_eq!(cfg.move_weights[&MoveKind::Jump], 0.0);
        assert_eq!(cfg.chain.segments, vec![4, 4]);
        assert_eq!(
            cfg.schedule.weight_ramps.get(terms::COMPACTNESS),
            Some(&WeightRamp::linear())
        );
    }

    #[test]
    fn invalid_set_values_are_rejected() {
        for bad in [
            "schedule.rounds",
            "schedule.rounds=many",
            "schedule.exhaustion=sometimes",
            "optimization.num-solutions=3",
            "weights.hbond=1.0",
            "moves.loop=1.0",
        ] {
            let mut args = base_fold_args();
            args.set_values = vec![bad.to_string()];
            assert!(
                matches!(build_config(&args), Err(CliError::Config(_))),
                "expected config error for {}",
                bad
            );
        }
    }

    #[test]
    fn invalid_file_contents_are_rejected() {
        let dir = tempdir().unwrap();
        let mut args = base_fold_args();

        args.config = Some(write_config(dir.path(), "[schedule]\nrounds = 3\nspeed = 2\n"));
        assert!(matches!(build_config(&args), Err(CliError::FileParsing { .. })));

        args.config = Some(write_config(
            dir.path(),
            "[[checkpoints]]\nround = 9\nfilter = \"closure-residual\"\n",
        ));
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));

        args.config = Some(write_config(dir.path(), "[ramps.clash]\nshape = \"delayed\"\n"));
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));

        args.config = Some(write_config(dir.path(), "[chain]\nsegments = [3, 0]\n"));
        assert!(matches!(build_config(&args), Err(CliError::Model(_))));

        args.config = Some(write_config(dir.path(), "[schedule]\ntemperature = -1.0\n"));
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));
    }
}
