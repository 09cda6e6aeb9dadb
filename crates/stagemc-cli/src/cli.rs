use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "stagemc CLI - Staged Monte Carlo conformational search over coarse-grained bead chains.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used to run trajectories in parallel.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a batch of staged Monte Carlo trajectories and write a ranked score summary.
    Fold(FoldArgs),
    /// Write a configuration file populated with the default settings.
    Template(TemplateArgs),
}

/// Arguments for the `fold` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct FoldArgs {
    // --- Core Arguments ---
    /// Path to the configuration file in TOML format. Defaults are used when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path for the CSV score summary.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    // --- Batch Overrides ---
    /// Override the number of independent trajectories (output models).
    #[arg(short = 'n', long, value_name = "INT")]
    pub nstruct: Option<usize>,

    /// Override the base random seed; model i runs with seed + i.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    // --- Schedule Overrides ---
    /// Override the number of rounds per attempt.
    #[arg(long, value_name = "INT")]
    pub rounds: Option<usize>,

    /// Override the number of Monte Carlo cycles per round.
    #[arg(long, value_name = "INT")]
    pub cycles: Option<usize>,

    /// Override the maximum number of attempts per trajectory.
    #[arg(long, value_name = "INT")]
    pub max_tries: Option<usize>,

    /// Report a trajectory as failed when it never passes its checkpoints.
    #[arg(long)]
    pub strict: bool,

    /// Disable chain closure, even if it is enabled in the config file.
    #[arg(long)]
    pub no_closure: bool,

    /// Write the bead coordinates of every model next to the summary.
    #[arg(long)]
    pub write_models: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S schedule.rounds=5
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `template` subcommand.
#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Path for the generated configuration file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Overwrite the file if it already exists.
    #[arg(long)]
    pub force: bool,
}
