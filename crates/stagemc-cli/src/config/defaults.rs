pub struct DefaultsConfig {
    pub segments: Vec<usize>,
    pub bond_length: f64,
    pub chunk_lengths: Vec<usize>,
    pub rounds: usize,
    pub temperature: f64,
    pub max_tries: usize,
    pub heat_cycles: usize,
    pub recover_low: bool,
    pub closure_final_rounds: usize,
    pub closure_tolerance: f64,
    pub close_at_end: bool,
    pub nstruct: usize,
    pub seed: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            segments: vec![8, 8, 8],
            bond_length: 1.0,
            chunk_lengths: vec![7],
            rounds: 3,
            temperature: 2.0,
            max_tries: 1,
            heat_cycles: 0,
            recover_low: true,
            closure_final_rounds: 1,
            closure_tolerance: 0.1,
            close_at_end: true,
            nstruct: 1,
            seed: 0,
        }
    }
}

/// The configuration written by `stagemc template`. Every key is optional;
/// omitted keys fall back to [`DefaultsConfig`].
pub const TEMPLATE: &str = r#"# stagemc fold configuration

[chain]
# Bead count of each rigid segment; the first segment is the fixed frame.
segments = [8, 8, 8]
bond-length = 1.0
# Bond counts of the ideal helical chunks available to chunk insertion.
chunk-lengths = [7]

[schedule]
rounds = 3
# Cycles per round. Omit to estimate from the chain's degrees of freedom.
# cycles = 2000
temperature = 2.0
# Set to cool geometrically within each round.
# final-temperature = 0.5
max-tries = 1
exhaustion = "keep-best"
heat-cycles = 0
recover-low = true
# max-trials = 100000
# max-wall-time-secs = 60.0

[closure]
# Close only in the last rounds, or on every move with "every-move".
policy = "final-rounds"
final-rounds = 1
acceptance = "separate-metropolis"
tolerance = 0.1
close-at-end = true

[batch]
nstruct = 1
seed = 0
# autofilter = 0.5

# Final score weights.
[weights]
contact = 1.0
clash = 4.0
chainbreak = 2.0
compactness = 0.1

# Per-term ramps: "constant", "linear", or "delayed" with onset and floor.
[ramps.chainbreak]
shape = "linear"

# Relative move selection weights.
[moves]
fragment = 1.0
rigid-body = 0.5
chunk = 0.5
jump = 0.2

# Round may be "early", "halfway", "final", or a round number.
[[checkpoints]]
round = "final"
filter = "closure-residual"
tolerance = 0.1
"#;
