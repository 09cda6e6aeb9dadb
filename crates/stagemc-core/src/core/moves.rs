use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of move families the scheduler knows how to ramp and count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveKind {
    Fragment,
    RigidBody,
    Chunk,
    Jump,
}

impl MoveKind {
    pub const ALL: [MoveKind; 4] = [
        MoveKind::Fragment,
        MoveKind::RigidBody,
        MoveKind::Chunk,
        MoveKind::Jump,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MoveKind::Fragment => "fragment",
            MoveKind::RigidBody => "rigid-body",
            MoveKind::Chunk => "chunk",
            MoveKind::Jump => "jump",
        }
    }
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The size of a move, ramped by the round scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Granularity {
    /// Number of consecutive positions replaced, e.g. a fragment length.
    Length(usize),
    /// Maximum rotation (degrees) and translation of a rigid-body perturbation.
    Perturbation { rotation: f64, translation: f64 },
    /// The move has no size parameter.
    #[default]
    Unit,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Length(n) => write!(f, "length {}", n),
            Granularity::Perturbation {
                rotation,
                translation,
            } => write!(f, "rot {:.3} / trans {:.3}", rotation, translation),
            Granularity::Unit => f.write_str("unit"),
        }
    }
}

/// A move generator proposes a new state from an existing one.
///
/// Returning `None` means the generator could not act on this state (nothing
/// suitable to insert, no free body to perturb); the dispatcher then tries
/// another move instead of counting a trial.
pub trait MoveGenerator<S>: Send + Sync {
    fn generate(&self, state: &S, granularity: &Granularity, rng: &mut dyn RngCore) -> Option<S>;

    /// Whether this generator has any movable target in `state`. Generators
    /// reporting `false` are excluded from selection for the trial.
    fn is_movable(&self, _state: &S) -> bool {
        true
    }
}

impl<S, F> MoveGenerator<S> for F
where
    F: Fn(&S, &Granularity, &mut dyn RngCore) -> Option<S> + Send + Sync,
{
    fn generate(&self, state: &S, granularity: &Granularity, rng: &mut dyn RngCore) -> Option<S> {
        self(state, granularity, rng)
    }
}

/// A registered move: its family, relative selection weight, generator and current size.
pub struct MoveSpec<S> {
    pub kind: MoveKind,
    pub weight: f64,
    pub generator: Box<dyn MoveGenerator<S>>,
    pub granularity: Granularity,
}

impl<S> MoveSpec<S> {
    pub fn new(kind: MoveKind, weight: f64, generator: impl MoveGenerator<S> + 'static) -> Self {
        Self {
            kind,
            weight,
            generator: Box::new(generator),
            granularity: Granularity::Unit,
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn generate(&self, state: &S, rng: &mut dyn RngCore) -> Option<S> {
        self.generator.generate(state, &self.granularity, rng)
    }
}

impl<S> fmt::Debug for MoveSpec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveSpec")
            .field("kind", &self.kind)
            .field("weight", &self.weight)
            .field("granularity", &self.granularity)
            .finish_non_exhaustive()
    }
}
