/// Result of one closure attempt on a working copy of a state.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureOutcome<S> {
    pub state: S,
    pub success: bool,
    /// Remaining geometric discontinuity after the attempt, in model units.
    pub residual_error: f64,
}

/// The closure collaborator repairs chain discontinuities introduced by moves.
///
/// Implementations must be idempotent: closing an already closed state returns
/// it unchanged with `success == true`.
pub trait Closer<S>: Send + Sync {
    fn close(&self, state: &S) -> ClosureOutcome<S>;

    /// The current discontinuity of `state` without modifying it.
    fn residual(&self, state: &S) -> f64;
}
