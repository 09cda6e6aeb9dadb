use super::candidate::Candidate;
use super::closure::Closer;

/// Outcome of a quality filter evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointResult {
    pub passed: bool,
    pub reason: String,
}

impl CheckpointResult {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

/// A side-effect-free pass/fail predicate evaluated at checkpoint rounds.
pub trait QualityFilter<S>: Send + Sync {
    fn name(&self) -> &str {
        "filter"
    }

    fn check(&self, candidate: &Candidate<S>, tolerance: f64) -> CheckpointResult;
}

impl<S, F> QualityFilter<S> for F
where
    F: Fn(&Candidate<S>, f64) -> CheckpointResult + Send + Sync,
{
    fn check(&self, candidate: &Candidate<S>, tolerance: f64) -> CheckpointResult {
        self(candidate, tolerance)
    }
}

/// Passes when the candidate's score is at or below the tolerance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreCeilingFilter;

impl<S> QualityFilter<S> for ScoreCeilingFilter {
    fn name(&self) -> &str {
        "score-ceiling"
    }

    fn check(&self, candidate: &Candidate<S>, tolerance: f64) -> CheckpointResult {
        if candidate.score <= tolerance {
            CheckpointResult::pass(format!(
                "score {:.3} within ceiling {:.3}",
                candidate.score, tolerance
            ))
        } else {
            CheckpointResult::fail(format!(
                "score {:.3} above ceiling {:.3}",
                candidate.score, tolerance
            ))
        }
    }
}

/// Passes when the closure residual of the candidate is at or below the tolerance.
pub struct ClosureResidualFilter<C> {
    closer: C,
}

impl<C> ClosureResidualFilter<C> {
    pub fn new(closer: C) -> Self {
        Self { closer }
    }
}

impl<S, C> QualityFilter<S> for ClosureResidualFilter<C>
where
    C: Closer<S>,
{
    fn name(&self) -> &str {
        "closure-residual"
    }

    fn check(&self, candidate: &Candidate<S>, tolerance: f64) -> CheckpointResult {
        let residual = self.closer.residual(&candidate.state);
        CheckpointResult {
            passed: residual <= tolerance,
            reason: format!(
                "chain closure residual {:.3} (tolerance {:.3})",
                residual, tolerance
            ),
        }
    }
}

/// Conjunction of filters sharing one tolerance; reports the first failure.
pub struct AllOf<S> {
    filters: Vec<Box<dyn QualityFilter<S>>>,
}

impl<S> Default for AllOf<S> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
        }
    }
}

impl<S> AllOf<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl QualityFilter<S> + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl<S> QualityFilter<S> for AllOf<S> {
    fn name(&self) -> &str {
        "all-of"
    }

    fn check(&self, candidate: &Candidate<S>, tolerance: f64) -> CheckpointResult {
        for filter in &self.filters {
            let result = filter.check(candidate, tolerance);
            if !result.passed {
                return CheckpointResult::fail(format!("{}: {}", filter.name(), result.reason));
            }
        }
        CheckpointResult::pass(format!("all {} filters passed", self.filters.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::closure::ClosureOutcome;

    struct OffsetCloser;

    impl Closer<f64> for OffsetCloser {
        fn close(&self, state: &f64) -> ClosureOutcome<f64> {
            ClosureOutcome {
                state: state.round(),
                success: true,
                residual_error: 0.0,
            }
        }

        fn residual(&self, state: &f64) -> f64 {
            (state - state.round()).abs()
        }
    }

    #[test]
    fn score_ceiling_filter_compares_against_tolerance() {
        let low = Candidate::new((), -5.0);
        let high = Candidate::new((), 5.0);
        assert!(ScoreCeilingFilter.check(&low, 0.0).passed);
        assert!(!ScoreCeilingFilter.check(&high, 0.0).passed);
    }

    #[test]
    fn closure_residual_filter_uses_closer_residual() {
        let filter = ClosureResidualFilter::new(OffsetCloser);
        assert!(filter.check(&Candidate::new(2.1, 0.0), 0.2).passed);
        let result = filter.check(&Candidate::new(2.4, 0.0), 0.2);
        assert!(!result.passed);
        assert!(result.reason.contains("0.400"));
    }

    #[test]
    fn all_of_reports_first_failure() {
        let filter = AllOf::new()
            .with(|_: &Candidate<f64>, _: f64| CheckpointResult::pass("ok"))
            .with(ScoreCeilingFilter)
            .with(|_: &Candidate<f64>, _: f64| CheckpointResult::fail("never reached"));
        let result = filter.check(&Candidate::new(0.0, 3.0), 1.0);
        assert!(!result.passed);
        assert!(result.reason.starts_with("score-ceiling"));
    }

    #[test]
    fn all_of_without_filters_passes() {
        let filter: AllOf<f64> = AllOf::new();
        assert!(filter.check(&Candidate::new(0.0, 100.0), 0.0).passed);
    }

    #[test]
    fn filters_do_not_modify_the_candidate() {
        let candidate = Candidate::new(2.4, 1.0);
        let before = candidate.clone();
        let _ = ClosureResidualFilter::new(OffsetCloser).check(&candidate, 0.1);
        assert_eq!(candidate.state, before.state);
        assert_eq!(candidate.score, before.score);
    }
}
