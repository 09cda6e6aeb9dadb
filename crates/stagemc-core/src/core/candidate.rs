use std::cmp::Ordering;

/// One conformational state under search together with its cached score.
///
/// The scheduler never inspects `state`; it only clones it to snapshot the
/// best-so-far candidate and to build trial working copies.
#[derive(Debug, Clone)]
pub struct Candidate<S> {
    pub state: S,
    pub score: f64,
    /// Number of state replacements since the trajectory started. Diagnostic only.
    pub generation: u64,
}

impl<S> Candidate<S> {
    pub fn new(state: S, score: f64) -> Self {
        Self {
            state,
            score,
            generation: 0,
        }
    }

    /// Builds the candidate that replaces `self` after a successful trial.
    pub fn successor(&self, state: S, score: f64) -> Self {
        Self {
            state,
            score,
            generation: self.generation + 1,
        }
    }

    #[inline]
    pub fn is_lower_than(&self, other: &Self) -> bool {
        self.score < other.score
    }
}

impl<S> PartialEq for Candidate<S> {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.generation == other.generation
    }
}

impl<S> PartialOrd for Candidate<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.score.partial_cmp(&other.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_starts_at_generation_zero() {
        let candidate = Candidate::new("start", 12.5);
        assert_eq!(candidate.generation, 0);
        assert_eq!(candidate.score, 12.5);
    }

    #[test]
    fn successor_increments_generation_and_replaces_state() {
        let parent = Candidate::new(1_u32, 10.0);
        let child = parent.successor(2_u32, 8.0);
        assert_eq!(child.state, 2);
        assert_eq!(child.score, 8.0);
        assert_eq!(child.generation, 1);
    }

    #[test]
    fn is_lower_than_compares_scores_strictly() {
        let a = Candidate::new((), 1.0);
        let b = Candidate::new((), 2.0);
        assert!(a.is_lower_than(&b));
        assert!(!b.is_lower_than(&a));
        assert!(!a.is_lower_than(&a.clone()));
    }

    #[test]
    fn partial_cmp_orders_by_score() {
        let mut candidates = vec![
            Candidate::new('c', 3.0),
            Candidate::new('a', -1.0),
            Candidate::new('b', 0.5),
        ];
        candidates.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
        let states: String = candidates.iter().map(|c| c.state).collect();
        assert_eq!(states, "abc");
    }
}
