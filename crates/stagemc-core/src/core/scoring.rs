use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Score term '{0}' is not defined in this score function")]
    UnknownTerm(String),
    #[error("Invalid weight {weight} for score term '{term}': weights must be finite")]
    InvalidWeight { term: String, weight: f64 },
}

/// The scoring collaborator: evaluates a state and owns a weight table keyed by term name.
///
/// Lower scores are better. A non-finite score is treated by the search as an
/// unacceptable state.
pub trait ScoreFunction<S> {
    fn score(&self, state: &S) -> f64;

    fn weight(&self, term: &str) -> Option<f64>;

    fn set_weight(&mut self, term: &str, weight: f64) -> Result<(), ScoringError>;

    fn term_names(&self) -> Vec<&str>;
}

impl<S, T> ScoreFunction<S> for &mut T
where
    T: ScoreFunction<S> + ?Sized,
{
    fn score(&self, state: &S) -> f64 {
        (**self).score(state)
    }

    fn weight(&self, term: &str) -> Option<f64> {
        (**self).weight(term)
    }

    fn set_weight(&mut self, term: &str, weight: f64) -> Result<(), ScoringError> {
        (**self).set_weight(term, weight)
    }

    fn term_names(&self) -> Vec<&str> {
        (**self).term_names()
    }
}

/// One unweighted component of a [`WeightedScoreFunction`].
pub trait ScoreTerm<S>: Send + Sync {
    fn evaluate(&self, state: &S) -> f64;
}

impl<S, F> ScoreTerm<S> for F
where
    F: Fn(&S) -> f64 + Send + Sync,
{
    fn evaluate(&self, state: &S) -> f64 {
        self(state)
    }
}

struct WeightedTerm<S> {
    name: String,
    weight: f64,
    term: Box<dyn ScoreTerm<S>>,
}

/// Per-term contributions of a single evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub terms: Vec<TermContribution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermContribution {
    pub name: String,
    pub raw: f64,
    pub weight: f64,
}

impl TermContribution {
    #[inline]
    pub fn weighted(&self) -> f64 {
        self.raw * self.weight
    }
}

impl ScoreBreakdown {
    #[inline]
    pub fn total(&self) -> f64 {
        self.terms.iter().map(TermContribution::weighted).sum()
    }

    pub fn get(&self, name: &str) -> Option<&TermContribution> {
        self.terms.iter().find(|t| t.name == name)
    }
}

/// A linear combination of named score terms.
///
/// Terms whose weight is exactly zero are skipped during evaluation, so
/// ramping a term up from zero also saves its cost in the early rounds.
pub struct WeightedScoreFunction<S> {
    terms: Vec<WeightedTerm<S>>,
}

impl<S> Default for WeightedScoreFunction<S> {
    fn default() -> Self {
        Self { terms: Vec::new() }
    }
}

impl<S> std::fmt::Debug for WeightedScoreFunction<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.terms.iter().map(|t| (&t.name, t.weight)))
            .finish()
    }
}

impl<S> WeightedScoreFunction<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a term, replacing any existing term with the same name.
    pub fn with_term(
        mut self,
        name: impl Into<String>,
        weight: f64,
        term: impl ScoreTerm<S> + 'static,
    ) -> Self {
        let name = name.into();
        self.terms.retain(|t| t.name != name);
        self.terms.push(WeightedTerm {
            name,
            weight,
            term: Box::new(term),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn breakdown(&self, state: &S) -> ScoreBreakdown {
        ScoreBreakdown {
            terms: self
                .terms
                .iter()
                .map(|t| TermContribution {
                    name: t.name.clone(),
                    raw: t.term.evaluate(state),
                    weight: t.weight,
                })
                .collect(),
        }
    }
}

impl<S> ScoreFunction<S> for WeightedScoreFunction<S> {
    fn score(&self, state: &S) -> f64 {
        self.terms
            .iter()
            .filter(|t| t.weight != 0.0)
            .map(|t| t.weight * t.term.evaluate(state))
            .sum()
    }

    fn weight(&self, term: &str) -> Option<f64> {
        self.terms.iter().find(|t| t.name == term).map(|t| t.weight)
    }

    fn set_weight(&mut self, term: &str, weight: f64) -> Result<(), ScoringError> {
        if !weight.is_finite() {
            return Err(ScoringError::InvalidWeight {
                term: term.to_string(),
                weight,
            });
        }
        let entry = self
            .terms
            .iter_mut()
            .find(|t| t.name == term)
            .ok_or_else(|| ScoringError::UnknownTerm(term.to_string()))?;
        entry.weight = weight;
        Ok(())
    }

    fn term_names(&self) -> Vec<&str> {
        self.terms.iter().map(|t| t.name.as_str()).collect()
    }
}
