use crate::core::candidate::Candidate;

/// The values a trial displaced, retained until the next trial begins.
///
/// Only the first displaced value of each slot is kept, so a trial that
/// replaces the current candidate twice (an accepted move followed by an
/// accepted closure) still rolls back to the pre-trial state.
#[derive(Debug)]
pub(crate) struct TrialUndo<S> {
    current: Option<Candidate<S>>,
    best: Option<Candidate<S>>,
}

impl<S> Default for TrialUndo<S> {
    fn default() -> Self {
        Self {
            current: None,
            best: None,
        }
    }
}

impl<S> TrialUndo<S> {
    pub fn clear(&mut self) {
        self.current = None;
        self.best = None;
    }

    pub fn stash_current(&mut self, previous: Candidate<S>) {
        if self.current.is_none() {
            self.current = Some(previous);
        }
    }

    pub fn stash_best(&mut self, previous: Candidate<S>) {
        if self.best.is_none() {
            self.best = Some(previous);
        }
    }

    pub fn take_current(&mut self) -> Option<Candidate<S>> {
        self.current.take()
    }

    pub fn take_best(&mut self) -> Option<Candidate<S>> {
        self.best.take()
    }

    pub fn is_armed(&self) -> bool {
        self.current.is_some() || self.best.is_some()
    }
}
