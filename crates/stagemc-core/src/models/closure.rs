use super::chain::BeadChain;
use crate::core::closure::{ClosureOutcome, Closer};
use nalgebra::{Rotation3, Vector3};
use tracing::trace;

const DEFAULT_MAX_ITERATIONS: usize = 100;
const DEFAULT_WINDOW: usize = 3;

/// Cyclic coordinate descent over the last bonds of each segment.
///
/// For every gap whose length deviates from one bond length by more than
/// `tolerance`, the closer repeatedly rotates the tail of the preceding
/// segment about each of its last `window` beads, bringing the segment end
/// onto the sphere of one bond length around the next segment's origin. The
/// following segment is never moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CcdCloser {
    tolerance: f64,
    max_iterations: usize,
    window: usize,
}

impl CcdCloser {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            window: DEFAULT_WINDOW,
        }
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn gap_error(chain: &BeadChain, gap: usize) -> f64 {
        let segments = chain.segments();
        let bond_length = chain.bond_length();
        let distance = nalgebra::distance(&segments[gap].end(bond_length), &segments[gap + 1].origin);
        (distance - bond_length).abs()
    }

    fn close_gap(&self, chain: &mut BeadChain, gap: usize) {
        let bond_length = chain.bond_length();
        let anchor = chain.segments()[gap + 1].origin;
        let bonds = chain.segments()[gap].bonds.len();
        let first_pivot = bonds.saturating_sub(self.window);

        for iteration in 0..self.max_iterations {
            if Self::gap_error(chain, gap) <= self.tolerance {
                trace!(gap, iteration, "Gap closed");
                return;
            }
            for pivot in (first_pivot..bonds).rev() {
                let segment = chain.segment_mut(gap);
                let beads = segment.beads(bond_length);
                let end = beads[bonds];

                let offset = end - anchor;
                let direction = if offset.norm() > f64::EPSILON {
                    offset.normalize()
                } else {
                    Vector3::x()
                };
                let target = anchor + direction * bond_length;

                let from = end - beads[pivot];
                let to = target - beads[pivot];
                if let Some(rotation) = Rotation3::rotation_between(&from, &to) {
                    for bond in &mut segment.bonds[pivot..] {
                        *bond = (rotation * *bond).normalize();
                    }
                }
            }
        }
    }
}

impl Closer<BeadChain> for CcdCloser {
    fn close(&self, chain: &BeadChain) -> ClosureOutcome<BeadChain> {
        let mut closed = chain.clone();
        for gap in 0..chain.segments().len().saturating_sub(1) {
            if Self::gap_error(&closed, gap) > self.tolerance {
                self.close_gap(&mut closed, gap);
            }
        }
        let residual_error = closed.max_gap_error();
        ClosureOutcome {
            state: closed,
            success: residual_error <= self.tolerance,
            residual_error,
        }
    }

    fn residual(&self, chain: &BeadChain) -> f64 {
        chain.max_gap_error()
    }
}
