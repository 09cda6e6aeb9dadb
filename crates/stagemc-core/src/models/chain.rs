use super::movers::ChunkLibrary;
use crate::engine::config::DofCounts;
use nalgebra::{Point3, Rotation3, Vector3};
use thiserror::Error;

const MIN_BOND_NORM: f64 = 1e-9;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ModelError {
    #[error("A chain needs at least one segment")]
    NoSegments,
    #[error("Segment {0} has no beads")]
    EmptySegment(usize),
    #[error("Bond length must be positive and finite, got {0}")]
    InvalidBondLength(f64),
    #[error("Bond {bond} of segment {segment} has zero length")]
    DegenerateBond { segment: usize, bond: usize },
    #[error("Chunk {0} contains a zero-length bond")]
    DegenerateChunk(usize),
}

/// A rigid run of beads: an origin bead followed by unit bond directions.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub origin: Point3<f64>,
    /// Bead `k + 1` sits one bond length along `bonds[k]` from bead `k`.
    pub bonds: Vec<Vector3<f64>>,
}

impl Segment {
    pub fn num_beads(&self) -> usize {
        self.bonds.len() + 1
    }

    pub fn beads(&self, bond_length: f64) -> Vec<Point3<f64>> {
        let mut beads = Vec::with_capacity(self.num_beads());
        let mut position = self.origin;
        beads.push(position);
        for bond in &self.bonds {
            position += bond * bond_length;
            beads.push(position);
        }
        beads
    }

    pub fn end(&self, bond_length: f64) -> Point3<f64> {
        self.origin + self.bonds.iter().sum::<Vector3<f64>>() * bond_length
    }

    pub fn centroid(&self, bond_length: f64) -> Point3<f64> {
        let beads = self.beads(bond_length);
        let sum: Vector3<f64> = beads.iter().map(|b| b.coords).sum();
        Point3::from(sum / beads.len() as f64)
    }

    /// Rotates the segment rigidly about `pivot`.
    pub fn rotate_about(&mut self, rotation: &Rotation3<f64>, pivot: &Point3<f64>) {
        self.origin = pivot + rotation * (self.origin - pivot);
        for bond in &mut self.bonds {
            *bond = rotation * *bond;
        }
    }

    pub fn translate(&mut self, offset: &Vector3<f64>) {
        self.origin += *offset;
    }
}

/// A coarse-grained multi-segment bead chain.
///
/// Consecutive segments are meant to be joined by one bond length between the
/// last bead of a segment and the origin of the next; moves may break that,
/// which the `chainbreak` term penalizes and the CCD closer repairs. The first
/// segment is the fixed frame of reference.
#[derive(Debug, Clone, PartialEq)]
pub struct BeadChain {
    segments: Vec<Segment>,
    bond_length: f64,
}

impl BeadChain {
    pub fn new(mut segments: Vec<Segment>, bond_length: f64) -> Result<Self, ModelError> {
        if !bond_length.is_finite() || bond_length <= 0.0 {
            return Err(ModelError::InvalidBondLength(bond_length));
        }
        if segments.is_empty() {
            return Err(ModelError::NoSegments);
        }
        for (s, segment) in segments.iter_mut().enumerate() {
            for (b, bond) in segment.bonds.iter_mut().enumerate() {
                let norm = bond.norm();
                if !norm.is_finite() || norm < MIN_BOND_NORM {
                    return Err(ModelError::DegenerateBond {
                        segment: s,
                        bond: b,
                    });
                }
                *bond /= norm;
            }
        }
        Ok(Self {
            segments,
            bond_length,
        })
    }

    /// A straight chain along x; `segment_lengths` are bead counts.
    pub fn extended(segment_lengths: &[usize], bond_length: f64) -> Result<Self, ModelError> {
        let mut segments = Vec::with_capacity(segment_lengths.len());
        let mut placed = 0usize;
        for (index, &beads) in segment_lengths.iter().enumerate() {
            if beads == 0 {
                return Err(ModelError::EmptySegment(index));
            }
            segments.push(Segment {
                origin: Point3::new(placed as f64 * bond_length, 0.0, 0.0),
                bonds: vec![Vector3::x(); beads - 1],
            });
            placed += beads;
        }
        Self::new(segments, bond_length)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub(crate) fn segment_mut(&mut self, index: usize) -> &mut Segment {
        &mut self.segments[index]
    }

    pub fn bond_length(&self) -> f64 {
        self.bond_length
    }

    pub fn num_beads(&self) -> usize {
        self.segments.iter().map(Segment::num_beads).sum()
    }

    pub fn bead_positions(&self) -> Vec<Point3<f64>> {
        self.segments
            .iter()
            .flat_map(|s| s.beads(self.bond_length))
            .collect()
    }

    /// Distances between the end of each segment and the origin of the next.
    pub fn gaps(&self) -> Vec<f64> {
        self.segments
            .windows(2)
            .map(|pair| nalgebra::distance(&pair[0].end(self.bond_length), &pair[1].origin))
            .collect()
    }

    /// Largest deviation of any inter-segment gap from one bond length.
    pub fn max_gap_error(&self) -> f64 {
        self.gaps()
            .into_iter()
            .map(|gap| (gap - self.bond_length).abs())
            .fold(0.0, f64::max)
    }

    pub fn dof_counts(&self, chunks: Option<&ChunkLibrary>) -> DofCounts {
        DofCounts {
            moving_units: self.segments.iter().map(|s| s.bonds.len()).sum(),
            chunks: chunks.map_or(0, |library| {
                self.segments
                    .iter()
                    .filter(|s| library.has_length(s.bonds.len()))
                    .count()
            }),
            moving_bodies: self.segments.len() - 1,
        }
    }
}
