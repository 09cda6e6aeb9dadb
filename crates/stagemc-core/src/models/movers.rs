use super::chain::{BeadChain, ModelError};
use crate::core::moves::{Granularity, MoveGenerator, MoveKind, MoveSpec};
use crate::engine::ramp::GranularitySchedule;
use nalgebra::{Point3, Rotation3, Unit, Vector3};
use phf::phf_map;
use rand::RngCore;
use rand::prelude::*;
use rand_distr::UnitSphere;
use std::collections::BTreeMap;
use std::f64::consts::PI;

static DEFAULT_MOVE_WEIGHTS: phf::Map<&'static str, f64> = phf_map! {
    "fragment" => 1.0,
    "rigid-body" => 0.5,
    "chunk" => 0.5,
    "jump" => 0.2,
};

const DEFAULT_FRAGMENT_LENGTH: usize = 3;
const DEFAULT_ROTATION_DEGREES: f64 = 10.0;
const DEFAULT_TRANSLATION: f64 = 0.5;

pub fn default_move_weight(kind: MoveKind) -> f64 {
    DEFAULT_MOVE_WEIGHTS
        .get(kind.as_str())
        .copied()
        .unwrap_or(0.0)
}

fn random_unit(rng: &mut dyn RngCore) -> Vector3<f64> {
    let [x, y, z]: [f64; 3] = UnitSphere.sample(rng);
    Vector3::new(x, y, z)
}

fn random_rotation(max_degrees: f64, rng: &mut dyn RngCore) -> Rotation3<f64> {
    let axis = Unit::new_normalize(random_unit(rng));
    let limit = max_degrees.abs().to_radians().min(PI);
    if limit == 0.0 {
        return Rotation3::identity();
    }
    Rotation3::from_axis_angle(&axis, rng.gen_range(-limit..=limit))
}

fn rigid_segments(chain: &BeadChain) -> std::ops::Range<usize> {
    1..chain.segments().len()
}

/// Replaces a window of consecutive bonds inside one segment with random directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentMover;

impl MoveGenerator<BeadChain> for FragmentMover {
    fn generate(
        &self,
        chain: &BeadChain,
        granularity: &Granularity,
        rng: &mut dyn RngCore,
    ) -> Option<BeadChain> {
        let window = match *granularity {
            Granularity::Length(n) => n.max(1),
            _ => DEFAULT_FRAGMENT_LENGTH,
        };
        let total: usize = chain.segments().iter().map(|s| s.bonds.len()).sum();
        if total == 0 {
            return None;
        }

        let mut start = rng.gen_range(0..total);
        let mut segment = 0;
        while start >= chain.segments()[segment].bonds.len() {
            start -= chain.segments()[segment].bonds.len();
            segment += 1;
        }

        let mut next = chain.clone();
        let bonds = &mut next.segment_mut(segment).bonds;
        let end = (start + window).min(bonds.len());
        for bond in &mut bonds[start..end] {
            *bond = random_unit(rng);
        }
        Some(next)
    }

    fn is_movable(&self, chain: &BeadChain) -> bool {
        chain.segments().iter().any(|s| !s.bonds.is_empty())
    }
}

/// Rotates a non-first segment about its centroid, then translates it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RigidBodyMover;

impl MoveGenerator<BeadChain> for RigidBodyMover {
    fn generate(
        &self,
        chain: &BeadChain,
        granularity: &Granularity,
        rng: &mut dyn RngCore,
    ) -> Option<BeadChain> {
        let (rotation, translation) = match *granularity {
            Granularity::Perturbation {
                rotation,
                translation,
            } => (rotation, translation),
            _ => (DEFAULT_ROTATION_DEGREES, DEFAULT_TRANSLATION),
        };
        let index = rigid_segments(chain).choose(rng)?;

        let mut next = chain.clone();
        let bond_length = next.bond_length();
        let segment = next.segment_mut(index);
        let pivot = segment.centroid(bond_length);
        segment.rotate_about(&random_rotation(rotation, rng), &pivot);
        let step = if translation > 0.0 {
            rng.gen_range(0.0..=translation)
        } else {
            0.0
        };
        segment.translate(&(random_unit(rng) * step));
        Some(next)
    }

    fn is_movable(&self, chain: &BeadChain) -> bool {
        !rigid_segments(chain).is_empty()
    }
}

/// A set of pre-built bond-direction runs that can be dropped into segments
/// with the same number of bonds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkLibrary {
    chunks: Vec<Vec<Vector3<f64>>>,
}

impl ChunkLibrary {
    pub fn new(mut chunks: Vec<Vec<Vector3<f64>>>) -> Result<Self, ModelError> {
        for (index, chunk) in chunks.iter_mut().enumerate() {
            for bond in chunk.iter_mut() {
                let norm = bond.norm();
                if !norm.is_finite() || norm == 0.0 {
                    return Err(ModelError::DegenerateChunk(index));
                }
                *bond /= norm;
            }
        }
        chunks.retain(|c| !c.is_empty());
        Ok(Self { chunks })
    }

    /// Ideal helical runs, one per requested bond count.
    pub fn helices(lengths: &[usize]) -> Result<Self, ModelError> {
        const TWIST: f64 = 100.0;
        const RISE: f64 = 0.5;
        let chunks = lengths
            .iter()
            .filter(|&&n| n > 0)
            .map(|&n| {
                (0..n)
                    .map(|k| {
                        let phase = (k as f64 * TWIST).to_radians();
                        Vector3::new(phase.cos(), phase.sin(), RISE).normalize()
                    })
                    .collect()
            })
            .collect();
        Self::new(chunks)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn has_length(&self, bonds: usize) -> bool {
        self.chunks.iter().any(|c| c.len() == bonds)
    }

    pub fn matching(&self, bonds: usize) -> Vec<&[Vector3<f64>]> {
        self.chunks
            .iter()
            .filter(|c| c.len() == bonds)
            .map(Vec::as_slice)
            .collect()
    }
}

/// Replaces all bonds of a segment with a library chunk of equal length,
/// aligned so the first bond keeps its direction.
#[derive(Debug, Clone)]
pub struct ChunkMover {
    library: ChunkLibrary,
}

impl ChunkMover {
    pub fn new(library: ChunkLibrary) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &ChunkLibrary {
        &self.library
    }
}

impl MoveGenerator<BeadChain> for ChunkMover {
    fn generate(
        &self,
        chain: &BeadChain,
        _granularity: &Granularity,
        rng: &mut dyn RngCore,
    ) -> Option<BeadChain> {
        let targets: Vec<usize> = chain
            .segments()
            .iter()
            .enumerate()
            .filter(|(_, s)| self.library.has_length(s.bonds.len()))
            .map(|(i, _)| i)
            .collect();
        let &index = targets.choose(rng)?;
        let current = &chain.segments()[index].bonds;
        let &chunk = self.library.matching(current.len()).choose(rng)?;

        // Antiparallel first bonds have no unique alignment; keep the chunk frame.
        let alignment =
            Rotation3::rotation_between(&chunk[0], &current[0]).unwrap_or_else(Rotation3::identity);

        let mut next = chain.clone();
        next.segment_mut(index).bonds = chunk.iter().map(|b| alignment * b).collect();
        Some(next)
    }

    fn is_movable(&self, chain: &BeadChain) -> bool {
        !self.library.is_empty()
            && chain
                .segments()
                .iter()
                .any(|s| self.library.has_length(s.bonds.len()))
    }
}

/// Re-docks a non-first segment one bond length from the end of its
/// predecessor, in a fresh random orientation.
#[derive(Debug, Clone, Copy, Default)]
pub struct JumpMover;

impl MoveGenerator<BeadChain> for JumpMover {
    fn generate(
        &self,
        chain: &BeadChain,
        _granularity: &Granularity,
        rng: &mut dyn RngCore,
    ) -> Option<BeadChain> {
        let index = rigid_segments(chain).choose(rng)?;
        let bond_length = chain.bond_length();
        let anchor = chain.segments()[index - 1].end(bond_length);

        let mut next = chain.clone();
        let segment = next.segment_mut(index);
        let origin: Point3<f64> = anchor + random_unit(rng) * bond_length;
        let rotation = random_rotation(180.0, rng);
        let pivot = segment.origin;
        segment.rotate_about(&rotation, &pivot);
        segment.origin = origin;
        Some(next)
    }

    fn is_movable(&self, chain: &BeadChain) -> bool {
        !rigid_segments(chain).is_empty()
    }
}

/// The standard move set for bead chains. The chunk move is only registered
/// when a library is given.
pub fn default_moves(library: Option<ChunkLibrary>) -> Vec<MoveSpec<BeadChain>> {
    let mut moves = vec![
        MoveSpec::new(
            MoveKind::Fragment,
            default_move_weight(MoveKind::Fragment),
            FragmentMover,
        )
        .with_granularity(Granularity::Length(DEFAULT_FRAGMENT_LENGTH)),
        MoveSpec::new(
            MoveKind::RigidBody,
            default_move_weight(MoveKind::RigidBody),
            RigidBodyMover,
        )
        .with_granularity(Granularity::Perturbation {
            rotation: DEFAULT_ROTATION_DEGREES,
            translation: DEFAULT_TRANSLATION,
        }),
        MoveSpec::new(MoveKind::Jump, default_move_weight(MoveKind::Jump), JumpMover),
    ];
    if let Some(library) = library {
        moves.push(MoveSpec::new(
            MoveKind::Chunk,
            default_move_weight(MoveKind::Chunk),
            ChunkMover::new(library),
        ));
    }
    moves
}

/// Fragments shrink 3 → 2 → 1 over thirds of the run; rigid-body steps
/// shrink linearly until three quarters of the run.
pub fn default_granularity() -> BTreeMap<MoveKind, GranularitySchedule> {
    BTreeMap::from([
        (
            MoveKind::Fragment,
            GranularitySchedule::Stepped {
                coarse: 3,
                medium: 2,
                fine: 1,
            },
        ),
        (
            MoveKind::RigidBody,
            GranularitySchedule::Interpolated {
                start: Granularity::Perturbation {
                    rotation: DEFAULT_ROTATION_DEGREES,
                    translation: DEFAULT_TRANSLATION,
                },
                end: Granularity::Perturbation {
                    rotation: 0.2,
                    translation: 0.01,
                },
            },
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    fn changed_bonds(a: &BeadChain, b: &BeadChain) -> usize {
        a.segments()
            .iter()
            .zip(b.segments())
            .flat_map(|(x, y)| x.bonds.iter().zip(&y.bonds))
            .filter(|(p, q)| (*p - *q).norm() > 1e-12)
            .count()
    }

    #[test]
    fn fragment_mover_changes_at_most_window_bonds_in_one_segment() {
        let chain = BeadChain::extended(&[6, 6], 1.0).unwrap();
        let mut rng = rng();
        for _ in 0..50 {
            let next = FragmentMover
                .generate(&chain, &Granularity::Length(2), &mut rng)
                .unwrap();
            assert!(changed_bonds(&chain, &next) <= 2);
            assert_eq!(next.segments()[1].origin, chain.segments()[1].origin);
            for segment in next.segments() {
                for bond in &segment.bonds {
                    assert!((bond.norm() - 1.0).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn fragment_mover_is_not_movable_without_bonds() {
        let chain = BeadChain::extended(&[1], 1.0).unwrap();
        assert!(!FragmentMover.is_movable(&chain));
        assert!(
            FragmentMover
                .generate(&chain, &Granularity::Length(1), &mut rng())
                .is_none()
        );
    }

    #[test]
    fn rigid_body_mover_never_moves_first_segment() {
        let chain = BeadChain::extended(&[4, 4, 4], 1.0).unwrap();
        let granularity = Granularity::Perturbation {
            rotation: 30.0,
            translation: 1.0,
        };
        let mut rng = rng();
        for _ in 0..50 {
            let next = RigidBodyMover.generate(&chain, &granularity, &mut rng).unwrap();
            assert_eq!(next.segments()[0], chain.segments()[0]);
        }
        let single = BeadChain::extended(&[5], 1.0).unwrap();
        assert!(!RigidBodyMover.is_movable(&single));
        assert!(RigidBodyMover.generate(&single, &granularity, &mut rng).is_none());
    }

    #[test]
    fn rigid_body_mover_with_zero_granularity_is_identity() {
        let chain = BeadChain::extended(&[3, 3], 1.0).unwrap();
        let still = Granularity::Perturbation {
            rotation: 0.0,
            translation: 0.0,
        };
        let next = RigidBodyMover.generate(&chain, &still, &mut rng()).unwrap();
        let before = chain.bead_positions();
        for (a, b) in before.iter().zip(next.bead_positions()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn chunk_library_rejects_zero_bonds_and_matches_lengths() {
        assert_eq!(
            ChunkLibrary::new(vec![vec![Vector3::x()], vec![Vector3::zeros()]]),
            Err(ModelError::DegenerateChunk(1))
        );
        let library = ChunkLibrary::helices(&[2, 4, 4]).unwrap();
        assert_eq!(library.len(), 3);
        assert!(library.has_length(4));
        assert!(!library.has_length(3));
        assert_eq!(library.matching(4).len(), 2);
        assert!(!ChunkLibrary::default().has_length(0));
    }

    #[test]
    fn chunk_mover_keeps_first_bond_direction() {
        let chain = BeadChain::extended(&[5, 3], 1.0).unwrap();
        let mover = ChunkMover::new(ChunkLibrary::helices(&[4]).unwrap());
        assert!(mover.is_movable(&chain));
        let next = mover.generate(&chain, &Granularity::Unit, &mut rng()).unwrap();
        assert!((next.segments()[0].bonds[0] - Vector3::x()).norm() < 1e-9);
        assert_eq!(next.segments()[1], chain.segments()[1]);
        assert!(changed_bonds(&chain, &next) > 0);
    }

    #[test]
    fn chunk_mover_without_matching_length_is_not_movable() {
        let chain = BeadChain::extended(&[5, 3], 1.0).unwrap();
        let mover = ChunkMover::new(ChunkLibrary::helices(&[7]).unwrap());
        assert!(!mover.is_movable(&chain));
        assert!(mover.generate(&chain, &Granularity::Unit, &mut rng()).is_none());
    }

    #[test]
    fn jump_mover_redocks_at_one_bond_length() {
        let chain = BeadChain::extended(&[4, 4], 1.5).unwrap();
        let mut rng = rng();
        for _ in 0..20 {
            let next = JumpMover.generate(&chain, &Granularity::Unit, &mut rng).unwrap();
            assert_eq!(next.segments()[0], chain.segments()[0]);
            assert!(next.max_gap_error() < 1e-9);
        }
    }

    #[test]
    fn default_moves_register_chunk_only_with_library() {
        let kinds: Vec<_> = default_moves(None).iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![MoveKind::Fragment, MoveKind::RigidBody, MoveKind::Jump]
        );
        let with_chunks = default_moves(Some(ChunkLibrary::helices(&[3]).unwrap()));
        assert_eq!(with_chunks.len(), 4);
        assert_eq!(with_chunks[3].kind, MoveKind::Chunk);
        assert_eq!(with_chunks[3].weight, 0.5);
    }

    #[test]
    fn default_granularity_shrinks_over_the_run() {
        let schedules = default_granularity();
        let fragment = &schedules[&MoveKind::Fragment];
        assert_eq!(fragment.at(1, 9), Granularity::Length(3));
        assert_eq!(fragment.at(9, 9), Granularity::Length(1));
        assert!(schedules[&MoveKind::RigidBody].validate().is_ok());

        let finest = Granularity::Perturbation {
            rotation: 0.2,
            translation: 0.01,
        };
        let rigid = &schedules[&MoveKind::RigidBody];
        assert_eq!(rigid.at(8, 10), finest);
        assert_eq!(rigid.at(10, 10), finest);
    }
}
