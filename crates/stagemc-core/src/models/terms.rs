use super::chain::BeadChain;
use crate::core::scoring::{ScoreTerm, WeightedScoreFunction};
use itertools::Itertools;
use nalgebra::{Point3, Vector3};
use phf::phf_map;

pub const CONTACT: &str = "contact";
pub const CLASH: &str = "clash";
pub const CHAINBREAK: &str = "chainbreak";
pub const COMPACTNESS: &str = "compactness";

/// Term names in the order the default score function registers them.
pub const TERM_NAMES: [&str; 4] = [CONTACT, CLASH, CHAINBREAK, COMPACTNESS];

pub static DEFAULT_WEIGHTS: phf::Map<&'static str, f64> = phf_map! {
    "contact" => 1.0,
    "clash" => 4.0,
    "chainbreak" => 2.0,
    "compactness" => 0.1,
};

const CONTACT_FACTOR: f64 = 1.5;
const CLASH_FACTOR: f64 = 0.8;

/// Pairs of beads more than one position apart along the flattened chain.
fn non_adjacent_pairs(beads: &[Point3<f64>]) -> impl Iterator<Item = f64> + '_ {
    beads
        .iter()
        .enumerate()
        .tuple_combinations()
        .filter(|((i, _), (j, _))| j - i > 1)
        .map(|((_, a), (_, b))| nalgebra::distance(a, b))
}

/// -1 for every non-adjacent pair within `cutoff`.
#[derive(Debug, Clone, Copy)]
pub struct ContactTerm {
    pub cutoff: f64,
}

impl ScoreTerm<BeadChain> for ContactTerm {
    fn evaluate(&self, chain: &BeadChain) -> f64 {
        let beads = chain.bead_positions();
        -(non_adjacent_pairs(&beads)
            .filter(|&d| d <= self.cutoff)
            .count() as f64)
    }
}

/// Squared overlap of non-adjacent pairs closer than `radius`.
#[derive(Debug, Clone, Copy)]
pub struct ClashTerm {
    pub radius: f64,
}

impl ScoreTerm<BeadChain> for ClashTerm {
    fn evaluate(&self, chain: &BeadChain) -> f64 {
        let beads = chain.bead_positions();
        non_adjacent_pairs(&beads)
            .filter(|&d| d < self.radius)
            .map(|d| (self.radius - d).powi(2))
            .sum()
    }
}

/// Squared deviation of each inter-segment gap from one bond length.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainbreakTerm;

impl ScoreTerm<BeadChain> for ChainbreakTerm {
    fn evaluate(&self, chain: &BeadChain) -> f64 {
        let bond_length = chain.bond_length();
        chain
            .gaps()
            .into_iter()
            .map(|gap| (gap - bond_length).powi(2))
            .sum()
    }
}

/// Radius of gyration of all beads.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactnessTerm;

impl ScoreTerm<BeadChain> for CompactnessTerm {
    fn evaluate(&self, chain: &BeadChain) -> f64 {
        radius_of_gyration(&chain.bead_positions())
    }
}

pub fn radius_of_gyration(beads: &[Point3<f64>]) -> f64 {
    if beads.is_empty() {
        return 0.0;
    }
    let n = beads.len() as f64;
    let center: Vector3<f64> = beads.iter().map(|b| b.coords).sum::<Vector3<f64>>() / n;
    let spread: f64 = beads.iter().map(|b| (b.coords - center).norm_squared()).sum();
    (spread / n).sqrt()
}

pub fn default_weight(term: &str) -> Option<f64> {
    DEFAULT_WEIGHTS.get(term).copied()
}

/// The four bead-chain terms at their default weights, with contact and clash
/// distances scaled to the bond length.
pub fn default_score_function(bond_length: f64) -> WeightedScoreFunction<BeadChain> {
    let weight = |name: &str| default_weight(name).unwrap_or(0.0);
    WeightedScoreFunction::new()
        .with_term(
            CONTACT,
            weight(CONTACT),
            ContactTerm {
                cutoff: CONTACT_FACTOR * bond_length,
            },
        )
        .with_term(
            CLASH,
            weight(CLASH),
            ClashTerm {
                radius: CLASH_FACTOR * bond_length,
            },
        )
        .with_term(CHAINBREAK, weight(CHAINBREAK), ChainbreakTerm)
        .with_term(COMPACTNESS, weight(COMPACTNESS), CompactnessTerm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scoring::ScoreFunction;
    use crate::models::chain::Segment;

    // Four beads on a unit square: (0,0) (1,0) (1,1) (0,1).
    fn square() -> BeadChain {
        let segment = Segment {
            origin: Point3::origin(),
            bonds: vec![Vector3::x(), Vector3::y(), -Vector3::x()],
        };
        BeadChain::new(vec![segment], 1.0).unwrap()
    }

    #[test]
    fn contact_counts_non_adjacent_pairs_within_cutoff() {
        let chain = square();
        // (0,2) at sqrt 2, (0,3) at 1, (1,3) at sqrt 2.
        assert_eq!(ContactTerm { cutoff: 1.2 }.evaluate(&chain), -1.0);
        assert_eq!(ContactTerm { cutoff: 1.5 }.evaluate(&chain), -3.0);
    }

    #[test]
    fn clash_sums_squared_overlap() {
        let chain = square();
        let clash = ClashTerm { radius: 1.2 }.evaluate(&chain);
        assert!((clash - 0.04).abs() < 1e-12);
        assert_eq!(ClashTerm { radius: 0.5 }.evaluate(&chain), 0.0);
    }

    #[test]
    fn chainbreak_is_zero_for_closed_chain_and_grows_with_gap() {
        let closed = BeadChain::extended(&[3, 3], 1.0).unwrap();
        assert!(ChainbreakTerm.evaluate(&closed).abs() < 1e-12);

        let mut open = closed.clone();
        open.segment_mut(1).translate(&Vector3::new(0.5, 0.0, 0.0));
        assert!((ChainbreakTerm.evaluate(&open) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn compactness_is_radius_of_gyration() {
        let chain = BeadChain::extended(&[3], 1.0).unwrap();
        let rg = CompactnessTerm.evaluate(&chain);
        assert!((rg - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(radius_of_gyration(&[]), 0.0);
    }

    #[test]
    fn default_score_function_registers_terms_in_order() {
        let sf = default_score_function(1.0);
        assert_eq!(sf.term_names(), TERM_NAMES.to_vec());
        assert_eq!(sf.weight(CLASH), Some(4.0));
        assert_eq!(sf.weight(COMPACTNESS), Some(0.1));
        assert_eq!(default_weight("hbond"), None);

        let chain = BeadChain::extended(&[4, 4], 1.0).unwrap();
        let breakdown = sf.breakdown(&chain);
        assert!((breakdown.total() - sf.score(&chain)).abs() < 1e-12);
    }
}
