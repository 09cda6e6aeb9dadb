//! # Models Module
//!
//! A reference conformation model for the search engine: a coarse-grained
//! chain of beads split into rigid segments.
//!
//! ## Overview
//!
//! The engine is generic over its state type. This module supplies one concrete
//! state, [`chain::BeadChain`], together with everything the engine needs to
//! search it, so that complete runs can be driven from tests and from the
//! command line without an external modeling package.
//!
//! ## Key Components
//!
//! - [`chain`] - Segments, bead positions, inter-segment gaps and degree-of-freedom counts
//! - [`terms`] - `contact`, `clash`, `chainbreak` and `compactness` score terms with default weights
//! - [`movers`] - Fragment, rigid-body, chunk and jump moves plus default granularity schedules
//! - [`closure`] - Cyclic coordinate descent repair of inter-segment gaps
//!
//! ## Usage
//!
//! ```ignore
//! use stagemc::models::{chain::BeadChain, closure::CcdCloser, movers, terms};
//!
//! let chain = BeadChain::extended(&[8, 8, 8], 1.0)?;
//! let score_function = terms::default_score_function(chain.bond_length());
//! let moves = movers::default_moves(None);
//! let closer = CcdCloser::new(0.1);
//! ```

pub mod chain;
pub mod closure;
pub mod movers;
pub mod terms;
