//! # Core Module
//!
//! The collaborator contracts the search engine is written against, and the
//! plain data types that flow between them.
//!
//! ## Overview
//!
//! The scheduler in [`crate::engine`] never looks inside a conformation. Everything
//! it needs from the modeling side is expressed here as a narrow trait:
//!
//! - **Candidates** ([`candidate`]) - A state handle with its cached score and generation counter
//! - **Scoring** ([`scoring`]) - `score(state)` plus a weight table keyed by term name
//! - **Moves** ([`moves`]) - Move families, ramped granularity, and the generator capability
//! - **Closure** ([`closure`]) - Optional repair of chain breaks introduced by moves
//! - **Filters** ([`filters`]) - Pass/fail predicates evaluated at checkpoint rounds
//!
//! ## Key Capabilities
//!
//! - **Generic over the state type**, so any cloneable conformation model can be searched
//! - **Closures implement the traits** for moves, filters and score terms, which keeps tests short
//! - **Composable filters** with first-failure reporting
//! - **Linear weighted scoring** whose zero-weight terms cost nothing to evaluate

pub mod candidate;
pub mod closure;
pub mod filters;
pub mod moves;
pub mod scoring;
