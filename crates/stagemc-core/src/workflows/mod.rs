//! # Workflows Module
//!
//! High-level entry points that run complete searches on top of the
//! [`crate::engine`] layer.
//!
//! ## Overview
//!
//! A single trajectory is already available through
//! [`crate::engine::scheduler::RoundScheduler::run_trajectory`]. Production
//! runs want many independent trajectories, each with its own random stream,
//! followed by ranking and a running score filter. That is what this layer adds.
//!
//! ## Architecture
//!
//! - **Batch Workflow** ([`batch`]) - `nstruct` seeded trajectories, optionally in parallel,
//!   with a quantile autofilter and score-sorted results.
//!
//! ## Key Capabilities
//!
//! - **One RNG per model** derived from a base seed, so results are reproducible
//! - **Parallel execution** through rayon behind the `parallel` feature
//! - **Per-model failure recording** for trajectories run under the strict policy
//! - **Progress reporting** of phase and per-model completion

pub mod batch;
