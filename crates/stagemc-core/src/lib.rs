//! # stagemc Core Library
//!
//! A staged Monte Carlo conformational-search scheduler for structural
//! modeling protocols: Metropolis acceptance, weighted move dispatch, ramped
//! score weights and move sizes, quality checkpoints with bounded retry, and
//! batches of independently seeded trajectories.
//!
//! ## Architectural Philosophy
//!
//! The library keeps a strict layering so that the search logic never depends
//! on a particular conformation representation.
//!
//! - **[`core`]: The Contracts.** Candidates and the collaborator traits the
//!   engine is written against (`ScoreFunction`, `MoveGenerator`, `Closer`,
//!   `QualityFilter`), plus composable built-in filters.
//!
//! - **[`engine`]: The Logic Core.** The stateful search: the controller that
//!   owns current and best candidates, the move dispatcher, ramps, and the round
//!   scheduler that enforces checkpoints and retries.
//!
//! - **[`models`]: A Reference State.** A multi-segment bead chain with score
//!   terms, moves and a gap closer, used to exercise the engine end to end.
//!
//! - **[`workflows`]: The Public API.** Batch runs of many seeded trajectories
//!   with autofiltering and ranked results.

pub mod core;
pub mod engine;
pub mod models;
pub mod workflows;
