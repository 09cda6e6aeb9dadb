//! # Engine Module
//!
//! The stateful machinery of the staged Monte Carlo search: the controller that
//! owns current and best candidates, the weighted move dispatcher, and the round
//! scheduler that ramps parameters and enforces checkpoints.
//!
//! ## Overview
//!
//! A trajectory is a sequence of attempts. Each attempt starts from a copy of
//! the initial candidate and runs `R` rounds of `C` cycles; every cycle is one
//! dispatcher trial judged by the Metropolis criterion. Between rounds the
//! scheduler ramps score weights, move granularity and temperature, recovers
//! the lowest state seen so far and evaluates any checkpoint filters due at
//! that round. A failed checkpoint aborts the attempt and, up to `max_tries`,
//! the trajectory restarts.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Schedule parameters, policies and the validating builder
//! - **Ramps** ([`ramp`]) - Temperature, weight and granularity schedules keyed by round
//! - **Controller** ([`controller`]) - Current/best ownership, Metropolis decisions, trial rollback
//! - **Dispatcher** ([`dispatcher`]) - Weighted move selection, generator fallback, closure handling
//! - **Scheduler** ([`scheduler`]) - Rounds, cycles, checkpoints and retry
//! - **State Tracking** ([`state`]) - Trial records, per-kind counters and trajectory diagnostics
//! - **Progress Monitoring** ([`progress`]) - Optional structured event callback
//! - **Error Handling** ([`error`]) - Engine-level error type
//!
//! ## Key Capabilities
//!
//! - **Deterministic** for a given seed, candidate and schedule
//! - **No randomness consumed** by downhill decisions
//! - **Rollback by move** of the displaced candidates when closure fails
//! - **Bounded retry** with lenient or strict exhaustion handling
//! - **Optional budgets** on trial count and wall time

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod progress;
pub mod ramp;
pub mod scheduler;
pub mod state;
pub(crate) mod transaction;
pub(crate) mod utils;
