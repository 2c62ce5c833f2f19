//! # RWE Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Determinism test harness, with proptest strategies for scalars,
//!   angles, map positions and command schedules in [`strategies`]
//! - Canonical unit data and flat test maps
//! - An assembler for unit scripts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cob_asm;
pub mod determinism;
pub mod fixtures;

pub use determinism::strategies;

/// Re-export proptest for convenience.
pub use proptest;
