//! Reelcast Timing
//!
//! Turns a requested total duration into the phases a recording is built from:
//! - **Budget:** intro / content / final split that sums to the target
//! - **Pacing:** per-character delay that spreads content over its window
//!
//! This crate is pure computation with no I/O, clocks, or platform
//! dependencies. All inputs are data; all outputs are data.

pub mod budget;

pub use budget::*;
