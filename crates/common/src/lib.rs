//! Reelcast Common Utilities
//!
//! Shared infrastructure for all Reelcast crates:
//! - Error types and result aliases
//! - Recording clock for wall/monotonic timestamps
//! - Tracing/logging initialization
//! - Configuration loading and validation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
