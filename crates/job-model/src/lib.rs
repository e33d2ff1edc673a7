//! Reelcast Job Model
//!
//! Defines the core data contracts for a recording job:
//! - **Job:** One validated, immutable recording request
//! - **State:** The pipeline lifecycle and its legal transitions
//! - **Artifact:** A file produced by capture or post-processing

pub mod artifact;
pub mod job;
pub mod state;

pub use artifact::*;
pub use job::*;
pub use state::*;
