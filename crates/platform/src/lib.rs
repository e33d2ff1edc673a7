//! Reelcast Platform Integration
//!
//! Host-level capabilities the pipeline needs but does not own:
//! - **Processes:** terminate by pid, by window title, or by command-line identity
//! - **Ports:** probe whether a local helper server is listening
//! - **Capabilities:** environment checks and user guidance

pub mod capabilities;
pub mod process;

pub use process::*;
