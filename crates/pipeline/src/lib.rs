//! Reelcast Pipeline
//!
//! The end-to-end recording sequence for one job:
//!
//! ```text
//! budget ─▶ prepare view ─▶ stabilize ─▶ start ─▶ wait ─▶ stop ─▶ locate ─▶ post-process
//!                                                                           │
//!                     cleanup (always, exactly once) ◀──────────────────────┘
//! ```
//!
//! [`PipelineCoordinator`] owns the job's lifecycle state and is its only
//! mutator. Everything external sits behind a trait: [`ViewProvisioner`],
//! [`reelcast_capture_engine::CaptureBackend`], [`PostProcessor`], and
//! [`reelcast_platform::ProcessControl`] for cleanup.

pub mod cleanup;
pub mod coordinator;
pub mod postprocess;
pub mod report;
pub mod view;

pub use cleanup::{CleanupManager, CleanupTargets};
pub use coordinator::PipelineCoordinator;
pub use postprocess::{FfmpegPostProcessor, MusicTrack, PostProcessJob, PostProcessor};
pub use report::{JobOutcome, Phase, PhaseReport, PhaseStatus, ProgressCallback};
pub use view::{ReadySignal, StaticViewProvisioner, ViewHandle, ViewProvisioner, WindowHandle};
