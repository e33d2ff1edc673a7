//! Reelcast Capture Engine
//!
//! Turns a rendered view into a raw video file. Two interchangeable
//! backends sit behind [`CaptureBackend`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    CaptureBackend                    │
//! │  ┌─────────────────────────┐ ┌────────────────────┐  │
//! │  │ RemoteControlledRecorder│ │HeadlessBrowser-    │  │
//! │  │  (websocket control)    │ │Recorder (process)  │  │
//! │  └────────────┬────────────┘ └─────────┬──────────┘  │
//! │               │ path?                  │ path        │
//! │               ▼                        ▼             │
//! │  ┌──────────────────────────────────────────────┐    │
//! │  │ ArtifactLocator (when no path was reported)  │    │
//! │  └──────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! At most one [`CaptureSession`] is live per backend; see [`SessionSlot`].

pub mod backend;
pub mod control;
pub mod locator;
pub mod session;

pub use backend::*;
pub use locator::ArtifactLocator;
pub use session::*;
