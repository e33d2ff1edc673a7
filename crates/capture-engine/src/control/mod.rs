//! Control channel to a long-lived desktop recorder.
//!
//! The recorder speaks an op-coded JSON protocol over a local websocket.
//! [`RecorderControl`] is the seam the remote backend talks through, so the
//! backend can be driven by a scripted fake in tests.

use reelcast_common::error::ReelResult;
use serde_json::Value;

pub mod client;
pub mod protocol;

pub use client::WebSocketRecorderClient;

/// Request/response access to the recorder.
#[async_trait::async_trait]
pub trait RecorderControl: Send {
    /// Issue `request_type` with optional data and return the response data
    /// (`Value::Null` when the recorder sends none).
    async fn request(&mut self, request_type: &str, data: Option<Value>) -> ReelResult<Value>;

    /// Close the channel. Safe to call more than once.
    async fn close(&mut self) -> ReelResult<()> {
        Ok(())
    }
}
