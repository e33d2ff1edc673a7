//! Pipeline lifecycle states and the transition table.

use std::fmt;

use chrono::{DateTime, Utc};
use reelcast_common::error::{ReelError, ReelResult};
use serde::{Deserialize, Serialize};

/// Where a job is in the pipeline.
///
/// Success path: `Initialized → ViewReady → Recording → Stopped → Located →
/// PostProcessed → CleanedUp`. `Failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Initialized,
    ViewReady,
    Recording,
    Stopped,
    Located,
    PostProcessed,
    CleanedUp,
    Failed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::ViewReady => "view_ready",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
            Self::Located => "located",
            Self::PostProcessed => "post_processed",
            Self::CleanedUp => "cleaned_up",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CleanedUp | Self::Failed)
    }

    /// The next state on the success path, if any.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Initialized => Some(Self::ViewReady),
            Self::ViewReady => Some(Self::Recording),
            Self::Recording => Some(Self::Stopped),
            Self::Stopped => Some(Self::Located),
            Self::Located => Some(Self::PostProcessed),
            Self::PostProcessed => Some(Self::CleanedUp),
            Self::CleanedUp | Self::Failed => None,
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || self.successor() == Some(next)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: DateTime<Utc>,
}

/// The single mutable lifecycle owned by one job.
#[derive(Debug, Clone)]
pub struct JobLifecycle {
    state: PipelineState,
    history: Vec<StateTransition>,
}

impl JobLifecycle {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Initialized,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Move to `next`, rejecting anything off the transition table.
    pub fn advance(&mut self, next: PipelineState) -> ReelResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ReelError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.history.push(StateTransition {
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;
        Ok(())
    }

    /// Enter `Failed`. A no-op when already terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.history.push(StateTransition {
                from: self.state,
                to: PipelineState::Failed,
                at: Utc::now(),
            });
            self.state = PipelineState::Failed;
        }
    }
}

impl Default for JobLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
