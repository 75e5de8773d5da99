use serde::{Deserialize, Serialize};
use std::fmt;

use crate::credentials::Credentials;
use crate::generation::GeneratedArtifact;
use crate::transcoder::SourceImage;

/// Coarse activity of the workflow
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for a user action
    #[default]
    Idle,
    /// A generate or edit request is in flight
    Generating,
    /// A photo upload is in flight
    Sending,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Sending => "sending",
        };
        f.write_str(name)
    }
}

/// Outcome of the last operation, shown until replaced or dismissed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// The operation completed
    Success(String),
    /// The operation failed
    Failure(String),
}

impl OperationStatus {
    /// Human-readable message
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Success(m) | Self::Failure(m) => m,
        }
    }

    /// Whether this is a failure
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// Mutable state owned by the controller
#[derive(Debug, Default)]
pub(super) struct WorkflowState {
    pub prompt: String,
    pub source: Option<SourceImage>,
    pub artifact: Option<GeneratedArtifact>,
    /// Prompt that produced `artifact`, used as the photo caption
    pub artifact_prompt: Option<String>,
    pub status: Option<OperationStatus>,
    pub credentials: Credentials,
    pub reveal_credentials: bool,
}

impl WorkflowState {
    pub(super) fn clear_artifact(&mut self) {
        self.artifact = None;
        self.artifact_prompt = None;
    }
}

/// Read-only view of the workflow for presentation layers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    /// Current phase
    pub phase: Phase,
    /// Current prompt text
    pub prompt: String,
    /// Source image for edit mode, if any
    pub source: Option<SourceImage>,
    /// Latest generated image, if any
    pub artifact: Option<GeneratedArtifact>,
    /// Last operation outcome, if not dismissed
    pub status: Option<OperationStatus>,
    /// Telegram credentials as currently entered
    pub credentials: Credentials,
    /// The credential entry surface should be shown
    pub reveal_credentials: bool,
    /// Persistent configuration problem, never dismissible
    pub configuration_warning: Option<&'static str>,
}

impl WorkflowSnapshot {
    /// Generate would run the edit path
    #[must_use]
    pub const fn is_edit_mode(&self) -> bool {
        self.source.is_some()
    }

    /// A request is in flight and inputs should be disabled
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }
}
