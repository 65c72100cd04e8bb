//! Progress marker and the status phases derived from it.
//!
//! The marker is plain text on disk: an ASCII integer in `[-1, 100]` or a
//! free-form UTF-8 failure message. Integer parse is always attempted
//! first; anything else is a failure message.

use serde::{Deserialize, Serialize};

/// Persisted progress of an owner's most recent job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Progress {
    /// No job ever submitted (`-1`).
    #[default]
    New,
    /// Submitted, not yet picked up by a worker (`0`).
    Scheduled,
    /// Being processed, value is percent complete (`1..=99`).
    Running { percent: u8 },
    /// Terminal success (`100`).
    Ready,
    /// Terminal failure with a human-readable cause.
    Failed { message: String },
}

/// Fieldless view of [`Progress`] for display and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    New,
    Scheduled,
    Running,
    Ready,
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::New => "new",
            JobPhase::Scheduled => "scheduled",
            JobPhase::Running => "running",
            JobPhase::Ready => "ready",
            JobPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Progress {
    /// Running progress, or `None` if `percent` is outside `1..=99`.
    pub fn running(percent: u8) -> Option<Self> {
        (1..=99).contains(&percent).then_some(Progress::Running { percent })
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Progress::Failed {
            message: message.into(),
        }
    }

    /// Decode the on-disk marker.
    ///
    /// Surrounding whitespace is ignored for the integer parse. Integers
    /// outside `[-1, 100]` are not valid progress values and are kept as a
    /// failure message verbatim.
    pub fn from_marker(text: &str) -> Self {
        match text.trim().parse::<i64>() {
            Ok(-1) => Progress::New,
            Ok(0) => Progress::Scheduled,
            Ok(100) => Progress::Ready,
            Ok(n @ 1..=99) => Progress::Running { percent: n as u8 },
            _ => Progress::failed(text),
        }
    }

    /// Encode for the on-disk marker.
    pub fn to_marker(&self) -> String {
        match self {
            Progress::New => "-1".to_string(),
            Progress::Scheduled => "0".to_string(),
            Progress::Running { percent } => percent.to_string(),
            Progress::Ready => "100".to_string(),
            Progress::Failed { message } => message.clone(),
        }
    }

    pub fn phase(&self) -> JobPhase {
        match self {
            Progress::New => JobPhase::New,
            Progress::Scheduled => JobPhase::Scheduled,
            Progress::Running { .. } => JobPhase::Running,
            Progress::Ready => JobPhase::Ready,
            Progress::Failed { .. } => JobPhase::Failed,
        }
    }

    /// Numeric value of the marker, `None` for failures.
    pub fn percent(&self) -> Option<i8> {
        match self {
            Progress::New => Some(-1),
            Progress::Scheduled => Some(0),
            Progress::Running { percent } => Some(*percent as i8),
            Progress::Ready => Some(100),
            Progress::Failed { .. } => None,
        }
    }

    /// Check if the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Progress::Ready | Progress::Failed { .. })
    }

    /// Failure message, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Progress::Failed { message } => Some(message),
            _ => None,
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Progress::Running { percent } => write!(f, "running ({percent}%)"),
            Progress::Failed { message } => write!(f, "failed: {message}"),
            other => f.write_str(other.phase().as_str()),
        }
    }
}
