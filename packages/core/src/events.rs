//! Event types for observing the worker pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OwnerKey, QueueStats, WorkerId};

/// Events emitted by workers and the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Worker events
    /// A worker started polling the queue.
    WorkerStarted {
        worker_id: WorkerId,
        timestamp: DateTime<Utc>,
    },
    /// A worker stopped.
    WorkerStopped {
        worker_id: WorkerId,
        timestamp: DateTime<Utc>,
    },

    // Job events
    /// A worker claimed a pending marker.
    JobClaimed {
        owner: OwnerKey,
        worker_id: WorkerId,
        timestamp: DateTime<Utc>,
    },
    /// A job reported progress.
    JobProgress {
        owner: OwnerKey,
        percent: u8,
        timestamp: DateTime<Utc>,
    },
    /// A job completed and its result was installed.
    JobCompleted {
        owner: OwnerKey,
        worker_id: WorkerId,
        rows: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed; `error` is the text persisted to the progress marker.
    JobFailed {
        owner: OwnerKey,
        worker_id: WorkerId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // Queue events
    /// Periodic snapshot of the queue directory.
    QueueStatsUpdated {
        stats: QueueStats,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::WorkerStarted { timestamp, .. } => *timestamp,
            JobEvent::WorkerStopped { timestamp, .. } => *timestamp,
            JobEvent::JobClaimed { timestamp, .. } => *timestamp,
            JobEvent::JobProgress { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::QueueStatsUpdated { timestamp, .. } => *timestamp,
        }
    }

    /// Get the owner key associated with this event, if any.
    pub fn owner(&self) -> Option<&OwnerKey> {
        match self {
            JobEvent::JobClaimed { owner, .. } => Some(owner),
            JobEvent::JobProgress { owner, .. } => Some(owner),
            JobEvent::JobCompleted { owner, .. } => Some(owner),
            JobEvent::JobFailed { owner, .. } => Some(owner),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::WorkerStarted { worker_id, .. } => format!("Worker {} started", worker_id),
            JobEvent::WorkerStopped { worker_id, .. } => format!("Worker {} stopped", worker_id),
            JobEvent::JobClaimed {
                owner, worker_id, ..
            } => format!("Job {} claimed by {}", owner.short(), worker_id),
            JobEvent::JobProgress { owner, percent, .. } => {
                format!("Job {} at {}%", owner.short(), percent)
            }
            JobEvent::JobCompleted {
                owner,
                rows,
                duration_ms,
                ..
            } => format!(
                "Job {} completed in {}ms ({} rows)",
                owner.short(),
                duration_ms,
                rows
            ),
            JobEvent::JobFailed { owner, error, .. } => {
                format!("Job {} failed: {}", owner.short(), error)
            }
            JobEvent::QueueStatsUpdated { stats, .. } => format!(
                "Queue: {} pending, {} claimed",
                stats.pending, stats.claimed
            ),
        }
    }
}
