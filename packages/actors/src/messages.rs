//! Message types for actor communication.

use spool_core::{JobEvent, QueueStats, WorkerId};
use ractor::RpcReplyPort;
use tokio::sync::broadcast;

use crate::worker_actor::WorkerStats;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run one loop iteration.
    Poll,

    /// Get this worker's counters.
    GetStats { reply: RpcReplyPort<WorkerStats> },

    /// Stop after the current job.
    Shutdown,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Subscribe to pool events.
    Subscribe {
        reply: RpcReplyPort<broadcast::Receiver<JobEvent>>,
    },

    /// Snapshot of the queue directory.
    GetQueueStats {
        reply: RpcReplyPort<Result<QueueStats, String>>,
    },

    /// Identities of the live workers.
    ListWorkers { reply: RpcReplyPort<Vec<WorkerId>> },

    /// Counters of every live worker.
    GetWorkerStats {
        reply: RpcReplyPort<Vec<(WorkerId, WorkerStats)>>,
    },

    /// Shutdown all workers.
    Shutdown,

    /// Periodic tick for housekeeping.
    Tick,
}
