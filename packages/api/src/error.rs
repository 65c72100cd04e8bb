use spool_core::{OwnerKey, WorkerId};
use storage::{QueueError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// A claim marker for the key is on disk. Either a worker is running
    /// the previous job or one died holding it; see
    /// [`Spool::release_stale_claim`](crate::Spool::release_stale_claim).
    #[error("job for {key} is claimed by {}", join_workers(.workers))]
    Claimed {
        key: OwnerKey,
        workers: Vec<WorkerId>,
    },

    #[error("cannot encode input records: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

fn join_workers(workers: &[WorkerId]) -> String {
    workers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum ResultError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed result: {0}")]
    Decode(#[from] csv::Error),
}
