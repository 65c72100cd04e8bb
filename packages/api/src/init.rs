//! Worker pool initialization.

use std::sync::Arc;

use actors::{
    ActorRef, JobProcessor, SpawnErr, SupervisorArgs, SupervisorMessage, WorkerPoolConfig,
    start_supervisor,
};
use storage::StorageConfig;
use tokio::task::JoinHandle;

/// Start the worker pool.
///
/// This should be called once per worker process. Producers never talk to
/// the pool; they only share the storage root with it.
pub async fn init_worker_pool(
    storage: StorageConfig,
    pool: WorkerPoolConfig,
    processor: Arc<dyn JobProcessor>,
) -> Result<(ActorRef<SupervisorMessage>, JoinHandle<()>), SpawnErr> {
    tracing::info!(
        "Initializing worker pool with processor {}...",
        processor.name()
    );

    start_supervisor(SupervisorArgs {
        storage,
        pool,
        processor,
    })
    .await
}
