use std::sync::Arc;

use actors::{SupervisorMessage, WorkerPoolConfig};
use storage::StorageConfig;
use tracing_subscriber::EnvFilter;

mod demo;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let storage = StorageConfig::from_env()?;
    let pool = WorkerPoolConfig::from_env()?;

    let (supervisor, handle) =
        api::init_worker_pool(storage, pool, Arc::new(demo::TranscriptLabeler)).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, finishing current jobs...");

    supervisor.send_message(SupervisorMessage::Shutdown)?;
    handle.await?;
    Ok(())
}
