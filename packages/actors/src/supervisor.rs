//! Supervisor actor owning the worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use spool_core::{JobEvent, WorkerId};
use storage::{AtomicStore, CsvFormat, DurableQueue, StorageConfig};
use tokio::sync::broadcast;

use crate::config::WorkerPoolConfig;
use crate::messages::{SupervisorMessage, WorkerMessage};
use crate::processor::JobProcessor;
use crate::worker::Worker;
use crate::worker_actor::{WorkerActor, WorkerArgs};

const STATS_CALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub storage: StorageConfig,
    pub pool: WorkerPoolConfig,
    pub processor: Arc<dyn JobProcessor>,
}

struct WorkerEntry {
    id: WorkerId,
    actor: ActorRef<WorkerMessage>,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    store: AtomicStore,
    queue: DurableQueue,
    csv: CsvFormat,
    pool: WorkerPoolConfig,
    processor: Arc<dyn JobProcessor>,
    /// Live workers by actor ID.
    workers: HashMap<ActorId, WorkerEntry>,
    /// Event broadcaster.
    pub event_tx: broadcast::Sender<JobEvent>,
    shutting_down: bool,
}

impl SupervisorState {
    fn new(args: SupervisorArgs) -> Result<Self, ActorProcessingErr> {
        let queue = DurableQueue::open(args.storage.root())?;
        let (event_tx, _) = broadcast::channel(1024);
        Ok(Self {
            store: AtomicStore::new(args.storage.root()),
            queue,
            csv: args.storage.csv,
            pool: args.pool,
            processor: args.processor,
            workers: HashMap::new(),
            event_tx,
            shutting_down: false,
        })
    }
}

async fn spawn_worker(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
) -> Result<(), ActorProcessingErr> {
    let worker = Worker::new(
        state.store.clone(),
        state.queue.clone(),
        Arc::clone(&state.processor),
    )
    .with_csv_format(state.csv)
    .with_event_tx(state.event_tx.clone());
    let id = worker.id().clone();

    let args = WorkerArgs {
        worker,
        idle_interval: state.pool.idle_interval,
    };

    let (actor, _handle) = Actor::spawn_linked(
        Some(format!("worker-{}", id)),
        WorkerActor,
        args,
        myself.get_cell(),
    )
    .await
    .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

    state.workers.insert(actor.get_id(), WorkerEntry { id, actor });
    Ok(())
}

/// Supervisor actor that keeps `workers` loop actors running.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting worker pool supervisor ({} workers, root {})",
            args.pool.workers,
            args.storage.root().display()
        );

        let mut state = SupervisorState::new(args)?;
        for _ in 0..state.pool.workers {
            spawn_worker(&myself, &mut state).await?;
        }

        // Start periodic tick
        let myself_clone = myself.clone();
        let period = state.pool.stats_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if myself_clone.send_message(SupervisorMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Subscribe { reply } => {
                let _ = reply.send(state.event_tx.subscribe());
            }

            SupervisorMessage::GetQueueStats { reply } => {
                let queue = state.queue.clone();
                let stats = tokio::task::spawn_blocking(move || queue.stats())
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|r| r.map_err(|e| e.to_string()));
                let _ = reply.send(stats);
            }

            SupervisorMessage::ListWorkers { reply } => {
                let ids = state.workers.values().map(|w| w.id.clone()).collect();
                let _ = reply.send(ids);
            }

            SupervisorMessage::GetWorkerStats { reply } => {
                // Workers answer between jobs, so collect off the supervisor's loop.
                let workers: Vec<_> = state
                    .workers
                    .values()
                    .map(|w| (w.id.clone(), w.actor.clone()))
                    .collect();
                tokio::spawn(async move {
                    let mut all = Vec::with_capacity(workers.len());
                    for (id, actor) in workers {
                        let result = actor
                            .call(
                                |reply| WorkerMessage::GetStats { reply },
                                Some(STATS_CALL_TIMEOUT),
                            )
                            .await;
                        if let Ok(CallResult::Success(stats)) = result {
                            all.push((id, stats));
                        }
                    }
                    let _ = reply.send(all);
                });
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                state.shutting_down = true;
                for worker in state.workers.values() {
                    let _ = worker.actor.send_message(WorkerMessage::Shutdown);
                }
                myself.stop(None);
                return Ok(());
            }

            SupervisorMessage::Tick => {
                let queue = state.queue.clone();
                match tokio::task::spawn_blocking(move || queue.stats()).await {
                    Ok(Ok(stats)) => {
                        tracing::info!(
                            "Queue: {} pending, {} claimed",
                            stats.pending,
                            stats.claimed
                        );
                        let _ = state.event_tx.send(JobEvent::QueueStatsUpdated {
                            stats,
                            timestamp: Utc::now(),
                        });
                    }
                    Ok(Err(e)) => tracing::warn!("Cannot scan queue: {}", e),
                    Err(e) => tracing::warn!("Queue scan aborted: {}", e),
                }
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some(entry) = state.workers.remove(&cell.get_id()) {
                    tracing::info!("Worker {} terminated: {:?}", entry.id, reason);
                }
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                if let Some(entry) = state.workers.remove(&cell.get_id()) {
                    tracing::error!("Worker {} failed: {}", entry.id, err);
                    // Its claim, if any, stays on disk as an orphan.
                    if !state.shutting_down {
                        spawn_worker(&myself, state).await?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start the supervisor and its workers.
pub async fn start_supervisor(
    args: SupervisorArgs,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let (actor, handle) = Actor::spawn(None, Supervisor, args).await?;

    Ok((actor, handle))
}
