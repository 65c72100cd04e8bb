//! Worker actor polling the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use spool_core::JobEvent;

use crate::messages::WorkerMessage;
use crate::worker::{JobOutcome, Worker};

/// Counters kept by each worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs claimed and finished, either way.
    pub processed: u64,
    pub completed: u64,
    pub failed: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &JobOutcome) {
        self.processed += 1;
        if outcome.is_completed() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// State for the worker actor.
pub struct WorkerActorState {
    worker: Arc<Worker>,
    idle_interval: Duration,
    stats: WorkerStats,
    /// Whether the worker should continue running.
    running: bool,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker: Worker,
    pub idle_interval: Duration,
}

/// Worker actor that runs the loop one iteration per `Poll`.
///
/// Processing happens on the blocking pool; the actor stays parked on it
/// until the job ends, so there is never more than one job per worker.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker.id());

        if let Some(tx) = args.worker.event_tx() {
            let _ = tx.send(JobEvent::WorkerStarted {
                worker_id: args.worker.id().clone(),
                timestamp: Utc::now(),
            });
        }

        myself.send_message(WorkerMessage::Poll)?;

        Ok(WorkerActorState {
            worker: Arc::new(args.worker),
            idle_interval: args.idle_interval,
            stats: WorkerStats::default(),
            running: true,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(tx) = state.worker.event_tx() {
            let _ = tx.send(JobEvent::WorkerStopped {
                worker_id: state.worker.id().clone(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                if !state.running {
                    return Ok(());
                }

                let worker = Arc::clone(&state.worker);
                let result = tokio::task::spawn_blocking(move || worker.run_once()).await;

                let delay = match result {
                    Ok(Ok(Some(outcome))) => {
                        state.stats.record(&outcome);
                        Duration::ZERO
                    }
                    Ok(Ok(None)) => state.idle_interval,
                    Ok(Err(e)) => {
                        tracing::warn!("Worker {} cannot poll queue: {}", state.worker.id(), e);
                        state.idle_interval
                    }
                    Err(e) => {
                        tracing::error!("Worker {} iteration aborted: {}", state.worker.id(), e);
                        state.idle_interval
                    }
                };

                schedule_poll(&myself, delay);
            }

            WorkerMessage::GetStats { reply } => {
                let _ = reply.send(state.stats.clone());
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker.id());
                state.running = false;
                myself.stop(None);
            }
        }

        Ok(())
    }
}

fn schedule_poll(myself: &ActorRef<WorkerMessage>, delay: Duration) {
    if delay.is_zero() {
        let _ = myself.send_message(WorkerMessage::Poll);
        return;
    }

    let myself = myself.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        // Fails once the worker has stopped.
        let _ = myself.send_message(WorkerMessage::Poll);
    });
}
