//! Worker pool for the job spool.
//!
//! # Architecture
//!
//! - `Worker` - one claim/process/finish iteration, synchronous
//! - `WorkerActor` - drives a `Worker` in a loop on the blocking pool
//! - `Supervisor` - spawns the workers, restarts failed ones, reports
//!   queue statistics
//!
//! # Usage
//!
//! ```ignore
//! use actors::{SupervisorArgs, SupervisorMessage, WorkerPoolConfig, start_supervisor};
//!
//! let (supervisor, handle) = start_supervisor(SupervisorArgs {
//!     storage,
//!     pool: WorkerPoolConfig::default(),
//!     processor,
//! })
//! .await?;
//!
//! supervisor.send_message(SupervisorMessage::Shutdown)?;
//! handle.await?;
//! ```

mod config;
mod messages;
mod processor;
mod supervisor;
mod worker;
mod worker_actor;

pub use config::WorkerPoolConfig;
pub use messages::{SupervisorMessage, WorkerMessage};
pub use processor::{FnProcessor, JobProcessor, ProcessingFailure, ProgressReporter, RowSink};
pub use supervisor::{Supervisor, SupervisorArgs, start_supervisor};
pub use worker::{JobOutcome, Worker};
pub use worker_actor::{WorkerActor, WorkerArgs, WorkerStats};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, SpawnErr, concurrency};
