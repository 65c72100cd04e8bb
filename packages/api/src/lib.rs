//! Producer-side API for the job spool.
//!
//! This crate contains what a request-handling front end needs:
//! - Owner key resolution (reuse or mint)
//! - Job submission, status and result reads
//! - Worker pool bootstrap

mod error;
mod init;
mod owner;
mod spool;

pub use error::{ResultError, SubmitError};
pub use init::init_worker_pool;
pub use owner::resolve_owner_key;
pub use spool::Spool;

// Re-export core types for convenience
pub use spool_core::{JobEvent, JobPhase, OwnerKey, Progress, QueueStats, WorkerId};
pub use storage::CsvFormat;
