//! Core domain types for the filesystem job spool.
//!
//! This crate contains shared types used across all packages:
//! - OwnerKey and WorkerId identities
//! - Artifact names inside an owner directory
//! - Progress and JobPhase for the job lifecycle
//! - Events for observing the worker pool

mod artifact;
mod events;
mod key;
mod progress;
mod queue;

pub use artifact::Artifact;
pub use events::JobEvent;
pub use key::{KEY_LEN, KeyError, OwnerKey, SHORT_LEN, WorkerId, is_key};
pub use progress::{JobPhase, Progress};
pub use queue::QueueStats;
