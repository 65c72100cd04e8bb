//! Filesystem storage for the job spool.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<owner-key>/input
//! <root>/<owner-key>/progress
//! <root>/<owner-key>/result
//! <root>/<owner-key>/<artifact>.<session>.tmp  (transient)
//! <root>/queue/<owner-key>                      (pending marker)
//! <root>/queue/<owner-key>.<worker-id>          (claim marker)
//! ```
//!
//! All mutation goes through either write-temp-then-rename (artifacts) or
//! rename-to-claim (queue markers). No other locking exists. This relies on
//! `rename` being atomic on a single local filesystem; it does not carry
//! over to network filesystems without checking their rename semantics.

mod config;
mod error;
mod fs;
mod progress;
mod queue;
mod store;

pub use config::{CsvFormat, DEFAULT_ROOT, StorageConfig};
pub use error::{ConfigError, QueueError, StoreError};
pub use progress::{read_progress, write_progress};
pub use queue::{Claim, DurableQueue, QUEUE_DIR};
pub use store::{ArtifactWriter, AtomicStore, STALE_TMP_AGE};
