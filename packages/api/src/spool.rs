//! Job submission and status reads.

use std::fs::File;
use std::io;
use std::path::Path;

use serde_json::Value;
use spool_core::{Artifact, OwnerKey, Progress, WorkerId};
use storage::{
    AtomicStore, CsvFormat, DurableQueue, QueueError, StorageConfig, StoreError, read_progress,
    write_progress,
};

use crate::error::{ResultError, SubmitError};

/// Producer-side handle on a storage root.
#[derive(Debug, Clone)]
pub struct Spool {
    store: AtomicStore,
    queue: DurableQueue,
    csv: CsvFormat,
}

impl Spool {
    /// Open the storage root, creating the queue directory when absent.
    pub fn open(config: &StorageConfig) -> Result<Self, QueueError> {
        Ok(Self {
            store: AtomicStore::new(config.root()),
            queue: DurableQueue::open(config.root())?,
            csv: config.csv,
        })
    }

    pub fn store(&self) -> &AtomicStore {
        &self.store
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    /// Submit `records` as the input of a new job for `key`.
    ///
    /// Writes the input, resets progress to `0` and appends a pending
    /// marker, in that order, so a worker that claims the marker always
    /// finds the new input. Any previous progress is overwritten. Refused
    /// with [`SubmitError::Claimed`] while a claim marker for `key` exists,
    /// since a second claim for one key is never taken.
    pub fn submit(&self, key: &OwnerKey, records: &[Value]) -> Result<(), SubmitError> {
        let workers = self.queue.claims_for(key)?;
        if !workers.is_empty() {
            return Err(SubmitError::Claimed {
                key: key.clone(),
                workers,
            });
        }

        let input = serde_json::to_vec(records)?;
        self.store.write_bytes(key, Artifact::Input, &input)?;
        write_progress(&self.store, key, &Progress::Scheduled)?;
        self.queue.enqueue(key)?;

        tracing::info!("Submitted {} records for {}", records.len(), key);
        Ok(())
    }

    /// Drop the claim `worker` left on `key` so the owner can submit again.
    ///
    /// For workers known to be dead only. Returns whether a claim was
    /// removed.
    pub fn release_stale_claim(&self, key: &OwnerKey, worker: &WorkerId) -> Result<bool, QueueError> {
        self.queue.drop_claim(key, worker)
    }

    /// Current progress; an unknown key reads as [`Progress::New`].
    pub fn status(&self, key: &OwnerKey) -> Result<Progress, StoreError> {
        read_progress(&self.store, key)
    }

    /// Open the last installed result for streaming to the owner.
    pub fn open_result(&self, key: &OwnerKey) -> Result<File, StoreError> {
        self.store.open_for_read(key, Artifact::Result)
    }

    /// Read every record of the last installed result, header included.
    pub fn read_result(&self, key: &OwnerKey) -> Result<Vec<Vec<String>>, ResultError> {
        let path = self.store.artifact_path(key, Artifact::Result);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.csv.delimiter)
            .quote(self.csv.quote)
            .from_reader(self.open_result(key)?);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| read_error(&path, e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }
}

fn read_error(path: &Path, e: csv::Error) -> ResultError {
    if !e.is_io_error() {
        return ResultError::Decode(e);
    }
    let source = match e.into_kind() {
        csv::ErrorKind::Io(source) => source,
        other => io::Error::other(format!("{other:?}")),
    };
    StoreError::CannotOpen {
        path: path.to_path_buf(),
        source,
    }
    .into()
}
