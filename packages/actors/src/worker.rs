//! One iteration of the worker loop, independent of any runtime.

use std::any::Any;
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use spool_core::{Artifact, JobEvent, OwnerKey, Progress, WorkerId};
use storage::{AtomicStore, CsvFormat, DurableQueue, QueueError, write_progress};
use tokio::sync::broadcast;

use crate::processor::{JobProcessor, ProgressReporter, RowSink};

/// How a claimed job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Result installed and progress set to `100`.
    Completed { owner: OwnerKey, rows: u64 },
    /// Progress set to `message`.
    Failed { owner: OwnerKey, message: String },
}

impl JobOutcome {
    pub fn owner(&self) -> &OwnerKey {
        match self {
            JobOutcome::Completed { owner, .. } | JobOutcome::Failed { owner, .. } => owner,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

/// A queue consumer bound to one worker identity.
pub struct Worker {
    id: WorkerId,
    store: AtomicStore,
    queue: DurableQueue,
    processor: Arc<dyn JobProcessor>,
    csv: CsvFormat,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl Worker {
    pub fn new(store: AtomicStore, queue: DurableQueue, processor: Arc<dyn JobProcessor>) -> Self {
        Self {
            id: WorkerId::new(),
            store,
            queue,
            processor,
            csv: CsvFormat::default(),
            event_tx: None,
        }
    }

    /// Set the dialect of the result file.
    pub fn with_csv_format(mut self, csv: CsvFormat) -> Self {
        self.csv = csv;
        self
    }

    pub fn with_id(mut self, id: WorkerId) -> Self {
        self.id = id;
        self
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub(crate) fn event_tx(&self) -> Option<&broadcast::Sender<JobEvent>> {
        self.event_tx.as_ref()
    }

    /// Claim and run at most one job.
    ///
    /// Returns `Ok(None)` when nothing was claimable. Every failure of the
    /// job itself is persisted to its progress marker and reported as
    /// [`JobOutcome::Failed`]; only queue I/O errors surface as `Err`.
    pub fn run_once(&self) -> Result<Option<JobOutcome>, QueueError> {
        let claim = match self.queue.try_dequeue(&self.id) {
            Ok(claim) => claim,
            Err(QueueError::NothingAvailable) => return Ok(None),
            Err(e) => return Err(e),
        };

        let owner = claim.key().clone();
        tracing::info!("Worker {} taking {}", self.id, owner);
        self.broadcast(JobEvent::JobClaimed {
            owner: owner.clone(),
            worker_id: self.id.clone(),
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let outcome = match self.process(&owner) {
            Ok(rows) => self.complete(&owner, rows, started),
            Err(message) => self.fail(&owner, message),
        };

        if let Err(e) = claim.release() {
            tracing::warn!("Worker {} failed to release {}: {}", self.id, owner, e);
        }
        Ok(Some(outcome))
    }

    /// Run the processor for `owner`, returning the row count or the
    /// owner-facing failure text.
    fn process(&self, owner: &OwnerKey) -> Result<u64, String> {
        let input = self.store.read_to_vec(owner, Artifact::Input).map_err(|e| {
            tracing::error!("Cannot open input for {}: {}", owner, e);
            format!(
                "Cannot open input file. Please report with code {}",
                owner.short()
            )
        })?;

        let records: Vec<Value> = serde_json::from_slice(&input).map_err(|e| {
            tracing::error!("Cannot parse input for {}: {}", owner, e);
            format!(
                "Cannot read input file. Please report with code {}",
                owner.short()
            )
        })?;

        let mut writer = self
            .store
            .open_for_write(owner, Artifact::Result)
            .map_err(|e| {
                tracing::error!("Cannot open result for {}: {}", owner, e);
                format!(
                    "Cannot initialize output file. Please report with code {}",
                    owner.short()
                )
            })?;

        let mut sink = RowSink::with_format(&mut writer, self.csv);
        let mut progress =
            ProgressReporter::new(&self.store, owner).with_event_tx(self.event_tx.as_ref());
        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            self.processor.process(&records, &mut sink, &mut progress)
        }));

        let cause = match run {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                match e.source() {
                    Some(source) => tracing::error!(
                        "Processor {} failed on {}: {}: {}",
                        self.processor.name(),
                        owner,
                        e,
                        source
                    ),
                    None => tracing::error!(
                        "Processor {} failed on {}: {}",
                        self.processor.name(),
                        owner,
                        e
                    ),
                }
                Some(e.message().to_string())
            }
            Err(payload) => {
                let cause = format!("processor panicked: {}", panic_message(&*payload));
                tracing::error!(
                    "Processor {} failed on {}: {}",
                    self.processor.name(),
                    owner,
                    cause
                );
                Some(cause)
            }
        };
        if let Some(cause) = cause {
            // Dropping the writer leaves the previous result in place.
            return Err(format!(
                "Unexpected error during processing: {}. Please report with code {}",
                cause,
                owner.short()
            ));
        }

        let save_failed = |e: &dyn std::fmt::Display| {
            tracing::error!("Cannot install result for {}: {}", owner, e);
            format!(
                "Cannot save output file. Please report with code {}",
                owner.short()
            )
        };
        let rows = sink.finish().map_err(|e| save_failed(&e))?;
        writer.commit().map_err(|e| save_failed(&e))?;

        Ok(rows)
    }

    fn complete(&self, owner: &OwnerKey, rows: u64, started: Instant) -> JobOutcome {
        if let Err(e) = write_progress(&self.store, owner, &Progress::Ready) {
            tracing::error!("Cannot mark {} ready: {}", owner, e);
            return self.fail(
                owner,
                format!(
                    "Cannot save progress. Please report with code {}",
                    owner.short()
                ),
            );
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Worker {} finished {} in {}ms ({} rows)",
            self.id,
            owner,
            duration_ms,
            rows
        );
        self.broadcast(JobEvent::JobCompleted {
            owner: owner.clone(),
            worker_id: self.id.clone(),
            rows,
            duration_ms,
            timestamp: Utc::now(),
        });

        JobOutcome::Completed {
            owner: owner.clone(),
            rows,
        }
    }

    fn fail(&self, owner: &OwnerKey, message: String) -> JobOutcome {
        if let Err(e) = write_progress(&self.store, owner, &Progress::failed(message.clone())) {
            tracing::error!("Cannot record failure for {}: {}", owner, e);
        }

        self.broadcast(JobEvent::JobFailed {
            owner: owner.clone(),
            worker_id: self.id.clone(),
            error: message.clone(),
            timestamp: Utc::now(),
        });

        JobOutcome::Failed {
            owner: owner.clone(),
            message,
        }
    }

    fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
