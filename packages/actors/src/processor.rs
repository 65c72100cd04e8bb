//! Job Processor interface consumed by the worker.
//!
//! A processor turns the parsed input records into ordered result rows and
//! reports progress along the way. It may fail at any point; the worker
//! turns that into a failed progress marker.

use std::error::Error;
use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;
use spool_core::{JobEvent, OwnerKey, Progress};
use storage::{AtomicStore, CsvFormat, StoreError, write_progress};
use tokio::sync::broadcast;

/// Opaque failure raised by a processor.
///
/// `message` ends up in the owner-facing progress marker; the optional
/// source carries the full diagnostic for the server log only.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProcessingFailure {
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ProcessingFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    fn with_source(message: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProcessingFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProcessingFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

// Store errors name server paths; only their kind reaches the owner.
impl From<StoreError> for ProcessingFailure {
    fn from(e: StoreError) -> Self {
        let message = if e.is_cannot_open() {
            "cannot read job data"
        } else {
            "cannot save job data"
        };
        Self::with_source(message, e)
    }
}

impl From<io::Error> for ProcessingFailure {
    fn from(e: io::Error) -> Self {
        Self::with_source(format!("I/O error ({})", e.kind()), e)
    }
}

impl From<serde_json::Error> for ProcessingFailure {
    fn from(e: serde_json::Error) -> Self {
        Self::with_source(
            format!("malformed JSON at line {} column {}", e.line(), e.column()),
            e,
        )
    }
}

impl From<csv::Error> for ProcessingFailure {
    fn from(e: csv::Error) -> Self {
        let message = match e.kind() {
            csv::ErrorKind::Io(io) => format!("I/O error ({})", io.kind()),
            _ => "cannot encode result row".to_string(),
        };
        Self::with_source(message, e)
    }
}

/// Trait for job processors.
///
/// Runs on a blocking thread; implementations may do CPU-heavy work
/// directly. Shared resources (models, lexicons) belong in the implementing
/// type, constructed once and shared immutably across workers.
pub trait JobProcessor: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Process one job.
    fn process(
        &self,
        records: &[Value],
        sink: &mut RowSink<'_>,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<(), ProcessingFailure>;
}

/// Ordered CSV row output.
///
/// Rows are anything `csv` can serialize as one record: tuples, arrays,
/// sequences or flat structs of scalars. No header is added; a processor
/// that wants one pushes it as its first row.
pub struct RowSink<'a> {
    out: csv::Writer<&'a mut dyn Write>,
    rows: u64,
}

impl<'a> RowSink<'a> {
    /// A sink using the default dialect.
    pub fn new(out: &'a mut dyn Write) -> Self {
        Self::with_format(out, CsvFormat::default())
    }

    pub fn with_format(out: &'a mut dyn Write, format: CsvFormat) -> Self {
        let out = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(format.delimiter)
            .quote(format.quote)
            .from_writer(out);
        Self { out, rows: 0 }
    }

    /// Append one row.
    pub fn push_row<R: Serialize + ?Sized>(&mut self, row: &R) -> Result<(), ProcessingFailure> {
        self.out.serialize(row)?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush buffered rows to the underlying writer.
    pub fn finish(mut self) -> io::Result<u64> {
        self.out.flush()?;
        Ok(self.rows)
    }
}

/// Progress callback handed to processors.
///
/// Values are clamped to `1..=99` (`0` and `100` belong to the worker) and
/// only strictly increasing values are persisted, so readers observe a
/// non-decreasing sequence during a run.
pub struct ProgressReporter<'a> {
    store: &'a AtomicStore,
    owner: &'a OwnerKey,
    last: u8,
    event_tx: Option<&'a broadcast::Sender<JobEvent>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(store: &'a AtomicStore, owner: &'a OwnerKey) -> Self {
        Self {
            store,
            owner,
            last: 0,
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: Option<&'a broadcast::Sender<JobEvent>>) -> Self {
        self.event_tx = tx;
        self
    }

    /// Report percent complete.
    pub fn report(&mut self, percent: u8) -> Result<(), ProcessingFailure> {
        let percent = percent.clamp(1, 99);
        if percent <= self.last {
            return Ok(());
        }

        write_progress(self.store, self.owner, &Progress::Running { percent })?;
        self.last = percent;

        if let Some(tx) = self.event_tx {
            let _ = tx.send(JobEvent::JobProgress {
                owner: self.owner.clone(),
                percent,
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(())
    }

    /// Report `done` out of `total` items, mapped onto `1..=99`.
    pub fn report_fraction(&mut self, done: usize, total: usize) -> Result<(), ProcessingFailure> {
        if total == 0 {
            return self.report(99);
        }
        let percent = 1 + done.min(total) * 99 / total;
        self.report(percent.min(99) as u8)
    }

    /// Last persisted value, `0` before the first report.
    pub fn last(&self) -> u8 {
        self.last
    }
}

/// A simple function-based processor.
pub struct FnProcessor<F>
where
    F: Fn(&[Value], &mut RowSink<'_>, &mut ProgressReporter<'_>) -> Result<(), ProcessingFailure>
        + Send
        + Sync
        + 'static,
{
    name: String,
    processor: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&[Value], &mut RowSink<'_>, &mut ProgressReporter<'_>) -> Result<(), ProcessingFailure>
        + Send
        + Sync
        + 'static,
{
    pub fn new(name: impl Into<String>, processor: F) -> Self {
        Self {
            name: name.into(),
            processor,
        }
    }
}

impl<F> JobProcessor for FnProcessor<F>
where
    F: Fn(&[Value], &mut RowSink<'_>, &mut ProgressReporter<'_>) -> Result<(), ProcessingFailure>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(
        &self,
        records: &[Value],
        sink: &mut RowSink<'_>,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<(), ProcessingFailure> {
        (self.processor)(records, sink, progress)
    }
}
