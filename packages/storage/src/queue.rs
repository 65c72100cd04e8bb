//! Durable, lock-free job queue on a shared directory.
//!
//! A pending job is an empty marker file named by its owner key. A worker
//! claims it by renaming the marker to `<key>.<worker-id>`; rename on a
//! single local filesystem is atomic with respect to concurrent renamers,
//! so exactly one worker observes success for a given marker. That rename
//! is the queue's whole concurrency-control mechanism.
//!
//! Markers are served oldest-first by modification time. Coarse timestamp
//! resolution and clock adjustments may reorder jobs enqueued close
//! together; ordering is approximate by design.
//!
//! There is no lease: a worker that dies between claim and release leaves
//! its claim marker behind and the job is never retried automatically.
//! [`DurableQueue::drop_claim`] is the explicit way out once an operator
//! knows the claiming worker is gone.
//!
//! A claimed marker never goes back to pending, with one exception: a
//! worker whose rename succeeded but who then finds another claim on the
//! same owner key renames its own claim back before doing any work (see
//! [`DurableQueue::try_dequeue`]). That undoes a claim nobody acted on and
//! keeps at most one active claim per owner key.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use spool_core::{OwnerKey, QueueStats, WorkerId};

use crate::error::QueueError;
use crate::fs::{ignore_not_found, is_regular_file, remove_if_not_regular};

/// Name of the queue directory under the storage root.
pub const QUEUE_DIR: &str = "queue";

#[derive(Debug, Clone)]
pub struct DurableQueue {
    dir: PathBuf,
}

#[derive(Debug)]
struct Pending {
    key: OwnerKey,
    path: PathBuf,
    modified: SystemTime,
}

enum Attempt {
    Won(Claim),
    /// Another worker renamed the marker first.
    Lost,
    /// The claim was undone; stop scanning for this poll.
    BackedOff,
}

#[derive(Debug, Default)]
struct Scan {
    /// Oldest first.
    pending: Vec<Pending>,
    /// Owner keys with at least one claim marker.
    claimed: HashSet<OwnerKey>,
    claim_markers: u64,
}

impl DurableQueue {
    /// Open the queue under `root`, creating the directory when absent.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, QueueError> {
        let dir = root.as_ref().join(QUEUE_DIR);
        remove_if_not_dir(&dir)?;
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self, key: &OwnerKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    fn claim_path(&self, key: &OwnerKey, worker: &WorkerId) -> PathBuf {
        self.dir.join(format!("{}.{}", key, worker))
    }

    /// Add (or re-add) a pending marker for `key`.
    ///
    /// Any previous marker with the same name is replaced, so re-enqueuing
    /// resets the job's position to "now".
    pub fn enqueue(&self, key: &OwnerKey) -> Result<(), QueueError> {
        let path = self.marker_path(key);
        remove_if_not_regular(&path)?;
        ignore_not_found(fs::remove_file(&path))?;
        File::create(&path)?;
        tracing::debug!("Enqueued {}", key);
        Ok(())
    }

    /// Claim the oldest claimable marker for `worker`.
    ///
    /// Returns [`QueueError::NothingAvailable`] when every candidate was
    /// lost to another worker, is already in flight under another claim,
    /// or the queue is empty. Callers are expected to poll again.
    pub fn try_dequeue(&self, worker: &WorkerId) -> Result<Claim, QueueError> {
        let scan = self.scan()?;

        for candidate in scan.pending {
            if scan.claimed.contains(&candidate.key) {
                tracing::debug!("Skipping {}: already in flight", candidate.key);
                continue;
            }

            match self.attempt(candidate, worker)? {
                Attempt::Won(claim) => return Ok(claim),
                Attempt::Lost => continue,
                Attempt::BackedOff => return Err(QueueError::NothingAvailable),
            }
        }

        Err(QueueError::NothingAvailable)
    }

    fn attempt(&self, candidate: Pending, worker: &WorkerId) -> Result<Attempt, QueueError> {
        let claimed_path = self.claim_path(&candidate.key, worker);
        if let Err(e) = fs::rename(&candidate.path, &claimed_path) {
            tracing::debug!("Lost race for {}: {}", candidate.key, e);
            return Ok(Attempt::Lost);
        }

        // The marker can vanish again between rename and now.
        if !is_regular_file(&claimed_path) {
            tracing::debug!("Claim on {} vanished after rename", candidate.key);
            return Ok(Attempt::BackedOff);
        }

        // A resubmission can race a directory scan that missed an
        // in-flight claim. Nothing has run under this claim yet, so
        // returning the marker to pending is safe.
        if self.has_other_claim(&candidate.key, worker)? {
            tracing::debug!("Backing off {}: claimed elsewhere", candidate.key);
            if let Err(e) = fs::rename(&claimed_path, &candidate.path) {
                tracing::warn!("Failed to return {} to pending: {}", candidate.key, e);
            }
            return Ok(Attempt::BackedOff);
        }

        Ok(Attempt::Won(Claim {
            key: candidate.key,
            worker: worker.clone(),
            path: claimed_path,
            released: false,
        }))
    }

    /// Workers holding a claim marker for `key`.
    pub fn claims_for(&self, key: &OwnerKey) -> Result<Vec<WorkerId>, QueueError> {
        let prefix = format!("{}.", key);
        let mut workers = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(worker) = name
                .to_str()
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|suffix| WorkerId::parse(suffix).ok())
            {
                workers.push(worker);
            }
        }
        Ok(workers)
    }

    /// Delete the claim marker `<key>.<worker>`, returning whether one was
    /// there.
    ///
    /// Only for claims left by a worker that is known to be gone. Dropping
    /// the claim of a live worker lets the owner key run twice.
    pub fn drop_claim(&self, key: &OwnerKey, worker: &WorkerId) -> Result<bool, QueueError> {
        let path = self.claim_path(key, worker);
        if !is_regular_file(&path) {
            return Ok(false);
        }
        ignore_not_found(fs::remove_file(&path))?;
        tracing::warn!("Dropped claim on {} held by {}", key, worker);
        Ok(true)
    }

    /// Pending owner keys, oldest first.
    pub fn pending(&self) -> Result<Vec<OwnerKey>, QueueError> {
        Ok(self.scan()?.pending.into_iter().map(|p| p.key).collect())
    }

    /// Whether `key` has a pending marker.
    pub fn is_pending(&self, key: &OwnerKey) -> bool {
        is_regular_file(&self.marker_path(key))
    }

    /// Owner keys that currently hold a claim marker.
    pub fn claimed(&self) -> Result<Vec<OwnerKey>, QueueError> {
        let mut keys: Vec<_> = self.scan()?.claimed.into_iter().collect();
        keys.sort();
        Ok(keys)
    }

    pub fn stats(&self) -> Result<QueueStats, QueueError> {
        let scan = self.scan()?;
        Ok(QueueStats {
            pending: scan.pending.len() as u64,
            claimed: scan.claim_markers,
        })
    }

    fn scan(&self) -> Result<Scan, QueueError> {
        let mut scan = Scan::default();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if let Ok(key) = OwnerKey::parse(name) {
                // Vanished since listing, or not a plain marker.
                let Ok(meta) = fs::symlink_metadata(entry.path()) else {
                    continue;
                };
                if !meta.file_type().is_file() {
                    continue;
                }
                scan.pending.push(Pending {
                    key,
                    path: entry.path(),
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                });
            } else if let Some(key) = parse_claim_name(name) {
                scan.claimed.insert(key);
                scan.claim_markers += 1;
            }
        }

        scan.pending
            .sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)));
        Ok(scan)
    }

    fn has_other_claim(&self, key: &OwnerKey, worker: &WorkerId) -> Result<bool, QueueError> {
        let prefix = format!("{}.", key);
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix(&prefix))
                && !suffix.is_empty()
                && suffix != worker.as_str()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn parse_claim_name(name: &str) -> Option<OwnerKey> {
    let (key, worker) = name.split_once('.')?;
    if worker.is_empty() {
        return None;
    }
    OwnerKey::parse(key).ok()
}

fn remove_if_not_dir(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.file_type().is_dir() => fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Exclusive ownership of one claimed job.
///
/// Dropping the claim deletes the claim marker. A claim handed out by
/// [`DurableQueue::try_dequeue`] never goes back to the pending state;
/// deletion is the only terminal action.
#[derive(Debug)]
pub struct Claim {
    key: OwnerKey,
    worker: WorkerId,
    path: PathBuf,
    released: bool,
}

impl Claim {
    pub fn key(&self) -> &OwnerKey {
        &self.key
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the claim marker, reporting any failure.
    pub fn release(mut self) -> Result<(), QueueError> {
        self.released = true;
        remove_claim_marker(&self.path)?;
        Ok(())
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_claim_marker(&self.path) {
            tracing::warn!("Failed to release claim on {}: {}", self.key, e);
        }
    }
}

fn remove_claim_marker(path: &Path) -> io::Result<()> {
    if is_regular_file(path) {
        ignore_not_found(fs::remove_file(path))
    } else {
        Ok(())
    }
}
