#![allow(dead_code)]

use serde_json::Value;
use spool_core::{Artifact, OwnerKey, Progress};
use storage::{AtomicStore, DurableQueue, write_progress};
use tempfile::TempDir;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// A storage root in a temporary directory.
pub struct Spool {
    pub dir: TempDir,
    pub store: AtomicStore,
    pub queue: DurableQueue,
}

pub fn spool() -> Result<Spool, Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = AtomicStore::new(dir.path());
    let queue = DurableQueue::open(dir.path())?;
    Ok(Spool { dir, store, queue })
}

impl Spool {
    /// Submit the way a front end does: input, then `0`, then the marker.
    pub fn submit(&self, owner: &OwnerKey, records: &[Value]) -> TestResult {
        self.store
            .write_bytes(owner, Artifact::Input, &serde_json::to_vec(records)?)?;
        write_progress(&self.store, owner, &Progress::Scheduled)?;
        self.queue.enqueue(owner)?;
        Ok(())
    }

    pub fn result_lines(&self, owner: &OwnerKey) -> Result<Vec<String>, Box<dyn std::error::Error>> {
        let text = self.store.read_to_string(owner, Artifact::Result)?;
        Ok(text.lines().map(str::to_string).collect())
    }
}

pub fn key(s: &str) -> OwnerKey {
    OwnerKey::parse(s).unwrap()
}

pub fn messages(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| serde_json::json!({"content": format!("message {i}"), "role": "user"}))
        .collect()
}
