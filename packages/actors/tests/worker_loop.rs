#![allow(clippy::disallowed_methods)]

mod common;

use std::fs;
use std::sync::Arc;

use actors::{FnProcessor, JobOutcome, JobProcessor, ProcessingFailure, Worker};
use common::{TestResult, key, messages, spool};
use serde_json::Value;
use spool_core::{Artifact, JobEvent, Progress, WorkerId};
use storage::{QueueError, read_progress};
use tokio::sync::broadcast;

const A1B2: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90";
const C3D4: &str = "c3d4e5f60718293a4b5c6d7e8f90a1b2";

fn labeler() -> Arc<dyn JobProcessor> {
    Arc::new(FnProcessor::new("labeler", |records: &[Value], sink, progress| {
        sink.push_row(&["Content", "Role", "Label"])?;
        for (i, record) in records.iter().enumerate() {
            let content = record["content"].as_str().unwrap_or_default();
            let role = record["role"].as_str().unwrap_or_default();
            sink.push_row(&[content, role, "neutral"])?;
            progress.report_fraction(i + 1, records.len())?;
        }
        Ok(())
    }))
}

fn worker(spool: &common::Spool, processor: Arc<dyn JobProcessor>) -> Worker {
    Worker::new(spool.store.clone(), spool.queue.clone(), processor)
}

#[test]
fn empty_queue_is_not_an_error() -> TestResult {
    let spool = spool()?;
    assert_eq!(worker(&spool, labeler()).run_once()?, None);
    Ok(())
}

#[test]
fn successful_job_installs_result_and_reaches_100() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool.submit(&owner, &messages(3))?;

    let outcome = worker(&spool, labeler()).run_once()?;
    assert_eq!(
        outcome,
        Some(JobOutcome::Completed {
            owner: owner.clone(),
            rows: 4
        })
    );

    assert_eq!(read_progress(&spool.store, &owner)?, Progress::Ready);
    let lines = spool.result_lines(&owner)?;
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Content,Role,Label");
    assert_eq!(lines[1], "message 0,user,neutral");

    // Claim released, nothing left to do.
    assert!(spool.queue.stats()?.is_idle());
    assert!(spool.store.tmp_files(&owner, Artifact::Result)?.is_empty());
    Ok(())
}

#[test]
fn one_job_is_claimed_once() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool.submit(&owner, &messages(1))?;

    let claim = spool.queue.try_dequeue(&WorkerId::new())?;
    assert_eq!(claim.key(), &owner);
    assert!(matches!(
        spool.queue.try_dequeue(&WorkerId::new()),
        Err(QueueError::NothingAvailable)
    ));

    // A worker finds nothing while the claim is held.
    assert_eq!(worker(&spool, labeler()).run_once()?, None);
    Ok(())
}

#[test]
fn missing_input_fails_with_report_code() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool.queue.enqueue(&owner)?;

    let outcome = worker(&spool, labeler()).run_once()?.unwrap();
    assert!(!outcome.is_completed());

    let progress = read_progress(&spool.store, &owner)?;
    assert_eq!(
        progress.error(),
        Some("Cannot open input file. Please report with code a1b2c3")
    );
    assert!(!spool.store.artifact_path(&owner, Artifact::Result).exists());
    Ok(())
}

#[test]
fn unparsable_input_fails_without_touching_result() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool
        .store
        .write_bytes(&owner, Artifact::Input, b"{ not json")?;
    spool.queue.enqueue(&owner)?;

    worker(&spool, labeler()).run_once()?;

    let progress = read_progress(&spool.store, &owner)?;
    assert_eq!(
        progress.error(),
        Some("Cannot read input file. Please report with code a1b2c3")
    );
    Ok(())
}

#[test]
fn processor_error_keeps_previous_result() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool.submit(&owner, &messages(2))?;
    worker(&spool, labeler()).run_once()?;
    let before = spool.result_lines(&owner)?;

    let failing: Arc<dyn JobProcessor> =
        Arc::new(FnProcessor::new("failing", |_: &[Value], sink, _| {
            sink.push_row(&["partial"])?;
            Err(ProcessingFailure::new("model unavailable"))
        }));
    spool.submit(&owner, &messages(5))?;
    worker(&spool, failing).run_once()?;

    let progress = read_progress(&spool.store, &owner)?;
    assert_eq!(
        progress.error(),
        Some(
            "Unexpected error during processing: model unavailable. \
             Please report with code a1b2c3"
        )
    );
    assert_eq!(spool.result_lines(&owner)?, before);
    Ok(())
}

#[test]
fn uninstallable_result_fails_with_report_code() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool.submit(&owner, &messages(2))?;

    // Something occupies the result path between open and commit.
    let result_path = spool.store.artifact_path(&owner, Artifact::Result);
    let squatter: Arc<dyn JobProcessor> =
        Arc::new(FnProcessor::new("squatter", move |_: &[Value], sink, _| {
            sink.push_row(&["row"])?;
            fs::create_dir_all(result_path.join("occupied"))?;
            Ok(())
        }));
    let outcome = worker(&spool, squatter).run_once()?.unwrap();
    assert!(!outcome.is_completed());

    let progress = read_progress(&spool.store, &owner)?;
    assert_eq!(
        progress.error(),
        Some("Cannot save output file. Please report with code a1b2c3")
    );
    assert!(spool.queue.stats()?.is_idle());
    Ok(())
}

#[cfg(unix)]
#[test]
fn read_only_owner_dir_fails_to_initialize_output() -> TestResult {
    use std::os::unix::fs::PermissionsExt;

    let spool = spool()?;
    let owner = key(A1B2);
    spool.submit(&owner, &messages(1))?;

    let dir = spool.store.owner_dir(&owner);
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o555))?;
    let enforced = fs::write(dir.join("canary"), b"").is_err();
    let outcome = if enforced {
        worker(&spool, labeler()).run_once()
    } else {
        Ok(None)
    };
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755))?;
    if !enforced {
        // Permission bits do not bind this user.
        return Ok(());
    }

    // The failure text cannot reach a read-only directory either, so it
    // only shows up in the outcome.
    assert_eq!(
        outcome?,
        Some(JobOutcome::Failed {
            owner: owner.clone(),
            message: "Cannot initialize output file. Please report with code a1b2c3".to_string(),
        })
    );
    assert_eq!(read_progress(&spool.store, &owner)?, Progress::Scheduled);
    assert!(spool.store.tmp_files(&owner, Artifact::Result)?.is_empty());
    Ok(())
}

#[test]
fn processor_panic_becomes_failure() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool.submit(&owner, &messages(1))?;

    let panicking: Arc<dyn JobProcessor> =
        Arc::new(FnProcessor::new("panicking", |_: &[Value], _, _| {
            panic!("index out of bounds")
        }));
    let w = worker(&spool, panicking);
    let outcome = w.run_once()?.unwrap();
    assert!(!outcome.is_completed());

    let progress = read_progress(&spool.store, &owner)?;
    let error = progress.error().unwrap();
    assert!(error.contains("index out of bounds"), "{error}");
    assert!(error.ends_with("Please report with code a1b2c3"));

    // The worker is still usable.
    spool.submit(&key(C3D4), &messages(1))?;
    assert_eq!(w.run_once()?.map(|o| o.owner().clone()), Some(key(C3D4)));
    Ok(())
}

#[test]
fn progress_events_strictly_increase() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool.submit(&owner, &messages(10))?;

    let (tx, mut rx) = broadcast::channel(64);
    let jittery: Arc<dyn JobProcessor> =
        Arc::new(FnProcessor::new("jittery", |_: &[Value], _, progress| {
            for p in [10, 50, 30, 50, 80, 0, 99] {
                progress.report(p)?;
            }
            Ok(())
        }));
    worker(&spool, jittery).with_event_tx(tx).run_once()?;

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let JobEvent::JobProgress { percent, .. } = event {
            seen.push(percent);
        }
    }
    assert_eq!(seen, vec![10, 50, 80, 99]);
    assert_eq!(read_progress(&spool.store, &owner)?, Progress::Ready);
    Ok(())
}

#[test]
fn lifecycle_events_are_broadcast() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool.submit(&owner, &messages(2))?;

    let (tx, mut rx) = broadcast::channel(64);
    worker(&spool, labeler()).with_event_tx(tx).run_once()?;

    let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert!(matches!(events.first(), Some(JobEvent::JobClaimed { .. })));
    assert!(matches!(
        events.last(),
        Some(JobEvent::JobCompleted { rows: 3, .. })
    ));
    assert!(events.iter().all(|e| e.owner() == Some(&owner)));
    Ok(())
}

#[test]
fn resubmission_after_failure_runs_again() -> TestResult {
    let spool = spool()?;
    let owner = key(A1B2);
    spool.queue.enqueue(&owner)?;
    worker(&spool, labeler()).run_once()?;
    assert!(read_progress(&spool.store, &owner)?.is_terminal());

    spool.submit(&owner, &messages(1))?;
    assert_eq!(read_progress(&spool.store, &owner)?, Progress::Scheduled);

    let outcome = worker(&spool, labeler()).run_once()?;
    assert!(outcome.is_some_and(|o| o.is_completed()));
    assert_eq!(read_progress(&spool.store, &owner)?, Progress::Ready);
    Ok(())
}

#[test]
fn jobs_run_oldest_first() -> TestResult {
    let spool = spool()?;
    let first = key(C3D4);
    let second = key(A1B2);
    spool.submit(&first, &messages(1))?;
    let marker = spool.queue.dir().join(first.as_str());
    std::fs::File::options()
        .write(true)
        .open(&marker)?
        .set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(60))?;
    spool.submit(&second, &messages(1))?;

    let w = worker(&spool, labeler());
    assert_eq!(w.run_once()?.map(|o| o.owner().clone()), Some(first));
    assert_eq!(w.run_once()?.map(|o| o.owner().clone()), Some(second));
    assert_eq!(w.run_once()?, None);
    Ok(())
}
