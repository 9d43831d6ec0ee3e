// ffwrap-core/tests/queue_tests.rs
//
// Runs the job queue against real processes: `true`, `false`, `sleep` and
// small `sh` scripts stand in for ffmpeg.

#![cfg(unix)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ffwrap_core::{FfmpegCommandBuilder, JobQueue, JobStatus};

fn command(executable: &str, arg: &str) -> FfmpegCommandBuilder {
    let mut builder = FfmpegCommandBuilder::with_executable(executable, false);
    builder.add_output(arg).unwrap();
    builder
}

#[test]
fn test_stop_on_error_leaves_rest_pending() {
    let mut queue: JobQueue = JobQueue::new();
    queue.add_job(&command("true", "a"), None, Some("A"), ());
    queue.add_job(&command("false", "b"), None, Some("B"), ());
    queue.add_job(&command("true", "c"), None, Some("C"), ());

    let completed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&completed);
    queue.on_job_complete(move |index, job| {
        sink.lock().unwrap().push((index, job.id().map(str::to_string), job.status()));
    });

    let results: Vec<_> = queue
        .run_queue(true)
        .iter()
        .map(|job| (job.id().unwrap().to_string(), job.status()))
        .collect();
    assert_eq!(
        results,
        vec![("A".to_string(), JobStatus::Completed), ("B".to_string(), JobStatus::Failed)]
    );
    assert_eq!(queue.pending_job_count(), 1);
    assert_eq!(queue.pending_jobs().next().unwrap().id(), Some("C"));
    assert!(queue.processed_jobs()[1].error_message().is_some());

    let completed = completed.lock().unwrap();
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[1], (1, Some("B".to_string()), JobStatus::Failed));
}

#[test]
fn test_continue_after_error() {
    let mut queue: JobQueue = JobQueue::new();
    queue.add_job(&command("false", "a"), None, Some("A"), ());
    queue.add_job(&command("true", "b"), None, Some("B"), ());

    let statuses: Vec<_> = queue.run_queue(false).iter().map(|job| job.status()).collect();
    assert_eq!(statuses, vec![JobStatus::Failed, JobStatus::Completed]);
    assert_eq!(queue.pending_job_count(), 0);
    assert!(!queue.is_running());
}

#[test]
fn test_progress_reaches_job() {
    let mut builder = FfmpegCommandBuilder::with_executable("sh", false);
    builder
        .add_global_option("-c", Some("printf 'time=00:00:05.00 speed=2x\\r' >&2"))
        .unwrap();
    builder.add_output("encode").unwrap();

    let mut queue: JobQueue = JobQueue::new();
    queue.add_job(&builder, Some(10.0), Some("encode"), ());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    queue.on_job_progress(move |_, _, pct| sink.lock().unwrap().push(pct));

    let jobs = queue.run_queue(true);
    assert_eq!(jobs[0].status(), JobStatus::Completed);
    assert_eq!(jobs[0].progress(), Some(100.0));
    assert_eq!(*seen.lock().unwrap(), vec![50.0, 100.0]);
}

#[test]
fn test_cancel_current_job_from_another_thread() {
    let mut queue: JobQueue = JobQueue::new();
    queue.add_job(&command("sleep", "30"), None, Some("slow"), ());
    queue.add_job(&command("true", "after"), None, Some("after"), ());
    let handle = queue.handle();
    assert!(!handle.cancel_current_job());

    let (started_tx, started_rx) = mpsc::channel();
    queue.on_process_created(move |_, job, process| {
        let _ = started_tx.send((job.id().map(str::to_string), process.pid()));
    });

    let started = Instant::now();
    let worker = thread::spawn(move || {
        let statuses: Vec<_> = queue.run_queue(false).iter().map(|job| job.status()).collect();
        statuses
    });

    let (id, pid) = started_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(id.as_deref(), Some("slow"));
    assert!(pid > 0);
    assert!(handle.is_running());
    assert_eq!(handle.active_job().unwrap().id.as_deref(), Some("slow"));
    assert!(handle.cancel_current_job());

    let statuses = worker.join().unwrap();
    assert_eq!(statuses, vec![JobStatus::Cancelled, JobStatus::Completed]);
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(!handle.is_running());
    assert!(handle.active_job().is_none());
}

#[test]
fn test_cancel_queue_from_another_thread() {
    let mut queue: JobQueue = JobQueue::new();
    queue.add_job(&command("sleep", "30"), None, Some("slow"), ());
    queue.add_job(&command("true", "b"), None, Some("b"), ());
    queue.add_job(&command("true", "c"), None, Some("c"), ());
    let handle = queue.handle();

    let (started_tx, started_rx) = mpsc::channel();
    queue.on_process_created(move |_, _, _| {
        let _ = started_tx.send(());
    });

    let worker = thread::spawn(move || {
        let results: Vec<_> = queue
            .run_queue(false)
            .iter()
            .map(|job| (job.status(), job.error_message().is_some()))
            .collect();
        (results, queue.pending_job_count())
    });

    started_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    handle.cancel_queue();

    let (results, pending) = worker.join().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(status, has_message)| *status == JobStatus::Cancelled && *has_message));
    assert_eq!(pending, 0);
}
