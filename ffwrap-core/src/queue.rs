// ============================================================================
// ffwrap-core/src/queue.rs
// ============================================================================
//
// JOB QUEUE: Sequential execution of ffmpeg jobs
//
// Jobs are snapshots of a command builder plus an expected duration. The
// queue runs them strictly one at a time, in FIFO order, through a
// CommandRunner and reports each lifecycle step to optional handlers.
//
// KEY COMPONENTS:
// - Job / JobStatus: a queued command and its lifecycle state
// - JobQueue: owns pending and processed jobs, runs them
// - QueueHandle: Send + Sync handle for cancelling from another thread
// - Handler traits, one per callback role
//
// Lifecycle of a job: Pending -> Running -> Completed | Failed | Cancelled.
// Terminal states are final. Only the queue loop writes job status; other
// threads interact through the shared atomic flags and the active-job slot.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};

use crate::error::CoreResult;
use crate::external::executor::{CommandRunner, ProcessHandle, SystemRunner};
use crate::external::ffmpeg_builder::FfmpegCommandBuilder;

const QUEUE_CANCELLED_MESSAGE: &str = "queue cancelled before job started";
const JOB_CANCELLED_MESSAGE: &str = "job cancelled";

/// Lifecycle state of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A queued ffmpeg command.
///
/// `C` is caller-defined context carried along with the job (an output path,
/// a database id, ...).
#[derive(Debug, Clone)]
pub struct Job<C = ()> {
    seq: u64,
    id: Option<String>,
    builder: FfmpegCommandBuilder,
    duration_secs: Option<f64>,
    context: C,
    status: JobStatus,
    progress: Option<f64>,
    error_message: Option<String>,
}

impl<C> Job<C> {
    /// Sequence number assigned by the queue, unique per queue.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Snapshot of the builder taken when the job was added.
    #[must_use]
    pub fn builder(&self) -> &FfmpegCommandBuilder {
        &self.builder
    }

    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    #[must_use]
    pub fn context(&self) -> &C {
        &self.context
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Last percentage reported by the job's run, recorded once the run
    /// ends. While the job is running this is `None`; progress handlers get
    /// the current value as their `percent` argument.
    #[must_use]
    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    /// Reason for a failed or cancelled job.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Human readable label for log lines.
    fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("#{} ({})", self.seq, id),
            None => format!("#{}", self.seq),
        }
    }

    fn transition(&mut self, next: JobStatus) {
        if self.status.is_terminal() {
            warn!(
                "Ignoring transition of job {} from {} to {}",
                self.label(),
                self.status,
                next
            );
            return;
        }
        self.status = next;
    }
}

/// Identity of the job currently running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJob {
    pub seq: u64,
    pub id: Option<String>,
}

// ---- Callback roles ----

/// Called right before a job starts. `index` counts jobs within one run.
pub trait JobStartHandler<C> {
    fn on_job_start(&mut self, index: usize, job: &Job<C>);
}

/// Called with each progress percentage of the running job.
///
/// `percent` is the current value. `job.progress()` stays `None` until the
/// run ends.
pub trait JobProgressHandler<C> {
    fn on_job_progress(&mut self, index: usize, job: &Job<C>, percent: f64);
}

/// Called once the job's process exists.
pub trait ProcessCreatedHandler<C> {
    fn on_process_created(&mut self, index: usize, job: &Job<C>, process: &ProcessHandle);
}

/// Called when a job reaches a terminal state.
pub trait JobCompleteHandler<C> {
    fn on_job_complete(&mut self, index: usize, job: &Job<C>);
}

/// Called before the first job of a non-empty run with the number of
/// pending jobs.
pub trait QueueStartHandler {
    fn on_queue_start(&mut self, pending: usize);
}

/// Called after a run with the jobs processed in it.
pub trait QueueCompleteHandler<C> {
    fn on_queue_complete(&mut self, jobs: &[Job<C>]);
}

impl<C, F: FnMut(usize, &Job<C>)> JobStartHandler<C> for F {
    fn on_job_start(&mut self, index: usize, job: &Job<C>) {
        self(index, job)
    }
}

impl<C, F: FnMut(usize, &Job<C>, f64)> JobProgressHandler<C> for F {
    fn on_job_progress(&mut self, index: usize, job: &Job<C>, percent: f64) {
        self(index, job, percent)
    }
}

impl<C, F: FnMut(usize, &Job<C>, &ProcessHandle)> ProcessCreatedHandler<C> for F {
    fn on_process_created(&mut self, index: usize, job: &Job<C>, process: &ProcessHandle) {
        self(index, job, process)
    }
}

impl<C, F: FnMut(usize, &Job<C>)> JobCompleteHandler<C> for F {
    fn on_job_complete(&mut self, index: usize, job: &Job<C>) {
        self(index, job)
    }
}

impl<F: FnMut(usize)> QueueStartHandler for F {
    fn on_queue_start(&mut self, pending: usize) {
        self(pending)
    }
}

impl<C, F: FnMut(&[Job<C>])> QueueCompleteHandler<C> for F {
    fn on_queue_complete(&mut self, jobs: &[Job<C>]) {
        self(jobs)
    }
}

struct Handlers<C> {
    job_start: Option<Box<dyn JobStartHandler<C> + Send>>,
    job_progress: Option<Box<dyn JobProgressHandler<C> + Send>>,
    process_created: Option<Box<dyn ProcessCreatedHandler<C> + Send>>,
    job_complete: Option<Box<dyn JobCompleteHandler<C> + Send>>,
    queue_start: Option<Box<dyn QueueStartHandler + Send>>,
    queue_complete: Option<Box<dyn QueueCompleteHandler<C> + Send>>,
}

impl<C> Default for Handlers<C> {
    fn default() -> Self {
        Self {
            job_start: None,
            job_progress: None,
            process_created: None,
            job_complete: None,
            queue_start: None,
            queue_complete: None,
        }
    }
}

// ---- Shared state ----

struct ActiveSlot {
    job: ActiveJob,
    process: Option<ProcessHandle>,
}

#[derive(Default)]
struct SharedState {
    running: AtomicBool,
    cancel_job: AtomicBool,
    cancel_queue: AtomicBool,
    active: Mutex<Option<ActiveSlot>>,
}

impl SharedState {
    fn active(&self) -> MutexGuard<'_, Option<ActiveSlot>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_job.load(Ordering::SeqCst) || self.cancel_queue.load(Ordering::SeqCst)
    }

    fn cancel_current_job(&self) -> bool {
        let slot = self.active();
        let Some(active) = slot.as_ref() else {
            debug!("No running job to cancel");
            return false;
        };
        info!("Cancelling job #{}", active.job.seq);
        self.cancel_job.store(true, Ordering::SeqCst);
        kill_process(active.process.as_ref());
        true
    }

    fn cancel_queue(&self) {
        let slot = self.active();
        info!("Cancelling queue");
        self.cancel_queue.store(true, Ordering::SeqCst);
        if let Some(active) = slot.as_ref() {
            self.cancel_job.store(true, Ordering::SeqCst);
            kill_process(active.process.as_ref());
        }
    }

    fn active_job(&self) -> Option<ActiveJob> {
        self.active().as_ref().map(|slot| slot.job.clone())
    }
}

fn kill_process(process: Option<&ProcessHandle>) {
    if let Some(process) = process {
        if let Err(e) = process.kill() {
            warn!("Failed to kill process {}: {}", process.pid(), e);
        }
    }
}

/// Cloneable, thread-safe handle for observing and cancelling a running
/// queue.
#[derive(Clone)]
pub struct QueueHandle {
    shared: Arc<SharedState>,
}

impl QueueHandle {
    /// Kills the running job's process. Returns false when no job is running.
    pub fn cancel_current_job(&self) -> bool {
        self.shared.cancel_current_job()
    }

    /// Cancels the running job and every job still pending in this run.
    pub fn cancel_queue(&self) {
        self.shared.cancel_queue();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn active_job(&self) -> Option<ActiveJob> {
        self.shared.active_job()
    }
}

impl fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("running", &self.is_running())
            .field("active_job", &self.active_job())
            .finish()
    }
}

// ---- Queue ----

/// Sequential runner for ffmpeg jobs.
///
/// # Examples
///
/// ```rust,no_run
/// use ffwrap_core::{FfmpegCommandBuilder, JobQueue};
///
/// let mut builder = FfmpegCommandBuilder::new();
/// builder.add_input("in.mkv").unwrap();
/// builder.add_output("out.mp4").unwrap();
///
/// let mut queue: JobQueue = JobQueue::new();
/// queue.add_job(&builder, Some(120.0), Some("first"), ());
/// queue.on_job_progress(|_, job, pct| println!("{:?}: {pct:.1}%", job.id()));
///
/// for job in queue.run_queue(true) {
///     println!("{:?} {}", job.id(), job.status());
/// }
/// ```
pub struct JobQueue<C = ()> {
    pending: VecDeque<Job<C>>,
    processed: Vec<Job<C>>,
    handlers: Handlers<C>,
    runner: Box<dyn CommandRunner>,
    shared: Arc<SharedState>,
    next_seq: u64,
}

impl<C> Default for JobQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> JobQueue<C> {
    /// Queue that runs jobs as real processes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runner(SystemRunner)
    }

    /// Queue that runs jobs through `runner`.
    pub fn with_runner<R: CommandRunner + 'static>(runner: R) -> Self {
        Self {
            pending: VecDeque::new(),
            processed: Vec::new(),
            handlers: Handlers::default(),
            runner: Box::new(runner),
            shared: Arc::new(SharedState::default()),
            next_seq: 0,
        }
    }

    /// Handle for cancelling and observing from other threads.
    #[must_use]
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    // ---- Handler registration ----

    pub fn on_job_start<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(usize, &Job<C>) + Send + 'static,
    {
        self.set_job_start_handler(f)
    }

    pub fn on_job_progress<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(usize, &Job<C>, f64) + Send + 'static,
    {
        self.set_job_progress_handler(f)
    }

    pub fn on_process_created<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(usize, &Job<C>, &ProcessHandle) + Send + 'static,
    {
        self.set_process_created_handler(f)
    }

    pub fn on_job_complete<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(usize, &Job<C>) + Send + 'static,
    {
        self.set_job_complete_handler(f)
    }

    pub fn on_queue_start<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(usize) + Send + 'static,
    {
        self.set_queue_start_handler(f)
    }

    pub fn on_queue_complete<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(&[Job<C>]) + Send + 'static,
    {
        self.set_queue_complete_handler(f)
    }

    pub fn set_job_start_handler<H: JobStartHandler<C> + Send + 'static>(&mut self, handler: H) -> &mut Self {
        self.handlers.job_start = Some(Box::new(handler));
        self
    }

    pub fn set_job_progress_handler<H: JobProgressHandler<C> + Send + 'static>(&mut self, handler: H) -> &mut Self {
        self.handlers.job_progress = Some(Box::new(handler));
        self
    }

    pub fn set_process_created_handler<H: ProcessCreatedHandler<C> + Send + 'static>(&mut self, handler: H) -> &mut Self {
        self.handlers.process_created = Some(Box::new(handler));
        self
    }

    pub fn set_job_complete_handler<H: JobCompleteHandler<C> + Send + 'static>(&mut self, handler: H) -> &mut Self {
        self.handlers.job_complete = Some(Box::new(handler));
        self
    }

    pub fn set_queue_start_handler<H: QueueStartHandler + Send + 'static>(&mut self, handler: H) -> &mut Self {
        self.handlers.queue_start = Some(Box::new(handler));
        self
    }

    pub fn set_queue_complete_handler<H: QueueCompleteHandler<C> + Send + 'static>(&mut self, handler: H) -> &mut Self {
        self.handlers.queue_complete = Some(Box::new(handler));
        self
    }

    // ---- Jobs ----

    /// Enqueues a snapshot of `builder`. Later changes to the builder do not
    /// affect the job.
    pub fn add_job(
        &mut self,
        builder: &FfmpegCommandBuilder,
        duration_secs: Option<f64>,
        job_id: Option<&str>,
        context: C,
    ) -> &Job<C> {
        let job = Job {
            seq: self.next_seq,
            id: job_id.map(str::to_string),
            builder: builder.clone(),
            duration_secs,
            context,
            status: JobStatus::Pending,
            progress: None,
            error_message: None,
        };
        self.next_seq += 1;
        debug!("Queued job {}", job.label());
        self.pending.push_back(job);
        &self.pending[self.pending.len() - 1]
    }

    pub fn pending_jobs(&self) -> impl Iterator<Item = &Job<C>> {
        self.pending.iter()
    }

    /// Jobs processed by the most recent run.
    #[must_use]
    pub fn processed_jobs(&self) -> &[Job<C>] {
        &self.processed
    }

    #[must_use]
    pub fn pending_job_count(&self) -> usize {
        self.pending.len()
    }

    /// Drops all pending jobs and returns how many were removed.
    pub fn clear_pending_jobs(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        if count > 0 {
            info!("Cleared {} pending job(s)", count);
        }
        count
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn active_job(&self) -> Option<ActiveJob> {
        self.shared.active_job()
    }

    pub fn cancel_current_job(&self) -> bool {
        self.shared.cancel_current_job()
    }

    pub fn cancel_queue(&self) {
        self.shared.cancel_queue();
    }

    // ---- Execution ----

    /// Runs pending jobs in order and returns the jobs processed in this run.
    ///
    /// With `stop_on_error` the first failure ends the run; jobs after it
    /// stay pending. Job failures never escape as errors: they are recorded
    /// on the job. After `cancel_queue` the remaining jobs are marked
    /// cancelled and included in the result.
    pub fn run_queue(&mut self, stop_on_error: bool) -> &[Job<C>] {
        if self.pending.is_empty() {
            debug!("Queue is empty, nothing to run");
            return &[];
        }

        self.processed.clear();
        self.shared.cancel_job.store(false, Ordering::SeqCst);
        self.shared.cancel_queue.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);

        let total = self.pending.len();
        info!("Starting queue with {} job(s)", total);
        if let Some(handler) = self.handlers.queue_start.as_mut() {
            handler.on_queue_start(total);
        }

        let mut index = 0;
        while let Some(mut job) = self.pending.pop_front() {
            if self.shared.cancel_queue.load(Ordering::SeqCst) {
                self.pending.push_front(job);
                break;
            }

            self.run_job(index, &mut job);
            let failed = job.status == JobStatus::Failed;
            self.processed.push(job);
            index += 1;

            if failed && stop_on_error {
                warn!(
                    "Stopping queue after failed job, {} job(s) left pending",
                    self.pending.len()
                );
                break;
            }
        }

        if self.shared.cancel_queue.load(Ordering::SeqCst) {
            self.cancel_remaining(&mut index);
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.log_summary();
        if let Some(handler) = self.handlers.queue_complete.as_mut() {
            handler.on_queue_complete(&self.processed);
        }
        &self.processed
    }

    fn run_job(&mut self, index: usize, job: &mut Job<C>) {
        self.shared.cancel_job.store(false, Ordering::SeqCst);
        info!("Starting job {}", job.label());
        if let Some(handler) = self.handlers.job_start.as_mut() {
            handler.on_job_start(index, job);
        }

        job.transition(JobStatus::Running);
        job.progress = None;
        job.error_message = None;
        *self.shared.active() = Some(ActiveSlot {
            job: ActiveJob {
                seq: job.seq,
                id: job.id.clone(),
            },
            process: None,
        });

        let (outcome, progress) = self.execute(index, job);
        *self.shared.active() = None;
        if progress.is_some() {
            job.progress = progress;
        }

        match outcome {
            Ok(true) => {
                info!("Job {} completed", job.label());
                job.transition(JobStatus::Completed);
            }
            Ok(false) => {
                error!("Job {} exited unsuccessfully", job.label());
                job.error_message = Some("ffmpeg exited unsuccessfully".to_string());
                job.transition(JobStatus::Failed);
            }
            Err(e) if self.shared.cancel_requested() => {
                info!("Job {} cancelled", job.label());
                debug!("Cancelled job error: {}", e);
                job.error_message = Some(JOB_CANCELLED_MESSAGE.to_string());
                job.transition(JobStatus::Cancelled);
            }
            Err(e) => {
                error!("Job {} failed: {}", job.label(), e);
                job.error_message = Some(e.to_string());
                job.transition(JobStatus::Failed);
            }
        }

        if let Some(handler) = self.handlers.job_complete.as_mut() {
            handler.on_job_complete(index, job);
        }
    }

    /// Runs one job through the runner. Returns the outcome and the last
    /// reported percentage.
    fn execute(&mut self, index: usize, job: &Job<C>) -> (CoreResult<bool>, Option<f64>) {
        let command = match job.builder.build_list() {
            Ok(command) => command,
            Err(e) => return (Err(e), None),
        };

        let last_percent = Cell::new(None);
        let shared = &self.shared;
        let progress_handler = &mut self.handlers.job_progress;
        let process_handler = &mut self.handlers.process_created;

        let mut on_progress = |percent: f64| {
            last_percent.set(Some(percent));
            if let Some(handler) = progress_handler.as_mut() {
                handler.on_job_progress(index, job, percent);
            }
        };
        let mut on_process = |process: &ProcessHandle| {
            {
                let mut slot = shared.active();
                if let Some(active) = slot.as_mut() {
                    active.process = Some(process.clone());
                }
                if shared.cancel_requested() {
                    debug!("Cancellation already requested, killing process {}", process.pid());
                    kill_process(Some(process));
                }
            }
            if let Some(handler) = process_handler.as_mut() {
                handler.on_process_created(index, job, process);
            }
        };

        let outcome = self.runner.run_with_progress(
            &command,
            job.duration_secs,
            &mut on_progress,
            &mut on_process,
            true,
        );
        (outcome, last_percent.get())
    }

    fn cancel_remaining(&mut self, index: &mut usize) {
        let remaining: Vec<Job<C>> = self.pending.drain(..).collect();
        if !remaining.is_empty() {
            info!("Marking {} remaining job(s) as cancelled", remaining.len());
        }
        for mut job in remaining {
            job.error_message = Some(QUEUE_CANCELLED_MESSAGE.to_string());
            job.transition(JobStatus::Cancelled);
            if let Some(handler) = self.handlers.job_complete.as_mut() {
                handler.on_job_complete(*index, &job);
            }
            self.processed.push(job);
            *index += 1;
        }
    }

    fn log_summary(&self) {
        let count = |status: JobStatus| self.processed.iter().filter(|j| j.status == status).count();
        info!(
            "Queue finished: {} completed, {} failed, {} cancelled, {} pending",
            count(JobStatus::Completed),
            count(JobStatus::Failed),
            count(JobStatus::Cancelled),
            self.pending.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::process_failed_error;

    /// Runner driven by a closure over the command and the progress callback.
    struct FnRunner<F>(F);

    impl<F> CommandRunner for FnRunner<F>
    where
        F: Fn(&[String], &mut dyn FnMut(f64)) -> CoreResult<bool> + Send,
    {
        fn run_with_progress(
            &self,
            command: &[String],
            _duration_secs: Option<f64>,
            progress: &mut dyn FnMut(f64),
            _on_process: &mut dyn FnMut(&ProcessHandle),
            _check: bool,
        ) -> CoreResult<bool> {
            (self.0)(command, progress)
        }
    }

    /// Fails any command whose output path contains "fail".
    fn scripted_runner() -> FnRunner<impl Fn(&[String], &mut dyn FnMut(f64)) -> CoreResult<bool> + Send> {
        FnRunner(|command: &[String], progress: &mut dyn FnMut(f64)| {
            progress(50.0);
            let output = command.last().cloned().unwrap_or_default();
            if output.contains("fail") {
                Err(process_failed_error(command, 1, "", "Conversion failed!"))
            } else {
                progress(100.0);
                Ok(true)
            }
        })
    }

    fn builder_for(output: &str) -> FfmpegCommandBuilder {
        let mut builder = FfmpegCommandBuilder::new();
        builder.add_input("in.mkv").unwrap();
        builder.add_output(output).unwrap();
        builder
    }

    fn ids(jobs: &[Job]) -> Vec<String> {
        jobs.iter().map(|j| j.id().unwrap_or("").to_string()).collect()
    }

    fn statuses(jobs: &[Job]) -> Vec<JobStatus> {
        jobs.iter().map(Job::status).collect()
    }

    fn queue_abc() -> JobQueue {
        let mut queue = JobQueue::with_runner(scripted_runner());
        queue.add_job(&builder_for("a.mkv"), Some(10.0), Some("A"), ());
        queue.add_job(&builder_for("b-fail.mkv"), Some(10.0), Some("B"), ());
        queue.add_job(&builder_for("c.mkv"), Some(10.0), Some("C"), ());
        queue
    }

    #[test]
    fn test_empty_queue_fires_nothing() {
        let events = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut queue: JobQueue = JobQueue::with_runner(scripted_runner());
        let e = Arc::clone(&events);
        queue.on_queue_start(move |_| e.lock().unwrap().push("start".into()));
        let e = Arc::clone(&events);
        queue.on_queue_complete(move |_| e.lock().unwrap().push("complete".into()));

        assert!(queue.run_queue(true).is_empty());
        assert!(events.lock().unwrap().is_empty());
        assert!(!queue.is_running());
    }

    #[test]
    fn test_stop_on_error_leaves_rest_pending() {
        let completed_ids = Arc::new(Mutex::new(Vec::new()));
        let mut queue = queue_abc();
        let sink = Arc::clone(&completed_ids);
        queue.on_queue_complete(move |jobs: &[Job]| *sink.lock().unwrap() = ids(jobs));

        let processed = queue.run_queue(true);
        assert_eq!(ids(processed), vec!["A", "B"]);
        assert_eq!(statuses(processed), vec![JobStatus::Completed, JobStatus::Failed]);
        assert!(processed[1].error_message().unwrap().contains("Conversion failed!"));

        assert_eq!(*completed_ids.lock().unwrap(), vec!["A", "B"]);
        assert_eq!(queue.pending_job_count(), 1);
        let pending: Vec<_> = queue.pending_jobs().collect();
        assert_eq!(pending[0].id(), Some("C"));
        assert_eq!(pending[0].status(), JobStatus::Pending);
    }

    #[test]
    fn test_job_progress_recorded_after_run() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut queue = queue_abc();
        let sink = Arc::clone(&seen);
        queue.on_job_progress(move |_, job: &Job, percent| {
            sink.lock().unwrap().push((job.progress(), percent));
        });

        let processed = queue.run_queue(true);
        assert_eq!(processed[0].progress(), Some(100.0));
        assert_eq!(processed[1].progress(), Some(50.0));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(None, 50.0), (None, 100.0), (None, 50.0)]
        );
    }

    #[test]
    fn test_continue_on_error_runs_everything() {
        let mut queue = queue_abc();
        let processed = queue.run_queue(false);
        assert_eq!(ids(processed), vec!["A", "B", "C"]);
        assert_eq!(
            statuses(processed),
            vec![JobStatus::Completed, JobStatus::Failed, JobStatus::Completed]
        );
        assert_eq!(processed[0].progress(), Some(100.0));
        assert_eq!(processed[1].progress(), Some(50.0));
        assert_eq!(queue.pending_job_count(), 0);
    }

    #[test]
    fn test_callback_order() {
        let events = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut queue = queue_abc();

        let e = Arc::clone(&events);
        queue.on_queue_start(move |n| e.lock().unwrap().push(format!("queue_start {n}")));
        let e = Arc::clone(&events);
        queue.on_job_start(move |i, job: &Job| e.lock().unwrap().push(format!("start {i} {}", job.id().unwrap())));
        let e = Arc::clone(&events);
        queue.on_job_progress(move |i, _job: &Job, pct| e.lock().unwrap().push(format!("progress {i} {pct}")));
        let e = Arc::clone(&events);
        queue.on_job_complete(move |i, job: &Job| e.lock().unwrap().push(format!("complete {i} {}", job.status())));
        let e = Arc::clone(&events);
        queue.on_queue_complete(move |jobs: &[Job]| e.lock().unwrap().push(format!("queue_complete {}", jobs.len())));

        queue.run_queue(true);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "queue_start 3",
                "start 0 A",
                "progress 0 50",
                "progress 0 100",
                "complete 0 completed",
                "start 1 B",
                "progress 1 50",
                "complete 1 failed",
                "queue_complete 2",
            ]
        );
    }

    #[test]
    fn test_build_error_is_a_job_failure() {
        let mut queue: JobQueue = JobQueue::with_runner(scripted_runner());
        let mut no_output = FfmpegCommandBuilder::new();
        no_output.add_input("in.mkv").unwrap();
        queue.add_job(&no_output, None, Some("broken"), ());
        queue.add_job(&builder_for("ok.mkv"), None, Some("ok"), ());

        let processed = queue.run_queue(false);
        assert_eq!(statuses(processed), vec![JobStatus::Failed, JobStatus::Completed]);
        assert!(processed[0].error_message().unwrap().contains("no outputs"));
    }

    #[test]
    fn test_builder_snapshot_is_isolated() {
        let mut queue: JobQueue = JobQueue::with_runner(scripted_runner());
        let mut builder = builder_for("first.mkv");
        queue.add_job(&builder, None, None, ());
        builder.add_output("second.mkv").unwrap();
        let job = queue.pending_jobs().next().unwrap();
        assert_eq!(job.builder().output_count(), 1);
        assert_eq!(job.seq(), 0);
    }

    #[test]
    fn test_cancel_current_job_from_progress() {
        let mut queue: JobQueue = JobQueue::with_runner(FnRunner(
            |command: &[String], progress: &mut dyn FnMut(f64)| {
                progress(10.0);
                if command.last().is_some_and(|o| o.contains("slow")) {
                    Err(process_failed_error(command, -1, "", "killed"))
                } else {
                    Ok(true)
                }
            },
        ));
        queue.add_job(&builder_for("slow.mkv"), Some(100.0), Some("slow"), ());
        queue.add_job(&builder_for("next.mkv"), Some(100.0), Some("next"), ());

        let handle = queue.handle();
        let cancelled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&cancelled);
        queue.on_job_progress(move |_, job: &Job, _| {
            if job.id() == Some("slow") {
                sink.lock().unwrap().push(handle.cancel_current_job());
            }
        });

        let processed = queue.run_queue(true);
        assert_eq!(statuses(processed), vec![JobStatus::Cancelled, JobStatus::Completed]);
        assert_eq!(processed[0].error_message(), Some("job cancelled"));
        assert_eq!(*cancelled.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_cancel_queue_marks_remaining_cancelled() {
        let mut queue = queue_abc();
        let handle = queue.handle();
        let completes = Arc::new(Mutex::new(0usize));

        queue.on_job_start(move |index, _job: &Job| {
            if index == 0 {
                handle.cancel_queue();
            }
        });
        let sink = Arc::clone(&completes);
        queue.on_job_complete(move |_, _job: &Job| *sink.lock().unwrap() += 1);

        let processed = queue.run_queue(true);
        assert_eq!(ids(processed), vec!["A", "B", "C"]);
        assert_eq!(
            statuses(processed),
            vec![JobStatus::Completed, JobStatus::Cancelled, JobStatus::Cancelled]
        );
        assert_eq!(processed[2].error_message(), Some(QUEUE_CANCELLED_MESSAGE));
        assert_eq!(*completes.lock().unwrap(), 3);
        assert_eq!(queue.pending_job_count(), 0);
    }

    #[test]
    fn test_active_job_visible_while_running() {
        let mut queue: JobQueue = JobQueue::with_runner(scripted_runner());
        queue.add_job(&builder_for("a.mkv"), None, Some("A"), ());
        let handle = queue.handle();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        queue.on_job_progress(move |_, _job: &Job, _| {
            *sink.lock().unwrap() = Some((handle.is_running(), handle.active_job()));
        });

        queue.run_queue(true);
        let (running, active) = seen.lock().unwrap().clone().unwrap();
        assert!(running);
        assert_eq!(active, Some(ActiveJob { seq: 0, id: Some("A".to_string()) }));
        assert!(!queue.is_running());
        assert_eq!(queue.active_job(), None);
        assert!(!queue.cancel_current_job());
    }

    #[test]
    fn test_clear_pending_jobs() {
        let mut queue = queue_abc();
        assert_eq!(queue.clear_pending_jobs(), 3);
        assert_eq!(queue.pending_job_count(), 0);
        assert!(queue.run_queue(false).is_empty());
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut job: Job = Job {
            seq: 7,
            id: None,
            builder: FfmpegCommandBuilder::new(),
            duration_secs: None,
            context: (),
            status: JobStatus::Pending,
            progress: None,
            error_message: None,
        };
        job.transition(JobStatus::Running);
        job.transition(JobStatus::Failed);
        job.transition(JobStatus::Completed);
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert_eq!(JobStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_context_payload() {
        let mut queue: JobQueue<std::path::PathBuf> = JobQueue::with_runner(scripted_runner());
        queue.add_job(&builder_for("a.mkv"), None, None, "/out/a.mkv".into());
        let processed = queue.run_queue(false);
        assert_eq!(processed[0].context().to_str(), Some("/out/a.mkv"));
    }
}
