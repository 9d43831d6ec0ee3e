// ============================================================================
// ffwrap-core/src/external/executor.rs
// ============================================================================
//
// PROCESS EXECUTOR: Running ffmpeg/ffprobe as child processes
//
// Buffered execution captures stdout and stderr in full. Progress-enabled
// execution streams stderr through a ProgressParser on the calling thread
// while stdout is drained on a worker thread, so neither pipe can fill up
// and stall the child.
//
// KEY COMPONENTS:
// - RunOptions / CommandOutput: buffered execution input and result
// - ProcessHandle: cloneable pid + kill handle on a running child
// - run_command / run_command_with_callback: buffered execution
// - run_ffmpeg_with_progress: streaming execution with percentage callbacks
// - CommandRunner / SystemRunner: seam used by the job queue

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::error::{CoreError, CoreResult, command_start_error, process_failed_error};
use crate::logging::log_command;
use crate::progress::ProgressParser;

/// Interval between exit-status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const STDERR_CHUNK_SIZE: usize = 4096;

/// How long a timed-out command's output pipes may take to close after the
/// kill. Descendants that inherited the pipes can keep them open.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Options for buffered command execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Working directory for the child
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Kill the child and fail with `Timeout` after this long
    pub timeout: Option<Duration>,
    /// Fail with `ProcessFailed` on a nonzero exit code
    pub check: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: Vec::new(),
            timeout: None,
            check: true,
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }
}

/// Captured result of a buffered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Handle on a running child process.
///
/// Clones share the same child. The handle stays valid after the process
/// exits; killing an exited process is a no-op.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    child: Arc<Mutex<Child>>,
}

impl ProcessHandle {
    fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Arc::new(Mutex::new(child)),
        }
    }

    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Terminates the process if it is still running.
    pub fn kill(&self) -> CoreResult<()> {
        let mut child = self.lock();
        if let Ok(Some(_)) = child.try_wait() {
            debug!("Process {} already exited, nothing to kill", self.pid);
            return Ok(());
        }
        debug!("Killing process {}", self.pid);
        match child.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    /// Whether the process has exited.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        matches!(self.lock().try_wait(), Ok(Some(_)))
    }

    fn try_wait(&self) -> CoreResult<Option<ExitStatus>> {
        Ok(self.lock().try_wait()?)
    }

    fn wait(&self) -> CoreResult<ExitStatus> {
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(status);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Polls until the process exits or `timeout` elapses. The lock is
    /// released between polls so other handles can still kill the child.
    fn wait_timeout(&self, timeout: Option<Duration>) -> CoreResult<Option<ExitStatus>> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    return Ok(None);
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Child> {
        // A poisoned lock still guards a usable Child.
        self.child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs a command and captures its output.
///
/// # Errors
///
/// - `ExecutableNotFound` if the program cannot be resolved
/// - `ProcessFailed` if `options.check` is set and the exit code is nonzero
/// - `Timeout` if `options.timeout` elapses first
pub fn run_command(command: &[String], options: &RunOptions) -> CoreResult<CommandOutput> {
    run_command_with_callback(command, options, |_| {})
}

/// Like [`run_command`], but hands a [`ProcessHandle`] to `on_spawn` as soon
/// as the process exists and before its completion is awaited.
pub fn run_command_with_callback<F>(
    command: &[String],
    options: &RunOptions,
    on_spawn: F,
) -> CoreResult<CommandOutput>
where
    F: FnOnce(&ProcessHandle),
{
    let mut child = spawn(command, options)?;
    let stdout_reader = drain_pipe(child.stdout.take());
    let stderr_reader = drain_pipe(child.stderr.take());
    let handle = ProcessHandle::new(child);
    on_spawn(&handle);

    let started = Instant::now();
    let status = handle.wait_timeout(options.timeout)?;

    let Some(status) = status else {
        handle.kill()?;
        let _ = handle.wait();
        let deadline = Instant::now() + DRAIN_GRACE;
        for reader in [&stdout_reader, &stderr_reader] {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if reader.recv_timeout(remaining).is_err() {
                debug!("Output pipe of {} still open after kill, not waiting", command[0]);
            }
        }
        let timeout = options.timeout.unwrap_or_default();
        error!("Command timed out after {:?}: {}", timeout, command[0]);
        return Err(CoreError::Timeout {
            command: command.to_vec(),
            timeout,
        });
    };

    let stdout = String::from_utf8_lossy(&stdout_reader.recv().unwrap_or_default()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_reader.recv().unwrap_or_default()).into_owned();
    let exit_code = status.code().unwrap_or(-1);
    debug!(
        "Command finished with exit code {} in {:.2}s",
        exit_code,
        started.elapsed().as_secs_f64()
    );

    if options.check && !status.success() {
        error!("Command failed with exit code {}: {}", exit_code, stderr.trim());
        return Err(process_failed_error(command, exit_code, stdout, stderr));
    }

    Ok(CommandOutput {
        exit_code,
        stdout,
        stderr,
    })
}

/// Runs ffmpeg while feeding its stderr to a [`ProgressParser`].
///
/// `progress` receives percentages when `duration_secs` is known and
/// positive. `on_process` receives the process handle right after spawn.
/// Returns `Ok(true)` on success and `Ok(false)` on a nonzero exit when
/// `check` is false.
pub fn run_ffmpeg_with_progress(
    command: &[String],
    duration_secs: Option<f64>,
    mut progress: Option<&mut dyn FnMut(f64)>,
    on_process: Option<&mut dyn FnMut(&ProcessHandle)>,
    check: bool,
) -> CoreResult<bool> {
    let options = RunOptions::default();
    let mut child = spawn(command, &options)?;
    let stdout_reader = drain_pipe(child.stdout.take());
    let stderr = child.stderr.take();
    let handle = ProcessHandle::new(child);

    if let Some(callback) = on_process {
        callback(&handle);
    }

    let started = Instant::now();
    let mut parser = ProgressParser::new(duration_secs);
    let mut report = |percent: f64| {
        if let Some(callback) = progress.as_deref_mut() {
            callback(percent);
        }
    };

    if let Some(stderr) = stderr {
        stream_stderr(stderr, &mut parser, &mut report)?;
    }

    let status = handle.wait()?;
    let stdout = String::from_utf8_lossy(&stdout_reader.recv().unwrap_or_default()).into_owned();
    let success = status.success();
    parser.finish(success, &mut report);

    let exit_code = status.code().unwrap_or(-1);
    debug!(
        "ffmpeg finished with exit code {} in {:.2}s",
        exit_code,
        started.elapsed().as_secs_f64()
    );

    if success {
        return Ok(true);
    }
    if check {
        error!("ffmpeg failed with exit code {}", exit_code);
        return Err(process_failed_error(
            command,
            exit_code,
            stdout,
            parser.stderr_buffer(),
        ));
    }
    warn!("ffmpeg exited with code {} (not checked)", exit_code);
    Ok(false)
}

/// Verifies that `program` can be launched by running `<program> -version`.
pub fn check_dependency(program: &str) -> CoreResult<()> {
    let command = vec![program.to_string(), "-version".to_string()];
    match run_command(&command, &RunOptions::default()) {
        Ok(_) => {
            debug!("Found dependency: {}", program);
            Ok(())
        }
        Err(e) => {
            warn!("Dependency check for '{}' failed: {}", program, e);
            Err(e)
        }
    }
}

/// Seam for executing ffmpeg with progress reporting.
///
/// The job queue runs every job through a `CommandRunner`; tests substitute
/// their own implementation.
pub trait CommandRunner: Send {
    fn run_with_progress(
        &self,
        command: &[String],
        duration_secs: Option<f64>,
        progress: &mut dyn FnMut(f64),
        on_process: &mut dyn FnMut(&ProcessHandle),
        check: bool,
    ) -> CoreResult<bool>;
}

/// `CommandRunner` that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run_with_progress(
        &self,
        command: &[String],
        duration_secs: Option<f64>,
        progress: &mut dyn FnMut(f64),
        on_process: &mut dyn FnMut(&ProcessHandle),
        check: bool,
    ) -> CoreResult<bool> {
        run_ffmpeg_with_progress(command, duration_secs, Some(progress), Some(on_process), check)
    }
}

fn spawn(command: &[String], options: &RunOptions) -> CoreResult<Child> {
    let Some((program, args)) = command.split_first() else {
        return Err(CoreError::CommandBuilder("cannot run an empty command".to_string()));
    };
    log_command(command);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &options.cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    cmd.spawn().map_err(|e| {
        error!("Failed to start '{}': {}", program, e);
        command_start_error(program, e)
    })
}

/// Reads `pipe` to EOF on a worker thread and sends the bytes back once done.
fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                warn!("Failed to read child output: {}", e);
            }
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Reads stderr until EOF, decoding UTF-8 across chunk boundaries.
fn stream_stderr(
    mut stderr: ChildStderr,
    parser: &mut ProgressParser,
    report: &mut dyn FnMut(f64),
) -> CoreResult<()> {
    let mut chunk = [0u8; STDERR_CHUNK_SIZE];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let read = match stderr.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CoreError::Io(e)),
        };
        pending.extend_from_slice(&chunk[..read]);
        let text = take_valid_utf8(&mut pending);
        if !text.is_empty() {
            parser.feed(&text, report);
        }
    }

    if !pending.is_empty() {
        parser.feed(&String::from_utf8_lossy(&pending), report);
    }
    Ok(())
}

/// Removes and returns the decodable prefix of `bytes`. An incomplete
/// multi-byte sequence at the end stays in `bytes`; invalid bytes are
/// replaced.
fn take_valid_utf8(bytes: &mut Vec<u8>) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let text = text.to_string();
            bytes.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let rest = bytes.split_off(valid);
            let text = String::from_utf8_lossy(bytes).into_owned();
            *bytes = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            bytes.clear();
            text
        }
    }
}
