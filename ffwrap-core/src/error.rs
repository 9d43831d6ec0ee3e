//! Error types for ffwrap-core.
//!
//! Every fallible operation in the crate returns [`CoreResult`]. Process level
//! failures carry the full argument list so callers can log or display the
//! command that failed.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Number of trailing stderr characters included in a `ProcessFailed` message.
const STDERR_TAIL_CHARS: usize = 1000;

/// Number of leading stdout characters included in a `JsonParse` message.
const STDOUT_PREVIEW_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Executable not found: '{0}'. Make sure it is installed and on PATH")]
    ExecutableNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error(
        "Command failed with exit code {exit_code}: {}\nstderr: {}",
        display_command(command),
        tail(stderr, STDERR_TAIL_CHARS)
    )]
    ProcessFailed {
        command: Vec<String>,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error(
        "Failed to parse JSON output of {}: {message} (output starts with: {:?})",
        display_command(command),
        head(stdout, STDOUT_PREVIEW_CHARS)
    )]
    JsonParse {
        command: Vec<String>,
        message: String,
        stdout: String,
    },

    #[error("Invalid ffmpeg command: {0}")]
    CommandBuilder(String),

    #[error("Failed to start '{program}': {source}")]
    CommandStart {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Command timed out after {timeout:?}: {}", display_command(command))]
    Timeout {
        command: Vec<String>,
        timeout: Duration,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Exit code of the failed process, if this error came from one.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CoreError::ProcessFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Builds a `ProcessFailed` error from captured output.
pub fn process_failed_error(
    command: &[String],
    exit_code: i32,
    stdout: impl Into<String>,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::ProcessFailed {
        command: command.to_vec(),
        exit_code,
        stdout: stdout.into(),
        stderr: stderr.into(),
    }
}

/// Maps a spawn failure to `ExecutableNotFound` or `CommandStart`.
pub fn command_start_error(program: &str, err: io::Error) -> CoreError {
    if err.kind() == io::ErrorKind::NotFound {
        CoreError::ExecutableNotFound(program.to_string())
    } else {
        CoreError::CommandStart {
            program: program.to_string(),
            source: err,
        }
    }
}

pub fn json_parse_error(
    command: &[String],
    message: impl Into<String>,
    stdout: impl Into<String>,
) -> CoreError {
    CoreError::JsonParse {
        command: command.to_vec(),
        message: message.into(),
        stdout: stdout.into(),
    }
}

fn display_command(command: &[String]) -> String {
    shlex::try_join(command.iter().map(String::as_str)).unwrap_or_else(|_| command.join(" "))
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
