// ============================================================================
// ffwrap-core/src/external/ffprobe.rs
// ============================================================================
//
// PROBE RUNNER: ffprobe invocation and JSON decoding
//
// Every query runs `ffprobe -v quiet -print_format json ...` with the input
// given last, captures stdout and decodes it with serde_json.
//
// KEY COMPONENTS:
// - FfprobeRunner: configurable ffprobe executable
// - probe: full format + streams description as MediaInfo
// - get_duration: container duration with a video stream fallback
// - run_ffprobe: raw JSON query for anything else

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{DEFAULT_FFPROBE_PATH, ToolConfig};
use crate::error::{CoreError, CoreResult, json_parse_error};
use crate::external::executor::{RunOptions, run_command};
use crate::media::MediaInfo;
use crate::utils::safe_float;

/// Arguments placed before every query.
const BASE_ARGS: [&str; 4] = ["-v", "quiet", "-print_format", "json"];

/// Runs ffprobe queries against media files.
#[derive(Debug, Clone)]
pub struct FfprobeRunner {
    ffprobe_path: String,
    timeout: Option<Duration>,
}

impl Default for FfprobeRunner {
    fn default() -> Self {
        Self::new(DEFAULT_FFPROBE_PATH)
    }
}

impl FfprobeRunner {
    #[must_use]
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout: None,
        }
    }

    /// Uses the configured ffprobe path and command timeout.
    #[must_use]
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            ffprobe_path: config.ffprobe_path.clone(),
            timeout: config.command_timeout(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn ffprobe_path(&self) -> &str {
        &self.ffprobe_path
    }

    /// Probes format and streams of `path`.
    ///
    /// # Errors
    ///
    /// `FileNotFound` before invoking ffprobe if `path` does not exist,
    /// `ExecutableNotFound`, `ProcessFailed`, or `JsonParse` when the output
    /// is empty or lacks `format`/`streams`.
    pub fn probe(&self, path: impl AsRef<Path>) -> CoreResult<MediaInfo> {
        let path = existing_file(path.as_ref())?;
        let info: MediaInfo = self.query(&[
            "-show_format".to_string(),
            "-show_streams".to_string(),
            "-i".to_string(),
            path_arg(&path),
        ])?;
        debug!(
            "Probed {}: {} stream(s), duration {:?}",
            path.display(),
            info.streams.len(),
            info.format.duration
        );
        Ok(info)
    }

    /// Duration of `path` in seconds.
    ///
    /// Uses the container duration and falls back to the first video
    /// stream. Process and parse failures of either query are logged and
    /// treated as "unknown"; a missing executable or file is still an error.
    /// Only positive durations are returned.
    pub fn get_duration(&self, path: impl AsRef<Path>) -> CoreResult<Option<f64>> {
        let path = existing_file(path.as_ref())?;
        let input = path_arg(&path);

        let format_args = [
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-i".to_string(),
            input.clone(),
        ];
        match self.run_ffprobe(&format_args) {
            Ok(value) => {
                if let Some(duration) = positive(value.pointer("/format/duration")) {
                    return Ok(Some(duration));
                }
                debug!("No container duration for {}, trying video stream", path.display());
            }
            Err(e) if is_recoverable(&e) => {
                warn!("Format duration query failed for {}: {}", path.display(), e);
            }
            Err(e) => return Err(e),
        }

        let stream_args = [
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=duration".to_string(),
            "-i".to_string(),
            input,
        ];
        match self.run_ffprobe(&stream_args) {
            Ok(value) => Ok(positive(value.pointer("/streams/0/duration"))),
            Err(e) if is_recoverable(&e) => {
                warn!("Stream duration query failed for {}: {}", path.display(), e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Runs an arbitrary query and returns the decoded JSON document.
    ///
    /// An `-i <path>` pair anywhere in `args` is moved to the end.
    pub fn run_ffprobe(&self, args: &[String]) -> CoreResult<Value> {
        self.query(args)
    }

    fn query<T: DeserializeOwned>(&self, args: &[String]) -> CoreResult<T> {
        let command = self.command(args);
        let mut options = RunOptions::default();
        options.timeout = self.timeout;
        let output = run_command(&command, &options)?;

        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            return Err(json_parse_error(&command, "ffprobe produced no output", ""));
        }
        serde_json::from_str(stdout).map_err(|e| json_parse_error(&command, e.to_string(), stdout))
    }

    fn command(&self, args: &[String]) -> Vec<String> {
        let mut command = Vec::with_capacity(args.len() + BASE_ARGS.len() + 1);
        command.push(self.ffprobe_path.clone());
        command.extend(BASE_ARGS.iter().map(|a| (*a).to_string()));

        let mut input = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "-i" && input.is_none() {
                if let Some(path) = iter.next() {
                    input = Some(path.clone());
                    continue;
                }
            }
            command.push(arg.clone());
        }
        if let Some(path) = input {
            command.push("-i".to_string());
            command.push(path);
        }
        command
    }
}

fn existing_file(path: &Path) -> CoreResult<PathBuf> {
    if !path.exists() {
        return Err(CoreError::FileNotFound(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn positive(value: Option<&Value>) -> Option<f64> {
    value.and_then(safe_float).filter(|d| *d > 0.0)
}

fn is_recoverable(err: &CoreError) -> bool {
    matches!(err, CoreError::ProcessFailed { .. } | CoreError::JsonParse { .. })
}
