//! Incremental ffmpeg progress parser.
//!
//! ffmpeg reports progress on stderr in one of two shapes:
//!
//! - the classic status line, rewritten in place with `\r`:
//!   `frame=  240 fps=48 q=28.0 size=    1024kB time=00:00:10.00 bitrate= 838.9kbits/s speed=2.0x`
//! - the machine readable block produced by `-progress pipe:2`, one
//!   `key=value` per line and closed by `progress=continue` or `progress=end`.
//!
//! [`ProgressParser`] accepts stderr text in arbitrary chunks, reassembles
//! lines and turns the processed time of each completed stanza into a
//! percentage of the expected duration. Lines that are not progress output are
//! forwarded to the `log` facade under the `ffmpeg` target and kept in a
//! buffer for error reporting.

use std::sync::LazyLock;

use log::{debug, trace};
use regex::Regex;

use crate::utils::parse_ffmpeg_time;

/// Minimum change in percent between two reported values.
const MIN_PERCENT_STEP: f64 = 0.1;

/// A partial line longer than this is processed without waiting for its end.
const MAX_PENDING_LINE: usize = 64 * 1024;

/// Bytes of diagnostic stderr kept for error reporting. The buffer is
/// trimmed back to this size once it grows past twice as much.
const MAX_STDERR_BUFFER: usize = 64 * 1024;

static STATUS_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)time=\s*(\S+)").expect("valid status time regex"));

static PROGRESS_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z0-9_]+)=\s*(\S*)$").expect("valid progress key regex"));

/// Turns ffmpeg stderr text into percentage callbacks.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    duration: Option<f64>,
    partial: String,
    pending_time: Option<f64>,
    last_percent: Option<f64>,
    stderr_buffer: String,
}

impl ProgressParser {
    /// Creates a parser for a run expected to process `duration` seconds.
    /// Without a positive duration no percentages are reported.
    #[must_use]
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration: duration.filter(|d| d.is_finite() && *d > 0.0),
            partial: String::new(),
            pending_time: None,
            last_percent: None,
            stderr_buffer: String::new(),
        }
    }

    /// Last percentage passed to a callback.
    #[must_use]
    pub fn last_percent(&self) -> Option<f64> {
        self.last_percent
    }

    /// Most recent non-progress stderr lines, newline separated. Older lines
    /// are dropped once the buffer grows past its cap.
    #[must_use]
    pub fn stderr_buffer(&self) -> &str {
        &self.stderr_buffer
    }

    /// Percentage for `processed` seconds, clamped to `0..=100`.
    #[must_use]
    pub fn percent_of(&self, processed: f64) -> Option<f64> {
        let duration = self.duration?;
        Some((processed * 100.0 / duration).clamp(0.0, 100.0))
    }

    /// Consumes a chunk of stderr text. Partial lines are kept until the next
    /// chunk completes them.
    pub fn feed(&mut self, chunk: &str, callback: &mut dyn FnMut(f64)) {
        self.partial.push_str(chunk);

        while let Some(pos) = self.partial.find(['\r', '\n']) {
            let line: String = self.partial.drain(..=pos).collect();
            self.handle_line(line.trim_end_matches(['\r', '\n']), callback);
        }

        if self.partial.len() > MAX_PENDING_LINE {
            let line = std::mem::take(&mut self.partial);
            self.handle_line(&line, callback);
        }
    }

    /// Flushes any buffered text. On a clean finish with a known duration a
    /// final 100.0 is reported unless it was already the last value.
    pub fn finish(&mut self, success: bool, callback: &mut dyn FnMut(f64)) {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.handle_line(&line, callback);
        }
        self.pending_time = None;

        if success && self.duration.is_some() && self.last_percent != Some(100.0) {
            self.last_percent = Some(100.0);
            callback(100.0);
        }
    }

    fn handle_line(&mut self, line: &str, callback: &mut dyn FnMut(f64)) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if let Some(caps) = STATUS_TIME_RE.captures_iter(line).last() {
            trace!(target: "ffmpeg", "{}", line);
            self.pending_time = parse_ffmpeg_time(&caps[1]);
            self.close_stanza(callback);
            return;
        }

        if let Some(caps) = PROGRESS_KEY_RE.captures(line) {
            let value = &caps[2];
            match &caps[1] {
                "out_time" => {
                    if let Some(secs) = parse_ffmpeg_time(value) {
                        self.pending_time = Some(secs);
                    }
                }
                "out_time_us" | "out_time_ms" => {
                    // Both keys are microseconds in ffmpeg's output.
                    if let Ok(micros) = value.parse::<i64>() {
                        self.pending_time = Some(micros as f64 / 1_000_000.0);
                    }
                }
                "progress" => self.close_stanza(callback),
                _ => {}
            }
            return;
        }

        debug!(target: "ffmpeg", "{}", line);
        if !self.stderr_buffer.is_empty() {
            self.stderr_buffer.push('\n');
        }
        self.stderr_buffer.push_str(line);
        self.trim_stderr_buffer();
    }

    /// Drops whole lines from the front so roughly the last
    /// `MAX_STDERR_BUFFER` bytes remain.
    fn trim_stderr_buffer(&mut self) {
        let len = self.stderr_buffer.len();
        if len <= 2 * MAX_STDERR_BUFFER {
            return;
        }
        let mut cut = len - MAX_STDERR_BUFFER;
        while !self.stderr_buffer.is_char_boundary(cut) {
            cut += 1;
        }
        if let Some(newline) = self.stderr_buffer[cut..].find('\n') {
            cut += newline + 1;
        }
        self.stderr_buffer.drain(..cut);
    }

    fn close_stanza(&mut self, callback: &mut dyn FnMut(f64)) {
        let Some(processed) = self.pending_time.take() else {
            return;
        };
        let Some(percent) = self.percent_of(processed) else {
            return;
        };

        let should_report = match self.last_percent {
            None => true,
            Some(last) => {
                (percent - last).abs() >= MIN_PERCENT_STEP || (percent == 100.0 && last != 100.0)
            }
        };
        if should_report {
            self.last_percent = Some(percent);
            callback(percent);
        }
    }
}
