//! Library for driving the ffmpeg and ffprobe command-line tools.
//!
//! This crate builds ffmpeg argument lists, runs them as child processes with
//! progress reporting, probes media files through ffprobe's JSON output and
//! runs batches of encodes through a sequential job queue.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use ffwrap_core::{FfmpegCommandBuilder, FfprobeRunner, ToolConfig};
//!
//! let config = ToolConfig::default();
//! let duration = FfprobeRunner::from_config(&config).get_duration("in.mkv").unwrap();
//!
//! let mut builder = FfmpegCommandBuilder::from_config(&config);
//! let input = builder.add_input("in.mkv").unwrap();
//! let output = builder.add_output("out.mkv").unwrap();
//! builder
//!     .map_stream(&format!("{input}:v:0"), "v:0", output).unwrap()
//!     .set_codec("v:0", "libsvtav1", output).unwrap()
//!     .add_parsed_options("-preset 6 -crf 27", output, Some("v:0")).unwrap();
//!
//! let mut report = |pct: f64| println!("{pct:.1}%");
//! builder.run(duration, Some(&mut report), None, true).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod external;
pub mod logging;
pub mod media;
pub mod progress;
pub mod queue;
pub mod utils;

// Re-exports for public API
pub use config::{ToolConfig, ToolConfigBuilder};
pub use error::{CoreError, CoreResult};
pub use external::{
    CommandOutput, CommandRunner, FfmpegCommandBuilder, FfprobeRunner, ProcessHandle,
    RunOptions, SystemRunner, check_dependency, run_command, run_command_with_callback,
    run_ffmpeg_with_progress,
};
pub use media::{CodecType, FormatInfo, MediaInfo, StreamInfo};
pub use progress::ProgressParser;
pub use queue::{ActiveJob, Job, JobQueue, JobStatus, QueueHandle};
pub use utils::{format_duration, parse_ffmpeg_time};
