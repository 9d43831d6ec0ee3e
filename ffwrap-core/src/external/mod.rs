// ============================================================================
// ffwrap-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with the ffmpeg and ffprobe executables
//
// Everything that spawns a process lives here. Command lines are plain
// argument vectors, so they can be logged, compared in tests and handed to
// any CommandRunner implementation.
//
// KEY COMPONENTS:
// - executor: process spawning, output capture, progress streaming
// - ffmpeg_builder: ffmpeg argument list construction
// - ffprobe: media probing and duration lookup

pub mod executor;
pub mod ffmpeg_builder;
pub mod ffprobe;

pub use executor::{
    CommandOutput, CommandRunner, ProcessHandle, RunOptions, SystemRunner, check_dependency,
    run_command, run_command_with_callback, run_ffmpeg_with_progress,
};
pub use ffmpeg_builder::FfmpegCommandBuilder;
pub use ffprobe::FfprobeRunner;
