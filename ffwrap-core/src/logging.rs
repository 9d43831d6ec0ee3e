//! Logging setup for applications embedding ffwrap-core.
//!
//! The library itself only talks to the `log` facade. Binaries and tests can
//! call [`init`] or [`init_with_level`] to install an `env_logger` backend with
//! a timestamped, level-aligned format. `RUST_LOG` still refines the filter.
//!
//! Log targets used by the crate:
//! - `ffmpeg`: stderr lines forwarded from a running ffmpeg process
//! - `ffwrap_core::*`: everything else (module paths)

use std::io::Write;

use log::{LevelFilter, debug};

/// Initialize the logger with debug output when `verbose` is set.
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    init_with_level(level);
}

/// Initialize the logger with a specific level.
///
/// Calling this more than once is harmless; later calls leave the first
/// logger in place.
pub fn init_with_level(level: LevelFilter) {
    let result = env_logger::Builder::new()
        .format(|buf, record| {
            let level_str = match record.level() {
                log::Level::Error => "ERROR",
                log::Level::Warn => "WARN ",
                log::Level::Info => "INFO ",
                log::Level::Debug => "DEBUG",
                log::Level::Trace => "TRACE",
            };

            writeln!(
                buf,
                "{} {} [{}] {}",
                buf.timestamp(),
                level_str,
                record.target(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .try_init();

    if result.is_ok() {
        debug!("Logger initialized with level: {}", level);
    }
}

/// Log a command line before it is executed.
pub fn log_command(command: &[String]) {
    let rendered = shlex::try_join(command.iter().map(String::as_str))
        .unwrap_or_else(|_| command.join(" "));
    debug!("Executing command: {}", rendered);
}
