//! Configuration for locating and invoking the external tools.
//!
//! [`ToolConfig`] holds the executable paths and command defaults shared by
//! the command builder, the probe runner and the executor. The `Default`
//! implementation reads overrides from the environment:
//!
//! | Variable                 | Field                  |
//! |--------------------------|------------------------|
//! | `FFWRAP_FFMPEG_PATH`     | `ffmpeg_path`          |
//! | `FFWRAP_FFPROBE_PATH`    | `ffprobe_path`         |
//! | `FFWRAP_OVERWRITE`       | `overwrite`            |
//! | `FFWRAP_HIDE_BANNER`     | `hide_banner`          |
//! | `FFWRAP_COMMAND_TIMEOUT` | `command_timeout_secs` |

mod builder;
pub mod utils;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use builder::ToolConfigBuilder;
use utils::{get_env_bool, get_env_string, get_env_u64};

// Default constants

/// Default ffmpeg executable, resolved through PATH.
pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";

/// Default ffprobe executable, resolved through PATH.
pub const DEFAULT_FFPROBE_PATH: &str = "ffprobe";

/// Whether built commands pass `-y` by default.
pub const DEFAULT_OVERWRITE: bool = true;

pub const ENV_FFMPEG_PATH: &str = "FFWRAP_FFMPEG_PATH";
pub const ENV_FFPROBE_PATH: &str = "FFWRAP_FFPROBE_PATH";
pub const ENV_OVERWRITE: &str = "FFWRAP_OVERWRITE";
pub const ENV_HIDE_BANNER: &str = "FFWRAP_HIDE_BANNER";
pub const ENV_COMMAND_TIMEOUT: &str = "FFWRAP_COMMAND_TIMEOUT";

/// Tool locations and defaults used when building and running commands.
///
/// # Examples
///
/// ```rust
/// use ffwrap_core::config::ToolConfigBuilder;
///
/// let config = ToolConfigBuilder::new()
///     .ffmpeg_path("/opt/ffmpeg/bin/ffmpeg")
///     .overwrite(false)
///     .build();
/// assert_eq!(config.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
/// assert!(!config.overwrite);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Path or name of the ffmpeg executable
    pub ffmpeg_path: String,

    /// Path or name of the ffprobe executable
    pub ffprobe_path: String,

    /// Pass `-y` to ffmpeg so existing outputs are replaced
    pub overwrite: bool,

    /// Add `-hide_banner` as a global option on built commands
    pub hide_banner: bool,

    /// Optional timeout for buffered commands such as ffprobe queries
    pub command_timeout_secs: Option<u64>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: get_env_string(ENV_FFMPEG_PATH, DEFAULT_FFMPEG_PATH.to_string()),
            ffprobe_path: get_env_string(ENV_FFPROBE_PATH, DEFAULT_FFPROBE_PATH.to_string()),
            overwrite: get_env_bool(ENV_OVERWRITE, DEFAULT_OVERWRITE),
            hide_banner: get_env_bool(ENV_HIDE_BANNER, false),
            command_timeout_secs: get_env_u64(ENV_COMMAND_TIMEOUT, None),
        }
    }
}

impl ToolConfig {
    /// Configuration read from the environment, same as `Default`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
