// ============================================================================
// ffwrap-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for ToolConfig
//
// Fluent construction of ToolConfig instances. Unset fields keep the
// compiled-in defaults; the environment is not consulted, so a built config
// is reproducible.
//
// KEY COMPONENTS:
// - ToolConfigBuilder: Builder struct for creating ToolConfig instances

use super::{DEFAULT_FFMPEG_PATH, DEFAULT_FFPROBE_PATH, DEFAULT_OVERWRITE, ToolConfig};

/// Builder for creating ToolConfig instances.
#[derive(Debug, Clone)]
pub struct ToolConfigBuilder {
    config: ToolConfig,
}

impl Default for ToolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolConfigBuilder {
    /// Creates a builder with compiled-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ToolConfig {
                ffmpeg_path: DEFAULT_FFMPEG_PATH.to_string(),
                ffprobe_path: DEFAULT_FFPROBE_PATH.to_string(),
                overwrite: DEFAULT_OVERWRITE,
                hide_banner: false,
                command_timeout_secs: None,
            },
        }
    }

    /// Starts from an existing configuration.
    #[must_use]
    pub fn from_config(config: ToolConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    #[must_use]
    pub fn ffprobe_path(mut self, path: impl Into<String>) -> Self {
        self.config.ffprobe_path = path.into();
        self
    }

    /// Sets whether built commands overwrite existing outputs (`-y`).
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn hide_banner(mut self, hide: bool) -> Self {
        self.config.hide_banner = hide;
        self
    }

    /// Sets the timeout for buffered commands. Zero disables it.
    #[must_use]
    pub fn command_timeout_secs(mut self, secs: u64) -> Self {
        self.config.command_timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn build(self) -> ToolConfig {
        self.config
    }
}
