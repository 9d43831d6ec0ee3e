//! ffmpeg command builder
//!
//! [`FfmpegCommandBuilder`] accumulates global options, inputs, outputs,
//! stream mappings, filter graphs and per-stream options, then emits them in
//! the positional order ffmpeg requires:
//!
//! ```text
//! ffmpeg [-y] [global options] {[input options] -i input}... [filter complex]
//!        {[-map ...] [stream options] [output options] output}...
//! ```
//!
//! Input and output indices are handed out in insertion order and never
//! change. Invalid calls fail immediately with `CoreError::CommandBuilder`
//! and leave the builder untouched.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::{DEFAULT_FFMPEG_PATH, DEFAULT_OVERWRITE, ToolConfig};
use crate::error::{CoreError, CoreResult};
use crate::external::executor::{ProcessHandle, run_ffmpeg_with_progress};

#[derive(Debug, Clone, PartialEq, Eq)]
struct InputSpec {
    path: String,
    options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OutputSpec {
    path: String,
    options: Vec<String>,
    /// Option tokens grouped by stream specifier, in first-use order
    stream_options: Vec<(String, Vec<String>)>,
    /// `(output stream specifier, source)` pairs
    maps: Vec<(String, String)>,
}

impl OutputSpec {
    fn stream_tokens(&mut self, spec: &str) -> &mut Vec<String> {
        let pos = match self.stream_options.iter().position(|(s, _)| s == spec) {
            Some(pos) => pos,
            None => {
                self.stream_options.push((spec.to_string(), Vec::new()));
                self.stream_options.len() - 1
            }
        };
        &mut self.stream_options[pos].1
    }
}

/// Builder for ffmpeg argument lists.
///
/// # Examples
///
/// ```rust
/// use ffwrap_core::FfmpegCommandBuilder;
///
/// let mut builder = FfmpegCommandBuilder::new();
/// let input = builder.add_input("in.mkv").unwrap();
/// let output = builder.add_output("out.mp4").unwrap();
/// builder
///     .map_stream(&format!("{input}:v:0"), "v:0", output).unwrap()
///     .set_codec("v:0", "libx264", output).unwrap();
///
/// assert_eq!(
///     builder.build_list().unwrap(),
///     ["ffmpeg", "-y", "-i", "in.mkv", "-map", "0:v:0", "-c:v:0", "libx264", "out.mp4"]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegCommandBuilder {
    executable: String,
    overwrite: bool,
    hide_banner: bool,
    global_options: Vec<(String, Option<String>)>,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
    filter_graphs: Vec<String>,
    filter_script: Option<PathBuf>,
}

impl Default for FfmpegCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCommandBuilder {
    /// Builder for `ffmpeg` on PATH with overwrite (`-y`) enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::with_executable(DEFAULT_FFMPEG_PATH, DEFAULT_OVERWRITE)
    }

    #[must_use]
    pub fn with_executable(executable: impl Into<String>, overwrite: bool) -> Self {
        Self {
            executable: executable.into(),
            overwrite,
            hide_banner: false,
            global_options: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            filter_graphs: Vec::new(),
            filter_script: None,
        }
    }

    /// Builder using the configured executable, overwrite and banner settings.
    #[must_use]
    pub fn from_config(config: &ToolConfig) -> Self {
        let mut builder = Self::with_executable(config.ffmpeg_path.clone(), config.overwrite);
        builder.hide_banner = config.hide_banner;
        builder
    }

    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    #[must_use]
    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Discards all accumulated state. Executable, overwrite and banner
    /// settings are kept.
    pub fn reset(&mut self) -> &mut Self {
        self.global_options.clear();
        self.inputs.clear();
        self.outputs.clear();
        self.filter_graphs.clear();
        self.filter_script = None;
        self
    }

    /// Adds a global option such as `-loglevel error` or `-nostdin`.
    ///
    /// A value-less flag that is already present is ignored.
    pub fn add_global_option(&mut self, option: &str, value: Option<&str>) -> CoreResult<&mut Self> {
        validate_option(option)?;
        if value.is_none()
            && self
                .global_options
                .iter()
                .any(|(existing, v)| existing == option && v.is_none())
        {
            debug!("Global flag {} already set", option);
            return Ok(self);
        }
        self.global_options
            .push((option.to_string(), value.map(str::to_string)));
        Ok(self)
    }

    /// Adds an input and returns its index.
    pub fn add_input(&mut self, path: impl AsRef<Path>) -> CoreResult<usize> {
        self.add_input_with_options(path, Vec::<String>::new())
    }

    /// Adds an input whose options are placed before its `-i`.
    pub fn add_input_with_options<I, S>(&mut self, path: impl AsRef<Path>, options: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = non_empty_path(path.as_ref(), "input")?;
        self.inputs.push(InputSpec {
            path,
            options: options.into_iter().map(Into::into).collect(),
        });
        Ok(self.inputs.len() - 1)
    }

    /// Adds an output and returns its index.
    pub fn add_output(&mut self, path: impl AsRef<Path>) -> CoreResult<usize> {
        self.add_output_with_options(path, Vec::<String>::new())
    }

    /// Adds an output with output-level options placed before its path.
    pub fn add_output_with_options<I, S>(&mut self, path: impl AsRef<Path>, options: I) -> CoreResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = non_empty_path(path.as_ref(), "output")?;
        self.outputs.push(OutputSpec {
            path,
            options: options.into_iter().map(Into::into).collect(),
            stream_options: Vec::new(),
            maps: Vec::new(),
        });
        Ok(self.outputs.len() - 1)
    }

    /// Maps `source` (`0:a:1`, `1:v`, `[outv]`) into the output stream
    /// `output_stream_spec` (`v:0`, `a:1`) of output `output_index`.
    ///
    /// Mapping the same output stream twice replaces the earlier source.
    pub fn map_stream(
        &mut self,
        source: &str,
        output_stream_spec: &str,
        output_index: usize,
    ) -> CoreResult<&mut Self> {
        self.check_output_index(output_index)?;
        validate_map_source(source)?;
        validate_output_stream_spec(output_stream_spec)?;

        let output = &mut self.outputs[output_index];
        match output.maps.iter_mut().find(|(spec, _)| spec == output_stream_spec) {
            Some(entry) => {
                warn!(
                    "Output {} stream {} was mapped from {}, replacing with {}",
                    output_index, output_stream_spec, entry.1, source
                );
                entry.1 = source.to_string();
            }
            None => output
                .maps
                .push((output_stream_spec.to_string(), source.to_string())),
        }
        Ok(self)
    }

    /// Sets `-c:<stream_spec> <codec>` on an output.
    pub fn set_codec(&mut self, stream_spec: &str, codec: &str, output_index: usize) -> CoreResult<&mut Self> {
        self.add_output_option("-c", Some(codec), Some(stream_spec), output_index)
    }

    /// Sets `-b:<stream_spec> <bitrate>` on an output. Values without a
    /// `k`/`M`/`G` unit that are not plain numbers are logged as suspicious.
    pub fn set_bitrate(&mut self, stream_spec: &str, bitrate: &str, output_index: usize) -> CoreResult<&mut Self> {
        if !looks_like_bitrate(bitrate) {
            warn!("Bitrate '{}' has no k/M/G unit and is not a number", bitrate);
        }
        self.add_output_option("-b", Some(bitrate), Some(stream_spec), output_index)
    }

    /// Sets `-metadata[:<stream_spec>] key=value` on an output.
    pub fn set_metadata(
        &mut self,
        key: &str,
        value: &str,
        stream_spec: Option<&str>,
        output_index: usize,
    ) -> CoreResult<&mut Self> {
        if key.is_empty() {
            return Err(CoreError::CommandBuilder("metadata key must not be empty".to_string()));
        }
        let pair = format!("{key}={value}");
        self.add_output_option("-metadata", Some(&pair), stream_spec, output_index)
    }

    /// Adds an option to an output, scoped to `stream_spec` when given
    /// (`-crf` with `v:0` becomes `-crf:v:0`, and so does `-crf:`).
    pub fn add_output_option(
        &mut self,
        option: &str,
        value: Option<&str>,
        stream_spec: Option<&str>,
        output_index: usize,
    ) -> CoreResult<&mut Self> {
        self.check_output_index(output_index)?;
        validate_option(option)?;
        if let Some(spec) = stream_spec {
            validate_stream_spec(spec)?;
        }

        let output = &mut self.outputs[output_index];
        let tokens = match stream_spec {
            Some(spec) => {
                let scoped = format!("{}:{spec}", option.trim_end_matches(':'));
                let tokens = output.stream_tokens(spec);
                tokens.push(scoped);
                tokens
            }
            None => {
                output.options.push(option.to_string());
                &mut output.options
            }
        };
        if let Some(value) = value {
            tokens.push(value.to_string());
        }
        Ok(self)
    }

    /// Parses a shell-style option string (`-preset slow -crf 23`) and adds
    /// each `-flag [value]` pair to an output.
    pub fn add_parsed_options(
        &mut self,
        options: &str,
        output_index: usize,
        stream_spec: Option<&str>,
    ) -> CoreResult<&mut Self> {
        self.check_output_index(output_index)?;
        if let Some(spec) = stream_spec {
            validate_stream_spec(spec)?;
        }
        let pairs = parse_option_pairs(options)?;
        for (flag, value) in pairs {
            self.add_output_option(&flag, value.as_deref(), stream_spec, output_index)?;
        }
        Ok(self)
    }

    /// Appends a graph to the inline filter complex. Multiple graphs are
    /// joined with `;`.
    pub fn add_filter_complex(&mut self, graph: &str) -> CoreResult<&mut Self> {
        let graph = graph.trim().trim_end_matches(';').trim();
        if graph.is_empty() {
            return Err(CoreError::CommandBuilder("filter graph must not be empty".to_string()));
        }
        self.filter_graphs.push(graph.to_string());
        Ok(self)
    }

    /// Reads the filter complex from a script file instead. Takes precedence
    /// over inline graphs when both are set.
    pub fn add_filter_complex_script(&mut self, path: impl AsRef<Path>) -> &mut Self {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Filter complex script {} does not exist (yet)", path.display());
        }
        self.filter_script = Some(path.to_path_buf());
        self
    }

    /// Full argument list, executable first.
    ///
    /// # Errors
    ///
    /// `CommandBuilder` when no output has been added.
    pub fn build_list(&self) -> CoreResult<Vec<String>> {
        if self.outputs.is_empty() {
            return Err(CoreError::CommandBuilder("no outputs defined".to_string()));
        }

        let mut args = vec![self.executable.clone()];
        if self.overwrite {
            args.push("-y".to_string());
        }
        if self.hide_banner && !self.global_options.iter().any(|(o, _)| o == "-hide_banner") {
            args.push("-hide_banner".to_string());
        }
        for (option, value) in &self.global_options {
            args.push(option.clone());
            args.extend(value.iter().cloned());
        }

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.clone());
        }

        if let Some(script) = &self.filter_script {
            if !self.filter_graphs.is_empty() {
                warn!(
                    "Both an inline filter complex and a script are set, using script {}",
                    script.display()
                );
            }
            args.push("-filter_complex_script".to_string());
            args.push(script.to_string_lossy().into_owned());
        } else if !self.filter_graphs.is_empty() {
            args.push("-filter_complex".to_string());
            args.push(self.filter_graphs.join(";"));
        }

        for output in &self.outputs {
            let mut maps: Vec<&(String, String)> = output.maps.iter().collect();
            maps.sort_by_key(|(spec, _)| stream_sort_key(spec));
            for (_, source) in maps {
                args.push("-map".to_string());
                args.push(source.clone());
            }

            let mut groups: Vec<&(String, Vec<String>)> = output.stream_options.iter().collect();
            groups.sort_by_key(|(spec, _)| stream_sort_key(spec));
            for (_, tokens) in groups {
                args.extend(tokens.iter().cloned());
            }

            args.extend(output.options.iter().cloned());
            args.push(output.path.clone());
        }

        Ok(args)
    }

    /// Shell-quoted command line for display and logging.
    pub fn build(&self) -> CoreResult<String> {
        let args = self.build_list()?;
        shlex::try_join(args.iter().map(String::as_str))
            .map_err(|e| CoreError::CommandBuilder(format!("cannot quote command: {e}")))
    }

    /// Runs the built command with progress reporting.
    ///
    /// See [`run_ffmpeg_with_progress`] for callback and return semantics.
    pub fn run(
        &self,
        duration_secs: Option<f64>,
        progress: Option<&mut dyn FnMut(f64)>,
        on_process: Option<&mut dyn FnMut(&ProcessHandle)>,
        check: bool,
    ) -> CoreResult<bool> {
        let command = self.build_list()?;
        run_ffmpeg_with_progress(&command, duration_secs, progress, on_process, check)
    }

    fn check_output_index(&self, output_index: usize) -> CoreResult<()> {
        if output_index >= self.outputs.len() {
            return Err(CoreError::CommandBuilder(format!(
                "output index {} out of range ({} output(s) defined)",
                output_index,
                self.outputs.len()
            )));
        }
        Ok(())
    }
}

fn non_empty_path(path: &Path, kind: &str) -> CoreResult<String> {
    let path = path.to_string_lossy();
    if path.trim().is_empty() {
        return Err(CoreError::CommandBuilder(format!("{kind} path must not be empty")));
    }
    Ok(path.into_owned())
}

fn validate_option(option: &str) -> CoreResult<()> {
    if option.len() < 2 || !option.starts_with('-') {
        return Err(CoreError::CommandBuilder(format!(
            "option '{option}' must start with '-'"
        )));
    }
    Ok(())
}

/// Accepts `g`, a single stream type letter, or anything containing `:`.
fn validate_stream_spec(spec: &str) -> CoreResult<()> {
    let valid = spec == "g"
        || (spec.len() == 1 && spec.chars().all(|c| c.is_ascii_alphabetic()))
        || (spec.contains(':') && !spec.starts_with(':') && !spec.ends_with(':'));
    if !valid {
        return Err(CoreError::CommandBuilder(format!(
            "invalid stream specifier '{spec}'"
        )));
    }
    Ok(())
}

/// Output stream specifiers for `-map` must be `<type>:<index>`.
fn validate_output_stream_spec(spec: &str) -> CoreResult<()> {
    let valid = match spec.split_once(':') {
        Some((kind, index)) => {
            matches!(kind, "v" | "V" | "a" | "s" | "d" | "t")
                && !index.is_empty()
                && index.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    };
    if !valid {
        return Err(CoreError::CommandBuilder(format!(
            "output stream specifier '{spec}' must look like 'v:0' or 'a:1'"
        )));
    }
    Ok(())
}

/// Sources are `<input>[:<spec>...]` or a `[label]` from a filter graph.
fn validate_map_source(source: &str) -> CoreResult<()> {
    let valid = if let Some(label) = source.strip_prefix('[') {
        label.len() > 1 && label.ends_with(']')
    } else {
        let input = source.strip_prefix('-').unwrap_or(source);
        let input = input.split(':').next().unwrap_or("");
        !input.is_empty() && input.chars().all(|c| c.is_ascii_digit())
    };
    if !valid {
        return Err(CoreError::CommandBuilder(format!(
            "map source '{source}' must look like '0:v:0' or '[label]'"
        )));
    }
    Ok(())
}

fn looks_like_bitrate(value: &str) -> bool {
    let digits = value.strip_suffix(['k', 'K', 'M', 'G']).unwrap_or(value);
    !digits.is_empty() && digits.parse::<f64>().is_ok()
}

/// Ordering of stream-scoped entries: video, audio, subtitle, data,
/// attachment, then `g`, then anything else; by index within a type.
/// Stream metadata specifiers (`s:v:0`) sort by the stream they target.
fn stream_sort_key(spec: &str) -> (u8, u32) {
    fn rank(kind: &str) -> Option<u8> {
        match kind {
            "v" | "V" => Some(0),
            "a" => Some(1),
            "s" => Some(2),
            "d" => Some(3),
            "t" => Some(4),
            _ => None,
        }
    }

    if spec == "g" {
        return (5, 0);
    }
    let parts: Vec<&str> = spec.split(':').collect();
    let (kind, index) = match parts.as_slice() {
        ["s", sub, rest @ ..] if rank(sub).is_some() => (*sub, rest.first().copied()),
        [kind, rest @ ..] => (*kind, rest.first().copied()),
        [] => return (6, 0),
    };
    match rank(kind) {
        Some(r) => (r, index.and_then(|i| i.parse().ok()).unwrap_or(0)),
        None => (6, 0),
    }
}

/// Splits an option string into `(flag, value)` pairs. Values without a
/// preceding flag are skipped with a warning.
fn parse_option_pairs(options: &str) -> CoreResult<Vec<(String, Option<String>)>> {
    let tokens = shlex::split(options).ok_or_else(|| {
        CoreError::CommandBuilder(format!("unbalanced quotes in options '{options}'"))
    })?;

    let mut pairs = Vec::new();
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        if !is_flag(&token) {
            warn!("Ignoring value '{}' without a preceding option", token);
            continue;
        }
        let value = iter.next_if(|next| !is_flag(next));
        pairs.push((token, value));
    }
    Ok(pairs)
}

/// `-crf` is a flag, `-1` and `-` are values.
fn is_flag(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next() == Some('-') && chars.next().is_some_and(|c| !c.is_ascii_digit() && c != '.')
}
