//! FFmpeg command builder.

use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};
use crate::graph::FilterGraph;

/// `info` keeps the per-input `Duration:` header the progress parser needs;
/// `-nostats` drops the noisy status line.
const LOG_LEVEL: &str = "info";

/// One `-i` input together with the options that precede it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInput {
    /// Input options (before -i)
    pub args: Vec<String>,
    /// Input file path
    pub path: PathBuf,
}

impl EngineInput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            args: Vec::new(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Open a still image as an endless video source.
    pub fn looped(path: impl AsRef<Path>) -> Self {
        Self {
            args: vec!["-loop".to_string(), "1".to_string()],
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order
    inputs: Vec<EngineInput>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add an input.
    pub fn input(mut self, input: EngineInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add several inputs.
    pub fn inputs<I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = EngineInput>,
    {
        self.inputs.extend(inputs);
        self
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set filter complex.
    pub fn filter_complex(self, graph: &FilterGraph) -> Self {
        self.output_arg("-filter_complex").output_arg(graph.to_string())
    }

    /// Set simple video filter chain.
    pub fn video_filter(self, graph: &FilterGraph) -> Self {
        self.output_arg("-vf").output_arg(graph.to_string())
    }

    /// Set simple audio filter chain.
    pub fn audio_filter(self, graph: &FilterGraph) -> Self {
        self.output_arg("-af").output_arg(graph.to_string())
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-nostats".to_string());

        args.push("-v".to_string());
        args.push(LOG_LEVEL.to_string());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Resolve an engine binary (bare name or path) to an executable path.
pub fn resolve_binary(name: &str) -> MediaResult<PathBuf> {
    which::which(name).map_err(|_| MediaError::FfmpegNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FilterChain;

    #[test]
    fn test_command_builder() {
        let graph = FilterGraph::new().chain(FilterChain::new().filter("hflip"));
        let cmd = FfmpegCommand::new("out.mp4")
            .input(EngineInput::new("a.mp4"))
            .input(EngineInput::looped("bg.png"))
            .video_filter(&graph)
            .output_args(["-map", "0:a?"]);

        let args = cmd.build_args();
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));

        let joined = args.join(" ");
        assert!(joined.contains("-progress pipe:2"));
        assert!(joined.contains("-i a.mp4 -loop 1 -i bg.png"));
        assert!(joined.contains("-vf hflip -map 0:a?"));
    }

    #[test]
    fn test_log_level_keeps_duration_header() {
        let args = FfmpegCommand::new("o.mp4").build_args();
        let pos = args.iter().position(|a| a == "-v").unwrap();
        assert_eq!(args[pos + 1], "info");
    }
}
