//! Transform operations and their option payloads.
//!
//! Each variant carries exactly the options its filter graph needs, so the
//! graph builder can match exhaustively.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::color::{Color, KeyColor};

/// Default chroma key similarity; conservative so dark hair survives keying.
pub const DEFAULT_SIMILARITY: f64 = 0.10;
/// Default chroma key edge blend.
pub const DEFAULT_BLEND: f64 = 0.05;

/// A transform together with its validated options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    /// Fixed fan/motor noise suppression chain.
    CleanAudio,
    /// Concatenate two or more clips on a canonical 1080p canvas.
    Merge(MergeOptions),
    /// Fixed 4K upscale, sharpen and denoise chain.
    Enhance,
    /// Replace the background of a single clip.
    RemoveBackground(RemoveBackgroundMode),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CleanAudio => OperationKind::CleanAudio,
            Operation::Merge(_) => OperationKind::Merge,
            Operation::Enhance => OperationKind::Enhance,
            Operation::RemoveBackground(_) => OperationKind::RemoveBackground,
        }
    }

    /// Convenience constructor for a merge with no synthesized audio.
    pub fn merge() -> Self {
        Operation::Merge(MergeOptions::default())
    }
}

/// Operation family without its options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CleanAudio,
    Merge,
    Enhance,
    RemoveBackground,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CleanAudio => "clean_audio",
            OperationKind::Merge => "merge",
            OperationKind::Enhance => "enhance",
            OperationKind::RemoveBackground => "remove_background",
        }
    }

    /// Prefix of generated job ids.
    pub fn job_prefix(&self) -> &'static str {
        match self {
            OperationKind::CleanAudio => "clean",
            OperationKind::Merge => "merge",
            OperationKind::Enhance => "enhance",
            OperationKind::RemoveBackground => "remove_bg",
        }
    }

    /// Prefix of the delivered file name.
    pub fn output_prefix(&self) -> &'static str {
        match self {
            OperationKind::CleanAudio => "cleaned",
            OperationKind::Merge => "merged",
            OperationKind::Enhance => "enhanced",
            OperationKind::RemoveBackground => "bg_removed",
        }
    }

    /// Inclusive bounds on the number of media inputs (`None` = unbounded).
    pub fn input_bounds(&self) -> (usize, Option<usize>) {
        match self {
            OperationKind::Merge => (2, None),
            _ => (1, Some(1)),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merge options. Callers normally pass the default; the executor fills in
/// `silent_inputs` after probing so the concat stage sees matching streams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MergeOptions {
    #[serde(default)]
    pub silent_inputs: Vec<SilentInput>,
}

impl MergeOptions {
    /// Synthesized track for input `index`, if it has no audio of its own.
    pub fn silent_input(&self, index: usize) -> Option<&SilentInput> {
        self.silent_inputs.iter().find(|s| s.index == index)
    }
}

/// An input without an audio stream and the length of silence to generate for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SilentInput {
    pub index: usize,
    pub duration_secs: f64,
}

/// Background removal sub-mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RemoveBackgroundMode {
    /// Key out a caller-chosen colour and composite onto a new background.
    #[serde(rename = "chromakey")]
    ChromaKey(ChromaKeyOptions),
    /// Fast fallback: key white at 720p onto a solid canvas.
    Auto { background_color: Color },
}

/// Options for chroma key background replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChromaKeyOptions {
    pub key_color: KeyColor,
    pub similarity: f64,
    pub blend: f64,
    pub background: Background,
}

impl Default for ChromaKeyOptions {
    fn default() -> Self {
        Self {
            key_color: KeyColor::Green,
            similarity: DEFAULT_SIMILARITY,
            blend: DEFAULT_BLEND,
            background: Background::Color(Color::default()),
        }
    }
}

/// Replacement background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Background {
    Color(Color),
    /// Static image, opened as a looped second input.
    Image(PathBuf),
}
