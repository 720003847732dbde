//! Transform requests and the raw option form they are validated from.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::color::{Color, KeyColor};
use crate::error::{ValidationError, ValidationResult};
use crate::operation::{
    Background, ChromaKeyOptions, Operation, RemoveBackgroundMode, DEFAULT_BLEND,
    DEFAULT_SIMILARITY,
};

/// Input to the transform executor. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRequest {
    operation: Operation,
    inputs: Vec<PathBuf>,
}

impl TransformRequest {
    /// Build a request, checking the input count against the operation.
    pub fn new(operation: Operation, inputs: Vec<PathBuf>) -> ValidationResult<Self> {
        if inputs.is_empty() {
            return Err(ValidationError::NoInput);
        }

        let kind = operation.kind();
        let (min, max) = kind.input_bounds();
        let too_many = max.is_some_and(|max| inputs.len() > max);
        if inputs.len() < min || too_many {
            return Err(ValidationError::InputCount {
                operation: kind.as_str(),
                expected: match max {
                    Some(1) => "exactly 1",
                    _ => "at least 2",
                },
                actual: inputs.len(),
            });
        }

        if let Operation::Merge(options) = &operation {
            if let Some(silent) = options.silent_inputs.iter().find(|s| s.index >= inputs.len()) {
                return Err(ValidationError::invalid_option(
                    "silent_inputs",
                    format!("index {} is out of range", silent.index),
                ));
            }
            // atrim treats a zero duration as unbounded
            if let Some(silent) = options
                .silent_inputs
                .iter()
                .find(|s| !(s.duration_secs.is_finite() && s.duration_secs > 0.0))
            {
                return Err(ValidationError::invalid_option(
                    "silent_inputs",
                    format!(
                        "input {} needs a positive duration, got {}",
                        silent.index, silent.duration_secs
                    ),
                ));
            }
        }

        Ok(Self { operation, inputs })
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Same inputs with a different operation payload (used to fold probe results in).
    pub fn with_operation(&self, operation: Operation) -> ValidationResult<Self> {
        Self::new(operation, self.inputs.clone())
    }
}

/// Raw remove-background options as submitted by a client form.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveBackgroundForm {
    pub background_type: String,
    pub background_color: String,
    pub chroma_key_color: String,
    #[validate(range(min = 0.05, max = 0.5))]
    pub similarity: f64,
    #[validate(range(min = 0.0, max = 0.3))]
    pub blend: f64,
    pub mode: String,
}

impl Default for RemoveBackgroundForm {
    fn default() -> Self {
        Self {
            background_type: "color".to_string(),
            background_color: "#ffffff".to_string(),
            chroma_key_color: "green".to_string(),
            similarity: DEFAULT_SIMILARITY,
            blend: DEFAULT_BLEND,
            mode: "chromakey".to_string(),
        }
    }
}

impl RemoveBackgroundForm {
    /// Validate the form into an operation.
    ///
    /// `background_image` is the stored upload, required when
    /// `backgroundType=image`. In `auto` mode similarity, blend, key colour
    /// and background type are ignored.
    pub fn into_operation(self, background_image: Option<PathBuf>) -> ValidationResult<Operation> {
        let background_color = Color::parse(&self.background_color, "backgroundColor")?;

        let mode = match self.mode.trim().to_ascii_lowercase().as_str() {
            "auto" => RemoveBackgroundMode::Auto { background_color },
            "chromakey" | "" => {
                self.validate().map_err(|e| {
                    let field = if e.field_errors().contains_key("similarity") {
                        "similarity"
                    } else {
                        "blend"
                    };
                    ValidationError::invalid_option(field, e.to_string())
                })?;

                let background = match self.background_type.trim().to_ascii_lowercase().as_str() {
                    "color" | "" => Background::Color(background_color),
                    "image" => Background::Image(background_image.ok_or_else(|| {
                        ValidationError::invalid_option(
                            "backgroundImage",
                            "an image upload is required when backgroundType=image",
                        )
                    })?),
                    other => {
                        return Err(ValidationError::invalid_option(
                            "backgroundType",
                            format!("unknown background type `{other}`"),
                        ))
                    }
                };

                RemoveBackgroundMode::ChromaKey(ChromaKeyOptions {
                    key_color: KeyColor::parse(&self.chroma_key_color)?,
                    similarity: self.similarity,
                    blend: self.blend,
                    background,
                })
            }
            other => {
                return Err(ValidationError::invalid_option(
                    "mode",
                    format!("unknown mode `{other}`"),
                ))
            }
        };

        Ok(Operation::RemoveBackground(mode))
    }
}
