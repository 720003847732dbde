//! Colour values accepted by the background removal options.
//!
//! Colours end up inside ffmpeg filter graphs, so only a narrow grammar is
//! accepted: `#rgb`, `#rrggbb`, `0xrrggbb` or a plain alphabetic colour name.
//! Anything else could smuggle filter separators (`;`, `:`, `[`) into the graph.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ValidationError, ValidationResult};

/// Longest colour name accepted (ffmpeg's longest named colour is well below this).
const MAX_COLOR_NAME_LEN: usize = 32;

/// A validated colour in ffmpeg syntax (`0xRRGGBB` or a lowercase name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Color(String);

impl Color {
    /// Parse a user supplied colour, normalising hex forms to `0xRRGGBB`.
    pub fn parse(raw: &str, field: &'static str) -> ValidationResult<Self> {
        let raw = raw.trim();

        let hex = raw
            .strip_prefix('#')
            .or_else(|| raw.strip_prefix("0x"))
            .or_else(|| raw.strip_prefix("0X"));

        if let Some(hex) = hex {
            if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ValidationError::invalid_option(
                    field,
                    format!("`{raw}` is not a hex colour"),
                ));
            }
            let expanded = match hex.len() {
                3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
                6 => hex.to_string(),
                _ => {
                    return Err(ValidationError::invalid_option(
                        field,
                        format!("`{raw}` must have 3 or 6 hex digits"),
                    ))
                }
            };
            return Ok(Self(format!("0x{}", expanded.to_ascii_uppercase())));
        }

        if raw.is_empty()
            || raw.len() > MAX_COLOR_NAME_LEN
            || !raw.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(ValidationError::invalid_option(
                field,
                format!("`{raw}` is not a colour name or hex value"),
            ));
        }

        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// The colour as ffmpeg expects it inside a filter argument.
    pub fn as_ffmpeg(&self) -> &str {
        &self.0
    }

    /// RGB components for hex colours; `None` for named colours.
    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        let hex = self.0.strip_prefix("0x")?;
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some((channel(0)?, channel(2)?, channel(4)?))
    }
}

impl Default for Color {
    /// White, the default replacement background.
    fn default() -> Self {
        Self("0xFFFFFF".to_string())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Colour removed by the chroma key stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyColor {
    #[default]
    Green,
    Blue,
    White,
    Custom(Color),
}

impl KeyColor {
    /// Parse `green | blue | white | <hex>`.
    pub fn parse(raw: &str) -> ValidationResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "green" => Ok(Self::Green),
            "blue" => Ok(Self::Blue),
            "white" => Ok(Self::White),
            _ => {
                let color = Color::parse(raw, "chromaKeyColor")?;
                if color.rgb().is_none() {
                    return Err(ValidationError::invalid_option(
                        "chromaKeyColor",
                        "custom key colours must be hex values",
                    ));
                }
                Ok(Self::Custom(color))
            }
        }
    }

    /// Colour argument for the `chromakey` filter.
    pub fn as_ffmpeg(&self) -> &str {
        match self {
            KeyColor::Green => "green",
            KeyColor::Blue => "blue",
            KeyColor::White => "white",
            KeyColor::Custom(color) => color.as_ffmpeg(),
        }
    }

    /// Spill type for the `despill` filter, which only knows green and blue screens.
    ///
    /// Custom colours despill towards whichever of the two channels dominates;
    /// white (and grey-ish customs) fall back to green.
    pub fn despill_type(&self) -> &'static str {
        match self {
            KeyColor::Green | KeyColor::White => "green",
            KeyColor::Blue => "blue",
            KeyColor::Custom(color) => match color.rgb() {
                Some((_, g, b)) if b > g => "blue",
                _ => "green",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_colours_are_normalised() {
        assert_eq!(Color::parse("#ffffff", "c").unwrap().as_ffmpeg(), "0xFFFFFF");
        assert_eq!(Color::parse("#0f0", "c").unwrap().as_ffmpeg(), "0x00FF00");
        assert_eq!(Color::parse("0x1a2b3c", "c").unwrap().as_ffmpeg(), "0x1A2B3C");
    }

    #[test]
    fn test_named_colours_are_lowercased() {
        assert_eq!(Color::parse("Black", "c").unwrap().as_ffmpeg(), "black");
    }

    #[test]
    fn test_filter_syntax_is_rejected() {
        assert!(Color::parse("red;[0:v]null", "c").is_err());
        assert!(Color::parse("white:t=fill", "c").is_err());
        assert!(Color::parse("#12345", "c").is_err());
        assert!(Color::parse("", "c").is_err());
    }

    #[test]
    fn test_rgb_components() {
        let color = Color::parse("#102030", "c").unwrap();
        assert_eq!(color.rgb(), Some((0x10, 0x20, 0x30)));
        assert_eq!(Color::parse("white", "c").unwrap().rgb(), None);
    }

    #[test]
    fn test_key_colour_parsing() {
        assert_eq!(KeyColor::parse("GREEN").unwrap(), KeyColor::Green);
        assert_eq!(KeyColor::parse("blue").unwrap(), KeyColor::Blue);
        assert!(matches!(KeyColor::parse("#00ff00").unwrap(), KeyColor::Custom(_)));
        assert!(KeyColor::parse("magenta").is_err());
    }

    #[test]
    fn test_despill_type_follows_dominant_channel() {
        assert_eq!(KeyColor::Green.despill_type(), "green");
        assert_eq!(KeyColor::Blue.despill_type(), "blue");
        assert_eq!(KeyColor::White.despill_type(), "green");
        assert_eq!(KeyColor::parse("#0010ff").unwrap().despill_type(), "blue");
        assert_eq!(KeyColor::parse("#20ff10").unwrap().despill_type(), "green");
    }
}
