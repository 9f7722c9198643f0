//! Caption styling configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::transcript::DEFAULT_WORDS_PER_CHUNK;

/// Default caption font size in pixels
pub const DEFAULT_FONT_SIZE: f32 = 70.0;
/// Default stroke radius in pixels
pub const DEFAULT_STROKE_WIDTH: u32 = 4;
/// Default characters per wrapped line
pub const DEFAULT_MAX_CHARS: usize = 30;
/// Horizontal safe margin, as a fraction of frame width on each side
pub const DEFAULT_SAFE_MARGIN: f64 = 0.08;

/// An opaque RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([255, 255, 255]);
    pub const BLACK: Rgb = Rgb([0, 0, 0]);
    pub const YELLOW: Rgb = Rgb([255, 255, 0]);
}

impl FromStr for Rgb {
    type Err = ColorParseError;

    /// Accepts a handful of names or `#rrggbb`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "white" => return Ok(Rgb::WHITE),
            "black" => return Ok(Rgb::BLACK),
            "yellow" => return Ok(Rgb::YELLOW),
            _ => {}
        }

        let hex = s
            .strip_prefix('#')
            .filter(|h| h.len() == 6 && h.is_ascii())
            .ok_or_else(|| ColorParseError(s.clone()))?;
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ColorParseError(s.clone()))
        };
        Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
    }
}

#[derive(Debug, Error)]
#[error("Invalid colour: {0}")]
pub struct ColorParseError(String);

/// How burned-in captions look and are laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionStyle {
    /// TrueType/OpenType font file; the built-in bitmap font is used if this fails to load
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_fill")]
    pub fill: Rgb,
    #[serde(default = "default_stroke")]
    pub stroke: Rgb,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
    /// Characters per line before wrapping
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_safe_margin")]
    pub safe_margin: f64,
    #[serde(default = "default_words_per_chunk")]
    pub words_per_chunk: usize,
}

fn default_font_size() -> f32 {
    DEFAULT_FONT_SIZE
}
fn default_fill() -> Rgb {
    Rgb::WHITE
}
fn default_stroke() -> Rgb {
    Rgb::BLACK
}
fn default_stroke_width() -> u32 {
    DEFAULT_STROKE_WIDTH
}
fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}
fn default_safe_margin() -> f64 {
    DEFAULT_SAFE_MARGIN
}
fn default_words_per_chunk() -> usize {
    DEFAULT_WORDS_PER_CHUNK
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: DEFAULT_FONT_SIZE,
            fill: Rgb::WHITE,
            stroke: Rgb::BLACK,
            stroke_width: DEFAULT_STROKE_WIDTH,
            max_chars: DEFAULT_MAX_CHARS,
            safe_margin: DEFAULT_SAFE_MARGIN,
            words_per_chunk: DEFAULT_WORDS_PER_CHUNK,
        }
    }
}

impl CaptionStyle {
    pub fn with_font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    pub fn with_font_size(mut self, size: f32) -> Self {
        self.font_size = size;
        self
    }

    pub fn with_colors(mut self, fill: Rgb, stroke: Rgb) -> Self {
        self.fill = fill;
        self.stroke = stroke;
        self
    }

    pub fn with_stroke_width(mut self, width: u32) -> Self {
        self.stroke_width = width;
        self
    }

    /// Horizontal padding on each side for a frame of `frame_width` pixels.
    pub fn padding(&self, frame_width: u32) -> u32 {
        (frame_width as f64 * self.safe_margin) as u32
    }

    /// Widest text block allowed for a frame of `frame_width` pixels.
    pub fn max_text_width(&self, frame_width: u32) -> u32 {
        frame_width.saturating_sub(self.padding(frame_width) * 2)
    }
}
