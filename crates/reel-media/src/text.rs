//! Text measurement, wrapping and rasterisation for captions.
//!
//! Outline fonts are rasterised with `fontdue`. If no usable font file is
//! available the built-in 8x8 bitmap font is scaled up to roughly the
//! requested size instead, so captions always render.

use std::path::{Path, PathBuf};

use font8x8::UnicodeFonts;
use fontdue::{Font, FontSettings};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Fonts tried, in order, when no font path is configured.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Glyph cell of the bitmap font, in unscaled pixels.
const BITMAP_CELL: u32 = 8;

/// An 8-bit coverage mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Coverage at `(x, y)`; zero outside the mask.
    pub fn get(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    fn max_at(&mut self, x: i64, y: i64, value: u8) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = self.data[idx].max(value);
    }

    /// Merge `other` into this mask with its top-left corner at `(x, y)`.
    pub fn merge(&mut self, other: &Mask, x: i64, y: i64) {
        for row in 0..other.height as i64 {
            for col in 0..other.width as i64 {
                let value = other.get(col, row);
                if value > 0 {
                    self.max_at(x + col, y + row, value);
                }
            }
        }
    }

    /// Union of copies of this mask shifted by every offset within `radius`.
    ///
    /// The result is `2 * radius` larger in each dimension; the original
    /// mask sits at `(radius, radius)` inside it.
    pub fn dilate(&self, radius: u32) -> Mask {
        let r = radius as i64;
        let mut out = Mask::new(self.width + 2 * radius, self.height + 2 * radius);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    out.merge(self, r + dx, r + dy);
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|v| *v == 0)
    }
}

/// Font used to draw caption text.
#[derive(Clone)]
pub enum CaptionFont {
    Outline { font: Box<Font>, size: f32 },
    Bitmap { scale: u32 },
}

impl std::fmt::Debug for CaptionFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outline { size, .. } => f.debug_struct("Outline").field("size", size).finish(),
            Self::Bitmap { scale } => f.debug_struct("Bitmap").field("scale", scale).finish(),
        }
    }
}

impl CaptionFont {
    /// Load the caption font.
    ///
    /// A configured path that cannot be loaded falls back straight to the
    /// bitmap font. Without a configured path, common system fonts are tried
    /// first.
    pub fn load(path: Option<&Path>, size: f32) -> Self {
        match path {
            Some(path) => match Self::from_file(path, size) {
                Ok(font) => font,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Caption font failed to load, using built-in bitmap font"
                    );
                    Self::bitmap(size)
                }
            },
            None => SYSTEM_FONT_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .filter(|p| p.exists())
                .find_map(|p| Self::from_file(&p, size).ok())
                .unwrap_or_else(|| {
                    debug!("No system font found, using built-in bitmap font");
                    Self::bitmap(size)
                }),
        }
    }

    pub fn from_file(path: &Path, size: f32) -> MediaResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes, size)
    }

    pub fn from_bytes(bytes: Vec<u8>, size: f32) -> MediaResult<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| MediaError::internal(format!("failed to parse font: {e}")))?;
        Ok(Self::Outline {
            font: Box::new(font),
            size,
        })
    }

    /// The built-in font scaled so glyphs are about `size` pixels tall.
    pub fn bitmap(size: f32) -> Self {
        let scale = (size / BITMAP_CELL as f32).round().max(1.0) as u32;
        Self::Bitmap { scale }
    }

    pub fn is_bitmap(&self) -> bool {
        matches!(self, Self::Bitmap { .. })
    }

    /// Distance between consecutive baselines.
    pub fn line_height(&self) -> u32 {
        match self {
            Self::Outline { font, size } => font
                .horizontal_line_metrics(*size)
                .map(|m| m.new_line_size)
                .unwrap_or(*size * 1.2)
                .ceil()
                .max(1.0) as u32,
            Self::Bitmap { scale } => (BITMAP_CELL + 2) * scale,
        }
    }

    /// Advance width of a single line of text.
    pub fn measure(&self, text: &str) -> u32 {
        match self {
            Self::Outline { font, size } => text
                .chars()
                .map(|c| font.metrics(c, *size).advance_width)
                .sum::<f32>()
                .ceil() as u32,
            Self::Bitmap { scale } => text.chars().count() as u32 * BITMAP_CELL * scale,
        }
    }

    /// Width and height of a block of lines.
    pub fn measure_block(&self, lines: &[String]) -> (u32, u32) {
        let width = lines.iter().map(|l| self.measure(l)).max().unwrap_or(0);
        (width, self.line_height() * lines.len() as u32)
    }

    /// Rasterise one line into a coverage mask of `measure(text)` x `line_height()`.
    pub fn render_line(&self, text: &str) -> Mask {
        let mut mask = Mask::new(self.measure(text), self.line_height());
        match self {
            Self::Outline { font, size } => {
                let ascent = font
                    .horizontal_line_metrics(*size)
                    .map(|m| m.ascent)
                    .unwrap_or(*size);
                let mut pen_x = 0.0f32;
                for c in text.chars() {
                    let (metrics, bitmap) = font.rasterize(c, *size);
                    let glyph = Mask {
                        width: metrics.width as u32,
                        height: metrics.height as u32,
                        data: bitmap,
                    };
                    let x = (pen_x + metrics.xmin as f32).round() as i64;
                    let y = (ascent - metrics.height as f32 - metrics.ymin as f32).round() as i64;
                    mask.merge(&glyph, x, y);
                    pen_x += metrics.advance_width;
                }
            }
            Self::Bitmap { scale } => {
                let top = *scale as i64;
                for (i, c) in text.chars().enumerate() {
                    let Some(rows) = bitmap_glyph(c) else {
                        continue;
                    };
                    let origin = (i as u32 * BITMAP_CELL * scale) as i64;
                    for (row, bits) in rows.iter().enumerate() {
                        for col in 0..BITMAP_CELL {
                            if bits & (1 << col) == 0 {
                                continue;
                            }
                            for sy in 0..*scale as i64 {
                                for sx in 0..*scale as i64 {
                                    mask.max_at(
                                        origin + col as i64 * *scale as i64 + sx,
                                        top + row as i64 * *scale as i64 + sy,
                                        255,
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
        mask
    }

    /// Rasterise lines stacked vertically, each centered in the block.
    pub fn render_block(&self, lines: &[String]) -> Mask {
        let (width, height) = self.measure_block(lines);
        let line_height = self.line_height() as i64;
        let mut block = Mask::new(width, height);
        for (i, line) in lines.iter().enumerate() {
            let rendered = self.render_line(line);
            let x = (width as i64 - rendered.width as i64) / 2;
            block.merge(&rendered, x, i as i64 * line_height);
        }
        block
    }
}

fn bitmap_glyph(c: char) -> Option<[u8; 8]> {
    font8x8::BASIC_FONTS
        .get(c)
        .or_else(|| font8x8::LATIN_FONTS.get(c))
}

/// Greedy word wrap to at most `width` characters per line.
///
/// Words longer than a line are broken across lines.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            let mut pieces = chars.chunks(width).peekable();
            while let Some(piece) = pieces.next() {
                let piece: String = piece.iter().collect();
                if pieces.peek().is_some() {
                    lines.push(piece);
                } else {
                    current_len = piece.chars().count();
                    current = piece;
                }
            }
            continue;
        }

        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
            current_len = word_len;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
