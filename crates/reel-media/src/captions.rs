//! Burned-in captions synchronised to word timestamps.

use async_trait::async_trait;
use tracing::debug;

use reel_models::{chunk_words, CaptionChunk, CaptionStyle, Rgb, VideoFormat, WordTimestamp};

use crate::error::MediaResult;
use crate::frame::{Frame, FrameSource};
use crate::text::{wrap_text, CaptionFont, Mask};

/// Narrowest rewrap width used when a caption overflows the safe area.
pub const MIN_WRAP_CHARS: usize = 10;

/// Placement of one caption block on the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionLayout {
    pub lines: Vec<String>,
    pub width: u32,
    pub height: u32,
    /// Top-left corner; may be negative when the block exceeds the frame
    pub x: i64,
    pub y: i64,
}

/// Wrap and center `text` for a frame of `frame` pixels.
///
/// If the wrapped block is wider than the safe area, the wrap width is
/// reduced in proportion and the text rewrapped once.
pub fn layout_caption(
    font: &CaptionFont,
    style: &CaptionStyle,
    text: &str,
    frame: (u32, u32),
) -> CaptionLayout {
    let max_width = style.max_text_width(frame.0);

    let mut lines = wrap_text(text, style.max_chars);
    let (mut width, mut height) = font.measure_block(&lines);

    if width > max_width && width > 0 {
        let chars = (style.max_chars as f64 * max_width as f64 / width as f64).floor() as usize;
        let chars = chars.max(MIN_WRAP_CHARS);
        debug!(width, max_width, chars, "Caption too wide, rewrapping");
        lines = wrap_text(text, chars);
        (width, height) = font.measure_block(&lines);
    }

    CaptionLayout {
        x: (frame.0 as i64 - width as i64) / 2,
        y: (frame.1 as i64 - height as i64) / 2,
        lines,
        width,
        height,
    }
}

/// A caption rasterised once and stamped onto every frame it covers.
#[derive(Debug, Clone)]
struct RenderedCaption {
    layout: CaptionLayout,
    fill: Mask,
    stroke: Mask,
}

/// Draws the active caption chunk onto frames.
pub struct CaptionRenderer {
    font: CaptionFont,
    style: CaptionStyle,
    chunks: Vec<CaptionChunk>,
    cached: Option<(usize, RenderedCaption)>,
}

impl CaptionRenderer {
    /// Chunk `words` and load the style's font.
    pub fn new(words: &[WordTimestamp], style: CaptionStyle) -> Self {
        let font = CaptionFont::load(style.font_path.as_deref(), style.font_size);
        Self::with_font(words, style, font)
    }

    pub fn with_font(words: &[WordTimestamp], style: CaptionStyle, font: CaptionFont) -> Self {
        let chunks = chunk_words(words, style.words_per_chunk);
        debug!(
            words = words.len(),
            chunks = chunks.len(),
            bitmap_font = font.is_bitmap(),
            "Prepared captions"
        );
        Self {
            font,
            style,
            chunks,
            cached: None,
        }
    }

    pub fn chunks(&self) -> &[CaptionChunk] {
        &self.chunks
    }

    /// Index of the chunk shown at time `t`, if any.
    pub fn active_index(&self, t: f64) -> Option<usize> {
        self.chunks.iter().position(|chunk| chunk.is_active_at(t))
    }

    /// Draw the caption for time `t` onto `frame`; frames outside every chunk
    /// are left untouched.
    pub fn render_onto(&mut self, frame: &mut Frame, t: f64) {
        let Some(index) = self.active_index(t) else {
            return;
        };

        let stale = self.cached.as_ref().map(|(i, _)| *i) != Some(index);
        if stale {
            let rendered = self.rasterise(&self.chunks[index].text, frame.dimensions());
            self.cached = Some((index, rendered));
        }

        if let Some((_, caption)) = self.cached.as_ref() {
            let radius = self.style.stroke_width as i64;
            let (x, y) = (caption.layout.x, caption.layout.y);
            composite(frame, &caption.stroke, x - radius, y - radius, self.style.stroke);
            composite(frame, &caption.fill, x, y, self.style.fill);
        }
    }

    fn rasterise(&self, text: &str, frame: (u32, u32)) -> RenderedCaption {
        let layout = layout_caption(&self.font, &self.style, text, frame);
        let fill = self.font.render_block(&layout.lines);
        let stroke = fill.dilate(self.style.stroke_width);
        RenderedCaption {
            layout,
            fill,
            stroke,
        }
    }
}

/// Alpha-blend `color` onto `frame` through `mask` placed at `(x, y)`.
fn composite(frame: &mut Frame, mask: &Mask, x: i64, y: i64, color: Rgb) {
    let (frame_w, frame_h) = (frame.width() as i64, frame.height() as i64);
    for row in 0..mask.height as i64 {
        let py = y + row;
        if py < 0 || py >= frame_h {
            continue;
        }
        for col in 0..mask.width as i64 {
            let px = x + col;
            if px < 0 || px >= frame_w {
                continue;
            }
            let alpha = mask.get(col, row) as u16;
            if alpha == 0 {
                continue;
            }
            let inv_alpha = 255 - alpha;
            let pixel = frame.get_pixel_mut(px as u32, py as u32);
            for channel in 0..3 {
                let dst = pixel.0[channel] as u16;
                let src = color.0[channel] as u16;
                pixel.0[channel] = ((src * alpha + dst * inv_alpha + 127) / 255) as u8;
            }
        }
    }
}

/// A frame source with captions drawn over its frames.
pub struct CaptionOverlay<S> {
    inner: S,
    renderer: CaptionRenderer,
}

impl<S: FrameSource> CaptionOverlay<S> {
    pub fn new(inner: S, renderer: CaptionRenderer) -> Self {
        Self { inner, renderer }
    }
}

#[async_trait]
impl<S: FrameSource> FrameSource for CaptionOverlay<S> {
    fn duration(&self) -> f64 {
        self.inner.duration()
    }

    fn format(&self) -> VideoFormat {
        self.inner.format()
    }

    async fn frame_at(&mut self, t: f64) -> MediaResult<Frame> {
        let mut frame = self.inner.frame_at(t).await?;
        self.renderer.render_onto(&mut frame, t);
        Ok(frame)
    }

    async fn close(&mut self) -> MediaResult<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::test_support::SolidSource;
    use image::Rgb as Pixel;

    fn words() -> Vec<WordTimestamp> {
        vec![
            WordTimestamp::new("one", 1.0, 1.2),
            WordTimestamp::new("two", 1.2, 1.5),
            WordTimestamp::new("three", 1.5, 1.9),
            WordTimestamp::new("four", 1.9, 2.0),
            WordTimestamp::new("five", 2.4, 3.0),
        ]
    }

    fn style() -> CaptionStyle {
        CaptionStyle::default()
            .with_font_size(16.0)
            .with_stroke_width(2)
    }

    #[test]
    fn test_layout_is_centered() {
        let font = CaptionFont::bitmap(16.0);
        let layout = layout_caption(&font, &style(), "hi", (400, 300));
        assert_eq!(layout.lines, vec!["hi"]);
        assert_eq!((layout.width, layout.height), (32, 20));
        assert_eq!((layout.x, layout.y), (184, 140));
    }

    #[test]
    fn test_layout_rewraps_once_when_too_wide() {
        let font = CaptionFont::bitmap(16.0);
        // 19 chars at 16px = 304px, safe width of a 200px frame is 168px
        let layout = layout_caption(&font, &style(), "aaaa bbbb cccc dddd", (200, 400));
        assert_eq!(layout.lines, vec!["aaaa bbbb cccc", "dddd"]);
        assert_eq!(layout.width, 224);
    }

    #[test]
    fn test_layout_rewrap_width_has_floor() {
        let font = CaptionFont::bitmap(64.0);
        let layout = layout_caption(&font, &style(), "abcdefgh ijklmnop qrstuv", (100, 400));
        assert!(layout
            .lines
            .iter()
            .all(|line| line.chars().count() <= MIN_WRAP_CHARS));
    }

    #[test]
    fn test_active_index() {
        let renderer = CaptionRenderer::with_font(&words(), style(), CaptionFont::bitmap(16.0));
        assert_eq!(renderer.chunks().len(), 2);
        assert_eq!(renderer.active_index(0.5), None);
        assert_eq!(renderer.active_index(1.0), Some(0));
        assert_eq!(renderer.active_index(2.0), Some(0));
        assert_eq!(renderer.active_index(2.2), None);
        assert_eq!(renderer.active_index(2.5), Some(1));
    }

    #[test]
    fn test_render_draws_fill_and_stroke() {
        let mut renderer =
            CaptionRenderer::with_font(&words(), style(), CaptionFont::bitmap(16.0));
        let base = Pixel([0, 0, 255]);
        let mut frame = Frame::from_pixel(200, 100, base);
        renderer.render_onto(&mut frame, 1.5);

        assert!(frame.pixels().any(|p| *p == Pixel([255, 255, 255])));
        assert!(frame.pixels().any(|p| *p == Pixel([0, 0, 0])));
        // Corners stay clear of the centered block
        assert_eq!(frame.get_pixel(0, 0), &base);
        assert_eq!(frame.get_pixel(199, 99), &base);
    }

    #[test]
    fn test_caption_larger_than_frame_is_clipped() {
        let mut renderer =
            CaptionRenderer::with_font(&words(), style(), CaptionFont::bitmap(64.0));
        let mut frame = Frame::from_pixel(20, 20, Pixel([0, 0, 255]));
        renderer.render_onto(&mut frame, 1.1);
        assert_eq!(frame.dimensions(), (20, 20));
    }

    #[tokio::test]
    async fn test_overlay_leaves_uncaptioned_frames_unchanged() {
        let format = VideoFormat::new(200, 100, 30);
        let inner = SolidSource::new(format, 4.0, [0, 0, 255]);
        let renderer = CaptionRenderer::with_font(&words(), style(), CaptionFont::bitmap(16.0));
        let mut overlay = CaptionOverlay::new(inner, renderer);

        let plain = Frame::from_pixel(200, 100, Pixel([0, 0, 255]));
        assert_eq!(overlay.frame_at(0.5).await.unwrap(), plain);
        assert_ne!(overlay.frame_at(1.5).await.unwrap(), plain);
        assert_eq!(overlay.frame_at(2.2).await.unwrap(), plain);
        assert_eq!(overlay.frame_at(3.5).await.unwrap(), plain);
        assert_eq!(overlay.duration(), 4.0);
    }
}
