use serde::Serialize;

use super::font::{FontRequest, GlyphMetrics};
use super::paragraph::PARAGRAPH_SEPARATOR;
use super::text::contains_cjk;

/// Fraction of the glyph height each emitted line adds to the block.
pub const LINE_SPACING_FACTOR: f32 = 0.8;
/// Extra room added once below the last line.
pub const HEIGHT_BUFFER_RATIO: f32 = 0.1;
/// Words with more characters than this are always broken per character.
pub const FORCE_SPLIT_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrappedLine {
    pub text: String,
    pub is_paragraph_end: bool,
}

impl WrappedLine {
    fn body(text: String) -> Self {
        Self {
            text,
            is_paragraph_end: false,
        }
    }

    fn separator() -> Self {
        Self {
            text: String::new(),
            is_paragraph_end: true,
        }
    }

    pub fn is_separator(&self) -> bool {
        self.is_paragraph_end && self.text.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLayout {
    pub lines: Vec<WrappedLine>,
    pub total_height: f32,
    pub font_size: f32,
}

impl TextLayout {
    /// Vertical distance between two consecutive baselines.
    pub fn line_advance(&self, metrics: &dyn GlyphMetrics) -> f32 {
        metrics.glyph_height(self.font_size) * LINE_SPACING_FACTOR
    }
}

pub struct TextLayoutEngine<'a> {
    metrics: &'a dyn GlyphMetrics,
}

impl<'a> TextLayoutEngine<'a> {
    pub fn new(metrics: &'a dyn GlyphMetrics) -> Self {
        Self { metrics }
    }

    pub fn measure(&self, text: &str, size: f32) -> f32 {
        self.metrics.text_width(text, size)
    }

    pub fn layout(&self, text: &str, font: &FontRequest, max_width: f32) -> TextLayout {
        let size = font.size;
        let max_width = max_width.max(1.0);
        let mut lines = Vec::new();

        let paragraphs = text
            .split(PARAGRAPH_SEPARATOR)
            .map(str::trim)
            .filter(|paragraph| !paragraph.is_empty());
        for (idx, paragraph) in paragraphs.enumerate() {
            if idx > 0 {
                lines.push(WrappedLine::separator());
            }
            let mut wrapped = if contains_cjk(paragraph) {
                self.wrap_chars(paragraph, size, max_width)
            } else {
                self.wrap_words(paragraph, size, max_width)
            };
            if let Some(last) = wrapped.last_mut() {
                last.is_paragraph_end = true;
            }
            lines.extend(wrapped);
        }

        let line_height = self.metrics.glyph_height(size) * LINE_SPACING_FACTOR;
        let total_height = lines.len() as f32 * line_height * (1.0 + HEIGHT_BUFFER_RATIO);
        TextLayout {
            lines,
            total_height,
            font_size: size,
        }
    }

    /// Shrinks the font one unit at a time until the block fits `max_height`
    /// or `min_size` is reached.
    pub fn fit_font_size(
        &self,
        text: &str,
        font: &FontRequest,
        max_width: f32,
        max_height: f32,
        min_size: f32,
    ) -> TextLayout {
        let min_size = min_size.max(1.0);
        let mut size = font.size;
        loop {
            let layout = self.layout(text, &font.with_size(size), max_width);
            if layout.total_height <= max_height || size <= min_size {
                return layout;
            }
            size = (size - 1.0).max(min_size);
        }
    }

    fn wrap_words(&self, paragraph: &str, size: f32, max_width: f32) -> Vec<WrappedLine> {
        let mut lines = Vec::new();
        let mut current = String::new();

        for word in paragraph.split_whitespace() {
            let too_long = word.chars().count() > FORCE_SPLIT_CHARS
                || self.measure(word, size) > max_width;
            if too_long {
                if !current.is_empty() {
                    lines.push(WrappedLine::body(std::mem::take(&mut current)));
                }
                let mut pieces = self.split_chars(word, size, max_width);
                current = pieces.pop().unwrap_or_default();
                lines.extend(pieces.into_iter().map(WrappedLine::body));
                continue;
            }
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{} {}", current, word);
            if self.measure(&candidate, size) <= max_width {
                current = candidate;
            } else {
                lines.push(WrappedLine::body(std::mem::replace(
                    &mut current,
                    word.to_string(),
                )));
            }
        }
        if !current.is_empty() {
            lines.push(WrappedLine::body(current));
        }
        lines
    }

    fn wrap_chars(&self, paragraph: &str, size: f32, max_width: f32) -> Vec<WrappedLine> {
        let flattened = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
        self.split_chars(&flattened, size, max_width)
            .into_iter()
            .map(|line| WrappedLine::body(line.trim().to_string()))
            .filter(|line| !line.text.is_empty())
            .collect()
    }

    /// Greedy per-character split. A single character wider than the box
    /// still gets a line of its own.
    fn split_chars(&self, text: &str, size: f32, max_width: f32) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();
        let mut width = 0.0;
        for ch in text.chars() {
            if current.is_empty() && ch.is_whitespace() {
                continue;
            }
            let mut buf = [0u8; 4];
            let ch_width = self.measure(ch.encode_utf8(&mut buf), size);
            if !current.is_empty() && width + ch_width > max_width {
                pieces.push(std::mem::take(&mut current));
                width = 0.0;
                if ch.is_whitespace() {
                    continue;
                }
            }
            current.push(ch);
            width += ch_width;
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }
}
