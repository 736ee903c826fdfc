mod engine;
mod fill;
mod font;
mod geom;
mod inpaint;
mod layout;
mod paragraph;
mod render;
mod style;
mod text;

use serde::{Deserialize, Serialize};

pub use engine::{
    OcrEngine, OcrGuard, OcrOptions, SharedOcrEngine, TesseractEngine, list_tesseract_languages,
};
pub use font::{
    EstimatedMetrics, FontChain, FontMetrics, FontRequest, FontRole, FontSources, GlyphMetrics,
    load_font_metrics,
};
pub use geom::{distance, quad_bbox, quad_center, y_center};
pub use inpaint::{BackgroundInpainter, InpaintConfig, InpaintOutcome, TextMask};
pub use layout::{
    FORCE_SPLIT_CHARS, HEIGHT_BUFFER_RATIO, LINE_SPACING_FACTOR, TextLayout, TextLayoutEngine,
    WrappedLine,
};
pub use paragraph::{
    BoundaryDecision, BoundaryRule, ContinuityLexicon, GapClustering, LinePair,
    PARAGRAPH_SEPARATOR, ParagraphAssembler, ParagraphSet, WordListLexicon, assemble,
};
pub use render::{OverlayRenderer, RenderOutcome};
pub use style::{
    BackgroundFill, GradientStyle, OverlayMode, RenderStyle, Rgba, ShadowStyle, StrokeStyle,
    TextAlign,
};
pub use text::{Script, classify_char, classify_word, contains_cjk, is_cjk, is_emoji};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Corner points in the order top-left, top-right, bottom-right, bottom-left.
pub type Quad = [Point; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BBoxPx {
    pub fn to_quad(&self) -> Quad {
        let x1 = self.x as f32;
        let y1 = self.y as f32;
        let x2 = (self.x + self.w) as f32;
        let y2 = (self.y + self.h) as f32;
        [
            Point::new(x1, y1),
            Point::new(x2, y1),
            Point::new(x2, y2),
            Point::new(x1, y2),
        ]
    }
}

/// One recognized text line as reported by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDetection {
    pub text: String,
    pub quad: Quad,
    pub confidence: f32,
}

impl LineDetection {
    pub fn new(text: impl Into<String>, quad: Quad, confidence: f32) -> Self {
        Self {
            text: text.into(),
            quad,
            confidence,
        }
    }

    pub fn from_bbox(text: impl Into<String>, bbox: BBoxPx, confidence: f32) -> Self {
        Self::new(text, bbox.to_quad(), confidence)
    }

    pub fn y_center(&self) -> f32 {
        y_center(&self.quad)
    }

    pub fn x_center(&self) -> f32 {
        quad_center(&self.quad).x
    }
}

/// Target rectangle of an overlay in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl OverlayRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clips the region to a canvas. Returns `None` when nothing remains.
    pub fn clamp_to(&self, canvas_w: u32, canvas_h: u32) -> Option<Self> {
        if self.is_degenerate() || self.x >= canvas_w || self.y >= canvas_h {
            return None;
        }
        Some(Self {
            x: self.x,
            y: self.y,
            width: self.width.min(canvas_w - self.x),
            height: self.height.min(canvas_h - self.y),
        })
    }

    /// Grows the height downward to `required`, never past the canvas bottom.
    pub fn expand_to_height(&self, required: u32, canvas_h: u32) -> Self {
        let limit = canvas_h.saturating_sub(self.y);
        let height = self.height.max(required.min(limit));
        Self { height, ..*self }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

impl std::str::FromStr for OverlayRegion {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        let parts = value
            .split([',', 'x', ' '])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| anyhow::anyhow!("invalid region '{}': {}", value, err))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Self::new(*x, *y, *w, *h)),
            _ => Err(anyhow::anyhow!(
                "invalid region '{}': expected x,y,width,height",
                value
            )),
        }
    }
}
