use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use super::text::{estimate_char_units, is_cjk, is_emoji};

/// Font size and optional family passed explicitly to layout and rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct FontRequest {
    pub size: f32,
    pub family: Option<String>,
}

impl FontRequest {
    pub fn new(size: f32) -> Self {
        Self { size, family: None }
    }

    pub fn with_size(&self, size: f32) -> Self {
        Self {
            size,
            family: self.family.clone(),
        }
    }
}

/// Per-character measurements used by the layout engine.
pub trait GlyphMetrics {
    /// Horizontal advance in pixels, `None` when the glyph is unknown.
    fn advance(&self, ch: char, size: f32) -> Option<f32>;

    /// Height of one line of glyphs in pixels.
    fn glyph_height(&self, size: f32) -> f32;

    fn text_width(&self, text: &str, size: f32) -> f32 {
        text.chars()
            .map(|ch| {
                self.advance(ch, size)
                    .unwrap_or_else(|| estimate_char_units(ch) * size)
            })
            .sum()
    }
}

/// Metrics used when no font file is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatedMetrics;

impl GlyphMetrics for EstimatedMetrics {
    fn advance(&self, ch: char, size: f32) -> Option<f32> {
        Some(estimate_char_units(ch) * size)
    }

    fn glyph_height(&self, size: f32) -> f32 {
        size * 1.15
    }
}

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, self.face_index).ok()
    }

    pub fn has_glyph(&self, ch: char) -> bool {
        self.face().is_some_and(|face| face.glyph_index(ch).is_some())
    }

    fn advance_units(&self, face: &Face<'_>, ch: char) -> Option<u16> {
        if ch == ' ' {
            return Some(self.space_advance);
        }
        let glyph = face.glyph_index(ch)?;
        Some(face.glyph_hor_advance(glyph).unwrap_or(self.space_advance))
    }

    fn scale(&self, size: f32) -> f32 {
        size / self.units_per_em.max(1) as f32
    }
}

impl GlyphMetrics for FontMetrics {
    fn advance(&self, ch: char, size: f32) -> Option<f32> {
        let face = self.face()?;
        self.advance_units(&face, ch)
            .map(|units| units as f32 * self.scale(size))
    }

    fn glyph_height(&self, size: f32) -> f32 {
        let units = (self.ascender as i32 - self.descender as i32).max(1);
        units as f32 * self.scale(size)
    }

    fn text_width(&self, text: &str, size: f32) -> f32 {
        let Some(face) = self.face() else {
            return EstimatedMetrics.text_width(text, size);
        };
        text.chars()
            .map(|ch| match self.advance_units(&face, ch) {
                Some(units) => units as f32 * self.scale(size),
                None => estimate_char_units(ch) * size,
            })
            .sum()
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let shared = Arc::new(data.to_vec());
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        if let Some(metrics) = face_metrics(&shared, index) {
            if let (Some(preferred), Some(found)) = (preferred_family, &metrics.family) {
                if found.eq_ignore_ascii_case(preferred) {
                    return Ok(metrics);
                }
            }
            if fallback.is_none() {
                fallback = Some(metrics);
            }
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn face_metrics(data: &Arc<Vec<u8>>, index: u32) -> Option<FontMetrics> {
    let face = Face::parse(data, index).ok()?;
    let units_per_em = face.units_per_em().max(1);
    let space_advance = face
        .glyph_index(' ')
        .and_then(|id| face.glyph_hor_advance(id))
        .unwrap_or(units_per_em / 2);
    Some(FontMetrics {
        data: data.clone(),
        units_per_em,
        space_advance,
        ascender: face.ascender(),
        descender: face.descender(),
        family: extract_family_name(&face),
        face_index: index,
    })
}

/// Loads the face fontdb picks for `family`, so the metrics match what
/// resvg draws for the same family name.
pub(crate) fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    face_metrics(&Arc::new(data), index)
        .ok_or_else(|| anyhow!("failed to parse font: {}", family))
}

#[cfg(target_os = "macos")]
fn fallback_families() -> &'static [&'static str] {
    &["Noto Sans", "Hiragino Sans", "Helvetica", "sans-serif"]
}

#[cfg(target_os = "windows")]
fn fallback_families() -> &'static [&'static str] {
    &["Noto Sans", "Segoe UI", "Arial", "sans-serif"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn fallback_families() -> &'static [&'static str] {
    &["Noto Sans", "DejaVu Sans", "Liberation Sans", "sans-serif"]
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontRole {
    Default,
    CjkPrimary,
    CjkSecondary,
    Emoji,
}

const CJK_ORDER: &[FontRole] = &[
    FontRole::CjkPrimary,
    FontRole::CjkSecondary,
    FontRole::Emoji,
    FontRole::Default,
];
const EMOJI_ORDER: &[FontRole] = &[FontRole::Emoji, FontRole::Default];

/// Where each font of the chain comes from: a file path or a family name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FontSources {
    pub primary: Option<String>,
    pub cjk_primary: Option<String>,
    pub cjk_secondary: Option<String>,
    pub emoji: Option<String>,
}

/// Fallback chain for per-character font selection.
#[derive(Debug, Clone, Default)]
pub struct FontChain {
    default: Option<FontMetrics>,
    cjk_primary: Option<FontMetrics>,
    cjk_secondary: Option<FontMetrics>,
    emoji: Option<FontMetrics>,
}

impl FontChain {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every configured font. A font that cannot be loaded is skipped
    /// with a warning and its role falls through to the next one. The
    /// default role always resolves to a real face when one is installed:
    /// `primary`, then `family`, then the platform's sans-serif fallbacks.
    pub fn load(sources: &FontSources, family: Option<&str>) -> Self {
        let mut system_db: Option<fontdb::Database> = None;
        let mut load = |role: FontRole, source: Option<&str>| -> Option<FontMetrics> {
            let source = source.map(str::trim).filter(|value| !value.is_empty())?;
            let path = Path::new(source);
            let result = if path.exists() {
                load_font_metrics(path)
            } else {
                let db = system_db.get_or_insert_with(|| {
                    let mut db = fontdb::Database::new();
                    db.load_system_fonts();
                    db
                });
                load_font_metrics_from_family(db, source)
            };
            match result {
                Ok(metrics) => {
                    debug!("font {:?} resolved from {}", role, source);
                    Some(metrics)
                }
                Err(err) => {
                    warn!("font {:?} unavailable ({}), falling back", role, err);
                    None
                }
            }
        };
        let default = load(FontRole::Default, sources.primary.as_deref())
            .or_else(|| load(FontRole::Default, family))
            .or_else(|| {
                fallback_families()
                    .iter()
                    .copied()
                    .find_map(|candidate| load(FontRole::Default, Some(candidate)))
            });
        if default.is_none() {
            warn!("no default font found, layout falls back to estimated widths");
        }
        Self {
            default,
            cjk_primary: load(FontRole::CjkPrimary, sources.cjk_primary.as_deref()),
            cjk_secondary: load(FontRole::CjkSecondary, sources.cjk_secondary.as_deref()),
            emoji: load(FontRole::Emoji, sources.emoji.as_deref()),
        }
    }

    pub fn with_font(mut self, role: FontRole, metrics: FontMetrics) -> Self {
        *self.slot_mut(role) = Some(metrics);
        self
    }

    fn slot_mut(&mut self, role: FontRole) -> &mut Option<FontMetrics> {
        match role {
            FontRole::Default => &mut self.default,
            FontRole::CjkPrimary => &mut self.cjk_primary,
            FontRole::CjkSecondary => &mut self.cjk_secondary,
            FontRole::Emoji => &mut self.emoji,
        }
    }

    pub fn font(&self, role: FontRole) -> Option<&FontMetrics> {
        match role {
            FontRole::Default => self.default.as_ref(),
            FontRole::CjkPrimary => self.cjk_primary.as_ref(),
            FontRole::CjkSecondary => self.cjk_secondary.as_ref(),
            FontRole::Emoji => self.emoji.as_ref(),
        }
    }

    pub fn family(&self, role: FontRole) -> Option<&str> {
        self.font(role).and_then(FontMetrics::family)
    }

    pub fn loaded(&self) -> impl Iterator<Item = &FontMetrics> {
        [
            &self.default,
            &self.cjk_primary,
            &self.cjk_secondary,
            &self.emoji,
        ]
        .into_iter()
        .flatten()
    }

    /// Picks the first loaded font in the character's fallback order that
    /// has the glyph. Falls back to the default role.
    pub fn role_for(&self, ch: char) -> FontRole {
        let order = if is_emoji(ch) {
            EMOJI_ORDER
        } else if is_cjk(ch) {
            CJK_ORDER
        } else {
            return FontRole::Default;
        };
        order
            .iter()
            .copied()
            .find(|role| self.font(*role).is_some_and(|font| font.has_glyph(ch)))
            .unwrap_or(FontRole::Default)
    }
}

impl GlyphMetrics for FontChain {
    fn advance(&self, ch: char, size: f32) -> Option<f32> {
        self.font(self.role_for(ch))
            .and_then(|font| font.advance(ch, size))
    }

    fn glyph_height(&self, size: f32) -> f32 {
        match &self.default {
            Some(font) => font.glyph_height(size),
            None => EstimatedMetrics.glyph_height(size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_file_is_an_error() {
        let err = load_font_metrics(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(err.to_string().contains("failed to read font"));
    }

    #[test]
    fn empty_chain_uses_estimates() {
        let chain = FontChain::empty();
        assert_eq!(chain.role_for('A'), FontRole::Default);
        assert_eq!(chain.role_for('漢'), FontRole::Default);
        assert_eq!(chain.advance('A', 10.0), None);
        assert!((chain.glyph_height(20.0) - 23.0).abs() < 1e-3);
        assert!((chain.text_width("ab", 10.0) - 11.0).abs() < 1e-4);
    }

    #[test]
    fn unresolvable_sources_are_skipped() {
        let chain = FontChain::load(
            &FontSources {
                primary: Some("/nonexistent/primary.ttf".to_string()),
                cjk_primary: Some("   ".to_string()),
                ..FontSources::default()
            },
            None,
        );
        assert!(chain.font(FontRole::CjkPrimary).is_none());
        assert_eq!(chain.role_for('字'), FontRole::Default);
    }

    fn system_default_chain() -> Option<FontChain> {
        let chain = FontChain::load(&FontSources::default(), None);
        if chain.font(FontRole::Default).is_none() {
            eprintln!("skipping: no system sans-serif font installed");
            return None;
        }
        Some(chain)
    }

    #[test]
    fn default_role_resolves_a_system_face() {
        let Some(chain) = system_default_chain() else {
            return;
        };
        let font = chain.font(FontRole::Default).expect("default font");
        assert!(font.family().is_some());
        assert!(font.has_glyph('W'));
        // Real advances, not the per-character estimate.
        assert_eq!(chain.advance('W', 16.0), font.advance('W', 16.0));
        assert!(chain.advance('W', 16.0).is_some());
    }

    #[test]
    fn layout_width_matches_the_drawn_face() {
        use crate::ocr::layout::TextLayoutEngine;

        let Some(chain) = system_default_chain() else {
            return;
        };
        let font = chain.font(FontRole::Default).expect("default font").clone();
        let engine = TextLayoutEngine::new(&chain);
        let layout = engine.layout("WWWWW MMMMM WWWWW MMMMM", &FontRequest::new(16.0), 100.0);
        assert!(layout.lines.len() > 2);
        for line in layout.lines.iter().filter(|line| !line.is_separator()) {
            let drawn = font.text_width(&line.text, 16.0);
            assert!(drawn <= 100.0, "{:?} draws {}px wide", line.text, drawn);
        }
    }

    #[test]
    fn configured_family_feeds_metrics() {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        let Ok(expected) = load_font_metrics_from_family(&db, "DejaVu Sans Mono") else {
            eprintln!("skipping: DejaVu Sans Mono not installed");
            return;
        };
        let chain = FontChain::load(&FontSources::default(), Some("DejaVu Sans Mono"));
        assert_eq!(chain.family(FontRole::Default), expected.family());
        // Monospace: every glyph shares one advance.
        assert_eq!(chain.advance('i', 16.0), chain.advance('W', 16.0));
    }
}
