use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::ocr::{
    BackgroundFill, FontRequest, FontSources, GapClustering, GradientStyle, InpaintConfig,
    OcrOptions, OverlayMode, ParagraphAssembler, RenderStyle, Rgba, ShadowStyle, StrokeStyle,
    TextAlign, WordListLexicon,
};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ocr: OcrSettings,
    pub paragraph: ParagraphSettings,
    pub overlay: OverlaySettings,
    pub text_effects: TextEffectSettings,
    pub inpaint: InpaintConfig,
    pub fonts: FontSources,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrSettings {
    pub confidence_threshold: f32,
    pub max_input_side: u32,
    pub timeout_secs: u64,
    pub languages: String,
    pub psm: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParagraphSettings {
    pub clustering: GapClustering,
    pub extra_connectives: Vec<String>,
    pub extra_phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySettings {
    pub mode: OverlayMode,
    pub padding: u32,
    pub font_size: f32,
    pub min_font_size: f32,
    pub font_family: Option<String>,
    pub auto_expand: bool,
    pub text_alignment: TextAlign,
    pub text_color: Rgba,
    pub background_color: Rgba,
    pub border_width: f32,
    pub border_color: Rgba,
    pub corner_radius: f32,
    pub shadow: ShadowStyle,
    pub auto_text_color: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextEffectSettings {
    pub stroke_width: f32,
    pub stroke_color: Rgba,
    pub shadow: ShadowStyle,
    pub gradient_enabled: bool,
    pub gradient_colors: Vec<Rgba>,
    pub bg_gradient_enabled: bool,
    pub bg_gradient_colors: Vec<Rgba>,
    pub blur_enabled: bool,
    pub blur_radius: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr: OcrSettings {
                confidence_threshold: 0.5,
                max_input_side: 1600,
                timeout_secs: 10,
                languages: "eng".to_string(),
                psm: 6,
            },
            paragraph: ParagraphSettings::default(),
            overlay: OverlaySettings {
                mode: OverlayMode::Box,
                padding: 10,
                font_size: 16.0,
                min_font_size: 8.0,
                font_family: None,
                auto_expand: true,
                text_alignment: TextAlign::Left,
                text_color: Rgba::WHITE,
                background_color: Rgba([0, 0, 0, 200]),
                border_width: 0.0,
                border_color: Rgba::WHITE,
                corner_radius: 5.0,
                shadow: ShadowStyle::default(),
                auto_text_color: true,
            },
            text_effects: TextEffectSettings {
                stroke_width: 0.0,
                stroke_color: Rgba::BLACK,
                shadow: ShadowStyle::default(),
                gradient_enabled: false,
                gradient_colors: vec![Rgba::WHITE, Rgba::rgb(200, 200, 200)],
                bg_gradient_enabled: false,
                bg_gradient_colors: vec![Rgba([0, 0, 0, 180]), Rgba([20, 20, 20, 180])],
                blur_enabled: false,
                blur_radius: 10.0,
            },
            inpaint: InpaintConfig::default(),
            fonts: FontSources::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrFile>,
    paragraph: Option<ParagraphFile>,
    overlay: Option<OverlayFile>,
    text_effects: Option<TextEffectsFile>,
    inpaint: Option<InpaintFile>,
    fonts: Option<FontSources>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrFile {
    confidence_threshold: Option<f32>,
    max_input_side: Option<u32>,
    timeout_secs: Option<u64>,
    languages: Option<String>,
    psm: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ParagraphFile {
    clustering: Option<GapClustering>,
    extra_connectives: Option<Vec<String>>,
    extra_phrases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlayFile {
    mode: Option<OverlayMode>,
    padding: Option<u32>,
    font_size: Option<f32>,
    min_font_size: Option<f32>,
    font_family: Option<String>,
    auto_expand: Option<bool>,
    text_alignment: Option<TextAlign>,
    text_color: Option<Rgba>,
    background_color: Option<Rgba>,
    border_width: Option<f32>,
    border_color: Option<Rgba>,
    corner_radius: Option<f32>,
    shadow_enabled: Option<bool>,
    shadow_color: Option<Rgba>,
    shadow_offset: Option<[f32; 2]>,
    shadow_blur: Option<f32>,
    auto_text_color: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TextEffectsFile {
    stroke_width: Option<f32>,
    stroke_color: Option<Rgba>,
    shadow_enabled: Option<bool>,
    shadow_color: Option<Rgba>,
    shadow_offset: Option<[f32; 2]>,
    shadow_blur: Option<f32>,
    gradient_enabled: Option<bool>,
    gradient_colors: Option<Vec<Rgba>>,
    bg_gradient_enabled: Option<bool>,
    bg_gradient_colors: Option<Vec<Rgba>>,
    blur_enabled: Option<bool>,
    blur_radius: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct InpaintFile {
    radius: Option<u32>,
    dilation: Option<u8>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_toml(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(ocr) = incoming.ocr {
            if let Some(threshold) = ocr.confidence_threshold {
                if (0.0..=1.0).contains(&threshold) {
                    self.ocr.confidence_threshold = threshold;
                }
            }
            if let Some(side) = ocr.max_input_side {
                if side > 0 {
                    self.ocr.max_input_side = side;
                }
            }
            if let Some(secs) = ocr.timeout_secs {
                if secs > 0 {
                    self.ocr.timeout_secs = secs;
                }
            }
            if let Some(languages) = ocr.languages {
                if !languages.trim().is_empty() {
                    self.ocr.languages = languages;
                }
            }
            if let Some(psm) = ocr.psm {
                self.ocr.psm = psm;
            }
        }
        if let Some(paragraph) = incoming.paragraph {
            if let Some(clustering) = paragraph.clustering {
                self.paragraph.clustering = clustering;
            }
            if let Some(words) = paragraph.extra_connectives {
                self.paragraph.extra_connectives.extend(words);
            }
            if let Some(phrases) = paragraph.extra_phrases {
                self.paragraph.extra_phrases.extend(phrases);
            }
        }
        if let Some(overlay) = incoming.overlay {
            self.merge_overlay(overlay);
        }
        if let Some(effects) = incoming.text_effects {
            self.merge_text_effects(effects);
        }
        if let Some(inpaint) = incoming.inpaint {
            if let Some(radius) = inpaint.radius {
                if radius > 0 {
                    self.inpaint.radius = radius;
                }
            }
            if let Some(dilation) = inpaint.dilation {
                self.inpaint.dilation = dilation;
            }
        }
        if let Some(fonts) = incoming.fonts {
            let pick = |incoming: Option<String>, current: &mut Option<String>| {
                if let Some(value) = incoming.filter(|value| !value.trim().is_empty()) {
                    *current = Some(value);
                }
            };
            pick(fonts.primary, &mut self.fonts.primary);
            pick(fonts.cjk_primary, &mut self.fonts.cjk_primary);
            pick(fonts.cjk_secondary, &mut self.fonts.cjk_secondary);
            pick(fonts.emoji, &mut self.fonts.emoji);
        }
    }

    fn merge_overlay(&mut self, overlay: OverlayFile) {
        let target = &mut self.overlay;
        if let Some(mode) = overlay.mode {
            target.mode = mode;
        }
        if let Some(padding) = overlay.padding {
            target.padding = padding;
        }
        if let Some(size) = overlay.font_size {
            if size > 0.0 {
                target.font_size = size;
            }
        }
        if let Some(size) = overlay.min_font_size {
            if size > 0.0 {
                target.min_font_size = size;
            }
        }
        if let Some(family) = overlay.font_family {
            if !family.trim().is_empty() {
                target.font_family = Some(family);
            }
        }
        if let Some(auto_expand) = overlay.auto_expand {
            target.auto_expand = auto_expand;
        }
        if let Some(alignment) = overlay.text_alignment {
            target.text_alignment = alignment;
        }
        if let Some(color) = overlay.text_color {
            target.text_color = color;
        }
        if let Some(color) = overlay.background_color {
            target.background_color = color;
        }
        if let Some(width) = overlay.border_width {
            target.border_width = width.max(0.0);
        }
        if let Some(color) = overlay.border_color {
            target.border_color = color;
        }
        if let Some(radius) = overlay.corner_radius {
            target.corner_radius = radius.max(0.0);
        }
        merge_shadow(
            &mut target.shadow,
            overlay.shadow_enabled,
            overlay.shadow_color,
            overlay.shadow_offset,
            overlay.shadow_blur,
        );
        if let Some(auto) = overlay.auto_text_color {
            target.auto_text_color = auto;
        }
    }

    fn merge_text_effects(&mut self, effects: TextEffectsFile) {
        let target = &mut self.text_effects;
        if let Some(width) = effects.stroke_width {
            target.stroke_width = width.max(0.0);
        }
        if let Some(color) = effects.stroke_color {
            target.stroke_color = color;
        }
        merge_shadow(
            &mut target.shadow,
            effects.shadow_enabled,
            effects.shadow_color,
            effects.shadow_offset,
            effects.shadow_blur,
        );
        if let Some(enabled) = effects.gradient_enabled {
            target.gradient_enabled = enabled;
        }
        if let Some(colors) = effects.gradient_colors {
            if colors.len() >= 2 {
                target.gradient_colors = colors;
            }
        }
        if let Some(enabled) = effects.bg_gradient_enabled {
            target.bg_gradient_enabled = enabled;
        }
        if let Some(colors) = effects.bg_gradient_colors {
            if colors.len() >= 2 {
                target.bg_gradient_colors = colors;
            }
        }
        if let Some(enabled) = effects.blur_enabled {
            target.blur_enabled = enabled;
        }
        if let Some(radius) = effects.blur_radius {
            if radius > 0.0 {
                target.blur_radius = radius;
            }
        }
    }

    pub fn ocr_options(&self) -> OcrOptions {
        OcrOptions {
            max_input_side: self.ocr.max_input_side,
            timeout: Duration::from_secs(self.ocr.timeout_secs),
        }
    }

    pub fn font_sources(&self) -> FontSources {
        self.fonts.clone()
    }

    pub fn assembler(&self) -> ParagraphAssembler {
        let mut lexicon = WordListLexicon::english();
        lexicon.extend_connectives(self.paragraph.extra_connectives.iter());
        lexicon.extend_phrases(self.paragraph.extra_phrases.iter());
        ParagraphAssembler::with_lexicon(Arc::new(lexicon))
            .with_clustering(self.paragraph.clustering)
    }

    pub fn render_style(&self) -> RenderStyle {
        let overlay = &self.overlay;
        let effects = &self.text_effects;
        let background = if effects.blur_enabled {
            BackgroundFill::Blurred {
                radius: effects.blur_radius,
                tint: overlay.background_color,
            }
        } else if effects.bg_gradient_enabled {
            gradient_of(&effects.bg_gradient_colors)
                .map(BackgroundFill::Gradient)
                .unwrap_or(BackgroundFill::Solid(overlay.background_color))
        } else {
            BackgroundFill::Solid(overlay.background_color)
        };
        let font = FontRequest {
            size: overlay.font_size,
            family: overlay.font_family.clone(),
        };
        RenderStyle {
            mode: overlay.mode,
            font,
            min_font_size: overlay.min_font_size.min(overlay.font_size),
            padding: overlay.padding,
            alignment: overlay.text_alignment,
            auto_expand: overlay.auto_expand,
            text_color: overlay.text_color,
            auto_text_color: overlay.auto_text_color,
            background,
            corner_radius: overlay.corner_radius,
            border_width: overlay.border_width,
            border_color: overlay.border_color,
            box_shadow: overlay.shadow,
            text_shadow: effects.shadow,
            stroke: (effects.stroke_width > 0.0).then_some(StrokeStyle {
                width: effects.stroke_width,
                color: effects.stroke_color,
            }),
            text_gradient: effects
                .gradient_enabled
                .then(|| gradient_of(&effects.gradient_colors))
                .flatten(),
            inpaint: self.inpaint,
        }
    }
}

fn merge_shadow(
    shadow: &mut ShadowStyle,
    enabled: Option<bool>,
    color: Option<Rgba>,
    offset: Option<[f32; 2]>,
    blur: Option<f32>,
) {
    if let Some(enabled) = enabled {
        shadow.enabled = enabled;
    }
    if let Some(color) = color {
        shadow.color = color;
    }
    if let Some([dx, dy]) = offset {
        shadow.offset = (dx, dy);
    }
    if let Some(blur) = blur {
        shadow.blur = blur.max(0.0);
    }
}

fn gradient_of(colors: &[Rgba]) -> Option<GradientStyle> {
    match colors {
        [top, .., bottom] => Some(GradientStyle {
            top: *top,
            bottom: *bottom,
        }),
        _ => None,
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".ocr-overlay-rust"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn embedded_defaults_match_builtin() {
        let mut settings = Settings::default();
        settings.merge_toml(DEFAULT_SETTINGS_TOML).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn default_style_matches_render_defaults() {
        assert_eq!(Settings::default().render_style(), RenderStyle::default());
    }

    #[test]
    fn seeds_home_settings_and_layers_extra_file() {
        with_temp_home(|home| {
            let extra = home.join("extra.toml");
            fs::write(
                &extra,
                r##"
[ocr]
confidence_threshold = 0.7
timeout_secs = 4

[overlay]
mode = "inpaint"
text_alignment = "center"
background_color = "#10203080"
shadow_offset = [3.0, 1.0]

[paragraph]
clustering = "median"
extra_connectives = ["via"]
"##,
            )
            .unwrap();
            let settings = load_settings(Some(&extra)).unwrap();
            assert!(home.join(".ocr-overlay-rust/settings.toml").exists());
            assert_eq!(settings.ocr.confidence_threshold, 0.7);
            assert_eq!(settings.ocr_options().timeout, Duration::from_secs(4));
            assert_eq!(settings.paragraph.clustering, GapClustering::Median);
            assert_eq!(settings.paragraph.extra_connectives, ["via"]);

            let style = settings.render_style();
            assert_eq!(style.mode, OverlayMode::Inpaint);
            assert_eq!(style.alignment, TextAlign::Center);
            assert_eq!(style.background, BackgroundFill::Solid(Rgba([16, 32, 48, 128])));
            assert_eq!(style.box_shadow.offset, (3.0, 1.0));
        });
    }

    #[test]
    fn missing_extra_settings_file_is_an_error() {
        with_temp_home(|home| {
            let err = load_settings(Some(&home.join("missing.toml"))).unwrap_err();
            assert!(err.to_string().contains("settings file not found"));
        });
    }

    #[test]
    fn invalid_color_is_reported() {
        let mut settings = Settings::default();
        assert!(settings.merge_toml("[overlay]\ntext_color = \"red\"").is_err());
    }

    #[test]
    fn effects_map_onto_style() {
        let mut settings = Settings::default();
        settings
            .merge_toml(
                r##"
[text_effects]
stroke_width = 2.0
stroke_color = "#000000"
gradient_enabled = true
gradient_colors = ["#ffffff", "#808080", "#000000"]
bg_gradient_enabled = true
"##,
            )
            .unwrap();
        let style = settings.render_style();
        assert_eq!(
            style.stroke,
            Some(StrokeStyle {
                width: 2.0,
                color: Rgba::BLACK
            })
        );
        assert_eq!(
            style.text_gradient,
            Some(GradientStyle {
                top: Rgba::WHITE,
                bottom: Rgba::BLACK
            })
        );
        assert!(matches!(style.background, BackgroundFill::Gradient(_)));

        settings.merge_toml("[text_effects]\nblur_enabled = true\nblur_radius = 6.0").unwrap();
        assert!(matches!(
            settings.render_style().background,
            BackgroundFill::Blurred { radius, .. } if radius == 6.0
        ));
    }

    #[test]
    fn blank_font_entries_do_not_override() {
        let mut settings = Settings::default();
        settings.merge_toml("[fonts]\nprimary = \"/fonts/a.ttf\"").unwrap();
        settings.merge_toml("[fonts]\nprimary = \"  \"\nemoji = \"Noto Color Emoji\"").unwrap();
        let sources = settings.font_sources();
        assert_eq!(sources.primary.as_deref(), Some("/fonts/a.ttf"));
        assert_eq!(sources.emoji.as_deref(), Some("Noto Color Emoji"));
    }
}
