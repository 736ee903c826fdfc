use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::font::FontRequest;
use super::inpaint::InpaintConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    #[default]
    Box,
    Inpaint,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    pub fn with_alpha(self, alpha: u8) -> Self {
        let [r, g, b, _] = self.0;
        Self([r, g, b, alpha])
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    /// `#rrggbb`, without alpha.
    pub fn hex(&self) -> String {
        let [r, g, b, _] = self.0;
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    pub fn opacity(&self) -> f32 {
        self.0[3] as f32 / 255.0
    }

    /// Rec. 601 luma.
    pub fn luminance(&self) -> f32 {
        let [r, g, b, _] = self.0;
        0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
    }
}

impl FromStr for Rgba {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            "transparent" => return Ok(Self([0, 0, 0, 0])),
            _ => {}
        }
        let hex = trimmed
            .strip_prefix('#')
            .ok_or_else(|| anyhow!("invalid color '{}': expected #rrggbb", value))?;
        let digit = |idx: usize| -> Result<u8> {
            hex.get(idx..idx + 1)
                .and_then(|d| u8::from_str_radix(d, 16).ok())
                .ok_or_else(|| anyhow!("invalid color '{}'", value))
        };
        let pair = |idx: usize| -> Result<u8> {
            hex.get(idx..idx + 2)
                .and_then(|d| u8::from_str_radix(d, 16).ok())
                .ok_or_else(|| anyhow!("invalid color '{}'", value))
        };
        match hex.len() {
            3 => Ok(Self([digit(0)? * 17, digit(1)? * 17, digit(2)? * 17, 255])),
            6 => Ok(Self([pair(0)?, pair(2)?, pair(4)?, 255])),
            8 => Ok(Self([pair(0)?, pair(2)?, pair(4)?, pair(6)?])),
            _ => Err(anyhow!("invalid color '{}': expected #rrggbb", value)),
        }
    }
}

impl TryFrom<String> for Rgba {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Rgba> for String {
    fn from(value: Rgba) -> Self {
        let [r, g, b, a] = value.0;
        format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowStyle {
    pub enabled: bool,
    pub color: Rgba,
    pub offset: (f32, f32),
    pub blur: f32,
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self {
            enabled: false,
            color: Rgba([0, 0, 0, 128]),
            offset: (2.0, 2.0),
            blur: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub width: f32,
    pub color: Rgba,
}

/// Vertical two-stop gradient, top color first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStyle {
    pub top: Rgba,
    pub bottom: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackgroundFill {
    Solid(Rgba),
    Gradient(GradientStyle),
    /// Blurred copy of the underlying pixels, tinted with the color.
    Blurred { radius: f32, tint: Rgba },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    pub mode: OverlayMode,
    pub font: FontRequest,
    pub min_font_size: f32,
    pub padding: u32,
    pub alignment: TextAlign,
    pub auto_expand: bool,
    pub text_color: Rgba,
    pub auto_text_color: bool,
    pub background: BackgroundFill,
    pub corner_radius: f32,
    pub border_width: f32,
    pub border_color: Rgba,
    pub box_shadow: ShadowStyle,
    pub text_shadow: ShadowStyle,
    pub stroke: Option<StrokeStyle>,
    pub text_gradient: Option<GradientStyle>,
    pub inpaint: InpaintConfig,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            mode: OverlayMode::Box,
            font: FontRequest::new(16.0),
            min_font_size: 8.0,
            padding: 10,
            alignment: TextAlign::Left,
            auto_expand: true,
            text_color: Rgba::WHITE,
            auto_text_color: true,
            background: BackgroundFill::Solid(Rgba([0, 0, 0, 200])),
            corner_radius: 5.0,
            border_width: 0.0,
            border_color: Rgba::WHITE,
            box_shadow: ShadowStyle::default(),
            text_shadow: ShadowStyle::default(),
            stroke: None,
            text_gradient: None,
            inpaint: InpaintConfig::default(),
        }
    }
}

impl RenderStyle {
    /// Drop shadow on glyphs; never drawn over an inpainted background.
    pub fn text_shadow_active(&self) -> Option<&ShadowStyle> {
        (self.mode == OverlayMode::Box && self.text_shadow.enabled).then_some(&self.text_shadow)
    }

    pub fn stroke_active(&self) -> Option<&StrokeStyle> {
        if self.mode == OverlayMode::Inpaint {
            return None;
        }
        self.stroke.as_ref().filter(|stroke| stroke.width > 0.0)
    }

    pub fn box_style(&self) -> Self {
        Self {
            mode: OverlayMode::Box,
            ..self.clone()
        }
    }
}
