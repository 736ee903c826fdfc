use anyhow::{Context, Result, anyhow, bail};
use image::RgbaImage;
use resvg::render;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::{debug, warn};
use usvg::{Options, Tree, fontdb};

use super::OverlayRegion;
use super::font::{FontChain, FontRole};
use super::inpaint::BackgroundInpainter;
use super::layout::{TextLayout, TextLayoutEngine, WrappedLine};
use super::style::{BackgroundFill, OverlayMode, RenderStyle, Rgba, TextAlign};
use super::text::is_emoji;

const AUTO_COLOR_LUMINANCE: f32 = 140.0;
const FALLBACK_FAMILY: &str = "sans-serif";

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub image: RgbaImage,
    /// Final region after auto-expand.
    pub region: OverlayRegion,
    pub font_size: f32,
    /// Mode actually drawn; inpaint degrades to box on failure.
    pub mode: OverlayMode,
    pub text_color: Rgba,
    pub lines: Vec<WrappedLine>,
}

pub struct OverlayRenderer {
    chain: FontChain,
    fontdb: Arc<fontdb::Database>,
}

impl OverlayRenderer {
    /// Uses the system fonts plus every font loaded into the chain.
    pub fn new(chain: FontChain) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        Self::with_fontdb(chain, db)
    }

    pub fn with_fontdb(chain: FontChain, mut db: fontdb::Database) -> Self {
        for font in chain.loaded() {
            db.load_font_data(font.data().to_vec());
        }
        Self {
            chain,
            fontdb: Arc::new(db),
        }
    }

    pub fn chain(&self) -> &FontChain {
        &self.chain
    }

    /// Draws `text` over `region`. On error the source is left untouched.
    pub fn render(
        &self,
        source: &RgbaImage,
        region: OverlayRegion,
        text: &str,
        style: &RenderStyle,
    ) -> Result<RenderOutcome> {
        if text.trim().is_empty() {
            bail!("overlay text is empty");
        }
        if region.is_degenerate() {
            bail!(
                "overlay region {}x{} is empty",
                region.width,
                region.height
            );
        }
        let (canvas_w, canvas_h) = source.dimensions();
        let mut region = region.clamp_to(canvas_w, canvas_h).ok_or_else(|| {
            anyhow!(
                "overlay region at ({}, {}) lies outside the {}x{} image",
                region.x,
                region.y,
                canvas_w,
                canvas_h
            )
        })?;

        let padding = style.padding.min(region.width / 2).min(region.height / 2);
        let inner_w = region.width.saturating_sub(padding * 2).max(1) as f32;
        let engine = TextLayoutEngine::new(&self.chain);
        let layout = if style.auto_expand {
            let layout = engine.layout(text, &style.font, inner_w);
            let required = layout.total_height.ceil() as u32 + padding * 2;
            region = region.expand_to_height(required, canvas_h);
            layout
        } else {
            let inner_h = region.height.saturating_sub(padding * 2) as f32;
            engine.fit_font_size(text, &style.font, inner_w, inner_h, style.min_font_size)
        };
        debug!(
            "overlay layout: {} lines at {:.1}px in {}x{}",
            layout.lines.len(),
            layout.font_size,
            region.width,
            region.height
        );

        let mut canvas = source.clone();
        let mut mode = style.mode;
        let mut text_color = style.text_color;
        if mode == OverlayMode::Inpaint {
            let patch = image::imageops::crop_imm(source, region.x, region.y, region.width, region.height)
                .to_image();
            match BackgroundInpainter::new(style.inpaint).try_clean(&patch) {
                Ok(outcome) => {
                    if outcome.fallback_applied {
                        debug!("inpaint quality gate blended a median blur");
                    }
                    if style.auto_text_color {
                        text_color = contrasting_text_color(&outcome.image);
                    }
                    image::imageops::replace(
                        &mut canvas,
                        &outcome.image,
                        region.x as i64,
                        region.y as i64,
                    );
                }
                Err(err) => {
                    warn!("inpaint failed, drawing a box instead: {:#}", err);
                    mode = OverlayMode::Box;
                }
            }
        }
        let effective = if mode == style.mode {
            style.clone()
        } else {
            style.box_style()
        };

        if mode == OverlayMode::Box {
            if let BackgroundFill::Blurred { radius, .. } = effective.background {
                let patch = image::imageops::crop_imm(&canvas, region.x, region.y, region.width, region.height)
                    .to_image();
                let blurred = imageproc::filter::gaussian_blur_f32(&patch, radius.max(0.1));
                image::imageops::replace(&mut canvas, &blurred, region.x as i64, region.y as i64);
            }
        }

        let svg = self.overlay_svg(
            canvas_w,
            canvas_h,
            region,
            padding,
            &layout,
            &effective,
            mode,
            text_color,
        );
        let layer = self.rasterize(&svg)?;
        image::imageops::overlay(&mut canvas, &layer, 0, 0);

        Ok(RenderOutcome {
            image: canvas,
            region,
            font_size: layout.font_size,
            mode,
            text_color,
            lines: layout.lines,
        })
    }

    /// Any failure degrades to "no overlay applied".
    pub fn render_or_original(
        &self,
        source: &RgbaImage,
        region: OverlayRegion,
        text: &str,
        style: &RenderStyle,
    ) -> RgbaImage {
        match self.render(source, region, text, style) {
            Ok(outcome) => outcome.image,
            Err(err) => {
                warn!("overlay skipped: {:#}", err);
                source.clone()
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn overlay_svg(
        &self,
        canvas_w: u32,
        canvas_h: u32,
        region: OverlayRegion,
        padding: u32,
        layout: &TextLayout,
        style: &RenderStyle,
        mode: OverlayMode,
        text_color: Rgba,
    ) -> String {
        let OverlayRegion {
            x,
            y,
            width,
            height,
        } = region;
        let mut defs = String::new();
        let mut body = String::new();

        defs.push_str(&format!(
            r#"<clipPath id="overlay-clip"><rect x="{x}" y="{y}" width="{w}" height="{h}"/></clipPath>"#,
            x = x,
            y = y,
            w = width,
            h = height
        ));

        if mode == OverlayMode::Box {
            let radius = style.corner_radius.max(0.0);
            let shadow = &style.box_shadow;
            if shadow.enabled {
                defs.push_str(&format!(
                    r#"<filter id="box-shadow" x="-50%" y="-50%" width="200%" height="200%"><feGaussianBlur stdDeviation="{blur}"/></filter>"#,
                    blur = shadow.blur.max(0.0)
                ));
                body.push_str(&format!(
                    r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" rx="{r}" fill="{fill}" fill-opacity="{op}" filter="url(#box-shadow)"/>"#,
                    x = x as f32 + shadow.offset.0,
                    y = y as f32 + shadow.offset.1,
                    w = width,
                    h = height,
                    r = radius,
                    fill = shadow.color.hex(),
                    op = shadow.color.opacity()
                ));
            }

            let fill = match style.background {
                BackgroundFill::Solid(color) => {
                    format!(r#"fill="{}" fill-opacity="{}""#, color.hex(), color.opacity())
                }
                BackgroundFill::Gradient(gradient) => {
                    defs.push_str(&format!(
                        r#"<linearGradient id="bg-gradient" x1="0" y1="0" x2="0" y2="1"><stop offset="0" stop-color="{top}" stop-opacity="{top_op}"/><stop offset="1" stop-color="{bottom}" stop-opacity="{bottom_op}"/></linearGradient>"#,
                        top = gradient.top.hex(),
                        top_op = gradient.top.opacity(),
                        bottom = gradient.bottom.hex(),
                        bottom_op = gradient.bottom.opacity()
                    ));
                    r#"fill="url(#bg-gradient)""#.to_string()
                }
                BackgroundFill::Blurred { tint, .. } => {
                    format!(r#"fill="{}" fill-opacity="{}""#, tint.hex(), tint.opacity())
                }
            };
            body.push_str(&format!(
                r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" rx="{r}" {fill}/>"#,
                x = x,
                y = y,
                w = width,
                h = height,
                r = radius,
                fill = fill
            ));

            if style.border_width > 0.0 {
                let half = style.border_width / 2.0;
                body.push_str(&format!(
                    r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" rx="{r}" fill="none" stroke="{color}" stroke-opacity="{op}" stroke-width="{sw}"/>"#,
                    x = x as f32 + half,
                    y = y as f32 + half,
                    w = (width as f32 - style.border_width).max(0.0),
                    h = (height as f32 - style.border_width).max(0.0),
                    r = radius,
                    color = style.border_color.hex(),
                    op = style.border_color.opacity(),
                    sw = style.border_width
                ));
            }
        }

        let font_size = layout.font_size;
        let advance = layout.line_advance(&self.chain);
        let block_top = y as f32 + padding as f32;
        let block_bottom = block_top + layout.total_height;
        let (anchor_x, anchor) = match style.alignment {
            TextAlign::Left => ((x + padding) as f32, "start"),
            TextAlign::Center => (x as f32 + width as f32 / 2.0, "middle"),
            TextAlign::Right => ((x + width).saturating_sub(padding) as f32, "end"),
        };

        let text_fill = match &style.text_gradient {
            Some(gradient) => {
                defs.push_str(&format!(
                    r#"<linearGradient id="text-gradient" gradientUnits="userSpaceOnUse" x1="0" y1="{y1}" x2="0" y2="{y2}"><stop offset="0" stop-color="{top}"/><stop offset="1" stop-color="{bottom}"/></linearGradient>"#,
                    y1 = block_top,
                    y2 = block_bottom,
                    top = gradient.top.hex(),
                    bottom = gradient.bottom.hex()
                ));
                r#"fill="url(#text-gradient)""#.to_string()
            }
            None => format!(
                r#"fill="{}" fill-opacity="{}""#,
                text_color.hex(),
                text_color.opacity()
            ),
        };

        let text_shadow = style.text_shadow_active().copied();
        if let Some(shadow) = &text_shadow {
            if shadow.blur > 0.0 {
                defs.push_str(&format!(
                    r#"<filter id="text-shadow" x="-20%" y="-20%" width="140%" height="140%"><feGaussianBlur stdDeviation="{}"/></filter>"#,
                    shadow.blur
                ));
            }
        }
        let stroke = style.stroke_active().copied();

        let mut shadow_block = String::new();
        let mut text_block = String::new();
        let mut baseline = block_top + font_size;
        for line in &layout.lines {
            if !line.is_separator() {
                let runs = self.font_runs(&line.text, style.font.family.as_deref());
                if let Some(shadow) = &text_shadow {
                    shadow_block.push_str(&format!(
                        r#"<text x="{x}" y="{y}" font-size="{size}" text-anchor="{anchor}" fill="{fill}" fill-opacity="{op}" xml:space="preserve">"#,
                        x = anchor_x + shadow.offset.0,
                        y = baseline + shadow.offset.1,
                        size = font_size,
                        anchor = anchor,
                        fill = shadow.color.hex(),
                        op = shadow.color.opacity()
                    ));
                    for run in &runs {
                        // Emoji keep their advance but are not shadowed.
                        let hidden = if run.emoji { r#" fill-opacity="0""# } else { "" };
                        shadow_block.push_str(&format!(
                            r#"<tspan font-family="{family}"{hidden}>{text}</tspan>"#,
                            family = escape_xml(&run.family),
                            hidden = hidden,
                            text = escape_xml(&run.text)
                        ));
                    }
                    shadow_block.push_str("</text>");
                }

                text_block.push_str(&format!(
                    r#"<text x="{x}" y="{y}" font-size="{size}" text-anchor="{anchor}" {fill} xml:space="preserve">"#,
                    x = anchor_x,
                    y = baseline,
                    size = font_size,
                    anchor = anchor,
                    fill = text_fill
                ));
                for run in &runs {
                    let outline = match (&stroke, run.emoji) {
                        (Some(stroke), false) => format!(
                            r#" stroke="{}" stroke-opacity="{}" stroke-width="{}" paint-order="stroke" stroke-linejoin="round""#,
                            stroke.color.hex(),
                            stroke.color.opacity(),
                            stroke.width
                        ),
                        _ => String::new(),
                    };
                    text_block.push_str(&format!(
                        r#"<tspan font-family="{family}"{outline}>{text}</tspan>"#,
                        family = escape_xml(&run.family),
                        outline = outline,
                        text = escape_xml(&run.text)
                    ));
                }
                text_block.push_str("</text>");
            }
            baseline += advance;
        }

        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = canvas_w,
            h = canvas_h
        ));
        svg.push_str(&format!("<defs>{}</defs>", defs));
        svg.push_str(&body);
        if !shadow_block.is_empty() {
            let filter = if text_shadow.is_some_and(|s| s.blur > 0.0) {
                r#" filter="url(#text-shadow)""#
            } else {
                ""
            };
            svg.push_str(&format!(
                r#"<g clip-path="url(#overlay-clip)"><g{}>{}</g></g>"#,
                filter, shadow_block
            ));
        }
        svg.push_str(&format!(r#"<g clip-path="url(#overlay-clip)">{}</g>"#, text_block));
        svg.push_str("</svg>");
        svg
    }

    /// Splits a line into runs that share one font of the fallback chain.
    fn font_runs(&self, text: &str, requested: Option<&str>) -> Vec<FontRun> {
        let mut runs: Vec<FontRun> = Vec::new();
        for ch in text.chars() {
            let role = self.chain.role_for(ch);
            let emoji = is_emoji(ch);
            match runs.last_mut() {
                Some(run) if run.role == role && run.emoji == emoji => run.text.push(ch),
                _ => {
                    let family = self
                        .chain
                        .family(role)
                        .or(requested)
                        .unwrap_or(FALLBACK_FAMILY)
                        .to_string();
                    runs.push(FontRun {
                        role,
                        emoji,
                        family,
                        text: ch.to_string(),
                    });
                }
            }
        }
        runs
    }

    fn rasterize(&self, svg: &str) -> Result<RgbaImage> {
        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse overlay SVG")?;
        let size = tree.size().to_int_size();
        let mut pixmap =
            Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
        render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

        let mut data = Vec::with_capacity(pixmap.data().len());
        for pixel in pixmap.pixels() {
            let color = pixel.demultiply();
            data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
        RgbaImage::from_raw(size.width(), size.height(), data)
            .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
    }
}

struct FontRun {
    role: FontRole,
    emoji: bool,
    family: String,
    text: String,
}

/// White on dark backgrounds, black on light ones.
fn contrasting_text_color(background: &RgbaImage) -> Rgba {
    let mut lumas = background
        .pixels()
        .map(|pixel| Rgba(pixel.0).luminance())
        .collect::<Vec<_>>();
    if lumas.is_empty() {
        return Rgba::BLACK;
    }
    lumas.sort_by(f32::total_cmp);
    let median = lumas[lumas.len() / 2];
    if median < AUTO_COLOR_LUMINANCE {
        Rgba::WHITE
    } else {
        Rgba::BLACK
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
