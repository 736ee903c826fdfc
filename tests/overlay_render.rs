use image::{Rgba as Pixel, RgbaImage};
use ocr_overlay_rust::ocr::{
    BackgroundInpainter, EstimatedMetrics, FontChain, FontRequest, InpaintConfig, OverlayMode,
    OverlayRegion, OverlayRenderer, RenderStyle, TextLayoutEngine,
};
use usvg::fontdb;

const LONG_TOKEN: &str = "a very long untranslatable-supercalifragilisticexpialidocious-token";

fn renderer() -> OverlayRenderer {
    OverlayRenderer::with_fontdb(FontChain::empty(), fontdb::Database::new())
}

fn white(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Pixel([255, 255, 255, 255]))
}

/// White page with a few 2px black strokes standing in for glyphs.
fn page_with_strokes() -> RgbaImage {
    let mut image = white(120, 60);
    for x in (12..108).step_by(12) {
        for y in 18..42 {
            for dx in 0..2 {
                image.put_pixel(x + dx, y, Pixel([0, 0, 0, 255]));
            }
        }
    }
    for x in 10..110 {
        for dy in 0..2 {
            image.put_pixel(x, 30 + dy, Pixel([0, 0, 0, 255]));
        }
    }
    image
}

#[test]
fn long_token_is_force_split_within_width() {
    let engine = TextLayoutEngine::new(&EstimatedMetrics);
    let font = FontRequest::new(16.0);
    let layout = engine.layout(LONG_TOKEN, &font, 100.0);

    assert!(layout.lines.len() > 2);
    for line in &layout.lines {
        let width = engine.measure(&line.text, font.size);
        assert!(width <= 100.0, "{:?} is {}px wide", line.text, width);
    }
    let rebuilt = layout
        .lines
        .iter()
        .map(|line| line.text.replace(' ', ""))
        .collect::<String>();
    assert_eq!(rebuilt, LONG_TOKEN.replace(' ', ""));
}

#[test]
fn long_token_renders_into_region() {
    let source = white(300, 200);
    let outcome = renderer()
        .render(
            &source,
            OverlayRegion::new(0, 0, 200, 50),
            LONG_TOKEN,
            &RenderStyle::default(),
        )
        .expect("render");
    assert_eq!(outcome.region.width, 200);
    assert!(outcome.region.height >= 50);
    assert!(outcome.lines.len() > 1);
    assert_eq!(outcome.mode, OverlayMode::Box);
    // Inside the panel is darker, outside untouched.
    assert!(outcome.image.get_pixel(100, 25)[0] < 200);
    assert_eq!(outcome.image.get_pixel(290, 190), &Pixel([255, 255, 255, 255]));
}

#[test]
fn invalid_requests_fail_without_touching_source() {
    let source = page_with_strokes();
    let before = source.clone();
    let renderer = renderer();
    let style = RenderStyle::default();

    assert!(
        renderer
            .render(&source, OverlayRegion::new(0, 0, 100, 40), "   ", &style)
            .is_err()
    );
    assert!(
        renderer
            .render(&source, OverlayRegion::new(0, 0, 0, 40), "text", &style)
            .is_err()
    );
    assert!(
        renderer
            .render(&source, OverlayRegion::new(500, 500, 10, 10), "text", &style)
            .is_err()
    );
    let fallback =
        renderer.render_or_original(&source, OverlayRegion::new(0, 0, 0, 0), "text", &style);
    assert_eq!(fallback, before);
    assert_eq!(source, before);
}

#[test]
fn clean_twice_never_increases_residual() {
    let inpainter = BackgroundInpainter::new(InpaintConfig::default());
    let page = page_with_strokes();
    let original = inpainter.build_mask(&page).stroke_pixels();
    assert!(original > 0);

    let once = inpainter.clean(&page);
    let twice = inpainter.clean(&once);
    let residual_once = inpainter.build_mask(&once).stroke_pixels();
    let residual_twice = inpainter.build_mask(&twice).stroke_pixels();
    assert!(residual_once < original);
    assert!(residual_twice <= residual_once);
}

#[test]
fn inpaint_mode_erases_strokes_before_drawing() {
    let page = page_with_strokes();
    let style = RenderStyle {
        mode: OverlayMode::Inpaint,
        auto_expand: false,
        ..RenderStyle::default()
    };
    let outcome = renderer()
        .render(&page, OverlayRegion::new(0, 0, 120, 60), "Hola", &style)
        .expect("render");
    assert_eq!(outcome.mode, OverlayMode::Inpaint);
    // Light background after cleaning, so auto color picks black text.
    assert_eq!(outcome.text_color, ocr_overlay_rust::ocr::Rgba::BLACK);
}
