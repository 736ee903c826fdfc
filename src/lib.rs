use anyhow::{Context, Result, anyhow, bail};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod settings;
#[cfg(test)]
mod test_util;
pub mod translator;

pub use pipeline::{CaptureRequest, PipelineEvent, PipelineEvents, PipelineOutput, PipelineRunner};
pub use settings::Settings;
pub use translator::{CommandTranslator, IdentityTranslator, ParagraphTranslator};

use ocr::{
    FontChain, LineDetection, OverlayMode, OverlayRegion, OverlayRenderer, SharedOcrEngine,
    TesseractEngine,
};

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Captured image to recognize and draw on.
    pub image: Option<PathBuf>,
    /// Detections as JSON, used instead of running OCR.
    pub lines: Option<PathBuf>,
    pub region: Option<OverlayRegion>,
    pub output: Option<PathBuf>,
    /// External translation command, e.g. `trans -b :ja`.
    pub translate_cmd: Option<String>,
    pub translate_timeout_secs: u64,
    pub mode: Option<String>,
    pub confidence_threshold: Option<f32>,
    pub settings_path: Option<String>,
    pub json: bool,
    pub show_ocr_languages: bool,
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;

    if config.show_ocr_languages {
        let languages = ocr::list_tesseract_languages()?;
        return Ok(languages.join("\n"));
    }

    apply_overrides(&mut settings, &config)?;
    let threshold = settings.ocr.confidence_threshold;

    let image = config
        .image
        .as_deref()
        .map(load_image)
        .transpose()?
        .map(Arc::new);
    let detections = match &config.lines {
        Some(path) => Some(read_detections(path)?),
        None => None,
    };
    if image.is_none() && detections.is_none() {
        bail!("either --image or --lines is required");
    }
    if config.output.is_some() && image.is_none() {
        bail!("--out requires --image");
    }

    let paragraph_translator = build_translator(&config)?;
    info!("translator: {}", paragraph_translator.name());

    let Some(image) = image else {
        let detections = detections.unwrap_or_default();
        let paragraphs = settings.assembler().assemble(&detections, threshold);
        let translated = translator::translate_paragraphs(paragraph_translator.as_ref(), &paragraphs).await;
        return if config.json {
            let value = serde_json::json!({
                "paragraphs": paragraphs,
                "translated": translated,
            });
            Ok(serde_json::to_string_pretty(&value)?)
        } else {
            Ok(translated.join())
        };
    };

    let engine = SharedOcrEngine::new(
        TesseractEngine::new(settings.ocr.languages.clone(), settings.ocr.psm),
        settings.ocr_options(),
    );
    let fonts = FontChain::load(
        &settings.font_sources(),
        settings.overlay.font_family.as_deref(),
    );
    let renderer = OverlayRenderer::new(fonts);
    let (runner, _events) = PipelineRunner::new(
        engine,
        settings.assembler(),
        paragraph_translator,
        renderer,
        settings.render_style(),
        threshold,
    );
    let request = CaptureRequest {
        image,
        region: config.region,
    };
    let output = match detections {
        Some(detections) => runner.process_detections(request, detections).await?,
        None => runner.process(request).await?,
    };

    if let Some(path) = &config.output {
        save_image(&output.image, path)?;
        info!("wrote overlay to {}", path.display());
    }

    if config.json {
        let value = serde_json::json!({
            "paragraphs": output.paragraphs,
            "translated": output.translated,
            "region": output.region,
            "rendered": output.rendered,
        });
        Ok(serde_json::to_string_pretty(&value)?)
    } else {
        Ok(output.translated.join())
    }
}

fn apply_overrides(settings: &mut Settings, config: &Config) -> Result<()> {
    if let Some(mode) = config.mode.as_deref() {
        settings.overlay.mode = match mode.trim().to_ascii_lowercase().as_str() {
            "box" => OverlayMode::Box,
            "inpaint" => OverlayMode::Inpaint,
            other => bail!("unknown overlay mode '{}': expected box or inpaint", other),
        };
    }
    if let Some(threshold) = config.confidence_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("confidence threshold must be between 0 and 1, got {}", threshold);
        }
        settings.ocr.confidence_threshold = threshold;
    }
    Ok(())
}

fn build_translator(config: &Config) -> Result<Arc<dyn ParagraphTranslator>> {
    let Some(command) = config.translate_cmd.as_deref() else {
        return Ok(Arc::new(IdentityTranslator));
    };
    let timeout = Duration::from_secs(config.translate_timeout_secs.max(1));
    Ok(Arc::new(CommandTranslator::parse(command, timeout)?))
}

fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("failed to read image: {}", path.display()))
}

/// Reads detections written as a JSON array of `{text, quad, confidence}`.
pub fn read_detections(path: &Path) -> Result<Vec<LineDetection>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read detections: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse detections: {}", path.display()))
}

fn save_image(image: &image::RgbaImage, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| anyhow!("output path has no extension: {}", path.display()))?;
    let result = match extension.as_str() {
        // JPEG has no alpha channel.
        "jpg" | "jpeg" => DynamicImage::ImageRgba8(image.clone()).to_rgb8().save(path),
        _ => image.save(path),
    };
    result.with_context(|| format!("failed to write image: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    const DETECTIONS: &str = r#"[
        {"text": "Hello", "confidence": 0.9,
         "quad": [{"x": 10, "y": 10}, {"x": 80, "y": 10}, {"x": 80, "y": 30}, {"x": 10, "y": 30}]},
        {"text": "world.", "confidence": 0.9,
         "quad": [{"x": 10, "y": 32}, {"x": 80, "y": 32}, {"x": 80, "y": 52}, {"x": 10, "y": 52}]},
        {"text": "noise", "confidence": 0.1,
         "quad": [{"x": 10, "y": 60}, {"x": 80, "y": 60}, {"x": 80, "y": 80}, {"x": 10, "y": 80}]}
    ]"#;

    #[test]
    fn assembles_detections_without_image() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let lines = dir.path().join("lines.json");
        fs::write(&lines, DETECTIONS).unwrap();
        let output = with_temp_home(|_| {
            runtime.block_on(run(Config {
                lines: Some(lines.clone()),
                ..Config::default()
            }))
        });
        assert_eq!(output.unwrap(), "Hello world.");
    }

    #[test]
    fn rejects_missing_inputs_and_bad_overrides() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        with_temp_home(|_| {
            let err = runtime.block_on(run(Config::default())).unwrap_err();
            assert!(err.to_string().contains("--image or --lines"));
        });

        let mut settings = Settings::default();
        let config = Config {
            mode: Some("sparkle".to_string()),
            ..Config::default()
        };
        assert!(apply_overrides(&mut settings, &config).is_err());
        let config = Config {
            mode: Some("Inpaint".to_string()),
            confidence_threshold: Some(0.25),
            ..Config::default()
        };
        apply_overrides(&mut settings, &config).unwrap();
        assert_eq!(settings.overlay.mode, OverlayMode::Inpaint);
        assert_eq!(settings.ocr.confidence_threshold, 0.25);
    }

    #[test]
    fn renders_detections_onto_image() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let lines = dir.path().join("lines.json");
        let capture = dir.path().join("capture.png");
        let out = dir.path().join("overlay.png");
        fs::write(&lines, DETECTIONS).unwrap();
        image::RgbaImage::from_pixel(200, 120, image::Rgba([240, 240, 240, 255]))
            .save(&capture)
            .unwrap();

        let json = with_temp_home(|_| {
            runtime.block_on(run(Config {
                image: Some(capture.clone()),
                lines: Some(lines.clone()),
                output: Some(out.clone()),
                json: true,
                ..Config::default()
            }))
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["paragraphs"], serde_json::json!(["Hello world."]));
        assert_eq!(value["rendered"], serde_json::json!(true));
        assert_eq!(image::open(&out).unwrap().to_rgba8().dimensions(), (200, 120));
    }
}
