use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ocr_overlay_rust::ocr::OverlayRegion;

#[derive(Parser, Debug)]
#[command(
    name = "ocr-overlay-rust",
    version,
    about = "Rebuild paragraphs from OCR lines and draw the translation over the capture"
)]
struct Cli {
    /// Captured image to recognize and draw on
    #[arg(short = 'i', long = "image")]
    image: Option<PathBuf>,

    /// Detections as JSON ([{text, quad, confidence}]) instead of running tesseract
    #[arg(short = 'j', long = "lines")]
    lines: Option<PathBuf>,

    /// Overlay region as x,y,width,height (default: box around the text)
    #[arg(short = 'g', long = "region")]
    region: Option<String>,

    /// Write the rendered overlay to this image file
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// Command that translates stdin to stdout, run once per paragraph
    #[arg(short = 't', long = "translate-cmd")]
    translate_cmd: Option<String>,

    /// Seconds to wait for the translate command
    #[arg(long = "translate-timeout", default_value_t = 30)]
    translate_timeout: u64,

    /// Overlay mode: box or inpaint (overrides settings)
    #[arg(short = 'm', long = "mode")]
    mode: Option<String>,

    /// Minimum OCR confidence, 0..1 (overrides settings)
    #[arg(short = 'c', long = "confidence")]
    confidence: Option<f32>,

    /// Print paragraphs, translations and the drawn region as JSON
    #[arg(long = "json")]
    json: bool,

    /// Show installed tesseract languages and exit
    #[arg(long = "show-ocr-languages")]
    show_ocr_languages: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ocr_overlay_rust::logging::init(cli.verbose)?;

    let region = cli
        .region
        .as_deref()
        .map(str::parse::<OverlayRegion>)
        .transpose()?;
    let config = ocr_overlay_rust::Config {
        image: cli.image,
        lines: cli.lines,
        region,
        output: cli.out,
        translate_cmd: cli.translate_cmd,
        translate_timeout_secs: cli.translate_timeout,
        mode: cli.mode,
        confidence_threshold: cli.confidence,
        settings_path: cli.read_settings,
        json: cli.json,
        show_ocr_languages: cli.show_ocr_languages,
    };

    let output = ocr_overlay_rust::run(config).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
