use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::io::Write;
use std::process::Command;
use tracing::{debug, warn};

use super::OcrEngine;
use super::parse::parse_tsv_lines;
use super::preprocess::grayscale_for_ocr;
use crate::ocr::LineDetection;

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect())
}

/// Recognizer backed by the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    languages: String,
    psm: u32,
    resolved: Option<String>,
}

impl TesseractEngine {
    pub fn new(languages: impl Into<String>, psm: u32) -> Self {
        Self {
            languages: languages.into(),
            psm,
            resolved: None,
        }
    }

    fn languages(&mut self) -> Result<String> {
        if let Some(resolved) = &self.resolved {
            return Ok(resolved.clone());
        }
        let resolved = normalize_ocr_languages(&self.languages)?;
        self.resolved = Some(resolved.clone());
        Ok(resolved)
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<LineDetection>> {
        let languages = self.languages()?;
        let gray = DynamicImage::ImageLuma8(grayscale_for_ocr(image));
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        gray.write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        let tsv = run_tesseract_tsv(tmp.path(), &languages, self.psm)?;
        let lines = parse_tsv_lines(&tsv)?;
        debug!("tesseract returned {} lines (psm {})", lines.len(), self.psm);
        Ok(lines)
    }
}

fn normalize_ocr_languages(requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }

    let available = match list_tesseract_languages() {
        Ok(list) => list,
        Err(_) => return Ok(trimmed.to_string()),
    };

    let (chosen, missing): (Vec<&str>, Vec<&str>) = trimmed
        .split(['+', ',', ' '])
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .partition(|lang| available.iter().any(|value| value == lang));

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }

    Ok(chosen.join("+"))
}

fn run_tesseract_tsv(path: &std::path::Path, languages: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("--dpi")
        .arg("300")
        .arg("tsv")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
