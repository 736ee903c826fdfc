mod parse;
mod preprocess;
mod tesseract;

use anyhow::{Result, anyhow};
use image::DynamicImage;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use super::LineDetection;

pub use tesseract::{TesseractEngine, list_tesseract_languages};

/// Black-box text recognizer. Implementations are driven from one thread at
/// a time through [`SharedOcrEngine`].
pub trait OcrEngine: Send {
    fn name(&self) -> &str;
    fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<LineDetection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrOptions {
    /// Longer side is scaled down to this before recognition.
    pub max_input_side: u32,
    pub timeout: Duration,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            max_input_side: 1600,
            timeout: Duration::from_secs(10),
        }
    }
}

/// The single recognizer instance, handed out per request.
#[derive(Clone)]
pub struct SharedOcrEngine {
    inner: Arc<Mutex<Box<dyn OcrEngine>>>,
    options: OcrOptions,
}

pub struct OcrGuard<'a> {
    engine: MutexGuard<'a, Box<dyn OcrEngine>>,
    options: OcrOptions,
}

impl OcrGuard<'_> {
    /// Recognizes lines in source-image coordinates.
    pub fn recognize(&mut self, image: &DynamicImage) -> Result<Vec<LineDetection>> {
        let (prepared, scale) = preprocess::prepare_for_ocr(image, self.options.max_input_side);
        let lines = self.engine.recognize(&prepared)?;
        Ok(preprocess::restore_scale(lines, scale))
    }
}

impl SharedOcrEngine {
    pub fn new(engine: impl OcrEngine + 'static, options: OcrOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(engine))),
            options,
        }
    }

    pub fn options(&self) -> OcrOptions {
        self.options
    }

    pub fn lock(&self) -> Result<OcrGuard<'_>> {
        let engine = self
            .inner
            .lock()
            .map_err(|_| anyhow!("ocr engine lock poisoned"))?;
        Ok(OcrGuard {
            engine,
            options: self.options,
        })
    }

    /// Blocking recognition; any failure yields no detections.
    pub fn recognize_blocking(&self, image: &DynamicImage) -> Vec<LineDetection> {
        let result = self.lock().and_then(|mut guard| {
            debug!("running ocr engine {}", guard.engine.name());
            guard.recognize(image)
        });
        match result {
            Ok(lines) => lines,
            Err(err) => {
                warn!("ocr failed, continuing without text: {:#}", err);
                Vec::new()
            }
        }
    }

    /// Runs recognition on the blocking pool, bounded by the configured
    /// timeout. A timed-out recognition yields no detections.
    pub async fn recognize(&self, image: Arc<DynamicImage>) -> Vec<LineDetection> {
        let engine = self.clone();
        let task = tokio::task::spawn_blocking(move || engine.recognize_blocking(&image));
        match tokio::time::timeout(self.options.timeout, task).await {
            Ok(Ok(lines)) => lines,
            Ok(Err(err)) => {
                warn!("ocr task failed: {}", err);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "ocr timed out after {}s, continuing without text",
                    self.options.timeout.as_secs_f32()
                );
                Vec::new()
            }
        }
    }
}
