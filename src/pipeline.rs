use anyhow::{Result, anyhow};
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ocr::{
    LineDetection, OverlayRegion, OverlayRenderer, ParagraphAssembler, ParagraphSet, RenderStyle,
    SharedOcrEngine, quad_bbox,
};
use crate::translator::{ParagraphTranslator, translate_paragraphs};

/// One captured screen region.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub image: Arc<DynamicImage>,
    /// Where to draw; defaults to the box around the recognized text.
    pub region: Option<OverlayRegion>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub detections: Vec<LineDetection>,
    pub paragraphs: ParagraphSet,
    pub translated: ParagraphSet,
    pub region: Option<OverlayRegion>,
    pub image: RgbaImage,
    /// False when nothing was drawn and `image` is the untouched capture.
    pub rendered: bool,
}

#[derive(Debug)]
pub struct PipelineEvent {
    pub generation: u64,
    pub result: Result<PipelineOutput>,
}

pub struct PipelineRunner {
    ocr: SharedOcrEngine,
    assembler: Arc<ParagraphAssembler>,
    translator: Arc<dyn ParagraphTranslator>,
    renderer: Arc<OverlayRenderer>,
    style: RenderStyle,
    confidence_threshold: f32,
    generation: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

/// Receiving side of [`PipelineRunner::submit`]. Only events from the newest
/// submission (or newer) are yielded.
pub struct PipelineEvents {
    receiver: mpsc::UnboundedReceiver<PipelineEvent>,
    generation: Arc<AtomicU64>,
}

impl PipelineEvents {
    pub async fn next(&mut self) -> Option<PipelineEvent> {
        loop {
            let event = self.receiver.recv().await?;
            let latest = self.generation.load(Ordering::SeqCst);
            if event.generation < latest {
                debug!(
                    "dropping stale capture {} (latest {})",
                    event.generation, latest
                );
                continue;
            }
            return Some(event);
        }
    }
}

impl PipelineRunner {
    pub fn new(
        ocr: SharedOcrEngine,
        assembler: ParagraphAssembler,
        translator: Arc<dyn ParagraphTranslator>,
        renderer: OverlayRenderer,
        style: RenderStyle,
        confidence_threshold: f32,
    ) -> (Arc<Self>, PipelineEvents) {
        let (events, receiver) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let runner = Arc::new(Self {
            ocr,
            assembler: Arc::new(assembler),
            translator,
            renderer: Arc::new(renderer),
            style,
            confidence_threshold,
            generation: generation.clone(),
            events,
        });
        (
            runner,
            PipelineEvents {
                receiver,
                generation,
            },
        )
    }

    /// Starts a capture in the background and returns its generation.
    pub fn submit(self: &Arc<Self>, request: CaptureRequest) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let result = runner.process(request).await;
            if runner
                .events
                .send(PipelineEvent { generation, result })
                .is_err()
            {
                debug!("pipeline receiver closed, dropping capture {}", generation);
            }
        });
        generation
    }

    /// Capture → OCR → paragraphs → translation → overlay.
    pub async fn process(&self, request: CaptureRequest) -> Result<PipelineOutput> {
        let detections = self.ocr.recognize(request.image.clone()).await;
        self.process_detections(request, detections).await
    }

    /// Same as [`process`](Self::process) with detections supplied by the caller.
    pub async fn process_detections(
        &self,
        request: CaptureRequest,
        detections: Vec<LineDetection>,
    ) -> Result<PipelineOutput> {
        let source = request.image.to_rgba8();
        let paragraphs = self
            .assembler
            .assemble(&detections, self.confidence_threshold);
        info!(
            "{} detections assembled into {} paragraphs",
            detections.len(),
            paragraphs.len()
        );
        if paragraphs.is_empty() {
            return Ok(PipelineOutput {
                detections,
                paragraphs: paragraphs.clone(),
                translated: paragraphs,
                region: None,
                image: source,
                rendered: false,
            });
        }

        let translated = translate_paragraphs(self.translator.as_ref(), &paragraphs).await;
        let (width, height) = request.image.dimensions();
        let region = request
            .region
            .or_else(|| text_region(&detections, self.confidence_threshold))
            .unwrap_or(OverlayRegion::new(0, 0, width, height));

        let renderer = Arc::clone(&self.renderer);
        let style = self.style.clone();
        let text = translated.join();
        let rendered = tokio::task::spawn_blocking(move || {
            let result = renderer.render(&source, region, &text, &style);
            (source, result)
        })
        .await
        .map_err(|err| anyhow!("render task failed: {}", err))?;

        let (image, region, rendered) = match rendered {
            (_, Ok(outcome)) => (outcome.image, Some(outcome.region), true),
            (source, Err(err)) => {
                warn!("overlay skipped: {:#}", err);
                (source, Some(region), false)
            }
        };
        Ok(PipelineOutput {
            detections,
            paragraphs,
            translated,
            region,
            image,
            rendered,
        })
    }
}

/// Box around every detection that passes the confidence threshold.
pub fn text_region(detections: &[LineDetection], confidence_threshold: f32) -> Option<OverlayRegion> {
    let boxes = detections
        .iter()
        .filter(|line| line.confidence > confidence_threshold && !line.text.trim().is_empty())
        .map(|line| quad_bbox(&line.quad))
        .collect::<Vec<_>>();
    let x1 = boxes.iter().map(|b| b.x).min()?;
    let y1 = boxes.iter().map(|b| b.y).min()?;
    let x2 = boxes.iter().map(|b| b.x + b.w).max()?;
    let y2 = boxes.iter().map(|b| b.y + b.h).max()?;
    Some(OverlayRegion::new(x1, y1, x2 - x1, y2 - y1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{BBoxPx, FontChain, OcrEngine, OcrOptions};
    use crate::translator::IdentityTranslator;
    use usvg::fontdb;

    struct Scripted(Vec<LineDetection>);

    impl OcrEngine for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn recognize(&mut self, _image: &DynamicImage) -> Result<Vec<LineDetection>> {
            Ok(self.0.clone())
        }
    }

    fn line(text: &str, y: u32) -> LineDetection {
        LineDetection::from_bbox(text, BBoxPx { x: 20, y, w: 150, h: 16 }, 0.9)
    }

    fn runner(lines: Vec<LineDetection>) -> (Arc<PipelineRunner>, PipelineEvents) {
        PipelineRunner::new(
            SharedOcrEngine::new(Scripted(lines), OcrOptions::default()),
            ParagraphAssembler::new(),
            Arc::new(IdentityTranslator),
            OverlayRenderer::with_fontdb(FontChain::empty(), fontdb::Database::new()),
            RenderStyle::default(),
            0.5,
        )
    }

    fn capture() -> CaptureRequest {
        CaptureRequest {
            image: Arc::new(DynamicImage::new_rgba8(300, 200)),
            region: None,
        }
    }

    #[test]
    fn region_covers_confident_lines() {
        let mut weak = line("weak", 150);
        weak.confidence = 0.1;
        let region = text_region(&[line("a", 10), line("b", 40), weak], 0.5).expect("region");
        assert_eq!(region, OverlayRegion::new(20, 10, 150, 46));
        assert!(text_region(&[], 0.5).is_none());
    }

    #[tokio::test]
    async fn process_renders_paragraphs() {
        let (runner, _events) = runner(vec![
            line("Hello", 10),
            line("world.", 32),
            line("New topic here.", 90),
        ]);
        let output = runner.process(capture()).await.expect("process");
        assert_eq!(output.paragraphs.paragraphs(), ["Hello world.", "New topic here."]);
        assert_eq!(output.translated, output.paragraphs);
        assert!(output.rendered);
        assert_eq!(output.image.dimensions(), (300, 200));
    }

    #[tokio::test]
    async fn no_text_leaves_capture_untouched() {
        let (runner, _events) = runner(Vec::new());
        let output = runner.process(capture()).await.expect("process");
        assert!(!output.rendered);
        assert!(output.paragraphs.is_empty());
        assert_eq!(output.image, DynamicImage::new_rgba8(300, 200).to_rgba8());
    }

    #[tokio::test]
    async fn newest_capture_wins() {
        let (runner, mut events) = runner(vec![line("Only line", 10)]);
        let first = runner.submit(capture());
        let second = runner.submit(capture());
        assert!(second > first);
        let event = events.next().await.expect("event");
        assert_eq!(event.generation, second);
        assert!(event.result.is_ok());
    }
}
