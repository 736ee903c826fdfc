use anyhow::{Context, Result};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{self, Mask};
use serde::Deserialize;
use tracing::{debug, warn};

use super::fill::{diffusion_fill, fast_march_fill};

const CANNY_LOW: f32 = 60.0;
const CANNY_HIGH: f32 = 180.0;
const HAT_WEIGHT: f32 = 0.6;
const ENHANCED_WEIGHT: f32 = 0.8;
const GRADIENT_WEIGHT: f32 = 0.2;
/// Edge-preserving smoothing window and sigmas (color, spatial).
const SMOOTH_WINDOW: u32 = 5;
const SMOOTH_SIGMA: f32 = 30.0;
/// Lower bound on the Otsu level. Otsu splits any histogram, so without it
/// a near-flat region (or a freshly filled one) gets its faint texture
/// masked as strokes.
const MIN_STROKE_CONTRAST: u8 = 8;
const RESIDUAL_STROKE_RATIO: f32 = 0.3;
const RESIDUAL_AREA_RATIO: f32 = 0.015;
const FALLBACK_BLEND: f32 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InpaintConfig {
    /// Neighborhood radius for the fast-marching fill.
    pub radius: u32,
    /// Structuring element radius for mask detection and over-cover.
    pub dilation: u8,
}

impl Default for InpaintConfig {
    fn default() -> Self {
        Self {
            radius: 3,
            dilation: 2,
        }
    }
}

/// Per-pixel "likely glyph" classification, 255 where masked.
#[derive(Debug, Clone)]
pub struct TextMask {
    mask: GrayImage,
}

impl TextMask {
    pub fn from_image(mask: GrayImage) -> Self {
        Self { mask }
    }

    pub fn is_masked(&self, x: u32, y: u32) -> bool {
        self.mask.get_pixel(x, y).0[0] > 0
    }

    pub fn stroke_pixels(&self) -> u64 {
        self.mask.pixels().filter(|p| p.0[0] > 0).count() as u64
    }

    /// Masked fraction of the region, 0 for an empty region.
    pub fn coverage(&self) -> f32 {
        let area = self.mask.width() as u64 * self.mask.height() as u64;
        if area == 0 {
            return 0.0;
        }
        self.stroke_pixels() as f32 / area as f32
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.mask
    }
}

#[derive(Debug, Clone)]
pub struct InpaintOutcome {
    pub image: RgbaImage,
    pub stroke_pixels: u64,
    pub residual_pixels: u64,
    pub fallback_applied: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundInpainter {
    config: InpaintConfig,
}

impl BackgroundInpainter {
    pub fn new(config: InpaintConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> InpaintConfig {
        self.config
    }

    pub fn build_mask(&self, region: &RgbaImage) -> TextMask {
        let (width, height) = region.dimensions();
        if width == 0 || height == 0 {
            return TextMask::from_image(GrayImage::new(width, height));
        }
        let k = self.config.dilation.max(1);
        let gray = image::imageops::grayscale(region);
        let smooth =
            imageproc::filter::bilateral_filter(&gray, SMOOTH_WINDOW, SMOOTH_SIGMA, SMOOTH_SIGMA);

        let element = Mask::square(k);
        let opened = morphology::grayscale_open(&smooth, &element);
        let closed = morphology::grayscale_close(&smooth, &element);
        let dilated = morphology::grayscale_dilate(&smooth, &element);
        let eroded = morphology::grayscale_erode(&smooth, &element);

        let mut enhanced = GrayImage::new(width, height);
        for (x, y, out) in enhanced.enumerate_pixels_mut() {
            let value = smooth.get_pixel(x, y).0[0];
            let top_hat = value.saturating_sub(opened.get_pixel(x, y).0[0]) as f32;
            let black_hat = closed.get_pixel(x, y).0[0].saturating_sub(value) as f32;
            let gradient = dilated
                .get_pixel(x, y)
                .0[0]
                .saturating_sub(eroded.get_pixel(x, y).0[0]) as f32;
            let hats = (top_hat * HAT_WEIGHT + black_hat * HAT_WEIGHT).min(255.0);
            let blended = hats * ENHANCED_WEIGHT + gradient * GRADIENT_WEIGHT;
            *out = Luma([blended.round().clamp(0.0, 255.0) as u8]);
        }

        let edges = imageproc::edges::canny(&smooth, CANNY_LOW, CANNY_HIGH);
        let level = imageproc::contrast::otsu_level(&enhanced).max(MIN_STROKE_CONTRAST);

        let mut mask = GrayImage::new(width, height);
        for (x, y, out) in mask.enumerate_pixels_mut() {
            let stroke = enhanced.get_pixel(x, y).0[0] > level;
            let edge = edges.get_pixel(x, y).0[0] > 0;
            if stroke || edge {
                *out = Luma([255]);
            }
        }
        let mask = morphology::dilate(&mask, Norm::LInf, k);
        let mask = morphology::close(&mask, Norm::LInf, k);
        TextMask::from_image(mask)
    }

    /// Removes glyph pixels. Never fails: on any error the region comes back
    /// unchanged.
    pub fn clean(&self, region: &RgbaImage) -> RgbaImage {
        match self.try_clean(region) {
            Ok(outcome) => outcome.image,
            Err(err) => {
                warn!("inpaint failed, keeping original pixels: {:#}", err);
                region.clone()
            }
        }
    }

    pub fn try_clean(&self, region: &RgbaImage) -> Result<InpaintOutcome> {
        let (width, height) = region.dimensions();
        let untouched = |stroke_pixels| InpaintOutcome {
            image: region.clone(),
            stroke_pixels,
            residual_pixels: stroke_pixels,
            fallback_applied: false,
        };
        if width == 0 || height == 0 {
            return Ok(untouched(0));
        }

        let mask = self.build_mask(region);
        let stroke_pixels = mask.stroke_pixels();
        if stroke_pixels == 0 {
            debug!("inpaint: no glyph pixels detected in {}x{}", width, height);
            return Ok(untouched(0));
        }

        let filled = match fast_march_fill(region, &mask, self.config.radius) {
            Ok(image) => image,
            Err(err) => {
                warn!("fast-marching fill failed ({:#}), using diffusion fill", err);
                diffusion_fill(region, &mask).with_context(|| "diffusion fill failed")?
            }
        };

        let residual_pixels = self.build_mask(&filled).stroke_pixels();
        let area = width as u64 * height as u64;
        let too_much_left = residual_pixels as f32 > stroke_pixels as f32 * RESIDUAL_STROKE_RATIO
            || residual_pixels as f32 > area as f32 * RESIDUAL_AREA_RATIO;
        debug!(
            "inpaint: {} stroke pixels, {} residual after fill",
            stroke_pixels, residual_pixels
        );
        if !too_much_left {
            return Ok(InpaintOutcome {
                image: filled,
                stroke_pixels,
                residual_pixels,
                fallback_applied: false,
            });
        }

        let blur_radius = if width.min(height) > 80 { 10 } else { 5 };
        let blurred = imageproc::filter::median_filter(region, blur_radius, blur_radius);
        let mut blended = filled;
        for (x, y, pixel) in blended.enumerate_pixels_mut() {
            let soft = blurred.get_pixel(x, y).0;
            for channel in 0..3 {
                let value = soft[channel] as f32 * FALLBACK_BLEND
                    + pixel.0[channel] as f32 * (1.0 - FALLBACK_BLEND);
                pixel.0[channel] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
        let residual_pixels = self.build_mask(&blended).stroke_pixels();
        Ok(InpaintOutcome {
            image: blended,
            stroke_pixels,
            residual_pixels,
            fallback_applied: true,
        })
    }
}
