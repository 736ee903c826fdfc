use image::{DynamicImage, GenericImageView, GrayImage, imageops::FilterType};

use crate::ocr::LineDetection;
use crate::ocr::geom::scale_quad;

pub(crate) const MIN_OCR_WIDTH: u32 = 200;
pub(crate) const MIN_OCR_HEIGHT: u32 = 50;

/// Resizes the capture into the range the recognizer handles well. Tiny
/// captures are upscaled first; the cap on the longest side applies to the
/// upscaled size. Returns the image to recognize and the combined factor.
pub(crate) fn prepare_for_ocr(image: &DynamicImage, max_side: u32) -> (DynamicImage, f32) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return (image.clone(), 1.0);
    }
    let scale_up = if width < MIN_OCR_WIDTH || height < MIN_OCR_HEIGHT {
        (MIN_OCR_WIDTH as f32 / width as f32).max(MIN_OCR_HEIGHT as f32 / height as f32)
    } else {
        1.0
    };
    let longest = width.max(height) as f32 * scale_up;
    let scale_down = if max_side > 0 {
        (max_side as f32 / longest).min(1.0)
    } else {
        1.0
    };
    let scale = scale_up * scale_down;
    if (scale - 1.0).abs() < f32::EPSILON {
        return (image.clone(), 1.0);
    }
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    (image.resize_exact(new_w, new_h, FilterType::Lanczos3), scale)
}

/// Maps detections from the resized image back to source coordinates.
pub(crate) fn restore_scale(lines: Vec<LineDetection>, scale: f32) -> Vec<LineDetection> {
    if (scale - 1.0).abs() < f32::EPSILON || scale <= 0.0 {
        return lines;
    }
    lines
        .into_iter()
        .map(|line| LineDetection {
            quad: scale_quad(&line.quad, 1.0 / scale),
            ..line
        })
        .collect()
}

/// Grayscale on a white matte with the histogram stretched to full range.
pub(super) fn grayscale_for_ocr(image: &DynamicImage) -> GrayImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = (0.299 * r + 0.587 * g + 0.114 * b).round() as u8;
        luma.put_pixel(x, y, image::Luma([value]));
    }
    contrast_stretch(&luma)
}

fn contrast_stretch(image: &GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((255u8, 0u8), |(min, max), p| (min.min(p[0]), max.max(p[0])));
    if max <= min {
        return image.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = ((pixel[0].saturating_sub(min)) as f32 * scale).round() as u8;
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::BBoxPx;

    #[test]
    fn tiny_images_are_upscaled() {
        let image = DynamicImage::new_rgba8(100, 20);
        let (resized, scale) = prepare_for_ocr(&image, 1600);
        assert_eq!(scale, 2.5);
        assert_eq!(resized.dimensions(), (250, 50));
    }

    #[test]
    fn large_images_are_capped() {
        let image = DynamicImage::new_rgba8(3200, 800);
        let (resized, scale) = prepare_for_ocr(&image, 1600);
        assert_eq!(scale, 0.5);
        assert_eq!(resized.dimensions(), (1600, 400));
    }

    #[test]
    fn upscaled_thin_crops_respect_the_cap() {
        let image = DynamicImage::new_rgba8(100, 2000);
        let (resized, scale) = prepare_for_ocr(&image, 1600);
        // Upscaled to 200x4000 for the minimum width, then capped.
        assert!((scale - 0.8).abs() < 1e-6);
        assert_eq!(resized.dimensions(), (80, 1600));
    }

    #[test]
    fn quads_are_scaled_back() {
        let line = LineDetection::from_bbox("x", BBoxPx { x: 20, y: 10, w: 40, h: 10 }, 0.9);
        let restored = restore_scale(vec![line], 2.0);
        assert_eq!(restored[0].quad[0].x, 10.0);
        assert_eq!(restored[0].quad[2].y, 10.0);
    }

    #[test]
    fn stretch_expands_range() {
        let mut image = GrayImage::from_pixel(2, 1, image::Luma([100]));
        image.put_pixel(1, 0, image::Luma([150]));
        let stretched = contrast_stretch(&image);
        assert_eq!(stretched.get_pixel(0, 0)[0], 0);
        assert_eq!(stretched.get_pixel(1, 0)[0], 255);
    }
}
