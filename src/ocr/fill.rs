use anyhow::{Result, bail};
use image::RgbaImage;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::inpaint::TextMask;

const STRAIGHT_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;
const DIFFUSION_ITERATIONS: usize = 400;
const DIFFUSION_TOLERANCE: f32 = 0.25;

const NEIGHBORS: [(i32, i32, u32); 8] = [
    (-1, 0, STRAIGHT_COST),
    (1, 0, STRAIGHT_COST),
    (0, -1, STRAIGHT_COST),
    (0, 1, STRAIGHT_COST),
    (-1, -1, DIAGONAL_COST),
    (1, -1, DIAGONAL_COST),
    (-1, 1, DIAGONAL_COST),
    (1, 1, DIAGONAL_COST),
];

/// Fills masked pixels in order of their distance from the mask boundary.
/// Each pixel becomes a distance-weighted average of the already known
/// pixels within `radius`.
pub(crate) fn fast_march_fill(image: &RgbaImage, mask: &TextMask, radius: u32) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    let w = width as usize;
    let len = w * height as usize;
    let mut known = (0..len)
        .map(|idx| !mask.is_masked((idx % w) as u32, (idx / w) as u32))
        .collect::<Vec<_>>();
    if !known.iter().any(|k| *k) {
        bail!("inpaint mask covers the whole region");
    }

    let mut dist = known
        .iter()
        .map(|k| if *k { 0 } else { u32::MAX })
        .collect::<Vec<_>>();
    let mut heap = BinaryHeap::new();
    for idx in 0..len {
        if known[idx] && neighbors(idx, width, height).any(|(n, _)| !known[n]) {
            heap.push(Reverse((0u32, idx)));
        }
    }

    let mut output = image.clone();
    let radius = radius.max(1) as i32;
    while let Some(Reverse((d, idx))) = heap.pop() {
        if d > dist[idx] {
            continue;
        }
        if !known[idx] {
            let x = (idx % w) as i32;
            let y = (idx / w) as i32;
            let mut acc = [0.0f32; 3];
            let mut total = 0.0f32;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                        continue;
                    }
                    let nidx = ny as usize * w + nx as usize;
                    if !known[nidx] || (dx == 0 && dy == 0) {
                        continue;
                    }
                    let geometric = 1.0 / (dx * dx + dy * dy) as f32;
                    let level = 1.0 / (1.0 + d.abs_diff(dist[nidx]) as f32 / STRAIGHT_COST as f32);
                    let weight = geometric * level;
                    let pixel = output.get_pixel(nx as u32, ny as u32).0;
                    for channel in 0..3 {
                        acc[channel] += pixel[channel] as f32 * weight;
                    }
                    total += weight;
                }
            }
            if total > 0.0 {
                let alpha = output.get_pixel(x as u32, y as u32).0[3];
                let rgb = acc.map(|sum| (sum / total).round().clamp(0.0, 255.0) as u8);
                output.put_pixel(x as u32, y as u32, image::Rgba([rgb[0], rgb[1], rgb[2], alpha]));
            }
            known[idx] = true;
        }
        for (n, cost) in neighbors(idx, width, height) {
            if known[n] {
                continue;
            }
            let next = d.saturating_add(cost);
            if next < dist[n] {
                dist[n] = next;
                heap.push(Reverse((next, n)));
            }
        }
    }
    Ok(output)
}

/// Solves Laplace's equation over the masked pixels with Jacobi iterations,
/// so the fill diffuses smoothly inward from the boundary.
pub(crate) fn diffusion_fill(image: &RgbaImage, mask: &TextMask) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    let w = width as usize;
    let len = w * height as usize;
    let masked = (0..len)
        .map(|idx| mask.is_masked((idx % w) as u32, (idx / w) as u32))
        .collect::<Vec<_>>();

    let mut seed = [0.0f32; 3];
    let mut known_count = 0usize;
    for (idx, pixel) in image.pixels().enumerate() {
        if !masked[idx] {
            for channel in 0..3 {
                seed[channel] += pixel.0[channel] as f32;
            }
            known_count += 1;
        }
    }
    if known_count == 0 {
        bail!("inpaint mask covers the whole region");
    }
    let seed = seed.map(|sum| sum / known_count as f32);

    let mut values = image
        .pixels()
        .enumerate()
        .map(|(idx, pixel)| {
            if masked[idx] {
                seed
            } else {
                [pixel.0[0] as f32, pixel.0[1] as f32, pixel.0[2] as f32]
            }
        })
        .collect::<Vec<_>>();

    for _ in 0..DIFFUSION_ITERATIONS {
        let previous = values.clone();
        let mut max_change = 0.0f32;
        for idx in (0..len).filter(|idx| masked[*idx]) {
            let mut acc = [0.0f32; 3];
            let mut count = 0.0f32;
            for (n, cost) in neighbors(idx, width, height) {
                if cost != STRAIGHT_COST {
                    continue;
                }
                for channel in 0..3 {
                    acc[channel] += previous[n][channel];
                }
                count += 1.0;
            }
            if count == 0.0 {
                continue;
            }
            let next = acc.map(|sum| sum / count);
            for channel in 0..3 {
                max_change = max_change.max((next[channel] - previous[idx][channel]).abs());
            }
            values[idx] = next;
        }
        if max_change < DIFFUSION_TOLERANCE {
            break;
        }
    }

    let mut output = image.clone();
    for (idx, pixel) in output.pixels_mut().enumerate() {
        if masked[idx] {
            let rgb = values[idx].map(|v| v.round().clamp(0.0, 255.0) as u8);
            pixel.0 = [rgb[0], rgb[1], rgb[2], pixel.0[3]];
        }
    }
    Ok(output)
}

fn neighbors(idx: usize, width: u32, height: u32) -> impl Iterator<Item = (usize, u32)> {
    let w = width as i32;
    let h = height as i32;
    let x = (idx % width as usize) as i32;
    let y = (idx / width as usize) as i32;
    NEIGHBORS.iter().filter_map(move |(dx, dy, cost)| {
        let nx = x + dx;
        let ny = y + dy;
        (nx >= 0 && ny >= 0 && nx < w && ny < h).then(|| (ny as usize * w as usize + nx as usize, *cost))
    })
}
