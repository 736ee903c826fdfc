use super::{BBoxPx, Point, Quad};

pub fn quad_center(quad: &Quad) -> Point {
    let (sx, sy) = quad
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / 4.0, sy / 4.0)
}

/// Vertical center taken from the top-left and bottom-right corners.
pub fn y_center(quad: &Quad) -> f32 {
    (quad[0].y + quad[2].y) / 2.0
}

pub fn quad_bbox(quad: &Quad) -> BBoxPx {
    let min_x = quad.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let min_y = quad.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let max_x = quad.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
    let max_y = quad.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
    let x = min_x.max(0.0).floor() as u32;
    let y = min_y.max(0.0).floor() as u32;
    let x2 = max_x.max(0.0).ceil() as u32;
    let y2 = max_y.max(0.0).ceil() as u32;
    BBoxPx {
        x,
        y,
        w: x2.saturating_sub(x),
        h: y2.saturating_sub(y),
    }
}

pub(crate) fn union_bbox(a: &BBoxPx, b: &BBoxPx) -> BBoxPx {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = (a.x + a.w).max(b.x + b.w);
    let y2 = (a.y + a.h).max(b.y + b.h);
    BBoxPx {
        x: x1,
        y: y1,
        w: x2 - x1,
        h: y2 - y1,
    }
}

pub fn distance(a: Point, b: Point) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

pub(crate) fn scale_quad(quad: &Quad, factor: f32) -> Quad {
    quad.map(|p| Point::new(p.x * factor, p.y * factor))
}

pub(crate) fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f32>() / values.len() as f32)
}

pub(crate) fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_covers_rotated_quad() {
        let quad = [
            Point::new(10.5, 4.0),
            Point::new(40.0, 2.2),
            Point::new(41.0, 20.0),
            Point::new(11.0, 22.9),
        ];
        let bbox = quad_bbox(&quad);
        assert_eq!(bbox, BBoxPx { x: 10, y: 2, w: 31, h: 21 });
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 5.0);
    }
}
