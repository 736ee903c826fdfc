use anyhow::Result;
use std::collections::BTreeMap;

use crate::ocr::geom::union_bbox;
use crate::ocr::text::needs_space;
use crate::ocr::{BBoxPx, LineDetection};

#[derive(Clone)]
struct WordToken {
    text: String,
    bbox: BBoxPx,
    conf: f32,
    len: usize,
}

/// Groups word rows of `tesseract ... tsv` output into line detections.
/// Word confidences (0..100) are averaged weighted by length and scaled to 0..1.
pub(super) fn parse_tsv_lines(tsv: &str) -> Result<Vec<LineDetection>> {
    let mut word_map: BTreeMap<(i32, i32, i32, i32), Vec<WordToken>> = BTreeMap::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let page_num: i32 = cols[1].parse().unwrap_or(0);
        let block_num: i32 = cols[2].parse().unwrap_or(0);
        let par_num: i32 = cols[3].parse().unwrap_or(0);
        let line_num: i32 = cols[4].parse().unwrap_or(0);
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let len = text.chars().count().max(1);
        let key = (page_num, block_num, par_num, line_num);
        word_map.entry(key).or_default().push(WordToken {
            text: text.to_string(),
            bbox: BBoxPx {
                x: left,
                y: top,
                w: width,
                h: height,
            },
            conf,
            len,
        });
    }

    let mut lines = Vec::new();
    for (_, mut words) in word_map {
        words.sort_by_key(|word| word.bbox.x);
        for segment in split_word_segments(words) {
            if let Some(line) = build_line(&segment) {
                lines.push(line);
            }
        }
    }

    Ok(lines)
}

/// Breaks a tesseract line where words are far apart horizontally or sit at
/// different heights, which happens with multi-column UI text.
fn split_word_segments(words: Vec<WordToken>) -> Vec<Vec<WordToken>> {
    if words.len() <= 1 {
        return if words.is_empty() { Vec::new() } else { vec![words] };
    }

    let mut heights = words.iter().map(|word| word.bbox.h).collect::<Vec<_>>();
    heights.sort_unstable();
    let median_h = heights[heights.len() / 2].max(1) as f32;
    let gap_threshold = (median_h * 2.5).clamp(12.0, 120.0);
    let vertical_threshold = (median_h * 0.9).clamp(6.0, 80.0);

    let mut segments: Vec<Vec<WordToken>> = Vec::new();
    let mut current: Vec<WordToken> = Vec::new();
    let mut last_right = 0u32;
    let mut last_center_y = 0f32;
    for word in words {
        let center_y = word.bbox.y as f32 + word.bbox.h as f32 * 0.5;
        let right = word.bbox.x + word.bbox.w;
        if current.is_empty() {
            last_right = right;
            last_center_y = center_y;
            current.push(word);
            continue;
        }
        let gap = word.bbox.x.saturating_sub(last_right);
        let vertical_gap = (center_y - last_center_y).abs();
        if (gap as f32) > gap_threshold || vertical_gap > vertical_threshold {
            segments.push(std::mem::take(&mut current));
            last_right = right;
            last_center_y = center_y;
        } else {
            last_right = last_right.max(right);
            last_center_y = (last_center_y + center_y) * 0.5;
        }
        current.push(word);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn build_line(words: &[WordToken]) -> Option<LineDetection> {
    let mut text = String::new();
    let mut last_token = "";
    for word in words {
        if !text.is_empty() && needs_space(last_token, &word.text) {
            text.push(' ');
        }
        text.push_str(&word.text);
        last_token = &word.text;
    }
    let final_text = text.trim();
    if final_text.is_empty() {
        return None;
    }

    let bbox = words
        .iter()
        .map(|word| word.bbox)
        .reduce(|acc, bbox| union_bbox(&acc, &bbox))?;
    let (conf_sum, len_sum) = words.iter().fold((0.0f32, 0.0f32), |(conf, len), word| {
        let weight = word.len.max(1) as f32;
        (conf + word.conf * weight, len + weight)
    });
    let avg_conf = if len_sum > 0.0 { conf_sum / len_sum } else { 0.0 };

    Some(LineDetection::from_bbox(
        final_text,
        bbox,
        (avg_conf / 100.0).clamp(0.0, 1.0),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(line: i32, word: i32, left: u32, top: u32, w: u32, conf: f32, text: &str) -> String {
        format!("5\t1\t1\t1\t{line}\t{word}\t{left}\t{top}\t{w}\t20\t{conf}\t{text}")
    }

    #[test]
    fn groups_words_into_lines() {
        let tsv = [
            HEADER.to_string(),
            "4\t1\t1\t1\t1\t0\t10\t10\t200\t20\t-1\t".to_string(),
            word(1, 1, 10, 10, 50, 90.0, "Hello"),
            word(1, 2, 66, 10, 60, 80.0, "world."),
            word(2, 1, 10, 40, 80, 95.0, "Next"),
        ]
        .join("\n");
        let lines = parse_tsv_lines(&tsv).expect("parse");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Hello world.");
        assert_eq!(lines[0].quad[0].x, 10.0);
        assert_eq!(lines[0].quad[2].x, 126.0);
        let expected = (90.0 * 5.0 + 80.0 * 6.0) / 11.0 / 100.0;
        assert!((lines[0].confidence - expected).abs() < 1e-4);
        assert_eq!(lines[1].text, "Next");
    }

    #[test]
    fn far_apart_words_split_into_segments() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 10, 10, 40, 90.0, "Left"),
            word(1, 2, 400, 10, 40, 90.0, "Right"),
        ]
        .join("\n");
        let lines = parse_tsv_lines(&tsv).expect("parse");
        let texts = lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, ["Left", "Right"]);
    }

    #[test]
    fn skips_empty_and_unscored_words() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 10, 10, 40, -1.0, "ghost"),
            word(1, 2, 60, 10, 40, 90.0, " "),
            "garbage row".to_string(),
        ]
        .join("\n");
        assert!(parse_tsv_lines(&tsv).expect("parse").is_empty());
    }
}
