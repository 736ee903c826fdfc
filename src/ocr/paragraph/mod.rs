mod gaps;
mod lexicon;
mod rules;

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::LineDetection;
use super::text::collapse_whitespace;

pub use gaps::GapClustering;
pub use lexicon::{ContinuityLexicon, WordListLexicon};
pub use rules::{BoundaryDecision, BoundaryRule, LinePair};

pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Paragraphs in reading order. Never contains an empty paragraph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParagraphSet {
    paragraphs: Vec<String>,
}

impl ParagraphSet {
    pub fn new<I, S>(paragraphs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paragraphs: paragraphs
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.trim().is_empty())
                .collect(),
        }
    }

    /// Splits text on the paragraph separator, dropping blank pieces.
    pub fn split(text: &str) -> Self {
        Self::new(text.split(PARAGRAPH_SEPARATOR).map(str::trim))
    }

    pub fn join(&self) -> String {
        self.paragraphs.join(PARAGRAPH_SEPARATOR)
    }

    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.paragraphs.iter()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.paragraphs
    }
}

impl<'a> IntoIterator for &'a ParagraphSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.paragraphs.iter()
    }
}

pub struct ParagraphAssembler {
    rules: Vec<Box<dyn BoundaryRule>>,
    clustering: GapClustering,
}

impl Default for ParagraphAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ParagraphAssembler {
    pub fn new() -> Self {
        Self::with_lexicon(Arc::new(WordListLexicon::english()))
    }

    pub fn with_lexicon(lexicon: Arc<dyn ContinuityLexicon>) -> Self {
        Self {
            rules: rules::default_rules(lexicon),
            clustering: GapClustering::default(),
        }
    }

    /// Replaces the boundary decision table. An empty table falls back to
    /// "new paragraph" for every line.
    pub fn with_rules(mut self, rules: Vec<Box<dyn BoundaryRule>>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_clustering(mut self, clustering: GapClustering) -> Self {
        self.clustering = clustering;
        self
    }

    pub fn assemble(&self, lines: &[LineDetection], confidence_threshold: f32) -> ParagraphSet {
        let mut kept = lines
            .iter()
            .filter(|line| line.confidence > confidence_threshold)
            .filter(|line| !line.text.trim().is_empty())
            .collect::<Vec<_>>();
        kept.sort_by(|a, b| {
            a.y_center()
                .total_cmp(&b.y_center())
                .then_with(|| a.x_center().total_cmp(&b.x_center()))
                .then_with(|| a.text.cmp(&b.text))
        });

        let texts = kept
            .iter()
            .map(|line| collapse_whitespace(&line.text))
            .collect::<Vec<_>>();
        if texts.len() <= 1 {
            return ParagraphSet::new(texts);
        }

        let gaps = kept
            .windows(2)
            .map(|pair| pair[1].y_center() - pair[0].y_center())
            .collect::<Vec<_>>();
        let threshold = gaps::estimate_threshold(&gaps, self.clustering);
        if let Some(threshold) = threshold {
            debug!(
                "paragraph gap threshold {:.2} ({:?}) over {} gaps",
                threshold.value,
                threshold.source,
                gaps.len()
            );
        }
        let threshold = threshold.map(|t| t.value).unwrap_or_default();

        let mut paragraphs = Vec::new();
        let mut current = vec![texts[0].as_str()];
        for (idx, gap) in gaps.iter().enumerate() {
            let pair = LinePair {
                prev: &texts[idx],
                current: &texts[idx + 1],
                gap: *gap,
                threshold,
            };
            let (decision, rule) = self.decide(&pair);
            debug!(
                "line {} {:?} by {} (gap {:.2})",
                idx + 1,
                decision,
                rule,
                gap
            );
            if decision == BoundaryDecision::NewParagraph {
                paragraphs.push(current.join(" "));
                current.clear();
            }
            current.push(pair.current);
        }
        if !current.is_empty() {
            paragraphs.push(current.join(" "));
        }
        ParagraphSet::new(paragraphs)
    }

    fn decide(&self, pair: &LinePair<'_>) -> (BoundaryDecision, &'static str) {
        self.rules
            .iter()
            .find_map(|rule| rule.evaluate(pair).map(|decision| (decision, rule.name())))
            .unwrap_or((BoundaryDecision::NewParagraph, "fallback"))
    }
}

/// Assembles with the default English rule table.
pub fn assemble(lines: &[LineDetection], confidence_threshold: f32) -> ParagraphSet {
    ParagraphAssembler::new().assemble(lines, confidence_threshold)
}
