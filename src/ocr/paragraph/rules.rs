use std::sync::Arc;

use super::lexicon::{ContinuityLexicon, normalize_word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryDecision {
    NewParagraph,
    Continue,
}

/// Two adjacent lines in reading order plus the vertical spacing context.
#[derive(Debug, Clone, Copy)]
pub struct LinePair<'a> {
    pub prev: &'a str,
    pub current: &'a str,
    pub gap: f32,
    pub threshold: f32,
}

/// One row of the boundary decision table. Rules are consulted in order and
/// the first one returning a decision wins.
pub trait BoundaryRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, pair: &LinePair<'_>) -> Option<BoundaryDecision>;
}

const LIST_END_MARKERS: &[&str] = &[
    ":", "：", " -", "...", "…", "♦", "•", "⦿", "◉", "◈", "▶",
];
const BULLET_GLYPHS: &[char] = &['•', '♦', '⦿', '◉', '◈', '▶', '■', '●', '◆', '▪', '-', '*'];
const SENTENCE_END: &[char] = &['.', '!', '?', '。', '！', '？'];
const TERMINAL_PUNCTUATION: &[char] = &['.', '!', '?', '。', '！', '？', ';', '；', ':', '：'];
const MAX_LABEL_WORDS: usize = 6;
const SHORT_LINE_CHARS: usize = 40;
const SMALL_GAP_RATIO: f32 = 0.7;

pub struct GapExceedsThreshold;

impl BoundaryRule for GapExceedsThreshold {
    fn name(&self) -> &'static str {
        "gap-exceeds-threshold"
    }

    fn evaluate(&self, pair: &LinePair<'_>) -> Option<BoundaryDecision> {
        (pair.gap > pair.threshold).then_some(BoundaryDecision::NewParagraph)
    }
}

pub struct LabelLine;

impl BoundaryRule for LabelLine {
    fn name(&self) -> &'static str {
        "label-line"
    }

    fn evaluate(&self, pair: &LinePair<'_>) -> Option<BoundaryDecision> {
        is_label(pair.current).then_some(BoundaryDecision::NewParagraph)
    }
}

pub struct AfterColon;

impl BoundaryRule for AfterColon {
    fn name(&self) -> &'static str {
        "after-colon"
    }

    fn evaluate(&self, pair: &LinePair<'_>) -> Option<BoundaryDecision> {
        ends_with_colon(pair.prev).then_some(BoundaryDecision::NewParagraph)
    }
}

pub struct ListMarker;

impl BoundaryRule for ListMarker {
    fn name(&self) -> &'static str {
        "list-marker"
    }

    fn evaluate(&self, pair: &LinePair<'_>) -> Option<BoundaryDecision> {
        let ends_with_marker =
            |text: &str| LIST_END_MARKERS.iter().any(|marker| text.ends_with(marker));
        let sentence_then_capital = pair.prev.ends_with(SENTENCE_END)
            && pair
                .current
                .chars()
                .next()
                .is_some_and(|ch| ch.is_uppercase());
        let marker = ends_with_marker(pair.current)
            || ends_with_marker(pair.prev)
            || starts_with_enumeration(pair.current)
            || starts_with_bullet(pair.current)
            || sentence_then_capital;
        marker.then_some(BoundaryDecision::NewParagraph)
    }
}

pub struct UiAffordance {
    lexicon: Arc<dyn ContinuityLexicon>,
}

impl UiAffordance {
    pub fn new(lexicon: Arc<dyn ContinuityLexicon>) -> Self {
        Self { lexicon }
    }
}

impl BoundaryRule for UiAffordance {
    fn name(&self) -> &'static str {
        "ui-affordance"
    }

    fn evaluate(&self, pair: &LinePair<'_>) -> Option<BoundaryDecision> {
        parentheticals(pair.current)
            .any(|inner| self.lexicon.is_ui_affordance(inner))
            .then_some(BoundaryDecision::NewParagraph)
    }
}

pub struct SemanticContinuity {
    lexicon: Arc<dyn ContinuityLexicon>,
}

impl SemanticContinuity {
    pub fn new(lexicon: Arc<dyn ContinuityLexicon>) -> Self {
        Self { lexicon }
    }

    fn is_connected(&self, prev: &str, current: &str) -> bool {
        let prev_words = prev.split_whitespace().collect::<Vec<_>>();
        let current_words = current.split_whitespace().collect::<Vec<_>>();
        let (Some(last_word), Some(first_word)) = (prev_words.last(), current_words.first())
        else {
            return false;
        };

        if self.lexicon.is_connective(last_word) {
            return true;
        }
        if !prev.ends_with(TERMINAL_PUNCTUATION) && !prev.contains([':', '：']) {
            return true;
        }
        let starts_lower = first_word.chars().next().is_some_and(|ch| ch.is_lowercase());
        if starts_lower && !is_abbreviation(first_word) {
            return true;
        }

        let tail = prev_words[prev_words.len().saturating_sub(2)..]
            .iter()
            .map(|word| normalize_word(word))
            .collect::<Vec<_>>();
        let head = current_words
            .iter()
            .take(2)
            .map(|word| normalize_word(word))
            .collect::<Vec<_>>();
        if self.lexicon.spans_phrase(&tail, &head) {
            return true;
        }

        if prev.ends_with(['-', ',', '，']) {
            return true;
        }
        prev.chars().count() < SHORT_LINE_CHARS
            && !is_title_case(prev)
            && !prev.contains([':', '：'])
    }
}

impl BoundaryRule for SemanticContinuity {
    fn name(&self) -> &'static str {
        "semantic-continuity"
    }

    fn evaluate(&self, pair: &LinePair<'_>) -> Option<BoundaryDecision> {
        self.is_connected(pair.prev, pair.current)
            .then_some(BoundaryDecision::Continue)
    }
}

pub struct SmallGap;

impl BoundaryRule for SmallGap {
    fn name(&self) -> &'static str {
        "small-gap"
    }

    fn evaluate(&self, pair: &LinePair<'_>) -> Option<BoundaryDecision> {
        (pair.gap < pair.threshold * SMALL_GAP_RATIO).then_some(BoundaryDecision::Continue)
    }
}

pub struct Fallback;

impl BoundaryRule for Fallback {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn evaluate(&self, _pair: &LinePair<'_>) -> Option<BoundaryDecision> {
        Some(BoundaryDecision::NewParagraph)
    }
}

pub(crate) fn default_rules(lexicon: Arc<dyn ContinuityLexicon>) -> Vec<Box<dyn BoundaryRule>> {
    vec![
        Box::new(GapExceedsThreshold),
        Box::new(LabelLine),
        Box::new(AfterColon),
        Box::new(ListMarker),
        Box::new(UiAffordance::new(lexicon.clone())),
        Box::new(SemanticContinuity::new(lexicon)),
        Box::new(SmallGap),
        Box::new(Fallback),
    ]
}

fn ends_with_colon(text: &str) -> bool {
    text.ends_with([':', '：'])
}

/// `Option A:`, `Name: value`, `Key:value` and colon-terminated lines.
fn is_label(text: &str) -> bool {
    if ends_with_colon(text) {
        return true;
    }
    if text
        .split_whitespace()
        .next()
        .is_some_and(|token| token.contains([':', '：']) && !token.contains("://"))
    {
        return true;
    }
    let Some(colon) = text.find([':', '：']) else {
        return false;
    };
    let head = &text[..colon];
    if text[colon..].starts_with("://") {
        return false;
    }
    let starts_alpha = head.chars().next().is_some_and(|ch| ch.is_ascii_alphabetic());
    let plain_words = head
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch.is_whitespace());
    let word_count = head.split_whitespace().count();
    starts_alpha && plain_words && (1..=MAX_LABEL_WORDS).contains(&word_count)
}

/// `1. item` or `A. item`.
fn starts_with_enumeration(text: &str) -> bool {
    let Some((marker, _)) = text.split_once(". ") else {
        return false;
    };
    let all_digits = !marker.is_empty() && marker.chars().all(|ch| ch.is_ascii_digit());
    let single_letter = marker.chars().count() == 1 && marker.chars().all(|ch| ch.is_ascii_alphabetic());
    all_digits || single_letter
}

fn starts_with_bullet(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) => BULLET_GLYPHS.contains(&first) && second.is_whitespace(),
        (Some(first), None) => BULLET_GLYPHS.contains(&first) && first != '-' && first != '*',
        _ => false,
    }
}

/// Lowercase word ending in a period, e.g. `etc.` or `approx.`.
fn is_abbreviation(word: &str) -> bool {
    word.strip_suffix('.').is_some_and(|stem| {
        !stem.is_empty() && stem.chars().all(|ch| ch.is_ascii_lowercase())
    })
}

fn is_title_case(text: &str) -> bool {
    let mut saw_word = false;
    for word in text.split_whitespace() {
        let Some(first) = word.chars().find(|ch| ch.is_alphabetic()) else {
            continue;
        };
        saw_word = true;
        if !first.is_uppercase() {
            return false;
        }
    }
    saw_word
}

fn parentheticals(text: &str) -> impl Iterator<Item = &str> {
    text.match_indices('(').filter_map(move |(open, _)| {
        let rest = &text[open + 1..];
        rest.find(')').map(|close| &rest[..close])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::paragraph::lexicon::WordListLexicon;

    fn pair<'a>(prev: &'a str, current: &'a str) -> LinePair<'a> {
        LinePair {
            prev,
            current,
            gap: 20.0,
            threshold: 40.0,
        }
    }

    fn english() -> Arc<dyn ContinuityLexicon> {
        Arc::new(WordListLexicon::english())
    }

    #[test]
    fn label_shapes() {
        assert!(is_label("Option A: the first"));
        assert!(is_label("Settings:"));
        assert!(is_label("Name:John"));
        assert!(!is_label("see https://example.com for more"));
        assert!(!is_label("This sentence has far too many words before: colon"));
        assert!(!is_label("plain text"));
    }

    #[test]
    fn colon_ending_forces_boundary() {
        assert_eq!(
            AfterColon.evaluate(&pair("Settings:", "Enable logging")),
            Some(BoundaryDecision::NewParagraph)
        );
        assert_eq!(AfterColon.evaluate(&pair("Settings", "Enable logging")), None);
    }

    #[test]
    fn list_markers() {
        let rule = ListMarker;
        assert!(rule.evaluate(&pair("Intro text", "1. First step")).is_some());
        assert!(rule.evaluate(&pair("Intro text", "B. Second option")).is_some());
        assert!(rule.evaluate(&pair("Intro text", "• bullet")).is_some());
        assert!(rule.evaluate(&pair("It ends here.", "Another sentence")).is_some());
        assert!(rule.evaluate(&pair("Loading...", "done")).is_some());
        assert!(rule.evaluate(&pair("carry on", "with this")).is_none());
    }

    #[test]
    fn ui_affordance_in_parentheses() {
        let rule = UiAffordance::new(english());
        assert!(rule.evaluate(&pair("Details", "More (click to expand)")).is_some());
        assert!(rule.evaluate(&pair("Details", "More (see appendix)")).is_none());
    }

    #[test]
    fn continuity_signals() {
        let rule = SemanticContinuity::new(english());
        let cont = Some(BoundaryDecision::Continue);
        assert_eq!(rule.evaluate(&pair("This is written for the", "Reader.")), cont);
        assert_eq!(rule.evaluate(&pair("no punctuation here", "Next")), cont);
        assert_eq!(rule.evaluate(&pair("Done.", "continues lower")), cont);
        assert_eq!(rule.evaluate(&pair("Ends with comma,", "Next")), cont);
        assert_eq!(
            rule.evaluate(&pair("Built with Artificial.", "Intelligence Inside")),
            cont
        );
        assert_eq!(
            rule.evaluate(&pair("This Title Case Line Is Finished.", "Next Line")),
            None
        );
        assert_eq!(rule.evaluate(&pair("Finished.", "etc. and more")), None);
    }

    #[test]
    fn gap_rules() {
        let big = LinePair {
            prev: "a",
            current: "b",
            gap: 50.0,
            threshold: 40.0,
        };
        assert_eq!(GapExceedsThreshold.evaluate(&big), Some(BoundaryDecision::NewParagraph));
        assert_eq!(SmallGap.evaluate(&pair("a", "b")), Some(BoundaryDecision::Continue));
        let medium = LinePair { gap: 35.0, ..pair("a", "b") };
        assert_eq!(SmallGap.evaluate(&medium), None);
    }
}
