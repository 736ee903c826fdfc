use std::collections::HashSet;

/// Word knowledge consulted by the continuity rules.
pub trait ContinuityLexicon: Send + Sync {
    /// Whether a line ending in `word` expects the sentence to continue.
    fn is_connective(&self, word: &str) -> bool;

    /// Whether a known phrase starts in `tail` (end of the previous line)
    /// and finishes in `head` (start of the current line).
    fn spans_phrase(&self, tail: &[String], head: &[String]) -> bool;

    /// Whether the contents of a parenthetical are an interface hint such as
    /// "click to expand".
    fn is_ui_affordance(&self, parenthetical: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct WordListLexicon {
    connectives: HashSet<String>,
    phrases: Vec<Vec<String>>,
    compound_modifiers: HashSet<String>,
    compound_heads: HashSet<String>,
    affordances: Vec<String>,
}

const ENGLISH_CONNECTIVES: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "with", "for", "by", "as",
    "from", "of", "that", "which", "who",
];

const ENGLISH_PHRASES: &[&str] = &[
    "artificial intelligence",
    "security testing",
    "information security",
    "cutting edge",
    "edge technologies",
    "security professionals",
    "who need",
    "need a",
    "a powerful",
    "flexible solution",
];

const COMPOUND_MODIFIERS: &[&str] = &["artificial", "security", "intelligence", "testing", "analysis"];
const COMPOUND_HEADS: &[&str] = &["intelligence", "technologies", "framework", "system", "engine", "tool"];
const UI_AFFORDANCES: &[&str] = &["click", "expand", "tap", "collapse", "show more"];

impl WordListLexicon {
    pub fn english() -> Self {
        let mut lexicon = Self {
            connectives: HashSet::new(),
            phrases: Vec::new(),
            compound_modifiers: COMPOUND_MODIFIERS.iter().map(|w| w.to_string()).collect(),
            compound_heads: COMPOUND_HEADS.iter().map(|w| w.to_string()).collect(),
            affordances: UI_AFFORDANCES.iter().map(|w| w.to_string()).collect(),
        };
        lexicon.extend_connectives(ENGLISH_CONNECTIVES.iter().copied());
        lexicon.extend_phrases(ENGLISH_PHRASES.iter().copied());
        lexicon
    }

    pub fn extend_connectives<I, S>(&mut self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for word in words {
            let word = normalize_word(word.as_ref());
            if !word.is_empty() {
                self.connectives.insert(word);
            }
        }
    }

    pub fn extend_phrases<I, S>(&mut self, phrases: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for phrase in phrases {
            let words = phrase
                .as_ref()
                .split_whitespace()
                .map(normalize_word)
                .filter(|word| !word.is_empty())
                .collect::<Vec<_>>();
            if words.len() >= 2 && !self.phrases.contains(&words) {
                self.phrases.push(words);
            }
        }
    }
}

impl Default for WordListLexicon {
    fn default() -> Self {
        Self::english()
    }
}

impl ContinuityLexicon for WordListLexicon {
    fn is_connective(&self, word: &str) -> bool {
        self.connectives.contains(&normalize_word(word))
    }

    fn spans_phrase(&self, tail: &[String], head: &[String]) -> bool {
        if let (Some(last), Some(first)) = (tail.last(), head.first()) {
            if self.compound_modifiers.contains(last) && self.compound_heads.contains(first) {
                return true;
            }
        }
        self.phrases.iter().any(|phrase| {
            (1..phrase.len()).any(|split| {
                let (before, after) = phrase.split_at(split);
                tail.ends_with(before) && head.starts_with(after)
            })
        })
    }

    fn is_ui_affordance(&self, parenthetical: &str) -> bool {
        let lowered = parenthetical.to_lowercase();
        self.affordances.iter().any(|word| lowered.contains(word.as_str()))
    }
}

/// Lowercases and strips surrounding punctuation.
pub(crate) fn normalize_word(word: &str) -> String {
    word.trim_matches(|ch: char| !ch.is_alphanumeric())
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(normalize_word).collect()
    }

    #[test]
    fn connectives_ignore_case_and_punctuation() {
        let lexicon = WordListLexicon::english();
        assert!(lexicon.is_connective("The"));
        assert!(lexicon.is_connective("with,"));
        assert!(!lexicon.is_connective("elephant"));
    }

    #[test]
    fn phrase_must_cross_the_break() {
        let lexicon = WordListLexicon::english();
        assert!(lexicon.spans_phrase(&words("powered by artificial"), &words("intelligence today")));
        assert!(!lexicon.spans_phrase(&words("artificial intelligence"), &words("Next item")));
    }

    #[test]
    fn compound_terms_join() {
        let lexicon = WordListLexicon::english();
        assert!(lexicon.spans_phrase(&words("a security"), &words("framework for")));
    }

    #[test]
    fn extensions_are_honored() {
        let mut lexicon = WordListLexicon::english();
        lexicon.extend_connectives(["und"]);
        lexicon.extend_phrases(["machine learning"]);
        assert!(lexicon.is_connective("und"));
        assert!(lexicon.spans_phrase(&words("uses machine"), &words("learning models")));
    }
}
