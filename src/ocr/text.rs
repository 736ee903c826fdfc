#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Cjk,
    Latin,
    Emoji,
    Other,
}

pub fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x3040..=0x30FF
            | 0x31F0..=0x31FF
            | 0x3000..=0x303F
            | 0xAC00..=0xD7AF
            | 0x1100..=0x11FF
            | 0xFF00..=0xFFEF
    )
}

pub fn is_emoji(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1F300..=0x1F9FF | 0x1F000..=0x1F02F | 0x1F1E6..=0x1F1FF | 0x1FA70..=0x1FAFF
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

pub fn classify_char(ch: char) -> Script {
    if is_emoji(ch) {
        Script::Emoji
    } else if is_cjk(ch) {
        Script::Cjk
    } else if ch.is_ascii() || ('\u{00C0}'..='\u{024F}').contains(&ch) {
        Script::Latin
    } else {
        Script::Other
    }
}

/// A word is CJK as soon as one of its characters is.
pub fn classify_word(word: &str) -> Script {
    let mut saw_latin = false;
    for ch in word.chars() {
        match classify_char(ch) {
            Script::Cjk => return Script::Cjk,
            Script::Emoji => return Script::Emoji,
            Script::Latin => saw_latin = true,
            Script::Other => {}
        }
    }
    if saw_latin {
        Script::Latin
    } else {
        Script::Other
    }
}

/// Width of a character in em units when no font metrics are available.
pub(crate) fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if is_cjk(ch) || is_emoji(ch) {
        1.0
    } else {
        0.9
    }
}

pub(crate) fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => !(is_cjk(a) && is_cjk(b)),
        _ => false,
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
