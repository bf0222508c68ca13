//! Rune and token classification for mixed Chinese / Latin / numeric text.

use regex::Regex;
use std::sync::OnceLock;

/// Lexical class of a single rune, as seen by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// Whitespace, punctuation and everything else: acts as a separator.
    Other,
    /// ASCII digit `0-9`.
    Digit,
    /// `.` — kept only between two digits, otherwise a separator.
    Dot,
    /// Latin letter.
    Latin,
    /// Han ideograph.
    Han,
    /// Any of `([{（【｛<《`.
    OpenBracket,
    /// Any of `)]}）】｝>》`.
    CloseBracket,
}

/// Lexical flavor of a whole token, used for phrase grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Contains at least one Han rune (possibly mixed with Latin/digits).
    Han,
    /// Digits and dots only.
    Numeric,
    /// Everything else: Latin words, model codes, etc.
    Alpha,
}

/// True for CJK ideographs, including the extension blocks.
pub fn is_han_char(ch: char) -> bool {
    matches!(ch,
        '\u{4E00}'..='\u{9FFF}'     // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}'   // CJK Extension A
        | '\u{20000}'..='\u{2A6DF}' // CJK Extension B
        | '\u{2A700}'..='\u{2B73F}' // CJK Extension C
        | '\u{2B740}'..='\u{2B81F}' // CJK Extension D
        | '\u{2B820}'..='\u{2CEAF}' // CJK Extension E
        | '\u{F900}'..='\u{FAFF}'   // CJK Compatibility Ideographs
    )
}

/// True if the string contains at least one Han rune.
pub fn has_han_char(word: &str) -> bool {
    word.chars().any(is_han_char)
}

/// Number of Han runes in the string.
pub fn han_char_count(word: &str) -> usize {
    word.chars().filter(|&c| is_han_char(c)).count()
}

/// True for Latin-script letters (ASCII plus the Latin supplement and
/// extension blocks). Other scripts act as separators.
pub fn is_latin_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
        || (c.is_alphabetic()
            && matches!(c, '\u{00C0}'..='\u{024F}' | '\u{1E00}'..='\u{1EFF}'))
}

/// Classify a single rune.
pub fn classify_char(c: char) -> CharClass {
    if is_han_char(c) {
        return CharClass::Han;
    }
    if c.is_ascii_digit() {
        return CharClass::Digit;
    }
    if c == '.' {
        return CharClass::Dot;
    }
    if is_latin_letter(c) {
        return CharClass::Latin;
    }
    if matches!(c, '(' | '[' | '{' | '（' | '【' | '｛' | '<' | '《') {
        return CharClass::OpenBracket;
    }
    if matches!(c, ')' | ']' | '}' | '）' | '】' | '｝' | '>' | '》') {
        return CharClass::CloseBracket;
    }
    CharClass::Other
}

/// Classify a whole token: Han wins over everything, then numeric, then alpha.
pub fn classify_token(token: &str) -> TokenKind {
    let mut numeric = true;
    for c in token.chars() {
        match classify_char(c) {
            CharClass::Han => return TokenKind::Han,
            CharClass::Other | CharClass::Digit | CharClass::Dot => {}
            _ => numeric = false,
        }
    }
    if numeric {
        TokenKind::Numeric
    } else {
        TokenKind::Alpha
    }
}

/// True for integers and decimals like `42` or `3.14`.
pub fn is_numeric(s: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?$").unwrap()).is_match(s)
}
