//! Phrase tokenizer: raw display names → typed index characters.
//!
//! A raw name is segmented into [`IndexPhrase`]s of uniform lexical flavor
//! (all-Hanzi/mixed, numeric, or alpha cluster). Each phrase is an ordered
//! list of [`IndexChar`]s: one Hanzi rune per char for Hanzi-bearing tokens,
//! or one whole token for everything else. The pipe-joined serialization of
//! a sentence is what gets persisted on `dict_words.word_chars`.

use unicode_normalization::UnicodeNormalization;

use crate::chars::{classify_char, classify_token, has_han_char, is_han_char, CharClass, TokenKind};
use crate::pinyin::{word_to_pinyin, PinyinTable};

/// Kind of a single index character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharKind {
    /// One Hanzi-bearing rune (Hanzi tokens are split per rune).
    Han,
    /// One whole non-Hanzi token (Latin word, model code, number).
    NonHan,
}

/// Atomic unit of a phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexChar {
    pub text: String,
    pub kind: CharKind,
}

impl IndexChar {
    pub fn is_han(&self) -> bool {
        self.kind == CharKind::Han
    }

    /// The mask placeholder, preserving the kind of the char it replaces.
    pub(crate) fn mask(kind: CharKind) -> Self {
        IndexChar { text: "*".to_string(), kind }
    }
}

/// Serialize a char slice: non-Hanzi chars carry a trailing space, the whole
/// string is right-trimmed.
pub(crate) fn chars_to_string(chars: &[IndexChar]) -> String {
    let mut out = String::new();
    for c in chars {
        out.push_str(&c.text);
        if !c.is_han() {
            out.push(' ');
        }
    }
    out.trim_end().to_string()
}

/// Weight of a char slice: a Hanzi rune counts 2, every other rune 1.
pub(crate) fn chars_weight(chars: &[IndexChar]) -> usize {
    let mut count = 0;
    for c in chars {
        match c.kind {
            CharKind::Han => {
                for r in c.text.chars() {
                    count += if is_han_char(r) { 2 } else { 1 };
                }
            }
            CharKind::NonHan => count += c.text.chars().count(),
        }
    }
    count
}

/// Re-parse a serialized phrase string into index chars.
///
/// Space-separated parts that carry Hanzi explode into per-rune chars;
/// parts without Hanzi stay whole.
pub fn to_index_chars(input: &str) -> Vec<IndexChar> {
    let mut chars = Vec::new();
    for word in input.split(' ') {
        if has_han_char(word) {
            for r in word.chars() {
                chars.push(IndexChar { text: r.to_string(), kind: CharKind::Han });
            }
        } else {
            chars.push(IndexChar { text: word.to_string(), kind: CharKind::NonHan });
        }
    }
    chars
}

/// Trie-layer weight of an index word: space-separated multi-part words
/// weigh their part count, Hanzi-bearing words their rune count, anything
/// else 1. Always equals the [`to_index_chars`] count of the word.
pub fn index_word_weight(word: &str) -> u32 {
    let parts = word.split(' ').count();
    if parts > 1 {
        return parts as u32;
    }
    if has_han_char(word) {
        return word.chars().count() as u32;
    }
    1
}

/// If the string ends in at least `min_digits` ASCII digits, return that
/// trailing digit run.
pub(crate) fn extract_ending_digits(s: &str, min_digits: u32) -> Option<&str> {
    if min_digits == 0 {
        return None;
    }
    let tail_len: usize = s.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    if tail_len >= min_digits as usize {
        let cut = s.len() - tail_len; // digits are single-byte
        Some(&s[cut..])
    } else {
        None
    }
}

/// One phrase: an ordered list of index chars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPhrase {
    pub(crate) chars: Vec<IndexChar>,
}

impl IndexPhrase {
    /// Build a phrase from a serialized phrase string.
    pub fn from_str(phrase: &str) -> Self {
        IndexPhrase { chars: to_index_chars(phrase) }
    }

    pub fn chars(&self) -> &[IndexChar] {
        &self.chars
    }

    /// Serialized form (see [`chars_to_string`]).
    pub fn to_string(&self) -> String {
        chars_to_string(&self.chars)
    }

    /// Phrase weight: Hanzi runes count 2, other runes 1.
    pub fn weight(&self) -> usize {
        chars_weight(&self.chars)
    }

    /// Pinyin form of the phrase.
    pub fn to_pinyin(&self, table: &PinyinTable) -> String {
        word_to_pinyin(&self.to_string(), table)
    }

    /// Noise trim applied before variant generation.
    ///
    /// A trailing run of at least `ending_digits` digits wins outright: the
    /// phrase is reduced to that run. Otherwise at most one prefix and one
    /// suffix from the per-dictionary lists (ordered longest first) are
    /// stripped. `ending_digits == 0` disables the digit rule.
    pub fn trim(&mut self, prefixes: &[String], suffixes: &[String], ending_digits: u32) {
        let phrase = self.to_string();
        if let Some(digits) = extract_ending_digits(&phrase, ending_digits) {
            self.chars = to_index_chars(digits);
            return;
        }

        let mut rest = phrase.as_str();
        for prefix in prefixes {
            if let Some(stripped) = rest.strip_prefix(prefix.as_str()) {
                rest = stripped;
                break;
            }
        }
        for suffix in suffixes {
            if let Some(stripped) = rest.strip_suffix(suffix.as_str()) {
                rest = stripped;
                break;
            }
        }
        self.chars = to_index_chars(rest);
    }
}

/// A tokenized name: ordered list of phrases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSentence {
    pub(crate) phrases: Vec<IndexPhrase>,
}

impl IndexSentence {
    /// Tokenize a raw display name.
    ///
    /// The input is NFC-normalized, lower-cased and trimmed, scanned into
    /// separator-free tokens (keeping digits, Latin letters, Hanzi and
    /// brackets; a dot survives only between two digits), tokens are split
    /// on brackets, and finally grouped: Hanzi-bearing and numeric tokens
    /// stand alone while consecutive alpha tokens join into one phrase.
    pub fn new(raw: &str) -> Self {
        let input: String = raw.nfc().collect::<String>().to_lowercase();
        let tokens = split_and_trim(input.trim());

        let mut words: Vec<String> = Vec::new();
        let mut alpha_run = String::new();
        for token in &tokens {
            for sub in split_brackets(token) {
                match classify_token(&sub) {
                    TokenKind::Han | TokenKind::Numeric => {
                        if !alpha_run.is_empty() {
                            words.push(std::mem::take(&mut alpha_run));
                        }
                        words.push(sub);
                    }
                    TokenKind::Alpha => {
                        if alpha_run.is_empty() {
                            alpha_run = sub;
                        } else {
                            alpha_run.push(' ');
                            alpha_run.push_str(&sub);
                        }
                    }
                }
            }
        }
        if !alpha_run.is_empty() {
            words.push(alpha_run);
        }

        IndexSentence {
            phrases: words.iter().map(|w| IndexPhrase::from_str(w)).collect(),
        }
    }

    /// Rebuild a sentence from already-serialized phrase strings (the
    /// `word_chars` column split on `|`).
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        IndexSentence {
            phrases: words
                .into_iter()
                .map(|w| IndexPhrase::from_str(w.as_ref()))
                .collect(),
        }
    }

    pub fn phrases(&self) -> &[IndexPhrase] {
        &self.phrases
    }

    /// Pipe-joined serialization.
    pub fn to_string(&self) -> String {
        self.phrases
            .iter()
            .map(IndexPhrase::to_string)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Pipe-joined pinyin serialization.
    pub fn to_pinyin(&self, table: &PinyinTable) -> String {
        self.phrases
            .iter()
            .map(|p| p.to_pinyin(table))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Phrase strings, in order.
    pub fn words(&self) -> Vec<String> {
        self.phrases.iter().map(IndexPhrase::to_string).collect()
    }

    /// Apply [`IndexPhrase::trim`] to every phrase.
    pub fn trim(&mut self, prefixes: &[String], suffixes: &[String], ending_digits: u32) {
        for p in &mut self.phrases {
            p.trim(prefixes, suffixes, ending_digits);
        }
    }
}

/// Single pass over runes: keep digits, Latin letters, Hanzi and brackets;
/// a dot survives only with a digit on both sides; everything else becomes a
/// separator, with separator runs collapsed. Returns the whitespace-split
/// tokens.
fn split_and_trim(input: &str) -> Vec<String> {
    let runes: Vec<char> = input.chars().collect();
    let mut kept: Vec<char> = Vec::with_capacity(runes.len());
    let mut left = CharClass::Other;
    for (i, &r) in runes.iter().enumerate() {
        let class = classify_char(r);
        match class {
            CharClass::Other => {
                if left != CharClass::Other {
                    kept.push(' ');
                }
                left = CharClass::Other;
            }
            CharClass::Digit
            | CharClass::Latin
            | CharClass::Han
            | CharClass::OpenBracket
            | CharClass::CloseBracket => {
                kept.push(r);
                left = class;
            }
            CharClass::Dot => {
                let next_is_digit = runes
                    .get(i + 1)
                    .is_some_and(|&n| classify_char(n) == CharClass::Digit);
                if left == CharClass::Digit && next_is_digit {
                    kept.push(r);
                    left = CharClass::Dot;
                } else {
                    if left != CharClass::Other {
                        kept.push(' ');
                    }
                    left = CharClass::Other;
                }
            }
        }
    }
    kept.into_iter()
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Split a token on bracket runes; a token without brackets loses its inner
/// spaces instead.
fn split_brackets(token: &str) -> Vec<String> {
    let has_bracket = token.chars().any(|c| {
        matches!(
            classify_char(c),
            CharClass::OpenBracket | CharClass::CloseBracket
        )
    });
    if has_bracket {
        token
            .chars()
            .map(|c| {
                if matches!(
                    classify_char(c),
                    CharClass::OpenBracket | CharClass::CloseBracket
                ) {
                    ' '
                } else {
                    c
                }
            })
            .collect::<String>()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    } else {
        vec![token.replace(' ', "")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pinyin::PinyinTable;

    #[test]
    fn pure_han_short() {
        let s = IndexSentence::new("苹果");
        assert_eq!(s.words(), vec!["苹果"]);
        assert_eq!(s.phrases()[0].weight(), 4);
        assert_eq!(s.phrases()[0].chars().len(), 2);
    }

    #[test]
    fn mixed_name_grouping() {
        let s = IndexSentence::new("哆啦A梦 添乐 洗发露");
        assert_eq!(s.words(), vec!["哆啦a梦", "添乐", "洗发露"]);
        // Hanzi-bearing tokens explode per rune, 'a' included.
        assert_eq!(s.phrases()[0].chars().len(), 4);
        assert_eq!(s.phrases()[0].weight(), 7);
    }

    #[test]
    fn alpha_runs_join_and_numbers_stand_alone() {
        let s = IndexSentence::new("Apple iPhone 15 pro");
        assert_eq!(s.words(), vec!["apple iphone", "15", "pro"]);
        assert_eq!(s.phrases()[0].chars().len(), 2);
        assert_eq!(s.phrases()[0].weight(), 11);
    }

    #[test]
    fn decimal_point_survives_between_digits() {
        let s = IndexSentence::new("净含量3.5kg");
        assert_eq!(s.words(), vec!["净含量3.5kg"]);

        let s = IndexSentence::new("a.b 3. x");
        assert_eq!(s.words(), vec!["a b", "3", "x"]);
    }

    #[test]
    fn brackets_split_tokens() {
        let s = IndexSentence::new("苹果(红色)大");
        assert_eq!(s.words(), vec!["苹果", "红色", "大"]);

        let s = IndexSentence::new("【特价】洗发露");
        assert_eq!(s.words(), vec!["特价", "洗发露"]);
    }

    #[test]
    fn punctuation_separates() {
        let s = IndexSentence::new("苹果，手机/壳");
        assert_eq!(s.words(), vec!["苹果", "手机", "壳"]);
    }

    #[test]
    fn empty_input_yields_empty_sentence() {
        let s = IndexSentence::new("");
        assert!(s.phrases().is_empty());
        assert_eq!(s.to_string(), "");

        let s = IndexSentence::new("  ，。  ");
        assert!(s.phrases().is_empty());
    }

    #[test]
    fn serialization_round_trip() {
        for raw in ["哆啦A梦 添乐 洗发露", "Apple iPhone 15 pro", "苹果(红色)大"] {
            let s = IndexSentence::new(raw);
            let rebuilt = IndexSentence::from_words(s.to_string().split('|'));
            assert_eq!(s, rebuilt, "round trip of {raw}");
        }
    }

    #[test]
    fn sentence_pinyin() {
        let table = PinyinTable::builtin();
        let s = IndexSentence::new("苹果手机");
        assert_eq!(s.to_pinyin(&table), "ping guo shou ji");

        let s = IndexSentence::new("苹果 iphone");
        assert_eq!(s.to_pinyin(&table), "ping guo|iphone");
    }

    #[test]
    fn trim_prefix_and_suffix() {
        let mut p = IndexPhrase::from_str("奥利司他胶囊");
        p.trim(&[], &["胶囊".to_string()], 6);
        assert_eq!(p.to_string(), "奥利司他");

        let mut p = IndexPhrase::from_str("纯天然苹果汁");
        p.trim(&["纯天然".to_string()], &[], 6);
        assert_eq!(p.to_string(), "苹果汁");

        // At most one of each, longest first.
        let mut p = IndexPhrase::from_str("纯天然苹果胶囊");
        p.trim(&["纯天然".to_string(), "纯".to_string()], &["胶囊".to_string()], 6);
        assert_eq!(p.to_string(), "苹果");
    }

    #[test]
    fn trailing_digits_win_over_affixes() {
        let mut p = IndexPhrase::from_str("型号12345678");
        p.trim(&["型号".to_string()], &[], 6);
        assert_eq!(p.to_string(), "12345678");
        assert_eq!(p.chars().len(), 1);
        assert_eq!(p.chars()[0].kind, CharKind::NonHan);

        // Below the threshold the digit rule does not fire.
        let mut p = IndexPhrase::from_str("型号12345");
        p.trim(&[], &[], 6);
        assert_eq!(p.to_string(), "型号12345");

        // Zero disables the rule entirely.
        let mut p = IndexPhrase::from_str("型号12345678");
        p.trim(&[], &[], 0);
        assert_eq!(p.to_string(), "型号12345678");
    }

    #[test]
    fn index_word_weights() {
        assert_eq!(index_word_weight("苹果手机"), 4);
        assert_eq!(index_word_weight("哆啦a梦"), 4);
        assert_eq!(index_word_weight("ping guo shou ji"), 4);
        assert_eq!(index_word_weight("iphone"), 1);
        assert_eq!(index_word_weight("12345678"), 1);
    }
}
