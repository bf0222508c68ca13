//! Hanzi → pinyin syllable oracle.
//!
//! The transliteration table is a process-wide immutable artifact loaded at
//! startup and shared by reference across all pipeline workers. A compact
//! built-in table ships with the crate; deployments with a full character
//! inventory load their own TSV via [`PinyinTable::load_tsv`].

use std::path::Path;

use ahash::AHashMap;

use crate::chars::is_han_char;
use crate::errors::Result;

static BUILTIN_TSV: &str = include_str!("../data/pinyin.tsv");

/// Immutable `hanzi -> toneless syllable` table.
///
/// A rune without an entry is not an error: transliteration degrades to
/// passing the rune through unchanged.
#[derive(Debug, Clone, Default)]
pub struct PinyinTable {
    map: AHashMap<char, String>,
}

impl PinyinTable {
    /// The table embedded in the crate.
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_TSV)
    }

    /// Load a table from a TSV file (`<hanzi>\t<syllable>` per line,
    /// `#` comments and blank lines skipped).
    pub fn load_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Build a table from `(char, syllable)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (char, S)>,
        S: Into<String>,
    {
        let map = pairs.into_iter().map(|(c, s)| (c, s.into())).collect();
        Self { map }
    }

    fn parse(content: &str) -> Self {
        let mut map = AHashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut cols = line.split('\t');
            let (Some(han), Some(syllable)) = (cols.next(), cols.next()) else {
                continue;
            };
            let Some(c) = han.chars().next() else { continue };
            let syllable = syllable.trim();
            if !syllable.is_empty() {
                map.insert(c, syllable.to_string());
            }
        }
        Self { map }
    }

    /// First (most common) toneless syllable for a rune, if known.
    pub fn syllable(&self, c: char) -> Option<&str> {
        self.map.get(&c).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Transliterate a word: every known Hanzi rune becomes its syllable padded
/// with single spaces; everything else (including Hanzi the table does not
/// know) passes through. The result is space-normalized and trimmed.
pub fn word_to_pinyin(word: &str, table: &PinyinTable) -> String {
    let mut out = String::with_capacity(word.len() * 2);
    let mut pre_space = false;
    for c in word.chars() {
        if is_han_char(c) {
            if let Some(syllable) = table.syllable(c) {
                if !pre_space {
                    out.push(' ');
                }
                out.push_str(syllable);
                out.push(' ');
                pre_space = true;
                continue;
            }
        }
        out.push(c);
        pre_space = false;
    }

    // Collapse any space runs and trim the ends.
    let mut normalized = String::with_capacity(out.len());
    let mut last_was_space = true;
    for c in out.chars() {
        if c == ' ' {
            if !last_was_space {
                normalized.push(' ');
            }
            last_was_space = true;
        } else {
            normalized.push(c);
            last_was_space = false;
        }
    }
    normalized.trim_end().to_string()
}
