//! Frequency mining of shared Hanzi prefixes and suffixes within one
//! dictionary.
//!
//! Catalog noise like "纯天然" or "有限公司" repeats across thousands of
//! entries; left in place it would bloat the trie and drown discriminative
//! matches. The miner counts short affixes over a dictionary's normalized
//! phrases so stage 3 can strip the frequent ones before variant generation.

use ahash::AHashMap;

use crate::chars::{han_char_count, has_han_char};

/// Default frequency floor below which an affix is not considered common.
pub const DEFAULT_MIN_FREQ: u32 = 10;

/// Affix rune-length bounds considered by the miner.
const MIN_AFFIX_LEN: usize = 2;
const MAX_AFFIX_LEN: usize = 6;

/// Count common prefixes and suffixes over a multiset of phrase strings.
///
/// Only phrases of at least 4 runes participate, affix candidates span 2–6
/// runes, and a candidate must leave more than 2 runes of residue when
/// trimmed. Candidates are counted when they carry a Hanzi rune; retained
/// candidates additionally need at least two Hanzi runes and a count at or
/// above `min_freq` (0 falls back to [`DEFAULT_MIN_FREQ`]).
pub fn find_common_affixes<'a, I>(
    words: I,
    min_freq: u32,
) -> (AHashMap<String, u32>, AHashMap<String, u32>)
where
    I: IntoIterator<Item = &'a str>,
{
    let min_freq = if min_freq == 0 { DEFAULT_MIN_FREQ } else { min_freq };

    let mut prefix_freq: AHashMap<String, u32> = AHashMap::new();
    let mut suffix_freq: AHashMap<String, u32> = AHashMap::new();

    for word in words {
        let runes: Vec<char> = word.chars().collect();
        let len = runes.len();
        if len < 4 {
            continue;
        }
        for i in MIN_AFFIX_LEN..=MAX_AFFIX_LEN.min(len) {
            if len - i <= 2 {
                break;
            }
            let prefix: String = runes[..i].iter().collect();
            if has_han_char(&prefix) {
                *prefix_freq.entry(prefix).or_default() += 1;
            }
            let suffix: String = runes[len - i..].iter().collect();
            if has_han_char(&suffix) {
                *suffix_freq.entry(suffix).or_default() += 1;
            }
        }
    }

    let retain = |freqs: AHashMap<String, u32>| {
        freqs
            .into_iter()
            .filter(|(word, count)| *count >= min_freq && han_char_count(word) >= 2)
            .collect()
    };

    (retain(prefix_freq), retain(suffix_freq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_suffix_is_found() {
        // Twelve drug names sharing the 胶囊 suffix.
        let heads = [
            "奥利司他", "阿莫西林", "布洛芬酸", "维生素丸", "鱼油精华", "藿香正气",
            "感冒清热", "复方甘草", "牛黄解毒", "蛇胆川贝", "板蓝根冲", "金银花露",
        ];
        let words: Vec<String> = heads.iter().map(|h| format!("{h}胶囊")).collect();
        let (prefixes, suffixes) = find_common_affixes(words.iter().map(String::as_str), 10);

        assert_eq!(suffixes.get("胶囊").copied(), Some(12));
        // No shared prefix reaches the floor.
        assert!(prefixes.is_empty());
    }

    #[test]
    fn short_words_are_skipped() {
        let words = vec!["苹果"; 50];
        let (prefixes, suffixes) = find_common_affixes(words.iter().copied(), 10);
        assert!(prefixes.is_empty());
        assert!(suffixes.is_empty());
    }

    #[test]
    fn residue_bound_limits_affix_length() {
        // 5 runes: only length-2 affixes leave more than 2 runes behind.
        let words = vec!["纯天然苹果"; 10];
        let (prefixes, _) = find_common_affixes(words.iter().copied(), 10);
        assert_eq!(prefixes.get("纯天").copied(), Some(10));
        assert!(!prefixes.contains_key("纯天然"));
    }

    #[test]
    fn candidates_need_two_hanzi_runes() {
        // "k小" carries one Hanzi rune only and must not survive retention.
        let words = vec!["k小苹果茶叶"; 10];
        let (prefixes, _) = find_common_affixes(words.iter().copied(), 10);
        assert!(!prefixes.contains_key("k小"));
        assert_eq!(prefixes.get("k小苹").copied(), Some(10));
    }

    #[test]
    fn frequency_floor_applies() {
        let mut words = vec!["有限公司测试词".to_string(); 9];
        words.push("别的什么东西啊".to_string());
        let (prefixes, _) = find_common_affixes(words.iter().map(String::as_str), 10);
        assert!(!prefixes.contains_key("有限"));

        words.push("有限公司测试词".to_string());
        let (prefixes, _) = find_common_affixes(words.iter().map(String::as_str), 10);
        assert_eq!(prefixes.get("有限").copied(), Some(10));
    }
}
