//! Variant generation: the alternate surface forms a phrase is indexed under.
//!
//! A phrase of weight ≥ 4 expands into a deduplicated set of index strings:
//! itself, its left-trimmed tails, the character-sorted reorderings, and the
//! middle-masked forms. Lighter phrases index only as themselves.

use ahash::AHashSet;

use crate::sentence::{chars_to_string, chars_weight, to_index_chars, IndexChar, IndexPhrase, IndexSentence};

/// Upper bound on maskable positions counted from the front of the phrase.
const MASK_WINDOW: usize = 6;

impl IndexPhrase {
    /// All index strings this phrase should be retrievable under.
    ///
    /// `mask_count` is the maximum number of masked chars per variant
    /// (0 disables masking); `out_of_order` adds the char-sorted form of
    /// every accumulated string.
    pub fn variant_words(&self, mask_count: u32, out_of_order: bool) -> Vec<String> {
        if self.weight() < 4 {
            return vec![self.to_string()];
        }

        let chars = self.chars();
        let mut set: AHashSet<String> = AHashSet::new();
        set.insert(self.to_string());

        // Left-trimmed tails, stopping once the remainder gets too light.
        for i in 1..=chars.len().saturating_sub(2) {
            let tail = &chars[i..];
            if chars_weight(tail) < 4 {
                break;
            }
            set.insert(chars_to_string(tail));
        }

        if out_of_order {
            let mut sorted_words = Vec::new();
            for word in &set {
                let mut cs = to_index_chars(word);
                if cs.len() <= 1 {
                    continue;
                }
                cs.sort_by(|a, b| a.text.cmp(&b.text));
                sorted_words.push(chars_to_string(&cs));
            }
            set.extend(sorted_words);
        }

        if mask_count > 0 {
            let mut masked_words = Vec::new();
            for word in &set {
                masked_words.extend(masked_variants(&to_index_chars(word), mask_count));
            }
            set.extend(masked_words);
        }

        set.into_iter().collect()
    }
}

impl IndexSentence {
    /// Union of the phrase variant sets.
    pub fn variant_words(&self, mask_count: u32, out_of_order: bool) -> Vec<String> {
        let mut set: AHashSet<String> = AHashSet::new();
        for p in self.phrases() {
            set.extend(p.variant_words(mask_count, out_of_order));
        }
        set.into_iter().collect()
    }
}

/// Mask 1..=r middle chars of the sequence.
///
/// Maskable positions are `1..=min(len-2, 6)`: never the first char, never
/// the last, and nothing past the mask window. Results lighter than weight 4
/// are discarded.
fn masked_variants(chars: &[IndexChar], mask_count: u32) -> Vec<String> {
    let len = chars.len();
    if len < 3 {
        return Vec::new();
    }
    let n = (len - 1).min(MASK_WINDOW);
    let r = (mask_count as usize).min(n - 1);
    let maskable: Vec<usize> = (1..=(len - 2).min(MASK_WINDOW)).collect();
    let r = r.min(maskable.len());

    let mut out = Vec::new();
    for k in 1..=r {
        for combo in combinations(&maskable, k) {
            let mut masked: Vec<IndexChar> = chars.to_vec();
            for &idx in &combo {
                masked[idx] = IndexChar::mask(masked[idx].kind);
            }
            if chars_weight(&masked) > 3 {
                out.push(chars_to_string(&masked));
            }
        }
    }
    out
}

/// All k-subsets of `items`, in lexicographic order.
fn combinations(items: &[usize], k: usize) -> Vec<Vec<usize>> {
    fn walk(
        items: &[usize],
        k: usize,
        start: usize,
        current: &mut Vec<usize>,
        results: &mut Vec<Vec<usize>>,
    ) {
        if current.len() == k {
            results.push(current.clone());
            return;
        }
        for i in start..items.len() {
            current.push(items[i]);
            walk(items, k, i + 1, current, results);
            current.pop();
        }
    }

    let mut results = Vec::new();
    walk(items, k, 0, &mut Vec::with_capacity(k), &mut results);
    results
}
