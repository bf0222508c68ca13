//! Stage 3: trim affixes, generate variants, and upsert `index_words` plus
//! the `dict_index_ids` edges.
//!
//! Workers split disjoint `dict_words` slices into variant drafts carrying
//! their dictionary-id sets; the single consumer resolves each draft word
//! against the store (the unique word index is the deduplication mechanism),
//! subtracts already-present edges, and commits per batch. Lookup and insert
//! happen inside one transaction, so two batches observing the same missing
//! word cannot both insert it.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use ahash::{AHashMap, AHashSet};
use crossbeam_channel::{bounded, Receiver, Sender};
use lru::LruCache;
use redb::ReadableTable;
use tracing::{debug, error, info, warn};

use crate::chars::has_han_char;
use crate::errors::{IndexError, Result};
use crate::pinyin::{word_to_pinyin, PinyinTable};
use crate::ranges::IdRange;
use crate::sentence::{index_word_weight, IndexSentence};
use crate::store::{
    decode_row, encode_row, next_id, AffixKind, DictWord, IndexStore, IndexWord, WordKind,
    DICT_INDEX_BY_INDEX, DICT_INDEX_IDS, DICT_WORDS, DICT_WORD_REPEATS, INDEX_WORDS,
    INDEX_WORDS_BY_LEN, INDEX_WORDS_BY_WORD,
};

const WORKER_BATCH: u64 = 10_000;
const SUB_BATCH: u64 = 150;
const CHANNEL_CAP: usize = 100;
const WORD_ID_CACHE: usize = 100_000;

/// A variant word with the dictionary entries it must link to.
#[derive(Debug, Clone)]
struct IndexWordDraft {
    kind: WordKind,
    word: String,
    word_len: u32,
    dict_ids: AHashSet<u64>,
}

/// Run stage 3. Returns the number of `index_words` rows inserted.
pub(crate) fn run(
    store: &IndexStore,
    pinyin: &Arc<PinyinTable>,
    mask_count: u32,
    min_freq: u32,
    ending_digits: u32,
) -> Result<u64> {
    let table_range = store.dict_words_range()?;
    if table_range.is_empty() {
        return Ok(0);
    }

    let (prefix_map, suffix_map) = load_affix_lists(store, min_freq)?;
    let ranges = table_range.split(WORKER_BATCH, 0);
    info!(
        rows = table_range.count,
        workers = ranges.len(),
        "splitting dictionary rows across workers"
    );

    let (tx, rx) = bounded::<Vec<IndexWordDraft>>(CHANNEL_CAP);
    thread::scope(|scope| {
        for range in ranges {
            let tx = tx.clone();
            let prefix_map = &prefix_map;
            let suffix_map = &suffix_map;
            let pinyin = Arc::clone(pinyin);
            scope.spawn(move || {
                read_and_split(
                    store,
                    range,
                    prefix_map,
                    suffix_map,
                    &pinyin,
                    mask_count,
                    ending_digits,
                    &tx,
                )
            });
        }
        drop(tx);
        write_index_words(store, rx)
    })
}

/// Per-dict affix lists ordered longest first, filtered to the trimmable
/// subset: prefixes need more than three Hanzi runes, suffixes any mined
/// length, both at or above the frequency floor.
fn load_affix_lists(
    store: &IndexStore,
    min_freq: u32,
) -> Result<(AHashMap<String, Vec<String>>, AHashMap<String, Vec<String>>)> {
    let txn = store.begin_read()?;
    let table = txn.open_table(DICT_WORD_REPEATS)?;

    let mut rows: Vec<crate::store::DictWordRepeat> = Vec::new();
    for item in table.iter()? {
        let (_, bytes) = item?;
        let row: crate::store::DictWordRepeat = decode_row(&bytes.value())?;
        let usable = row.repeat_count >= min_freq
            && match row.kind {
                AffixKind::Prefix => row.word_len > 3,
                AffixKind::Suffix => true,
            };
        if usable {
            rows.push(row);
        }
    }
    rows.sort_by(|a, b| {
        b.word_len
            .cmp(&a.word_len)
            .then_with(|| a.word.cmp(&b.word))
    });

    let mut prefix_map: AHashMap<String, Vec<String>> = AHashMap::new();
    let mut suffix_map: AHashMap<String, Vec<String>> = AHashMap::new();
    for row in rows {
        let map = match row.kind {
            AffixKind::Prefix => &mut prefix_map,
            AffixKind::Suffix => &mut suffix_map,
        };
        map.entry(row.dict).or_default().push(row.word);
    }
    Ok((prefix_map, suffix_map))
}

/// Producer: stream a worker's id slice in small sub-batches, trim and
/// variant-split each row, ship drafts.
#[allow(clippy::too_many_arguments)]
fn read_and_split(
    store: &IndexStore,
    range: IdRange,
    prefix_map: &AHashMap<String, Vec<String>>,
    suffix_map: &AHashMap<String, Vec<String>>,
    pinyin: &PinyinTable,
    mask_count: u32,
    ending_digits: u32,
    tx: &Sender<Vec<IndexWordDraft>>,
) {
    let mut start = range.min_id;
    while start <= range.max_id {
        let end = (start + SUB_BATCH - 1).min(range.max_id);
        let rows = match load_rows(store, start, end) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(start, end, error = %e, "sub-batch read failed, skipped");
                start = end + 1;
                continue;
            }
        };
        if !rows.is_empty() {
            let drafts = split_rows(
                &rows,
                prefix_map,
                suffix_map,
                pinyin,
                mask_count,
                ending_digits,
            );
            debug!(
                rows = rows.len(),
                drafts = drafts.len(),
                start,
                end,
                "dictionary rows split into index words"
            );
            if !drafts.is_empty() && tx.send(drafts).is_err() {
                return;
            }
        }
        start = end + 1;
    }
}

fn load_rows(store: &IndexStore, start: u64, end: u64) -> Result<Vec<DictWord>> {
    let txn = store.begin_read()?;
    let table = txn.open_table(DICT_WORDS)?;
    let mut rows = Vec::new();
    for item in table.range(start..=end)? {
        let (_, bytes) = item?;
        rows.push(decode_row(&bytes.value())?);
    }
    Ok(rows)
}

/// Trim each row's phrases, generate variants, fold them into drafts keyed
/// by word, then add a pinyin draft for every Hanzi-bearing word.
fn split_rows(
    rows: &[DictWord],
    prefix_map: &AHashMap<String, Vec<String>>,
    suffix_map: &AHashMap<String, Vec<String>>,
    pinyin: &PinyinTable,
    mask_count: u32,
    ending_digits: u32,
) -> Vec<IndexWordDraft> {
    const NO_AFFIXES: &Vec<String> = &Vec::new();

    let mut char_words: AHashMap<String, IndexWordDraft> = AHashMap::new();
    for row in rows {
        let mut sentence = IndexSentence::from_words(row.word_chars.split('|'));
        sentence.trim(
            prefix_map.get(&row.dict).unwrap_or(NO_AFFIXES),
            suffix_map.get(&row.dict).unwrap_or(NO_AFFIXES),
            ending_digits,
        );
        for word in sentence.variant_words(mask_count, true) {
            let word = word.trim();
            if word.is_empty() {
                continue;
            }
            char_words
                .entry(word.to_string())
                .or_insert_with(|| IndexWordDraft {
                    kind: WordKind::Chars,
                    word: word.to_string(),
                    word_len: index_word_weight(word),
                    dict_ids: AHashSet::new(),
                })
                .dict_ids
                .insert(row.id);
        }
    }

    let mut drafts = Vec::with_capacity(char_words.len() * 2);
    for draft in char_words.into_values() {
        if has_han_char(&draft.word) {
            let py = word_to_pinyin(&draft.word, pinyin);
            if !py.is_empty() && py != draft.word {
                drafts.push(IndexWordDraft {
                    kind: WordKind::Pinyin,
                    word_len: index_word_weight(&py),
                    word: py,
                    dict_ids: draft.dict_ids.clone(),
                });
            }
        }
        drafts.push(draft);
    }
    drafts
}

/// Consumer: resolve draft words to ids (cache → unique index → fresh
/// insert), subtract edges already present, and insert the remainder, all
/// inside one transaction per batch. An integrity trip rolls the batch back
/// and retries it once with fresh reads.
fn write_index_words(store: &IndexStore, rx: Receiver<Vec<IndexWordDraft>>) -> Result<u64> {
    let mut word_ids: LruCache<String, u64> =
        LruCache::new(NonZeroUsize::new(WORD_ID_CACHE).unwrap());
    let mut inserted = 0u64;

    for batch in rx {
        // Two drafts in one batch may carry the same word (a pinyin form can
        // collide with a char form); merge before touching the store.
        let mut merged: AHashMap<String, IndexWordDraft> = AHashMap::new();
        for draft in batch {
            use std::collections::hash_map::Entry;
            match merged.entry(draft.word.clone()) {
                Entry::Occupied(mut e) => e.get_mut().dict_ids.extend(draft.dict_ids),
                Entry::Vacant(e) => {
                    e.insert(draft);
                }
            }
        }

        match apply_batch(store, &mut word_ids, &merged) {
            Ok(count) => inserted += count,
            Err(e @ IndexError::Integrity(_)) => {
                warn!(error = %e, "integrity trip, retrying batch with fresh reads");
                word_ids.clear();
                match apply_batch(store, &mut word_ids, &merged) {
                    Ok(count) => inserted += count,
                    Err(e) => {
                        error!(error = %e, "retry failed, batch dropped");
                        word_ids.clear();
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "batch write failed, rolled back");
                word_ids.clear();
            }
        }
    }
    Ok(inserted)
}

/// One batch in one transaction. Returns the number of index words inserted.
fn apply_batch(
    store: &IndexStore,
    word_ids: &mut LruCache<String, u64>,
    merged: &AHashMap<String, IndexWordDraft>,
) -> Result<u64> {
    let txn = store.begin_write()?;
    let mut batch_inserted = 0u64;
    {
        let mut words_t = txn.open_table(INDEX_WORDS)?;
        let mut by_word = txn.open_table(INDEX_WORDS_BY_WORD)?;
        let mut by_len = txn.open_table(INDEX_WORDS_BY_LEN)?;
        let mut edges_t = txn.open_table(DICT_INDEX_IDS)?;
        let mut by_index = txn.open_table(DICT_INDEX_BY_INDEX)?;

        let mut next_word_id = next_id(&words_t)?;
        let mut next_edge_id = next_id(&edges_t)?;

        for (word, draft) in merged {
            let mut dict_ids = draft.dict_ids.clone();
            let cached = word_ids.get(word).copied();
            let existing = match cached {
                Some(id) => Some(id),
                None => by_word.get(word.as_str())?.map(|g| g.value()),
            };
            let id = match existing {
                Some(id) => {
                    // Edge-set idempotence: drop pairs already linked.
                    for item in by_index.range((id, u64::MIN)..=(id, u64::MAX))? {
                        let (k, _) = item?;
                        dict_ids.remove(&k.value().1);
                    }
                    id
                }
                None => {
                    let id = next_word_id;
                    next_word_id += 1;
                    let row = IndexWord {
                        id,
                        kind: draft.kind,
                        word: word.clone(),
                        word_len: draft.word_len,
                    };
                    words_t.insert(&id, encode_row(&row)?)?;
                    if by_word.insert(word.as_str(), &id)?.is_some() {
                        return Err(IndexError::Integrity(format!(
                            "index word inserted twice: {word}"
                        )));
                    }
                    by_len.insert(&(draft.word_len, id), &())?;
                    batch_inserted += 1;
                    id
                }
            };
            for dict_id in &dict_ids {
                edges_t.insert(&next_edge_id, &(id, *dict_id))?;
                by_index.insert(&(id, *dict_id), &next_edge_id)?;
                next_edge_id += 1;
            }
            word_ids.put(word.clone(), id);
        }
    }
    txn.commit()?;
    Ok(batch_inserted)
}
