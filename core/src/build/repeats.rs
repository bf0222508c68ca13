//! Stage 2: mine high-frequency Hanzi affixes per dictionary into
//! `dict_word_repeats`.

use std::thread;

use ahash::AHashSet;
use crossbeam_channel::{bounded, Receiver, Sender};
use redb::ReadableTable;
use tracing::{debug, error, warn};

use crate::affix::find_common_affixes;
use crate::chars::{han_char_count, has_han_char};
use crate::errors::Result;
use crate::store::{
    decode_row, encode_row, next_id, AffixKind, DictWord, DictWordRepeat, IndexStore,
    DICT_WORDS, DICT_WORD_REPEATS,
};

const BATCH_SIZE: usize = 1000;
const SCAN_BATCH: u64 = 5000;
const CHANNEL_CAP: usize = 10;

/// Mine affixes for every dictionary. Returns the number of repeat rows.
pub(crate) fn run(store: &IndexStore, min_freq: u32) -> Result<u64> {
    let dicts = distinct_dicts(store)?;
    if dicts.is_empty() {
        return Ok(0);
    }
    let whole = store.dict_words_range()?;

    let (tx, rx) = bounded::<Vec<DictWordRepeat>>(CHANNEL_CAP);
    thread::scope(|scope| {
        for dict in &dicts {
            let tx = tx.clone();
            scope.spawn(move || collect_dict_repeats(store, dict, whole, min_freq, &tx));
        }
        drop(tx);
        write_repeats(store, rx)
    })
}

fn distinct_dicts(store: &IndexStore) -> Result<Vec<String>> {
    let txn = store.begin_read()?;
    let table = txn.open_table(DICT_WORDS)?;
    let mut dicts = AHashSet::new();
    for item in table.iter()? {
        let (_, bytes) = item?;
        let row: DictWord = decode_row(&bytes.value())?;
        dicts.insert(row.dict);
    }
    let mut dicts: Vec<String> = dicts.into_iter().collect();
    dicts.sort();
    Ok(dicts)
}

/// Producer: one per dictionary. Streams the dictionary's Hanzi-bearing
/// phrases in id-bounded sub-batches, deduplicates them, mines, and ships
/// the retained affixes in batches.
fn collect_dict_repeats(
    store: &IndexStore,
    dict: &str,
    whole: crate::ranges::IdRange,
    min_freq: u32,
    tx: &Sender<Vec<DictWordRepeat>>,
) {
    let mut phrases: AHashSet<String> = AHashSet::new();
    let window = whole.range_batch(SCAN_BATCH).max(1);
    let mut start = whole.min_id;
    while start <= whole.max_id {
        let end = (start + window - 1).min(whole.max_id);
        let txn = match store.begin_read() {
            Ok(t) => t,
            Err(e) => {
                error!(dict, error = %e, "read transaction failed");
                return;
            }
        };
        let table = match txn.open_table(DICT_WORDS) {
            Ok(t) => t,
            Err(e) => {
                error!(dict, error = %e, "open dict_words failed");
                return;
            }
        };
        let iter = match table.range(start..=end) {
            Ok(it) => it,
            Err(e) => {
                warn!(dict, error = %e, "range scan failed");
                start = end + 1;
                continue;
            }
        };
        for item in iter {
            let Ok((_, bytes)) = item else { continue };
            let Ok(row) = decode_row::<DictWord>(&bytes.value()) else {
                continue;
            };
            if row.dict != dict {
                continue;
            }
            for phrase in row.word_chars.split('|') {
                if has_han_char(phrase) {
                    phrases.insert(phrase.to_string());
                }
            }
        }
        start = end + 1;
    }
    debug!(dict, phrases = phrases.len(), "mining affixes");

    let (prefixes, suffixes) = find_common_affixes(phrases.iter().map(String::as_str), min_freq);
    let mut batch = Vec::with_capacity(BATCH_SIZE);
    for (kind, freqs) in [(AffixKind::Prefix, prefixes), (AffixKind::Suffix, suffixes)] {
        for (word, repeat_count) in freqs {
            let word_len = han_char_count(&word) as u32;
            batch.push(DictWordRepeat {
                id: 0,
                dict: dict.to_string(),
                kind,
                word,
                word_len,
                repeat_count,
            });
            if batch.len() >= BATCH_SIZE {
                if tx.send(std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE))).is_err() {
                    return;
                }
            }
        }
    }
    if !batch.is_empty() {
        let _ = tx.send(batch);
    }
}

/// Consumer: skips rows with an empty dict, a zero count, or fewer than two
/// Hanzi runes.
fn write_repeats(store: &IndexStore, rx: Receiver<Vec<DictWordRepeat>>) -> Result<u64> {
    let mut written = 0u64;
    for mut batch in rx {
        let txn = match store.begin_write() {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "transaction begin failed, batch dropped");
                continue;
            }
        };
        let mut batch_written = 0u64;
        let outcome = (|| -> Result<()> {
            let mut table = txn.open_table(DICT_WORD_REPEATS)?;
            let mut next = next_id(&table)?;
            for row in &mut batch {
                if row.dict.is_empty() || row.repeat_count == 0 || row.word_len < 2 {
                    continue;
                }
                row.id = next;
                table.insert(&row.id, encode_row(row)?)?;
                next += 1;
                batch_written += 1;
            }
            Ok(())
        })();
        match outcome {
            Ok(()) => match txn.commit() {
                Ok(()) => written += batch_written,
                Err(e) => error!(error = %e, "commit failed, batch dropped"),
            },
            Err(e) => error!(error = %e, "batch write failed, rolled back"),
        }
    }
    Ok(written)
}
