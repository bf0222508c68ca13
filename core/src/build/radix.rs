//! Stage 4: explode index words into per-level radix trie nodes.
//!
//! Levels are strictly sequential: all writers of level ℓ−1 drain before
//! level ℓ starts, so the linker always finds a complete parent layer. The
//! `hierarchy_key` read-then-write dance lives in the consumer because two
//! batches may both observe the same missing key; doing lookup and insert in
//! one transaction keeps the key unique.

use std::thread;

use ahash::AHashMap;
use crossbeam_channel::{bounded, Receiver, Sender};
use redb::ReadableTable;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::ranges::IdRange;
use crate::sentence::{chars_to_string, to_index_chars};
use crate::store::{
    decode_row, encode_row, next_id, IndexStore, IndexWord, RadixNode, INDEX_WORDS,
    INDEX_WORDS_BY_LEN, RADIX_BY_HIERARCHY, RADIX_BY_WEIGHT, RADIX_NODES,
};

const WORKER_BATCH: u64 = 3000;
const NODE_BATCH: usize = 500;
const CHANNEL_CAP: usize = 100;

/// An exploded node before id assignment.
#[derive(Debug, Clone)]
struct RadixDraft {
    key: String,
    hierarchy_key: String,
    index_id: u64,
    weight: u32,
}

/// Run stage 4. Returns the number of nodes created.
pub(crate) fn run(store: &IndexStore) -> Result<u64> {
    let max_len = store.max_index_word_len()?;
    if max_len < 2 {
        return Ok(0);
    }
    info!(max_len, "building radix levels 2..={max_len}");
    let mut total = 0u64;
    for level in 2..=max_len {
        let count = build_level(store, level)?;
        debug!(level, count, "radix level complete");
        total += count;
    }
    Ok(total)
}

fn build_level(store: &IndexStore, level: u32) -> Result<u64> {
    let level_range = store.index_words_range_at_len(level)?;
    if level_range.is_empty() {
        return Ok(0);
    }

    let ranges = level_range.split(WORKER_BATCH, 0);
    let (tx, rx) = bounded::<Vec<RadixDraft>>(CHANNEL_CAP);
    thread::scope(|scope| {
        for range in ranges {
            let tx = tx.clone();
            scope.spawn(move || read_words_to_nodes(store, range, level, &tx));
        }
        drop(tx);
        write_nodes(store, rx)
    })
}

/// Producer: stream the level's index words in id order and explode each
/// into one draft per depth 2..=ℓ, deduplicating by hierarchy key within
/// the outgoing batch (a terminal draft wins over an intermediate).
fn read_words_to_nodes(store: &IndexStore, range: IdRange, level: u32, tx: &Sender<Vec<RadixDraft>>) {
    let txn = match store.begin_read() {
        Ok(t) => t,
        Err(e) => {
            error!(level, error = %e, "read transaction failed");
            return;
        }
    };
    let (by_len, words_t) = match (txn.open_table(INDEX_WORDS_BY_LEN), txn.open_table(INDEX_WORDS)) {
        (Ok(a), Ok(b)) => (a, b),
        _ => {
            error!(level, "open index word tables failed");
            return;
        }
    };
    let iter = match by_len.range((level, range.min_id)..=(level, range.max_id)) {
        Ok(it) => it,
        Err(e) => {
            error!(level, error = %e, "level scan failed");
            return;
        }
    };

    let mut batch: AHashMap<String, RadixDraft> = AHashMap::new();
    for item in iter {
        let Ok((k, _)) = item else { continue };
        let (_, id) = k.value();
        let word: IndexWord = match words_t.get(&id) {
            Ok(Some(bytes)) => match decode_row(&bytes.value()) {
                Ok(w) => w,
                Err(e) => {
                    warn!(id, error = %e, "undecodable index word skipped");
                    continue;
                }
            },
            _ => continue,
        };

        let chars = to_index_chars(&word.word);
        if chars.len() < 2 {
            continue;
        }
        for depth in 2..=chars.len() {
            let hierarchy_key = chars_to_string(&chars[..depth]);
            let key = if depth == 2 {
                hierarchy_key.clone()
            } else {
                chars_to_string(&chars[depth - 1..depth])
            };
            let index_id = if depth == chars.len() { word.id } else { 0 };
            let draft = RadixDraft {
                key,
                hierarchy_key,
                index_id,
                weight: depth as u32,
            };
            merge_draft(&mut batch, draft);
            if batch.len() >= NODE_BATCH {
                let drafts: Vec<RadixDraft> = batch.drain().map(|(_, d)| d).collect();
                if tx.send(drafts).is_err() {
                    return;
                }
            }
        }
    }
    if !batch.is_empty() {
        let drafts: Vec<RadixDraft> = batch.drain().map(|(_, d)| d).collect();
        let _ = tx.send(drafts);
    }
}

/// Within a batch the terminal draft (non-zero `index_id`) wins.
fn merge_draft(batch: &mut AHashMap<String, RadixDraft>, draft: RadixDraft) {
    use std::collections::hash_map::Entry;
    match batch.entry(draft.hierarchy_key.clone()) {
        Entry::Occupied(mut e) => {
            if e.get().index_id == 0 && draft.index_id != 0 {
                e.insert(draft);
            }
        }
        Entry::Vacant(e) => {
            e.insert(draft);
        }
    }
}

/// Consumer: look existing keys up; upgrade intermediates to terminals when
/// a terminal draft arrives; insert the rest. Other collisions keep the
/// existing row.
fn write_nodes(store: &IndexStore, rx: Receiver<Vec<RadixDraft>>) -> Result<u64> {
    let mut created = 0u64;
    for batch in rx {
        let txn = match store.begin_write() {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "transaction begin failed, batch dropped");
                continue;
            }
        };
        let mut batch_created = 0u64;
        let outcome = (|| -> Result<()> {
            let mut nodes_t = txn.open_table(RADIX_NODES)?;
            let mut by_key = txn.open_table(RADIX_BY_HIERARCHY)?;
            let mut by_weight = txn.open_table(RADIX_BY_WEIGHT)?;
            let mut next = next_id(&nodes_t)?;

            for draft in batch {
                let existing = by_key.get(draft.hierarchy_key.as_str())?.map(|g| g.value());
                match existing {
                    Some(id) => {
                        if draft.index_id == 0 {
                            continue;
                        }
                        let bytes = nodes_t.get(&id)?.map(|g| g.value());
                        let Some(bytes) = bytes else { continue };
                        let mut node: RadixNode = decode_row(&bytes)?;
                        if node.index_id == 0 {
                            node.index_id = draft.index_id;
                            nodes_t.insert(&id, encode_row(&node)?)?;
                        }
                    }
                    None => {
                        let id = next;
                        next += 1;
                        let node = RadixNode {
                            id,
                            parent_id: 0,
                            key: draft.key,
                            hierarchy_key: draft.hierarchy_key,
                            index_id: draft.index_id,
                            weight: draft.weight,
                            child_count: 0,
                        };
                        nodes_t.insert(&id, encode_row(&node)?)?;
                        by_key.insert(node.hierarchy_key.as_str(), &id)?;
                        by_weight.insert(&(node.weight, id), &())?;
                        batch_created += 1;
                    }
                }
            }
            Ok(())
        })();
        match outcome {
            Ok(()) => match txn.commit() {
                Ok(()) => created += batch_created,
                Err(e) => error!(error = %e, "commit failed, batch dropped"),
            },
            Err(e) => error!(error = %e, "batch write failed, rolled back"),
        }
    }
    Ok(created)
}
