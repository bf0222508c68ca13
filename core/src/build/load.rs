//! Stage 1: stream dictionary CSV files into `dict_words`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, warn};

use crate::errors::{IndexError, Result};
use crate::pinyin::PinyinTable;
use crate::sentence::IndexSentence;
use crate::store::{encode_row, next_id, DictWord, IndexStore, DICT_WORDS};

const BATCH_SIZE: usize = 1000;
const CHANNEL_CAP: usize = 10;

/// Load every `.csv` file under `dict_dir`. Returns `(rows_read, rows_written)`.
pub(crate) fn run(
    store: &IndexStore,
    dict_dir: &Path,
    pinyin: &Arc<PinyinTable>,
) -> Result<(u64, u64)> {
    let dicts = match list_dicts(dict_dir) {
        Ok(dicts) => dicts,
        Err(e) => {
            warn!(error = %e, "dictionary directory unreadable");
            return Ok((0, 0));
        }
    };
    if dicts.is_empty() {
        warn!(dir = %dict_dir.display(), "no dictionary files found");
        return Ok((0, 0));
    }

    let (tx, rx) = bounded::<Vec<DictWord>>(CHANNEL_CAP);
    thread::scope(|scope| {
        for (dict, path) in &dicts {
            let tx = tx.clone();
            let pinyin = Arc::clone(pinyin);
            scope.spawn(move || read_csv_words(dict, path, &pinyin, &tx));
        }
        drop(tx);
        write_dict_words(store, rx)
    })
}

/// `(stem, path)` of every CSV file in the directory, sorted by stem.
fn list_dicts(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| IndexError::Input(format!("dict dir {}: {e}", dir.display())))?;
    let mut dicts = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.to_lowercase().ends_with(".csv") {
            dicts.push((name[..name.len() - 4].to_string(), path));
        }
    }
    dicts.sort();
    Ok(dicts)
}

/// Producer: one per dictionary file. File-level failures abandon the file;
/// row-level failures drop the row. Both are logged.
fn read_csv_words(dict: &str, path: &Path, pinyin: &PinyinTable, tx: &Sender<Vec<DictWord>>) {
    let started = Instant::now();
    let mut reader = match csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
    {
        Ok(r) => r,
        Err(e) => {
            warn!(dict, path = %path.display(), error = %e, "cannot open dictionary file");
            return;
        }
    };

    let mut count = 0u64;
    let mut batch = Vec::with_capacity(BATCH_SIZE);
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(dict, error = %e, "skipping unreadable row");
                continue;
            }
        };
        if record.len() < 2 {
            warn!(dict, row = ?record.position().map(|p| p.line()), "skipping malformed row");
            continue;
        }
        let name = record.get(0).unwrap_or("").trim();
        if name.is_empty() {
            continue;
        }
        let data = record.get(1).unwrap_or("").trim();
        let data = if data.is_empty() { "{}" } else { data };

        let sentence = IndexSentence::new(name);
        batch.push(DictWord {
            id: 0,
            dict: dict.to_string(),
            name: name.to_string(),
            data: data.to_string(),
            word_chars: sentence.to_string(),
            word_pinyin: sentence.to_pinyin(pinyin),
        });

        if batch.len() >= BATCH_SIZE {
            count += batch.len() as u64;
            if tx.send(std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE))).is_err() {
                return;
            }
        }
    }
    if !batch.is_empty() {
        count += batch.len() as u64;
        let _ = tx.send(batch);
    }
    debug!(dict, count, elapsed_ms = started.elapsed().as_millis() as u64, "dictionary file read");
}

/// Consumer: the single writer. One transaction per batch; a failed batch
/// rolls back and the pipeline continues.
fn write_dict_words(store: &IndexStore, rx: Receiver<Vec<DictWord>>) -> Result<(u64, u64)> {
    let mut read = 0u64;
    let mut written = 0u64;
    for mut batch in rx {
        read += batch.len() as u64;
        let txn = match store.begin_write() {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "transaction begin failed, batch dropped");
                continue;
            }
        };
        let mut batch_written = 0u64;
        let outcome = (|| -> Result<()> {
            let mut table = txn.open_table(DICT_WORDS)?;
            let mut next = next_id(&table)?;
            for row in &mut batch {
                row.id = next;
                match encode_row(row) {
                    Ok(bytes) => {
                        table.insert(&row.id, bytes)?;
                        next += 1;
                        batch_written += 1;
                    }
                    Err(e) => warn!(name = %row.name, error = %e, "row dropped"),
                }
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
    Ok((read, written))
}
