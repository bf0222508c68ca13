//! Five-stage batch pipeline that turns a directory of dictionary files into
//! a persisted multi-recall index.
//!
//! Every stage is a fan-out of producer threads feeding one consumer over a
//! bounded channel; the consumer owns the single store writer and commits
//! per batch. A stage begins only after the previous stage's writer has
//! returned, which is the happens-before edge the later stages rely on.

mod index_words;
mod link;
mod load;
mod radix;
mod repeats;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::errors::Result;
use crate::pinyin::PinyinTable;
use crate::store::IndexStore;
use crate::BuildConfig;

/// Per-stage row counts and the final location of the index.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub index_path: PathBuf,
    /// Rows read out of the CSV files (before row-level drops).
    pub rows_read: u64,
    pub dict_words: u64,
    pub word_repeats: u64,
    pub index_words: u64,
    pub radix_nodes: u64,
    pub linked_parents: u64,
    pub elapsed: Duration,
}

/// Orchestrates the five build stages against a fresh index store.
pub struct IndexBuilder {
    config: BuildConfig,
    pinyin: Arc<PinyinTable>,
}

impl IndexBuilder {
    /// Build with the configured pinyin table (external TSV when set,
    /// otherwise the built-in table).
    pub fn new(config: BuildConfig) -> Result<Self> {
        let pinyin = match &config.pinyin_table {
            Some(path) => PinyinTable::load_tsv(path)?,
            None => PinyinTable::builtin(),
        };
        Ok(IndexBuilder { config, pinyin: Arc::new(pinyin) })
    }

    /// Build with an explicit pinyin table.
    pub fn with_pinyin(config: BuildConfig, pinyin: PinyinTable) -> Self {
        IndexBuilder { config, pinyin: Arc::new(pinyin) }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run all five stages and return the report.
    ///
    /// The index lands at `<index_dir>/<index_name>.bin`; an empty name
    /// defaults to the current timestamp. An existing file at that path is
    /// a fatal error.
    pub fn build(&self) -> Result<BuildReport> {
        let started = Instant::now();

        let index_name = if self.config.index_name.is_empty() {
            chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
        } else {
            self.config.index_name.clone()
        };
        let index_path = self.config.index_dir.join(format!("{index_name}.bin"));

        let step = Instant::now();
        let store = IndexStore::create(&index_path)?;
        info!(path = %index_path.display(), elapsed_ms = step.elapsed().as_millis() as u64, "initialized index store");

        let step = Instant::now();
        let (rows_read, dict_words) =
            load::run(&store, &self.config.dict_dir, &self.pinyin)?;
        info!(rows_read, dict_words, elapsed_ms = step.elapsed().as_millis() as u64, "stage 1: dictionaries loaded");

        let step = Instant::now();
        let word_repeats = repeats::run(&store, self.config.min_freq)?;
        info!(word_repeats, elapsed_ms = step.elapsed().as_millis() as u64, "stage 2: common affixes collected");

        let step = Instant::now();
        let index_words = index_words::run(
            &store,
            &self.pinyin,
            self.config.mask_count,
            self.config.min_freq,
            self.config.ending_digits,
        )?;
        info!(index_words, elapsed_ms = step.elapsed().as_millis() as u64, "stage 3: index words created");

        let step = Instant::now();
        let radix_nodes = radix::run(&store)?;
        info!(radix_nodes, elapsed_ms = step.elapsed().as_millis() as u64, "stage 4: radix layers built");

        let step = Instant::now();
        let linked_parents = link::run(&store)?;
        info!(linked_parents, elapsed_ms = step.elapsed().as_millis() as u64, "stage 5: hierarchy linked");

        store.flush()?;

        Ok(BuildReport {
            index_path,
            rows_read,
            dict_words,
            word_repeats,
            index_words,
            radix_nodes,
            linked_parents,
            elapsed: started.elapsed(),
        })
    }
}
