//! multirecall-core
//!
//! Offline construction of a multi-recall search index for short
//! product-like phrases mixing Chinese, Latin and numeric tokens. A
//! directory of two-column dictionary files becomes a single queryable
//! index file: every entry is reachable under many equivalent surface
//! forms (prefix truncations, character reorderings, middle-char masks,
//! and Hanzi→pinyin transliterations).
//!
//! Public API:
//! - [`IndexSentence`] / [`IndexPhrase`] — tokenizer and variant generator
//! - [`PinyinTable`] — process-wide transliteration oracle
//! - [`IndexStore`] — the redb-backed index file (build and read sessions)
//! - [`IndexBuilder`] — the five-stage build pipeline
//! - [`BuildConfig`] — TOML-loadable build options

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod affix;
pub mod build;
pub mod chars;
pub mod errors;
pub mod pinyin;
pub mod ranges;
pub mod sentence;
pub mod store;
mod variants;

pub use affix::find_common_affixes;
pub use build::{BuildReport, IndexBuilder};
pub use errors::{IndexError, Result};
pub use pinyin::{word_to_pinyin, PinyinTable};
pub use ranges::IdRange;
pub use sentence::{index_word_weight, IndexChar, IndexPhrase, IndexSentence};
pub use store::{
    AffixKind, DictWord, DictWordRepeat, IndexStore, IndexWord, RadixNode, TableCounts, WordKind,
};

/// Build options, loadable from TOML and overridable by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory scanned for `.csv` dictionary files.
    pub dict_dir: PathBuf,
    /// Directory the index file is written into (created if missing).
    pub index_dir: PathBuf,
    /// Index file stem; empty means the current `YYYYMMDDhhmmss` timestamp.
    pub index_name: String,
    /// Maximum number of chars masked per variant; 0 disables masking.
    pub mask_count: u32,
    /// Affix-mining frequency floor.
    pub min_freq: u32,
    /// A phrase ending in at least this many digits is reduced to the digit
    /// run before variant generation; 0 disables the rule.
    pub ending_digits: u32,
    /// External pinyin TSV; the built-in table is used when unset.
    pub pinyin_table: Option<PathBuf>,
    /// Read-mode upper bound on the mmap window in bytes; 0 means
    /// unbounded. Consumed by read sessions such as the inspect tool.
    pub max_mmap: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dict_dir: PathBuf::from("dict"),
            index_dir: PathBuf::from("index"),
            index_name: String::new(),
            mask_count: 2,
            min_freq: 10,
            ending_digits: 6,
            pinyin_table: None,
            max_mmap: 0,
        }
    }
}

impl BuildConfig {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
