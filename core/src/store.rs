//! Store schema and sessions for the persisted index.
//!
//! The index is a single redb file. Every entity lives in a primary table
//! keyed by its monotonic id with a bincode-encoded row as the value;
//! secondary lookups (unique word, word length, hierarchy key, parent id)
//! are plain tables maintained in the same write transaction as their
//! primary. One writer commits per batch; stage workers read concurrently
//! through MVCC snapshots.

use std::path::{Path, PathBuf};

use redb::{
    Database, Durability, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::errors::{IndexError, Result};
use crate::ranges::IdRange;

// Primary tables: id -> bincode row.
pub(crate) const DICT_WORDS: TableDefinition<u64, Vec<u8>> = TableDefinition::new("dict_words");
pub(crate) const DICT_WORD_REPEATS: TableDefinition<u64, Vec<u8>> =
    TableDefinition::new("dict_word_repeats");
pub(crate) const INDEX_WORDS: TableDefinition<u64, Vec<u8>> = TableDefinition::new("index_words");
pub(crate) const DICT_INDEX_IDS: TableDefinition<u64, (u64, u64)> =
    TableDefinition::new("dict_index_ids");
pub(crate) const RADIX_NODES: TableDefinition<u64, Vec<u8>> =
    TableDefinition::new("str_radix_nodes");

// Secondary-index tables.
/// Unique `word -> id` index over `index_words`.
pub(crate) const INDEX_WORDS_BY_WORD: TableDefinition<&str, u64> =
    TableDefinition::new("index_words_by_word");
/// `(word_len, id)` index over `index_words` for per-level scans.
pub(crate) const INDEX_WORDS_BY_LEN: TableDefinition<(u32, u64), ()> =
    TableDefinition::new("index_words_by_len");
// `dict_index_ids` rows are the many-to-many edges themselves:
// `edge id -> (index_id, dict_id)`.
/// `(index_id, dict_id) -> edge id` index over `dict_index_ids`.
pub(crate) const DICT_INDEX_BY_INDEX: TableDefinition<(u64, u64), u64> =
    TableDefinition::new("dict_index_by_index");
/// Unique `hierarchy_key -> id` index over `str_radix_nodes`.
pub(crate) const RADIX_BY_HIERARCHY: TableDefinition<&str, u64> =
    TableDefinition::new("radix_by_hierarchy");
/// `(weight, id)` index over `str_radix_nodes` for per-level scans.
pub(crate) const RADIX_BY_WEIGHT: TableDefinition<(u32, u64), ()> =
    TableDefinition::new("radix_by_weight");
/// `(parent_id, id)` index over `str_radix_nodes`, populated by the linker.
pub(crate) const RADIX_BY_PARENT: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("radix_by_parent");

/// Affix position of a mined repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AffixKind {
    Prefix,
    Suffix,
}

/// Surface form of an index word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordKind {
    /// Character form, produced by the variant generator.
    Chars,
    /// Pinyin transliteration of a character form.
    Pinyin,
}

/// One dictionary entry. Written by stage 1, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictWord {
    pub id: u64,
    /// Source file stem.
    pub dict: String,
    /// Raw display string.
    pub name: String,
    /// Opaque payload, `"{}"` when the source column was empty.
    pub data: String,
    /// Pipe-joined normalized phrase form.
    pub word_chars: String,
    /// Pipe-joined pinyin form.
    pub word_pinyin: String,
}

/// One high-frequency affix of a dictionary. Written by stage 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictWordRepeat {
    pub id: u64,
    pub dict: String,
    pub kind: AffixKind,
    pub word: String,
    /// Number of Hanzi code points in `word`.
    pub word_len: u32,
    pub repeat_count: u32,
}

/// One distinct index variant. Written by stage 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexWord {
    pub id: u64,
    pub kind: WordKind,
    /// Globally unique (see [`INDEX_WORDS_BY_WORD`]).
    pub word: String,
    /// Trie-layer weight of the word.
    pub word_len: u32,
}

/// One node of the layered radix trie. Written by stage 4; `parent_id` and
/// `child_count` filled by stage 5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadixNode {
    pub id: u64,
    pub parent_id: u64,
    /// Last path segment (the first two concatenated at depth 2).
    pub key: String,
    /// Full path string from the root; the node's natural identity.
    pub hierarchy_key: String,
    /// Non-zero iff the path exactly represents an index word.
    pub index_id: u64,
    /// Depth of the node, 2-based.
    pub weight: u32,
    pub child_count: u32,
}

/// Row counts of every table, for reporting and inspection.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TableCounts {
    pub dict_words: u64,
    pub dict_word_repeats: u64,
    pub index_words: u64,
    pub dict_index_ids: u64,
    pub radix_nodes: u64,
}

pub(crate) fn encode_row<T: Serialize>(row: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(row)?)
}

pub(crate) fn decode_row<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Next monotonic id for a primary table, derived from its last key.
/// Only the single writer of a stage allocates ids, so this is race-free.
pub(crate) fn next_id<V, T>(table: &T) -> Result<u64>
where
    V: redb::Value + 'static,
    T: ReadableTable<u64, V>,
{
    Ok(table.last()?.map(|(k, _)| k.value()).unwrap_or(0) + 1)
}

/// Min/max/count of a primary table.
pub(crate) fn table_range<V, T>(table: &T) -> Result<IdRange>
where
    V: redb::Value + 'static,
    T: ReadableTable<u64, V>,
{
    let count = table.len()?;
    if count == 0 {
        return Ok(IdRange::default());
    }
    let min_id = table.first()?.map(|(k, _)| k.value()).unwrap_or(0);
    let max_id = table.last()?.map(|(k, _)| k.value()).unwrap_or(0);
    Ok(IdRange::new(min_id, max_id, count))
}

const MIB: u64 = 1024 * 1024;

/// Read-mode session sizes `(window, cache)`.
///
/// The mmap window maps small files whole and larger ones at
/// `min(file_size, max_mmap, available/2)` (`max_mmap == 0` means
/// unbounded). The cache is a flat 1 MiB when the window covers the file,
/// otherwise a tenth of the window floored at 1 MiB.
fn read_session_sizes(file_size: u64, available: u64, max_mmap: u64) -> (u64, u64) {
    let free = if available == 0 { 64 * MIB } else { available / 2 };
    let window = if file_size < 64 * MIB {
        file_size
    } else if max_mmap > 0 {
        file_size.min(max_mmap).min(free)
    } else {
        file_size.min(free)
    };
    let cache = if window < file_size {
        (window / 10).max(MIB)
    } else {
        MIB
    };
    (window, cache)
}

/// Available system memory in bytes, 0 when unknown.
fn available_memory() -> u64 {
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else {
        return 0;
    };
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0);
            return kb * 1024;
        }
    }
    0
}

/// A handle on the index file.
#[derive(Debug)]
pub struct IndexStore {
    db: Database,
    path: PathBuf,
}

impl IndexStore {
    /// Create a fresh index at `path` with the full schema.
    ///
    /// The parent directory is created if missing; an existing file at the
    /// exact path is a fatal error, never overwritten.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        if path.exists() {
            return Err(IndexError::IndexExists(path.to_path_buf()));
        }
        let db = Database::create(path)?;
        let store = IndexStore { db, path: path.to_path_buf() };
        store.create_tables()?;
        Ok(store)
    }

    /// Open an existing index read-write (later build stages, tests).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::open(path)?;
        Ok(IndexStore { db, path: path.to_path_buf() })
    }

    /// Open an existing index for querying.
    ///
    /// The mmap window follows the read-session policy: whole file below
    /// 64 MiB, otherwise `min(file_size, max_mmap, available_memory/2)`;
    /// the cache is 1 MiB when fully mapped, else a tenth of the window
    /// floored at 1 MiB. redb exposes a single cache budget, which receives
    /// the cache size.
    pub fn open_read<P: AsRef<Path>>(path: P, max_mmap: u64) -> Result<Self> {
        let path = path.as_ref();
        let file_size = std::fs::metadata(path)
            .map_err(|e| IndexError::Input(format!("index file {}: {e}", path.display())))?
            .len();
        let (window, cache) = read_session_sizes(file_size, available_memory(), max_mmap);
        debug!(file_size, window, cache, "opening index read session");
        let db = redb::Builder::new()
            .set_cache_size(cache as usize)
            .open(path)?;
        Ok(IndexStore { db, path: path.to_path_buf() })
    }

    fn create_tables(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            txn.open_table(DICT_WORDS)?;
            txn.open_table(DICT_WORD_REPEATS)?;
            txn.open_table(INDEX_WORDS)?;
            txn.open_table(INDEX_WORDS_BY_WORD)?;
            txn.open_table(INDEX_WORDS_BY_LEN)?;
            txn.open_table(DICT_INDEX_IDS)?;
            txn.open_table(DICT_INDEX_BY_INDEX)?;
            txn.open_table(RADIX_NODES)?;
            txn.open_table(RADIX_BY_HIERARCHY)?;
            txn.open_table(RADIX_BY_WEIGHT)?;
            txn.open_table(RADIX_BY_PARENT)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn begin_read(&self) -> Result<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    /// Batch-write transaction tuned for build throughput: commits are
    /// crash-consistent but not individually fsynced. [`IndexStore::flush`]
    /// provides the durable barrier at the end of the build.
    pub fn begin_write(&self) -> Result<WriteTransaction> {
        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::Eventual);
        Ok(txn)
    }

    /// Force everything committed so far onto disk.
    pub fn flush(&self) -> Result<()> {
        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::Immediate);
        txn.commit()?;
        Ok(())
    }

    /// Id range of `dict_words`.
    pub fn dict_words_range(&self) -> Result<IdRange> {
        let txn = self.begin_read()?;
        table_range(&txn.open_table(DICT_WORDS)?)
    }

    /// Id range of the `index_words` rows at one layer weight.
    pub fn index_words_range_at_len(&self, word_len: u32) -> Result<IdRange> {
        let txn = self.begin_read()?;
        let by_len = txn.open_table(INDEX_WORDS_BY_LEN)?;
        let mut count = 0u64;
        let mut min_id = u64::MAX;
        let mut max_id = 0u64;
        for item in by_len.range((word_len, u64::MIN)..=(word_len, u64::MAX))? {
            let (k, _) = item?;
            let (_, id) = k.value();
            count += 1;
            min_id = min_id.min(id);
            max_id = max_id.max(id);
        }
        if count == 0 {
            return Ok(IdRange::default());
        }
        Ok(IdRange::new(min_id, max_id, count))
    }

    /// Largest `word_len` over `index_words`, 0 when empty.
    pub fn max_index_word_len(&self) -> Result<u32> {
        let txn = self.begin_read()?;
        let by_len = txn.open_table(INDEX_WORDS_BY_LEN)?;
        let result = by_len.last()?.map(|(k, _)| k.value().0).unwrap_or(0);
        Ok(result)
    }

    /// Largest radix node weight, 0 when empty.
    pub fn max_radix_weight(&self) -> Result<u32> {
        let txn = self.begin_read()?;
        let by_weight = txn.open_table(RADIX_BY_WEIGHT)?;
        let result = by_weight.last()?.map(|(k, _)| k.value().0).unwrap_or(0);
        Ok(result)
    }

    /// Row counts of every table.
    pub fn counts(&self) -> Result<TableCounts> {
        let txn = self.begin_read()?;
        Ok(TableCounts {
            dict_words: txn.open_table(DICT_WORDS)?.len()?,
            dict_word_repeats: txn.open_table(DICT_WORD_REPEATS)?.len()?,
            index_words: txn.open_table(INDEX_WORDS)?.len()?,
            dict_index_ids: txn.open_table(DICT_INDEX_IDS)?.len()?,
            radix_nodes: txn.open_table(RADIX_NODES)?.len()?,
        })
    }

    /// Look up an index word by its unique string.
    pub fn find_index_word(&self, word: &str) -> Result<Option<IndexWord>> {
        let txn = self.begin_read()?;
        let by_word = txn.open_table(INDEX_WORDS_BY_WORD)?;
        let Some(id) = by_word.get(word)? else {
            return Ok(None);
        };
        let id = id.value();
        let words = txn.open_table(INDEX_WORDS)?;
        match words.get(&id)? {
            Some(bytes) => Ok(Some(decode_row(&bytes.value())?)),
            None => Err(IndexError::Integrity(format!(
                "index_words_by_word points at missing row {id}"
            ))),
        }
    }

    /// Look up a radix node by its hierarchy key.
    pub fn find_radix_node(&self, hierarchy_key: &str) -> Result<Option<RadixNode>> {
        let txn = self.begin_read()?;
        let by_key = txn.open_table(RADIX_BY_HIERARCHY)?;
        let Some(id) = by_key.get(hierarchy_key)? else {
            return Ok(None);
        };
        let id = id.value();
        let nodes = txn.open_table(RADIX_NODES)?;
        match nodes.get(&id)? {
            Some(bytes) => Ok(Some(decode_row(&bytes.value())?)),
            None => Err(IndexError::Integrity(format!(
                "radix_by_hierarchy points at missing row {id}"
            ))),
        }
    }

    /// Dictionary-entry ids linked to an index word.
    pub fn dict_ids_for_index(&self, index_id: u64) -> Result<Vec<u64>> {
        let txn = self.begin_read()?;
        let by_index = txn.open_table(DICT_INDEX_BY_INDEX)?;
        let mut out = Vec::new();
        for item in by_index.range((index_id, u64::MIN)..=(index_id, u64::MAX))? {
            let (k, _) = item?;
            out.push(k.value().1);
        }
        Ok(out)
    }

    /// Child node ids of a radix node (available after the linker stage).
    pub fn radix_children(&self, parent_id: u64) -> Result<Vec<u64>> {
        let txn = self.begin_read()?;
        let by_parent = txn.open_table(RADIX_BY_PARENT)?;
        let mut out = Vec::new();
        for item in by_parent.range((parent_id, u64::MIN)..=(parent_id, u64::MAX))? {
            let (k, _) = item?;
            out.push(k.value().1);
        }
        Ok(out)
    }

    /// Snapshot of every dictionary entry.
    pub fn snapshot_dict_words(&self) -> Result<Vec<DictWord>> {
        let txn = self.begin_read()?;
        let table = txn.open_table(DICT_WORDS)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (_, bytes) = item?;
            out.push(decode_row(&bytes.value())?);
        }
        Ok(out)
    }

    /// Snapshot of every mined affix.
    pub fn snapshot_repeats(&self) -> Result<Vec<DictWordRepeat>> {
        let txn = self.begin_read()?;
        let table = txn.open_table(DICT_WORD_REPEATS)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (_, bytes) = item?;
            out.push(decode_row(&bytes.value())?);
        }
        Ok(out)
    }

    /// Snapshot of every index word.
    pub fn snapshot_index_words(&self) -> Result<Vec<IndexWord>> {
        let txn = self.begin_read()?;
        let table = txn.open_table(INDEX_WORDS)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (_, bytes) = item?;
            out.push(decode_row(&bytes.value())?);
        }
        Ok(out)
    }

    /// Snapshot of every `(index_id, dict_id)` edge.
    pub fn snapshot_links(&self) -> Result<Vec<(u64, u64)>> {
        let txn = self.begin_read()?;
        let table = txn.open_table(DICT_INDEX_IDS)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (_, v) = item?;
            out.push(v.value());
        }
        Ok(out)
    }

    /// Snapshot of every radix node.
    pub fn snapshot_radix_nodes(&self) -> Result<Vec<RadixNode>> {
        let txn = self.begin_read()?;
        let table = txn.open_table(RADIX_NODES)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (_, bytes) = item?;
            out.push(decode_row(&bytes.value())?);
        }
        Ok(out)
    }

    /// Load a dictionary entry by id.
    pub fn get_dict_word(&self, id: u64) -> Result<Option<DictWord>> {
        let txn = self.begin_read()?;
        let table = txn.open_table(DICT_WORDS)?;
        match table.get(&id)? {
            Some(bytes) => Ok(Some(decode_row(&bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Load a radix node by id.
    pub fn get_radix_node(&self, id: u64) -> Result<Option<RadixNode>> {
        let txn = self.begin_read()?;
        let table = txn.open_table(RADIX_NODES)?;
        match table.get(&id)? {
            Some(bytes) => Ok(Some(decode_row(&bytes.value())?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_index_path(tag: &str) -> PathBuf {
        let mut tmp = std::env::temp_dir();
        tmp.push(format!(
            "multirecall_test_{tag}_{}.bin",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        tmp
    }

    #[test]
    fn create_rejects_existing_file() {
        let path = temp_index_path("exists");
        std::fs::write(&path, b"occupied").unwrap();
        match IndexStore::create(&path) {
            Err(IndexError::IndexExists(p)) => assert_eq!(p, path),
            Err(other) => panic!("expected IndexExists, got {other:?}"),
            Ok(_) => panic!("create succeeded on an occupied path"),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn fresh_store_has_empty_tables() {
        let path = temp_index_path("fresh");
        let store = IndexStore::create(&path).unwrap();
        let counts = store.counts().unwrap();
        assert_eq!(counts.dict_words, 0);
        assert_eq!(counts.radix_nodes, 0);
        assert_eq!(store.max_index_word_len().unwrap(), 0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn row_roundtrip_and_id_assignment() {
        let path = temp_index_path("roundtrip");
        let store = IndexStore::create(&path).unwrap();

        let row = DictWord {
            id: 1,
            dict: "drugs".to_string(),
            name: "奥利司他胶囊".to_string(),
            data: "{}".to_string(),
            word_chars: "奥利司他胶囊".to_string(),
            word_pinyin: "ao li si ta jiao nang".to_string(),
        };

        let txn = store.begin_write().unwrap();
        {
            let mut table = txn.open_table(DICT_WORDS).unwrap();
            assert_eq!(next_id(&table).unwrap(), 1);
            table.insert(&row.id, encode_row(&row).unwrap()).unwrap();
            assert_eq!(next_id(&table).unwrap(), 2);
        }
        txn.commit().unwrap();

        assert_eq!(store.get_dict_word(1).unwrap(), Some(row));
        assert_eq!(store.get_dict_word(2).unwrap(), None);

        let range = store.dict_words_range().unwrap();
        assert_eq!(range, IdRange::new(1, 1, 1));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn secondary_word_index_lookups() {
        let path = temp_index_path("byword");
        let store = IndexStore::create(&path).unwrap();

        let word = IndexWord {
            id: 1,
            kind: WordKind::Chars,
            word: "苹果".to_string(),
            word_len: 2,
        };
        let txn = store.begin_write().unwrap();
        {
            let mut words = txn.open_table(INDEX_WORDS).unwrap();
            words.insert(&word.id, encode_row(&word).unwrap()).unwrap();
            let mut by_word = txn.open_table(INDEX_WORDS_BY_WORD).unwrap();
            by_word.insert(word.word.as_str(), &word.id).unwrap();
            let mut by_len = txn.open_table(INDEX_WORDS_BY_LEN).unwrap();
            by_len.insert(&(word.word_len, word.id), &()).unwrap();
        }
        txn.commit().unwrap();

        assert_eq!(store.find_index_word("苹果").unwrap(), Some(word));
        assert_eq!(store.find_index_word("果苹").unwrap(), None);
        assert_eq!(store.max_index_word_len().unwrap(), 2);
        let range = store.index_words_range_at_len(2).unwrap();
        assert_eq!(range.count, 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn read_session_size_policy() {
        // Small files map whole and get the flat 1 MiB cache.
        assert_eq!(read_session_sizes(10 * MIB, 8 * 1024 * MIB, 0), (10 * MIB, MIB));
        assert_eq!(read_session_sizes(1024, 8 * 1024 * MIB, 0), (1024, MIB));
        // Large files: window bounded by max_mmap and half the available
        // memory, cache at a tenth of the window.
        assert_eq!(
            read_session_sizes(512 * MIB, 512 * MIB, 128 * MIB),
            (128 * MIB, 128 * MIB / 10)
        );
        assert_eq!(
            read_session_sizes(512 * MIB, 512 * MIB, 0),
            (256 * MIB, 256 * MIB / 10)
        );
        // Unknown available memory degrades to a 64 MiB budget.
        assert_eq!(
            read_session_sizes(512 * MIB, 0, 0),
            (64 * MIB, 64 * MIB / 10)
        );
        // The cache never drops below 1 MiB on partially mapped files.
        assert_eq!(read_session_sizes(512 * MIB, 8 * MIB, 0), (4 * MIB, MIB));
    }
}
