//! Error types for index construction.

use std::path::PathBuf;

/// A specialized Result type for index building.
pub type Result<T, E = IndexError> = std::result::Result<T, E>;

/// The error type shared by the build pipeline and the store layer.
///
/// Row-level problems (malformed CSV records, unknown runes) are handled
/// where they occur and never surface here; this enum covers the failures
/// that abort a batch or the whole build.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Missing or unreadable dictionary input.
    #[error("dictionary input: {0}")]
    Input(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Building over an existing index file is rejected.
    #[error("index file already exists: {}", .0.display())]
    IndexExists(PathBuf),

    #[error(transparent)]
    StoreOpen(#[from] redb::DatabaseError),

    #[error(transparent)]
    StoreTxn(#[from] redb::TransactionError),

    #[error(transparent)]
    StoreTable(#[from] redb::TableError),

    #[error(transparent)]
    StoreIo(#[from] redb::StorageError),

    #[error(transparent)]
    StoreCommit(#[from] redb::CommitError),

    #[error("row encoding: {0}")]
    Row(#[from] bincode::Error),

    /// A uniqueness guarantee was violated despite check-before-insert.
    #[error("integrity: {0}")]
    Integrity(String),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config: {0}")]
    ConfigSer(#[from] toml::ser::Error),
}
