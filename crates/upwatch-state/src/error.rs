//! Error types for the history stores.

use std::path::PathBuf;

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("history database: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("history transaction: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("history table: {0}")]
    Table(#[from] redb::TableError),

    #[error("history storage: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("history commit: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("cannot encode history record: {0}")]
    Serialize(String),

    #[error("cannot decode history record: {0}")]
    Deserialize(String),

    #[error("history file {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
}
