use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("could not extract text from {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("no text could be extracted from {}", .0.display())]
    EmptyDocument(PathBuf),

    #[error(
        "embedding dimension mismatch: index expects {expected}, embedder produces {actual}"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "index and passage store disagree: {vectors} vectors, {passages} passages"
    )]
    Desync { vectors: usize, passages: usize },

    #[error("passage position {position} out of range (store holds {len})")]
    OutOfRange { position: usize, len: usize },

    #[error("corrupt index file: {0}")]
    CorruptIndex(String),

    #[error("invalid passage: {0}")]
    InvalidPassage(String),

    #[error("corpus lock poisoned")]
    LockPoisoned,

    #[error("model error: {0}")]
    Model(String),

    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("remote service error: {0}")]
    RemoteService(String),

    #[error("{0} document(s) failed to ingest")]
    IngestFailed(usize),
}
