use quill_core::errors::ActionError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("quota exceeded: {required} bytes required, {quota} allowed")]
    QuotaExceeded { required: usize, quota: usize },

    #[error("invalid line range: {0}")]
    InvalidRange(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Store failures inside an action surface as ordinary handler errors.
impl From<StoreError> for ActionError {
    fn from(e: StoreError) -> Self {
        ActionError::Store(e.to_string())
    }
}
