use quill_core::errors::GatewayError;
use quill_store::StoreError;

/// Infrastructure failures. Handler failures never surface here; the
/// dispatcher turns them into error results.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("control loop is already running")]
    AlreadyRunning,

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("`{0}` is not in the action catalog")]
    UnknownCatalogEntry(String),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "already_running",
            Self::Gateway(e) => e.error_kind(),
            Self::Store(_) => "store",
            Self::UnknownCatalogEntry(_) => "unknown_catalog_entry",
            Self::Internal(_) => "internal",
        }
    }
}
