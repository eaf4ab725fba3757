use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot is empty: nothing to analyze")]
    EmptySnapshot,

    #[error("Insufficient data: {found} rows, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("Model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    #[error("Compute budget exhausted after {elapsed_ms} ms")]
    DeadlineExceeded { elapsed_ms: u64 },

    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;
