use std::path::PathBuf;

use thiserror::Error;

/// Validation and contract errors exposed by `tickinfo-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker must start with an ASCII letter or digit: '{ch}'")]
    TickerInvalidStart { ch: char },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("unknown field '{value}'")]
    UnknownField { value: String },
    #[error("invalid entity kind '{value}', expected one of stock, reit, etf")]
    InvalidEntityKind { value: String },
    #[error("invalid source '{value}', expected one of stockanalysis, investidor10")]
    InvalidSource { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("requested field set cannot be empty")]
    EmptyFieldSet,
}

/// Failures raised by the on-disk cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cache commit to {path} failed: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
