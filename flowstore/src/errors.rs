use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite operation failed: {0}")]
    SQLite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV read/write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Extraction failed for {source_name}: {reason}")]
    Extraction { source_name: String, reason: String },

    #[error("Watermark regression: stored {current}, attempted {attempted}")]
    WatermarkRegression {
        current: NaiveDate,
        attempted: NaiveDate,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
