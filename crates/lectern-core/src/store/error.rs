use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database background task failed: {0}")]
    Task(String),
}
