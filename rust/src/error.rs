use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("no thread is open")]
    NoOpenThread,
    #[error("message {0} is not loaded")]
    UnknownMessage(u64),
}
