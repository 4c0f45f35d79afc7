use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Invalid update triple for '{key}': pending marker '{path}' is not reconciled by the {branch} branch")]
    InvalidTriple {
        key: String,
        path: String,
        branch: &'static str,
    },

    #[error("Invalid command parameters: {0}")]
    InvalidParams(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dispatcher queue is full ({0} pending writes)")]
    QueueFull(usize),

    #[error("Dispatcher is closed")]
    DispatcherClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, MirrorError>;

impl<T> From<std::sync::PoisonError<T>> for MirrorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for MirrorError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
