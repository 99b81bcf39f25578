use crate::domain::message::MessageId;
use thiserror::Error;

/// Why a payload could not be turned into a [`FundsMovementRequest`].
///
/// Both variants are non-transient: retrying the same bytes cannot succeed.
///
/// [`FundsMovementRequest`]: crate::domain::request::FundsMovementRequest
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
}

/// Failures raised by a [`BalanceStore`](crate::domain::ports::BalanceStore).
///
/// Every variant is treated as transient by the workflow.
#[derive(Error, Debug)]
pub enum StorageFault {
    #[error("balance store unavailable: {0}")]
    Unavailable(String),
    #[error("version conflict on account {account_id}: expected {expected}, found {found}")]
    Conflict {
        account_id: String,
        expected: u64,
        found: u64,
    },
    #[error("account {0} disappeared during update")]
    Missing(String),
    #[error("storage backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
#[error("dead-letter sink failure: {0}")]
pub struct SinkFault(pub String);

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(String),
    #[error("lock lost for message {0}")]
    LockLost(MessageId),
    #[error("message {0} not found")]
    NotFound(MessageId),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error(transparent)]
    Storage(#[from] StorageFault),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
