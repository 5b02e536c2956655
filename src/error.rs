use crate::domain::transaction::TransactionStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("Number {phone} is not valid for {provider}")]
    InvalidPayer { provider: String, phone: String },
    #[error("Provider {provider} unreachable for transaction {transaction_id}: {message}")]
    ProviderUnreachable {
        provider: String,
        transaction_id: String,
        message: String,
    },
    #[error("Provider {provider} rejected transaction {transaction_id}: {message}")]
    ProviderRejected {
        provider: String,
        transaction_id: String,
        message: String,
    },
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Transaction {0} is already completed")]
    AlreadyCompleted(String),
    #[error("Transaction {transaction_id} is already {status}")]
    TransactionFinalized {
        transaction_id: String,
        status: TransactionStatus,
    },
    #[error("Invalid {provider} callback: {reason}")]
    InvalidCallback { provider: String, reason: String },
    #[error("Report generation failed: {0}")]
    ReportingError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
