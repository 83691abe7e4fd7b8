//! Error types for friendbot

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FriendbotError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Bad sequence: {0}")]
    BadSequence(String),
    #[error("createAccountAlreadyExist")]
    AccountExists,
    #[error("Transaction rejected: {0}")]
    Rejected(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Encoding error: {0}")]
    EncodingError(String),
    #[error("Sequence number not initialized for {0}")]
    SequenceUninitialized(String),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Minion pool is closed")]
    PoolClosed,
}

/// How a caller should treat a failure when deciding whether to re-enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport failure; surfaced, never retried internally.
    TransientNetwork,
    /// The ledger disagreed about the sequence number. The minion refreshes
    /// on its next run, so a retry is expected to succeed.
    SequenceConflict,
    /// The target already exists; callers may treat this as success.
    DuplicateEffect,
    /// Malformed input or a cryptographic failure. Fatal for the attempt.
    BuildOrSign,
    /// Any other rejection, diagnostic preserved.
    Unclassified,
}

impl FriendbotError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FriendbotError::NetworkError(_) | FriendbotError::AccountNotFound(_) => {
                ErrorCategory::TransientNetwork
            }
            FriendbotError::BadSequence(_) => ErrorCategory::SequenceConflict,
            FriendbotError::AccountExists => ErrorCategory::DuplicateEffect,
            FriendbotError::InvalidTransaction(_)
            | FriendbotError::InvalidAmount(_)
            | FriendbotError::CryptoError(_)
            | FriendbotError::EncodingError(_)
            | FriendbotError::SequenceUninitialized(_) => ErrorCategory::BuildOrSign,
            FriendbotError::Rejected(_)
            | FriendbotError::ConfigError(_)
            | FriendbotError::IoError(_)
            | FriendbotError::PoolClosed => ErrorCategory::Unclassified,
        }
    }

    pub fn is_account_exists(&self) -> bool {
        matches!(self, FriendbotError::AccountExists)
    }
}

impl From<std::io::Error> for FriendbotError {
    fn from(err: std::io::Error) -> Self {
        FriendbotError::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for FriendbotError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        FriendbotError::EncodingError(err.to_string())
    }
}

impl From<base64::DecodeError> for FriendbotError {
    fn from(err: base64::DecodeError) -> Self {
        FriendbotError::EncodingError(format!("invalid base64: {}", err))
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, FriendbotError>;
