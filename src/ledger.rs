//! The ledger capability consumed by minions and dispatchers.
//!
//! A ledger accepts signed envelopes and reports the authoritative sequence
//! number of an account. Two implementations live here:
//! - [`http::HttpLedgerClient`] talks to a Horizon-style REST endpoint
//! - [`memory::InMemoryLedger`] enforces the same rules in process

pub mod http;
pub mod memory;

use crate::crypto::AccountId;
use crate::error::FriendbotError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use http::HttpLedgerClient;
pub use memory::InMemoryLedger;

/// Submitted sequence did not equal the account's sequence plus one.
pub const TX_BAD_SEQ: &str = "tx_bad_seq";
/// At least one operation failed; see the operation codes.
pub const TX_FAILED: &str = "tx_failed";
pub const TX_BAD_AUTH: &str = "tx_bad_auth";
pub const TX_INSUFFICIENT_FEE: &str = "tx_insufficient_fee";
pub const TX_INSUFFICIENT_BALANCE: &str = "tx_insufficient_balance";
pub const TX_NO_SOURCE_ACCOUNT: &str = "tx_no_source_account";
pub const TX_MALFORMED: &str = "tx_malformed";

pub const OP_SUCCESS: &str = "op_success";
pub const OP_ALREADY_EXISTS: &str = "op_already_exists";
pub const OP_UNDERFUNDED: &str = "op_underfunded";
pub const OP_LOW_RESERVE: &str = "op_low_reserve";
pub const OP_NO_ACCOUNT: &str = "op_no_account";

/// Result payload the ledger returns when a create-account operation targets
/// an existing account.
pub const CREATE_ACCOUNT_ALREADY_EXIST_RESULT: &str =
    "AAAAAAAAAGT/////AAAAAQAAAAAAAAAA/////AAAAAA=";

/// A transaction the ledger accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSuccess {
    pub hash: String,
    pub ledger: u32,
    pub envelope_xdr: String,
    #[serde(default)]
    pub result_xdr: Option<String>,
}

/// Structured refusal of a transaction by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub title: String,
    pub transaction_code: String,
    pub operation_codes: Vec<String>,
    pub result_xdr: Option<String>,
}

impl Rejection {
    pub fn new(transaction_code: &str) -> Self {
        Rejection {
            status: 400,
            title: "Transaction Failed".to_string(),
            transaction_code: transaction_code.to_string(),
            operation_codes: Vec::new(),
            result_xdr: None,
        }
    }

    pub fn with_operation_codes(mut self, codes: Vec<String>) -> Self {
        self.operation_codes = codes;
        self
    }

    pub fn with_result_xdr(mut self, result_xdr: &str) -> Self {
        self.result_xdr = Some(result_xdr.to_string());
        self
    }

    /// Human-readable summary of everything the ledger reported.
    pub fn diagnostic(&self) -> String {
        let mut out = if self.transaction_code.is_empty() {
            self.title.clone()
        } else {
            self.transaction_code.clone()
        };
        if !self.operation_codes.is_empty() {
            out.push_str(&format!(" [{}]", self.operation_codes.join(", ")));
        }
        if let Some(result) = &self.result_xdr {
            out.push_str(&format!(" result: {}", result));
        }
        out
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.diagnostic(), self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid ledger response: {0}")]
    InvalidResponse(String),
    #[error("account {0} not found")]
    NotFound(AccountId),
    #[error("transaction rejected: {0}")]
    Rejected(Rejection),
}

impl From<LedgerError> for FriendbotError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Transport(msg) => FriendbotError::NetworkError(msg),
            LedgerError::InvalidResponse(msg) => {
                FriendbotError::NetworkError(format!("invalid ledger response: {}", msg))
            }
            LedgerError::NotFound(account) => FriendbotError::AccountNotFound(account.to_string()),
            LedgerError::Rejected(rejection) => FriendbotError::Rejected(rejection.diagnostic()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submits a base64 envelope and waits for the ledger's verdict.
    async fn submit_transaction(&self, envelope: &str) -> Result<TransactionSuccess, LedgerError>;

    /// Current sequence number of `account` as recorded by the ledger.
    async fn fetch_sequence(&self, account: &AccountId) -> Result<i64, LedgerError>;
}
