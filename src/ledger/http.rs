//! REST client for a Horizon-style ledger gateway

use super::{LedgerClient, LedgerError, Rejection, TransactionSuccess};
use crate::crypto::AccountId;
use crate::error::FriendbotError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AccountRecord {
    sequence: String,
}

/// Error document returned by the gateway for non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct Problem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    extras: Option<ProblemExtras>,
}

#[derive(Debug, Default, Deserialize)]
struct ProblemExtras {
    #[serde(default)]
    result_codes: Option<ResultCodes>,
    #[serde(default)]
    result_xdr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultCodes {
    #[serde(default)]
    transaction: String,
    #[serde(default)]
    operations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FriendbotError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FriendbotError::ConfigError(format!("building HTTP client: {}", e)))?;
        Ok(HttpLedgerClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Turns a non-success response body into a ledger error.
fn parse_problem(status: StatusCode, body: &str) -> LedgerError {
    let problem: Problem = match serde_json::from_str(body) {
        Ok(problem) => problem,
        Err(_) => {
            return LedgerError::InvalidResponse(format!(
                "status {} with unparseable body: {}",
                status, body
            ))
        }
    };

    let (codes, result_xdr) = match problem.extras {
        Some(extras) => (extras.result_codes.unwrap_or_default(), extras.result_xdr),
        None => (ResultCodes::default(), None),
    };

    LedgerError::Rejected(Rejection {
        status: if problem.status == 0 {
            status.as_u16()
        } else {
            problem.status
        },
        title: problem.title,
        transaction_code: codes.transaction,
        operation_codes: codes.operations,
        result_xdr,
    })
}

fn parse_sequence(body: &str) -> Result<i64, LedgerError> {
    let record: AccountRecord = serde_json::from_str(body)
        .map_err(|e| LedgerError::InvalidResponse(format!("account record: {}", e)))?;
    record
        .sequence
        .parse::<i64>()
        .map_err(|e| LedgerError::InvalidResponse(format!("sequence {:?}: {}", record.sequence, e)))
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn submit_transaction(&self, envelope: &str) -> Result<TransactionSuccess, LedgerError> {
        let url = format!("{}/transactions", self.base_url);
        debug!(%url, "submitting transaction");

        let response = self
            .client
            .post(&url)
            .form(&[("tx", envelope)])
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| LedgerError::InvalidResponse(format!("transaction record: {}", e)))
        } else {
            Err(parse_problem(status, &body))
        }
    }

    async fn fetch_sequence(&self, account: &AccountId) -> Result<i64, LedgerError> {
        let url = format!("{}/accounts/{}", self.base_url, account);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(*account));
        }
        let body = response
            .text()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(parse_problem(status, &body));
        }
        parse_sequence(&body)
    }
}
