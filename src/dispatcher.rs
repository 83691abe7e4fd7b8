//! Submission and sequence-refresh policy for minions.
//!
//! The dispatcher is the only place that interprets ledger rejections. A
//! `tx_bad_seq` rejection flags the minion so that its next run pulls a
//! fresh sequence number instead of trusting the local cache; the failed
//! attempt itself is reported, never retried here.

use crate::error::{FriendbotError, Result};
use crate::ledger::{
    LedgerClient, LedgerError, Rejection, TransactionSuccess, CREATE_ACCOUNT_ALREADY_EXIST_RESULT,
    OP_ALREADY_EXISTS, TX_BAD_SEQ,
};
use crate::minion::Minion;
use async_trait::async_trait;
use tracing::{debug, warn};

/// What a structured rejection means for the minion that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    BadSequence,
    AccountExists,
    Other,
}

/// Maps a ledger rejection to its kind. Pure.
pub fn classify_rejection(rejection: &Rejection) -> RejectionKind {
    if rejection.transaction_code == TX_BAD_SEQ {
        return RejectionKind::BadSequence;
    }
    let already_exists = rejection.result_xdr.as_deref() == Some(CREATE_ACCOUNT_ALREADY_EXIST_RESULT)
        || rejection
            .operation_codes
            .iter()
            .any(|code| code == OP_ALREADY_EXISTS);
    if already_exists {
        RejectionKind::AccountExists
    } else {
        RejectionKind::Other
    }
}

/// Capabilities a minion delegates: submitting an envelope and deciding when
/// to refresh its sequence. Substitutable for tests.
#[async_trait]
pub trait MinionDispatcher: Send + Sync {
    async fn submit_transaction(
        &self,
        minion: &mut Minion,
        client: &dyn LedgerClient,
        envelope: &str,
    ) -> Result<TransactionSuccess>;

    async fn check_sequence_refresh(
        &self,
        minion: &mut Minion,
        client: &dyn LedgerClient,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicMinionDispatcher;

#[async_trait]
impl MinionDispatcher for BasicMinionDispatcher {
    async fn submit_transaction(
        &self,
        minion: &mut Minion,
        client: &dyn LedgerClient,
        envelope: &str,
    ) -> Result<TransactionSuccess> {
        submit_transaction(minion, client, envelope).await
    }

    async fn check_sequence_refresh(
        &self,
        minion: &mut Minion,
        client: &dyn LedgerClient,
    ) -> Result<()> {
        check_sequence_refresh(minion, client).await
    }
}

pub async fn submit_transaction(
    minion: &mut Minion,
    client: &dyn LedgerClient,
    envelope: &str,
) -> Result<TransactionSuccess> {
    let rejection = match client.submit_transaction(envelope).await {
        Ok(success) => return Ok(success),
        Err(LedgerError::Rejected(rejection)) => rejection,
        Err(err) => return Err(err.into()),
    };

    match classify_rejection(&rejection) {
        RejectionKind::BadSequence => {
            warn!(
                minion = %minion.account_id(),
                "bad sequence, forcing refresh on next run"
            );
            minion.mark_bad_sequence();
            Err(FriendbotError::BadSequence(format!(
                "submitting tx: {}",
                rejection.diagnostic()
            )))
        }
        RejectionKind::AccountExists => Err(FriendbotError::AccountExists),
        RejectionKind::Other => Err(FriendbotError::Rejected(format!(
            "submitting tx: {}",
            rejection.diagnostic()
        ))),
    }
}

/// Refreshes only when the cache was never filled or a bad sequence was
/// reported; otherwise the cached value is trusted.
pub async fn check_sequence_refresh(minion: &mut Minion, client: &dyn LedgerClient) -> Result<()> {
    if !minion.needs_sequence_refresh() {
        return Ok(());
    }
    let sequence = minion.refresh_sequence(client).await?;
    debug!(minion = %minion.account_id(), sequence, "minion sequence ready");
    Ok(())
}
