//! Local view of one ledger account's sequence number

use crate::crypto::AccountId;
use crate::error::{FriendbotError, Result};
use crate::ledger::LedgerClient;
use tracing::debug;

/// Tracks the last sequence number this process used for an account.
///
/// The cache is refreshed from the ledger only on demand; between refreshes
/// it is advanced locally on every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    sequence: i64,
    initialized: bool,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Account {
            id,
            sequence: 0,
            initialized: false,
        }
    }

    /// An account whose sequence is already known, e.g. restored by a caller.
    pub fn with_sequence(id: AccountId, sequence: i64) -> Self {
        Account {
            id,
            sequence,
            initialized: true,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn sequence(&self) -> Option<i64> {
        self.initialized.then_some(self.sequence)
    }

    /// Overwrites the cache with the ledger's authoritative value.
    pub async fn refresh_sequence_number(&mut self, client: &dyn LedgerClient) -> Result<i64> {
        let sequence = client.fetch_sequence(&self.id).await?;
        debug!(account = %self.id, previous = self.sequence, sequence, "refreshed sequence");
        self.sequence = sequence;
        self.initialized = true;
        Ok(sequence)
    }

    /// The value the next transaction must carry. Does not touch the cache.
    pub fn next_sequence_number(&self) -> Result<i64> {
        if !self.initialized {
            return Err(FriendbotError::SequenceUninitialized(self.id.to_string()));
        }
        self.sequence.checked_add(1).ok_or_else(|| {
            FriendbotError::InvalidTransaction(format!("sequence overflow for {}", self.id))
        })
    }

    /// Advances the cache by one and returns the new value.
    pub fn increment_sequence_number(&mut self) -> Result<i64> {
        let next = self.next_sequence_number()?;
        self.sequence = next;
        Ok(next)
    }
}
