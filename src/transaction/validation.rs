/// Validation logic for transactions separated from type definitions
use crate::crypto::{verify_signature, AccountId, NetworkId};
use crate::error::FriendbotError;
use crate::transaction::types::{CreateAccountOp, Operation, Transaction, TransactionEnvelope};

/// Smallest base fee the ledger accepts per operation.
pub const MIN_BASE_FEE: u32 = 100;

/// Upper bound on operations per transaction.
pub const MAX_OPERATIONS: usize = 100;

impl Transaction {
    /// Stateless checks run while building, before anything is signed.
    pub fn validate(&self, base_fee: u32) -> Result<(), FriendbotError> {
        if self.operations.is_empty() {
            return Err(FriendbotError::InvalidTransaction(
                "Transaction must contain at least one operation".to_string(),
            ));
        }
        if self.operations.len() > MAX_OPERATIONS {
            return Err(FriendbotError::InvalidTransaction(format!(
                "Transaction has {} operations (max: {})",
                self.operations.len(),
                MAX_OPERATIONS
            )));
        }
        if base_fee < MIN_BASE_FEE {
            return Err(FriendbotError::InvalidTransaction(format!(
                "Base fee {} is below the minimum of {}",
                base_fee, MIN_BASE_FEE
            )));
        }
        if self.sequence <= 0 {
            return Err(FriendbotError::InvalidTransaction(format!(
                "Sequence number must be positive, got {}",
                self.sequence
            )));
        }
        if self.time_bounds.max_time != 0 && self.time_bounds.max_time < self.time_bounds.min_time
        {
            return Err(FriendbotError::InvalidTransaction(
                "Time bounds end before they start".to_string(),
            ));
        }

        for op in &self.operations {
            match op {
                Operation::CreateAccount(op) => op.validate(&self.source)?,
            }
        }
        Ok(())
    }
}

impl CreateAccountOp {
    fn validate(&self, tx_source: &AccountId) -> Result<(), FriendbotError> {
        if self.starting_balance <= 0 {
            return Err(FriendbotError::InvalidTransaction(format!(
                "Starting balance must be positive, got {}",
                self.starting_balance
            )));
        }
        let funder = self.source.as_ref().unwrap_or(tx_source);
        if *funder == self.destination {
            return Err(FriendbotError::InvalidTransaction(format!(
                "Account {} cannot create itself",
                self.destination
            )));
        }
        Ok(())
    }
}

impl TransactionEnvelope {
    /// Checks that every required signer has a valid signature over the
    /// payload for `network`.
    pub fn verify_signatures(&self, network: &NetworkId) -> Result<(), FriendbotError> {
        let payload = self.tx.signature_payload(network)?;

        for signer in self.tx.required_signers() {
            let hint = signer.hint();
            let signed = self
                .signatures
                .iter()
                .filter(|sig| sig.hint == hint)
                .any(|sig| verify_signature(&signer, &payload, &sig.signature).is_ok());
            if !signed {
                return Err(FriendbotError::CryptoError(format!(
                    "Missing or invalid signature for {}",
                    signer
                )));
            }
        }
        Ok(())
    }
}
