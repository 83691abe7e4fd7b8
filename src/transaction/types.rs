/// Transaction types and the signed wire envelope
use crate::crypto::{network_id, AccountId, KeyPair, NetworkId, SIGNATURE_HINT_SIZE};
use crate::error::FriendbotError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Tag mixed into the signing payload so a signature over a transaction can
/// never be replayed as a signature over another payload kind.
pub const ENVELOPE_TYPE_TX: u32 = 2;

/// Validity window of a transaction in unix seconds. Zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub min_time: u64,
    pub max_time: u64,
}

impl TimeBounds {
    pub fn infinite() -> Self {
        TimeBounds {
            min_time: 0,
            max_time: 0,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min_time == 0 && self.max_time == 0
    }
}

/// Creates and funds `destination` from the operation source (or the
/// transaction source when `source` is `None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountOp {
    pub source: Option<AccountId>,
    pub destination: AccountId,
    /// In smallest units, see [`super::amount`].
    pub starting_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    CreateAccount(CreateAccountOp),
}

impl Operation {
    pub fn source_account(&self) -> Option<&AccountId> {
        match self {
            Operation::CreateAccount(op) => op.source.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub source: AccountId,
    /// Total fee: base fee times the operation count.
    pub fee: u32,
    pub sequence: i64,
    pub time_bounds: TimeBounds,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Builds a validated transaction. The fee is derived from `base_fee`.
    pub fn new(
        source: AccountId,
        sequence: i64,
        base_fee: u32,
        operations: Vec<Operation>,
        time_bounds: TimeBounds,
    ) -> Result<Self, FriendbotError> {
        let op_count = u32::try_from(operations.len()).map_err(|_| {
            FriendbotError::InvalidTransaction("too many operations".to_string())
        })?;
        let fee = base_fee.checked_mul(op_count).ok_or_else(|| {
            FriendbotError::InvalidTransaction(format!(
                "fee overflow: base fee {} x {} operations",
                base_fee, op_count
            ))
        })?;

        let tx = Transaction {
            source,
            fee,
            sequence,
            time_bounds,
            operations,
        };
        tx.validate(base_fee)?;
        Ok(tx)
    }

    /// The bytes every signer signs: network id, envelope type, transaction.
    pub fn signature_payload(&self, network: &NetworkId) -> Result<Vec<u8>, FriendbotError> {
        let body = bincode::serialize(self)?;
        let mut payload = Vec::with_capacity(network.len() + 4 + body.len());
        payload.extend_from_slice(network);
        payload.extend_from_slice(&ENVELOPE_TYPE_TX.to_be_bytes());
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    pub fn hash(&self, network: &NetworkId) -> Result<[u8; 32], FriendbotError> {
        Ok(Sha256::digest(self.signature_payload(network)?).into())
    }

    /// Every account whose signature the ledger will demand.
    pub fn required_signers(&self) -> Vec<AccountId> {
        let mut signers = vec![self.source];
        for op in &self.operations {
            if let Some(source) = op.source_account() {
                if !signers.contains(source) {
                    signers.push(*source);
                }
            }
        }
        signers
    }

    /// Signs with every key in order, producing one decorated signature each.
    pub fn sign(
        self,
        network_passphrase: &str,
        signers: &[&KeyPair],
    ) -> Result<TransactionEnvelope, FriendbotError> {
        let payload = self.signature_payload(&network_id(network_passphrase))?;
        let signatures = signers
            .iter()
            .map(|keypair| {
                Ok(DecoratedSignature {
                    hint: keypair.account_id().hint(),
                    signature: keypair.sign(&payload)?.to_vec(),
                })
            })
            .collect::<Result<Vec<_>, FriendbotError>>()?;

        Ok(TransactionEnvelope {
            tx: self,
            signatures,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub hint: [u8; SIGNATURE_HINT_SIZE],
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub tx: Transaction,
    pub signatures: Vec<DecoratedSignature>,
}

impl TransactionEnvelope {
    pub fn to_base64(&self) -> Result<String, FriendbotError> {
        Ok(STANDARD.encode(bincode::serialize(self)?))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, FriendbotError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        if bytes.len() > super::MAX_ENVELOPE_SIZE {
            return Err(FriendbotError::EncodingError(format!(
                "Envelope too large: {} bytes (max: {})",
                bytes.len(),
                super::MAX_ENVELOPE_SIZE
            )));
        }
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn hash_hex(&self, network: &NetworkId) -> Result<String, FriendbotError> {
        Ok(hex::encode(self.tx.hash(network)?))
    }
}
