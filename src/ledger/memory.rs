//! In-process ledger enforcing the sequence, fee and signature rules

use super::{
    LedgerClient, LedgerError, Rejection, TransactionSuccess, CREATE_ACCOUNT_ALREADY_EXIST_RESULT,
    OP_ALREADY_EXISTS, OP_LOW_RESERVE, OP_NO_ACCOUNT, OP_SUCCESS, OP_UNDERFUNDED, TX_BAD_AUTH,
    TX_BAD_SEQ, TX_FAILED, TX_INSUFFICIENT_BALANCE, TX_INSUFFICIENT_FEE, TX_MALFORMED,
    TX_NO_SOURCE_ACCOUNT,
};
use crate::crypto::{network_id, AccountId, NetworkId};
use crate::transaction::validation::MIN_BASE_FEE;
use crate::transaction::{Operation, TransactionEnvelope, UNITS_PER_WHOLE};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Minimum balance a newly created account must receive.
pub const DEFAULT_MIN_STARTING_BALANCE: i64 = UNITS_PER_WHOLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerAccount {
    pub balance: i64,
    pub sequence: i64,
}

#[derive(Debug)]
struct LedgerState {
    accounts: HashMap<AccountId, LedgerAccount>,
    ledger: u32,
    submissions: usize,
}

impl LedgerState {
    /// Fresh accounts start at the current ledger number shifted into the
    /// high 32 bits, like the real network.
    fn starting_sequence(&self) -> i64 {
        i64::from(self.ledger) << 32
    }
}

pub struct InMemoryLedger {
    network: NetworkId,
    base_fee: u32,
    min_starting_balance: i64,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(network_passphrase: &str) -> Self {
        InMemoryLedger {
            network: network_id(network_passphrase),
            base_fee: MIN_BASE_FEE,
            min_starting_balance: DEFAULT_MIN_STARTING_BALANCE,
            state: Mutex::new(LedgerState {
                accounts: HashMap::new(),
                ledger: 1,
                submissions: 0,
            }),
        }
    }

    pub fn with_base_fee(mut self, base_fee: u32) -> Self {
        self.base_fee = base_fee;
        self
    }

    /// Adds an account directly, outside of any transaction.
    pub fn create_genesis_account(&self, account: AccountId, balance: i64) {
        let mut state = self.state.lock();
        let sequence = state.starting_sequence();
        state
            .accounts
            .insert(account, LedgerAccount { balance, sequence });
    }

    pub fn account(&self, account: &AccountId) -> Option<LedgerAccount> {
        self.state.lock().accounts.get(account).copied()
    }

    pub fn sequence(&self, account: &AccountId) -> Option<i64> {
        self.account(account).map(|a| a.sequence)
    }

    /// Overwrites an account's sequence, simulating another submitter.
    pub fn set_sequence(&self, account: &AccountId, sequence: i64) {
        if let Some(entry) = self.state.lock().accounts.get_mut(account) {
            entry.sequence = sequence;
        }
    }

    /// Number of envelopes received, accepted or not.
    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions
    }

    pub fn ledger_number(&self) -> u32 {
        self.state.lock().ledger
    }

    /// Validates and applies one envelope atomically.
    pub fn apply(&self, envelope: &TransactionEnvelope) -> Result<TransactionSuccess, Rejection> {
        let tx = &envelope.tx;
        let mut state = self.state.lock();
        state.submissions += 1;

        let source = match state.accounts.get(&tx.source) {
            Some(account) => *account,
            None => return Err(Rejection::new(TX_NO_SOURCE_ACCOUNT)),
        };
        if tx.sequence != source.sequence + 1 {
            debug!(
                account = %tx.source,
                submitted = tx.sequence,
                expected = source.sequence + 1,
                "rejecting bad sequence"
            );
            return Err(Rejection::new(TX_BAD_SEQ));
        }
        let op_count = tx.operations.len() as u64;
        if op_count == 0 {
            return Err(Rejection::new(TX_MALFORMED));
        }
        if u64::from(tx.fee) < u64::from(self.base_fee) * op_count {
            return Err(Rejection::new(TX_INSUFFICIENT_FEE));
        }
        if source.balance < i64::from(tx.fee) {
            return Err(Rejection::new(TX_INSUFFICIENT_BALANCE));
        }
        if envelope.verify_signatures(&self.network).is_err() {
            return Err(Rejection::new(TX_BAD_AUTH));
        }

        // From here on the fee is charged and the sequence consumed, even if
        // an operation fails.
        if let Some(entry) = state.accounts.get_mut(&tx.source) {
            entry.balance -= i64::from(tx.fee);
            entry.sequence = tx.sequence;
        }

        let mut staged = state.accounts.clone();
        let new_account_sequence = state.starting_sequence();
        let mut op_codes = Vec::with_capacity(tx.operations.len());
        let mut failed = false;

        for op in &tx.operations {
            let code = match op {
                Operation::CreateAccount(op) => {
                    let funder = op.source.unwrap_or(tx.source);
                    if staged.contains_key(&op.destination) {
                        OP_ALREADY_EXISTS
                    } else if op.starting_balance < self.min_starting_balance {
                        OP_LOW_RESERVE
                    } else {
                        match staged.get(&funder).map(|a| a.balance) {
                            None => OP_NO_ACCOUNT,
                            Some(balance) if balance < op.starting_balance => OP_UNDERFUNDED,
                            Some(_) => {
                                if let Some(entry) = staged.get_mut(&funder) {
                                    entry.balance -= op.starting_balance;
                                }
                                staged.insert(
                                    op.destination,
                                    LedgerAccount {
                                        balance: op.starting_balance,
                                        sequence: new_account_sequence,
                                    },
                                );
                                OP_SUCCESS
                            }
                        }
                    }
                }
            };
            failed |= code != OP_SUCCESS;
            op_codes.push(code.to_string());
        }

        let ledger = state.ledger;
        state.ledger += 1;

        if failed {
            let mut rejection = Rejection::new(TX_FAILED);
            if op_codes.len() == 1 && op_codes[0] == OP_ALREADY_EXISTS {
                rejection = rejection.with_result_xdr(CREATE_ACCOUNT_ALREADY_EXIST_RESULT);
            }
            return Err(rejection.with_operation_codes(op_codes));
        }

        state.accounts = staged;
        let hash = envelope
            .hash_hex(&self.network)
            .map_err(|_| Rejection::new(TX_MALFORMED))?;
        let envelope_xdr = envelope
            .to_base64()
            .map_err(|_| Rejection::new(TX_MALFORMED))?;

        Ok(TransactionSuccess {
            hash,
            ledger,
            envelope_xdr,
            result_xdr: None,
        })
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn submit_transaction(&self, envelope: &str) -> Result<TransactionSuccess, LedgerError> {
        let envelope = match TransactionEnvelope::from_base64(envelope) {
            Ok(envelope) => envelope,
            Err(_) => {
                self.state.lock().submissions += 1;
                return Err(LedgerError::Rejected(Rejection::new(TX_MALFORMED)));
            }
        };
        self.apply(&envelope).map_err(LedgerError::Rejected)
    }

    async fn fetch_sequence(&self, account: &AccountId) -> Result<i64, LedgerError> {
        self.sequence(account).ok_or(LedgerError::NotFound(*account))
    }
}
