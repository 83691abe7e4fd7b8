//! Minions: channel accounts that sign and submit create-account transactions
//! on behalf of the shared bot account.
//!
//! The minion's own account is the transaction source, so it pays the fee and
//! consumes its own sequence number. The bot account only appears as the
//! source of the create-account operation and signs to authorize spending
//! its funds. Its sequence number is never used, which is what lets many
//! minions submit in parallel.

use crate::account::Account;
use crate::crypto::{AccountId, KeyPair};
use crate::dispatcher::{BasicMinionDispatcher, MinionDispatcher};
use crate::error::{ErrorCategory, FriendbotError, Result};
use crate::ledger::{LedgerClient, TransactionSuccess};
use crate::transaction::{parse_amount, CreateAccountOp, Operation, TimeBounds, Transaction};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// The funds-bearing account, shared read-only by every minion.
#[derive(Debug)]
pub struct BotAccount {
    keypair: KeyPair,
}

impl BotAccount {
    pub fn new(keypair: KeyPair) -> Self {
        BotAccount { keypair }
    }

    pub fn id(&self) -> AccountId {
        self.keypair.account_id()
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }
}

/// Per-pool settings every minion is constructed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinionSettings {
    pub network_passphrase: String,
    /// Decimal string, e.g. `"10000.00"`.
    pub starting_balance: String,
    /// Per-operation fee in the smallest unit.
    pub base_fee: u32,
}

/// The step of a run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SequenceRefresh,
    Build,
    Sign,
    Serialize,
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::SequenceRefresh => "checking minion seq",
            Stage::Build => "building create-account tx",
            Stage::Sign => "signing tx",
            Stage::Serialize => "serializing tx",
            Stage::Submit => "submitting tx to minion",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage}: {error}")]
pub struct SubmitFailure {
    pub stage: Stage,
    #[source]
    pub error: FriendbotError,
}

impl SubmitFailure {
    pub fn new(stage: Stage, error: FriendbotError) -> Self {
        SubmitFailure { stage, error }
    }

    pub fn category(&self) -> ErrorCategory {
        self.error.category()
    }
}

/// Outcome of one funding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    Success(TransactionSuccess),
    Failure(SubmitFailure),
}

impl SubmitResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitResult::Success(_))
    }

    /// True when the destination already existed.
    pub fn is_account_exists(&self) -> bool {
        matches!(self, SubmitResult::Failure(f) if f.error.is_account_exists())
    }

    pub fn into_result(self) -> std::result::Result<TransactionSuccess, SubmitFailure> {
        match self {
            SubmitResult::Success(success) => Ok(success),
            SubmitResult::Failure(failure) => Err(failure),
        }
    }
}

/// Where a minion is in its sequence lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinionState {
    Uninitialized,
    Ready,
    NeedsRefresh,
}

pub struct Minion {
    account: Account,
    keypair: KeyPair,
    bot: Arc<BotAccount>,
    ledger: Arc<dyn LedgerClient>,
    dispatcher: Arc<dyn MinionDispatcher>,
    settings: MinionSettings,
    force_refresh_sequence: bool,
}

impl Minion {
    pub fn new(
        keypair: KeyPair,
        bot: Arc<BotAccount>,
        ledger: Arc<dyn LedgerClient>,
        settings: MinionSettings,
    ) -> Self {
        Minion {
            account: Account::new(keypair.account_id()),
            keypair,
            bot,
            ledger,
            dispatcher: Arc::new(BasicMinionDispatcher),
            settings,
            force_refresh_sequence: false,
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn MinionDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Seeds the sequence cache so the first run skips the refresh.
    pub fn with_cached_sequence(mut self, sequence: i64) -> Self {
        self.account = Account::with_sequence(self.account.id, sequence);
        self
    }

    pub fn account_id(&self) -> AccountId {
        self.account.id
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn bot_id(&self) -> AccountId {
        self.bot.id()
    }

    pub fn force_refresh_sequence(&self) -> bool {
        self.force_refresh_sequence
    }

    pub fn state(&self) -> MinionState {
        if !self.account.is_initialized() {
            MinionState::Uninitialized
        } else if self.force_refresh_sequence {
            MinionState::NeedsRefresh
        } else {
            MinionState::Ready
        }
    }

    pub fn needs_sequence_refresh(&self) -> bool {
        self.state() != MinionState::Ready
    }

    /// Pulls the authoritative sequence and clears the refresh flag. On
    /// failure the flag stays set.
    pub async fn refresh_sequence(&mut self, client: &dyn LedgerClient) -> Result<i64> {
        let sequence = self.account.refresh_sequence_number(client).await?;
        self.force_refresh_sequence = false;
        Ok(sequence)
    }

    /// Called when the ledger reported `tx_bad_seq` for this minion.
    pub fn mark_bad_sequence(&mut self) {
        self.force_refresh_sequence = true;
    }

    /// Funds `destination` and sends the outcome on `reply` exactly once.
    ///
    /// Runs on one minion must not overlap; taking `&mut self` enforces that.
    pub async fn run(&mut self, destination: &str, reply: oneshot::Sender<SubmitResult>) {
        let result = self.fund(destination).await;
        if reply.send(result).is_err() {
            debug!(minion = %self.account.id, destination, "result receiver dropped");
        }
    }

    /// One complete funding attempt. Never retries.
    pub async fn fund(&mut self, destination: &str) -> SubmitResult {
        let dispatcher = Arc::clone(&self.dispatcher);
        let ledger = Arc::clone(&self.ledger);

        if let Err(err) = dispatcher
            .check_sequence_refresh(self, ledger.as_ref())
            .await
        {
            return self.failure(destination, SubmitFailure::new(Stage::SequenceRefresh, err));
        }

        let envelope = match self.make_tx(destination) {
            Ok(envelope) => envelope,
            Err(failure) => return self.failure(destination, failure),
        };

        match dispatcher
            .submit_transaction(self, ledger.as_ref(), &envelope)
            .await
        {
            Ok(success) => {
                info!(
                    minion = %self.account.id,
                    destination,
                    hash = %success.hash,
                    ledger = success.ledger,
                    "account funded"
                );
                SubmitResult::Success(success)
            }
            Err(err) => self.failure(destination, SubmitFailure::new(Stage::Submit, err)),
        }
    }

    fn failure(&self, destination: &str, failure: SubmitFailure) -> SubmitResult {
        warn!(
            minion = %self.account.id,
            destination,
            category = ?failure.category(),
            error = %failure,
            "funding attempt failed"
        );
        SubmitResult::Failure(failure)
    }

    /// Builds, signs and serializes the transaction, then advances the local
    /// sequence. Nothing is mutated unless every step succeeds.
    fn make_tx(&mut self, destination: &str) -> std::result::Result<String, SubmitFailure> {
        let build = |err| SubmitFailure::new(Stage::Build, err);

        let destination: AccountId = destination.parse().map_err(build)?;
        let starting_balance = parse_amount(&self.settings.starting_balance).map_err(build)?;
        let sequence = self.account.next_sequence_number().map_err(build)?;

        let tx = Transaction::new(
            self.account.id,
            sequence,
            self.settings.base_fee,
            vec![Operation::CreateAccount(CreateAccountOp {
                source: Some(self.bot.id()),
                destination,
                starting_balance,
            })],
            TimeBounds::infinite(),
        )
        .map_err(build)?;

        let envelope = tx
            .sign(
                &self.settings.network_passphrase,
                &[&self.keypair, self.bot.keypair()],
            )
            .map_err(|err| SubmitFailure::new(Stage::Sign, err))?;

        let encoded = envelope
            .to_base64()
            .map_err(|err| SubmitFailure::new(Stage::Serialize, err))?;

        // The envelope is about to be submitted; consume the sequence now.
        self.account.increment_sequence_number().map_err(build)?;
        Ok(encoded)
    }
}

impl fmt::Debug for Minion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Minion")
            .field("account", &self.account)
            .field("bot", &self.bot.id())
            .field("settings", &self.settings)
            .field("force_refresh_sequence", &self.force_refresh_sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::network_id;
    use crate::ledger::{
        LedgerError, MockLedgerClient, Rejection, OP_ALREADY_EXISTS, TX_BAD_SEQ, TX_FAILED,
    };
    use crate::transaction::TransactionEnvelope;
    use parking_lot::Mutex;

    const NETWORK: &str = "Test SDF Network ; September 2015";

    fn settings() -> MinionSettings {
        MinionSettings {
            network_passphrase: NETWORK.to_string(),
            starting_balance: "10000.00".to_string(),
            base_fee: 100,
        }
    }

    fn success() -> TransactionSuccess {
        TransactionSuccess {
            hash: "ab".repeat(32),
            ledger: 7,
            envelope_xdr: String::new(),
            result_xdr: None,
        }
    }

    fn minion_with(ledger: MockLedgerClient) -> (Minion, Arc<BotAccount>) {
        let bot = Arc::new(BotAccount::new(KeyPair::generate()));
        let minion = Minion::new(
            KeyPair::generate(),
            Arc::clone(&bot),
            Arc::new(ledger),
            settings(),
        );
        (minion, bot)
    }

    fn destination() -> String {
        KeyPair::generate().account_id().to_string()
    }

    #[tokio::test]
    async fn test_uninitialized_minion_refreshes_once_then_submits() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let submitted = Arc::new(Mutex::new(Vec::<TransactionEnvelope>::new()));
            let captured = Arc::clone(&submitted);

            let mut ledger = MockLedgerClient::new();
            ledger.expect_fetch_sequence().times(1).returning(|_| Ok(100));
            ledger
                .expect_submit_transaction()
                .times(1)
                .returning(move |env| {
                    captured
                        .lock()
                        .push(TransactionEnvelope::from_base64(env).unwrap());
                    Ok(success())
                });

            let (mut minion, bot) = minion_with(ledger);
            assert_eq!(minion.state(), MinionState::Uninitialized);

            let (tx, rx) = oneshot::channel();
            minion.run(&destination(), tx).await;
            assert!(rx.await.unwrap().is_success());

            assert_eq!(minion.account().sequence(), Some(101));
            assert_eq!(minion.state(), MinionState::Ready);

            let envelopes = submitted.lock();
            let env = &envelopes[0];
            assert_eq!(env.tx.source, minion.account_id());
            assert_eq!(env.tx.sequence, 101);
            assert_eq!(env.signatures.len(), 2);
            assert_eq!(env.tx.required_signers(), vec![minion.account_id(), bot.id()]);
            assert!(env.verify_signatures(&network_id(NETWORK)).is_ok());
        })
        .await
        .expect("test_uninitialized_minion_refreshes_once_then_submits timed out");
    }

    #[tokio::test]
    async fn test_warm_cache_skips_refresh() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let mut ledger = MockLedgerClient::new();
            ledger.expect_fetch_sequence().times(0);
            ledger
                .expect_submit_transaction()
                .times(1)
                .returning(|env| {
                    assert_eq!(TransactionEnvelope::from_base64(env).unwrap().tx.sequence, 6);
                    Ok(success())
                });

            let (minion, _) = minion_with(ledger);
            let mut minion = minion.with_cached_sequence(5);

            assert!(minion.fund(&destination()).await.is_success());
            assert_eq!(minion.account().sequence(), Some(6));
        })
        .await
        .expect("test_warm_cache_skips_refresh timed out");
    }

    #[tokio::test]
    async fn test_bad_sequence_flags_refresh() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let mut ledger = MockLedgerClient::new();
            ledger
                .expect_submit_transaction()
                .times(1)
                .returning(|_| Err(LedgerError::Rejected(Rejection::new(TX_BAD_SEQ))));

            let (minion, _) = minion_with(ledger);
            let mut minion = minion.with_cached_sequence(5);

            let result = minion.fund(&destination()).await;
            let failure = result.into_result().unwrap_err();
            assert_eq!(failure.stage, Stage::Submit);
            assert_eq!(failure.category(), ErrorCategory::SequenceConflict);
            assert!(minion.force_refresh_sequence());
            assert_eq!(minion.state(), MinionState::NeedsRefresh);
        })
        .await
        .expect("test_bad_sequence_flags_refresh timed out");
    }

    #[tokio::test]
    async fn test_existing_destination_is_account_exists() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let mut ledger = MockLedgerClient::new();
            ledger.expect_submit_transaction().returning(|_| {
                Err(LedgerError::Rejected(
                    Rejection::new(TX_FAILED)
                        .with_operation_codes(vec![OP_ALREADY_EXISTS.to_string()]),
                ))
            });

            let (minion, _) = minion_with(ledger);
            let mut minion = minion.with_cached_sequence(5);

            let result = minion.fund(&destination()).await;
            assert!(result.is_account_exists());
            assert!(!minion.force_refresh_sequence());
        })
        .await
        .expect("test_existing_destination_is_account_exists timed out");
    }

    #[tokio::test]
    async fn test_refresh_failure_reports_stage_and_keeps_state() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let mut ledger = MockLedgerClient::new();
            ledger
                .expect_fetch_sequence()
                .returning(|_| Err(LedgerError::Transport("connection refused".to_string())));
            ledger.expect_submit_transaction().times(0);

            let (mut minion, _) = minion_with(ledger);
            let failure = minion.fund(&destination()).await.into_result().unwrap_err();

            assert_eq!(failure.stage, Stage::SequenceRefresh);
            assert_eq!(failure.category(), ErrorCategory::TransientNetwork);
            assert_eq!(
                failure.to_string(),
                "checking minion seq: Network error: connection refused"
            );
            assert_eq!(minion.state(), MinionState::Uninitialized);
        })
        .await
        .expect("test_refresh_failure_reports_stage_and_keeps_state timed out");
    }

    #[tokio::test]
    async fn test_build_failure_does_not_touch_sequence() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let mut ledger = MockLedgerClient::new();
            ledger.expect_submit_transaction().times(0);

            let (minion, _) = minion_with(ledger);
            let mut minion = minion.with_cached_sequence(5);

            let failure = minion.fund("GDEST").await.into_result().unwrap_err();
            assert_eq!(failure.stage, Stage::Build);
            assert_eq!(failure.category(), ErrorCategory::BuildOrSign);
            assert_eq!(minion.account().sequence(), Some(5));
        })
        .await
        .expect("test_build_failure_does_not_touch_sequence timed out");
    }

    #[tokio::test]
    async fn test_bad_starting_balance_is_a_build_failure() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let mut ledger = MockLedgerClient::new();
            ledger.expect_submit_transaction().times(0);

            let bot = Arc::new(BotAccount::new(KeyPair::generate()));
            let mut minion = Minion::new(
                KeyPair::generate(),
                bot,
                Arc::new(ledger),
                MinionSettings {
                    starting_balance: "lots".to_string(),
                    ..settings()
                },
            )
            .with_cached_sequence(5);

            let failure = minion.fund(&destination()).await.into_result().unwrap_err();
            assert_eq!(failure.stage, Stage::Build);
            assert!(matches!(failure.error, FriendbotError::InvalidAmount(_)));
            assert_eq!(minion.account().sequence(), Some(5));
        })
        .await
        .expect("test_bad_starting_balance_is_a_build_failure timed out");
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_tolerated() {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let mut ledger = MockLedgerClient::new();
            ledger
                .expect_submit_transaction()
                .returning(|_| Ok(success()));

            let (minion, _) = minion_with(ledger);
            let mut minion = minion.with_cached_sequence(5);

            let (tx, rx) = oneshot::channel();
            drop(rx);
            minion.run(&destination(), tx).await;
            assert_eq!(minion.account().sequence(), Some(6));
        })
        .await
        .expect("test_dropped_receiver_is_tolerated timed out");
    }
}
