//! Integration tests for minion runs against the in-memory ledger

use async_trait::async_trait;
use friendbot::crypto::KeyPair;
use friendbot::dispatcher::{BasicMinionDispatcher, MinionDispatcher};
use friendbot::ledger::{InMemoryLedger, LedgerClient, TransactionSuccess};
use friendbot::minion::{BotAccount, Minion, MinionSettings, MinionState, Stage, SubmitResult};
use friendbot::transaction::{parse_amount, TransactionEnvelope};
use friendbot::{ErrorCategory, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

const NETWORK: &str = "Test SDF Network ; September 2015";

/// Counts refreshes and records every submitted sequence number, delegating
/// the real work to the basic dispatcher.
#[derive(Default)]
struct RecordingDispatcher {
    refreshes: AtomicUsize,
    submitted: parking_lot::Mutex<Vec<i64>>,
}

impl RecordingDispatcher {
    fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn submitted(&self) -> Vec<i64> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl MinionDispatcher for RecordingDispatcher {
    async fn submit_transaction(
        &self,
        minion: &mut Minion,
        client: &dyn LedgerClient,
        envelope: &str,
    ) -> Result<TransactionSuccess> {
        let decoded = TransactionEnvelope::from_base64(envelope)?;
        assert_eq!(decoded.signatures.len(), 2);
        self.submitted.lock().push(decoded.tx.sequence);
        BasicMinionDispatcher
            .submit_transaction(minion, client, envelope)
            .await
    }

    async fn check_sequence_refresh(
        &self,
        minion: &mut Minion,
        client: &dyn LedgerClient,
    ) -> Result<()> {
        if minion.needs_sequence_refresh() {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
        BasicMinionDispatcher
            .check_sequence_refresh(minion, client)
            .await
    }
}

struct Harness {
    ledger: Arc<InMemoryLedger>,
    dispatcher: Arc<RecordingDispatcher>,
    minion: Minion,
}

fn harness() -> Harness {
    let ledger = Arc::new(InMemoryLedger::new(NETWORK));
    let bot = Arc::new(BotAccount::new(KeyPair::generate()));
    let keypair = KeyPair::generate();
    ledger.create_genesis_account(bot.id(), parse_amount("1000000").unwrap());
    ledger.create_genesis_account(keypair.account_id(), parse_amount("10").unwrap());

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let minion = Minion::new(
        keypair,
        bot,
        ledger.clone(),
        MinionSettings {
            network_passphrase: NETWORK.to_string(),
            starting_balance: "10000.00".to_string(),
            base_fee: 100,
        },
    )
    .with_dispatcher(dispatcher.clone());

    Harness {
        ledger,
        dispatcher,
        minion,
    }
}

fn destination() -> String {
    KeyPair::generate().account_id().to_string()
}

async fn run(minion: &mut Minion, destination: &str) -> SubmitResult {
    let (tx, rx) = oneshot::channel();
    minion.run(destination, tx).await;
    rx.await.expect("minion must reply exactly once")
}

#[tokio::test]
async fn test_first_run_refreshes_once_and_caches_next_sequence() {
    let mut h = harness();
    let on_ledger = h.ledger.sequence(&h.minion.account_id()).unwrap();

    let result = run(&mut h.minion, &destination()).await;
    assert!(result.is_success(), "{:?}", result);

    assert_eq!(h.dispatcher.refreshes(), 1);
    assert_eq!(h.dispatcher.submitted(), vec![on_ledger + 1]);
    assert_eq!(h.minion.account().sequence(), Some(on_ledger + 1));
    assert_eq!(h.minion.state(), MinionState::Ready);
}

#[tokio::test]
async fn test_successive_submissions_are_consecutive() {
    let mut h = harness();

    for _ in 0..5 {
        assert!(run(&mut h.minion, &destination()).await.is_success());
    }

    assert_eq!(h.dispatcher.refreshes(), 1);
    let submitted = h.dispatcher.submitted();
    for pair in submitted.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }
    assert_eq!(
        h.ledger.sequence(&h.minion.account_id()),
        submitted.last().copied()
    );
}

#[tokio::test]
async fn test_bad_sequence_self_heals_on_next_run() {
    let mut h = harness();
    assert!(run(&mut h.minion, &destination()).await.is_success());

    // Someone else used the minion's account behind our back.
    let id = h.minion.account_id();
    let bumped = h.ledger.sequence(&id).unwrap() + 3;
    h.ledger.set_sequence(&id, bumped);

    let failed = run(&mut h.minion, &destination()).await;
    let failure = failed.into_result().unwrap_err();
    assert_eq!(failure.stage, Stage::Submit);
    assert_eq!(failure.category(), ErrorCategory::SequenceConflict);
    assert!(h.minion.force_refresh_sequence());
    assert_eq!(h.dispatcher.refreshes(), 1);

    let retried = run(&mut h.minion, &destination()).await;
    assert!(retried.is_success(), "{:?}", retried);
    assert_eq!(h.dispatcher.refreshes(), 2);
    assert!(!h.minion.force_refresh_sequence());
    assert_eq!(h.dispatcher.submitted().last().copied(), Some(bumped + 1));
}

#[tokio::test]
async fn test_existing_account_is_classified_and_sequence_stays_valid() {
    let mut h = harness();
    let dest = destination();

    assert!(run(&mut h.minion, &dest).await.is_success());
    let again = run(&mut h.minion, &dest).await;
    assert!(again.is_account_exists());
    assert_eq!(
        again.into_result().unwrap_err().category(),
        ErrorCategory::DuplicateEffect
    );
    assert!(!h.minion.force_refresh_sequence());

    // the ledger consumed the sequence, so the cache is still in step
    assert!(run(&mut h.minion, &destination()).await.is_success());
    assert_eq!(h.dispatcher.refreshes(), 1);
}

#[tokio::test]
async fn test_unknown_minion_account_fails_refresh() {
    let ledger = Arc::new(InMemoryLedger::new(NETWORK));
    let bot = Arc::new(BotAccount::new(KeyPair::generate()));
    ledger.create_genesis_account(bot.id(), parse_amount("1000000").unwrap());

    let mut minion = Minion::new(
        KeyPair::generate(),
        bot,
        ledger.clone(),
        MinionSettings {
            network_passphrase: NETWORK.to_string(),
            starting_balance: "10000.00".to_string(),
            base_fee: 100,
        },
    );

    let failure = run(&mut minion, &destination())
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(failure.stage, Stage::SequenceRefresh);
    assert_eq!(ledger.submission_count(), 0);
    assert_eq!(minion.state(), MinionState::Uninitialized);
}

#[tokio::test]
async fn test_malformed_envelope_is_unclassified_rejection() {
    let mut h = harness();
    let client: &dyn LedgerClient = h.ledger.as_ref();

    let err = BasicMinionDispatcher
        .submit_transaction(&mut h.minion, client, "not an envelope")
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Unclassified);
    assert!(err.to_string().contains("tx_malformed"));
    assert!(!h.minion.force_refresh_sequence());
}
