//! End-to-end Herder scenarios against mock collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use drover_common::{
    AccountEntry, AccountId, Hash256, LedgerGateway, LedgerHeader, NodeId, SlotIndex, Transaction,
    TransactionSet, VirtualClock,
};
use drover_fba::{
    Ballot, Envelope, Fba, FbaDriver, LedgerValue, QuorumSet, Statement, ValidationCallback, Value,
};
use drover_overlay::{NodeMessage, OverlayGateway};
use drover_herder::{Herder, HerderConfig, HerderError};

// ---- mocks ---------------------------------------------------------------

struct MockLedger {
    header: Mutex<LedgerHeader>,
    accounts: Mutex<HashMap<AccountId, AccountEntry>>,
    externalized: Mutex<Vec<Arc<TransactionSet>>>,
}

impl MockLedger {
    fn new(header: LedgerHeader) -> Self {
        Self {
            header: Mutex::new(header),
            accounts: Mutex::new(HashMap::new()),
            externalized: Mutex::new(Vec::new()),
        }
    }

    fn add_account(&self, seed: u8, balance: i64) -> AccountId {
        let id = NodeId::from_bytes([seed; 32]);
        self.accounts.lock().insert(
            id,
            AccountEntry {
                account_id: id,
                balance,
                seq_num: 0,
            },
        );
        id
    }

    fn set_header(&self, header: LedgerHeader) {
        *self.header.lock() = header;
    }

    fn last_externalized(&self) -> Option<Arc<TransactionSet>> {
        self.externalized.lock().last().cloned()
    }
}

impl LedgerGateway for MockLedger {
    fn last_closed_header(&self) -> LedgerHeader {
        self.header.lock().clone()
    }

    fn tx_fee(&self) -> i64 {
        self.header.lock().base_fee as i64
    }

    fn load_account(&self, account: &AccountId) -> Option<AccountEntry> {
        self.accounts.lock().get(account).cloned()
    }

    fn externalize_value(&self, tx_set: Arc<TransactionSet>) {
        self.externalized.lock().push(tx_set);
    }
}

#[derive(Default)]
struct MockOverlay {
    messages: Mutex<Vec<NodeMessage>>,
}

impl MockOverlay {
    fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    fn tx_set_requests(&self) -> Vec<Hash256> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                NodeMessage::TxSetRequest(h) => Some(*h),
                _ => None,
            })
            .collect()
    }

    fn qset_requests(&self) -> Vec<Hash256> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                NodeMessage::QuorumSetRequest(h) => Some(*h),
                _ => None,
            })
            .collect()
    }

    fn fba_messages(&self) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| matches!(m, NodeMessage::FbaMessage(_)))
            .count()
    }

    fn transactions_since(&self, index: usize) -> Vec<Hash256> {
        self.messages.lock()[index..]
            .iter()
            .filter_map(|m| match m {
                NodeMessage::Transaction(tx) => Some(tx.full_hash()),
                _ => None,
            })
            .collect()
    }
}

impl OverlayGateway for MockOverlay {
    fn broadcast_message(&self, msg: NodeMessage) {
        self.messages.lock().push(msg);
    }
}

#[derive(Default)]
struct MockEngine {
    prepared: Mutex<Vec<(SlotIndex, Value, bool)>>,
    envelopes: Mutex<Vec<Envelope>>,
}

impl Fba for MockEngine {
    fn prepare_value(&self, slot: SlotIndex, value: &Value, bump: bool) {
        self.prepared.lock().push((slot, value.clone(), bump));
    }

    fn receive_envelope(&self, envelope: Envelope, cb: ValidationCallback) {
        self.envelopes.lock().push(envelope);
        cb(true);
    }

    fn local_node_id(&self) -> NodeId {
        NodeId::from_bytes([0xaa; 32])
    }
}

// ---- harness -------------------------------------------------------------

struct Harness {
    herder: Arc<Herder>,
    ledger: Arc<MockLedger>,
    overlay: Arc<MockOverlay>,
    engine: Arc<MockEngine>,
    clock: Arc<VirtualClock>,
}

const BASE_UNIX: u64 = 1_000_000;

fn harness_with(config: HerderConfig, header: LedgerHeader) -> Harness {
    let ledger = Arc::new(MockLedger::new(header));
    let overlay = Arc::new(MockOverlay::default());
    let engine = Arc::new(MockEngine::default());
    let clock = Arc::new(VirtualClock::starting_at(BASE_UNIX));

    let herder = Herder::new(config, ledger.clone(), overlay.clone(), clock.clone());
    herder.set_engine(engine.clone());

    Harness {
        herder,
        ledger,
        overlay,
        engine,
        clock,
    }
}

fn bootstrap_config() -> HerderConfig {
    HerderConfig {
        start_new_network: true,
        ..HerderConfig::default()
    }
}

fn genesis_header(seq: SlotIndex) -> LedgerHeader {
    LedgerHeader {
        seq,
        hash: Hash256::hash(b"genesis"),
        close_time: BASE_UNIX - 500,
        base_fee: 10,
        previous_ledger_hash: Hash256::ZERO,
    }
}

fn closed_header(seq: SlotIndex, previous: &LedgerHeader, close_time: u64) -> LedgerHeader {
    LedgerHeader {
        seq,
        hash: Hash256::hash(format!("ledger-{seq}").as_bytes()),
        close_time,
        base_fee: previous.base_fee,
        previous_ledger_hash: previous.hash,
    }
}

fn make_tx(source: AccountId, seq: u64) -> Arc<Transaction> {
    Arc::new(Transaction {
        source,
        destination: NodeId::from_bytes([0xdd; 32]),
        seq_num: seq,
        fee: 10,
        amount: 10,
    })
}

fn make_envelope(slot: SlotIndex) -> Envelope {
    Envelope {
        node_id: NodeId::from_bytes([9; 32]),
        slot_index: slot,
        quorum_set_hash: Hash256::ZERO,
        statement: Statement::Prepare(Ballot {
            counter: 0,
            value: Value(vec![1, 2, 3]),
        }),
    }
}

fn ledger_value(tx_set_hash: Hash256, close_time: u64, base_fee: u32) -> Value {
    LedgerValue {
        tx_set_hash,
        close_time,
        base_fee,
    }
    .encode()
}

/// Collects an asynchronous validation verdict.
fn verdict() -> (Arc<Mutex<Option<bool>>>, ValidationCallback) {
    let cell: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    let writer = cell.clone();
    (cell, Box::new(move |ok| *writer.lock() = Some(ok)))
}

/// Install a transaction set into the current fetcher the way the
/// overlay would deliver it: request first, then receive.
fn install_tx_set(harness: &Harness, set: &TransactionSet) {
    harness.herder.fetch_tx_set(&set.content_hash(), true);
    harness.herder.recv_tx_set(set.clone());
}

// ---- S1: bootstrap nominates --------------------------------------------

#[test]
fn bootstrap_nominates_empty_set() {
    let config = HerderConfig {
        desired_base_fee: 10,
        ..bootstrap_config()
    };
    let h = harness_with(config, genesis_header(0));

    h.herder.bootstrap().unwrap();

    let prepared = h.engine.prepared.lock();
    assert_eq!(prepared.len(), 1);
    let (slot, value, bump) = &prepared[0];
    assert_eq!(*slot, 1);
    assert!(!bump);

    let decoded = LedgerValue::decode(value).unwrap();
    let expected_set = TransactionSet::empty(h.ledger.last_closed_header().hash);
    assert_eq!(decoded.tx_set_hash, expected_set.content_hash());
    assert_eq!(decoded.base_fee, 10);
    // now > last close time, so close time is now.
    assert_eq!(decoded.close_time, BASE_UNIX);
}

#[test]
fn bootstrap_close_time_always_advances() {
    let mut header = genesis_header(0);
    header.close_time = BASE_UNIX + 50;
    let h = harness_with(bootstrap_config(), header);

    h.herder.bootstrap().unwrap();

    let prepared = h.engine.prepared.lock();
    let decoded = LedgerValue::decode(&prepared[0].1).unwrap();
    assert_eq!(decoded.close_time, BASE_UNIX + 51);
}

#[test]
fn bootstrap_requires_start_new_network() {
    let h = harness_with(HerderConfig::default(), genesis_header(0));
    assert!(matches!(
        h.herder.bootstrap(),
        Err(HerderError::BootstrapDisabled)
    ));
    assert!(h.engine.prepared.lock().is_empty());
}

// ---- S2: future envelope buffering --------------------------------------

#[test]
fn future_envelope_buffered_then_replayed_once() {
    let h = harness_with(bootstrap_config(), genesis_header(10));
    h.herder.bootstrap().unwrap();

    // Slot 12 is beyond the next slot (11): buffered, not delivered.
    h.herder
        .recv_fba_envelope(make_envelope(12), Box::new(|_| {}));
    assert!(h.engine.envelopes.lock().is_empty());

    // Ledger 11 closes; the trigger for slot 12 replays the buffer.
    let previous = h.ledger.last_closed_header();
    h.ledger.set_header(closed_header(11, &previous, BASE_UNIX));
    h.herder.ledger_closed(h.ledger.last_closed_header());
    h.herder.trigger_next_ledger();

    let envelopes = h.engine.envelopes.lock().clone();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].slot_index, 12);
    drop(envelopes);

    // A later trigger must not replay it again.
    let previous = h.ledger.last_closed_header();
    h.ledger.set_header(closed_header(12, &previous, BASE_UNIX + 1));
    h.herder.ledger_closed(h.ledger.last_closed_header());
    h.herder.trigger_next_ledger();
    assert_eq!(h.engine.envelopes.lock().len(), 1);
}

#[test]
fn envelope_outside_bracket_is_dropped() {
    let config = HerderConfig {
        ledger_validity_bracket: 5,
        ..bootstrap_config()
    };
    let h = harness_with(config, genesis_header(10));
    h.herder.bootstrap().unwrap();

    h.herder
        .recv_fba_envelope(make_envelope(16), Box::new(|_| {}));
    h.herder
        .recv_fba_envelope(make_envelope(4), Box::new(|_| {}));
    assert!(h.engine.envelopes.lock().is_empty());

    // In-window, current slot: straight through.
    h.herder
        .recv_fba_envelope(make_envelope(11), Box::new(|_| {}));
    assert_eq!(h.engine.envelopes.lock().len(), 1);
}

#[test]
fn envelopes_pass_through_unfiltered_while_syncing() {
    let h = harness_with(HerderConfig::default(), genesis_header(10));
    assert!(!h.herder.is_synced());

    h.herder
        .recv_fba_envelope(make_envelope(9_999), Box::new(|_| {}));
    assert_eq!(h.engine.envelopes.lock().len(), 1);
}

// ---- S3: fetch then resolve ----------------------------------------------

#[test]
fn validation_suspends_until_tx_set_arrives() {
    let h = harness_with(bootstrap_config(), genesis_header(10));
    h.herder.bootstrap().unwrap();

    let source = h.ledger.add_account(1, 1_000);
    let lcl = h.ledger.last_closed_header();
    let set = TransactionSet::new(lcl.hash, vec![make_tx(source, 1)]);
    let hash = set.content_hash();

    let value = ledger_value(hash, BASE_UNIX, 10);
    let (result, cont) = verdict();
    h.herder
        .validate_value(11, &NodeId::from_bytes([9; 32]), &value, cont);

    // Suspended: one request on the wire, no verdict yet.
    assert_eq!(h.overlay.tx_set_requests(), vec![hash]);
    assert!(result.lock().is_none());

    h.herder.recv_tx_set(set);
    assert_eq!(*result.lock(), Some(true));

    // The set's transactions entered cohort 0 on arrival.
    let buckets = h.herder.received_transactions();
    assert_eq!(buckets[0].len(), 1);
}

#[test]
fn concurrent_validations_share_one_request() {
    let h = harness_with(bootstrap_config(), genesis_header(10));
    h.herder.bootstrap().unwrap();

    let source = h.ledger.add_account(1, 1_000);
    let lcl = h.ledger.last_closed_header();
    let set = TransactionSet::new(lcl.hash, vec![make_tx(source, 1)]);
    let hash = set.content_hash();

    let (first, cont_a) = verdict();
    let (second, cont_b) = verdict();
    let value = ledger_value(hash, BASE_UNIX, 10);
    let peer = NodeId::from_bytes([9; 32]);
    h.herder.validate_value(11, &peer, &value, cont_a);
    h.herder.validate_value(11, &peer, &value, cont_b);

    // Deduplicated: a single request for the hash.
    assert_eq!(h.overlay.tx_set_requests(), vec![hash]);

    h.herder.recv_tx_set(set);
    assert_eq!(*first.lock(), Some(true));
    assert_eq!(*second.lock(), Some(true));
}

#[test]
fn decode_failure_is_rejected_inline() {
    let h = harness_with(bootstrap_config(), genesis_header(10));
    h.herder.bootstrap().unwrap();

    let (result, cont) = verdict();
    h.herder.validate_value(
        11,
        &NodeId::from_bytes([9; 32]),
        &Value(vec![0xff, 0xfe]),
        cont,
    );
    assert_eq!(*result.lock(), Some(false));
}

#[test]
fn wrong_slot_and_stale_close_time_are_rejected() {
    let h = harness_with(bootstrap_config(), genesis_header(10));
    h.herder.bootstrap().unwrap();
    let peer = NodeId::from_bytes([9; 32]);

    // Slot is not last closed + 1.
    let value = ledger_value(Hash256::hash(b"any"), BASE_UNIX, 10);
    let (result, cont) = verdict();
    h.herder.validate_value(13, &peer, &value, cont);
    assert_eq!(*result.lock(), Some(false));

    // Close time not after the last close.
    let lcl = h.ledger.last_closed_header();
    let stale = ledger_value(Hash256::hash(b"any"), lcl.close_time, 10);
    let (result, cont) = verdict();
    h.herder.validate_value(11, &peer, &stale, cont);
    assert_eq!(*result.lock(), Some(false));
}

// ---- S4: ballot-counter exhaustion guard ---------------------------------

#[test]
fn runaway_ballot_counter_is_rejected() {
    let config = HerderConfig {
        max_time_slip_secs: 10,
        max_fba_timeout_secs: 30,
        ..bootstrap_config()
    };
    let h = harness_with(config, genesis_header(10));
    h.herder.bootstrap().unwrap();
    h.clock.advance(Duration::from_secs(5));

    let nominated = LedgerValue::decode(&h.engine.prepared.lock()[0].1).unwrap();
    let peer = NodeId::from_bytes([9; 32]);

    // counter = 20 needs far more elapsed time than 5s (+10s slip).
    let ballot = Ballot {
        counter: 20,
        value: ledger_value(nominated.tx_set_hash, BASE_UNIX + 5, 10),
    };
    let (result, cont) = verdict();
    h.herder.validate_ballot(11, &peer, &ballot, cont);
    assert_eq!(*result.lock(), Some(false));

    // A counter consistent with the elapsed time passes.
    let ballot = Ballot {
        counter: 2,
        value: ledger_value(nominated.tx_set_hash, BASE_UNIX + 5, 10),
    };
    let (result, cont) = verdict();
    h.herder.validate_ballot(11, &peer, &ballot, cont);
    assert_eq!(*result.lock(), Some(true));
}

#[test]
fn far_future_close_time_is_rejected() {
    let config = HerderConfig {
        max_time_slip_secs: 10,
        ..bootstrap_config()
    };
    let h = harness_with(config, genesis_header(10));
    h.herder.bootstrap().unwrap();

    let nominated = LedgerValue::decode(&h.engine.prepared.lock()[0].1).unwrap();
    let ballot = Ballot {
        counter: 0,
        value: ledger_value(nominated.tx_set_hash, BASE_UNIX + 11, 10),
    };
    let (result, cont) = verdict();
    h.herder
        .validate_ballot(11, &NodeId::from_bytes([9; 32]), &ballot, cont);
    assert_eq!(*result.lock(), Some(false));
}

// ---- S5: base-fee band ---------------------------------------------------

#[test]
fn base_fee_band_is_enforced() {
    let config = HerderConfig {
        desired_base_fee: 100,
        ..bootstrap_config()
    };
    let h = harness_with(config, genesis_header(10));
    h.herder.bootstrap().unwrap();

    let nominated = LedgerValue::decode(&h.engine.prepared.lock()[0].1).unwrap();
    let peer = NodeId::from_bytes([9; 32]);
    let check = |base_fee: u32| {
        let ballot = Ballot {
            counter: 0,
            value: ledger_value(nominated.tx_set_hash, BASE_UNIX, base_fee),
        };
        let (result, cont) = verdict();
        h.herder.validate_ballot(11, &peer, &ballot, cont);
        let got = *result.lock();
        got.expect("verdict should be synchronous for a held tx set")
    };

    assert!(!check(40));
    assert!(check(50));
    assert!(check(150));
    assert!(check(200));
    assert!(!check(250));
}

// ---- ballot validation: oldest-cohort inclusion --------------------------

#[test]
fn ballots_must_include_long_flooded_transactions() {
    let h = harness_with(bootstrap_config(), genesis_header(0));
    h.herder.bootstrap().unwrap();

    let source = h.ledger.add_account(1, 1_000);
    let old_tx = make_tx(source, 1);
    assert!(h.herder.recv_transaction(old_tx.clone()));

    // Age the transaction into the oldest cohort by externalizing empty
    // sets three times.
    for round in 0..3u64 {
        let lcl = h.ledger.last_closed_header();
        let empty = TransactionSet::empty(lcl.hash);
        install_tx_set(&h, &empty);
        let value = ledger_value(empty.content_hash(), BASE_UNIX + round, 10);
        h.herder.value_externalized(round + 1, &value);
    }
    let buckets = h.herder.received_transactions();
    assert_eq!(buckets[3].len(), 1);

    let peer = NodeId::from_bytes([9; 32]);
    let lcl = h.ledger.last_closed_header();

    // A ballot whose set omits the flooded transaction is rejected.
    let without = TransactionSet::empty(lcl.hash);
    install_tx_set(&h, &without);
    let ballot = Ballot {
        counter: 0,
        value: ledger_value(without.content_hash(), BASE_UNIX, 10),
    };
    let (result, cont) = verdict();
    h.herder.validate_ballot(1, &peer, &ballot, cont);
    assert_eq!(*result.lock(), Some(false));

    // Including it passes.
    let with = TransactionSet::new(lcl.hash, vec![old_tx]);
    install_tx_set(&h, &with);
    let ballot = Ballot {
        counter: 0,
        value: ledger_value(with.content_hash(), BASE_UNIX, 10),
    };
    let (result, cont) = verdict();
    h.herder.validate_ballot(1, &peer, &ballot, cont);
    assert_eq!(*result.lock(), Some(true));
}

// ---- S6: externalize and shift -------------------------------------------

#[test]
fn externalize_commits_rebroadcasts_and_ages() {
    let h = harness_with(bootstrap_config(), genesis_header(0));
    h.herder.bootstrap().unwrap();

    let src: Vec<AccountId> = (1..=5).map(|i| h.ledger.add_account(i, 1_000)).collect();
    let (a, b, c, d, e) = (
        make_tx(src[0], 1),
        make_tx(src[1], 1),
        make_tx(src[2], 1),
        make_tx(src[3], 1),
        make_tx(src[4], 1),
    );

    let externalize_empty = |slot: SlotIndex| {
        let lcl = h.ledger.last_closed_header();
        let empty = TransactionSet::empty(lcl.hash);
        install_tx_set(&h, &empty);
        let value = ledger_value(empty.content_hash(), BASE_UNIX + slot, 10);
        h.herder.value_externalized(slot, &value);
    };

    // Build buckets [{a,b}, {c}, {d}, {e}].
    assert!(h.herder.recv_transaction(e.clone()));
    externalize_empty(1);
    assert!(h.herder.recv_transaction(d.clone()));
    externalize_empty(2);
    assert!(h.herder.recv_transaction(c.clone()));
    externalize_empty(3);
    assert!(h.herder.recv_transaction(a.clone()));
    assert!(h.herder.recv_transaction(b.clone()));

    let buckets = h.herder.received_transactions();
    assert_eq!(
        buckets.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![2, 1, 1, 1]
    );

    // Externalize a set committing {a, d}.
    let lcl = h.ledger.last_closed_header();
    let committed = TransactionSet::new(lcl.hash, vec![a.clone(), d.clone()]);
    install_tx_set(&h, &committed);
    let mark = h.overlay.message_count();
    let value = ledger_value(committed.content_hash(), BASE_UNIX + 10, 10);
    h.herder.value_externalized(4, &value);

    // The ledger received {a, d}.
    let applied = h.ledger.last_externalized().unwrap();
    assert_eq!(applied.content_hash(), committed.content_hash());

    // Only c (cohort 1 before the shift) was rebroadcast.
    assert_eq!(h.overlay.transactions_since(mark), vec![c.full_hash()]);

    // Survivors shifted one cohort older: [{}, {b}, {c}, {e}].
    let buckets = h.herder.received_transactions();
    assert_eq!(
        buckets.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![0, 1, 1, 1]
    );
    assert_eq!(buckets[1][0].full_hash(), b.full_hash());
    assert_eq!(buckets[2][0].full_hash(), c.full_hash());
    assert_eq!(buckets[3][0].full_hash(), e.full_hash());
}

#[test]
fn externalize_without_held_set_leaves_state_alone() {
    let h = harness_with(bootstrap_config(), genesis_header(0));
    h.herder.bootstrap().unwrap();

    let source = h.ledger.add_account(1, 1_000);
    h.herder.recv_transaction(make_tx(source, 1));

    let value = ledger_value(Hash256::hash(b"missing"), BASE_UNIX, 10);
    h.herder.value_externalized(1, &value);

    assert!(h.ledger.last_externalized().is_none());
    let buckets = h.herder.received_transactions();
    assert_eq!(buckets[0].len(), 1);
}

// ---- quorum sets ---------------------------------------------------------

#[test]
fn local_quorum_set_resolves_immediately() {
    let quorum = QuorumSet::new(1, vec![NodeId::from_bytes([7; 32])]);
    let config = HerderConfig {
        quorum_set: quorum.clone(),
        ..bootstrap_config()
    };
    let h = harness_with(config, genesis_header(0));

    let resolved: Arc<Mutex<Option<QuorumSet>>> = Arc::new(Mutex::new(None));
    let writer = resolved.clone();
    h.herder.retrieve_quorum_set(
        &NodeId::from_bytes([1; 32]),
        &quorum.hash(),
        Box::new(move |qset| *writer.lock() = Some((*qset).clone())),
    );

    assert_eq!(resolved.lock().as_ref(), Some(&quorum));
    // No network traffic for our own quorum set.
    assert!(h.overlay.qset_requests().is_empty());
}

#[test]
fn unknown_quorum_set_is_fetched_then_delivered() {
    let h = harness_with(bootstrap_config(), genesis_header(0));
    let foreign = QuorumSet::new(2, vec![NodeId::from_bytes([8; 32])]);
    let hash = foreign.hash();

    let resolved: Arc<Mutex<Option<QuorumSet>>> = Arc::new(Mutex::new(None));
    let writer = resolved.clone();
    h.herder.retrieve_quorum_set(
        &NodeId::from_bytes([8; 32]),
        &hash,
        Box::new(move |qset| *writer.lock() = Some((*qset).clone())),
    );

    assert_eq!(h.overlay.qset_requests(), vec![hash]);
    assert!(resolved.lock().is_none());

    h.herder.recv_quorum_set(foreign.clone());
    assert_eq!(resolved.lock().as_ref(), Some(&foreign));
}

// ---- sync-wait suppression -----------------------------------------------

#[test]
fn no_emission_while_syncing() {
    let h = harness_with(HerderConfig::default(), genesis_header(0));
    assert_eq!(h.herder.ledgers_to_wait(), 3);

    h.herder.emit_envelope(&make_envelope(1));
    assert_eq!(h.overlay.fba_messages(), 0);

    // Once synced, emission goes through.
    h.herder.set_app_synced(true);
    for seq in 1..=3 {
        let previous = h.ledger.last_closed_header();
        let header = closed_header(seq, &previous, BASE_UNIX);
        h.ledger.set_header(header.clone());
        h.herder.ledger_closed(header);
    }
    assert!(h.herder.is_synced());
    h.herder.emit_envelope(&make_envelope(4));
    assert_eq!(h.overlay.fba_messages(), 1);
}

#[test]
fn sync_wait_only_counts_down_in_synced_state() {
    let h = harness_with(HerderConfig::default(), genesis_header(0));

    // Application not yet in its synced state: closes don't count.
    h.herder.ledger_closed(genesis_header(1));
    h.herder.ledger_closed(genesis_header(2));
    assert_eq!(h.herder.ledgers_to_wait(), 3);

    h.herder.set_app_synced(true);
    h.herder.ledger_closed(genesis_header(3));
    assert_eq!(h.herder.ledgers_to_wait(), 2);
}

// ---- value ordering ------------------------------------------------------

#[test]
fn compare_values_is_antisymmetric_and_bytewise() {
    let h = harness_with(HerderConfig::default(), genesis_header(0));
    let v1 = Value(vec![1, 2, 3]);
    let v2 = Value(vec![1, 2, 4]);

    assert_eq!(
        h.herder.compare_values(1, 0, &v1, &v2),
        h.herder.compare_values(1, 0, &v2, &v1).reverse()
    );
    assert_eq!(
        h.herder.compare_values(1, 0, &v1, &v1),
        std::cmp::Ordering::Equal
    );
    assert_eq!(
        h.herder.compare_values(1, 0, &v1, &v2),
        std::cmp::Ordering::Less
    );
}

// ---- bump action ---------------------------------------------------------

#[test]
fn ballot_expiry_bumps_our_value() {
    let h = harness_with(bootstrap_config(), genesis_header(0));
    h.herder.bootstrap().unwrap();
    let nominated = h.engine.prepared.lock()[0].1.clone();

    h.herder.expire_ballot(
        1,
        Ballot {
            counter: 1,
            value: nominated.clone(),
        },
    );

    let prepared = h.engine.prepared.lock();
    assert_eq!(prepared.len(), 2);
    assert_eq!(prepared[1].0, 1);
    assert_eq!(prepared[1].1, nominated);
    assert!(prepared[1].2);
}

#[test]
fn stale_ballot_expiry_is_ignored() {
    let h = harness_with(bootstrap_config(), genesis_header(5));
    h.herder.bootstrap().unwrap();

    h.herder.expire_ballot(
        3,
        Ballot {
            counter: 1,
            value: Value(vec![1]),
        },
    );
    assert_eq!(h.engine.prepared.lock().len(), 1);
}

// ---- trigger timer integration -------------------------------------------

#[tokio::test]
async fn ledger_close_arms_the_trigger_timer() {
    let config = HerderConfig {
        exp_ledger_timespan_secs: 0,
        ..bootstrap_config()
    };
    let h = harness_with(config, genesis_header(0));
    let manager = h.herder.create_timer_manager();
    let task = tokio::spawn(manager.run());

    h.herder.bootstrap().unwrap();
    assert_eq!(h.engine.prepared.lock().len(), 1);

    let previous = h.ledger.last_closed_header();
    h.ledger.set_header(closed_header(1, &previous, BASE_UNIX));
    h.herder.ledger_closed(h.ledger.last_closed_header());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let prepared = h.engine.prepared.lock();
    assert_eq!(prepared.len(), 2);
    assert_eq!(prepared[1].0, 2);
    drop(prepared);

    task.abort();
}
