//! The Herder itself.
//!
//! One instance per node. It owns the received-transaction cohorts, the
//! content fetchers, the pending-validation tables and the future-slot
//! envelope buffer, and implements the [`FbaDriver`] capability set the
//! agreement engine calls back into.
//!
//! Everything here runs on whichever task delivers the event, so shared
//! state sits behind short-lived locks. Validation that cannot finish
//! synchronously is parked as a pending-check record keyed by the
//! artifact hash it is waiting for.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use drover_common::{
    Clock, Hash256, LedgerGateway, LedgerHeader, NodeId, SlotIndex, Transaction, TransactionSet,
};
use drover_fba::{
    Ballot, Envelope, Fba, FbaDriver, LedgerValue, QuorumSet, QuorumSetCallback,
    ValidationCallback, Value,
};
use drover_overlay::{ItemFetcher, NodeMessage, OverlayGateway, PeerId, TransactionBroadcast};

use crate::timers::{TimerCallback, TimerHandle, TimerManager};
use crate::tx_queue::ReceivedTxQueue;
use crate::{HerderConfig, HerderError, Result, SYNC_WAIT_LEDGERS};

/// A validation blocked on a transaction set that has not arrived yet.
/// Only the engine's continuation is opaque; the rest of the blocked
/// work is plain data keyed by the artifact hash.
struct PendingCheck {
    slot: SlotIndex,
    node_id: NodeId,
    require_oldest_cohort: bool,
    cont: ValidationCallback,
}

/// Node-local driver for the federated agreement engine.
pub struct Herder {
    config: HerderConfig,
    ledger: Arc<dyn LedgerGateway>,
    overlay: Arc<dyn OverlayGateway>,
    clock: Arc<dyn Clock>,
    engine: RwLock<Option<Arc<dyn Fba>>>,

    last_closed: RwLock<LedgerHeader>,
    /// Ledgers still to observe before participating.
    ledgers_to_wait: AtomicU32,
    /// Whether the application has reached its synced state; the wait
    /// counter only counts down while this holds.
    app_synced: AtomicBool,

    last_trigger: RwLock<Instant>,
    last_trigger_unix: AtomicU64,
    local_value: RwLock<Value>,

    /// Two fetchers rotated at externalization: stopping the committed
    /// slot's fetches must not cancel requests the next slot's envelopes
    /// already started.
    tx_set_fetchers: [ItemFetcher<TransactionSet>; 2],
    current_tx_fetcher: AtomicUsize,
    qset_fetcher: ItemFetcher<QuorumSet>,

    pending_tx_checks: Mutex<HashMap<Hash256, Vec<PendingCheck>>>,
    pending_qset_retrievals: Mutex<HashMap<Hash256, Vec<QuorumSetCallback>>>,

    /// Envelopes for slots beyond the next one, replayed on that slot's
    /// trigger in arrival order.
    future_envelopes: Mutex<BTreeMap<SlotIndex, Vec<(Envelope, ValidationCallback)>>>,

    received: Mutex<ReceivedTxQueue>,
    timers: RwLock<Option<TimerHandle>>,
}

impl Herder {
    /// Create a Herder wired to its collaborators.
    ///
    /// The local quorum set is published into the quorum-set fetcher
    /// immediately, so peers and our own engine resolving it by hash are
    /// served without a network round trip.
    pub fn new(
        config: HerderConfig,
        ledger: Arc<dyn LedgerGateway>,
        overlay: Arc<dyn OverlayGateway>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let last_closed = ledger.last_closed_header();
        let now = clock.now();
        let now_unix = clock.unix_time();

        let herder = Arc::new(Self {
            ledger,
            overlay: overlay.clone(),
            clock,
            engine: RwLock::new(None),
            last_closed: RwLock::new(last_closed),
            ledgers_to_wait: AtomicU32::new(SYNC_WAIT_LEDGERS),
            app_synced: AtomicBool::new(false),
            last_trigger: RwLock::new(now),
            last_trigger_unix: AtomicU64::new(now_unix),
            local_value: RwLock::new(Value::default()),
            tx_set_fetchers: [ItemFetcher::new("tx-set"), ItemFetcher::new("tx-set")],
            current_tx_fetcher: AtomicUsize::new(0),
            qset_fetcher: ItemFetcher::new("quorum-set"),
            pending_tx_checks: Mutex::new(HashMap::new()),
            pending_qset_retrievals: Mutex::new(HashMap::new()),
            future_envelopes: Mutex::new(BTreeMap::new()),
            received: Mutex::new(ReceivedTxQueue::new()),
            timers: RwLock::new(None),
            config,
        });

        for fetcher in &herder.tx_set_fetchers {
            let overlay = overlay.clone();
            fetcher.set_request_handler(move |hash| {
                overlay.broadcast_message(NodeMessage::TxSetRequest(hash));
            });
        }
        {
            let overlay = overlay.clone();
            herder.qset_fetcher.set_request_handler(move |hash| {
                overlay.broadcast_message(NodeMessage::QuorumSetRequest(hash));
            });
        }

        herder.qset_fetcher.insert(herder.config.quorum_set.clone());

        herder
    }

    /// Install the agreement engine.
    pub fn set_engine(&self, engine: Arc<dyn Fba>) {
        *self.engine.write() = Some(engine);
    }

    /// Create the timer task for this Herder; the caller spawns
    /// [`TimerManager::run`].
    pub fn create_timer_manager(self: &Arc<Self>) -> TimerManager<HerderTimerHook> {
        let hook = Arc::new(HerderTimerHook {
            herder: Arc::downgrade(self),
        });
        let (handle, manager) = TimerManager::new(hook);
        *self.timers.write() = Some(handle);
        manager
    }

    /// Whether this node participates in consensus.
    pub fn is_synced(&self) -> bool {
        self.ledgers_to_wait.load(AtomicOrdering::Acquire) == 0
    }

    /// Ledgers left to observe before participating.
    pub fn ledgers_to_wait(&self) -> u32 {
        self.ledgers_to_wait.load(AtomicOrdering::Acquire)
    }

    /// Tell the Herder whether the application reports itself synced.
    pub fn set_app_synced(&self, synced: bool) {
        self.app_synced.store(synced, AtomicOrdering::Release);
    }

    /// This node's identity.
    pub fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }

    /// Read-only snapshot of the received-transaction cohorts, youngest
    /// first.
    pub fn received_transactions(&self) -> Vec<Vec<Arc<Transaction>>> {
        self.received.lock().buckets().to_vec()
    }

    fn engine(&self) -> Option<Arc<dyn Fba>> {
        self.engine.read().clone()
    }

    /// Start a brand-new network from the configured genesis ledger.
    ///
    /// Skips the sync wait entirely and nominates for the first slot.
    pub fn bootstrap(&self) -> Result<()> {
        if !self.config.start_new_network {
            return Err(HerderError::BootstrapDisabled);
        }

        *self.last_closed.write() = self.ledger.last_closed_header();
        self.ledgers_to_wait.store(0, AtomicOrdering::Release);
        self.trigger_next_ledger();
        Ok(())
    }

    /// The ledger subsystem closed a ledger.
    ///
    /// Advances our view, counts down the sync wait while the
    /// application is in its synced state, and re-arms the trigger timer
    /// so consecutive nominations stay at least the expected ledger
    /// timespan apart.
    pub fn ledger_closed(&self, header: LedgerHeader) {
        trace!(seq = header.seq, hash = %header.hash.short_hex(), "ledger closed");
        *self.last_closed.write() = header;

        if self.ledgers_to_wait.load(AtomicOrdering::Acquire) > 0
            && self.app_synced.load(AtomicOrdering::Acquire)
        {
            self.ledgers_to_wait.fetch_sub(1, AtomicOrdering::AcqRel);
        }
        if self.ledgers_to_wait.load(AtomicOrdering::Acquire) > 0 {
            return;
        }

        let elapsed = self.clock.now().duration_since(*self.last_trigger.read());
        let delay = trigger_delay(elapsed, Duration::from_secs(self.config.exp_ledger_timespan_secs));

        match self.timers.read().as_ref() {
            Some(timers) => {
                timers.schedule_trigger(delay);
            }
            None => debug!("no timer task; trigger not armed"),
        }
    }

    /// Nominate a value for the next slot.
    ///
    /// Proposes every pending transaction across all cohorts, publishes
    /// the proposed set so peers can resolve it by hash, and hands the
    /// encoded value to the engine. Buffered envelopes for the new slot
    /// are replayed afterwards.
    pub fn trigger_next_ledger(&self) {
        *self.last_trigger.write() = self.clock.now();
        self.last_trigger_unix
            .store(self.clock.unix_time(), AtomicOrdering::Release);

        let last_closed = self.last_closed.read().clone();
        let slot = last_closed.seq + 1;

        let proposed = TransactionSet::new(last_closed.hash, self.received.lock().all());
        let tx_set_hash = proposed.content_hash();
        let proposed = self.current_tx_fetcher().insert(proposed);
        self.resolve_pending_tx_checks(&proposed);

        let mut next_close_time = self.clock.unix_time();
        if next_close_time <= last_closed.close_time {
            next_close_time = last_closed.close_time + 1;
        }

        let value = LedgerValue {
            tx_set_hash,
            close_time: next_close_time,
            base_fee: self.config.desired_base_fee,
        }
        .encode();
        *self.local_value.write() = value.clone();

        debug!(
            slot,
            txs = proposed.len(),
            tx_set = %tx_set_hash.short_hex(),
            previous = %last_closed.hash.short_hex(),
            "nominating"
        );

        match self.engine() {
            Some(engine) => engine.prepare_value(slot, &value, false),
            None => warn!(slot, "no agreement engine installed"),
        }

        let buffered = self.future_envelopes.lock().remove(&slot).unwrap_or_default();
        for (envelope, cb) in buffered {
            self.recv_fba_envelope(envelope, cb);
        }
    }

    /// The bump timer fired: re-prepare our value with a counter bump.
    ///
    /// If the slot already externalized this is a stale expiry and a
    /// no-op.
    pub fn expire_ballot(&self, slot: SlotIndex, ballot: Ballot) {
        let expected = self.last_closed.read().seq + 1;
        if slot != expected {
            debug!(slot, expected, "stale ballot expiry ignored");
            return;
        }

        let value = self.local_value.read().clone();
        if value.is_empty() {
            debug!(slot, "ballot expired before we nominated");
            return;
        }

        debug!(slot, counter = ballot.counter, "ballot expired, bumping");
        if let Some(engine) = self.engine() {
            engine.prepare_value(slot, &value, true);
        }
    }

    /// An envelope arrived from the overlay.
    ///
    /// When synced, envelopes outside the validity bracket are dropped
    /// silently and envelopes for slots beyond the next one are buffered
    /// for replay on that slot's trigger. While syncing, everything
    /// passes through so the engine can observe agreement.
    pub fn recv_fba_envelope(&self, envelope: Envelope, cb: ValidationCallback) {
        if self.is_synced() {
            let last_seq = self.last_closed.read().seq;
            let bracket = self.config.ledger_validity_bracket;
            let min_seq = last_seq.saturating_sub(bracket);
            let max_seq = last_seq + bracket;

            if envelope.slot_index < min_seq || envelope.slot_index > max_seq {
                trace!(
                    slot = envelope.slot_index,
                    min_seq,
                    max_seq,
                    "envelope outside validity bracket"
                );
                return;
            }

            if envelope.slot_index > last_seq + 1 {
                trace!(slot = envelope.slot_index, "buffering future envelope");
                self.future_envelopes
                    .lock()
                    .entry(envelope.slot_index)
                    .or_default()
                    .push((envelope, cb));
                return;
            }
        }

        match self.engine() {
            Some(engine) => engine.receive_envelope(envelope, cb),
            None => warn!("no agreement engine installed"),
        }
    }

    /// Accept a transaction from the network into cohort 0.
    pub fn recv_transaction(&self, tx: Arc<Transaction>) -> bool {
        self.received.lock().try_enqueue(tx, self.ledger.as_ref())
    }

    // ---- transaction-set fetching ----------------------------------------

    fn current_tx_fetcher(&self) -> &ItemFetcher<TransactionSet> {
        &self.tx_set_fetchers[self.current_tx_fetcher.load(AtomicOrdering::Acquire) & 1]
    }

    /// Look up a transaction set, optionally requesting it from peers.
    pub fn fetch_tx_set(&self, hash: &Hash256, ask_network: bool) -> Option<Arc<TransactionSet>> {
        self.current_tx_fetcher().fetch_item(hash, ask_network)
    }

    /// A transaction set arrived from a peer.
    ///
    /// If anyone asked for it, its transactions enter the received
    /// queue and every validation blocked on its hash resumes, in
    /// arrival order.
    pub fn recv_tx_set(&self, tx_set: TransactionSet) {
        let hash = tx_set.content_hash();
        if !self.current_tx_fetcher().recv_item(tx_set) {
            return;
        }
        if let Some(tx_set) = self.fetch_tx_set(&hash, false) {
            for tx in &tx_set.transactions {
                self.recv_transaction(tx.clone());
            }
            self.resolve_pending_tx_checks(&tx_set);
        }
    }

    /// A peer replied that it does not have a transaction set.
    pub fn doesnt_have_tx_set(&self, hash: &Hash256, peer: PeerId) {
        self.current_tx_fetcher().doesnt_have(hash, peer);
    }

    fn resolve_pending_tx_checks(&self, tx_set: &Arc<TransactionSet>) {
        let checks = self.pending_tx_checks.lock().remove(&tx_set.content_hash());
        if let Some(checks) = checks {
            for check in checks {
                self.run_tx_set_check(check, tx_set);
            }
        }
    }

    fn queue_tx_set_check(&self, tx_set_hash: Hash256, check: PendingCheck) {
        match self.fetch_tx_set(&tx_set_hash, true) {
            Some(tx_set) => self.run_tx_set_check(check, &tx_set),
            None => self
                .pending_tx_checks
                .lock()
                .entry(tx_set_hash)
                .or_default()
                .push(check),
        }
    }

    fn run_tx_set_check(&self, check: PendingCheck, tx_set: &Arc<TransactionSet>) {
        let ok = self.tx_set_check_passes(&check, tx_set);
        trace!(
            slot = check.slot,
            node = %check.node_id.short_hex(),
            tx_set = %tx_set.content_hash().short_hex(),
            ok,
            "tx set check"
        );
        (check.cont)(ok);
    }

    fn tx_set_check_passes(&self, check: &PendingCheck, tx_set: &Arc<TransactionSet>) -> bool {
        if self.is_synced() && !tx_set.check_valid(self.ledger.as_ref()) {
            debug!(
                slot = check.slot,
                node = %check.node_id.short_hex(),
                tx_set = %tx_set.content_hash().short_hex(),
                "invalid tx set"
            );
            return false;
        }

        if check.require_oldest_cohort {
            let received = self.received.lock();
            for tx in received.oldest() {
                if !tx_set.contains(&tx.full_hash()) {
                    debug!(
                        slot = check.slot,
                        node = %check.node_id.short_hex(),
                        tx = %tx.full_hash().short_hex(),
                        "tx set missing a transaction we have flooded for three slots"
                    );
                    return false;
                }
            }
        }

        true
    }

    // ---- quorum-set fetching ---------------------------------------------

    /// Look up a quorum set, optionally requesting it from peers.
    pub fn fetch_quorum_set(&self, hash: &Hash256, ask_network: bool) -> Option<Arc<QuorumSet>> {
        self.qset_fetcher.fetch_item(hash, ask_network)
    }

    /// A quorum set arrived from a peer.
    pub fn recv_quorum_set(&self, qset: QuorumSet) {
        let hash = qset.hash();
        debug!(qset = %hash.short_hex(), "received quorum set");
        if !self.qset_fetcher.recv_item(qset) {
            return;
        }
        if let Some(qset) = self.fetch_quorum_set(&hash, false) {
            let conts = self.pending_qset_retrievals.lock().remove(&hash);
            if let Some(conts) = conts {
                for cont in conts {
                    cont(qset.clone());
                }
            }
        }
    }

    /// A peer replied that it does not have a quorum set.
    pub fn doesnt_have_quorum_set(&self, hash: &Hash256, peer: PeerId) {
        self.qset_fetcher.doesnt_have(hash, peer);
    }
}

impl FbaDriver for Herder {
    fn validate_value(
        &self,
        slot: SlotIndex,
        node_id: &NodeId,
        value: &Value,
        cont: ValidationCallback,
    ) {
        let decoded = match LedgerValue::decode(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(slot, node = %node_id.short_hex(), %e, "value decode failed");
                return cont(false);
            }
        };

        // Ledger-relative predicates only apply once fully synced.
        if self.is_synced() {
            let last_closed = self.last_closed.read().clone();
            if last_closed.seq + 1 != slot {
                return cont(false);
            }
            if decoded.close_time <= last_closed.close_time {
                return cont(false);
            }
        }

        self.queue_tx_set_check(
            decoded.tx_set_hash,
            PendingCheck {
                slot,
                node_id: *node_id,
                require_oldest_cohort: false,
                cont,
            },
        );
    }

    fn validate_ballot(
        &self,
        slot: SlotIndex,
        node_id: &NodeId,
        ballot: &Ballot,
        cont: ValidationCallback,
    ) {
        let decoded = match LedgerValue::decode(&ballot.value) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(slot, node = %node_id.short_hex(), %e, "ballot decode failed");
                return cont(false);
            }
        };

        if self.is_synced() {
            let last_closed = self.last_closed.read().clone();
            if last_closed.seq + 1 != slot {
                return cont(false);
            }
            if decoded.close_time <= last_closed.close_time {
                return cont(false);
            }
        }

        let now = self.clock.unix_time();
        let slip = self.config.max_time_slip_secs;

        // Close time must not sit too far in the future.
        if decoded.close_time > now + slip {
            return cont(false);
        }

        // Ignore ballots triggered before the expected series of
        // timeouts (allowing `slip` as error); a peer cannot push the
        // counter faster than the timeout schedule allows.
        let last_trigger = self.last_trigger_unix.load(AtomicOrdering::Acquire);
        let sum_timeouts = sum_ballot_timeouts(ballot.counter, self.config.max_fba_timeout_secs);
        if now + slip < last_trigger.saturating_add(sum_timeouts) {
            debug!(
                slot,
                node = %node_id.short_hex(),
                counter = ballot.counter,
                "ballot counter ahead of timeout schedule"
            );
            return cont(false);
        }

        // Base fee must sit within the accepted band around ours.
        let desired = self.config.desired_base_fee as u64;
        let base_fee = decoded.base_fee as u64;
        if base_fee * 2 < desired || base_fee > desired * 2 {
            return cont(false);
        }

        self.queue_tx_set_check(
            decoded.tx_set_hash,
            PendingCheck {
                slot,
                node_id: *node_id,
                require_oldest_cohort: true,
                cont,
            },
        );
    }

    fn compare_values(
        &self,
        _slot: SlotIndex,
        _ballot_counter: u32,
        v1: &Value,
        v2: &Value,
    ) -> Ordering {
        // Purely syntactic: the engine uses this to break preference
        // ties identically across all honest nodes.
        v1.cmp(v2)
    }

    fn ballot_did_hear_from_quorum(&self, slot: SlotIndex, ballot: &Ballot) {
        if !self.is_synced() {
            return;
        }

        let expected = self.last_closed.read().seq + 1;
        if slot != expected {
            warn!(slot, expected, "quorum heard for unexpected slot");
            return;
        }

        let timeout = Duration::from_secs(2u64.saturating_pow(ballot.counter));
        match self.timers.read().as_ref() {
            Some(timers) => {
                timers.schedule_bump(slot, ballot.clone(), timeout);
            }
            None => debug!(slot, "no timer task; bump timer not armed"),
        }
    }

    fn value_externalized(&self, slot: SlotIndex, value: &Value) {
        if let Some(timers) = self.timers.read().as_ref() {
            timers.cancel_bump();
        }

        let decoded = match LedgerValue::decode(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                // Every message is validated before the engine considers
                // it, so this should not happen.
                error!(slot, %e, "externalized value malformed");
                return;
            }
        };

        info!(slot, tx_set = %decoded.tx_set_hash.short_hex(), "value externalized");

        let externalized = match self.fetch_tx_set(&decoded.tx_set_hash, false) {
            Some(tx_set) => tx_set,
            None => {
                // Validation fetches every referenced set before voting,
                // so this should not happen either.
                error!(slot, tx_set = %decoded.tx_set_hash.short_hex(), "externalized tx set not held");
                return;
            }
        };

        // Stop fetches for the slot that just committed, then rotate so
        // requests the next slot's envelopes already started survive.
        self.current_tx_fetcher().stop_fetching_all();
        let next = (self.current_tx_fetcher.load(AtomicOrdering::Acquire) + 1) & 1;
        self.current_tx_fetcher.store(next, AtomicOrdering::Release);
        self.tx_set_fetchers[next].clear();

        self.ledger.externalize_value(externalized.clone());

        let mut received = self.received.lock();
        for tx in &externalized.transactions {
            received.remove(&tx.full_hash());
        }
        for tx in received.rebroadcast_cohort() {
            self.overlay.broadcast_message(tx.to_message());
        }
        received.shift();
    }

    fn retrieve_quorum_set(&self, node_id: &NodeId, qset_hash: &Hash256, cont: QuorumSetCallback) {
        debug!(node = %node_id.short_hex(), qset = %qset_hash.short_hex(), "retrieving quorum set");
        // Peers and node ids have no relationship yet, so the request
        // goes to the whole overlay.
        match self.fetch_quorum_set(qset_hash, true) {
            Some(qset) => cont(qset),
            None => self
                .pending_qset_retrievals
                .lock()
                .entry(*qset_hash)
                .or_default()
                .push(cont),
        }
    }

    fn emit_envelope(&self, envelope: &Envelope) {
        if !self.is_synced() {
            debug!(
                wait = self.ledgers_to_wait(),
                "suppressing envelope while syncing"
            );
            return;
        }
        self.overlay
            .broadcast_message(NodeMessage::FbaMessage(envelope.clone()));
    }
}

/// Routes timer expirations back into the Herder.
pub struct HerderTimerHook {
    herder: Weak<Herder>,
}

impl TimerCallback for HerderTimerHook {
    fn on_trigger(&self) {
        if let Some(herder) = self.herder.upgrade() {
            herder.trigger_next_ledger();
        }
    }

    fn on_ballot_expiry(&self, slot: SlotIndex, ballot: Ballot) {
        if let Some(herder) = self.herder.upgrade() {
            herder.expire_ballot(slot, ballot);
        }
    }
}

/// Delay before the next trigger so triggers stay `timespan` apart.
pub(crate) fn trigger_delay(elapsed: Duration, timespan: Duration) -> Duration {
    timespan.saturating_sub(elapsed)
}

/// Total seconds a well-behaved node needs to reach `counter`, each
/// round's timeout doubling up to the configured cap.
pub(crate) fn sum_ballot_timeouts(counter: u32, max_timeout_secs: u64) -> u64 {
    let mut sum: u64 = 0;
    let mut remaining = counter as u64;
    let mut step = 1u64;
    while remaining > 0 && step < max_timeout_secs {
        sum = sum.saturating_add(step);
        step <<= 1;
        remaining -= 1;
    }
    sum.saturating_add(remaining.saturating_mul(max_timeout_secs))
}
