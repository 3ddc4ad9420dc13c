//! Content-addressed item fetching.
//!
//! When a peer's statement references an artifact by hash (a transaction
//! set or a quorum set) we may not hold it yet. The [`ItemFetcher`] is
//! the cache in front of that problem:
//!
//! 1. [`ItemFetcher::fetch_item`] returns a held artifact, or (when asked
//!    to) starts a network request and returns nothing. A second caller
//!    asking for the same hash joins the outstanding request instead of
//!    issuing another one.
//! 2. [`ItemFetcher::recv_item`] stores an arriving artifact, but only if
//!    somebody asked for it or it was installed locally; unsolicited data
//!    is dropped.
//! 3. [`ItemFetcher::doesnt_have`] records a peer's negative reply so
//!    that peer is not asked again for the same hash.
//!
//! Requests go out through a pluggable handler so the fetcher does not
//! depend on how the overlay frames its messages.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use drover_common::Hash256;

use crate::PeerId;

/// An artifact the fetcher can cache, identified by content hash.
pub trait FetchItem: Send + Sync {
    /// The hash peers use to request this item.
    fn fetch_hash(&self) -> Hash256;
}

/// Handler invoked to put a request for a hash on the wire.
type RequestFn = Box<dyn Fn(Hash256) + Send + Sync>;

/// Outstanding request state for a single hash.
struct Tracker {
    started: Instant,
    /// Peers that replied "don't have"; we will not re-ask them.
    refused: HashSet<PeerId>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            refused: HashSet::new(),
        }
    }
}

/// Counters for introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFetcherStats {
    /// Artifacts currently held.
    pub items_held: usize,
    /// Hashes with an outstanding request.
    pub items_fetching: usize,
}

/// Content-addressed cache with request deduplication.
pub struct ItemFetcher<T: FetchItem> {
    name: &'static str,
    items: Mutex<HashMap<Hash256, Arc<T>>>,
    trackers: Mutex<HashMap<Hash256, Tracker>>,
    request_handler: RwLock<Option<RequestFn>>,
}

impl<T: FetchItem> ItemFetcher<T> {
    /// Create a fetcher; `name` only appears in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: Mutex::new(HashMap::new()),
            trackers: Mutex::new(HashMap::new()),
            request_handler: RwLock::new(None),
        }
    }

    /// Install the handler that puts requests on the wire.
    pub fn set_request_handler<F>(&self, f: F)
    where
        F: Fn(Hash256) + Send + Sync + 'static,
    {
        *self.request_handler.write() = Some(Box::new(f));
    }

    /// Look up an artifact by hash.
    ///
    /// When the artifact is absent and `ask_network` is set, a request is
    /// started unless one is already outstanding for this hash.
    pub fn fetch_item(&self, hash: &Hash256, ask_network: bool) -> Option<Arc<T>> {
        if let Some(item) = self.items.lock().get(hash) {
            return Some(item.clone());
        }
        if !ask_network {
            return None;
        }

        let mut trackers = self.trackers.lock();
        if trackers.contains_key(hash) {
            // Join the outstanding request.
            trace!(fetcher = self.name, hash = %hash.short_hex(), "joining fetch");
            return None;
        }
        trackers.insert(*hash, Tracker::new());
        drop(trackers);

        trace!(fetcher = self.name, hash = %hash.short_hex(), "starting fetch");
        if let Some(request) = self.request_handler.read().as_ref() {
            request(*hash);
        }
        None
    }

    /// Store an arriving artifact.
    ///
    /// Returns true when the artifact was wanted (an outstanding request
    /// existed); unsolicited artifacts are dropped and false is returned.
    pub fn recv_item(&self, item: T) -> bool {
        let hash = item.fetch_hash();
        let tracker = self.trackers.lock().remove(&hash);
        match tracker {
            Some(tracker) => {
                debug!(
                    fetcher = self.name,
                    hash = %hash.short_hex(),
                    elapsed_ms = tracker.started.elapsed().as_millis() as u64,
                    "fetched item"
                );
                self.items.lock().insert(hash, Arc::new(item));
                true
            }
            None => {
                trace!(fetcher = self.name, hash = %hash.short_hex(), "unrequested item dropped");
                false
            }
        }
    }

    /// Install a locally-produced artifact directly into the cache.
    ///
    /// Used for artifacts we built ourselves (our proposed transaction
    /// set, our own quorum set) so peers asking for them by hash get
    /// served without a network round trip.
    pub fn insert(&self, item: T) -> Arc<T> {
        let hash = item.fetch_hash();
        self.trackers.lock().remove(&hash);
        let item = Arc::new(item);
        self.items.lock().insert(hash, item.clone());
        item
    }

    /// Record that `peer` does not have `hash`.
    pub fn doesnt_have(&self, hash: &Hash256, peer: PeerId) {
        if let Some(tracker) = self.trackers.lock().get_mut(hash) {
            if tracker.refused.insert(peer) {
                trace!(fetcher = self.name, hash = %hash.short_hex(), %peer, "peer doesn't have");
            }
        }
    }

    /// Whether `peer` already replied "don't have" for `hash`.
    pub fn has_refused(&self, hash: &Hash256, peer: &PeerId) -> bool {
        self.trackers
            .lock()
            .get(hash)
            .map(|t| t.refused.contains(peer))
            .unwrap_or(false)
    }

    /// Whether a request is outstanding for `hash`.
    pub fn is_fetching(&self, hash: &Hash256) -> bool {
        self.trackers.lock().contains_key(hash)
    }

    /// Cancel all outstanding requests, keeping held artifacts.
    pub fn stop_fetching_all(&self) {
        let dropped = {
            let mut trackers = self.trackers.lock();
            let n = trackers.len();
            trackers.clear();
            n
        };
        if dropped > 0 {
            debug!(fetcher = self.name, dropped, "stopped all fetches");
        }
    }

    /// Flush held artifacts and outstanding requests.
    pub fn clear(&self) {
        self.items.lock().clear();
        self.trackers.lock().clear();
    }

    /// Current counters.
    pub fn stats(&self) -> ItemFetcherStats {
        ItemFetcherStats {
            items_held: self.items.lock().len(),
            items_fetching: self.trackers.lock().len(),
        }
    }
}
