//! Resolved-Acl cache with per-key fill deduplication.
//!
//! [`AclCache`] maps object identities to resolved Acls. Reads go through a
//! sharded [`DashMap`] and never wait on a store call.
//!
//! # Entry states
//!
//! ```text
//! absent ──claim──▶ resolving ──complete──▶ cached ──invalidate──▶ absent
//! ```
//!
//! A miss is *claimed* before it is loaded. The first claimant becomes the
//! leader and performs the store read; later claimants for the same key
//! become followers and wait on a [`watch`] channel for the leader's outcome.
//! The shard lock is held only across the check-and-insert of the claim.
//!
//! # Freshness
//!
//! Every invalidation bumps a generation counter and is remembered in a
//! short log. A fill records the generation before it reads the store. When
//! it publishes, any logged invalidation since then that names the Acl or
//! one of its ancestors discards the publish, so a slow reader cannot
//! re-publish rows that a writer has since changed. Invalidations of
//! unrelated identities do not.
//!
//! An in-flight slot claimed before the latest invalidation is detached:
//! the next claimant leads a fresh load instead of following the old one.
//!
//! # Waiting on ancestors
//!
//! A load that needs an ancestor another load is resolving waits for it
//! while still holding its own claims. Such waits are recorded in a
//! wait-for graph; a wait that would close a cycle (only possible with
//! cyclic parent data) is refused and the ancestor is read directly.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use palisade_core::{Acl, CacheConfig, Error, ObjectIdentity, Result, Sid};
use tokio::sync::watch;
use tokio::time::Instant;

/// Invalidations remembered for freshness checks. A fill older than the
/// oldest remembered invalidation is never published.
const RECENT_INVALIDATIONS: usize = 256;

/// Outcome a leader hands to its followers.
pub(crate) type FillOutcome = Result<Option<Arc<Acl>>>;

/// Identifies one lookup call in the wait-for graph.
pub(crate) type LoadId = u64;

type FillSender = Arc<watch::Sender<Option<FillOutcome>>>;

#[derive(Debug)]
struct CacheEntry {
    acl: Arc<Acl>,
    inserted_at: Instant,
}

#[derive(Debug)]
struct InFlight {
    tx: FillSender,
    generation: u64,
    leader: LoadId,
}

/// One logged invalidation; `object = None` means everything.
#[derive(Debug)]
struct Invalidation {
    generation: u64,
    object: Option<ObjectIdentity>,
}

/// Concurrent cache of resolved Acls.
#[derive(Debug)]
pub struct AclCache {
    entries: DashMap<ObjectIdentity, CacheEntry>,
    in_flight: DashMap<ObjectIdentity, InFlight>,
    generation: AtomicU64,
    recent: Mutex<VecDeque<Invalidation>>,
    waits: Mutex<HashMap<LoadId, LoadId>>,
    next_load: AtomicU64,
    config: CacheConfig,
}

impl Default for AclCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl AclCache {
    /// Creates an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            generation: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_INVALIDATIONS)),
            waits: Mutex::new(HashMap::new()),
            next_load: AtomicU64::new(0),
            config,
        }
    }

    /// The settings this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns a cached Acl that is fresh and was loaded for at least `sids`.
    ///
    /// `sids = None` asks for a fully loaded Acl. Expired entries are evicted
    /// on the way out.
    pub fn get(&self, object: &ObjectIdentity, sids: Option<&[Sid]>) -> Option<Arc<Acl>> {
        if !self.config.enabled {
            return None;
        }

        let (acl, expired) = {
            let entry = self.entries.get(object)?;
            let expired = self
                .config
                .ttl()
                .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl);
            (Arc::clone(&entry.acl), expired)
        };

        if expired {
            log::debug!("Cache entry for {object} expired");
            self.entries
                .remove_if(object, |_, entry| Arc::ptr_eq(&entry.acl, &acl));
            return None;
        }

        covers(&acl, sids).then_some(acl)
    }

    /// Current freshness generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of cached Acls, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` while a load for `object` is in progress.
    pub fn is_resolving(&self, object: &ObjectIdentity) -> bool {
        self.in_flight.contains_key(object)
    }

    /// Evicts `object`, and its cached descendants when cascading is enabled.
    ///
    /// Returns the number of evicted entries. Loads already in progress will
    /// not publish their results, and callers arriving afterwards do not
    /// wait on them.
    pub fn invalidate(&self, object: &ObjectIdentity) -> usize {
        self.record(Some(object.clone()));

        let evicted = if self.config.cascade_invalidation {
            let before = self.entries.len();
            self.entries.retain(|_, entry| !touches(&entry.acl, object));
            before.saturating_sub(self.entries.len())
        } else {
            usize::from(self.entries.remove(object).is_some())
        };

        log::info!("Invalidated {object} ({evicted} cached entries evicted)");
        evicted
    }

    /// Evicts everything.
    pub fn clear(&self) {
        self.record(None);
        self.entries.clear();
        log::info!("ACL cache cleared");
    }

    /// Bumps the generation and logs the invalidation under one lock, so
    /// the log stays ordered by generation.
    fn record(&self, object: Option<ObjectIdentity>) -> u64 {
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        recent.push_back(Invalidation { generation, object });
        while recent.len() > RECENT_INVALIDATIONS {
            recent.pop_front();
        }
        generation
    }

    /// Whether no invalidation since `generation` affects `acl`.
    fn is_fresh(&self, acl: &Acl, generation: u64) -> bool {
        if self.generation() == generation {
            return true;
        }

        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        // History older than the log is unknown.
        if recent
            .front()
            .is_none_or(|oldest| oldest.generation > generation + 1)
        {
            return false;
        }
        recent
            .iter()
            .filter(|inv| inv.generation > generation)
            .all(|inv| inv.object.as_ref().is_some_and(|object| !touches(acl, object)))
    }

    /// Publishes a freshly built Acl unless an invalidation since
    /// `generation` affects it or one of its ancestors.
    pub(crate) fn insert(&self, acl: Arc<Acl>, generation: u64) -> bool {
        if !self.config.enabled {
            return false;
        }
        if !self.is_fresh(&acl, generation) {
            log::debug!("Discarding stale fill of {}", acl.object_identity());
            return false;
        }

        let key = acl.object_identity().clone();
        self.entries.insert(
            key.clone(),
            CacheEntry {
                acl: Arc::clone(&acl),
                inserted_at: Instant::now(),
            },
        );

        // An invalidation may have slipped in between the check and the insert.
        if !self.is_fresh(&acl, generation) {
            log::debug!("Discarding stale fill of {key}");
            self.entries
                .remove_if(&key, |_, entry| Arc::ptr_eq(&entry.acl, &acl));
            return false;
        }
        true
    }

    /// Allocates an id for one lookup call.
    pub(crate) fn begin_load(&self) -> LoadId {
        self.next_load.fetch_add(1, Ordering::Relaxed)
    }

    /// Claims the load of `object` on behalf of `load`.
    ///
    /// A slot claimed before the latest invalidation is replaced, so the
    /// caller leads a fresh load; followers already waiting on the old slot
    /// still get its outcome.
    pub(crate) fn claim(&self, object: &ObjectIdentity, load: LoadId) -> Claim<'_> {
        let generation = self.generation();
        match self.in_flight.entry(object.clone()) {
            Entry::Occupied(slot) if slot.get().generation >= generation => {
                Claim::Follower(FillWaiter {
                    object: object.clone(),
                    leader: slot.get().leader,
                    rx: slot.get().tx.subscribe(),
                })
            }
            Entry::Occupied(mut slot) => {
                log::debug!("Detaching in-flight load of {object} from before an invalidation");
                let tx = new_sender();
                slot.insert(InFlight {
                    tx: Arc::clone(&tx),
                    generation,
                    leader: load,
                });
                Claim::Leader(self.guard(object, tx))
            }
            Entry::Vacant(slot) => {
                let tx = new_sender();
                slot.insert(InFlight {
                    tx: Arc::clone(&tx),
                    generation,
                    leader: load,
                });
                Claim::Leader(self.guard(object, tx))
            }
        }
    }

    fn guard(&self, object: &ObjectIdentity, tx: FillSender) -> FillGuard<'_> {
        FillGuard {
            cache: self,
            object: object.clone(),
            tx,
            completed: false,
        }
    }

    /// Records that `load` is about to wait on `leader`.
    ///
    /// Returns `None` if `leader` already waits, directly or transitively,
    /// on `load`; waiting would then never finish.
    pub(crate) fn begin_wait(&self, load: LoadId, leader: LoadId) -> Option<WaitEdge<'_>> {
        let mut waits = self.waits.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cursor = leader;
        loop {
            if cursor == load {
                return None;
            }
            match waits.get(&cursor) {
                Some(&next) => cursor = next,
                None => break,
            }
        }
        waits.insert(load, leader);
        Some(WaitEdge { cache: self, load })
    }
}

fn new_sender() -> FillSender {
    let (tx, _rx) = watch::channel(None);
    Arc::new(tx)
}

/// Whether `acl` is `object` or descends from it.
fn touches(acl: &Acl, object: &ObjectIdentity) -> bool {
    acl.object_identity() == object
        || acl
            .ancestors()
            .any(|ancestor| ancestor.object_identity() == object)
}

/// Whether `acl` holds every entry a request for `sids` needs.
pub(crate) fn covers(acl: &Acl, sids: Option<&[Sid]>) -> bool {
    match sids {
        None => acl.loaded_sids().is_none(),
        Some(sids) => acl.is_sid_loaded(sids),
    }
}

/// Result of claiming a miss.
pub(crate) enum Claim<'a> {
    /// This caller must load the identity and complete the guard.
    Leader(FillGuard<'a>),
    /// Another caller is loading it; wait for the outcome.
    Follower(FillWaiter),
}

/// Held by the caller responsible for loading one identity.
///
/// Dropping the guard without completing it wakes followers with
/// [`Error::LoadAbandoned`].
pub(crate) struct FillGuard<'a> {
    cache: &'a AclCache,
    object: ObjectIdentity,
    tx: FillSender,
    completed: bool,
}

impl FillGuard<'_> {
    pub(crate) fn object(&self) -> &ObjectIdentity {
        &self.object
    }

    /// Hands the outcome to every follower and releases the claim.
    pub(crate) fn complete(mut self, outcome: FillOutcome) {
        self.tx.send_replace(Some(outcome));
        self.completed = true;
    }
}

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            log::warn!("Load of {} abandoned before completion", self.object);
        }
        self.cache
            .in_flight
            .remove_if(&self.object, |_, slot| Arc::ptr_eq(&slot.tx, &self.tx));
    }
}

/// Held by a caller waiting on another caller's load.
pub(crate) struct FillWaiter {
    object: ObjectIdentity,
    leader: LoadId,
    rx: watch::Receiver<Option<FillOutcome>>,
}

impl FillWaiter {
    pub(crate) fn object(&self) -> &ObjectIdentity {
        &self.object
    }

    /// The load this waiter follows.
    pub(crate) fn leader(&self) -> LoadId {
        self.leader
    }

    /// Waits for the leader's outcome.
    pub(crate) async fn wait(mut self) -> FillOutcome {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().clone() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                return match self.rx.borrow().clone() {
                    Some(outcome) => outcome,
                    None => Err(Error::LoadAbandoned {
                        object: self.object,
                    }),
                };
            }
        }
    }
}

/// A registered wait in the wait-for graph; removed on drop.
pub(crate) struct WaitEdge<'a> {
    cache: &'a AclCache,
    load: LoadId,
}

impl Drop for WaitEdge<'_> {
    fn drop(&mut self) {
        self.cache
            .waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.load);
    }
}

// ============================================================================
// Tests
// ============================================================================
