//! Common test utilities and harness for Palisade integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use palisade_acl::{
    AceRow, AclConfig, AclRow, AclService, AclStore, BatchQuery, Error, MemoryStore,
    ObjectIdentity, Result, Sid,
};

/// Permission mask used by the fixtures for "everything".
pub const ALL: u32 = 7;

/// A store wrapper that counts reads and can be slowed down or failed.
pub struct CountingStore {
    inner: MemoryStore,
    reads: Mutex<HashMap<ObjectIdentity, usize>>,
    batch_calls: AtomicUsize,
    child_calls: AtomicUsize,
    delay: Option<Duration>,
    fail: AtomicBool,
}

impl CountingStore {
    /// Wraps a memory store with no delay.
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            reads: Mutex::new(HashMap::new()),
            batch_calls: AtomicUsize::new(0),
            child_calls: AtomicUsize::new(0),
            delay: None,
            fail: AtomicBool::new(false),
        }
    }

    /// Makes every batch read sleep for `delay` between reading and answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes subsequent batch reads fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// How many times `object` was included in a batch read.
    pub fn reads_of(&self, object: &ObjectIdentity) -> usize {
        self.reads.lock().unwrap().get(object).copied().unwrap_or(0)
    }

    /// Total number of batch read calls.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Total number of children queries.
    pub fn child_calls(&self) -> usize {
        self.child_calls.load(Ordering::SeqCst)
    }

    /// The wrapped store, for write-path mutations.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl AclStore for CountingStore {
    async fn read_batch(&self, query: &BatchQuery) -> Result<Vec<AclRow>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut reads = self.reads.lock().unwrap();
            for oid in &query.identities {
                *reads.entry(oid.clone()).or_default() += 1;
            }
        }

        // Rows are read before the delay, so a slow read answers with what
        // the store held when the call started.
        let rows = self.inner.read_batch(query).await;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::unavailable("connection refused"));
        }
        rows
    }

    async fn find_children(&self, parent: &ObjectIdentity) -> Result<Vec<ObjectIdentity>> {
        self.child_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_children(parent).await
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// The `admin` principal used throughout the fixtures.
pub fn admin() -> Sid {
    Sid::principal("admin")
}

pub fn doc(id: i64) -> ObjectIdentity {
    ObjectIdentity::new("Document", id)
}

pub fn folder(id: i64) -> ObjectIdentity {
    ObjectIdentity::new("Folder", id)
}

/// Doc(5) → Folder(2) → Folder(1, root).
///
/// Folder(1) grants `admin` mask 7; Doc(5) inherits and has no entries.
/// Doc(6) hangs directly off Folder(1) and denies `bob` mask 1.
pub fn hierarchy_rows() -> Vec<AclRow> {
    vec![
        AclRow::new(folder(1), admin()).with_entry(AceRow::grant(admin(), ALL)),
        AclRow::new(folder(2), admin()).with_parent(folder(1)),
        AclRow::new(doc(5), admin()).with_parent(folder(2)),
        AclRow::new(doc(6), admin())
            .with_parent(folder(1))
            .with_entry(AceRow::deny(Sid::principal("bob"), 1)),
    ]
}

/// Test harness bundling a counting store and a service in front of it.
pub struct TestHarness {
    /// Instrumented store
    pub store: Arc<CountingStore>,
    /// Service under test
    pub service: AclService,
}

impl TestHarness {
    /// Harness over the default hierarchy with default config.
    pub fn new() -> Self {
        Self::with_store(CountingStore::new(MemoryStore::from_rows(hierarchy_rows())))
    }

    /// Harness over a custom store with default config.
    pub fn with_store(store: CountingStore) -> Self {
        Self::with_store_and_config(store, AclConfig::default())
    }

    /// Harness over a custom store and config.
    pub fn with_store_and_config(store: CountingStore, config: AclConfig) -> Self {
        let store = Arc::new(store);
        let service = AclService::from_config(store.clone(), &config).unwrap();
        Self { store, service }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
