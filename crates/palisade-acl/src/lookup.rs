//! Batched, hierarchy-aware Acl lookup.
//!
//! [`BasicLookupStrategy`] turns a batch of object identities into resolved
//! Acls:
//!
//! 1. Cache hits are taken as they are.
//! 2. Misses are claimed in the cache. Misses another caller is already
//!    loading are awaited instead of read again.
//! 3. Claimed misses are read from the store in batches, one round per
//!    hierarchy level. Parents found in the cache end the walk early;
//!    parents are claimed like requested identities, and parents another
//!    caller is loading are awaited.
//! 4. Acls are assembled root-first, published to the cache (ancestors
//!    included), and the claims are completed.
//!
//! Identities without a stored row are simply absent from the result.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use palisade_core::{Acl, AclConfig, Error, LookupConfig, ObjectIdentity, Result, Sid};
use palisade_storage::{AclRow, AclStore, BatchQuery};

use crate::assembly::assemble;
use crate::cache::{AclCache, Claim, FillGuard, FillWaiter, LoadId, covers};

/// Resolves object identities to Acls.
#[async_trait]
pub trait LookupStrategy: Send + Sync {
    /// Resolves a batch of identities.
    ///
    /// `sids` is a loading hint: entries for other sids may be left out of
    /// the returned Acls, which then report them as not loaded.
    ///
    /// The returned map holds exactly the requested identities that have a
    /// stored ACL; absence is not an error at this level.
    async fn read_acls_by_id(
        &self,
        objects: &[ObjectIdentity],
        sids: Option<&[Sid]>,
    ) -> Result<HashMap<ObjectIdentity, Arc<Acl>>>;

    /// Evicts any cached state for `object` after its stored rows changed.
    fn invalidate(&self, object: &ObjectIdentity);
}

/// Default [`LookupStrategy`] backed by an [`AclStore`] and an [`AclCache`].
pub struct BasicLookupStrategy {
    store: Arc<dyn AclStore>,
    cache: Arc<AclCache>,
    config: LookupConfig,
}

/// Claims held by one load: the load's id and every guard it must complete.
struct Claims<'a> {
    load: LoadId,
    guards: Vec<FillGuard<'a>>,
}

impl BasicLookupStrategy {
    /// Creates a strategy with its own cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation.
    pub fn new(store: Arc<dyn AclStore>, config: &AclConfig) -> Result<Self> {
        config.validate()?;
        Self::with_cache(
            store,
            Arc::new(AclCache::new(config.cache.clone())),
            config.lookup.clone(),
        )
    }

    /// Creates a strategy around an existing cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation.
    pub fn with_cache(
        store: Arc<dyn AclStore>,
        cache: Arc<AclCache>,
        config: LookupConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            cache,
            config,
        })
    }

    /// The cache in front of the store.
    pub fn cache(&self) -> &Arc<AclCache> {
        &self.cache
    }

    /// Reads, assembles, and publishes Acls for `targets`.
    ///
    /// With `claims`, missing ancestors are claimed (their guards are added
    /// to `claims`) or awaited when another load holds them. Without, they
    /// are read directly.
    ///
    /// Returns every resolved Acl, targets and ancestors alike; targets
    /// without a row are absent.
    async fn load<'a>(
        &'a self,
        targets: &[ObjectIdentity],
        sids: Option<&[Sid]>,
        generation: u64,
        mut claims: Option<&mut Claims<'a>>,
    ) -> Result<HashMap<ObjectIdentity, Arc<Acl>>> {
        let mut rows: HashMap<ObjectIdentity, AclRow> = HashMap::new();
        let mut seeds: HashMap<ObjectIdentity, Arc<Acl>> = HashMap::new();
        let mut requested: HashSet<ObjectIdentity> = targets.iter().cloned().collect();
        let mut pending: Vec<ObjectIdentity> = targets.to_vec();
        let mut level = 0usize;

        while !pending.is_empty() {
            if level > self.config.max_depth {
                log::warn!(
                    "Ancestor resolution still pending after {} levels",
                    self.config.max_depth
                );
                return Err(Error::DepthExceeded {
                    object: pending[0].clone(),
                    max_depth: self.config.max_depth,
                });
            }

            let fetched = self.read_level(&pending, sids).await?;
            log::debug!(
                "Level {level}: requested {} identities, store returned {} rows",
                pending.len(),
                fetched.len()
            );

            let mut next = Vec::new();
            let mut followed = Vec::new();
            for row in fetched {
                if let Some(parent) = &row.parent
                    && requested.insert(parent.clone())
                {
                    if let Some(acl) = self.cache.get(parent, sids) {
                        seeds.insert(parent.clone(), acl);
                    } else if let Some(claims) = claims.as_deref_mut() {
                        match self.cache.claim(parent, claims.load) {
                            Claim::Leader(guard) => {
                                claims.guards.push(guard);
                                next.push(parent.clone());
                            }
                            Claim::Follower(waiter) => followed.push(waiter),
                        }
                    } else {
                        next.push(parent.clone());
                    }
                }
                rows.insert(row.object_identity.clone(), row);
            }

            if let Some(load) = claims.as_deref().map(|claims| claims.load) {
                for waiter in followed {
                    let parent = waiter.object().clone();
                    match self.follow_ancestor(load, waiter, sids).await? {
                        Some(acl) => {
                            seeds.insert(parent, acl);
                        }
                        None => next.push(parent),
                    }
                }
            }

            pending = next;
            level += 1;
        }

        let assembly = assemble(&rows, seeds, targets, sids, self.config.max_depth)?;

        for acl in &assembly.built {
            self.cache.insert(Arc::clone(acl), generation);
        }

        Ok(assembly.resolved)
    }

    /// Waits on an ancestor another load is resolving.
    ///
    /// Returns `None` when this load should read the ancestor itself: the
    /// wait would deadlock, the other load was abandoned, or it loaded for
    /// a narrower sid set.
    async fn follow_ancestor(
        &self,
        load: LoadId,
        waiter: FillWaiter,
        sids: Option<&[Sid]>,
    ) -> Result<Option<Arc<Acl>>> {
        let object = waiter.object().clone();
        let Some(_edge) = self.cache.begin_wait(load, waiter.leader()) else {
            log::debug!("Reading {object} directly; waiting on its load would deadlock");
            return Ok(None);
        };

        log::debug!("Waiting on in-flight load of ancestor {object}");
        match waiter.wait().await {
            Ok(Some(acl)) if covers(&acl, sids) => Ok(Some(acl)),
            Ok(Some(_)) | Err(Error::LoadAbandoned { .. }) => Ok(None),
            Ok(None) => {
                log::warn!("Ancestor {object} has no ACL row");
                Err(Error::not_found(&object))
            }
            Err(err) => Err(err),
        }
    }

    /// Reads one hierarchy level, split into `batch_size` chunks.
    async fn read_level(
        &self,
        identities: &[ObjectIdentity],
        sids: Option<&[Sid]>,
    ) -> Result<Vec<AclRow>> {
        let wanted: HashSet<&ObjectIdentity> = identities.iter().collect();
        let reads = identities.chunks(self.config.batch_size).map(|chunk| {
            let query = BatchQuery::new(chunk.to_vec(), sids.map(<[Sid]>::to_vec));
            async move {
                with_timeout(self.config.store_timeout(), self.store.read_batch(&query)).await
            }
        });

        Ok(try_join_all(reads)
            .await?
            .into_iter()
            .flatten()
            .filter(|row| wanted.contains(&row.object_identity))
            .collect())
    }

    /// Loads for claimed leaders and completes their claims, including the
    /// claims taken on ancestors along the way.
    async fn lead<'a>(
        &'a self,
        load: LoadId,
        leaders: Vec<FillGuard<'a>>,
        sids: Option<&[Sid]>,
        generation: u64,
    ) -> Result<HashMap<ObjectIdentity, Arc<Acl>>> {
        let targets: Vec<ObjectIdentity> = leaders.iter().map(|g| g.object().clone()).collect();
        let mut claims = Claims {
            load,
            guards: leaders,
        };

        match self.load(&targets, sids, generation, Some(&mut claims)).await {
            Ok(resolved) => {
                for guard in claims.guards {
                    let acl = resolved.get(guard.object()).cloned();
                    guard.complete(Ok(acl));
                }
                Ok(requested_only(&targets, &resolved))
            }
            Err(err) => {
                for guard in claims.guards {
                    guard.complete(Err(err.clone()));
                }
                Err(err)
            }
        }
    }
}

fn requested_only(
    targets: &[ObjectIdentity],
    resolved: &HashMap<ObjectIdentity, Arc<Acl>>,
) -> HashMap<ObjectIdentity, Arc<Acl>> {
    targets
        .iter()
        .filter_map(|oid| resolved.get(oid).map(|acl| (oid.clone(), Arc::clone(acl))))
        .collect()
}

/// Runs a store call under `timeout`.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| Error::Timeout {
            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })?
}

#[async_trait]
impl LookupStrategy for BasicLookupStrategy {
    async fn read_acls_by_id(
        &self,
        objects: &[ObjectIdentity],
        sids: Option<&[Sid]>,
    ) -> Result<HashMap<ObjectIdentity, Arc<Acl>>> {
        if objects.is_empty() {
            return Err(Error::validation("at least one object identity is required"));
        }

        let generation = self.cache.generation();
        let load = self.cache.begin_load();
        let mut result = HashMap::with_capacity(objects.len());
        let mut seen = HashSet::with_capacity(objects.len());
        let mut leaders = Vec::new();
        let mut followers = Vec::new();

        for oid in objects {
            if !seen.insert(oid) {
                continue;
            }
            if let Some(acl) = self.cache.get(oid, sids) {
                log::debug!("Cache hit for {oid}");
                result.insert(oid.clone(), acl);
                continue;
            }
            match self.cache.claim(oid, load) {
                Claim::Leader(guard) => leaders.push(guard),
                Claim::Follower(waiter) => {
                    log::debug!("Waiting on in-flight load of {}", waiter.object());
                    followers.push(waiter);
                }
            }
        }

        if !leaders.is_empty() {
            log::debug!("Cache miss for {} identities", leaders.len());
            result.extend(self.lead(load, leaders, sids, generation).await?);
        }

        // Every claim of this load is complete, so waiting here cannot
        // block another load's progress.
        let mut uncovered = Vec::new();
        let outcomes = join_all(followers.into_iter().map(|waiter| {
            let oid = waiter.object().clone();
            async move { (oid, waiter.wait().await) }
        }))
        .await;
        for (oid, outcome) in outcomes {
            match outcome? {
                // Another caller may have loaded for a narrower sid set.
                Some(acl) if covers(&acl, sids) => {
                    result.insert(oid, acl);
                }
                Some(_) => uncovered.push(oid),
                None => {}
            }
        }

        if !uncovered.is_empty() {
            log::debug!("Reloading {} identities for wider sid set", uncovered.len());
            let generation = self.cache.generation();
            let resolved = self.load(&uncovered, sids, generation, None).await?;
            result.extend(requested_only(&uncovered, &resolved));
        }

        Ok(result)
    }

    fn invalidate(&self, object: &ObjectIdentity) {
        self.cache.invalidate(object);
    }
}

impl std::fmt::Debug for BasicLookupStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicLookupStrategy")
            .field("store", &self.store.name())
            .field("cache", &self.cache.len())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
