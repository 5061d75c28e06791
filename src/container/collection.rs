//! `PCollection`: a GID-addressed distributed container.
//!
//! Elements stay on the location that added them. Resolution order for a
//! GID: local parts, the remote cache, the replica built by `update()`, the
//! GID's home location, and finally a search of every other location.

use super::Element;
use super::handlers::register_collection_handlers;
use super::iter::LocalView;
use super::part::{KeyedPart, Part};
use super::protocol::*;
use crate::distribution::{Gid, GidAllocator, GidDirectory, Location, LocationId, LookupCache, PartId, home_of};
use crate::error::{ContainerError, Result};
use crate::runtime::{LocationContext, ObjectId};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct CollectionState<T> {
    pub(crate) parts: Vec<KeyedPart<T>>,
    pub(crate) directory: GidDirectory,
    cache: LookupCache,
    allocator: GidAllocator,
    /// Local adds or deletes since the last `update()`.
    dirty: bool,
}

impl<T> CollectionState<T> {
    fn part_of(&self, gid: Gid) -> Option<&KeyedPart<T>> {
        let id = self.directory.local_part(gid)?;
        self.parts.iter().find(|p| p.id() == id)
    }

    fn part_of_mut(&mut self, gid: Gid) -> Option<&mut KeyedPart<T>> {
        let id = self.directory.local_part(gid)?;
        self.parts.iter_mut().find(|p| p.id() == id)
    }
}

pub(crate) struct CollectionInner<T> {
    pub(crate) ctx: Arc<LocationContext>,
    pub(crate) object: ObjectId,
    pub(crate) state: RwLock<CollectionState<T>>,
    /// Where the GIDs homed on this location live.
    home: DashMap<Gid, Location>,
    remote_lookups: AtomicUsize,
}

impl<T: Element> CollectionInner<T> {
    pub(crate) fn local_location(&self, gid: Gid) -> Option<Location> {
        let state = self.state.read();
        state
            .directory
            .local_part(gid)
            .map(|part| Location::new(self.ctx.id(), part))
    }

    pub(crate) fn get_local(&self, gid: Gid) -> Option<T> {
        self.state.read().part_of(gid)?.get(gid).cloned()
    }

    pub(crate) fn set_local(&self, gid: Gid, value: T) -> bool {
        let mut state = self.state.write();
        match state.part_of_mut(gid).and_then(|p| p.get_mut(gid)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn with_local<R>(&self, gid: Gid, f: impl FnOnce(&T) -> R) -> Option<R> {
        let state = self.state.read();
        state.part_of(gid)?.get(gid).map(f)
    }

    pub(crate) fn with_local_mut<R>(&self, gid: Gid, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut state = self.state.write();
        state.part_of_mut(gid)?.get_mut(gid).map(f)
    }

    pub(crate) fn for_each_local(&self, mut f: impl FnMut(Gid, &T)) {
        let state = self.state.read();
        for part in &state.parts {
            for (gid, value) in part.iter() {
                f(gid, value);
            }
        }
    }

    pub(crate) fn for_each_local_mut(&self, mut f: impl FnMut(Gid, &mut T)) {
        let mut state = self.state.write();
        for part in state.parts.iter_mut() {
            for (gid, value) in part.iter_mut() {
                f(gid, value);
            }
        }
    }

    /// Stores `value` in the last local part.
    fn insert_local(&self, gid: Gid, value: T) -> Result<Location> {
        let me = self.ctx.id();
        let mut state = self.state.write();
        let part = state
            .parts
            .last_mut()
            .ok_or(ContainerError::InvalidLocation(Location::INVALID))?;
        let part_id = part.id();
        if !part.insert(gid, value) {
            return Err(ContainerError::DuplicateGid(gid));
        }
        state.directory.record_local(gid, part_id);
        state.dirty = true;
        Ok(Location::new(me, part_id))
    }

    pub(crate) fn delete_local(&self, gid: Gid) -> Option<T> {
        let removed = {
            let mut state = self.state.write();
            let value = state.part_of_mut(gid)?.remove(gid)?;
            state.directory.forget_local(gid);
            state.dirty = true;
            value
        };

        let home = home_of(gid, self.ctx.count());
        if home == self.ctx.id() {
            self.home.remove(&gid);
        } else if let Err(e) =
            self.ctx
                .send_async(home, self.object, COLLECTION_HOME_FORGET, &GidRequest { gid })
        {
            tracing::warn!("Could not release GID {} at home {}: {}", gid, home, e);
        }
        Some(removed)
    }

    pub(crate) fn locate_cached(&self, gid: Gid) -> Location {
        if let Some(location) = self.local_location(gid) {
            return location;
        }
        let state = self.state.read();
        state
            .cache
            .get(gid)
            .or_else(|| state.directory.replica_lookup(gid))
            .filter(|location| location.pid != self.ctx.id())
            .unwrap_or(Location::INVALID)
    }

    /// Reserves `gid` for `location`. False if someone already holds it.
    pub(crate) fn claim_home(&self, gid: Gid, location: Location) -> bool {
        match self.home.entry(gid) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(location);
                true
            }
        }
    }

    pub(crate) fn forget_home(&self, gid: Gid) {
        self.home.remove(&gid);
    }

    pub(crate) fn home_lookup(&self, gid: Gid) -> Option<Location> {
        self.home.get(&gid).map(|entry| *entry.value())
    }

    fn last_part_id(&self) -> Result<PartId> {
        self.state
            .read()
            .parts
            .last()
            .map(Part::id)
            .ok_or(ContainerError::InvalidLocation(Location::INVALID))
    }

    fn remember(&self, gid: Gid, location: Location) {
        self.state.write().cache.insert(gid, location);
    }

    /// Drops what this location believes about a remote `gid`.
    pub(crate) fn forget(&self, gid: Gid) {
        let mut state = self.state.write();
        state.cache.invalidate(gid);
        state.directory.forget_replica(gid);
    }
}

/// A location's handle on a distributed, GID-addressed collection.
pub struct PCollection<T: Element> {
    inner: Arc<CollectionInner<T>>,
}

impl<T: Element> PCollection<T> {
    /// Collective: an empty collection with one part per location.
    pub async fn new(ctx: Arc<LocationContext>) -> Result<Self> {
        let object = ctx.register_object();
        let inner = Arc::new(CollectionInner {
            state: RwLock::new(CollectionState {
                parts: vec![KeyedPart::new(0)],
                directory: GidDirectory::new(),
                cache: LookupCache::new(ctx.config().lookup_cache_capacity),
                allocator: GidAllocator::new(ctx.id(), ctx.count()),
                dirty: false,
            }),
            home: DashMap::new(),
            remote_lookups: AtomicUsize::new(0),
            ctx,
            object,
        });
        register_collection_handlers(&inner);
        inner.ctx.barrier().await;
        Ok(Self { inner })
    }

    /// Runtime handle of the location this view belongs to.
    pub fn ctx(&self) -> &Arc<LocationContext> {
        &self.inner.ctx
    }

    /// Identifier shared by every location's view of this collection.
    pub fn object_id(&self) -> ObjectId {
        self.inner.object
    }

    pub(crate) fn inner(&self) -> &Arc<CollectionInner<T>> {
        &self.inner
    }

    /// Adds `value` locally under a freshly allocated GID.
    ///
    /// # Returns
    /// The new GID. It is unique cluster-wide and homed on this location.
    pub async fn add(&self, value: T) -> Result<Gid> {
        self.add_with(|_| value).await
    }

    /// Like `add`, for values that embed their own GID.
    pub(crate) async fn add_with(&self, build: impl FnOnce(Gid) -> T) -> Result<Gid> {
        let location = Location::new(self.inner.ctx.id(), self.inner.last_part_id()?);
        // Allocated GIDs are homed here; skip any a remote caller claimed explicitly.
        let gid = loop {
            let gid = self.inner.state.write().allocator.next_gid();
            if self.inner.claim_home(gid, location) {
                break gid;
            }
        };
        self.inner.insert_local(gid, build(gid))?;
        tracing::debug!("ADD: GID {} stored at {}", gid, location);
        Ok(gid)
    }

    /// Adds `value` locally under a caller-chosen GID, reserving it at its home first.
    pub async fn add_with_gid(&self, gid: Gid, value: T) -> Result<Gid> {
        let ctx = &self.inner.ctx;
        if self.inner.local_location(gid).is_some() {
            return Err(ContainerError::DuplicateGid(gid));
        }

        let location = Location::new(ctx.id(), self.inner.last_part_id()?);
        let home = home_of(gid, ctx.count());
        let claimed = if home == ctx.id() {
            self.inner.claim_home(gid, location)
        } else {
            ctx.send_sync::<_, bool>(
                home,
                self.inner.object,
                COLLECTION_HOME_CLAIM,
                &HomeRecord { gid, location },
            )
            .await?
        };
        if !claimed {
            tracing::warn!("ADD: GID {} already claimed at home {}", gid, home);
            return Err(ContainerError::DuplicateGid(gid));
        }

        self.inner.insert_local(gid, value)?;
        Ok(gid)
    }

    /// Opens a new, empty local part; later adds on this location go there.
    pub fn add_part(&self) -> PartId {
        let mut state = self.inner.state.write();
        let id = state.parts.iter().map(|p| p.id() + 1).max().unwrap_or(0);
        state.parts.push(KeyedPart::new(id));
        id
    }

    /// Whether this location holds `gid`. No communication.
    pub fn is_local(&self, gid: Gid) -> bool {
        self.inner.local_location(gid).is_some()
    }

    /// Resolution without communication: local parts, cache, replica.
    pub fn locate_cached(&self, gid: Gid) -> Location {
        self.inner.locate_cached(gid)
    }

    /// Full resolution; returns `Location::INVALID` if no location holds `gid`.
    pub async fn locate(&self, gid: Gid) -> Result<Location> {
        let cached = self.locate_cached(gid);
        if cached.is_valid() {
            return Ok(cached);
        }
        self.locate_remote(gid).await
    }

    /// Asks the GID's home, then searches every other location.
    async fn locate_remote(&self, gid: Gid) -> Result<Location> {
        let ctx = &self.inner.ctx;
        let me = ctx.id();

        let home = home_of(gid, ctx.count());
        let recorded = if home == me {
            self.inner.home_lookup(gid)
        } else {
            ctx.send_sync::<_, Option<Location>>(
                home,
                self.inner.object,
                COLLECTION_HOME_LOOKUP,
                &GidRequest { gid },
            )
            .await?
        };
        if let Some(location) = recorded
            && location.pid != me
        {
            tracing::debug!("LOOKUP: GID {} resolved by home {} to {}", gid, home, location);
            self.inner.remember(gid, location);
            return Ok(location);
        }

        self.inner.remote_lookups.fetch_add(1, Ordering::Relaxed);
        for dest in (0..ctx.count()).filter(|&d| d != me) {
            let found: Option<Location> = ctx
                .send_sync(dest, self.inner.object, COLLECTION_FIND, &GidRequest { gid })
                .await?;
            if let Some(location) = found {
                tracing::debug!("LOOKUP: GID {} found by search on {}", gid, location);
                self.inner.remember(gid, location);
                return Ok(location);
            }
        }

        tracing::debug!("LOOKUP: GID {} not found on any location", gid);
        Ok(Location::INVALID)
    }

    /// Runs `op` on the location that holds `gid`.
    ///
    /// `op` yields `None` when the location it was handed no longer holds
    /// the GID. A location taken from the cache or the replica can be out of
    /// date after a delete and re-add elsewhere, so the first `None` from a
    /// remote location drops that entry and resolves the GID again through
    /// its home. Any later `None` is `NotFound`.
    ///
    /// # Arguments
    /// * `gid` - Element to act on.
    /// * `op` - Called with the owning location; may run twice.
    pub(crate) async fn on_owner<R, F, Fut>(&self, gid: Gid, mut op: F) -> Result<R>
    where
        F: FnMut(LocationId) -> Fut,
        Fut: Future<Output = Result<Option<R>>>,
    {
        let cached = self.inner.locate_cached(gid);
        let (mut location, mut retry) = if cached.is_valid() {
            (cached, cached.pid != self.inner.ctx.id())
        } else {
            (self.locate_remote(gid).await?, false)
        };

        loop {
            let dest = route(location).map_err(|_| ContainerError::NotFound(gid))?;
            if let Some(result) = op(dest).await? {
                return Ok(result);
            }
            self.inner.forget(gid);
            if !retry {
                return Err(ContainerError::NotFound(gid));
            }
            retry = false;
            tracing::debug!("LOOKUP: GID {} no longer at {}, resolving again", gid, location);
            location = self.locate_remote(gid).await?;
        }
    }

    /// Whether some location currently holds `gid`. Asks the owner rather
    /// than trusting a cached location.
    pub async fn contains(&self, gid: Gid) -> Result<bool> {
        match self.on_owner(gid, |dest| self.holds(dest, gid)).await {
            Ok(()) => Ok(true),
            Err(ContainerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reads `gid`, following it if it moved since this location last saw it.
    ///
    /// # Returns
    /// The value, or `NotFound` if no location holds `gid`.
    pub async fn get(&self, gid: Gid) -> Result<T> {
        self.on_owner(gid, |dest| self.fetch(dest, gid)).await
    }

    /// Reads `gid` from an already resolved owner.
    pub async fn get_from(&self, location: Location, gid: Gid) -> Result<T> {
        let dest = route(location)?;
        self.fetch(dest, gid).await?.ok_or_else(|| self.stale(gid))
    }

    /// Overwrites the value stored under `gid` on whichever location holds it.
    pub async fn set(&self, gid: Gid, value: T) -> Result<()> {
        self.on_owner(gid, |dest| self.store(dest, gid, value.clone()))
            .await
    }

    /// Removes `gid` from its owner and releases it at its home.
    pub async fn delete(&self, gid: Gid) -> Result<T> {
        let removed = self.on_owner(gid, |dest| self.remove(dest, gid)).await;
        self.inner.forget(gid);
        removed
    }

    /// Elements held by this location.
    pub fn local_size(&self) -> usize {
        self.inner.state.read().parts.iter().map(Part::len).sum()
    }

    pub fn local_empty(&self) -> bool {
        self.local_size() == 0
    }

    /// Collective.
    pub async fn size(&self) -> Result<usize> {
        let total = self
            .inner
            .ctx
            .all_reduce_sum(self.local_size() as u64)
            .await?;
        Ok(total as usize)
    }

    /// Collective.
    pub async fn empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }

    /// GIDs held by this location, ascending.
    pub fn local_gids(&self) -> Vec<Gid> {
        let state = self.inner.state.read();
        let mut gids: Vec<Gid> = state
            .parts
            .iter()
            .flat_map(|p| p.gids().iter().copied())
            .collect();
        gids.sort_unstable();
        gids
    }

    /// Read-locked view of the local parts, in insertion order.
    pub fn local_view(&self) -> LocalView<'_, KeyedPart<T>> {
        LocalView::new(RwLockReadGuard::map(self.inner.state.read(), |s| {
            s.parts.as_slice()
        }))
    }

    /// Number of lookups that had to fall back to searching every location.
    pub fn remote_lookups(&self) -> usize {
        self.inner.remote_lookups.load(Ordering::Relaxed)
    }

    /// Entries in the remote lookup cache.
    pub fn cached_locations(&self) -> usize {
        self.inner.state.read().cache.len()
    }

    /// Drops every cached remote location. The replica is kept.
    pub fn flush_cache(&self) {
        self.inner.state.write().cache.flush();
    }

    /// Bumped each time `update()` rebuilds the replica.
    pub fn directory_version(&self) -> u64 {
        self.inner.state.read().directory.version()
    }

    /// Collective: rebuilds every location's GID replica and flushes caches.
    pub async fn update(&self) -> Result<()> {
        let ctx = &self.inner.ctx;
        let me = ctx.id();
        ctx.fence().await?;

        let local: Vec<(Gid, Location)> = {
            let state = self.inner.state.read();
            state
                .parts
                .iter()
                .flat_map(|p| {
                    let location = Location::new(me, p.id());
                    p.gids().iter().map(move |&gid| (gid, location))
                })
                .collect()
        };
        let gathered = ctx.all_gather(&local).await?;

        let (version, entries) = {
            let mut state = self.inner.state.write();
            let version = state.directory.rebuild_replica(gathered.into_iter().flatten());
            state.cache.flush();
            state.dirty = false;
            (version, state.directory.replica_len())
        };
        tracing::info!(
            "Collection {} replica on location {} at version {} ({} GIDs)",
            self.inner.object,
            me,
            version,
            entries
        );
        Ok(())
    }

    /// Collective: runs `update()` only if some location changed since the
    /// last one. Returns whether it did.
    pub async fn ensure_current(&self) -> Result<bool> {
        let dirty = self.inner.state.read().dirty;
        let changed = self.inner.ctx.all_reduce_sum(dirty as u64).await?;
        if changed > 0 {
            self.update().await?;
        }
        Ok(changed > 0)
    }

    async fn fetch(&self, dest: LocationId, gid: Gid) -> Result<Option<T>> {
        if dest == self.inner.ctx.id() {
            return Ok(self.inner.get_local(gid));
        }
        Ok(self
            .inner
            .ctx
            .send_sync(dest, self.inner.object, COLLECTION_GET, &GidRequest { gid })
            .await?)
    }

    async fn store(&self, dest: LocationId, gid: Gid, value: T) -> Result<Option<()>> {
        let applied = if dest == self.inner.ctx.id() {
            self.inner.set_local(gid, value)
        } else {
            self.inner
                .ctx
                .send_sync::<_, bool>(dest, self.inner.object, COLLECTION_SET, &GidValue { gid, value })
                .await?
        };
        Ok(applied.then_some(()))
    }

    async fn remove(&self, dest: LocationId, gid: Gid) -> Result<Option<T>> {
        if dest == self.inner.ctx.id() {
            return Ok(self.inner.delete_local(gid));
        }
        Ok(self
            .inner
            .ctx
            .send_sync(dest, self.inner.object, COLLECTION_DELETE, &GidRequest { gid })
            .await?)
    }

    async fn holds(&self, dest: LocationId, gid: Gid) -> Result<Option<()>> {
        let found: Option<Location> = if dest == self.inner.ctx.id() {
            self.inner.local_location(gid)
        } else {
            self.inner
                .ctx
                .send_sync(dest, self.inner.object, COLLECTION_FIND, &GidRequest { gid })
                .await?
        };
        Ok(found.map(|_| ()))
    }

    /// A remote owner no longer had `gid`; drop what we cached about it.
    fn stale(&self, gid: Gid) -> ContainerError {
        self.inner.forget(gid);
        ContainerError::NotFound(gid)
    }
}

impl<T: Element> Drop for PCollection<T> {
    fn drop(&mut self) {
        self.inner.ctx.registry().unregister_object(self.inner.object);
    }
}

fn route(location: Location) -> Result<LocationId> {
    if !location.is_valid() {
        return Err(ContainerError::InvalidLocation(location));
    }
    Ok(location.pid)
}
