//! `PVector`: an index-addressed distributed sequence.
//!
//! The GID of an element is its global index. Each location holds a run of
//! `IndexedPart`s and a replica of the global offset map; `update()` rebuilds
//! the replicas and `distribute()` moves index ranges between locations.

use super::Element;
use super::handlers::register_vector_handlers;
use super::iter::LocalView;
use super::part::{IndexedPart, Part};
use super::protocol::*;
use super::redistribute::{self, TargetMap};
use crate::distribution::{BoundaryInfo, Gid, IndexDirectory, Location, LocationId, PartId, RangeEntry};
use crate::error::{ContainerError, Result};
use crate::runtime::{LocationContext, ObjectId};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub(crate) struct VectorState<T> {
    /// Local parts in global index order.
    pub(crate) parts: Vec<IndexedPart<T>>,
    pub(crate) directory: IndexDirectory,
    /// Parts whose offset was assigned during the current `update()`.
    settled: HashSet<PartId>,
    next_part_id: PartId,
}

impl<T> VectorState<T> {
    fn part_mut(&mut self, id: PartId) -> Option<&mut IndexedPart<T>> {
        self.parts.iter_mut().find(|p| p.id() == id)
    }

    fn owning_part(&self, index: usize) -> Option<&IndexedPart<T>> {
        self.parts.iter().find(|p| p.contains(index))
    }

    fn owning_part_mut(&mut self, index: usize) -> Option<&mut IndexedPart<T>> {
        self.parts.iter_mut().find(|p| p.contains(index))
    }
}

pub(crate) struct VectorInner<T> {
    pub(crate) ctx: Arc<LocationContext>,
    pub(crate) object: ObjectId,
    pub(crate) state: RwLock<VectorState<T>>,
    /// Slices received during a redistribution, merged after the fence.
    inbox: Mutex<Vec<Slice<T>>>,
}

impl<T: Element> VectorInner<T> {
    pub(crate) fn get_local(&self, index: usize) -> Option<T> {
        self.state.read().owning_part(index)?.get(index).cloned()
    }

    pub(crate) fn set_local(&self, index: usize, value: T) -> bool {
        let mut state = self.state.write();
        match state.owning_part_mut(index).and_then(|p| p.get_mut(index)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn insert_local(&self, index: usize, value: T) -> bool {
        let mut state = self.state.write();
        match state.owning_part_mut(index) {
            Some(part) => part.insert(index, value),
            None => false,
        }
    }

    pub(crate) fn erase_local(&self, index: usize) -> Option<T> {
        self.state.write().owning_part_mut(index)?.remove(index)
    }

    pub(crate) fn push_back_local(&self, part: PartId, value: T) -> bool {
        match self.state.write().part_mut(part) {
            Some(part) => {
                part.push(value);
                true
            }
            None => false,
        }
    }

    /// Assigns `offset` to `part` and walks the successor chain: local
    /// successors are settled in place, a remote successor gets a message.
    pub(crate) fn settle_offset(&self, part: PartId, offset: usize) -> Result<()> {
        let me = self.ctx.id();
        let mut state = self.state.write();
        let mut current = Some((part, offset));

        while let Some((part_id, offset)) = current.take() {
            if !state.settled.insert(part_id) {
                return Err(ContainerError::PartitionInvariant(format!(
                    "part {} on location {} was reached twice by the offset chain",
                    part_id, me
                )));
            }
            let part = state.part_mut(part_id).ok_or_else(|| {
                ContainerError::PartitionInvariant(format!(
                    "offset sent to unknown part {} on location {}",
                    part_id, me
                ))
            })?;
            part.set_offset(offset);
            let next_offset = offset + part.len();

            match part.boundary().next {
                Some(next) if next.pid == me => current = Some((next.part, next_offset)),
                Some(next) => self.ctx.send_async(
                    next.pid,
                    self.object,
                    VECTOR_CHAIN_OFFSET,
                    &ChainOffset {
                        part: next.part,
                        offset: next_offset,
                    },
                )?,
                None => {}
            }
        }
        Ok(())
    }

    pub(crate) fn append_ranges(&self, entries: Vec<RangeEntry>) {
        self.state.write().directory.append(entries);
    }

    pub(crate) fn set_prev(&self, part: PartId, prev: Option<Location>) -> Result<()> {
        let me = self.ctx.id();
        let mut state = self.state.write();
        let part = state
            .part_mut(part)
            .ok_or(ContainerError::InvalidLocation(Location::new(me, part)))?;
        let boundary = part.boundary();
        part.set_boundary(BoundaryInfo { prev, ..boundary });
        Ok(())
    }

    pub(crate) fn receive_slices(&self, slices: Vec<Slice<T>>) {
        self.inbox.lock().extend(slices);
    }
}

pub struct PVector<T: Element> {
    inner: Arc<VectorInner<T>>,
}

impl<T: Element> PVector<T> {
    /// Collective: `len` copies of `value`, block-distributed over the locations.
    pub async fn new(ctx: Arc<LocationContext>, len: usize, value: T) -> Result<Self> {
        let count = ctx.count();
        let lo = ctx.id() * len / count;
        let hi = (ctx.id() + 1) * len / count;
        Self::with_local_part(ctx, lo, vec![value; hi - lo]).await
    }

    /// Collective: concatenates every location's `data` in location order.
    pub async fn from_local(ctx: Arc<LocationContext>, data: Vec<T>) -> Result<Self> {
        Self::with_local_part(ctx, 0, data).await
    }

    async fn with_local_part(ctx: Arc<LocationContext>, offset: usize, data: Vec<T>) -> Result<Self> {
        let me = ctx.id();
        let count = ctx.count();

        let mut part = IndexedPart::new(0, offset, data);
        part.set_boundary(BoundaryInfo {
            prev: (me > 0).then(|| Location::new(me - 1, 0)),
            next: (me + 1 < count).then(|| Location::new(me + 1, 0)),
        });

        let object = ctx.register_object();
        let inner = Arc::new(VectorInner {
            state: RwLock::new(VectorState {
                parts: vec![part],
                directory: IndexDirectory::new(ctx.config().linear_search_threshold),
                settled: HashSet::new(),
                next_part_id: 1,
            }),
            inbox: Mutex::new(Vec::new()),
            ctx,
            object,
        });
        register_vector_handlers(&inner);
        inner.ctx.barrier().await;

        let vector = Self { inner };
        vector.update().await?;
        Ok(vector)
    }

    /// Runtime handle of the location this view belongs to.
    pub fn ctx(&self) -> &Arc<LocationContext> {
        &self.inner.ctx
    }

    /// Identifier shared by every location's view of this vector.
    pub fn object_id(&self) -> ObjectId {
        self.inner.object
    }

    /// Owner of `index`: local parts first, then the directory replica.
    pub fn locate(&self, index: usize) -> Location {
        let state = self.inner.state.read();
        if let Some(part) = state.owning_part(index) {
            return Location::new(self.inner.ctx.id(), part.id());
        }
        state.directory.lookup(index)
    }

    /// Reads the element at global `index`, from whichever location owns it.
    ///
    /// # Arguments
    /// * `index` - Position in `[0, size())` as of the last `update()`.
    ///
    /// # Returns
    /// A copy of the element, or `NotFound` if no part covers `index`.
    pub async fn get(&self, index: usize) -> Result<T> {
        let location = self.locate(index);
        if !location.is_valid() {
            tracing::debug!("GET: index {} not found in directory", index);
            return Err(ContainerError::NotFound(index as Gid));
        }
        self.get_at(location, index).await
    }

    /// Reads `index` from an already resolved owner.
    pub async fn get_at(&self, location: Location, index: usize) -> Result<T> {
        let dest = self.route(location)?;
        let value = if dest == self.inner.ctx.id() {
            tracing::debug!("GET: index {} is local", index);
            self.inner.get_local(index)
        } else {
            tracing::debug!("GET: index {} lives on location {}", index, dest);
            self.inner
                .ctx
                .send_sync::<_, Option<T>>(dest, self.inner.object, VECTOR_GET, &IndexRequest { index })
                .await?
        };
        value.ok_or(ContainerError::NotFound(index as Gid))
    }

    /// Overwrites `index`; returns once the owner has applied it.
    pub async fn set(&self, index: usize, value: T) -> Result<()> {
        let dest = self.owner_of(index)?;
        let applied = if dest == self.inner.ctx.id() {
            self.inner.set_local(index, value)
        } else {
            self.inner
                .ctx
                .send_sync::<_, bool>(dest, self.inner.object, VECTOR_SET, &IndexValue { index, value })
                .await?
        };
        applied
            .then_some(())
            .ok_or(ContainerError::NotFound(index as Gid))
    }

    /// Overwrites `index` without waiting. Visible everywhere after the next
    /// fence; an unknown index on the owner is reported by that fence.
    pub fn set_async(&self, index: usize, value: T) -> Result<()> {
        let dest = self.owner_of(index)?;
        if dest == self.inner.ctx.id() {
            return self
                .inner
                .set_local(index, value)
                .then_some(())
                .ok_or(ContainerError::NotFound(index as Gid));
        }
        self.inner
            .ctx
            .send_async(dest, self.inner.object, VECTOR_SET_ASYNC, &IndexValue { index, value })?;
        Ok(())
    }

    /// Inserts before `index`; `index == size()` appends. Offsets of later
    /// elements shift only after the next `update()`.
    pub async fn insert(&self, index: usize, value: T) -> Result<()> {
        let location = self.locate(index);
        if !location.is_valid() {
            let at_end = self.inner.state.read().directory.last().map(|e| e.hi) == Some(index);
            if at_end {
                return self.push_back(value).await;
            }
            return Err(ContainerError::NotFound(index as Gid));
        }

        let dest = self.route(location)?;
        let inserted = if dest == self.inner.ctx.id() {
            self.inner.insert_local(index, value)
        } else {
            self.inner
                .ctx
                .send_sync::<_, bool>(dest, self.inner.object, VECTOR_INSERT, &IndexValue { index, value })
                .await?
        };
        inserted
            .then_some(())
            .ok_or(ContainerError::NotFound(index as Gid))
    }

    /// Removes and returns the element at `index`. Later offsets shift at the
    /// next `update()`.
    pub async fn erase(&self, index: usize) -> Result<T> {
        let dest = self.owner_of(index)?;
        let removed = if dest == self.inner.ctx.id() {
            self.inner.erase_local(index)
        } else {
            self.inner
                .ctx
                .send_sync::<_, Option<T>>(dest, self.inner.object, VECTOR_ERASE, &IndexRequest { index })
                .await?
        };
        removed.ok_or(ContainerError::NotFound(index as Gid))
    }

    /// Appends to the globally last part, wherever it lives.
    pub async fn push_back(&self, value: T) -> Result<()> {
        let last = self.inner.state.read().directory.last().copied();
        let Some(last) = last else {
            return Err(ContainerError::PartitionInvariant(
                "directory is empty; call update() first".to_string(),
            ));
        };

        let pushed = if last.owner == self.inner.ctx.id() {
            self.inner.push_back_local(last.part, value)
        } else {
            self.inner
                .ctx
                .send_sync::<_, bool>(
                    last.owner,
                    self.inner.object,
                    VECTOR_PUSH_BACK,
                    &PushBackRequest {
                        part: last.part,
                        value,
                    },
                )
                .await?
        };
        pushed
            .then_some(())
            .ok_or(ContainerError::InvalidLocation(last.location()))
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

    /// Read-locked view of the local parts, in index order.
    pub fn local_view(&self) -> LocalView<'_, IndexedPart<T>> {
        LocalView::new(RwLockReadGuard::map(self.inner.state.read(), |s| {
            s.parts.as_slice()
        }))
    }

    /// Copies of the local elements, in index order.
    pub fn local_values(&self) -> Vec<T> {
        self.local_view().iter().cloned().collect()
    }

    /// The index ranges of this location's parts.
    pub fn local_offset_map(&self) -> Vec<RangeEntry> {
        let me = self.inner.ctx.id();
        self.inner
            .state
            .read()
            .parts
            .iter()
            .map(|p| RangeEntry::new(me, p.id(), p.range()))
            .collect()
    }

    /// This location's replica of the directory, as of the last `update()`.
    pub fn global_offset_map(&self) -> Vec<RangeEntry> {
        self.inner.state.read().directory.entries().to_vec()
    }

    /// Bumped by every `update()`.
    pub fn directory_version(&self) -> u64 {
        self.inner.state.read().directory.version()
    }

    /// Previous and next parts of a local part, as linked by the chain.
    ///
    /// # Arguments
    /// * `part` - Id of a part held by this location.
    ///
    /// # Returns
    /// `None` if this location holds no part with that id.
    pub fn boundary(&self, part: PartId) -> Option<BoundaryInfo> {
        self.inner
            .state
            .read()
            .parts
            .iter()
            .find(|p| p.id() == part)
            .map(IndexedPart::boundary)
    }

    /// Splits local part `part` before local position `at`. The tail becomes a
    /// new part linked right after it.
    pub fn split_part(&self, part: PartId, at: usize) -> Result<PartId> {
        let me = self.inner.ctx.id();
        let mut state = self.inner.state.write();
        let new_id = state.next_part_id;
        let new_location = Location::new(me, new_id);

        let idx = state
            .parts
            .iter()
            .position(|p| p.id() == part)
            .ok_or(ContainerError::InvalidLocation(Location::new(me, part)))?;

        let (tail, offset, old) = {
            let head = &mut state.parts[idx];
            let tail = head.split_off(at);
            let offset = head.offset() + head.len();
            let old = head.boundary();
            head.set_boundary(BoundaryInfo {
                prev: old.prev,
                next: Some(new_location),
            });
            (tail, offset, old)
        };

        let mut new_part = IndexedPart::new(new_id, offset, tail);
        new_part.set_boundary(BoundaryInfo {
            prev: Some(Location::new(me, part)),
            next: old.next,
        });
        state.parts.insert(idx + 1, new_part);
        state.next_part_id += 1;

        match old.next {
            Some(next) if next.pid == me => {
                if let Some(successor) = state.part_mut(next.part) {
                    let boundary = successor.boundary();
                    successor.set_boundary(BoundaryInfo {
                        prev: Some(new_location),
                        ..boundary
                    });
                }
            }
            Some(next) => self.inner.ctx.send_async(
                next.pid,
                self.inner.object,
                VECTOR_SET_PREV,
                &SetPrev {
                    part: next.part,
                    prev: Some(new_location),
                },
            )?,
            None => {}
        }

        tracing::debug!("Split part {} on location {} into {}", part, me, new_id);
        Ok(new_id)
    }

    /// Collective: rebuilds every location's directory replica.
    ///
    /// Offsets propagate along the successor chain starting at the part with
    /// no predecessor; each location then sends its `(owner, part, range)`
    /// rows to all others and sorts what it received.
    pub async fn update(&self) -> Result<()> {
        let ctx = &self.inner.ctx;
        let me = ctx.id();
        ctx.fence().await?;

        let heads: Vec<PartId> = {
            let mut state = self.inner.state.write();
            state.directory.clear();
            state.settled.clear();
            state
                .parts
                .iter()
                .filter(|p| p.boundary().prev.is_none())
                .map(Part::id)
                .collect()
        };
        for head in heads {
            if let Err(e) = self.inner.settle_offset(head, 0) {
                ctx.report_fault(e.to_string());
            }
        }
        ctx.fence().await?;

        let (rows, unsettled) = {
            let state = self.inner.state.read();
            let rows: Vec<RangeEntry> = state
                .parts
                .iter()
                .map(|p| RangeEntry::new(me, p.id(), p.range()))
                .collect();
            let unsettled = state
                .parts
                .iter()
                .filter(|p| !state.settled.contains(&p.id()))
                .count();
            (rows, unsettled)
        };
        for dest in 0..ctx.count() {
            if dest == me {
                self.inner.append_ranges(rows.clone());
            } else {
                ctx.send_async(dest, self.inner.object, VECTOR_APPEND_RANGES, &rows)?;
            }
        }
        ctx.fence().await?;

        let unsettled = ctx.all_reduce_sum(unsettled as u64).await?;

        let checked = {
            let mut state = self.inner.state.write();
            state.directory.sort();
            let checked = state.directory.check_partition(None);
            for (part_id, boundary) in state.directory.boundaries_for(me) {
                if let Some(part) = state.part_mut(part_id) {
                    part.set_boundary(boundary);
                }
            }
            state
                .parts
                .sort_by_key(|p| (p.offset(), p.offset() + p.len(), p.id()));
            checked.map(|_| (state.directory.bump_version(), state.directory.len()))
        };

        if unsettled > 0 {
            return Err(ContainerError::PartitionInvariant(format!(
                "{} part(s) never received an offset",
                unsettled
            )));
        }
        let (version, rows) = checked.map_err(ContainerError::PartitionInvariant)?;
        tracing::info!(
            "Vector {} directory on location {} at version {} ({} ranges)",
            self.inner.object,
            me,
            version,
            rows
        );
        Ok(())
    }

    /// Collective: moves elements so that location `d` owns exactly `target[d]`.
    ///
    /// Every location must pass the same map. The maps are compared before
    /// anything is shipped, and a map that disagrees between locations or does
    /// not tile `[0, size())` fails with `InvalidRedistribution` everywhere.
    /// The old parts are kept until every location has assembled its new
    /// ones; if any location fails, all of them are put back.
    ///
    /// # Arguments
    /// * `target` - Destination location to the index ranges it owns afterwards.
    pub async fn distribute(&self, target: &TargetMap) -> Result<()> {
        let ctx = &self.inner.ctx;
        let me = ctx.id();

        self.update().await?;

        let rows: Vec<(LocationId, usize, usize)> = target
            .iter()
            .flat_map(|(&dest, ranges)| ranges.iter().map(move |r| (dest, r.start, r.end)))
            .collect();
        let maps = ctx.all_gather(&rows).await?;
        if let Some(other) = maps.iter().position(|map| *map != rows) {
            tracing::warn!(
                "Vector {} redistribution rejected: location {} passed a different map than location {}",
                self.inner.object,
                other,
                me
            );
            return Err(ContainerError::InvalidRedistribution(
                "locations passed different target maps".to_string(),
            ));
        }

        let size = self.inner.state.read().directory.total_len();
        let segments = redistribute::validate_target(target, size, ctx.count())?;
        let plan = redistribute::plan_parts(&segments);
        tracing::info!(
            "Redistributing vector {} ({} elements) into {} part(s)",
            self.inner.object,
            size,
            plan.len()
        );

        let parts = std::mem::take(&mut self.inner.state.write().parts);
        let backup = parts.clone();
        let mut outgoing: BTreeMap<LocationId, Vec<Slice<T>>> = BTreeMap::new();
        for part in parts {
            for (dest, slice) in redistribute::slice_part(part, &segments) {
                outgoing.entry(dest).or_default().push(slice);
            }
        }
        for (dest, slices) in outgoing {
            if dest == me {
                self.inner.receive_slices(slices);
            } else {
                tracing::debug!("Shipping {} slice(s) to location {}", slices.len(), dest);
                if let Err(e) = ctx.send_async(dest, self.inner.object, VECTOR_RECEIVE_SLICES, &slices) {
                    ctx.report_fault(e.to_string());
                }
            }
        }
        let shipped = ctx.fence().await;

        let received = std::mem::take(&mut *self.inner.inbox.lock());
        let assembled = match shipped {
            Ok(()) => redistribute::assemble_parts(me, &plan, redistribute::merge_slices(received)),
            Err(e) => Err(e.into()),
        };
        let failures = ctx.all_reduce_sum(assembled.is_err() as u64).await?;

        match assembled {
            Ok(parts) if failures == 0 => {
                let mut state = self.inner.state.write();
                state.next_part_id = parts.iter().map(|p| p.id() + 1).max().unwrap_or(0);
                state.parts = parts;
            }
            outcome => {
                self.inner.state.write().parts = backup;
                self.update().await?;
                let err = match outcome {
                    Err(e) => e,
                    Ok(_) => ContainerError::InvalidRedistribution(format!(
                        "{} location(s) could not assemble their parts",
                        failures
                    )),
                };
                tracing::warn!(
                    "Vector {} redistribution rolled back on location {}: {}",
                    self.inner.object,
                    me,
                    err
                );
                return Err(err);
            }
        }

        self.update().await
    }
}

impl<T: Element> PVector<T> {
    fn route(&self, location: Location) -> Result<LocationId> {
        if !location.is_valid() {
            return Err(ContainerError::InvalidLocation(location));
        }
        Ok(location.pid)
    }

    fn owner_of(&self, index: usize) -> Result<LocationId> {
        let location = self.locate(index);
        if !location.is_valid() {
            tracing::debug!("Index {} not found in directory", index);
            return Err(ContainerError::NotFound(index as Gid));
        }
        self.route(location)
    }
}

impl<T: Element> Drop for PVector<T> {
    fn drop(&mut self) {
        self.inner.ctx.registry().unregister_object(self.inner.object);
    }
}
