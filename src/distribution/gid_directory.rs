//! GID-based addressing: local ownership, the replicated directory rebuilt by
//! `update()`, the bounded cache of remote resolutions and GID allocation.

use super::types::{Gid, Location, LocationId, PartId};
use std::collections::HashMap;

/// Location that keeps the authoritative record of where `gid` lives.
pub fn home_of(gid: Gid, locations: usize) -> LocationId {
    (gid % locations.max(1) as u64) as LocationId
}

/// Yields `me, me + P, me + 2P, …`; two locations never produce the same GID.
#[derive(Debug, Clone)]
pub struct GidAllocator {
    stride: u64,
    next: Gid,
}

impl GidAllocator {
    pub fn new(me: LocationId, locations: usize) -> Self {
        Self {
            stride: locations.max(1) as u64,
            next: me as Gid,
        }
    }

    pub fn next_gid(&mut self) -> Gid {
        let gid = self.next;
        self.next += self.stride;
        gid
    }

    pub fn peek(&self) -> Gid {
        self.next
    }
}

/// Remembers where remote GIDs were last found. Cleared wholesale when full.
#[derive(Debug, Clone)]
pub struct LookupCache {
    entries: HashMap<Gid, Location>,
    capacity: usize,
}

impl LookupCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, gid: Gid) -> Option<Location> {
        self.entries.get(&gid).copied()
    }

    pub fn insert(&mut self, gid: Gid, location: Location) {
        if self.entries.len() >= self.capacity {
            tracing::debug!("Lookup cache full ({} entries), flushing", self.entries.len());
            self.entries.clear();
        }
        self.entries.insert(gid, location);
    }

    pub fn invalidate(&mut self, gid: Gid) {
        self.entries.remove(&gid);
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GidDirectory {
    local: HashMap<Gid, PartId>,
    replica: HashMap<Gid, Location>,
    version: u64,
}

impl GidDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_local(&mut self, gid: Gid, part: PartId) {
        self.local.insert(gid, part);
    }

    pub fn forget_local(&mut self, gid: Gid) -> Option<PartId> {
        self.replica.remove(&gid);
        self.local.remove(&gid)
    }

    pub fn forget_replica(&mut self, gid: Gid) {
        self.replica.remove(&gid);
    }

    pub fn local_part(&self, gid: Gid) -> Option<PartId> {
        self.local.get(&gid).copied()
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Replaces the replica with the authoritative `(gid, location)` pairs
    /// gathered from every location.
    pub fn rebuild_replica(&mut self, entries: impl IntoIterator<Item = (Gid, Location)>) -> u64 {
        self.replica.clear();
        self.replica.extend(entries);
        self.version += 1;
        self.version
    }

    pub fn replica_lookup(&self, gid: Gid) -> Option<Location> {
        self.replica.get(&gid).copied()
    }

    pub fn replica_len(&self) -> usize {
        self.replica.len()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
