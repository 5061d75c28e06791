//! Parts: the unit of local storage.
//!
//! A part is exclusively owned by one location. `IndexedPart` holds a
//! contiguous run of an index-addressed container starting at `offset`;
//! `KeyedPart` holds GID-addressed elements with a GID↔position map.

use crate::distribution::types::{BoundaryInfo, Gid, PartId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

/// Read access the local cursor needs from a part.
pub trait Part {
    type Item;

    fn id(&self) -> PartId;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at local position `pos`.
    fn at(&self, pos: usize) -> Option<&Self::Item>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedPart<T> {
    id: PartId,
    offset: usize,
    data: Vec<T>,
    boundary: BoundaryInfo,
}

impl<T> IndexedPart<T> {
    pub fn new(id: PartId, offset: usize, data: Vec<T>) -> Self {
        Self {
            id,
            offset,
            data,
            boundary: BoundaryInfo::default(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.data.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }

    pub fn boundary(&self) -> BoundaryInfo {
        self.boundary
    }

    pub fn set_boundary(&mut self, boundary: BoundaryInfo) {
        self.boundary = boundary;
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        index
            .checked_sub(self.offset)
            .and_then(|pos| self.data.get(pos))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        index
            .checked_sub(self.offset)
            .and_then(|pos| self.data.get_mut(pos))
    }

    /// Inserts before global `index`; `index` may be one past the part's end.
    pub fn insert(&mut self, index: usize, value: T) -> bool {
        match index.checked_sub(self.offset) {
            Some(pos) if pos <= self.data.len() => {
                self.data.insert(pos, value);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        let pos = index.checked_sub(self.offset)?;
        (pos < self.data.len()).then(|| self.data.remove(pos))
    }

    pub fn push(&mut self, value: T) {
        self.data.push(value);
    }

    /// Moves local positions `[at, len)` out of the part.
    pub fn split_off(&mut self, at: usize) -> Vec<T> {
        self.data.split_off(at.min(self.data.len()))
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}

impl<T> Part for IndexedPart<T> {
    type Item = T;

    fn id(&self) -> PartId {
        self.id
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn at(&self, pos: usize) -> Option<&T> {
        self.data.get(pos)
    }
}

#[derive(Debug, Clone)]
pub struct KeyedPart<T> {
    id: PartId,
    gids: Vec<Gid>,
    data: Vec<T>,
    positions: HashMap<Gid, usize>,
}

impl<T> KeyedPart<T> {
    pub fn new(id: PartId) -> Self {
        Self {
            id,
            gids: Vec::new(),
            data: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Returns false, leaving the part untouched, if `gid` is already present.
    pub fn insert(&mut self, gid: Gid, value: T) -> bool {
        if self.positions.contains_key(&gid) {
            return false;
        }
        self.positions.insert(gid, self.data.len());
        self.gids.push(gid);
        self.data.push(value);
        true
    }

    pub fn contains(&self, gid: Gid) -> bool {
        self.positions.contains_key(&gid)
    }

    pub fn get(&self, gid: Gid) -> Option<&T> {
        self.positions.get(&gid).and_then(|&pos| self.data.get(pos))
    }

    pub fn get_mut(&mut self, gid: Gid) -> Option<&mut T> {
        let pos = *self.positions.get(&gid)?;
        self.data.get_mut(pos)
    }

    /// Removes `gid`, moving the last element into the hole.
    pub fn remove(&mut self, gid: Gid) -> Option<T> {
        let pos = self.positions.remove(&gid)?;
        self.gids.swap_remove(pos);
        let value = self.data.swap_remove(pos);
        if let Some(&moved) = self.gids.get(pos) {
            self.positions.insert(moved, pos);
        }
        Some(value)
    }

    pub fn gid_at(&self, pos: usize) -> Option<Gid> {
        self.gids.get(pos).copied()
    }

    pub fn position(&self, gid: Gid) -> Option<usize> {
        self.positions.get(&gid).copied()
    }

    pub fn gids(&self) -> &[Gid] {
        &self.gids
    }

    pub fn iter(&self) -> impl Iterator<Item = (Gid, &T)> {
        self.gids.iter().copied().zip(self.data.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Gid, &mut T)> {
        self.gids.iter().copied().zip(self.data.iter_mut())
    }
}

impl<T> Part for KeyedPart<T> {
    type Item = T;

    fn id(&self) -> PartId {
        self.id
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn at(&self, pos: usize) -> Option<&T> {
        self.data.get(pos)
    }
}
