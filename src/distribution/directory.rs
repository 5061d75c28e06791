//! Index Directory
//!
//! Per-location replica of the global offset map of an index-addressed
//! container. Each location owns its replica; replicas are reconciled only by
//! the container's `update()` protocol, which clears, refills and sorts them.

use super::types::{BoundaryInfo, Location, LocationId, PartId, RangeEntry};

#[derive(Debug, Clone)]
pub struct IndexDirectory {
    entries: Vec<RangeEntry>,
    sorted: bool,
    version: u64,
    linear_threshold: usize,
}

impl IndexDirectory {
    pub fn new(linear_threshold: usize) -> Self {
        Self {
            entries: Vec::new(),
            sorted: true,
            version: 0,
            linear_threshold,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.sorted = true;
    }

    pub fn append(&mut self, entries: impl IntoIterator<Item = RangeEntry>) {
        self.entries.extend(entries);
        self.sorted = self.entries.len() <= 1;
    }

    /// Orders entries by range start. Ties (empty ranges) are broken by owner
    /// and part so every replica ends up in the same order.
    pub fn sort(&mut self) {
        self.entries
            .sort_by_key(|e| (e.lo, e.hi, e.owner, e.part));
        self.sorted = true;
    }

    pub fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Number of indices covered, assuming the partition invariant holds.
    pub fn total_len(&self) -> usize {
        self.entries.iter().map(RangeEntry::len).sum()
    }

    /// Resolves `index` to its owner, or `Location::INVALID` if no range holds it.
    pub fn lookup(&self, index: usize) -> Location {
        self.find(index)
            .map(RangeEntry::location)
            .unwrap_or(Location::INVALID)
    }

    pub fn find(&self, index: usize) -> Option<&RangeEntry> {
        if !self.sorted || self.entries.len() <= self.linear_threshold {
            return self.entries.iter().find(|e| e.contains(index));
        }

        // Sorted and contiguous, so `hi` is non-decreasing.
        let at = self.entries.partition_point(|e| e.hi <= index);
        self.entries.get(at).filter(|e| e.contains(index))
    }

    /// Checks that the sorted entries tile `[0, expected)` without gaps or overlaps.
    pub fn check_partition(&self, expected: Option<usize>) -> Result<(), String> {
        if !self.sorted {
            return Err("directory is not sorted".to_string());
        }

        let mut cursor = 0usize;
        for entry in &self.entries {
            if entry.lo > entry.hi {
                return Err(format!(
                    "part {} on location {} has reversed range [{}, {})",
                    entry.part, entry.owner, entry.lo, entry.hi
                ));
            }
            if entry.lo != cursor {
                let kind = if entry.lo > cursor { "gap" } else { "overlap" };
                return Err(format!(
                    "{} at index {} before part {} on location {}",
                    kind, cursor, entry.part, entry.owner
                ));
            }
            cursor = entry.hi;
        }

        match expected {
            Some(size) if size != cursor => Err(format!(
                "ranges cover [0, {}) but the container holds {} elements",
                cursor, size
            )),
            _ => Ok(()),
        }
    }

    /// Predecessor/successor links of `owner`'s parts, derived from the sorted order.
    pub fn boundaries_for(&self, owner: LocationId) -> Vec<(PartId, BoundaryInfo)> {
        let n = self.entries.len();
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.owner == owner)
            .map(|(i, e)| {
                let prev = (i > 0).then(|| self.entries[i - 1].location());
                let next = (i + 1 < n).then(|| self.entries[i + 1].location());
                (e.part, BoundaryInfo { prev, next })
            })
            .collect()
    }

    /// Entry holding the last index, i.e. the part `push_back` appends to.
    pub fn last(&self) -> Option<&RangeEntry> {
        self.entries.last()
    }
}
