use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Global identifier of one logical element.
pub type Gid = u64;
pub type LocationId = usize;
/// Part identifier, unique within its owning location.
pub type PartId = usize;

/// Owner of an element: the location and the part inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub pid: LocationId,
    pub part: PartId,
}

impl Location {
    pub const INVALID: Location = Location {
        pid: usize::MAX,
        part: usize::MAX,
    };

    pub fn new(pid: LocationId, part: PartId) -> Self {
        Self { pid, part }
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "(pid {}, part {})", self.pid, self.part)
        } else {
            write!(f, "(invalid)")
        }
    }
}

/// One row of an index directory: part `part` on `owner` holds `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeEntry {
    pub owner: LocationId,
    pub part: PartId,
    pub lo: usize,
    pub hi: usize,
}

impl RangeEntry {
    pub fn new(owner: LocationId, part: PartId, range: Range<usize>) -> Self {
        Self {
            owner,
            part,
            lo: range.start,
            hi: range.end,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.lo <= index && index < self.hi
    }

    pub fn len(&self) -> usize {
        self.hi.saturating_sub(self.lo)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn location(&self) -> Location {
        Location::new(self.owner, self.part)
    }

    pub fn range(&self) -> Range<usize> {
        self.lo..self.hi
    }
}

/// Logically previous and next part of an ordered container; `None` at the ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryInfo {
    pub prev: Option<Location>,
    pub next: Option<Location>,
}
