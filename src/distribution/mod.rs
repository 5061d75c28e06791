//! Distribution Module
//!
//! Answers "where does this element live" for every container.
//!
//! ## Core Concepts
//! - **Location**: `(pid, part)` of the owning location and its local part, with an invalid sentinel.
//! - **IndexDirectory**: the replicated table of `(owner, part, [lo, hi))` ranges for
//!   index-addressed containers, searched linearly when small and by bisection otherwise.
//! - **GidDirectory**: local GID→part map plus the replica rebuilt by `update()` for
//!   GID-addressed containers, fronted by a bounded cache of remote resolutions.
//! - **GidAllocator**: hands out `me, me + P, me + 2P, …` so locations never collide.

pub mod directory;
pub mod gid_directory;
pub mod types;

pub use directory::IndexDirectory;
pub use gid_directory::{GidAllocator, GidDirectory, LookupCache, home_of};
pub use types::{BoundaryInfo, Gid, Location, LocationId, PartId, RangeEntry};
