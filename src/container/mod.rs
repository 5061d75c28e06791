//! Container Module
//!
//! Distributed containers built from location-local parts.
//!
//! ## Core Concepts
//! - **Parts**: `IndexedPart` (contiguous index run) and `KeyedPart` (GID↔position map).
//! - **PVector**: index-addressed; the global offset map is rebuilt by `update()` and
//!   elements move between locations with `distribute()`.
//! - **PCollection**: GID-addressed; elements stay where they were added and are found
//!   through the local map, a bounded cache, the replica, the GID's home or a search.
//! - **Cursors**: local-only iteration across part boundaries with random-access arithmetic.

pub mod collection;
mod handlers;
pub mod iter;
pub mod part;
pub mod protocol;
pub mod redistribute;
pub mod vector;

pub use collection::PCollection;
pub use iter::{Cursor, LocalView};
pub use part::{IndexedPart, KeyedPart, Part};
pub use redistribute::TargetMap;
pub use vector::PVector;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Anything a container can store and ship between locations.
pub trait Element: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Element for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}
