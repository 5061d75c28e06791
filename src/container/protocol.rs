//! Container RMI Protocol
//!
//! Endpoint names and the request payloads exchanged between locations on
//! behalf of `PVector` and `PCollection`. Payload encoding is the runtime's
//! business; these types only need to be serde-serializable.

use crate::distribution::types::{Gid, Location, PartId};
use serde::{Deserialize, Serialize};

// --- Vector endpoints ---

/// Read one index from its owner.
pub const VECTOR_GET: &str = "vector/get";
/// Overwrite one index, acknowledged.
pub const VECTOR_SET: &str = "vector/set";
/// Overwrite one index, fire-and-forget.
pub const VECTOR_SET_ASYNC: &str = "vector/set_async";
pub const VECTOR_INSERT: &str = "vector/insert";
pub const VECTOR_ERASE: &str = "vector/erase";
/// Append to a specific part (the globally last one).
pub const VECTOR_PUSH_BACK: &str = "vector/push_back";
/// Offset propagation along the successor chain during `update()`.
pub const VECTOR_CHAIN_OFFSET: &str = "vector/chain_offset";
/// Directory rows broadcast during `update()`.
pub const VECTOR_APPEND_RANGES: &str = "vector/append_ranges";
/// Repoint a part's predecessor after a split on another location.
pub const VECTOR_SET_PREV: &str = "vector/set_prev";
/// Slices shipped by a redistribution.
pub const VECTOR_RECEIVE_SLICES: &str = "vector/receive_slices";

// --- Collection endpoints ---

pub const COLLECTION_GET: &str = "collection/get";
pub const COLLECTION_SET: &str = "collection/set";
pub const COLLECTION_DELETE: &str = "collection/delete";
/// Broadcast search: "do you hold this GID locally?"
pub const COLLECTION_FIND: &str = "collection/find";
/// Reserve a GID at its home location.
pub const COLLECTION_HOME_CLAIM: &str = "collection/home_claim";
pub const COLLECTION_HOME_FORGET: &str = "collection/home_forget";
pub const COLLECTION_HOME_LOOKUP: &str = "collection/home_lookup";

// --- Data Transfer Objects ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    pub index: usize,
}

/// Shared by set, set_async and insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexValue<T> {
    pub index: usize,
    pub value: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushBackRequest<T> {
    pub part: PartId,
    pub value: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOffset {
    pub part: PartId,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPrev {
    pub part: PartId,
    pub prev: Option<Location>,
}

/// Contiguous run of elements starting at global index `offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice<T> {
    pub offset: usize,
    pub data: Vec<T>,
}

impl<T> Slice<T> {
    pub fn end(&self) -> usize {
        self.offset + self.data.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GidRequest {
    pub gid: Gid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GidValue<T> {
    pub gid: Gid,
    pub value: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeRecord {
    pub gid: Gid,
    pub location: Location,
}
