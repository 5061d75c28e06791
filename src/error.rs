//! Error types shared by the runtime and the containers.
//!
//! Lookup misses are values (`Location::INVALID`, `Ok(None)`); the variants
//! here cover calls that cannot be completed and structural violations.

use crate::distribution::types::{Gid, Location, LocationId};
use crate::runtime::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RmiError {
    #[error("location {0} is outside the cluster")]
    InvalidLocation(LocationId),

    #[error("no handler registered for '{endpoint}' on object {object}")]
    UnknownEndpoint { object: ObjectId, endpoint: String },

    #[error("object {0} was dropped while a request was in flight")]
    ObjectDropped(ObjectId),

    #[error("location {0} stopped accepting messages")]
    Disconnected(LocationId),

    #[error("remote fault on location {location}: {message}")]
    Remote { location: LocationId, message: String },

    #[error("{count} asynchronous handler fault(s) before fence, first on location {location}: {message}")]
    AsyncFault {
        location: LocationId,
        message: String,
        count: usize,
    },

    #[error("collective slot of location {0} was empty")]
    Collective(LocationId),

    #[error("location {0} terminated abnormally")]
    LocationPanicked(LocationId),

    #[error("payload codec error: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("element {0} not found")]
    NotFound(Gid),

    #[error("operation addressed to invalid location {0}")]
    InvalidLocation(Location),

    #[error("GID {0} already exists")]
    DuplicateGid(Gid),

    #[error("invalid redistribution: {0}")]
    InvalidRedistribution(String),

    #[error("partition invariant violated: {0}")]
    PartitionInvariant(String),

    #[error("topology fault: {0}")]
    TopologyFault(String),

    #[error(transparent)]
    Rmi(#[from] RmiError),
}

impl From<bincode::Error> for ContainerError {
    fn from(err: bincode::Error) -> Self {
        ContainerError::Rmi(RmiError::Codec(err))
    }
}

pub type Result<T, E = ContainerError> = std::result::Result<T, E>;
