//! RMI Runtime
//!
//! The messaging substrate every distributed object is built on. A `Cluster`
//! runs the same async body once per location; locations share no container
//! state and talk only through remote method invocations and collectives.
//!
//! ## Core Concepts
//! - **Location**: one tokio task running the application body plus two dispatcher tasks
//!   (a concurrent lane for synchronous requests, a FIFO lane for asynchronous messages).
//! - **Objects**: distributed objects take an `ObjectId` collectively, so the same object
//!   has the same id everywhere, and register handlers in the location's `HandlerRegistry`.
//! - **Fence**: barrier, global quiescence of asynchronous traffic, barrier. Faults raised by
//!   asynchronous handlers are reported by the next fence on every location.

pub mod cluster;
pub mod registry;
pub mod types;

pub use cluster::{Cluster, LocationContext};
pub use registry::HandlerRegistry;
pub use types::ObjectId;

#[cfg(test)]
mod tests;
