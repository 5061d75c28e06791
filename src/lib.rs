//! Partitioned Distributed Containers
//!
//! This library crate provides containers whose elements are split into
//! location-local parts, plus the runtime the locations talk through.
//! It serves as the foundation for the demo binary (`main.rs`).
//!
//! ## Architecture Modules
//! - **`runtime`**: The in-process RMI substrate. Runs one body per location and offers
//!   synchronous and asynchronous remote calls, barriers, fences and small collectives.
//! - **`distribution`**: Locations, index-range directories with boundary links, and the
//!   GID directory with its home table, remote cache and replica.
//! - **`container`**: `PVector` (index-addressed, redistributable) and `PCollection`
//!   (GID-addressed), built on parts and local cursors.
//! - **`graph`**: `PGraph` over a `PCollection` of vertices, with parallel BFS, DFS and
//!   topological traversals driven by per-location visitors.
//! - **`config`** / **`error`**: Runtime tuning knobs and the shared error types.

pub mod config;
pub mod container;
pub mod distribution;
pub mod error;
pub mod graph;
pub mod runtime;
