//! Graph Module
//!
//! A distributed graph built on the GID-addressed container, and the parallel
//! traversals that run over it.
//!
//! ## Core Concepts
//! - **PGraph**: vertices in a `PCollection`, adjacency lists embedded in their source vertex.
//! - **Traversal**: a per-run distributed object (colors, queue, DFS cursor) driving
//!   BFS, DFS and topological order across locations.
//! - **Visitor**: per-location callbacks (`vertex`, `tree_edge`, `back_edge`,
//!   `forward_or_cross_edge`, `finish_vertex`).

pub mod graph;
mod handlers;
pub mod protocol;
pub mod traversal;
pub mod types;

pub use graph::PGraph;
pub use traversal::Traversal;
pub use types::{Color, Direction, Edge, GraphKind, Recorder, Vertex, VisitControl, VisitState, Visitor};

#[cfg(test)]
mod tests;
