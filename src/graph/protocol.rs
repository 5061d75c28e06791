//! Graph RMI Protocol
//!
//! Edge operations are registered on the vertex collection's object id, so
//! they reach whichever location owns the source vertex. Traversal messages
//! are addressed to the traversal's own object id.

use super::types::{Direction, Edge};
use crate::distribution::types::Gid;
use serde::{Deserialize, Serialize};

// --- Graph endpoints ---

pub const GRAPH_ADD_EDGE: &str = "graph/add_edge";
pub const GRAPH_DELETE_EDGE: &str = "graph/delete_edge";
pub const GRAPH_IS_EDGE: &str = "graph/is_edge";
pub const GRAPH_ADJACENT: &str = "graph/adjacent";
pub const GRAPH_PREDS: &str = "graph/preds";
/// Record `source` as a predecessor of `target` (async).
pub const GRAPH_ADD_PRED: &str = "graph/add_pred";
/// Drop every edge pointing at a deleted vertex (async, sent to all).
pub const GRAPH_DROP_EDGES_TO: &str = "graph/drop_edges_to";

// --- Traversal endpoints ---

/// BFS discovery or topological release of a remote vertex.
pub const TRAVERSAL_DISCOVER: &str = "traversal/discover";
/// Dependency counting before a topological traversal.
pub const TRAVERSAL_TOPO_INCREMENT: &str = "traversal/topo_increment";
pub const TRAVERSAL_TOPO_DECREMENT: &str = "traversal/topo_decrement";
/// The DFS cursor moves to the owner of `target`.
pub const TRAVERSAL_DFS_VISIT: &str = "traversal/dfs_visit";
/// The DFS cursor comes back with the updated clock.
pub const TRAVERSAL_DFS_RETURN: &str = "traversal/dfs_return";
/// Ring token for the whole-graph variants.
pub const TRAVERSAL_TOKEN: &str = "traversal/token";

// --- Data Transfer Objects ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRequest<W> {
    pub source: Gid,
    pub edge: Edge<W>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: Gid,
    pub target: Gid,
}

/// How a queued vertex is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Breadth,
    Topological,
}

/// Travelling state of a BFS or topological step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discovery {
    pub gid: Gid,
    pub parent: Option<Gid>,
    pub depth: usize,
    pub direction: Direction,
    pub mode: Mode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CounterUpdate {
    pub gid: Gid,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DfsVisit {
    pub source: Gid,
    pub target: Gid,
    pub time: u64,
    pub depth: usize,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DfsReturn {
    pub time: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Token {
    pub counter: u64,
}
