use crate::distribution::types::Gid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Directed,
    /// Every edge is stored in both endpoints' adjacency lists.
    Undirected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge<W> {
    pub dest: Gid,
    pub weight: W,
}

/// A vertex with its outgoing edges. `preds` is only filled by
/// `PGraph::build_predecessors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex<V, W> {
    pub gid: Gid,
    pub data: V,
    pub edges: Vec<Edge<W>>,
    pub preds: Vec<Gid>,
}

impl<V, W> Vertex<V, W> {
    pub fn new(gid: Gid, data: V) -> Self {
        Self {
            gid,
            data,
            edges: Vec::new(),
            preds: Vec::new(),
        }
    }

    pub fn adjacent(&self) -> impl Iterator<Item = Gid> + '_ {
        self.edges.iter().map(|e| e.dest)
    }

    pub fn has_edge(&self, dest: Gid) -> bool {
        self.edges.iter().any(|e| e.dest == dest)
    }

    pub fn out_degree(&self) -> usize {
        self.edges.len()
    }

    /// Targets reached when walking in `direction`.
    pub fn neighbors(&self, direction: Direction) -> Vec<Gid> {
        match direction {
            Direction::Forward => self.adjacent().collect(),
            Direction::Reverse => self.preds.clone(),
        }
    }

    /// Removes the first edge to `dest`.
    pub fn remove_edge(&mut self, dest: Gid) -> bool {
        match self.edges.iter().position(|e| e.dest == dest) {
            Some(pos) => {
                self.edges.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Removes every edge to and predecessor entry for `gid`.
    pub fn forget(&mut self, gid: Gid) -> usize {
        let before = self.edges.len();
        self.edges.retain(|e| e.dest != gid);
        self.preds.retain(|&p| p != gid);
        before - self.edges.len()
    }
}

/// Which adjacency a traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Outgoing edges.
    Forward,
    /// Predecessor lists.
    Reverse,
}

/// Per-vertex traversal color. Unvisited vertices have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Discovered,
    Finished,
}

/// What a visitor learns about the vertex it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitState {
    /// Hops from the root (BFS, DFS) or from the nearest source (topological).
    pub depth: usize,
    pub parent: Option<Gid>,
    /// DFS discovery or finish time; zero for the other traversals.
    pub time: u64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitControl {
    Continue,
    /// Do not expand this vertex's neighbors.
    Stop,
}

/// Traversal callbacks. Each location runs its own visitor; the callbacks for
/// a vertex or an edge fire on the location owning the (target) vertex.
///
/// BFS and topological traversals report tree edges only; DFS classifies
/// every edge it walks.
pub trait Visitor<V, W>: Send + 'static {
    fn vertex(&mut self, _vertex: &Vertex<V, W>, _state: &VisitState) -> VisitControl {
        VisitControl::Continue
    }

    fn tree_edge(&mut self, _source: Gid, _target: Gid) {}

    fn back_edge(&mut self, _source: Gid, _target: Gid) {}

    fn forward_or_cross_edge(&mut self, _source: Gid, _target: Gid) {}

    fn finish_vertex(&mut self, _vertex: &Vertex<V, W>, _state: &VisitState) {}
}

/// A visitor that writes every callback down, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recorder {
    pub visits: Vec<(Gid, VisitState)>,
    pub finishes: Vec<(Gid, VisitState)>,
    pub tree_edges: Vec<(Gid, Gid)>,
    pub back_edges: Vec<(Gid, Gid)>,
    pub other_edges: Vec<(Gid, Gid)>,
}

impl<V, W> Visitor<V, W> for Recorder {
    fn vertex(&mut self, vertex: &Vertex<V, W>, state: &VisitState) -> VisitControl {
        self.visits.push((vertex.gid, *state));
        VisitControl::Continue
    }

    fn tree_edge(&mut self, source: Gid, target: Gid) {
        self.tree_edges.push((source, target));
    }

    fn back_edge(&mut self, source: Gid, target: Gid) {
        self.back_edges.push((source, target));
    }

    fn forward_or_cross_edge(&mut self, source: Gid, target: Gid) {
        self.other_edges.push((source, target));
    }

    fn finish_vertex(&mut self, vertex: &Vertex<V, W>, state: &VisitState) {
        self.finishes.push((vertex.gid, *state));
    }
}
