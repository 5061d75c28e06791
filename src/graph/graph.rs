//! `PGraph`: a distributed adjacency-list graph.
//!
//! Vertices are elements of a `PCollection`; edges live inside their source
//! vertex, so an edge is local exactly when its source vertex is.

use super::handlers::register_graph_handlers;
use super::protocol::*;
use super::traversal::Traversal;
use super::types::{Direction, Edge, GraphKind, Vertex, Visitor};
use crate::container::collection::CollectionInner;
use crate::container::protocol::GidRequest;
use crate::container::{Element, PCollection};
use crate::distribution::Gid;
use crate::error::{ContainerError, Result};
use crate::runtime::LocationContext;

use std::sync::Arc;

/// Owner-side edge operations, reached locally or through the graph endpoints.
impl<V: Element, W: Element> CollectionInner<Vertex<V, W>> {
    pub(crate) fn add_edge_local(&self, source: Gid, edge: Edge<W>) -> bool {
        self.with_local_mut(source, |v| v.edges.push(edge)).is_some()
    }

    pub(crate) fn delete_edge_local(&self, source: Gid, target: Gid) -> Option<bool> {
        self.with_local_mut(source, |v| v.remove_edge(target))
    }

    pub(crate) fn is_edge_local(&self, source: Gid, target: Gid) -> Option<bool> {
        self.with_local(source, |v| v.has_edge(target))
    }

    pub(crate) fn adjacent_local(&self, gid: Gid) -> Option<Vec<Gid>> {
        self.with_local(gid, |v| v.adjacent().collect())
    }

    pub(crate) fn preds_local(&self, gid: Gid) -> Option<Vec<Gid>> {
        self.with_local(gid, |v| v.preds.clone())
    }

    pub(crate) fn add_pred_local(&self, target: Gid, source: Gid) -> bool {
        self.with_local_mut(target, |v| v.preds.push(source)).is_some()
    }

    /// Returns the number of edges removed.
    pub(crate) fn drop_edges_to_local(&self, gid: Gid) -> usize {
        let mut removed = 0;
        self.for_each_local_mut(|_, v| removed += v.forget(gid));
        removed
    }
}

pub struct PGraph<V: Element, W: Element> {
    vertices: PCollection<Vertex<V, W>>,
    kind: GraphKind,
}

impl<V: Element, W: Element> PGraph<V, W> {
    /// Collective: an empty graph.
    pub async fn new(ctx: Arc<LocationContext>, kind: GraphKind) -> Result<Self> {
        let vertices = PCollection::new(ctx).await?;
        register_graph_handlers(vertices.inner());
        vertices.ctx().barrier().await;
        Ok(Self { vertices, kind })
    }

    pub fn ctx(&self) -> &Arc<LocationContext> {
        self.vertices.ctx()
    }

    pub fn kind(&self) -> GraphKind {
        self.kind
    }

    /// The underlying vertex container.
    pub fn vertices(&self) -> &PCollection<Vertex<V, W>> {
        &self.vertices
    }

    pub async fn add_vertex(&self, data: V) -> Result<Gid> {
        self.vertices.add_with(|gid| Vertex::new(gid, data)).await
    }

    pub async fn add_vertex_with_gid(&self, gid: Gid, data: V) -> Result<Gid> {
        self.vertices.add_with_gid(gid, Vertex::new(gid, data)).await
    }

    /// Adds `source → dest`; in an undirected graph also `dest → source`.
    /// `dest` does not have to exist yet.
    pub async fn add_edge(&self, source: Gid, dest: Gid, weight: W) -> Result<()> {
        if self.kind == GraphKind::Undirected && source != dest {
            self.add_directed(
                dest,
                Edge {
                    dest: source,
                    weight: weight.clone(),
                },
            )
            .await?;
        }
        self.add_directed(source, Edge { dest, weight }).await
    }

    async fn add_directed(&self, source: Gid, edge: Edge<W>) -> Result<()> {
        let inner = self.vertices.inner();
        self.vertices
            .on_owner(source, |owner| {
                let edge = edge.clone();
                async move {
                    let added = if owner == self.ctx().id() {
                        inner.add_edge_local(source, edge)
                    } else {
                        self.ctx()
                            .send_sync::<_, bool>(owner, inner.object, GRAPH_ADD_EDGE, &EdgeRequest { source, edge })
                            .await?
                    };
                    Ok(added.then_some(()))
                }
            })
            .await
    }

    /// Removes one `source → target` edge (both directions when undirected).
    /// Returns whether an edge was removed.
    pub async fn delete_edge(&self, source: Gid, target: Gid) -> Result<bool> {
        let removed = self.delete_directed(source, target).await?;
        if self.kind == GraphKind::Undirected && source != target {
            self.delete_directed(target, source).await?;
        }
        Ok(removed)
    }

    async fn delete_directed(&self, source: Gid, target: Gid) -> Result<bool> {
        let inner = self.vertices.inner();
        self.vertices
            .on_owner(source, |owner| async move {
                if owner == self.ctx().id() {
                    return Ok(inner.delete_edge_local(source, target));
                }
                Ok(self
                    .ctx()
                    .send_sync::<_, Option<bool>>(owner, inner.object, GRAPH_DELETE_EDGE, &EdgeKey { source, target })
                    .await?)
            })
            .await
    }

    /// Removes `gid` and returns its payload. Edges pointing at it from other
    /// vertices are dropped by the next fence.
    pub async fn delete_vertex(&self, gid: Gid) -> Result<V> {
        let vertex = self.vertices.delete(gid).await?;
        let ctx = self.ctx();
        let inner = self.vertices.inner();
        for dest in 0..ctx.count() {
            if dest == ctx.id() {
                inner.drop_edges_to_local(gid);
            } else {
                ctx.send_async(dest, inner.object, GRAPH_DROP_EDGES_TO, &GidRequest { gid })?;
            }
        }
        tracing::debug!("Deleted vertex {} with {} outgoing edge(s)", gid, vertex.out_degree());
        Ok(vertex.data)
    }

    pub async fn is_vertex(&self, gid: Gid) -> Result<bool> {
        self.vertices.contains(gid).await
    }

    /// False when the edge or its source vertex does not exist.
    pub async fn is_edge(&self, source: Gid, target: Gid) -> Result<bool> {
        let inner = self.vertices.inner();
        let found = self
            .vertices
            .on_owner(source, |owner| async move {
                if owner == self.ctx().id() {
                    return Ok(inner.is_edge_local(source, target));
                }
                Ok(self
                    .ctx()
                    .send_sync::<_, Option<bool>>(owner, inner.object, GRAPH_IS_EDGE, &EdgeKey { source, target })
                    .await?)
            })
            .await;
        match found {
            Ok(found) => Ok(found),
            Err(ContainerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_vertex(&self, gid: Gid) -> Result<Vertex<V, W>> {
        self.vertices.get(gid).await
    }

    pub async fn get_adjacent_vertices(&self, gid: Gid) -> Result<Vec<Gid>> {
        self.neighbor_query(gid, GRAPH_ADJACENT, |inner, gid| inner.adjacent_local(gid))
            .await
    }

    /// Predecessors as of the last `build_predecessors()`.
    pub async fn get_pred_vertices(&self, gid: Gid) -> Result<Vec<Gid>> {
        self.neighbor_query(gid, GRAPH_PREDS, |inner, gid| inner.preds_local(gid))
            .await
    }

    async fn neighbor_query(
        &self,
        gid: Gid,
        endpoint: &'static str,
        local: fn(&CollectionInner<Vertex<V, W>>, Gid) -> Option<Vec<Gid>>,
    ) -> Result<Vec<Gid>> {
        let inner = self.vertices.inner();
        self.vertices
            .on_owner(gid, |owner| async move {
                if owner == self.ctx().id() {
                    return Ok(local(&**inner, gid));
                }
                Ok(self
                    .ctx()
                    .send_sync::<_, Option<Vec<Gid>>>(owner, inner.object, endpoint, &GidRequest { gid })
                    .await?)
            })
            .await
    }

    /// Collective: recomputes every vertex's predecessor list from the edges.
    pub async fn build_predecessors(&self) -> Result<()> {
        let ctx = self.ctx();
        let inner = self.vertices.inner();
        self.vertices.ensure_current().await?;

        inner.for_each_local_mut(|_, v| v.preds.clear());
        ctx.barrier().await;

        let mut edges = Vec::new();
        inner.for_each_local(|gid, v| edges.extend(v.adjacent().map(|dest| (gid, dest))));
        for (source, target) in edges {
            let location = self.vertices.locate_cached(target);
            if !location.is_valid() {
                tracing::warn!("Edge {} -> {} points to an unknown vertex", source, target);
                continue;
            }
            if location.pid == ctx.id() {
                inner.add_pred_local(target, source);
            } else {
                ctx.send_async(location.pid, inner.object, GRAPH_ADD_PRED, &EdgeKey { source, target })?;
            }
        }
        ctx.fence().await?;
        tracing::info!("Predecessor lists rebuilt on location {}", ctx.id());
        Ok(())
    }

    /// Collective.
    pub async fn num_vertices(&self) -> Result<usize> {
        self.vertices.size().await
    }

    /// Collective. Counts stored adjacency entries, so an undirected edge
    /// between two distinct vertices counts twice.
    pub async fn num_edges(&self) -> Result<usize> {
        let mut local = 0u64;
        self.vertices
            .inner()
            .for_each_local(|_, v| local += v.out_degree() as u64);
        Ok(self.ctx().all_reduce_sum(local).await? as usize)
    }

    pub fn local_num_vertices(&self) -> usize {
        self.vertices.local_size()
    }

    /// GIDs of the vertices stored here, ascending.
    pub fn local_vertices(&self) -> Vec<Gid> {
        self.vertices.local_gids()
    }

    /// Collective: refreshes every location's vertex directory.
    pub async fn update(&self) -> Result<()> {
        self.vertices.update().await
    }

    /// Collective: breadth-first traversal from `start`. Returns this
    /// location's visitor.
    pub async fn bfs<Vis: Visitor<V, W>>(&self, start: Gid, direction: Direction, visitor: Vis) -> Result<Vis> {
        self.prepare(direction).await?;
        let traversal = Traversal::new(self, visitor).await?;
        traversal.bfs(start, direction).await?;
        traversal.into_visitor()
    }

    /// Collective: breadth-first traversal of every component.
    pub async fn bfs_all<Vis: Visitor<V, W>>(&self, direction: Direction, visitor: Vis) -> Result<Vis> {
        self.prepare(direction).await?;
        let traversal = Traversal::new(self, visitor).await?;
        traversal.bfs_all(direction).await?;
        traversal.into_visitor()
    }

    /// Collective: depth-first traversal from `start`.
    pub async fn dfs<Vis: Visitor<V, W>>(&self, start: Gid, direction: Direction, visitor: Vis) -> Result<Vis> {
        self.prepare(direction).await?;
        let traversal = Traversal::new(self, visitor).await?;
        traversal.dfs(start, direction).await?;
        traversal.into_visitor()
    }

    /// Collective: depth-first traversal of every component.
    pub async fn dfs_all<Vis: Visitor<V, W>>(&self, direction: Direction, visitor: Vis) -> Result<Vis> {
        self.prepare(direction).await?;
        let traversal = Traversal::new(self, visitor).await?;
        traversal.dfs_all(direction).await?;
        traversal.into_visitor()
    }

    /// Collective: visits vertices in dependency order.
    pub async fn topological<Vis: Visitor<V, W>>(&self, direction: Direction, visitor: Vis) -> Result<Vis> {
        self.prepare(direction).await?;
        let traversal = Traversal::new(self, visitor).await?;
        traversal.topological(direction).await?;
        traversal.into_visitor()
    }

    async fn prepare(&self, direction: Direction) -> Result<()> {
        if direction == Direction::Reverse {
            self.build_predecessors().await?;
        }
        Ok(())
    }
}
