//! Parallel traversals over a `PGraph`.
//!
//! A `Traversal` is a distributed object of its own: it carries a color map,
//! a work queue and the DFS cursor state on every location, so several
//! traversals can run over one graph without sharing anything. Colors are
//! only cleared by `reset()`.
//!
//! ## Protocols
//! - **BFS**: layer by layer. Each location drains the vertices of the current
//!   layer; a neighbor owned elsewhere is handed over with an asynchronous
//!   discovery that lands in the owner's next frontier. A fence closes every
//!   layer, and the traversal ends when no location has a frontier left.
//! - **Topological**: each location drains a local queue; releasing a vertex
//!   owned elsewhere is an asynchronous counter decrement. A fence ends it.
//! - **DFS**: a single cursor. When the next neighbor is remote the cursor
//!   moves to its owner, which either descends or sends the cursor back with
//!   the updated clock.
//! - **Whole-graph BFS**: locations agree on the next unvisited vertex, in
//!   location order, and run a full layered BFS from it before picking again.
//! - **Whole-graph DFS**: a token travels `0 → 1 → … → P-1`; only the holder
//!   starts new roots, so DFS times stay globally ordered.

use super::graph::PGraph;
use super::handlers::register_traversal_handlers;
use super::protocol::*;
use super::types::{Color, Direction, Vertex, VisitControl, VisitState, Visitor};
use crate::container::Element;
use crate::container::collection::CollectionInner;
use crate::distribution::{Gid, LocationId};
use crate::error::{ContainerError, Result, RmiError};
use crate::runtime::{LocationContext, ObjectId};

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// One vertex on the DFS stack of this location.
struct Frame {
    gid: Gid,
    parent: Option<Gid>,
    neighbors: Vec<Gid>,
    next: usize,
    /// Set when the cursor arrived from another location for this vertex.
    return_to: Option<LocationId>,
    depth: usize,
    direction: Direction,
}

#[derive(Default)]
struct DfsState {
    stack: Vec<Frame>,
    time: u64,
}

pub(crate) struct TraversalInner<V, W, Vis> {
    pub(crate) ctx: Arc<LocationContext>,
    pub(crate) object: ObjectId,
    vertices: Arc<CollectionInner<Vertex<V, W>>>,
    colors: Mutex<HashMap<(Gid, Direction), Color>>,
    /// Unreleased dependencies per vertex (topological).
    counters: Mutex<HashMap<(Gid, Direction), usize>>,
    queue: Mutex<VecDeque<Discovery>>,
    /// Breadth-first work for the next layer.
    frontier: Mutex<VecDeque<Discovery>>,
    draining: AtomicBool,
    visitor: Mutex<Vis>,
    dfs: Mutex<DfsState>,
    tokens: mpsc::UnboundedSender<u64>,
    token_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<u64>>,
}

impl<V: Element, W: Element, Vis: Visitor<V, W>> TraversalInner<V, W, Vis> {
    fn visit<R>(&self, f: impl FnOnce(&mut Vis) -> R) -> R {
        f(&mut self.visitor.lock())
    }

    fn color(&self, gid: Gid, direction: Direction) -> Option<Color> {
        self.colors.lock().get(&(gid, direction)).copied()
    }

    /// Marks the vertex discovered and queues it, unless it already has a
    /// color. Breadth-first work waits in the frontier for the next layer.
    pub(crate) fn accept(&self, work: Discovery) {
        let fresh = match self.colors.lock().entry((work.gid, work.direction)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Color::Discovered);
                true
            }
        };
        if !fresh {
            return;
        }
        if let Some(parent) = work.parent {
            self.visit(|v| v.tree_edge(parent, work.gid));
        }
        match work.mode {
            Mode::Breadth => self.frontier.lock().push_back(work),
            Mode::Topological => self.queue.lock().push_back(work),
        }
    }

    /// Moves the frontier into the work queue; returns how many vertices it held.
    fn advance_layer(&self) -> usize {
        let layer = std::mem::take(&mut *self.frontier.lock());
        let count = layer.len();
        self.queue.lock().extend(layer);
        count
    }

    /// Processes queued work until the queue is empty. A call made while
    /// another drain is running returns at once; the running drain picks the
    /// new work up.
    pub(crate) fn drain(&self) -> Result<()> {
        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            let outcome = self.drain_queue();
            self.draining.store(false, Ordering::Release);
            outcome?;
            // Work queued between the last pop and the store above.
            if self.queue.lock().is_empty() {
                return Ok(());
            }
        }
    }

    fn drain_queue(&self) -> Result<()> {
        loop {
            let next = self.queue.lock().pop_front();
            let Some(work) = next else {
                return Ok(());
            };
            self.process(work)?;
        }
    }

    fn process(&self, work: Discovery) -> Result<()> {
        let Some(vertex) = self.vertices.get_local(work.gid) else {
            tracing::warn!("Vertex {} vanished before it was processed", work.gid);
            return Ok(());
        };
        let state = VisitState {
            depth: work.depth,
            parent: work.parent,
            time: 0,
            direction: work.direction,
        };

        let control = self.visit(|v| v.vertex(&vertex, &state));
        if control == VisitControl::Continue {
            for target in vertex.neighbors(work.direction) {
                let next = Discovery {
                    gid: target,
                    parent: Some(work.gid),
                    depth: work.depth + 1,
                    direction: work.direction,
                    mode: work.mode,
                };
                match work.mode {
                    Mode::Breadth => self.forward_discovery(next)?,
                    Mode::Topological => self.release(next)?,
                }
            }
        }

        self.colors
            .lock()
            .insert((work.gid, work.direction), Color::Finished);
        self.visit(|v| v.finish_vertex(&vertex, &state));
        Ok(())
    }

    fn forward_discovery(&self, next: Discovery) -> Result<()> {
        let location = self.vertices.locate_cached(next.gid);
        if !location.is_valid() {
            tracing::warn!(
                "Edge {:?} -> {} points to an unknown vertex",
                next.parent,
                next.gid
            );
            return Ok(());
        }
        if location.pid == self.ctx.id() {
            self.accept(next);
        } else {
            self.ctx
                .send_async(location.pid, self.object, TRAVERSAL_DISCOVER, &next)?;
        }
        Ok(())
    }

    // --- Topological ---

    fn init_counters(&self, gids: &[Gid], direction: Direction) {
        let mut counters = self.counters.lock();
        for &gid in gids {
            counters.insert((gid, direction), 0);
        }
    }

    /// Records that `target` waits for `source`.
    fn count_dependency(&self, source: Gid, target: Gid, direction: Direction) -> Result<()> {
        let location = self.vertices.locate_cached(target);
        if !location.is_valid() {
            return Err(ContainerError::TopologyFault(format!(
                "edge {} -> {} points to an unknown vertex",
                source, target
            )));
        }
        let update = CounterUpdate {
            gid: target,
            direction,
        };
        if location.pid == self.ctx.id() {
            self.increment(update)
        } else {
            self.ctx
                .send_async(location.pid, self.object, TRAVERSAL_TOPO_INCREMENT, &update)?;
            Ok(())
        }
    }

    pub(crate) fn increment(&self, update: CounterUpdate) -> Result<()> {
        match self.counters.lock().get_mut(&(update.gid, update.direction)) {
            Some(count) => {
                *count += 1;
                Ok(())
            }
            None => Err(ContainerError::TopologyFault(format!(
                "increment of uninitialized counter for vertex {}",
                update.gid
            ))),
        }
    }

    fn release(&self, next: Discovery) -> Result<()> {
        let location = self.vertices.locate_cached(next.gid);
        if !location.is_valid() {
            return Err(ContainerError::TopologyFault(format!(
                "edge {:?} -> {} points to an unknown vertex",
                next.parent, next.gid
            )));
        }
        if location.pid == self.ctx.id() {
            self.decrement(next)
        } else {
            self.ctx
                .send_async(location.pid, self.object, TRAVERSAL_TOPO_DECREMENT, &next)?;
            Ok(())
        }
    }

    /// Queues the vertex once its last dependency is released.
    pub(crate) fn decrement(&self, work: Discovery) -> Result<()> {
        let released = {
            let mut counters = self.counters.lock();
            match counters.get_mut(&(work.gid, work.direction)) {
                None => {
                    return Err(ContainerError::TopologyFault(format!(
                        "decrement of uninitialized counter for vertex {}",
                        work.gid
                    )));
                }
                Some(count) if *count == 0 => {
                    return Err(ContainerError::TopologyFault(format!(
                        "counter for vertex {} decremented below zero",
                        work.gid
                    )));
                }
                Some(count) => {
                    *count -= 1;
                    *count == 0
                }
            }
        };
        if released {
            self.accept(work);
        }
        Ok(())
    }

    fn ready(&self, gids: &[Gid], direction: Direction) -> Vec<Gid> {
        let counters = self.counters.lock();
        gids.iter()
            .copied()
            .filter(|&gid| counters.get(&(gid, direction)) == Some(&0))
            .collect()
    }

    fn blocked(&self, gids: &[Gid], direction: Direction) -> usize {
        let counters = self.counters.lock();
        gids.iter()
            .filter(|&&gid| counters.get(&(gid, direction)).is_some_and(|&c| c > 0))
            .count()
    }

    // --- DFS ---

    fn dfs_root(&self, gid: Gid, direction: Direction, time: u64) -> Result<()> {
        let mut dfs = self.dfs.lock();
        dfs.time = time;
        self.enter(&mut dfs, gid, None, 0, None, direction)?;
        self.advance(&mut dfs)
    }

    fn dfs_time(&self) -> u64 {
        self.dfs.lock().time
    }

    fn enter(
        &self,
        dfs: &mut DfsState,
        gid: Gid,
        parent: Option<Gid>,
        depth: usize,
        return_to: Option<LocationId>,
        direction: Direction,
    ) -> Result<()> {
        let vertex = self
            .vertices
            .get_local(gid)
            .ok_or(ContainerError::NotFound(gid))?;
        self.colors.lock().insert((gid, direction), Color::Discovered);
        dfs.time += 1;
        let state = VisitState {
            depth,
            parent,
            time: dfs.time,
            direction,
        };
        let control = self.visit(|v| v.vertex(&vertex, &state));
        let neighbors = match control {
            VisitControl::Continue => vertex.neighbors(direction),
            VisitControl::Stop => Vec::new(),
        };
        dfs.stack.push(Frame {
            gid,
            parent,
            neighbors,
            next: 0,
            return_to,
            depth,
            direction,
        });
        Ok(())
    }

    /// Runs the cursor while it stays on this location.
    fn advance(&self, dfs: &mut DfsState) -> Result<()> {
        let me = self.ctx.id();
        loop {
            let Some(frame) = dfs.stack.last_mut() else {
                return Ok(());
            };

            let pending = frame.neighbors.get(frame.next).copied();
            if let Some(target) = pending {
                frame.next += 1;
                let (source, depth, direction) = (frame.gid, frame.depth + 1, frame.direction);

                let location = self.vertices.locate_cached(target);
                if !location.is_valid() {
                    tracing::warn!("Edge {} -> {} points to an unknown vertex", source, target);
                    continue;
                }
                if location.pid != me {
                    let visit = DfsVisit {
                        source,
                        target,
                        time: dfs.time,
                        depth,
                        direction,
                    };
                    self.ctx
                        .send_async(location.pid, self.object, TRAVERSAL_DFS_VISIT, &visit)?;
                    return Ok(());
                }

                match self.color(target, direction) {
                    None => {
                        self.visit(|v| v.tree_edge(source, target));
                        self.enter(dfs, target, Some(source), depth, None, direction)?;
                    }
                    Some(Color::Discovered) => {
                        self.visit(|v| v.back_edge(source, target));
                    }
                    Some(Color::Finished) => {
                        self.visit(|v| v.forward_or_cross_edge(source, target));
                    }
                }
                continue;
            }

            let Some(frame) = dfs.stack.pop() else {
                return Ok(());
            };
            dfs.time += 1;
            self.colors
                .lock()
                .insert((frame.gid, frame.direction), Color::Finished);
            let state = VisitState {
                depth: frame.depth,
                parent: frame.parent,
                time: dfs.time,
                direction: frame.direction,
            };
            if let Some(vertex) = self.vertices.get_local(frame.gid) {
                self.visit(|v| v.finish_vertex(&vertex, &state));
            }
            if let Some(origin) = frame.return_to {
                self.send_dfs_return(origin, dfs.time)?;
                return Ok(());
            }
        }
    }

    fn send_dfs_return(&self, origin: LocationId, time: u64) -> Result<()> {
        self.ctx
            .send_async(origin, self.object, TRAVERSAL_DFS_RETURN, &DfsReturn { time })?;
        Ok(())
    }

    /// The cursor arrives from `origin` to look at `visit.target`.
    pub(crate) fn dfs_visit(&self, origin: LocationId, visit: DfsVisit) -> Result<()> {
        let mut dfs = self.dfs.lock();
        dfs.time = visit.time;
        match self.color(visit.target, visit.direction) {
            None => {
                self.visit(|v| v.tree_edge(visit.source, visit.target));
                self.enter(
                    &mut dfs,
                    visit.target,
                    Some(visit.source),
                    visit.depth,
                    Some(origin),
                    visit.direction,
                )?;
                self.advance(&mut dfs)
            }
            Some(Color::Discovered) => {
                self.visit(|v| v.back_edge(visit.source, visit.target));
                self.send_dfs_return(origin, dfs.time)
            }
            Some(Color::Finished) => {
                self.visit(|v| v.forward_or_cross_edge(visit.source, visit.target));
                self.send_dfs_return(origin, dfs.time)
            }
        }
    }

    pub(crate) fn dfs_return(&self, ret: DfsReturn) -> Result<()> {
        let mut dfs = self.dfs.lock();
        dfs.time = ret.time;
        self.advance(&mut dfs)
    }

    // --- Token ring ---

    pub(crate) fn receive_token(&self, counter: u64) {
        if self.tokens.send(counter).is_err() {
            tracing::warn!("Token {} arrived after the traversal closed", counter);
        }
    }

    async fn wait_token(&self) -> Result<u64> {
        let counter = self.token_rx.lock().await.recv().await;
        counter.ok_or_else(|| RmiError::Disconnected(self.ctx.id()).into())
    }

    fn pass_token(&self, counter: u64) -> Result<()> {
        let next = self.ctx.id() + 1;
        if next < self.ctx.count() {
            self.ctx
                .send_async(next, self.object, TRAVERSAL_TOKEN, &Token { counter })?;
        }
        Ok(())
    }

    fn reset_local(&self) {
        self.colors.lock().clear();
        self.counters.lock().clear();
        self.queue.lock().clear();
        self.frontier.lock().clear();
        *self.dfs.lock() = DfsState::default();
    }
}

/// Unregisters the traversal's handlers when dropped.
struct Registration {
    ctx: Arc<LocationContext>,
    object: ObjectId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.ctx.registry().unregister_object(self.object);
    }
}

pub struct Traversal<'g, V: Element, W: Element, Vis: Visitor<V, W>> {
    graph: &'g PGraph<V, W>,
    inner: Arc<TraversalInner<V, W, Vis>>,
    registration: Registration,
}

impl<'g, V: Element, W: Element, Vis: Visitor<V, W>> Traversal<'g, V, W, Vis> {
    /// Collective: a fresh traversal over `graph` with this location's visitor.
    pub async fn new(graph: &'g PGraph<V, W>, visitor: Vis) -> Result<Self> {
        let ctx = graph.ctx().clone();
        let object = ctx.register_object();
        let (tokens, token_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(TraversalInner {
            vertices: graph.vertices().inner().clone(),
            colors: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            frontier: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            visitor: Mutex::new(visitor),
            dfs: Mutex::new(DfsState::default()),
            tokens,
            token_rx: tokio::sync::Mutex::new(token_rx),
            ctx,
            object,
        });
        register_traversal_handlers(&inner);
        let registration = Registration {
            ctx: inner.ctx.clone(),
            object,
        };
        inner.ctx.barrier().await;
        Ok(Self {
            graph,
            inner,
            registration,
        })
    }

    pub fn object_id(&self) -> ObjectId {
        self.inner.object
    }

    /// Color of a local vertex; `None` means unvisited.
    pub fn color(&self, gid: Gid, direction: Direction) -> Option<Color> {
        self.inner.color(gid, direction)
    }

    /// Runs `f` on this location's visitor.
    pub fn with_visitor<R>(&self, f: impl FnOnce(&mut Vis) -> R) -> R {
        self.inner.visit(f)
    }

    /// Unregisters the traversal and hands back this location's visitor.
    ///
    /// Fails with `ObjectDropped` if a handler of this traversal is still
    /// running, which cannot happen once the last collective call returned.
    pub fn into_visitor(self) -> Result<Vis> {
        let Self {
            inner, registration, ..
        } = self;
        let object = registration.object;
        drop(registration);
        match Arc::try_unwrap(inner) {
            Ok(inner) => Ok(inner.visitor.into_inner()),
            Err(_) => Err(RmiError::ObjectDropped(object).into()),
        }
    }

    /// Collective: breadth-first traversal from `start`.
    ///
    /// `Direction::Reverse` follows predecessor lists, which must have been
    /// built with `PGraph::build_predecessors`.
    pub async fn bfs(&self, start: Gid, direction: Direction) -> Result<()> {
        let ctx = &self.inner.ctx;
        let owner = self.resolve_root(start).await?;
        tracing::info!(
            "BFS {} from vertex {} ({:?}) on location {}",
            self.inner.object,
            start,
            direction,
            ctx.id()
        );

        if owner == ctx.id() {
            self.inner.accept(Discovery {
                gid: start,
                parent: None,
                depth: 0,
                direction,
                mode: Mode::Breadth,
            });
        }
        self.run_layers().await
    }

    /// Collective: breadth-first traversal from every vertex not reached by an
    /// earlier root. Returns the number of roots started, cluster-wide.
    ///
    /// Roots are picked one at a time: every location offers its first
    /// unvisited vertex, the offer of the lowest location wins, and a whole
    /// layered traversal runs from it before the next pick.
    pub async fn bfs_all(&self, direction: Direction) -> Result<u64> {
        let ctx = &self.inner.ctx;
        self.graph.vertices().ensure_current().await?;

        let local = self.graph.local_vertices();
        let mut cursor = 0;
        let mut roots = 0;
        loop {
            // Colors only ever get added, so skipped vertices stay skipped.
            while cursor < local.len() && self.inner.color(local[cursor], direction).is_some() {
                cursor += 1;
            }
            let offers = ctx.all_gather(&local.get(cursor).copied()).await?;
            let Some((owner, root)) = offers
                .iter()
                .enumerate()
                .find_map(|(location, offer)| offer.map(|gid| (location, gid)))
            else {
                break;
            };

            roots += 1;
            tracing::debug!("BFS {} root {} is vertex {} on location {}", self.inner.object, roots, root, owner);
            if owner == ctx.id() {
                self.inner.accept(Discovery {
                    gid: root,
                    parent: None,
                    depth: 0,
                    direction,
                    mode: Mode::Breadth,
                });
            }
            self.run_layers().await?;
        }

        tracing::info!("BFS {} covered the graph from {} root(s)", self.inner.object, roots);
        Ok(roots)
    }

    /// Collective: depth-first traversal from `start`. Discovery and finish
    /// times count from zero; returns the final time.
    pub async fn dfs(&self, start: Gid, direction: Direction) -> Result<u64> {
        let ctx = &self.inner.ctx;
        let owner = self.resolve_root(start).await?;
        tracing::info!(
            "DFS {} from vertex {} ({:?}) on location {}",
            self.inner.object,
            start,
            direction,
            ctx.id()
        );

        if owner == ctx.id()
            && let Err(e) = self.inner.dfs_root(start, direction, 0)
        {
            ctx.report_fault(e.to_string());
        }
        ctx.fence().await?;

        let time = (owner == ctx.id()).then(|| self.inner.dfs_time());
        Ok(ctx.broadcast(owner, time.as_ref()).await?)
    }

    /// Collective: depth-first traversal from every unvisited vertex, with one
    /// clock across all roots. Returns the final time.
    pub async fn dfs_all(&self, direction: Direction) -> Result<u64> {
        let ctx = &self.inner.ctx;
        self.graph.vertices().ensure_current().await?;

        let mut time = if ctx.id() == 0 {
            0
        } else {
            self.inner.wait_token().await?
        };
        tracing::debug!("Location {} holds the DFS token at time {}", ctx.id(), time);

        for gid in self.graph.local_vertices() {
            if self.inner.color(gid, direction).is_some() {
                continue;
            }
            if let Err(e) = self.inner.dfs_root(gid, direction, time) {
                ctx.report_fault(e.to_string());
            }
            // The cursor may wander off; it is home again once nothing is in flight.
            ctx.quiesce().await;
            time = self.inner.dfs_time();
        }
        self.inner.pass_token(time)?;

        let total = self.broadcast_from_last(time).await?;
        ctx.fence().await?;
        tracing::info!("DFS {} finished at time {}", self.inner.object, total);
        Ok(total)
    }

    /// Collective: visits each vertex after all vertices it depends on
    /// (sources of its incoming edges for `Forward`, targets of its outgoing
    /// edges for `Reverse`). Returns how many vertices were never released,
    /// which is non-zero only when the graph has a cycle.
    pub async fn topological(&self, direction: Direction) -> Result<usize> {
        let ctx = &self.inner.ctx;
        self.graph.vertices().ensure_current().await?;
        let local = self.graph.local_vertices();

        self.inner.init_counters(&local, direction);
        self.topology_fence().await?;

        let mut dependencies = Vec::new();
        for &gid in &local {
            if let Some(targets) = self.inner.vertices.with_local(gid, |v| v.neighbors(direction)) {
                dependencies.extend(targets.into_iter().map(|target| (gid, target)));
            }
        }
        for (source, target) in dependencies {
            if let Err(e) = self.inner.count_dependency(source, target, direction) {
                ctx.report_fault(e.to_string());
            }
        }
        self.topology_fence().await?;

        let seeds = self.inner.ready(&local, direction);
        tracing::info!(
            "Topological traversal {} on location {}: {} source vertex(es)",
            self.inner.object,
            ctx.id(),
            seeds.len()
        );
        for gid in seeds {
            self.inner.accept(Discovery {
                gid,
                parent: None,
                depth: 0,
                direction,
                mode: Mode::Topological,
            });
        }
        if let Err(e) = self.inner.drain() {
            ctx.report_fault(e.to_string());
        }
        self.topology_fence().await?;

        let blocked = self.inner.blocked(&local, direction);
        if blocked > 0 {
            tracing::warn!(
                "{} vertex(es) on location {} still wait for dependencies; the graph has a cycle",
                blocked,
                ctx.id()
            );
        }
        Ok(ctx.all_reduce_sum(blocked as u64).await? as usize)
    }

    /// Collective: forgets all colors, counters and queued work.
    pub async fn reset(&self) -> Result<()> {
        let ctx = &self.inner.ctx;
        ctx.fence().await?;
        self.inner.reset_local();
        ctx.barrier().await;
        Ok(())
    }

    /// Collective: runs breadth-first layers until no location has a frontier.
    /// Every vertex of a layer is processed before any vertex of the next, so
    /// a vertex's depth is its distance from the root.
    async fn run_layers(&self) -> Result<()> {
        let ctx = &self.inner.ctx;
        let mut depth = 0;
        loop {
            let local = self.inner.advance_layer();
            let layer = ctx.all_reduce_sum(local as u64).await?;
            if layer == 0 {
                return Ok(());
            }
            tracing::debug!("BFS {} layer {}: {} vertex(es)", self.inner.object, depth, layer);
            if let Err(e) = self.inner.drain() {
                ctx.report_fault(e.to_string());
            }
            ctx.fence().await?;
            depth += 1;
        }
    }

    async fn resolve_root(&self, start: Gid) -> Result<LocationId> {
        self.graph.vertices().ensure_current().await?;
        let location = self.graph.vertices().locate_cached(start);
        if !location.is_valid() {
            return Err(ContainerError::NotFound(start));
        }
        Ok(location.pid)
    }

    async fn broadcast_from_last(&self, value: u64) -> Result<u64> {
        let ctx = &self.inner.ctx;
        let last = ctx.count() - 1;
        let mine = (ctx.id() == last).then_some(value);
        Ok(ctx.broadcast(last, mine.as_ref()).await?)
    }

    async fn topology_fence(&self) -> Result<()> {
        self.inner.ctx.fence().await.map_err(|e| match e {
            RmiError::AsyncFault { message, .. } => ContainerError::TopologyFault(message),
            other => other.into(),
        })
    }
}
