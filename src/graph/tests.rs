//! Graph Module Tests
//!
//! Builds small graphs spread over several locations and checks the
//! structural operations and every traversal protocol.
//!
//! ## Test Scopes
//! - **Structure**: Edges on remote vertices, undirected mirroring, deletion, predecessors.
//! - **BFS**: Single root, layer depths, reverse direction, pruning, whole-graph roots, reset.
//! - **DFS**: Edge classification and the travelling clock.
//! - **Topological**: Dependency order, cycles, fault reporting.

#[cfg(test)]
mod tests {
    use crate::config::RuntimeConfig;
    use crate::distribution::Gid;
    use crate::error::ContainerError;
    use crate::graph::protocol::{Discovery, Mode, TRAVERSAL_TOPO_DECREMENT};
    use crate::graph::{
        Direction, GraphKind, PGraph, Recorder, Traversal, Vertex, VisitControl, VisitState, Visitor,
    };
    use crate::runtime::{Cluster, LocationContext};
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    fn config(locations: usize) -> RuntimeConfig {
        RuntimeConfig::default().with_locations(locations)
    }

    /// Vertex `g` is stored on location `(g + 1) % P`, away from its GID home.
    fn placement(gid: Gid, locations: usize) -> usize {
        (gid as usize + 1) % locations
    }

    async fn build(
        ctx: Arc<LocationContext>,
        kind: GraphKind,
        vertices: &[Gid],
        edges: &[(Gid, Gid)],
    ) -> Result<PGraph<u32, u32>, ContainerError> {
        let graph = PGraph::new(ctx.clone(), kind).await?;
        for &gid in vertices {
            if placement(gid, ctx.count()) == ctx.id() {
                graph.add_vertex_with_gid(gid, gid as u32 * 10).await?;
            }
        }
        ctx.barrier().await;
        if ctx.id() == 0 {
            for &(source, dest) in edges {
                graph.add_edge(source, dest, 1).await?;
            }
        }
        ctx.barrier().await;
        Ok(graph)
    }

    fn merge(results: Vec<Result<Recorder, ContainerError>>) -> Recorder {
        let mut all = Recorder::default();
        for result in results {
            let part = result.unwrap();
            all.visits.extend(part.visits);
            all.finishes.extend(part.finishes);
            all.tree_edges.extend(part.tree_edges);
            all.back_edges.extend(part.back_edges);
            all.other_edges.extend(part.other_edges);
        }
        all
    }

    fn visits_by_gid(recorder: &Recorder) -> HashMap<Gid, VisitState> {
        let map: HashMap<Gid, VisitState> = recorder.visits.iter().copied().collect();
        assert_eq!(map.len(), recorder.visits.len(), "A vertex was visited twice");
        map
    }

    // ============================================================
    // STRUCTURE TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_edges_on_remote_vertices() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2, 3], &[(0, 1), (0, 2), (2, 3)]).await?;

            let adjacent = graph.get_adjacent_vertices(0).await?;
            let is_edge = graph.is_edge(2, 3).await?;
            let not_edge = graph.is_edge(3, 2).await?;
            let missing_source = graph.is_edge(42, 0).await?;
            let vertex = graph.get_vertex(2).await?;
            let counts = (graph.num_vertices().await?, graph.num_edges().await?);
            ctx.barrier().await;
            Ok::<_, ContainerError>((adjacent, is_edge, not_edge, missing_source, vertex.data, counts))
        })
        .await
        .unwrap();

        for result in results {
            let (adjacent, is_edge, not_edge, missing_source, data, counts) = result.unwrap();
            assert_eq!(adjacent, vec![1, 2]);
            assert!(is_edge);
            assert!(!not_edge);
            assert!(!missing_source, "A missing source vertex is a lookup miss, not an error");
            assert_eq!(data, 20);
            assert_eq!(counts, (4, 3));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_undirected_edges_are_mirrored() {
        let results = Cluster::run(config(2), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Undirected, &[0, 1, 2], &[(0, 1), (1, 2)]).await?;
            let mirrored = graph.is_edge(1, 0).await? && graph.is_edge(2, 1).await?;
            let before = graph.num_edges().await?;

            if ctx.id() == 1 {
                assert!(graph.delete_edge(1, 0).await?);
            }
            ctx.barrier().await;
            let after = graph.num_edges().await?;
            let gone = !graph.is_edge(0, 1).await?;
            ctx.barrier().await;
            Ok::<_, ContainerError>((mirrored, before, after, gone))
        })
        .await
        .unwrap();

        for result in results {
            assert_eq!(result.unwrap(), (true, 4, 2, true));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_delete_vertex_drops_incoming_edges() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2], &[(0, 1), (2, 1), (1, 2)]).await?;

            if ctx.id() == 0 {
                assert_eq!(graph.delete_vertex(1).await?, 10);
            }
            ctx.fence().await?;

            let vertex_gone = !graph.is_vertex(1).await?;
            let incoming_gone = !graph.is_edge(0, 1).await? && !graph.is_edge(2, 1).await?;
            let adjacent = graph.get_adjacent_vertices(2).await?;
            let counts = (graph.num_vertices().await?, graph.num_edges().await?);
            ctx.barrier().await;
            Ok::<_, ContainerError>((vertex_gone, incoming_gone, adjacent, counts))
        })
        .await
        .unwrap();

        for result in results {
            assert_eq!(result.unwrap(), (true, true, vec![], (2, 0)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_build_predecessors() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2, 3], &[(0, 2), (1, 2), (3, 2), (2, 0)]).await?;
            graph.build_predecessors().await?;

            let mut preds = graph.get_pred_vertices(2).await?;
            preds.sort_unstable();
            let of_zero = graph.get_pred_vertices(0).await?;
            let of_three = graph.get_pred_vertices(3).await?;
            ctx.barrier().await;
            Ok::<_, ContainerError>((preds, of_zero, of_three))
        })
        .await
        .unwrap();

        for result in results {
            assert_eq!(result.unwrap(), (vec![0, 1, 3], vec![2], vec![]));
        }
    }

    // ============================================================
    // BFS TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bfs_visits_each_reachable_vertex_once() {
        let results = Cluster::run(config(2), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2, 3, 4], &[(0, 1), (1, 2), (0, 3)]).await?;
            let recorder = graph.bfs(0, Direction::Forward, Recorder::default()).await?;
            ctx.barrier().await;
            Ok::<_, ContainerError>(recorder)
        })
        .await
        .unwrap();

        let all = merge(results);
        let visits = visits_by_gid(&all);
        let reached: HashSet<Gid> = visits.keys().copied().collect();
        assert_eq!(reached, HashSet::from([0, 1, 2, 3]), "Vertex 4 is unreachable");

        assert_eq!(visits[&0].depth, 0);
        assert_eq!(visits[&1].depth, 1);
        assert_eq!(visits[&3].depth, 1);
        assert_eq!(visits[&2].depth, 2);
        assert_eq!(visits[&2].parent, Some(1));
        for (gid, state) in &visits {
            if let Some(parent) = state.parent {
                assert_eq!(visits[&parent].depth + 1, state.depth, "Vertex {} is off its layer", gid);
            }
        }

        let tree: HashSet<(Gid, Gid)> = all.tree_edges.into_iter().collect();
        assert_eq!(tree, HashSet::from([(0, 1), (1, 2), (0, 3)]));
        assert_eq!(all.finishes.len(), 4);
    }

    /// Hop distances from `root`, computed on one thread.
    fn distances(root: Gid, edges: &[(Gid, Gid)]) -> HashMap<Gid, usize> {
        let mut depth = HashMap::from([(root, 0)]);
        let mut queue = std::collections::VecDeque::from([root]);
        while let Some(gid) = queue.pop_front() {
            for &(source, dest) in edges {
                if source == gid && !depth.contains_key(&dest) {
                    depth.insert(dest, depth[&gid] + 1);
                    queue.push_back(dest);
                }
            }
        }
        depth
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bfs_depth_is_shortest_distance_across_locations() {
        // 0, 2, 4, 6 and 8 share location 1, so the long chain to 8 never
        // leaves it while the short path through 1 crosses to location 0.
        let edges = [(0, 2), (2, 4), (4, 6), (6, 8), (0, 1), (1, 8)];
        let results = Cluster::run(config(2), move |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2, 4, 6, 8], &edges).await?;
            let recorder = graph.bfs(0, Direction::Forward, Recorder::default()).await?;
            ctx.barrier().await;
            Ok::<_, ContainerError>(recorder)
        })
        .await
        .unwrap();

        let visits = visits_by_gid(&merge(results));
        let expected = distances(0, &edges);
        assert_eq!(expected, HashMap::from([(0, 0), (1, 1), (2, 1), (4, 2), (8, 2), (6, 3)]));
        assert_eq!(visits.len(), expected.len());
        for (gid, state) in &visits {
            assert_eq!(state.depth, expected[gid], "Vertex {} is off its layer", gid);
            if let Some(parent) = state.parent {
                assert_eq!(visits[&parent].depth + 1, state.depth);
            }
        }
        assert_eq!(visits[&8].parent, Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_into_visitor_returns_what_was_recorded() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2, 3], &[(0, 1), (1, 2), (2, 3)]).await?;
            let traversal = Traversal::new(&graph, Recorder::default()).await?;
            traversal.bfs(0, Direction::Forward).await?;
            let seen = traversal.with_visitor(|r| r.visits.len());
            let recorder = traversal.into_visitor()?;
            ctx.barrier().await;
            Ok::<_, ContainerError>((seen, recorder.visits.len(), graph.local_vertices().len()))
        })
        .await
        .unwrap();

        for result in results {
            let (seen, returned, local) = result.unwrap();
            assert_eq!(seen, returned);
            assert_eq!(returned, local, "Each location visits exactly its own vertices");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reverse_bfs_follows_predecessors() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2, 3], &[(0, 1), (1, 2), (3, 2)]).await?;
            let recorder = graph.bfs(2, Direction::Reverse, Recorder::default()).await?;
            ctx.barrier().await;
            Ok::<_, ContainerError>(recorder)
        })
        .await
        .unwrap();

        let all = merge(results);
        let visits = visits_by_gid(&all);
        assert_eq!(visits.len(), 4);
        assert_eq!(visits[&0].depth, 2);
        assert_eq!(visits[&3].parent, Some(2));
        assert!(visits.values().all(|s| s.direction == Direction::Reverse));
    }

    struct StopAt {
        at: Gid,
        seen: Vec<Gid>,
    }

    impl Visitor<u32, u32> for StopAt {
        fn vertex(&mut self, vertex: &Vertex<u32, u32>, _state: &VisitState) -> VisitControl {
            self.seen.push(vertex.gid);
            if vertex.gid == self.at {
                VisitControl::Stop
            } else {
                VisitControl::Continue
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_prunes_the_subtree() {
        let results = Cluster::run(config(2), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2, 3], &[(0, 1), (1, 2), (0, 3)]).await?;
            let visitor = graph
                .bfs(0, Direction::Forward, StopAt { at: 1, seen: Vec::new() })
                .await?;
            ctx.barrier().await;
            Ok::<_, ContainerError>(visitor.seen)
        })
        .await
        .unwrap();

        let mut seen: Vec<Gid> = results.into_iter().flat_map(|r| r.unwrap()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bfs_all_counts_components() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(
                ctx.clone(),
                GraphKind::Undirected,
                &[0, 1, 2, 3, 4, 5],
                &[(0, 1), (1, 2), (3, 4)],
            )
            .await?;
            let traversal = Traversal::new(&graph, Recorder::default()).await?;
            let roots = traversal.bfs_all(Direction::Forward).await?;
            let recorder = traversal.into_visitor()?;
            ctx.barrier().await;
            Ok::<_, ContainerError>((roots, recorder))
        })
        .await
        .unwrap();

        let mut recorders = Vec::new();
        for result in results {
            let (roots, recorder) = result.unwrap();
            assert_eq!(roots, 3, "Every location must agree on the root count");
            recorders.push(Ok(recorder));
        }
        let all = merge(recorders);
        let visits = visits_by_gid(&all);
        assert_eq!(visits.len(), 6);
        assert_eq!(visits.values().filter(|s| s.parent.is_none()).count(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_colors_persist_until_reset() {
        let results = Cluster::run(config(2), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2], &[(0, 1), (1, 2)]).await?;
            let traversal = Traversal::new(&graph, Recorder::default()).await?;

            traversal.bfs(0, Direction::Forward).await?;
            let first = traversal.with_visitor(|r| r.visits.len());
            traversal.bfs(0, Direction::Forward).await?;
            let repeated = traversal.with_visitor(|r| r.visits.len());
            traversal.reset().await?;
            traversal.bfs(0, Direction::Forward).await?;
            let after_reset = traversal.with_visitor(|r| r.visits.len());

            let counts = ctx.all_gather(&(first, repeated, after_reset)).await?;
            ctx.barrier().await;
            Ok::<_, ContainerError>(counts)
        })
        .await
        .unwrap();

        let counts = results[0].as_ref().unwrap();
        let total = |pick: fn(&(usize, usize, usize)) -> usize| counts.iter().map(pick).sum::<usize>();
        assert_eq!(total(|c| c.0), 3);
        assert_eq!(total(|c| c.1), 3, "Visited vertices stay visited");
        assert_eq!(total(|c| c.2), 6);
    }

    // ============================================================
    // DFS TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dfs_cycle_has_one_back_edge() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2], &[(0, 1), (1, 2), (2, 0)]).await?;
            let traversal = Traversal::new(&graph, Recorder::default()).await?;
            let time = traversal.dfs(0, Direction::Forward).await?;
            let recorder = traversal.into_visitor()?;
            ctx.barrier().await;
            Ok::<_, ContainerError>((time, recorder))
        })
        .await
        .unwrap();

        let mut recorders = Vec::new();
        for result in results {
            let (time, recorder) = result.unwrap();
            assert_eq!(time, 6);
            recorders.push(Ok(recorder));
        }
        let all = merge(recorders);
        assert_eq!(all.back_edges, vec![(2, 0)]);
        assert!(all.other_edges.is_empty());

        let discovered = visits_by_gid(&all);
        assert_eq!(discovered[&0].time, 1);
        assert_eq!(discovered[&1].time, 2);
        assert_eq!(discovered[&2].time, 3);
        let finished: HashMap<Gid, u64> = all.finishes.iter().map(|(g, s)| (*g, s.time)).collect();
        assert_eq!(finished, HashMap::from([(2, 4), (1, 5), (0, 6)]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dfs_classifies_cross_edges() {
        let results = Cluster::run(config(2), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2], &[(0, 1), (0, 2), (2, 1)]).await?;
            let recorder = graph.dfs(0, Direction::Forward, Recorder::default()).await?;
            ctx.barrier().await;
            Ok::<_, ContainerError>(recorder)
        })
        .await
        .unwrap();

        let all = merge(results);
        assert!(all.back_edges.is_empty());
        assert_eq!(all.other_edges, vec![(2, 1)]);
        assert_eq!(all.tree_edges.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dfs_all_shares_one_clock() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(
                ctx.clone(),
                GraphKind::Directed,
                &[0, 1, 2, 3, 4],
                &[(0, 1), (2, 3), (3, 2)],
            )
            .await?;
            let traversal = Traversal::new(&graph, Recorder::default()).await?;
            let time = traversal.dfs_all(Direction::Forward).await?;
            let recorder = traversal.into_visitor()?;
            ctx.barrier().await;
            Ok::<_, ContainerError>((time, recorder))
        })
        .await
        .unwrap();

        let mut recorders = Vec::new();
        for result in results {
            let (time, recorder) = result.unwrap();
            assert_eq!(time, 10, "Two events per vertex");
            recorders.push(Ok(recorder));
        }
        let all = merge(recorders);
        let mut times: Vec<u64> = all
            .visits
            .iter()
            .chain(all.finishes.iter())
            .map(|(_, s)| s.time)
            .collect();
        times.sort_unstable();
        assert_eq!(times, (1..=10).collect::<Vec<u64>>(), "Times must be unique across locations");
        assert_eq!(all.back_edges.len(), 1);
    }

    // ============================================================
    // TOPOLOGICAL TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_topological_respects_dependencies() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(
                ctx.clone(),
                GraphKind::Directed,
                &[0, 1, 2, 3, 4],
                &[(0, 1), (1, 2), (0, 3), (3, 2), (2, 4)],
            )
            .await?;
            let traversal = Traversal::new(&graph, Recorder::default()).await?;
            let blocked = traversal.topological(Direction::Forward).await?;
            let recorder = traversal.into_visitor()?;
            ctx.barrier().await;
            Ok::<_, ContainerError>((blocked, recorder))
        })
        .await
        .unwrap();

        let mut recorders = Vec::new();
        for result in results {
            let (blocked, recorder) = result.unwrap();
            assert_eq!(blocked, 0);
            recorders.push(Ok(recorder));
        }
        let all = merge(recorders);
        let visits = visits_by_gid(&all);
        assert_eq!(visits.len(), 5);
        assert_eq!(visits[&0].parent, None);
        assert_eq!(visits[&1].parent, Some(0));
        assert!(matches!(visits[&2].parent, Some(1) | Some(3)));
        assert_eq!(visits[&4].parent, Some(2));
        assert!(visits[&4].depth > visits[&2].depth && visits[&2].depth > visits[&0].depth);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reverse_topological_starts_at_sinks() {
        let results = Cluster::run(config(2), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2], &[(0, 1), (1, 2)]).await?;
            let recorder = graph.topological(Direction::Reverse, Recorder::default()).await?;
            ctx.barrier().await;
            Ok::<_, ContainerError>(recorder)
        })
        .await
        .unwrap();

        let visits = visits_by_gid(&merge(results));
        assert_eq!(visits[&2].parent, None);
        assert_eq!(visits[&1].parent, Some(2));
        assert_eq!(visits[&0].parent, Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_topological_cycle_leaves_vertices_blocked() {
        let results = Cluster::run(config(2), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1, 2, 3], &[(0, 1), (1, 2), (2, 0), (3, 0)]).await?;
            let traversal = Traversal::new(&graph, Recorder::default()).await?;
            let blocked = traversal.topological(Direction::Forward).await?;
            let visited = traversal.into_visitor()?.visits.len();
            ctx.barrier().await;
            Ok::<_, ContainerError>((blocked, visited))
        })
        .await
        .unwrap();

        let mut visited = 0;
        for result in results {
            let (blocked, local) = result.unwrap();
            assert_eq!(blocked, 3);
            visited += local;
        }
        assert_eq!(visited, 1, "Only vertex 3 has no unmet dependency");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_topological_dangling_edge_is_a_fault() {
        let results = Cluster::run(config(3), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1], &[(0, 1), (1, 99)]).await?;
            let outcome = graph.topological(Direction::Forward, Recorder::default()).await;
            ctx.barrier().await;
            Ok::<_, ContainerError>(matches!(outcome, Err(ContainerError::TopologyFault(_))))
        })
        .await
        .unwrap();

        for result in results {
            assert!(result.unwrap(), "Every location must see the fault");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stray_decrement_is_a_fault() {
        let results = Cluster::run(config(2), |ctx| async move {
            let graph = build(ctx.clone(), GraphKind::Directed, &[0, 1], &[(0, 1)]).await?;
            let traversal = Traversal::new(&graph, Recorder::default()).await?;

            if ctx.id() == 0 {
                let stray = Discovery {
                    gid: 12_345,
                    parent: None,
                    depth: 0,
                    direction: Direction::Forward,
                    mode: Mode::Topological,
                };
                ctx.send_async(1, traversal.object_id(), TRAVERSAL_TOPO_DECREMENT, &stray)?;
            }
            let outcome = traversal.topological(Direction::Forward).await;
            ctx.barrier().await;
            Ok::<_, ContainerError>(matches!(outcome, Err(ContainerError::TopologyFault(_))))
        })
        .await
        .unwrap();

        for result in results {
            assert!(result.unwrap());
        }
    }
}
