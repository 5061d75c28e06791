//! RMI handlers for graphs and traversals.

use super::protocol::*;
use super::traversal::TraversalInner;
use super::types::{Vertex, Visitor};
use crate::container::Element;
use crate::container::collection::CollectionInner;
use crate::container::protocol::GidRequest;
use crate::runtime::registry::upgrade;

use std::sync::Arc;

pub(crate) fn register_graph_handlers<V: Element, W: Element>(inner: &Arc<CollectionInner<Vertex<V, W>>>) {
    let registry = inner.ctx.registry();
    let object = inner.object;

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, GRAPH_ADD_EDGE, move |_source, req: EdgeRequest<W>| {
        Ok(upgrade(&weak, object)?.add_edge_local(req.source, req.edge))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, GRAPH_DELETE_EDGE, move |_source, key: EdgeKey| {
        Ok(upgrade(&weak, object)?.delete_edge_local(key.source, key.target))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, GRAPH_IS_EDGE, move |_source, key: EdgeKey| {
        Ok(upgrade(&weak, object)?.is_edge_local(key.source, key.target))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, GRAPH_ADJACENT, move |_source, req: GidRequest| {
        Ok(upgrade(&weak, object)?.adjacent_local(req.gid))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, GRAPH_PREDS, move |_source, req: GidRequest| {
        Ok(upgrade(&weak, object)?.preds_local(req.gid))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, GRAPH_ADD_PRED, move |source, key: EdgeKey| {
        if !upgrade(&weak, object)?.add_pred_local(key.target, key.source) {
            tracing::warn!(
                "ADD_PRED from location {}: vertex {} is not here",
                source,
                key.target
            );
        }
        Ok(())
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, GRAPH_DROP_EDGES_TO, move |source, req: GidRequest| {
        let removed = upgrade(&weak, object)?.drop_edges_to_local(req.gid);
        tracing::debug!(
            "Dropped {} edge(s) to vertex {} deleted by location {}",
            removed,
            req.gid,
            source
        );
        Ok(())
    });
}

pub(crate) fn register_traversal_handlers<V, W, Vis>(inner: &Arc<TraversalInner<V, W, Vis>>)
where
    V: Element,
    W: Element,
    Vis: Visitor<V, W>,
{
    let registry = inner.ctx.registry();
    let object = inner.object;

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, TRAVERSAL_DISCOVER, move |_source, work: Discovery| {
        upgrade(&weak, object)?.accept(work);
        Ok(())
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, TRAVERSAL_TOPO_INCREMENT, move |_source, update: CounterUpdate| {
        upgrade(&weak, object)?.increment(update)
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, TRAVERSAL_TOPO_DECREMENT, move |_source, work: Discovery| {
        let traversal = upgrade(&weak, object)?;
        traversal.decrement(work)?;
        traversal.drain()
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, TRAVERSAL_DFS_VISIT, move |source, visit: DfsVisit| {
        upgrade(&weak, object)?.dfs_visit(source, visit)
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, TRAVERSAL_DFS_RETURN, move |_source, ret: DfsReturn| {
        upgrade(&weak, object)?.dfs_return(ret)
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, TRAVERSAL_TOKEN, move |_source, token: Token| {
        upgrade(&weak, object)?.receive_token(token.counter);
        Ok(())
    });
}
