//! RMI handlers for the containers.
//!
//! Each handler holds a weak reference to its container, performs the local
//! half of an operation on the owner and replies with its outcome. Lookup
//! misses are replied as `None`/`false`, not as faults.

use super::Element;
use super::collection::CollectionInner;
use super::protocol::*;
use super::vector::VectorInner;
use crate::distribution::{Location, RangeEntry};
use crate::error::ContainerError;
use crate::runtime::registry::upgrade;

use std::sync::Arc;

pub(crate) fn register_vector_handlers<T: Element>(inner: &Arc<VectorInner<T>>) {
    let registry = inner.ctx.registry();
    let object = inner.object;

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_GET, move |_source, req: IndexRequest| {
        Ok(upgrade(&weak, object)?.get_local(req.index))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_SET, move |_source, req: IndexValue<T>| {
        Ok(upgrade(&weak, object)?.set_local(req.index, req.value))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_SET_ASYNC, move |source, req: IndexValue<T>| {
        let index = req.index;
        if upgrade(&weak, object)?.set_local(index, req.value) {
            Ok(())
        } else {
            tracing::warn!("SET_ASYNC from location {}: index {} is not here", source, index);
            Err(ContainerError::NotFound(index as u64))
        }
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_INSERT, move |_source, req: IndexValue<T>| {
        Ok(upgrade(&weak, object)?.insert_local(req.index, req.value))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_ERASE, move |_source, req: IndexRequest| {
        Ok(upgrade(&weak, object)?.erase_local(req.index))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_PUSH_BACK, move |_source, req: PushBackRequest<T>| {
        Ok(upgrade(&weak, object)?.push_back_local(req.part, req.value))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_CHAIN_OFFSET, move |_source, req: ChainOffset| {
        upgrade(&weak, object)?.settle_offset(req.part, req.offset)
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_APPEND_RANGES, move |_source, rows: Vec<RangeEntry>| {
        upgrade(&weak, object)?.append_ranges(rows);
        Ok(())
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_SET_PREV, move |_source, req: SetPrev| {
        upgrade(&weak, object)?.set_prev(req.part, req.prev)
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, VECTOR_RECEIVE_SLICES, move |source, slices: Vec<Slice<T>>| {
        tracing::debug!("Received {} slice(s) from location {}", slices.len(), source);
        upgrade(&weak, object)?.receive_slices(slices);
        Ok(())
    });
}

pub(crate) fn register_collection_handlers<T: Element>(inner: &Arc<CollectionInner<T>>) {
    let registry = inner.ctx.registry();
    let object = inner.object;

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, COLLECTION_GET, move |_source, req: GidRequest| {
        Ok(upgrade(&weak, object)?.get_local(req.gid))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, COLLECTION_SET, move |_source, req: GidValue<T>| {
        Ok(upgrade(&weak, object)?.set_local(req.gid, req.value))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, COLLECTION_DELETE, move |_source, req: GidRequest| {
        Ok(upgrade(&weak, object)?.delete_local(req.gid))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, COLLECTION_FIND, move |_source, req: GidRequest| {
        Ok(upgrade(&weak, object)?.local_location(req.gid))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, COLLECTION_HOME_CLAIM, move |_source, req: HomeRecord| {
        Ok(upgrade(&weak, object)?.claim_home(req.gid, req.location))
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(object, COLLECTION_HOME_FORGET, move |_source, req: GidRequest| {
        upgrade(&weak, object)?.forget_home(req.gid);
        Ok(())
    });

    let weak = Arc::downgrade(inner);
    registry.register_fn(
        object,
        COLLECTION_HOME_LOOKUP,
        move |_source, req: GidRequest| -> Result<Option<Location>, ContainerError> {
            Ok(upgrade(&weak, object)?.home_lookup(req.gid))
        },
    );
}
