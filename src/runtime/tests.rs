//! Runtime Module Tests
//!
//! Exercises the in-process RMI substrate with real multi-location clusters.
//!
//! ## Test Scopes
//! - **Registry**: Registration, dispatch, unknown endpoints.
//! - **Point-to-point**: Sync round trips, async FIFO delivery, fault propagation.
//! - **Collectives**: Fence quiescence, gather, broadcast, reduce.

#[cfg(test)]
mod tests {
    use crate::config::RuntimeConfig;
    use crate::error::{ContainerError, RmiError};
    use crate::runtime::{Cluster, HandlerRegistry};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn config(locations: usize) -> RuntimeConfig {
        RuntimeConfig::default().with_locations(locations)
    }

    // ============================================================
    // REGISTRY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_registry_dispatches_typed_handler() {
        let registry = HandlerRegistry::new();
        registry.register_fn(7, "double", |_source, value: u32| Ok(value * 2));

        assert!(registry.has_handler(7, "double"));
        assert_eq!(registry.handler_count(), 1);

        let payload = bincode::serialize(&21u32).unwrap();
        let reply = registry.dispatch(7, "double", 0, payload).await.unwrap();
        let decoded: u32 = bincode::deserialize(&reply).unwrap();
        assert_eq!(decoded, 42);
    }

    #[tokio::test]
    async fn test_registry_unknown_endpoint() {
        let registry = HandlerRegistry::new();
        let result = registry.dispatch(1, "missing", 0, Vec::new()).await;

        assert!(matches!(
            result,
            Err(ContainerError::Rmi(RmiError::UnknownEndpoint { object: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn test_unregister_object_drops_only_its_handlers() {
        let registry = HandlerRegistry::new();
        registry.register_fn(1, "a", |_s, v: u8| Ok(v));
        registry.register_fn(1, "b", |_s, v: u8| Ok(v));
        registry.register_fn(2, "a", |_s, v: u8| Ok(v));

        registry.unregister_object(1);

        assert_eq!(registry.handler_count(), 1);
        assert!(registry.has_handler(2, "a"));
        assert!(!registry.has_handler(1, "a"));
    }

    // ============================================================
    // POINT-TO-POINT TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sync_call_reaches_every_location() {
        let results = Cluster::run(config(3), |ctx| async move {
            let object = ctx.register_object();
            let me = ctx.id();
            ctx.registry()
                .register_fn(object, "whoami", move |source, tag: u64| Ok((me, source, tag)));
            ctx.barrier().await;

            let mut seen = Vec::new();
            for dest in 0..ctx.count() {
                let reply: (usize, usize, u64) =
                    ctx.send_sync(dest, object, "whoami", &99u64).await.unwrap();
                seen.push(reply);
            }
            ctx.barrier().await;
            seen
        })
        .await
        .unwrap();

        for (caller, seen) in results.iter().enumerate() {
            for (dest, (answered_by, source, tag)) in seen.iter().enumerate() {
                assert_eq!(*answered_by, dest);
                assert_eq!(*source, caller);
                assert_eq!(*tag, 99);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_async_messages_are_fifo_per_pair() {
        let results = Cluster::run(config(2), |ctx| async move {
            let object = ctx.register_object();
            let log = Arc::new(Mutex::new(Vec::new()));
            let sink = log.clone();
            ctx.registry().register_fn(object, "append", move |_source, value: u32| {
                sink.lock().push(value);
                Ok(())
            });
            ctx.barrier().await;

            if ctx.id() == 0 {
                for value in 0..500u32 {
                    ctx.send_async(1, object, "append", &value).unwrap();
                }
            }
            ctx.fence().await.unwrap();

            let received = log.lock().clone();
            received
        })
        .await
        .unwrap();

        assert!(results[0].is_empty());
        assert_eq!(results[1], (0..500).collect::<Vec<u32>>(), "Delivery order must match send order");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_invalid_destination_is_rejected_before_send() {
        let results = Cluster::run(config(2), |ctx| async move {
            let sync: Result<u32, RmiError> = ctx.send_sync(5, 0, "anything", &()).await;
            let async_result = ctx.send_async(2, 0, "anything", &());
            ctx.fence().await.unwrap();
            (
                matches!(sync, Err(RmiError::InvalidLocation(5))),
                matches!(async_result, Err(RmiError::InvalidLocation(2))),
            )
        })
        .await
        .unwrap();

        assert!(results.iter().all(|(a, b)| *a && *b));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_remote_fault_propagates_to_sync_caller() {
        let results = Cluster::run(config(2), |ctx| async move {
            let object = ctx.register_object();
            ctx.registry()
                .register_fn(object, "fail", |_source, gid: u64| -> Result<(), ContainerError> {
                    Err(ContainerError::NotFound(gid))
                });
            ctx.barrier().await;

            let peer = (ctx.id() + 1) % ctx.count();
            let outcome: Result<(), RmiError> = ctx.send_sync(peer, object, "fail", &17u64).await;
            ctx.barrier().await;
            match outcome {
                Err(RmiError::Remote { location, message }) => Some((location, message)),
                _ => None,
            }
        })
        .await
        .unwrap();

        let (location, message) = results[0].clone().expect("remote fault expected");
        assert_eq!(location, 1);
        assert!(message.contains("17"), "Fault text should name the element: {}", message);
    }

    // ============================================================
    // COLLECTIVE TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fence_waits_for_nested_async_messages() {
        let results = Cluster::run(config(4), |ctx| async move {
            let object = ctx.register_object();
            let hits = Arc::new(Mutex::new(0u32));
            let counter = hits.clone();
            let weak_ctx = Arc::downgrade(&ctx);
            ctx.registry().register_fn(object, "relay", move |_source, hops: u32| {
                *counter.lock() += 1;
                if hops > 0
                    && let Some(ctx) = weak_ctx.upgrade()
                {
                    let next = (ctx.id() + 1) % ctx.count();
                    ctx.send_async(next, object, "relay", &(hops - 1))?;
                }
                Ok(())
            });
            ctx.barrier().await;

            if ctx.id() == 0 {
                ctx.send_async(1, object, "relay", &11u32).unwrap();
            }
            ctx.fence().await.unwrap();
            let total = *hits.lock();
            total
        })
        .await
        .unwrap();

        assert_eq!(results.iter().sum::<u32>(), 12, "All hops must finish before the fence returns");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_async_fault_reported_by_fence_everywhere() {
        let results = Cluster::run(config(3), |ctx| async move {
            let object = ctx.register_object();
            ctx.registry()
                .register_fn(object, "explode", |_source, _: ()| -> Result<(), ContainerError> {
                    Err(ContainerError::TopologyFault("counter already zero".into()))
                });
            ctx.barrier().await;

            if ctx.id() == 2 {
                ctx.send_async(0, object, "explode", &()).unwrap();
            }
            let first = ctx.fence().await;
            let second = ctx.fence().await;
            (first.is_err(), second.is_ok())
        })
        .await
        .unwrap();

        for (failed, recovered) in results {
            assert!(failed, "Every location must observe the fault");
            assert!(recovered, "Faults are reported once");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gather_broadcast_reduce() {
        let results = Cluster::run(config(4), |ctx| async move {
            let gathered = ctx.all_gather(&(ctx.id() as u64 * 10)).await.unwrap();
            let root_value = format!("from {}", ctx.id());
            let broadcast: String = ctx
                .broadcast(2, (ctx.id() == 2).then_some(&root_value))
                .await
                .unwrap();
            let sum = ctx.all_reduce_sum(ctx.id() as u64 + 1).await.unwrap();
            (gathered, broadcast, sum)
        })
        .await
        .unwrap();

        for (gathered, broadcast, sum) in results {
            assert_eq!(gathered, vec![0, 10, 20, 30]);
            assert_eq!(broadcast, "from 2");
            assert_eq!(sum, 10);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_object_ids_agree_across_locations() {
        let results = Cluster::run(config(3), |ctx| async move {
            (ctx.register_object(), ctx.register_object())
        })
        .await
        .unwrap();

        assert!(results.iter().all(|ids| *ids == (0, 1)));
    }
}
