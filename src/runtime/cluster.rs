//! Cluster bootstrap and the per-location messaging context.

use super::registry::HandlerRegistry;
use super::types::{Fault, Message, ObjectId, Request};
use crate::config::RuntimeConfig;
use crate::distribution::types::LocationId;
use crate::error::RmiError;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Barrier, Notify, mpsc, oneshot};
use tokio::task::JoinHandle;

/// State visible to every location of one cluster run.
struct ClusterShared {
    config: RuntimeConfig,
    sync_lanes: Vec<mpsc::UnboundedSender<Request>>,
    async_lanes: Vec<mpsc::UnboundedSender<Message>>,
    barrier: Barrier,
    /// Asynchronous messages sent but not yet fully handled, cluster-wide.
    in_flight: AtomicUsize,
    quiescent: Notify,
    faults: Mutex<Vec<Fault>>,
    /// Faults of the last completed fence, published by location 0.
    fence_report: Mutex<Vec<Fault>>,
    slots: Mutex<Vec<Option<Vec<u8>>>>,
}

impl ClusterShared {
    fn record_fault(&self, location: LocationId, message: String) {
        self.faults.lock().push(Fault { location, message });
    }

    fn complete_async(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.quiescent.notify_waiters();
        }
    }
}

pub struct Cluster;

impl Cluster {
    /// Runs `body` once per location and returns the results ordered by location id.
    ///
    /// Every location must execute the same sequence of collective operations
    /// (object construction, `fence`, `update`, traversals), otherwise the
    /// barriers underneath them never release.
    pub async fn run<F, Fut, R>(config: RuntimeConfig, body: F) -> Result<Vec<R>, RmiError>
    where
        F: Fn(Arc<LocationContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let locations = config.locations.max(1);
        let mut sync_rxs = Vec::with_capacity(locations);
        let mut async_rxs = Vec::with_capacity(locations);
        let mut sync_lanes = Vec::with_capacity(locations);
        let mut async_lanes = Vec::with_capacity(locations);

        for _ in 0..locations {
            let (sync_tx, sync_rx) = mpsc::unbounded_channel();
            let (async_tx, async_rx) = mpsc::unbounded_channel();
            sync_lanes.push(sync_tx);
            async_lanes.push(async_tx);
            sync_rxs.push(sync_rx);
            async_rxs.push(async_rx);
        }

        let shared = Arc::new(ClusterShared {
            config,
            sync_lanes,
            async_lanes,
            barrier: Barrier::new(locations),
            in_flight: AtomicUsize::new(0),
            quiescent: Notify::new(),
            faults: Mutex::new(Vec::new()),
            fence_report: Mutex::new(Vec::new()),
            slots: Mutex::new(vec![None; locations]),
        });

        tracing::info!("Starting cluster with {} location(s)", locations);

        let body = Arc::new(body);
        let mut dispatchers: Vec<JoinHandle<()>> = Vec::with_capacity(locations * 2);
        let mut bodies = Vec::with_capacity(locations);

        for (id, (sync_rx, async_rx)) in sync_rxs.into_iter().zip(async_rxs).enumerate() {
            let registry = HandlerRegistry::new();

            dispatchers.push(tokio::spawn(serve_sync(id, registry.clone(), sync_rx)));
            dispatchers.push(tokio::spawn(serve_async(
                id,
                shared.clone(),
                registry.clone(),
                async_rx,
            )));

            let ctx = Arc::new(LocationContext {
                id,
                shared: shared.clone(),
                registry,
                next_object: AtomicU64::new(0),
            });
            let body = body.clone();
            bodies.push(tokio::spawn(async move { body(ctx).await }));
        }

        let mut results = Vec::with_capacity(locations);
        let mut failure = None;
        for (id, handle) in bodies.into_iter().enumerate() {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!("Location {} terminated abnormally: {}", id, e);
                    failure.get_or_insert(RmiError::LocationPanicked(id));
                }
            }
        }

        for dispatcher in dispatchers {
            dispatcher.abort();
        }

        match failure {
            Some(err) => Err(err),
            None => {
                tracing::info!("Cluster finished");
                Ok(results)
            }
        }
    }
}

async fn serve_sync(
    id: LocationId,
    registry: Arc<HandlerRegistry>,
    mut rx: mpsc::UnboundedReceiver<Request>,
) {
    while let Some(request) = rx.recv().await {
        let registry = registry.clone();
        tokio::spawn(async move {
            let result = registry
                .dispatch(request.object, request.endpoint, request.source, request.payload)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Sync handler '{}' on location {} failed: {}",
                        request.endpoint,
                        id,
                        e
                    );
                    e.to_string()
                });
            // The caller may have given up; nothing to do then.
            let _ = request.reply.send(result);
        });
    }
}

async fn serve_async(
    id: LocationId,
    shared: Arc<ClusterShared>,
    registry: Arc<HandlerRegistry>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = registry
            .dispatch(message.object, message.endpoint, message.source, message.payload)
            .await
        {
            tracing::error!(
                "Async handler '{}' on location {} failed: {}",
                message.endpoint,
                id,
                e
            );
            shared.record_fault(id, e.to_string());
        }
        shared.complete_async();
    }
}

/// Handle a location's code uses to reach the rest of the cluster.
pub struct LocationContext {
    id: LocationId,
    shared: Arc<ClusterShared>,
    registry: Arc<HandlerRegistry>,
    next_object: AtomicU64,
}

impl LocationContext {
    pub fn id(&self) -> LocationId {
        self.id
    }

    pub fn count(&self) -> usize {
        self.shared.sync_lanes.len()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Allocates the id of a new distributed object.
    ///
    /// Ids come from a per-location counter, so they agree across locations as
    /// long as every location constructs its distributed objects in the same order.
    pub fn register_object(&self) -> ObjectId {
        self.next_object.fetch_add(1, Ordering::SeqCst)
    }

    fn check_dest(&self, dest: LocationId) -> Result<(), RmiError> {
        if dest >= self.count() {
            tracing::error!("Location {} addressed location {} out of {}", self.id, dest, self.count());
            return Err(RmiError::InvalidLocation(dest));
        }
        Ok(())
    }

    /// Invokes `endpoint` on `dest` and waits for its reply.
    pub async fn send_sync<A, R>(
        &self,
        dest: LocationId,
        object: ObjectId,
        endpoint: &'static str,
        args: &A,
    ) -> Result<R, RmiError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.check_dest(dest)?;
        let payload = bincode::serialize(args)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        self.shared.sync_lanes[dest]
            .send(Request {
                source: self.id,
                object,
                endpoint,
                payload,
                reply: reply_tx,
            })
            .map_err(|_| RmiError::Disconnected(dest))?;

        let bytes = reply_rx
            .await
            .map_err(|_| RmiError::Disconnected(dest))?
            .map_err(|message| RmiError::Remote {
                location: dest,
                message,
            })?;

        Ok(bincode::deserialize(&bytes)?)
    }

    /// Queues `endpoint` on `dest` without waiting. Messages from one location
    /// to another are handled in the order they were sent.
    pub fn send_async<A>(
        &self,
        dest: LocationId,
        object: ObjectId,
        endpoint: &'static str,
        args: &A,
    ) -> Result<(), RmiError>
    where
        A: Serialize,
    {
        self.check_dest(dest)?;
        let payload = bincode::serialize(args)?;

        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let sent = self.shared.async_lanes[dest].send(Message {
            source: self.id,
            object,
            endpoint,
            payload,
        });

        if sent.is_err() {
            self.shared.complete_async();
            return Err(RmiError::Disconnected(dest));
        }
        Ok(())
    }

    /// Records a fault that the next `fence` reports on every location.
    pub fn report_fault(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("Location {} reported fault: {}", self.id, message);
        self.shared.record_fault(self.id, message);
    }

    pub async fn barrier(&self) {
        self.shared.barrier.wait().await;
    }

    /// Waits until no asynchronous message is in flight anywhere. Not a
    /// collective: callers use it when they know they are the only producer.
    pub async fn quiesce(&self) {
        loop {
            let notified = self.shared.quiescent.notified();
            if self.shared.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Collective: returns once every asynchronous message sent before the
    /// fence, and everything those messages sent in turn, has been handled.
    pub async fn fence(&self) -> Result<(), RmiError> {
        self.barrier().await;
        self.quiesce().await;
        self.barrier().await;

        // Every location is parked between these barriers, so no new fault can appear.
        if self.id == 0 {
            let faults = std::mem::take(&mut *self.shared.faults.lock());
            *self.shared.fence_report.lock() = faults;
        }
        self.barrier().await;

        let report = self.shared.fence_report.lock();
        match report.first() {
            Some(first) => Err(RmiError::AsyncFault {
                location: first.location,
                message: first.message.clone(),
                count: report.len(),
            }),
            None => Ok(()),
        }
    }

    /// Collective: every location contributes one value and receives all of them.
    pub async fn all_gather<T>(&self, value: &T) -> Result<Vec<T>, RmiError>
    where
        T: Serialize + DeserializeOwned,
    {
        let bytes = bincode::serialize(value)?;
        self.shared.slots.lock()[self.id] = Some(bytes);
        self.barrier().await;

        let gathered = {
            let slots = self.shared.slots.lock();
            slots
                .iter()
                .enumerate()
                .map(|(pid, slot)| -> Result<T, RmiError> {
                    let bytes = slot.as_ref().ok_or(RmiError::Collective(pid))?;
                    Ok(bincode::deserialize(bytes)?)
                })
                .collect::<Result<Vec<T>, RmiError>>()
        };
        self.barrier().await;

        gathered
    }

    /// Collective: every location receives the value `root` passed in.
    pub async fn broadcast<T>(&self, root: LocationId, value: Option<&T>) -> Result<T, RmiError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.check_dest(root)?;
        if self.id == root {
            let bytes = match value {
                Some(value) => Some(bincode::serialize(value)?),
                None => None,
            };
            self.shared.slots.lock()[root] = bytes;
        }
        self.barrier().await;

        let received = {
            let slots = self.shared.slots.lock();
            match slots[root].as_ref() {
                Some(bytes) => bincode::deserialize(bytes).map_err(RmiError::from),
                None => Err(RmiError::Collective(root)),
            }
        };
        self.barrier().await;

        received
    }

    /// Collective sum over all locations.
    pub async fn all_reduce_sum(&self, value: u64) -> Result<u64, RmiError> {
        Ok(self.all_gather(&value).await?.into_iter().sum())
    }
}
