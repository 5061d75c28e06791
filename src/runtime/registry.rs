//! Handler Registry
//!
//! Maps `(object, endpoint)` pairs to type-erased async handlers. Payloads
//! arrive bincode-encoded; the typed wrappers decode arguments and encode
//! replies so distributed objects only deal with their own DTOs.

use super::types::ObjectId;
use crate::distribution::types::LocationId;
use crate::error::{ContainerError, RmiError};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, ContainerError>> + Send>>;

/// Type-erased handler: source location and encoded arguments in, encoded reply out.
pub type HandlerFn = Arc<dyn Fn(LocationId, Vec<u8>) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<(ObjectId, &'static str), HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an async handler for `endpoint` on `object`.
    pub fn register<A, R, F, Fut>(&self, object: ObjectId, endpoint: &'static str, handler: F)
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(LocationId, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ContainerError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let handler_fn: HandlerFn = Arc::new(move |source: LocationId, payload: Vec<u8>| {
            let handler = handler.clone();
            Box::pin(async move {
                let args: A = bincode::deserialize(&payload)?;
                let reply = handler(source, args).await?;
                Ok(bincode::serialize(&reply)?)
            }) as HandlerFuture
        });

        self.handlers.insert((object, endpoint), handler_fn);
        tracing::debug!("Registered handler '{}' for object {}", endpoint, object);
    }

    /// Registers a handler whose body never awaits.
    pub fn register_fn<A, R, F>(&self, object: ObjectId, endpoint: &'static str, handler: F)
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(LocationId, A) -> Result<R, ContainerError> + Send + Sync + 'static,
    {
        self.register(object, endpoint, move |source, args: A| {
            std::future::ready(handler(source, args))
        });
    }

    /// Runs the handler registered for `(object, endpoint)`.
    pub async fn dispatch(
        &self,
        object: ObjectId,
        endpoint: &'static str,
        source: LocationId,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, ContainerError> {
        // Clone out of the map so no shard lock is held across the await.
        let handler_fn = match self.handlers.get(&(object, endpoint)) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::error!("Unknown handler '{}' for object {}", endpoint, object);
                return Err(RmiError::UnknownEndpoint {
                    object,
                    endpoint: endpoint.to_string(),
                }
                .into());
            }
        };

        handler_fn(source, payload).await
    }

    /// Drops every handler of `object`.
    pub fn unregister_object(&self, object: ObjectId) {
        self.handlers.retain(|(owner, _), _| *owner != object);
        tracing::debug!("Unregistered handlers of object {}", object);
    }

    pub fn has_handler(&self, object: ObjectId, endpoint: &str) -> bool {
        self.handlers
            .iter()
            .any(|entry| entry.key().0 == object && entry.key().1 == endpoint)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Upgrades the weak back-reference a handler closure keeps to its object.
pub fn upgrade<T>(weak: &std::sync::Weak<T>, object: ObjectId) -> Result<Arc<T>, ContainerError> {
    weak.upgrade()
        .ok_or_else(|| RmiError::ObjectDropped(object).into())
}
