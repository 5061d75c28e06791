use crate::distribution::types::LocationId;
use tokio::sync::oneshot;

/// Identifier of a distributed object, identical on every location.
pub type ObjectId = u64;

/// Encoded reply of a synchronous request. Remote faults travel as text.
pub type Reply = Result<Vec<u8>, String>;

/// A synchronous request; the caller awaits `reply`.
pub struct Request {
    pub source: LocationId,
    pub object: ObjectId,
    pub endpoint: &'static str,
    pub payload: Vec<u8>,
    pub reply: oneshot::Sender<Reply>,
}

/// A fire-and-forget message, executed in arrival order on the destination.
pub struct Message {
    pub source: LocationId,
    pub object: ObjectId,
    pub endpoint: &'static str,
    pub payload: Vec<u8>,
}

/// Failure of an asynchronous handler, kept until the next fence.
#[derive(Debug, Clone)]
pub struct Fault {
    pub location: LocationId,
    pub message: String,
}
