// src/wire.rs
//! Wire frames exchanged between contexts
//!
//! Everything that crosses a context boundary is a `Frame`: a request or
//! response descriptor, a control sentinel (arm / fin / address), or a port
//! frame carrying a channel payload. Dispatchers match the tagged union
//! exhaustively instead of probing untyped payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::codec::{RequestDescriptor, ResponseDescriptor};

/// Identity of a channel endpoint.
///
/// Fresh ids are ULIDs; callers may also supply a name when two sides need to
/// rendezvous on a well-known endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(String);

impl EndpointId {
    /// Generate a fresh unique id
    pub fn fresh() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Use a caller-supplied name as the id
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id of one proxied request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Ulid);

impl RequestId {
    pub fn fresh() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Id grouping every pending entry spawned by one intercepted call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Ulid);

impl EventId {
    pub fn fresh() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reference to a transferred channel endpoint.
///
/// `id` names the endpoint the receiver adopts; `peer` is where its own sends
/// (pull signals) are addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyHandle {
    pub id: EndpointId,
    pub peer: EndpointId,
}

/// Payload carried by a port frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PortPayload {
    /// Raw body bytes.
    Chunk(Bytes),
    /// Reserved end-of-stream marker terminating a byte stream.
    Fin,
    /// Advisory pull signal from a consumer ready for `n` more bytes.
    Pull(u64),
}

/// A message crossing a context boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    /// A proxied request, host-bound.
    Request(RequestDescriptor),
    /// The answer to a proxied request, agent-bound.
    Response(ResponseDescriptor),
    /// Arm sentinel: activates interception; echoed back as the ready ack.
    Arm,
    /// Fin sentinel: deactivates interception; echoed back as the teardown ack.
    Fin,
    /// The address the host server is listening on.
    Address { host: String, port: u16 },
    /// Channel payload addressed to an endpoint.
    Port { to: EndpointId, payload: PortPayload },
}
