// src/channel/stream.rs
//! Byte streams over channel pairs
//!
//! A producer pumps its chunks into one endpoint and terminates with the end
//! marker; the other endpoint is exposed as an async byte stream that
//! completes when the marker arrives. Bodies cross contexts chunk by chunk —
//! the payload is never buffered whole in transit.

use crate::channel::endpoint::ChannelEndpoint;
use crate::channel::hub::PortReceiver;
use crate::utils::errors::Result;
use crate::wire::PortPayload;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::debug;

enum BodyKind {
    Empty,
    Full(Option<Bytes>),
    Port {
        endpoint: ChannelEndpoint,
        rx: PortReceiver,
        done: bool,
    },
}

/// A readable byte stream: either in-memory or sourced from a channel
/// endpoint carrying chunks terminated by the end marker
pub struct Body {
    kind: BodyKind,
}

impl Body {
    /// An immediately-complete empty stream
    pub fn empty() -> Self {
        Self {
            kind: BodyKind::Empty,
        }
    }

    /// A single-chunk in-memory stream
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if data.is_empty() {
            return Self::empty();
        }
        Self {
            kind: BodyKind::Full(Some(data)),
        }
    }

    /// Consume a channel endpoint as a byte stream.
    ///
    /// Chunks are yielded until the end marker arrives, at which point the
    /// stream completes and the endpoint is closed. Pull signals on the same
    /// endpoint are skipped.
    pub fn from_endpoint(endpoint: ChannelEndpoint) -> Result<Self> {
        let rx = endpoint.subscribe()?;
        Ok(Self {
            kind: BodyKind::Port {
                endpoint,
                rx,
                done: false,
            },
        })
    }

    /// Drain the stream into a single buffer
    pub async fn collect(mut self) -> Bytes {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk);
        }
        buf.freeze()
    }
}

impl Stream for Body {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        let this = self.get_mut();
        match &mut this.kind {
            BodyKind::Empty => Poll::Ready(None),
            BodyKind::Full(data) => Poll::Ready(data.take()),
            BodyKind::Port { endpoint, rx, done } => {
                if *done {
                    return Poll::Ready(None);
                }
                loop {
                    match rx.poll_recv(cx) {
                        Poll::Ready(Some(PortPayload::Chunk(chunk))) => {
                            return Poll::Ready(Some(chunk));
                        }
                        Poll::Ready(Some(PortPayload::Fin)) => {
                            *done = true;
                            endpoint.close();
                            return Poll::Ready(None);
                        }
                        // Pull signals are producer-bound; skip them here.
                        Poll::Ready(Some(PortPayload::Pull(_))) => continue,
                        Poll::Ready(None) => {
                            *done = true;
                            return Poll::Ready(None);
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}

/// Pump a body's chunks into `endpoint`, append the end marker, and close.
///
/// Returns the pump task handle; the caller normally lets it run to
/// completion in the background.
pub fn pump_body(body: Body, endpoint: ChannelEndpoint) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut body = body;
        while let Some(chunk) = body.next().await {
            if endpoint.send(PortPayload::Chunk(chunk)).is_err() {
                debug!(endpoint = %endpoint.id(), "endpoint closed mid-stream, aborting pump");
                return;
            }
        }
        let _ = endpoint.send(PortPayload::Fin);
        endpoint.close();
    })
}
