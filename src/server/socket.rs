// src/server/socket.rs
//! Socket emulation
//!
//! A Socket binds one outbound endpoint (the response body; its detached
//! remote handle travels back in the response descriptor) and zero or one
//! inbound endpoint (the request body). The inbound side is drained eagerly:
//! chunks are forwarded to the message's buffer and the end flag flips the
//! moment the end marker arrives, whether or not anyone is reading.

use crate::channel::{ChannelEndpoint, ChannelHub, ChannelPair};
use crate::codec::{method_can_have_body, RequestDescriptor};
use crate::utils::errors::{MirageError, Result};
use crate::wire::{BodyHandle, PortPayload};
use bytes::Bytes;
use hyper::{Method, Uri};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use ulid::Ulid;

/// Duplex byte endpoint backing one proxied exchange
pub struct Socket {
    id: String,
    remote_address: String,
    remote_family: &'static str,
    remote_port: u16,
    outbound: ChannelEndpoint,
    response_handle: BodyHandle,
    inbound: Option<ChannelEndpoint>,
    can_have_body: bool,
    data_rx: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    ended_rx: watch::Receiver<bool>,
    destroyed: AtomicBool,
}

impl Socket {
    /// Build a socket for one inbound request descriptor.
    ///
    /// Creates a fresh outbound pair on `hub` (detaching the remote side for
    /// the eventual response descriptor) and adopts the descriptor's body
    /// endpoint, if any.
    pub(crate) fn new(descriptor: &RequestDescriptor, hub: &ChannelHub) -> Result<Arc<Self>> {
        let uri: Uri = descriptor
            .url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| MirageError::Codec(e.to_string()))?;
        let method: Method = descriptor
            .method
            .parse()
            .map_err(|e: hyper::http::method::InvalidMethod| MirageError::Codec(e.to_string()))?;
        let can_have_body = method_can_have_body(&method);

        let pair = ChannelPair::new(hub);
        let outbound = pair.left;
        let response_handle = pair.right.detach();

        let inbound = match (&descriptor.body, can_have_body) {
            (Some(handle), true) => Some(ChannelEndpoint::adopt(hub, handle)),
            _ => None,
        };

        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let (ended_tx, ended_rx) = watch::channel(inbound.is_none());

        if let Some(endpoint) = &inbound {
            let mut payloads = endpoint.subscribe()?;
            tokio::spawn(async move {
                while let Some(payload) = payloads.recv().await {
                    match payload {
                        PortPayload::Chunk(chunk) => {
                            // A gone reader is fine; draining must continue
                            // so the end flag still flips on the marker.
                            let _ = data_tx.send(chunk);
                        }
                        PortPayload::Fin => {
                            ended_tx.send_replace(true);
                            break;
                        }
                        PortPayload::Pull(_) => {}
                    }
                }
            });
        } else {
            // Bodiless exchange: the inbound stream is already complete.
            drop(data_tx);
            drop(ended_tx);
        }

        let socket = Arc::new(Self {
            id: Ulid::new().to_string(),
            remote_address: uri.host().unwrap_or("localhost").to_string(),
            remote_family: "IPv4",
            remote_port: normalized_port(&uri),
            outbound,
            response_handle,
            inbound,
            can_have_body,
            data_rx: Mutex::new(Some(data_rx)),
            ended_rx,
            destroyed: AtomicBool::new(false),
        });
        debug!(socket = %socket.id, remote = %socket.remote_address, "socket created");
        Ok(socket)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hostname of the request URL
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    pub fn remote_family(&self) -> &'static str {
        self.remote_family
    }

    /// Port of the request URL (scheme default when absent)
    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Forward raw bytes over the outbound endpoint
    pub fn write(&self, chunk: Bytes) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(MirageError::ChannelClosed);
        }
        self.outbound.send(PortPayload::Chunk(chunk))
    }

    /// Append the end-of-stream marker to the outbound side
    pub(crate) fn send_fin(&self) -> Result<()> {
        self.outbound.send(PortPayload::Fin)
    }

    /// Signal readiness for more inbound data.
    ///
    /// Forwarded as an advisory pull when the method may carry a body;
    /// otherwise the inbound side is already complete and this is a no-op.
    pub fn read(&self, size: u64) {
        if self.can_have_body {
            if let Some(inbound) = &self.inbound {
                let _ = inbound.send(PortPayload::Pull(size));
            }
        }
    }

    /// Close both bound endpoints. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(socket = %self.id, "destroying socket");
        self.outbound.close();
        if let Some(inbound) = &self.inbound {
            inbound.close();
        }
    }

    /// Watch flipping true when the inbound stream has fully arrived
    pub(crate) fn ended(&self) -> watch::Receiver<bool> {
        self.ended_rx.clone()
    }

    /// Take the drained inbound chunk stream. Single consumer.
    pub(crate) fn take_data(&self) -> Option<mpsc::UnboundedReceiver<Bytes>> {
        self.data_rx.lock().take()
    }

    /// Remote handle of the outbound pair, shipped in the response descriptor
    pub(crate) fn response_handle(&self) -> &BodyHandle {
        &self.response_handle
    }

    // TCP-only surface; deliberate capability gaps that fail loudly.

    pub fn connect(&self) -> Result<()> {
        Err(MirageError::Unsupported("Socket::connect"))
    }

    pub fn set_timeout(&self, _ms: u64) -> Result<()> {
        Err(MirageError::Unsupported("Socket::set_timeout"))
    }

    pub fn set_nodelay(&self, _enabled: bool) -> Result<()> {
        Err(MirageError::Unsupported("Socket::set_nodelay"))
    }

    pub fn set_keepalive(&self, _enabled: bool) -> Result<()> {
        Err(MirageError::Unsupported("Socket::set_keepalive"))
    }
}

fn normalized_port(uri: &Uri) -> u16 {
    uri.port_u16()
        .unwrap_or(if uri.scheme_str() == Some("https") {
            443
        } else {
            80
        })
}
