// src/server/incoming.rs
//! Incoming message facade
//!
//! Read-only view combining a request descriptor's metadata with the
//! socket's inbound byte stream. `complete` is driven by the arrival of the
//! end marker (or immediately for bodiless methods), not by consumption.

use crate::codec::RequestDescriptor;
use crate::server::socket::Socket;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use hyper::{Method, Uri};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};

const READ_HINT: u64 = 16 * 1024;

/// Read-only request facade handed to request handlers
pub struct IncomingMessage {
    headers: HashMap<String, String>,
    raw_headers: Vec<(String, String)>,
    method: Method,
    url: String,
    socket: Arc<Socket>,
    data: Option<mpsc::UnboundedReceiver<Bytes>>,
    ended: watch::Receiver<bool>,
    pull_sent: bool,
}

impl IncomingMessage {
    pub(crate) fn new(
        method: Method,
        uri: &Uri,
        descriptor: &RequestDescriptor,
        socket: Arc<Socket>,
    ) -> Self {
        let mut headers = HashMap::new();
        for (name, value) in &descriptor.headers {
            headers.insert(name.to_lowercase(), value.clone());
        }

        let url = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let data = socket.take_data();
        let ended = socket.ended();

        Self {
            headers,
            raw_headers: descriptor.headers.clone(),
            method,
            url,
            socket,
            data,
            ended,
            pull_sent: false,
        }
    }

    /// Header map with lowercased names
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Headers in arrival order with their original casing
    pub fn raw_headers(&self) -> &[(String, String)] {
        &self.raw_headers
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path plus query of the request URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn http_version(&self) -> &'static str {
        "1.1"
    }

    /// The socket this message arrived on
    pub fn connection(&self) -> &Arc<Socket> {
        &self.socket
    }

    /// True once the inbound stream has fully arrived
    pub fn complete(&self) -> bool {
        *self.ended.borrow()
    }

    /// Drain the remaining body into one buffer
    pub async fn read_to_end(&mut self) -> Bytes {
        use futures::StreamExt;
        let mut collected = BytesMut::new();
        while let Some(chunk) = self.next().await {
            collected.extend_from_slice(&chunk);
        }
        collected.freeze()
    }
}

impl Stream for IncomingMessage {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        let this = self.get_mut();
        let Some(data) = this.data.as_mut() else {
            return Poll::Ready(None);
        };
        match data.poll_recv(cx) {
            Poll::Ready(item) => {
                this.pull_sent = false;
                Poll::Ready(item)
            }
            Poll::Pending => {
                // One advisory pull per wait, the emulation's stand-in for
                // readable-side backpressure.
                if !this.pull_sent {
                    this.pull_sent = true;
                    this.socket.read(READ_HINT);
                }
                Poll::Pending
            }
        }
    }
}
