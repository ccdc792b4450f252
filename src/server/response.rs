// src/server/response.rs
//! Server response facade
//!
//! Write-only view over the socket's outbound stream. Headers are mutable
//! until the response head leaves the process (the `headers_sent` latch);
//! `end` appends the end marker and finalizes the exchange. Dropping an
//! un-ended response marks the exchange abandoned so the server never ships
//! a fabricated head.

use crate::server::socket::Socket;
use crate::utils::errors::{MirageError, Result};
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub(crate) struct ResponseState {
    status: Mutex<(StatusCode, Option<String>)>,
    headers: Mutex<HeaderMap>,
    headers_sent: AtomicBool,
    finished: watch::Sender<bool>,
    abandoned: AtomicBool,
}

impl ResponseState {
    pub(crate) fn finished(&self) -> watch::Receiver<bool> {
        self.finished.subscribe()
    }

    pub(crate) fn abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Latch the head and snapshot it for the response descriptor.
    /// Returns None when the head was latched before (double wrap-up guard).
    pub(crate) fn take_head(&self) -> Option<(u16, String, Vec<(String, String)>)> {
        if self.headers_sent.swap(true, Ordering::SeqCst) {
            return None;
        }
        let (status, message) = self.status.lock().clone();
        let status_text = message.unwrap_or_else(|| {
            status.canonical_reason().unwrap_or_default().to_string()
        });
        let headers = self
            .headers
            .lock()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        Some((status.as_u16(), status_text, headers))
    }
}

/// Write-only response facade handed to request handlers
pub struct ServerResponse {
    state: Arc<ResponseState>,
    socket: Arc<Socket>,
}

impl ServerResponse {
    pub(crate) fn new(socket: Arc<Socket>) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            state: Arc::new(ResponseState {
                status: Mutex::new((StatusCode::OK, None)),
                headers: Mutex::new(HeaderMap::new()),
                headers_sent: AtomicBool::new(false),
                finished,
                abandoned: AtomicBool::new(false),
            }),
            socket,
        }
    }

    pub(crate) fn state(&self) -> Arc<ResponseState> {
        Arc::clone(&self.state)
    }

    pub fn status_code(&self) -> u16 {
        self.state.status.lock().0.as_u16()
    }

    pub fn status_message(&self) -> String {
        let (status, message) = self.state.status.lock().clone();
        message.unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string())
    }

    pub fn headers_sent(&self) -> bool {
        self.state.headers_sent.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> bool {
        *self.state.finished.borrow()
    }

    /// The socket this response writes to
    pub fn socket(&self) -> &Arc<Socket> {
        &self.socket
    }

    /// Set the status line and, optionally, a batch of headers
    pub fn write_head(
        &self,
        status: u16,
        message: Option<&str>,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<()> {
        self.check_mutable()?;
        let status =
            StatusCode::from_u16(status).map_err(|e| MirageError::Codec(e.to_string()))?;
        *self.state.status.lock() = (status, message.map(str::to_string));
        if let Some(headers) = headers {
            for (name, value) in headers {
                self.set_header(name, value)?;
            }
        }
        Ok(())
    }

    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        self.check_mutable()?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| MirageError::Codec(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| MirageError::Codec(e.to_string()))?;
        self.state.headers.lock().insert(name, value);
        Ok(())
    }

    pub fn get_header(&self, name: &str) -> Option<String> {
        self.state
            .headers
            .lock()
            .get(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.state.headers.lock().contains_key(name)
    }

    pub fn remove_header(&self, name: &str) -> Result<()> {
        self.check_mutable()?;
        self.state.headers.lock().remove(name);
        Ok(())
    }

    pub fn header_names(&self) -> Vec<String> {
        self.state
            .headers
            .lock()
            .keys()
            .map(|name| name.as_str().to_string())
            .collect()
    }

    pub fn get_headers(&self) -> Vec<(String, String)> {
        self.state
            .headers
            .lock()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }

    /// Write a body chunk
    pub fn write(&self, chunk: impl Into<Bytes>) -> Result<()> {
        if self.finished() {
            return Err(MirageError::ResponseEnded);
        }
        self.socket.write(chunk.into())
    }

    /// Finalize: optionally write a last chunk, append the end marker, and
    /// mark the response finished
    pub fn end(&self, chunk: Option<Bytes>) -> Result<()> {
        if self.finished() {
            return Err(MirageError::ResponseEnded);
        }
        if let Some(chunk) = chunk {
            self.socket.write(chunk)?;
        }
        self.socket.send_fin()?;
        self.state.finished.send_replace(true);
        debug!(socket = %self.socket.id(), "server response finished");
        Ok(())
    }

    fn check_mutable(&self) -> Result<()> {
        if self.headers_sent() {
            return Err(MirageError::HeadersSent);
        }
        Ok(())
    }
}

impl Drop for ServerResponse {
    fn drop(&mut self) {
        if !*self.state.finished.borrow() {
            // Handler gave up without ending; let the exchange observe it.
            self.state.abandoned.store(true, Ordering::SeqCst);
            self.state.finished.send_replace(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelHub;
    use crate::codec::RequestDescriptor;
    use crate::context::LoopbackContext;
    use crate::wire::RequestId;

    fn socket() -> Arc<Socket> {
        let hub = ChannelHub::new(LoopbackContext::new());
        let descriptor = RequestDescriptor {
            id: RequestId::fresh(),
            url: "https://example.com/".into(),
            method: "GET".into(),
            headers: vec![],
            mode: Default::default(),
            credentials: Default::default(),
            cache: Default::default(),
            redirect: Default::default(),
            referrer: String::new(),
            referrer_policy: Default::default(),
            integrity: String::new(),
            keepalive: false,
            body: None,
        };
        Socket::new(&descriptor, &hub).unwrap()
    }

    #[tokio::test]
    async fn test_defaults() {
        let response = ServerResponse::new(socket());
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.status_message(), "OK");
        assert!(!response.headers_sent());
        assert!(!response.finished());
    }

    #[tokio::test]
    async fn test_header_round_trip() {
        let response = ServerResponse::new(socket());
        response.set_header("Content-Type", "text/plain").unwrap();

        assert_eq!(response.get_header("content-type").unwrap(), "text/plain");
        assert!(response.has_header("Content-Type"));
        assert_eq!(response.header_names(), vec!["content-type".to_string()]);

        response.remove_header("content-type").unwrap();
        assert!(!response.has_header("content-type"));
    }

    #[tokio::test]
    async fn test_write_head_sets_status_and_headers() {
        let response = ServerResponse::new(socket());
        response
            .write_head(418, Some("I'm a teapot"), Some(&[("X-Pot", "short")]))
            .unwrap();

        assert_eq!(response.status_code(), 418);
        assert_eq!(response.status_message(), "I'm a teapot");
        assert_eq!(response.get_header("x-pot").unwrap(), "short");
    }

    #[tokio::test]
    async fn test_no_mutation_after_head_latched() {
        let response = ServerResponse::new(socket());
        let state = response.state();

        let head = state.take_head().unwrap();
        assert_eq!(head.0, 200);
        assert!(state.take_head().is_none());

        assert!(matches!(
            response.set_header("Late", "no"),
            Err(MirageError::HeadersSent)
        ));
        assert!(matches!(
            response.write_head(500, None, None),
            Err(MirageError::HeadersSent)
        ));
    }

    #[tokio::test]
    async fn test_end_is_terminal() {
        let response = ServerResponse::new(socket());
        response.end(Some(Bytes::from_static(b"bye"))).unwrap();

        assert!(response.finished());
        assert!(matches!(
            response.write(Bytes::from_static(b"more")),
            Err(MirageError::ResponseEnded)
        ));
        assert!(matches!(response.end(None), Err(MirageError::ResponseEnded)));
    }

    #[tokio::test]
    async fn test_drop_without_end_marks_abandoned() {
        let response = ServerResponse::new(socket());
        let state = response.state();
        let mut finished = state.finished();

        drop(response);

        finished.changed().await.unwrap();
        assert!(state.abandoned());
    }
}
