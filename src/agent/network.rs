// src/agent/network.rs
//! Real-network backend
//!
//! Bypassed and fallen-back calls leave the interception layer through this
//! trait. The default implementation drives a plain HTTP client; tests plug
//! in their own.

use crate::channel::Body;
use crate::utils::errors::{MirageError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::StreamExt;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

/// Performs a real network call for a request the agent chose not to proxy
pub trait NetworkBackend: Send + Sync {
    fn fetch(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response<Body>>>;
}

/// HTTP client backend
pub struct HttpBackend {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpBackend {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client }
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkBackend for HttpBackend {
    fn fetch(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response<Body>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            debug!(url = %parts.uri, "forwarding to the real network");

            let mut collected = Vec::new();
            let mut body = body;
            while let Some(chunk) = body.next().await {
                collected.extend_from_slice(&chunk);
            }

            let outgoing = Request::from_parts(parts, Full::new(Bytes::from(collected)));
            let response = client
                .request(outgoing)
                .await
                .map_err(|e| MirageError::Network(e.to_string()))?;

            let (parts, incoming) = response.into_parts();
            let bytes = incoming
                .collect()
                .await
                .map_err(|e| MirageError::Network(e.to_string()))?
                .to_bytes();

            Ok(Response::from_parts(parts, Body::from_bytes(bytes)))
        })
    }
}
