// src/agent/interceptor.rs
//! The interception agent
//!
//! Sits in front of every outgoing network call from its context. Each call
//! is either answered as a readiness probe, bypassed to the real network, or
//! encoded and proxied to every known host context, racing the hosts'
//! answers against a timeout. No state outlives a call except its pending
//! entries.

use crate::agent::network::NetworkBackend;
use crate::agent::pending::PendingRegistry;
use crate::agent::policy::InterceptPolicy;
use crate::channel::{Body, ChannelHub};
use crate::codec::{self, method_can_have_body, RequestOptions};
use crate::context::{Context, FrameStream};
use crate::utils::config::{FallbackPolicy, InterceptConfig};
use crate::utils::errors::{MirageError, Result};
use crate::wire::{EventId, Frame};
use bytes::Bytes;
use futures::future::select_all;
use futures::StreamExt;
use hyper::http::request::Parts;
use hyper::{Request, Response, StatusCode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct AgentInner {
    armed: AtomicBool,
    address: Mutex<Option<(String, u16)>>,
    policy: InterceptPolicy,
    pending: PendingRegistry,
    targets: Vec<ChannelHub>,
    backend: Option<Arc<dyn NetworkBackend>>,
    config: InterceptConfig,
}

/// Privileged component intercepting outgoing network calls
pub struct InterceptionAgent {
    inner: Arc<AgentInner>,
    control_tasks: Vec<JoinHandle<()>>,
}

impl InterceptionAgent {
    /// Create an agent proxying into the given host contexts.
    ///
    /// One control loop runs per target; a response from any of them can
    /// resolve a pending call.
    pub fn new(
        contexts: Vec<Arc<dyn Context>>,
        config: InterceptConfig,
        backend: Option<Arc<dyn NetworkBackend>>,
    ) -> Result<Self> {
        if contexts.is_empty() {
            return Err(MirageError::Config(
                "at least one host context is required".into(),
            ));
        }

        let policy = InterceptPolicy::from_config(&config)?;
        let targets: Vec<ChannelHub> = contexts.into_iter().map(ChannelHub::new).collect();

        let mut streams = Vec::with_capacity(targets.len());
        for hub in &targets {
            streams.push(hub.take_control()?);
        }

        let inner = Arc::new(AgentInner {
            armed: AtomicBool::new(false),
            address: Mutex::new(None),
            policy,
            pending: PendingRegistry::new(),
            targets,
            backend,
            config,
        });

        let control_tasks = inner
            .targets
            .iter()
            .cloned()
            .zip(streams)
            .map(|(hub, frames)| {
                tokio::spawn(run_control(Arc::downgrade(&inner), hub, frames))
            })
            .collect();

        Ok(Self {
            inner,
            control_tasks,
        })
    }

    /// Create an agent with a single host context
    pub fn single(
        context: Arc<dyn Context>,
        config: InterceptConfig,
        backend: Option<Arc<dyn NetworkBackend>>,
    ) -> Result<Self> {
        Self::new(vec![context], config, backend)
    }

    /// Activate interception (the message-driven path does this on Arm)
    pub fn arm(&self) {
        self.inner.armed.store(true, Ordering::SeqCst);
    }

    /// Deactivate interception and drop every pending entry
    pub fn disarm(&self) {
        self.inner.armed.store(false, Ordering::SeqCst);
        self.inner.pending.clear();
    }

    pub fn armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    /// The address the host server announced, if any
    pub fn address(&self) -> Option<(String, u16)> {
        self.inner.address.lock().clone()
    }

    /// Number of in-flight proxied calls
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Intercept one outgoing call.
    ///
    /// Probe paths are answered directly; excluded or unarmed calls bypass to
    /// the network backend; everything else is proxied to the host contexts,
    /// first answer wins.
    pub async fn handle(&self, request: Request<Body>) -> Result<Response<Body>> {
        let uri = request.uri().clone();

        if self.inner.policy.is_probe(&uri) {
            debug!(%uri, "answering readiness probe");
            return Ok(probe_response());
        }

        if !self.armed() || self.inner.policy.should_bypass(&uri) {
            debug!(%uri, "bypassing interception");
            return self.bypass(request).await;
        }

        let (parts, body) = request.into_parts();
        let options = parts
            .extensions
            .get::<RequestOptions>()
            .cloned()
            .unwrap_or_default();
        let body_bytes = if method_can_have_body(&parts.method) {
            Some(collect_stream(body).await)
        } else {
            None
        };

        let event = EventId::fresh();
        debug!(%uri, %event, targets = self.inner.targets.len(), "proxying intercepted call");

        let mut branches = Vec::with_capacity(self.inner.targets.len());
        for (index, hub) in self.inner.targets.iter().enumerate() {
            let outgoing = rebuild_request(&parts, &options, body_bytes.clone());
            let descriptor = codec::encode_request(outgoing, hub);
            let id = descriptor.id;
            let resolution = self.inner.pending.insert(id, event);
            hub.post(Frame::Request(descriptor));
            branches.push(Box::pin(async move {
                match resolution.await {
                    Ok(descriptor) => Some((index, id, descriptor)),
                    Err(_) => None,
                }
            }));
        }

        let race = async move {
            let mut remaining = branches;
            loop {
                if remaining.is_empty() {
                    return None;
                }
                let (result, _, rest) = select_all(remaining).await;
                if result.is_some() {
                    return result;
                }
                remaining = rest;
            }
        };

        let winner = if self.inner.policy.is_long_polling(&uri) {
            race.await
        } else {
            let budget = Duration::from_millis(self.inner.config.proxy_timeout_ms);
            tokio::time::timeout(budget, race).await.unwrap_or_default()
        };

        // Cancel losing branches (and, on timeout, all of them) explicitly.
        let evicted = self.inner.pending.evict_event(event);
        if evicted > 0 {
            debug!(%event, evicted, "evicted pending entries");
        }

        match winner {
            Some((index, awaited, descriptor)) => {
                assert_eq!(
                    descriptor.id, awaited,
                    "request-response pair id mismatch"
                );
                codec::decode_response(&descriptor, &self.inner.targets[index])
            }
            None => match self.inner.config.fallback {
                FallbackPolicy::Passthrough => {
                    debug!(%uri, "no host answered, re-issuing on the real network");
                    self.bypass(rebuild_request(&parts, &options, body_bytes))
                        .await
                }
                FallbackPolicy::GatewayTimeout => {
                    debug!(%uri, "no host answered, synthesizing gateway timeout");
                    Ok(gateway_timeout_response())
                }
            },
        }
    }

    async fn bypass(&self, request: Request<Body>) -> Result<Response<Body>> {
        match &self.inner.backend {
            Some(backend) => backend.fetch(request).await,
            None => Err(MirageError::NetworkUnavailable),
        }
    }
}

impl Drop for InterceptionAgent {
    fn drop(&mut self) {
        for task in &self.control_tasks {
            task.abort();
        }
    }
}

async fn run_control(inner: Weak<AgentInner>, hub: ChannelHub, mut frames: FrameStream) {
    while let Some(frame) = frames.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        match frame {
            Frame::Arm => {
                inner.armed.store(true, Ordering::SeqCst);
                info!("interception armed");
                hub.post(Frame::Arm);
            }
            Frame::Fin => {
                inner.armed.store(false, Ordering::SeqCst);
                inner.pending.clear();
                info!("interception disarmed");
                hub.post(Frame::Fin);
            }
            Frame::Address { host, port } => {
                debug!(%host, port, "host address received");
                *inner.address.lock() = Some((host, port));
            }
            Frame::Response(descriptor) => {
                let id = descriptor.id;
                if !inner.pending.resolve(descriptor) {
                    debug!(%id, "response without a pending entry, dropping");
                }
            }
            Frame::Request(descriptor) => {
                warn!(id = %descriptor.id, "unexpected request frame on the agent side");
            }
            Frame::Port { .. } => {
                unreachable!("port frames are routed to endpoints by the hub, never the control consumer");
            }
        }
    }
}

fn rebuild_request(parts: &Parts, options: &RequestOptions, body: Option<Bytes>) -> Request<Body> {
    let mut request = Request::new(match body {
        Some(bytes) => Body::from_bytes(bytes),
        None => Body::empty(),
    });
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.headers_mut() = parts.headers.clone();
    request.extensions_mut().insert(options.clone());
    request
}

async fn collect_stream(mut body: Body) -> Bytes {
    let mut collected = Vec::new();
    while let Some(chunk) = body.next().await {
        collected.extend_from_slice(&chunk);
    }
    Bytes::from(collected)
}

fn probe_response() -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from_bytes(Bytes::from_static(b"OK")))
        .unwrap()
}

fn gateway_timeout_response() -> Response<Body> {
    Response::builder()
        .status(StatusCode::GATEWAY_TIMEOUT)
        .body(Body::empty())
        .unwrap()
}
