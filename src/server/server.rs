// src/server/server.rs
//! Host-side server
//!
//! Reconstructs proxied request descriptors into Socket / IncomingMessage /
//! ServerResponse objects and drives the conventional listen → connection →
//! request → close sequence. The response descriptor is shipped only after
//! the response has finished *and* the request stream has fully arrived.

use crate::channel::ChannelHub;
use crate::codec::{self, RequestDescriptor, ResponseDescriptor};
use crate::context::{Context, FrameStream};
use crate::lifecycle::AgentLifecycle;
use crate::server::incoming::IncomingMessage;
use crate::server::response::ServerResponse;
use crate::server::socket::Socket;
use crate::utils::config::TransportConfig;
use crate::utils::errors::{MirageError, Result};
use crate::wire::Frame;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type RequestHandlerFn =
    dyn Fn(IncomingMessage, ServerResponse) -> BoxFuture<'static, ()> + Send + Sync;
type ConnectionHandlerFn = dyn Fn(&Arc<Socket>) + Send + Sync;

/// The address a server is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub address: String,
    pub port: u16,
    pub family: &'static str,
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

struct ServerState {
    addr: Mutex<(String, u16)>,
    listening: AtomicBool,
    ready: watch::Sender<bool>,
    request_handler: Mutex<Option<Arc<RequestHandlerFn>>>,
    connection_handler: Mutex<Option<Arc<ConnectionHandlerFn>>>,
    transport: TransportConfig,
}

/// Host-side server emulation over a context transport
pub struct Server {
    hub: ChannelHub,
    lifecycle: Arc<dyn AgentLifecycle>,
    state: Arc<ServerState>,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Create a server over `context`, armed and disarmed through `lifecycle`
    pub fn new(context: Arc<dyn Context>, lifecycle: Arc<dyn AgentLifecycle>) -> Self {
        Self::with_config(context, lifecycle, TransportConfig::default())
    }

    pub fn with_config(
        context: Arc<dyn Context>,
        lifecycle: Arc<dyn AgentLifecycle>,
        transport: TransportConfig,
    ) -> Self {
        let hub = ChannelHub::new(context);
        let (ready, _) = watch::channel(false);
        let state = Arc::new(ServerState {
            addr: Mutex::new(("localhost".to_string(), 80)),
            listening: AtomicBool::new(false),
            ready,
            request_handler: Mutex::new(None),
            connection_handler: Mutex::new(None),
            transport,
        });

        let control = hub
            .take_control()
            .expect("fresh hub always has its control stream");
        let accept_task = tokio::spawn(run_accept(Arc::clone(&state), hub.clone(), control));

        Self {
            hub,
            lifecycle,
            state,
            accept_task,
        }
    }

    /// Register the request handler
    pub fn on_request<F, Fut>(&self, handler: F)
    where
        F: Fn(IncomingMessage, ServerResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.state.request_handler.lock() =
            Some(Arc::new(move |message, response| {
                Box::pin(handler(message, response))
            }));
    }

    /// Register a connection observer
    pub fn on_connection<F>(&self, handler: F)
    where
        F: Fn(&Arc<Socket>) + Send + Sync + 'static,
    {
        *self.state.connection_handler.lock() = Some(Arc::new(handler));
    }

    pub fn listening(&self) -> bool {
        self.state.listening.load(Ordering::SeqCst)
    }

    pub fn address(&self) -> ServerAddress {
        let (address, port) = self.state.addr.lock().clone();
        ServerAddress {
            address,
            port,
            family: "IPv4",
        }
    }

    /// Start listening: arm the interception agent, publish the address, and
    /// wait for the agent's ready acknowledgement.
    ///
    /// Calling while already listening yields a recoverable error.
    pub async fn listen(&self, port: u16, host: Option<&str>) -> Result<()> {
        if self.listening() {
            return Err(MirageError::AlreadyListening);
        }

        let (host, port) = {
            let mut addr = self.state.addr.lock();
            addr.1 = port;
            if let Some(host) = host {
                addr.0 = host.to_string();
            }
            addr.clone()
        };
        info!(%host, port, "starting to listen");

        self.state.ready.send_replace(false);
        // Address first: the agent has processed it by the time its arm
        // acknowledgement comes back.
        self.hub.post(Frame::Address { host, port });
        self.lifecycle.arm().await?;

        let mut ready = self.state.ready.subscribe();
        let budget = Duration::from_millis(self.state.transport.arm_timeout_ms);
        tokio::time::timeout(budget, async move {
            loop {
                if *ready.borrow() {
                    return;
                }
                if ready.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .map_err(|_| MirageError::ArmTimeout(self.state.transport.arm_timeout_ms))?;

        Ok(())
    }

    /// Stop listening and disarm the interception agent
    pub async fn close(&self) -> Result<()> {
        debug!("closing server");
        self.lifecycle.disarm().await?;
        self.state.listening.store(false, Ordering::SeqCst);
        self.state.ready.send_replace(false);
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Create a server with a request handler already registered
pub fn create_server<F, Fut>(
    context: Arc<dyn Context>,
    lifecycle: Arc<dyn AgentLifecycle>,
    handler: F,
) -> Server
where
    F: Fn(IncomingMessage, ServerResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let server = Server::new(context, lifecycle);
    server.on_request(handler);
    server
}

async fn run_accept(state: Arc<ServerState>, hub: ChannelHub, mut control: FrameStream) {
    while let Some(frame) = control.recv().await {
        match frame {
            Frame::Arm => {
                debug!("arm acknowledged by the interception agent");
                state.listening.store(true, Ordering::SeqCst);
                state.ready.send_replace(true);
            }
            Frame::Fin => {
                debug!("fin acknowledged by the interception agent");
            }
            Frame::Request(descriptor) => {
                if !state.listening.load(Ordering::SeqCst) {
                    warn!(id = %descriptor.id, "request received while not listening, dropping");
                    continue;
                }
                debug!(id = %descriptor.id, "inbound proxied request");
                let state = Arc::clone(&state);
                let hub = hub.clone();
                tokio::spawn(exchange(state, hub, descriptor));
            }
            Frame::Response(descriptor) => {
                warn!(id = %descriptor.id, "unexpected response frame on the host side");
            }
            Frame::Address { .. } => {}
            Frame::Port { .. } => {
                unreachable!("port frames are routed to endpoints by the hub, never the control consumer");
            }
        }
    }
}

/// Drive one request/response exchange to completion
async fn exchange(state: Arc<ServerState>, hub: ChannelHub, descriptor: RequestDescriptor) {
    let head = match codec::decode_request_head(&descriptor) {
        Ok(head) => head,
        Err(e) => {
            warn!(id = %descriptor.id, error = %e, "dropping undecodable request");
            return;
        }
    };
    let socket = match Socket::new(&descriptor, &hub) {
        Ok(socket) => socket,
        Err(e) => {
            warn!(id = %descriptor.id, error = %e, "failed to build socket");
            return;
        }
    };

    if let Some(on_connection) = state.connection_handler.lock().clone() {
        on_connection(&socket);
    }

    let message =
        IncomingMessage::new(head.method().clone(), head.uri(), &descriptor, socket.clone());
    let response = ServerResponse::new(socket.clone());
    let response_state = response.state();
    let mut finished = response_state.finished();
    let mut completed = socket.ended();

    let handler = state.request_handler.lock().clone();
    match handler {
        Some(handler) => {
            tokio::spawn(handler(message, response));
        }
        None => {
            debug!(id = %descriptor.id, "no request handler registered, replying 418");
            tokio::spawn(async move {
                let _ = response.write_head(418, Some("I'm a teapot"), None);
                let _ = response.end(None);
            });
        }
    }

    wait_flag(&mut finished).await;
    if response_state.abandoned() {
        debug!(id = %descriptor.id, "response abandoned, the caller will time out");
        socket.destroy();
        return;
    }
    wait_flag(&mut completed).await;

    let Some((status, status_text, headers)) = response_state.take_head() else {
        socket.destroy();
        return;
    };
    let reply = ResponseDescriptor {
        id: descriptor.id,
        status,
        status_text,
        headers,
        body: Some(socket.response_handle().clone()),
    };
    debug!(id = %descriptor.id, status, "responding to proxied request");
    hub.post(Frame::Response(reply));
    socket.destroy();
}

async fn wait_flag(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
