// src/channel/endpoint.rs
//! Channel endpoints and pairs
//!
//! An endpoint is one half of a named duplex conduit. Its lifecycle is
//! `unstarted → started → closed`: payloads that arrive before `subscribe`
//! are buffered by the hub and flushed in arrival order; `close` is
//! idempotent and emits exactly one close event. An endpoint can be
//! *detached* from its hub and *adopted* by the hub on the other side of the
//! transport — that is how body channels travel inside descriptors.

use crate::channel::hub::{ChannelHub, PortReceiver};
use crate::utils::errors::{MirageError, Result};
use crate::wire::{BodyHandle, EndpointId, Frame, PortPayload};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

#[derive(Default)]
struct EndpointState {
    started: bool,
    closed: bool,
}

/// One half of a channel pair
pub struct ChannelEndpoint {
    id: EndpointId,
    peer: EndpointId,
    hub: ChannelHub,
    state: Mutex<EndpointState>,
    closed_tx: watch::Sender<bool>,
}

impl ChannelEndpoint {
    fn register(hub: &ChannelHub, id: EndpointId, peer: EndpointId) -> Self {
        hub.register(&id);
        let (closed_tx, _) = watch::channel(false);
        Self {
            id,
            peer,
            hub: hub.clone(),
            state: Mutex::new(EndpointState::default()),
            closed_tx,
        }
    }

    /// Materialize a transferred endpoint on this side of the transport
    pub fn adopt(hub: &ChannelHub, handle: &BodyHandle) -> Self {
        debug!(endpoint = %handle.id, "adopting transferred endpoint");
        Self::register(hub, handle.id.clone(), handle.peer.clone())
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn peer(&self) -> &EndpointId {
        &self.peer
    }

    /// Handle describing this endpoint for adoption by the remote side
    pub fn handle(&self) -> BodyHandle {
        BodyHandle {
            id: self.id.clone(),
            peer: self.peer.clone(),
        }
    }

    /// Enqueue a payload for delivery to the paired endpoint.
    ///
    /// Errors after `close`; callers that want the lenient behavior ignore
    /// the error. The enqueue is synchronous, so a close can never overtake a
    /// send already made.
    pub fn send(&self, payload: PortPayload) -> Result<()> {
        if self.state.lock().closed {
            return Err(MirageError::ChannelClosed);
        }
        self.hub.post(Frame::Port {
            to: self.peer.clone(),
            payload,
        });
        Ok(())
    }

    /// Start the endpoint and take its receiving half.
    ///
    /// Buffered payloads are flushed ahead of live ones, in arrival order.
    /// A second subscription is an error.
    pub fn subscribe(&self) -> Result<PortReceiver> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(MirageError::ChannelClosed);
        }
        if state.started {
            return Err(MirageError::AlreadyStarted);
        }
        state.started = true;
        drop(state);

        Ok(self.hub.start(&self.id))
    }

    /// Close the endpoint. Idempotent; buffered payloads are discarded and
    /// the close event fires exactly once.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.hub.remove(&self.id);
        let _ = self.closed_tx.send_replace(true);
        debug!(endpoint = %self.id, "endpoint closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Watch for the close event
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// Release the endpoint from this hub for adoption by the remote side
    pub fn detach(self) -> BodyHandle {
        self.hub.remove(&self.id);
        BodyHandle {
            id: self.id,
            peer: self.peer,
        }
    }
}

/// Two endpoints cross-wired through a hub: payloads sent on one arrive on
/// the other
pub struct ChannelPair {
    pub left: ChannelEndpoint,
    pub right: ChannelEndpoint,
}

impl ChannelPair {
    /// Create a pair with fresh ids
    pub fn new(hub: &ChannelHub) -> Self {
        let a = EndpointId::fresh();
        let b = EndpointId::fresh();
        Self {
            left: ChannelEndpoint::register(hub, a.clone(), b.clone()),
            right: ChannelEndpoint::register(hub, b, a),
        }
    }

    /// Create a pair rendezvousing on caller-supplied names
    pub fn named(hub: &ChannelHub, left: impl Into<String>, right: impl Into<String>) -> Self {
        let a = EndpointId::named(left);
        let b = EndpointId::named(right);
        Self {
            left: ChannelEndpoint::register(hub, a.clone(), b.clone()),
            right: ChannelEndpoint::register(hub, b, a),
        }
    }
}
