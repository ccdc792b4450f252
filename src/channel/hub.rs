// src/channel/hub.rs
//! Per-context frame router
//!
//! One hub owns one subscription to its context. Port frames are routed to
//! the endpoint they address; every other frame goes to the single control
//! consumer (the agent or the server on that side). Payloads for endpoints
//! that are unstarted, or that have not been adopted yet, are buffered in
//! arrival order — construction and subscription cannot be atomic across
//! contexts, and the first chunks of a transferred body routinely arrive
//! before the descriptor that names their endpoint is processed.

use crate::context::{Context, FrameStream};
use crate::utils::errors::{MirageError, Result};
use crate::wire::{EndpointId, Frame, PortPayload};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Cap on payloads buffered for an endpoint nobody has adopted or started.
/// Bounds the damage of an abandoned exchange (e.g. a response body streamed
/// to a caller that already timed out and will never adopt its endpoint).
const MAX_BUFFERED_PAYLOADS: usize = 8192;

/// Receiving half of a started endpoint
pub type PortReceiver = mpsc::UnboundedReceiver<PortPayload>;

enum Slot {
    /// Arrival-ordered payloads held until the endpoint starts.
    Buffered(Vec<PortPayload>),
    /// Live delivery to a started endpoint.
    Live(mpsc::UnboundedSender<PortPayload>),
}

struct HubInner {
    context: Arc<dyn Context>,
    slots: DashMap<EndpointId, Slot>,
    control_rx: Mutex<Option<FrameStream>>,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for HubInner {
    fn drop(&mut self) {
        if let Some(task) = self.router.lock().take() {
            task.abort();
        }
    }
}

/// Cheaply cloneable handle to a context's frame router
#[derive(Clone)]
pub struct ChannelHub {
    inner: Arc<HubInner>,
}

impl ChannelHub {
    /// Create a hub over `context` and start routing its inbound frames
    pub fn new(context: Arc<dyn Context>) -> Self {
        let mut frames = context.subscribe();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(HubInner {
            context,
            slots: DashMap::new(),
            control_rx: Mutex::new(Some(control_rx)),
            router: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let task = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                match frame {
                    Frame::Port { to, payload } => route(&inner.slots, to, payload),
                    other => {
                        // Control consumer gone; port routing must keep going.
                        let _ = control_tx.send(other);
                    }
                }
            }
        });
        *inner.router.lock() = Some(task);

        Self { inner }
    }

    /// The underlying transport
    pub fn context(&self) -> &Arc<dyn Context> {
        &self.inner.context
    }

    /// Post a frame on the underlying transport
    pub fn post(&self, frame: Frame) {
        self.inner.context.post(frame);
    }

    /// Take the stream of non-port frames. Single consumer.
    pub fn take_control(&self) -> Result<FrameStream> {
        self.inner
            .control_rx
            .lock()
            .take()
            .ok_or(MirageError::AlreadyStarted)
    }

    /// Ensure a buffered slot exists for `id`
    pub(crate) fn register(&self, id: &EndpointId) {
        self.inner
            .slots
            .entry(id.clone())
            .or_insert_with(|| Slot::Buffered(Vec::new()));
    }

    /// Switch `id` to live delivery, flushing buffered payloads first
    pub(crate) fn start(&self, id: &EndpointId) -> PortReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.inner.slots.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                if let Slot::Buffered(buffered) = occupied.get_mut() {
                    for payload in buffered.drain(..) {
                        let _ = tx.send(payload);
                    }
                }
                occupied.insert(Slot::Live(tx));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Live(tx));
            }
        }
        rx
    }

    /// Drop the slot for `id`, discarding anything still buffered
    pub(crate) fn remove(&self, id: &EndpointId) {
        self.inner.slots.remove(id);
    }
}

fn route(slots: &DashMap<EndpointId, Slot>, to: EndpointId, payload: PortPayload) {
    match slots.entry(to) {
        Entry::Occupied(mut occupied) => {
            let dropped = match occupied.get_mut() {
                Slot::Buffered(buffered) => {
                    if buffered.len() >= MAX_BUFFERED_PAYLOADS {
                        true
                    } else {
                        buffered.push(payload);
                        false
                    }
                }
                Slot::Live(tx) => tx.send(payload).is_err(),
            };
            if dropped {
                debug!(endpoint = %occupied.key(), "no live receiver or buffer full, dropping payload");
            }
        }
        Entry::Vacant(vacant) => {
            // Not adopted yet; hold until someone claims the endpoint.
            vacant.insert(Slot::Buffered(vec![payload]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LoopbackContext;
    use bytes::Bytes;

    fn chunk(data: &'static [u8]) -> PortPayload {
        PortPayload::Chunk(Bytes::from_static(data))
    }

    #[tokio::test]
    async fn test_payloads_buffer_until_started() {
        let hub = ChannelHub::new(LoopbackContext::new());
        let id = EndpointId::named("late");

        hub.post(Frame::Port {
            to: id.clone(),
            payload: chunk(b"one"),
        });
        hub.post(Frame::Port {
            to: id.clone(),
            payload: chunk(b"two"),
        });
        tokio::task::yield_now().await;

        let mut rx = hub.start(&id);
        assert_eq!(rx.recv().await, Some(chunk(b"one")));
        assert_eq!(rx.recv().await, Some(chunk(b"two")));
    }

    #[tokio::test]
    async fn test_live_delivery_after_start() {
        let hub = ChannelHub::new(LoopbackContext::new());
        let id = EndpointId::named("live");

        hub.register(&id);
        let mut rx = hub.start(&id);

        hub.post(Frame::Port {
            to: id.clone(),
            payload: PortPayload::Fin,
        });

        assert_eq!(rx.recv().await, Some(PortPayload::Fin));
    }

    #[tokio::test]
    async fn test_control_frames_bypass_port_routing() {
        let hub = ChannelHub::new(LoopbackContext::new());
        let mut control = hub.take_control().unwrap();

        hub.post(Frame::Arm);

        assert!(matches!(control.recv().await, Some(Frame::Arm)));
        assert!(hub.take_control().is_err());
    }

    #[tokio::test]
    async fn test_removed_slot_discards_buffer() {
        let hub = ChannelHub::new(LoopbackContext::new());
        let id = EndpointId::named("gone");

        hub.post(Frame::Port {
            to: id.clone(),
            payload: chunk(b"orphan"),
        });
        tokio::task::yield_now().await;

        hub.remove(&id);
        let mut rx = hub.start(&id);
        assert!(rx.try_recv().is_err());
    }
}
