// src/context/loopback.rs
//! Same-side transport: posts are delivered to this context's own subscribers

use crate::context::{Context, FrameStream};
use crate::wire::Frame;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// In-process transport where both halves of a conversation share one side.
///
/// Useful for exercising channel pairs whose endpoints live in the same
/// context; a port frame posted by either endpoint loops straight back and
/// is routed to its peer.
#[derive(Default)]
pub struct LoopbackContext {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Frame>>>,
}

impl LoopbackContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Context for LoopbackContext {
    fn post(&self, frame: Frame) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
    }

    fn subscribe(&self) -> FrameStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}
