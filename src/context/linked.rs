// src/context/linked.rs
//! Cross-wired transport pair: each side's posts feed the other side

use crate::context::{Context, FrameStream};
use crate::wire::Frame;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct Side {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Frame>>>,
}

impl Side {
    fn deliver(&self, frame: Frame) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
    }
}

/// One side of a linked transport pair.
///
/// `LinkedContext::pair` returns two contexts wired so that posting on one
/// delivers to the other's subscribers. This is the in-process stand-in for
/// the page ↔ privileged-worker bridge; remote bridges (iframes, windows,
/// subprocesses) implement the same `Context` trait externally.
pub struct LinkedContext {
    local: Arc<Side>,
    remote: Arc<Side>,
}

impl LinkedContext {
    /// Create a cross-wired pair of contexts
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let a = Arc::new(Side::default());
        let b = Arc::new(Side::default());

        let left = Arc::new(Self {
            local: Arc::clone(&a),
            remote: Arc::clone(&b),
        });
        let right = Arc::new(Self {
            local: b,
            remote: a,
        });

        (left, right)
    }
}

impl Context for LinkedContext {
    fn post(&self, frame: Frame) {
        self.remote.deliver(frame);
    }

    fn subscribe(&self) -> FrameStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.local.subscribers.lock().push(tx);
        rx
    }
}
