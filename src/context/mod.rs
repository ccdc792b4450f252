// src/context/mod.rs
//! Cross-context message transports
//!
//! A `Context` is the minimal capability every transport satisfies: post a
//! frame toward the remote side, subscribe to frames arriving from it, and
//! optionally drive the remote agent's lifecycle. Implementations are
//! selected by construction:
//!
//! - **LoopbackContext**: a single side; posts are delivered to its own
//!   subscribers (same-thread wiring, used by channel tests).
//! - **LinkedContext**: two cross-wired sides; each side's posts become the
//!   other side's inbound frames (the in-process analog of bridging a page
//!   and its privileged worker).

pub mod linked;
pub mod loopback;

pub use linked::LinkedContext;
pub use loopback::LoopbackContext;

use crate::utils::errors::{MirageError, Result};
use crate::wire::Frame;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

/// Stream of inbound frames. Dropping the stream is the cleanup.
pub type FrameStream = mpsc::UnboundedReceiver<Frame>;

/// Minimal transport capability consumed by agents, servers, and channels
pub trait Context: Send + Sync {
    /// Deliver a frame to the remote side. Fire-and-forget; delivery is
    /// asynchronous and frames posted before any subscriber exists are lost.
    fn post(&self, frame: Frame);

    /// Subscribe to frames arriving from the remote side.
    fn subscribe(&self) -> FrameStream;

    /// Tear down and restart the remote interception agent, where supported.
    fn reload_worker(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Err(MirageError::Unsupported("Context::reload_worker")) })
    }

    /// Permanently remove the remote interception agent, where supported.
    fn unload_worker(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Err(MirageError::Unsupported("Context::unload_worker")) })
    }
}
