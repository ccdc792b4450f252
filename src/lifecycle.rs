// src/lifecycle.rs
//! Agent lifecycle management
//!
//! The server consumes this interface to arm and disarm interception; the
//! concrete manager is external (a registration layer in a real embedding).
//! `InProcessLifecycle` is the in-process implementation: it speaks the
//! arm/fin sentinels over a context and grants the agent a short grace
//! period to acknowledge teardown.

use crate::context::Context;
use crate::utils::config::TransportConfig;
use crate::utils::errors::{MirageError, Result};
use crate::wire::Frame;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Arms, disarms, and manages the remote interception agent
pub trait AgentLifecycle: Send + Sync {
    /// Activate interception. Readiness is observed by the caller as the arm
    /// acknowledgement on its own subscription.
    fn arm(&self) -> BoxFuture<'_, Result<()>>;

    /// Deactivate interception, best-effort waiting for the acknowledgement.
    fn disarm(&self) -> BoxFuture<'_, Result<()>>;

    /// Reinstall the agent, where the transport supports it.
    fn reload(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Err(MirageError::Unsupported("AgentLifecycle::reload")) })
    }

    /// Permanently remove the agent, where the transport supports it.
    fn unload(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Err(MirageError::Unsupported("AgentLifecycle::unload")) })
    }
}

/// Lifecycle manager speaking the arm/fin sentinels over a context
pub struct InProcessLifecycle {
    context: Arc<dyn Context>,
    disarm_grace: Duration,
}

impl InProcessLifecycle {
    pub fn new(context: Arc<dyn Context>) -> Self {
        Self::with_config(context, &TransportConfig::default())
    }

    pub fn with_config(context: Arc<dyn Context>, transport: &TransportConfig) -> Self {
        Self {
            context,
            disarm_grace: Duration::from_millis(transport.disarm_ack_ms),
        }
    }
}

impl AgentLifecycle for InProcessLifecycle {
    fn arm(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            debug!("arming interception agent");
            self.context.post(Frame::Arm);
            Ok(())
        })
    }

    fn disarm(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            debug!("disarming interception agent");
            let mut frames = self.context.subscribe();
            self.context.post(Frame::Fin);

            // Race the fin acknowledgement against a short grace budget; a
            // silent agent must not wedge teardown.
            let _ = tokio::time::timeout(self.disarm_grace, async {
                while let Some(frame) = frames.recv().await {
                    if matches!(frame, Frame::Fin) {
                        break;
                    }
                }
            })
            .await;

            Ok(())
        })
    }

    fn reload(&self) -> BoxFuture<'_, Result<()>> {
        self.context.reload_worker()
    }

    fn unload(&self) -> BoxFuture<'_, Result<()>> {
        self.context.unload_worker()
    }
}
