// src/agent/mod.rs
//! Interception layer
//!
//! The agent is placed in front of every outgoing network call of its
//! context and decides per call: answer a readiness probe, bypass to the
//! real network, or proxy into the host contexts and race their answers.
//!
//! - **InterceptionAgent**: the proxying state machine
//! - **InterceptPolicy**: probe path, include/exclude sets, long-poll markers
//! - **PendingRegistry**: in-flight call bookkeeping with event-scoped eviction
//! - **NetworkBackend / HttpBackend**: the escape hatch to the real network

pub mod interceptor;
pub mod network;
pub mod pending;
pub mod policy;

pub use interceptor::InterceptionAgent;
pub use network::{HttpBackend, NetworkBackend};
pub use pending::PendingRegistry;
pub use policy::InterceptPolicy;
