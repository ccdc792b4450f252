// src/lib.rs
//! Mirage
//!
//! Lets code running inside a page-like execution context expose an HTTP
//! server that answers requests the context itself issues: an interception
//! agent sits in front of outgoing network calls and reroutes matching ones,
//! as streamed request/response descriptors, back into the context's own
//! process, where a conventional-looking server dispatches them.
//!
//! # Architecture
//!
//! The crate is structured into several key modules:
//!
//! - **context**: the minimal cross-context transport (`post` / `subscribe`)
//! - **wire**: the tagged union of frames crossing a transport
//! - **channel**: buffered duplex endpoints and streamed bodies over them
//! - **codec**: request/response descriptor encode/decode
//! - **agent**: the interception state machine (probe, bypass, proxy, race)
//! - **server**: Socket / IncomingMessage / ServerResponse / Server emulation
//! - **lifecycle**: arm/disarm management of the interception agent
//! - **observability**: tracing initialization
//! - **utils**: error taxonomy and configuration
//!
//! # Data flow
//!
//! ```text
//! caller ──► InterceptionAgent ──► RequestDescriptor ──► Server
//!                 ▲                 (body channel)          │
//!                 │                                         ▼
//!                 └──── ResponseDescriptor ◄──── handler(req, res)
//!                        (body channel)
//! ```

pub mod agent;
pub mod channel;
pub mod codec;
pub mod context;
pub mod lifecycle;
pub mod observability;
pub mod server;
pub mod utils;
pub mod wire;

// Re-export commonly used types
pub use agent::{HttpBackend, InterceptionAgent, NetworkBackend};
pub use channel::{pump_body, Body, ChannelEndpoint, ChannelHub, ChannelPair};
pub use codec::{RequestDescriptor, RequestOptions, ResponseDescriptor};
pub use context::{Context, LinkedContext, LoopbackContext};
pub use lifecycle::{AgentLifecycle, InProcessLifecycle};
pub use server::{create_server, IncomingMessage, Server, ServerAddress, ServerResponse, Socket};
pub use utils::config::{FallbackPolicy, InterceptConfig, MirageConfig, TransportConfig};
pub use utils::errors::{MirageError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
