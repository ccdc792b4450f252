// src/utils/errors.rs
//! Error taxonomy for the mirage crate
//!
//! Recoverable conditions (timeouts, unmatched responses, double listen) are
//! ordinary error values; unsupported socket operations fail loudly; a
//! request/response id mismatch is a programming error and asserts instead.

use thiserror::Error;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MirageError>;

/// Errors produced by the channel, codec, agent, and server layers
#[derive(Debug, Error)]
pub enum MirageError {
    /// `listen` was called while the server was already listening.
    #[error("server is already listening")]
    AlreadyListening,

    /// An operation was attempted on a closed channel endpoint.
    #[error("channel endpoint is closed")]
    ChannelClosed,

    /// A second subscriber was attached to a single-consumer stream.
    #[error("stream already has a subscriber")]
    AlreadyStarted,

    /// The response side was finalized and cannot accept more writes.
    #[error("response has already ended")]
    ResponseEnded,

    /// Header mutation after the response head left the process.
    #[error("headers have already been sent")]
    HeadersSent,

    /// No host context answered within the proxy budget.
    #[error("proxy exchange timed out after {0}ms")]
    ProxyTimeout(u64),

    /// The interception agent never acknowledged the arm sentinel.
    #[error("arm handshake timed out after {0}ms")]
    ArmTimeout(u64),

    /// Deliberate capability gap (TCP-only socket options and friends).
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Descriptor encode/decode failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Message transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A bypass or fallback was requested but no network backend exists.
    #[error("no network backend configured")]
    NetworkUnavailable,

    /// The real-network backend failed.
    #[error("network backend error: {0}")]
    Network(String),

    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),
}
