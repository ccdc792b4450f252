// src/utils/config.rs
//! Crate configuration
//!
//! Layered loading: built-in defaults, then an optional `mirage` config file
//! in the working directory, then `MIRAGE_*` environment variables. Sections
//! mirror the two tunable layers: interception policy and transport timing.

use crate::utils::errors::{MirageError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirageConfig {
    /// Interception policy knobs
    pub intercept: InterceptConfig,

    /// Transport handshake timing
    pub transport: TransportConfig,
}

/// What to do when no host context answers within the proxy budget.
///
/// The source history of this pattern is split between re-issuing the real
/// network call and synthesizing a gateway timeout; both are supported and
/// the choice is explicit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Re-issue the original call on the real-network backend.
    #[default]
    Passthrough,
    /// Return a synthetic `504 Gateway Timeout` response.
    GatewayTimeout,
}

/// Interception policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Regex patterns; when non-empty, only matching URLs are intercepted.
    pub include: Vec<String>,

    /// Regex patterns; matching URLs always bypass interception.
    pub exclude: Vec<String>,

    /// Path fragment identifying the agent's own bundle; always bypassed.
    pub agent_path: Option<String>,

    /// Reserved self-diagnostic path answered with a fixed 200.
    pub probe_path: String,

    /// Budget for a proxied exchange before the fallback policy applies.
    pub proxy_timeout_ms: u64,

    /// Path markers of long-polling transports; matching URLs get no timeout.
    pub long_poll_markers: Vec<String>,

    /// Behavior when the proxy budget is exhausted.
    pub fallback: FallbackPolicy,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            include: vec![],
            exclude: vec![],
            agent_path: None,
            probe_path: "/__status__".to_string(),
            proxy_timeout_ms: 30_000,
            long_poll_markers: vec!["/socket.io/".to_string(), "/engine.io/".to_string()],
            fallback: FallbackPolicy::default(),
        }
    }
}

/// Transport handshake timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long `listen` waits for the agent's arm acknowledgement.
    pub arm_timeout_ms: u64,

    /// Grace period granted to the agent for the fin acknowledgement.
    pub disarm_ack_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            arm_timeout_ms: 10_000,
            disarm_ack_ms: 100,
        }
    }
}

impl MirageConfig {
    /// Load configuration from defaults, an optional file, and the environment
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("mirage").required(false))
            .add_source(Environment::with_prefix("MIRAGE").separator("__"))
            .build()
            .map_err(|e| MirageError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| MirageError::Config(e.to_string()))
    }
}
