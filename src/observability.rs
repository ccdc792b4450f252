// src/observability.rs
//! Tracing initialization
//!
//! The crate logs through `tracing` everywhere; embedders that want output
//! call `init_tracing` once (or install their own subscriber).

use crate::utils::errors::{MirageError, Result};
use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Install a fmt subscriber filtered by `RUST_LOG` (default level: info).
/// Safe to call more than once; only the first call installs.
pub fn init_tracing() -> Result<()> {
    INITIALIZED
        .get_or_try_init(|| {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .try_init()
                .map_err(|e| MirageError::Config(e.to_string()))
        })
        .map(|_| ())
}
