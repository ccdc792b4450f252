// src/channel/mod.rs
//! The cross-context channel primitive
//!
//! This module provides the duplex conduit everything else is built on:
//!
//! - **ChannelHub**: one per context side; routes inbound port frames to
//!   endpoints and hands control frames to the side's single consumer
//! - **ChannelEndpoint / ChannelPair**: named endpoints with
//!   buffer-until-started delivery, idempotent close, and detach/adopt
//!   transfer across the transport
//! - **Body / pump_body**: byte streams over a pair, terminated by the
//!   reserved end-of-stream marker

pub mod endpoint;
pub mod hub;
pub mod stream;

pub use endpoint::{ChannelEndpoint, ChannelPair};
pub use hub::{ChannelHub, PortReceiver};
pub use stream::{pump_body, Body};
