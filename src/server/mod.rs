// src/server/mod.rs
//! Host-side server emulation
//!
//! Turns proxied request descriptors back into a conventional server event
//! sequence:
//!
//! - **Socket**: duplex byte endpoint bound to the exchange's body channels
//! - **IncomingMessage**: read-only request facade
//! - **ServerResponse**: write-only response facade with a headers-sent latch
//! - **Server / create_server**: listen, dispatch, and close over a transport

pub mod incoming;
pub mod response;
pub mod server;
pub mod socket;

pub use incoming::IncomingMessage;
pub use response::ServerResponse;
pub use server::{create_server, Server, ServerAddress};
pub use socket::Socket;
