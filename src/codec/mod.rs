// src/codec/mod.rs
//! Descriptor codec
//!
//! Converts live `http` requests and responses into transferable descriptors
//! (metadata plus an optional streamed body reference) and back. Fetch-style
//! metadata that `http` types cannot express rides in request extensions.

pub mod request;
pub mod response;
pub mod types;

pub use request::{decode_request, decode_request_head, encode_request};
pub use response::{decode_response, encode_response};
pub use types::{
    method_can_have_body, ReferrerPolicy, RequestCache, RequestCredentials, RequestDescriptor,
    RequestMode, RequestOptions, RequestRedirect, ResponseDescriptor, StatusMessage,
};
