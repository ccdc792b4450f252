// src/codec/response.rs
//! Response descriptor encode/decode

use crate::channel::{pump_body, Body, ChannelEndpoint, ChannelHub, ChannelPair};
use crate::codec::request::header_list;
use crate::codec::types::{ResponseDescriptor, StatusMessage};
use crate::utils::errors::{MirageError, Result};
use crate::wire::RequestId;
use hyper::{Response, StatusCode};
use tracing::debug;

/// Convert a live response into a transferable descriptor answering `id`.
///
/// The body always travels over a fresh channel pair; even an empty body
/// produces the end marker, so the consumer observes completion.
pub fn encode_response(
    id: RequestId,
    response: Response<Body>,
    hub: &ChannelHub,
) -> ResponseDescriptor {
    let (parts, body) = response.into_parts();
    debug!(%id, status = %parts.status, "encoding response");

    let status_text = parts
        .extensions
        .get::<StatusMessage>()
        .map(|m| m.0.clone())
        .unwrap_or_else(|| {
            parts
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_string()
        });

    let pair = ChannelPair::new(hub);
    let handle = pair.right.detach();
    pump_body(body, pair.left);

    ResponseDescriptor {
        id,
        status: parts.status.as_u16(),
        status_text,
        headers: header_list(&parts.headers),
        body: Some(handle),
    }
}

/// Reconstruct a live response, adopting the descriptor's body endpoint on
/// `hub`
pub fn decode_response(
    descriptor: &ResponseDescriptor,
    hub: &ChannelHub,
) -> Result<Response<Body>> {
    debug!(id = %descriptor.id, status = descriptor.status, "decoding response");

    let status =
        StatusCode::from_u16(descriptor.status).map_err(|e| MirageError::Codec(e.to_string()))?;

    let mut builder = Response::builder().status(status);
    for (name, value) in &descriptor.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let body = match &descriptor.body {
        Some(handle) => Body::from_endpoint(ChannelEndpoint::adopt(hub, handle))?,
        None => Body::empty(),
    };

    let mut response = builder
        .body(body)
        .map_err(|e| MirageError::Codec(e.to_string()))?;
    response.extensions_mut().insert(descriptor.id);
    response
        .extensions_mut()
        .insert(StatusMessage(descriptor.status_text.clone()));

    Ok(response)
}
