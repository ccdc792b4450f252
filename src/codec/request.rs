// src/codec/request.rs
//! Request descriptor encode/decode

use crate::channel::{pump_body, Body, ChannelEndpoint, ChannelHub, ChannelPair};
use crate::codec::types::{
    method_can_have_body, RequestDescriptor, RequestMode, RequestOptions,
};
use crate::utils::errors::{MirageError, Result};
use crate::wire::RequestId;
use hyper::{HeaderMap, Request};
use tracing::debug;

pub(crate) fn header_list(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Convert a live request into a transferable descriptor.
///
/// Assigns a fresh id. For methods that may carry a body, the body is pumped
/// through a fresh channel pair on `hub` and the consumer-side endpoint
/// travels in the descriptor.
pub fn encode_request(request: Request<Body>, hub: &ChannelHub) -> RequestDescriptor {
    let id = RequestId::fresh();
    let (parts, body) = request.into_parts();
    let options = parts
        .extensions
        .get::<RequestOptions>()
        .cloned()
        .unwrap_or_default();

    debug!(%id, url = %parts.uri, "encoding request");

    let body_handle = if method_can_have_body(&parts.method) {
        let pair = ChannelPair::new(hub);
        let handle = pair.right.detach();
        pump_body(body, pair.left);
        Some(handle)
    } else {
        None
    };

    RequestDescriptor {
        id,
        url: parts.uri.to_string(),
        method: parts.method.to_string(),
        headers: header_list(&parts.headers),
        mode: options.mode,
        credentials: options.credentials,
        cache: options.cache,
        redirect: options.redirect,
        referrer: options.referrer,
        referrer_policy: options.referrer_policy,
        integrity: options.integrity,
        keepalive: options.keepalive,
        body: body_handle,
    }
}

/// Reconstruct the metadata of a request, without touching its body channel.
///
/// Header names are case-normalized by the header map; a `navigate` mode is
/// dropped in favor of the default, since it cannot be reconstructed. The
/// descriptor id rides along in the request extensions.
pub fn decode_request_head(descriptor: &RequestDescriptor) -> Result<Request<()>> {
    let mut builder = Request::builder()
        .method(descriptor.method.as_str())
        .uri(descriptor.url.as_str());

    for (name, value) in &descriptor.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let mut request = builder
        .body(())
        .map_err(|e| MirageError::Codec(e.to_string()))?;

    let options = RequestOptions {
        mode: match descriptor.mode {
            RequestMode::Navigate => RequestMode::default(),
            mode => mode,
        },
        credentials: descriptor.credentials,
        cache: descriptor.cache,
        redirect: descriptor.redirect,
        referrer: descriptor.referrer.clone(),
        referrer_policy: descriptor.referrer_policy,
        integrity: descriptor.integrity.clone(),
        keepalive: descriptor.keepalive,
    };
    request.extensions_mut().insert(options);
    request.extensions_mut().insert(descriptor.id);

    Ok(request)
}

/// Reconstruct a live request, adopting the descriptor's body endpoint on
/// `hub`. A missing body decodes to an immediately-complete empty stream.
pub fn decode_request(descriptor: &RequestDescriptor, hub: &ChannelHub) -> Result<Request<Body>> {
    debug!(id = %descriptor.id, "decoding request");
    let head = decode_request_head(descriptor)?;
    let (parts, ()) = head.into_parts();

    let body = match &descriptor.body {
        Some(handle) => Body::from_endpoint(ChannelEndpoint::adopt(hub, handle))?,
        None => Body::empty(),
    };

    Ok(Request::from_parts(parts, body))
}
