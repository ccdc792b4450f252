// src/codec/types.rs
//! Descriptor types and request metadata enums

use crate::wire::{BodyHandle, RequestId};
use hyper::Method;
use serde::{Deserialize, Serialize};

/// Fetch-style request mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    #[default]
    Cors,
    NoCors,
    SameOrigin,
    /// Only ever observed on inbound descriptors; not a legal value for a
    /// reconstructed request.
    Navigate,
}

/// Fetch-style credentials policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestCredentials {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// Fetch-style cache policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestCache {
    #[default]
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

/// Fetch-style redirect policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestRedirect {
    #[default]
    Follow,
    Error,
    Manual,
}

/// Fetch-style referrer policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferrerPolicy {
    #[serde(rename = "")]
    #[default]
    Unset,
    NoReferrer,
    NoReferrerWhenDowngrade,
    SameOrigin,
    Origin,
    StrictOrigin,
    OriginWhenCrossOrigin,
    StrictOriginWhenCrossOrigin,
    UnsafeUrl,
}

/// Request metadata that has no place in `http` types.
///
/// Carried in request extensions; `encode_request` reads it (defaulting when
/// absent) and `decode_request` reinstates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub mode: RequestMode,
    pub credentials: RequestCredentials,
    pub cache: RequestCache,
    pub redirect: RequestRedirect,
    pub referrer: String,
    pub referrer_policy: ReferrerPolicy,
    pub integrity: String,
    pub keepalive: bool,
}

/// Custom status message carried in response extensions, when the canonical
/// reason phrase is not wanted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage(pub String);

/// Transferable form of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub id: RequestId,
    pub url: String,
    pub method: String,
    /// Ordered name/value list; original casing preserved.
    pub headers: Vec<(String, String)>,
    pub mode: RequestMode,
    pub credentials: RequestCredentials,
    pub cache: RequestCache,
    pub redirect: RequestRedirect,
    pub referrer: String,
    pub referrer_policy: ReferrerPolicy,
    pub integrity: String,
    pub keepalive: bool,
    /// None for bodiless methods; otherwise the consumer-side endpoint of a
    /// fresh body channel.
    pub body: Option<BodyHandle>,
}

/// Transferable form of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDescriptor {
    /// Matches the originating request descriptor's id.
    pub id: RequestId,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<BodyHandle>,
}

/// Whether `method` may carry a request body
pub fn method_can_have_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serde_names() {
        assert_eq!(
            serde_json::to_string(&RequestMode::NoCors).unwrap(),
            "\"no-cors\""
        );
        assert_eq!(
            serde_json::to_string(&RequestMode::SameOrigin).unwrap(),
            "\"same-origin\""
        );
    }

    #[test]
    fn test_referrer_policy_unset_is_empty_string() {
        assert_eq!(serde_json::to_string(&ReferrerPolicy::Unset).unwrap(), "\"\"");
        let back: ReferrerPolicy = serde_json::from_str("\"\"").unwrap();
        assert_eq!(back, ReferrerPolicy::Unset);
    }

    #[test]
    fn test_method_can_have_body() {
        assert!(!method_can_have_body(&Method::GET));
        assert!(!method_can_have_body(&Method::HEAD));
        assert!(method_can_have_body(&Method::POST));
        assert!(method_can_have_body(&Method::DELETE));
    }

    #[test]
    fn test_descriptor_id_round_trips_through_serde() {
        let desc = RequestDescriptor {
            id: RequestId::fresh(),
            url: "https://example.com/".into(),
            method: "GET".into(),
            headers: vec![("Accept".into(), "*/*".into())],
            mode: RequestMode::Cors,
            credentials: RequestCredentials::SameOrigin,
            cache: RequestCache::Default,
            redirect: RequestRedirect::Follow,
            referrer: String::new(),
            referrer_policy: ReferrerPolicy::Unset,
            integrity: String::new(),
            keepalive: false,
            body: None,
        };

        let json = serde_json::to_string(&desc).unwrap();
        let back: RequestDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, desc.id);
        assert_eq!(back, desc);
    }
}
