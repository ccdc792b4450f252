// src/agent/policy.rs
//! Interception policy
//!
//! Decides, per URL, whether the agent answers a self-diagnostic probe,
//! bypasses to the real network, or proxies into the host — and whether the
//! exchange is exempt from the proxy timeout (long-polling transports).

use crate::utils::config::InterceptConfig;
use crate::utils::errors::{MirageError, Result};
use hyper::Uri;
use regex::Regex;

/// Compiled interception policy
pub struct InterceptPolicy {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    agent_path: Option<String>,
    probe_path: String,
    long_poll_markers: Vec<String>,
}

impl InterceptPolicy {
    /// Compile the pattern sets from configuration
    pub fn from_config(config: &InterceptConfig) -> Result<Self> {
        Ok(Self {
            include: compile(&config.include)?,
            exclude: compile(&config.exclude)?,
            agent_path: config.agent_path.clone(),
            probe_path: config.probe_path.clone(),
            long_poll_markers: config.long_poll_markers.clone(),
        })
    }

    /// Is this the reserved self-diagnostic path?
    pub fn is_probe(&self, uri: &Uri) -> bool {
        uri.path() == self.probe_path
    }

    /// Should this call skip interception entirely?
    pub fn should_bypass(&self, uri: &Uri) -> bool {
        let url = uri.to_string();

        if let Some(agent_path) = &self.agent_path {
            if uri.path().contains(agent_path.as_str()) {
                return true;
            }
        }
        if self.exclude.iter().any(|re| re.is_match(&url)) {
            return true;
        }
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(&url)) {
            return true;
        }
        false
    }

    /// Does this URL look like a long-polling transport?
    pub fn is_long_polling(&self, uri: &Uri) -> bool {
        self.long_poll_markers
            .iter()
            .any(|marker| uri.path().contains(marker.as_str()))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| MirageError::Config(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(config: InterceptConfig) -> InterceptPolicy {
        InterceptPolicy::from_config(&config).unwrap()
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_probe_path_matches_exactly() {
        let p = policy(InterceptConfig::default());
        assert!(p.is_probe(&uri("https://example.com/__status__")));
        assert!(!p.is_probe(&uri("https://example.com/__status__/deep")));
    }

    #[test]
    fn test_default_policy_intercepts_everything() {
        let p = policy(InterceptConfig::default());
        assert!(!p.should_bypass(&uri("https://example.com/anything")));
    }

    #[test]
    fn test_exclude_patterns_bypass() {
        let p = policy(InterceptConfig {
            exclude: vec![r"\.png$".into()],
            ..InterceptConfig::default()
        });
        assert!(p.should_bypass(&uri("https://example.com/logo.png")));
        assert!(!p.should_bypass(&uri("https://example.com/index.html")));
    }

    #[test]
    fn test_include_patterns_limit_interception() {
        let p = policy(InterceptConfig {
            include: vec!["example\\.com".into()],
            ..InterceptConfig::default()
        });
        assert!(!p.should_bypass(&uri("https://example.com/api")));
        assert!(p.should_bypass(&uri("https://other.net/api")));
    }

    #[test]
    fn test_agent_path_always_bypasses() {
        let p = policy(InterceptConfig {
            agent_path: Some("mirage-agent.js".into()),
            ..InterceptConfig::default()
        });
        assert!(p.should_bypass(&uri("https://example.com/static/mirage-agent.js")));
    }

    #[test]
    fn test_long_polling_markers() {
        let p = policy(InterceptConfig::default());
        assert!(p.is_long_polling(&uri("https://example.com/socket.io/?EIO=4")));
        assert!(p.is_long_polling(&uri("https://example.com/engine.io/poll")));
        assert!(!p.is_long_polling(&uri("https://example.com/api")));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let result = InterceptPolicy::from_config(&InterceptConfig {
            include: vec!["(".into()],
            ..InterceptConfig::default()
        });
        assert!(matches!(result, Err(MirageError::Config(_))));
    }
}
