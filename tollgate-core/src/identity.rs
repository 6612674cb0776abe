//! Client identity resolution.
//!
//! The throttle is keyed by a [`ClientIdentity`], normally the caller's IP
//! address. It is resolved from a fixed, ordered list of proxy headers
//! followed by the direct connection address, and the **last** candidate in
//! that order which is present wins.
//!
//! # Security Considerations
//!
//! Forwarding headers are attacker-controlled unless a trusted proxy
//! rewrites them. Resolution does not validate network provenance; hosts that
//! sit behind trusted proxies should narrow the header list with
//! [`IdentityResolver::with_headers`].

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// Proxy headers consulted in order, before the direct connection address.
pub const DEFAULT_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-cluster-client-ip",
    "cf-connecting-ip",
    "client-ip",
    "forwarded-for",
    "x-forwarded",
    "forwarded",
    "via",
    "x-coming-from",
    "coming-from",
];

/// The string an authentication attempt is throttled under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An identity with no usable content. Throttling such an identity would
    /// lump unrelated callers together, so services refuse it.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClientIdentity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ClientIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Request header values keyed by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders(HashMap<String, String>);

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a header. Names are case-insensitive.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

/// Resolves a [`ClientIdentity`] from request headers and the peer address.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    headers: Vec<String>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::with_headers(DEFAULT_HEADERS.iter().copied())
    }
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ordered header list. Later entries override earlier ones.
    pub fn with_headers<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Walk the header list, then the direct address, keeping the last
    /// candidate that is present. A header counts as present even when its
    /// value is empty.
    pub fn resolve(&self, headers: &RequestHeaders, remote_addr: Option<&str>) -> ClientIdentity {
        let mut resolved = "";

        for name in &self.headers {
            if let Some(value) = headers.get(name) {
                resolved = value;
            }
        }
        if let Some(addr) = remote_addr {
            resolved = addr;
        }

        ClientIdentity::new(resolved.trim())
    }
}
