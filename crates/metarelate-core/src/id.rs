//! Stable identifiers for stored fragments and logical graphs.
//!
//! Both are distinct newtype wrappers over the full URI string, so a
//! `GraphName` cannot be used where a `FragmentId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::term;

/// Content-derived fragment identifier: `<registry>/<kind-segment>/<digest>`.
///
/// Holds the bare URI, without angle brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub String);

/// Name of a logical graph (one durable turtle file each).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphName(pub String);

impl FragmentId {
    /// Builds an id from a URI, accepting either `<uri>` or the bare form.
    pub fn new(uri: &str) -> Self {
        let uri = term::as_uri(uri).unwrap_or(uri);
        FragmentId(uri.to_string())
    }

    /// The bare URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as an N3 URI term, `<…>`.
    pub fn to_n3(&self) -> String {
        term::uri(&self.0)
    }

    /// The trailing path segment (the digest for content-addressed ids).
    pub fn local_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl GraphName {
    pub fn new(uri: &str) -> Self {
        let uri = term::as_uri(uri).unwrap_or(uri);
        GraphName(uri.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_n3(&self) -> String {
        term::uri(&self.0)
    }
}

// Display implementations -- just print the bare URI.

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_id_strips_brackets() {
        let a = FragmentId::new("<http://x.org/property/abc>");
        let b = FragmentId::new("http://x.org/property/abc");
        assert_eq!(a, b);
        assert_eq!(a.to_n3(), "<http://x.org/property/abc>");
    }

    #[test]
    fn fragment_id_local_name() {
        let id = FragmentId::new("http://x.org/property/abc123");
        assert_eq!(id.local_name(), "abc123");
    }

    #[test]
    fn display_prints_bare_uri() {
        assert_eq!(
            format!("{}", GraphName::new("<http://metarelate.net/concepts.ttl>")),
            "http://metarelate.net/concepts.ttl"
        );
    }

    #[test]
    fn serde_roundtrip() {
        let id = FragmentId::new("http://x.org/mapping/1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"http://x.org/mapping/1\"");
        let back: FragmentId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
