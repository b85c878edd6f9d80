//! Deterministic content hashing for fragments using blake3.
//!
//! A fragment's identity is the digest of its attribute map: every predicate
//! is resolved to its full URI, predicates are sorted, and each
//! `(predicate, object)` pair is fed to the hasher in that order. Predicates
//! listed as omitted (creation timestamps) never reach the hasher.
//!
//! # Determinism
//!
//! - Predicate order in the map never affects the digest.
//! - Objects are fed in the order given. Callers canonicalise the map first
//!   ([`Attributes::canonicalize`]), which sorts the objects of unordered
//!   predicates, so set-valued predicates hash as sets and everything else
//!   stays order-sensitive.
//! - Separator bytes keep `("ab", "c")` and `("a", "bc")` apart.

use metarelate_core::{Attributes, FragmentId, FragmentKind, Namespaces};

use crate::config::StoreConfig;
use crate::error::StoreError;

const FIELD_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;

/// Mints content-derived fragment ids.
#[derive(Debug, Clone)]
pub struct IdentityHasher {
    namespaces: Namespaces,
    registry_base: String,
}

impl IdentityHasher {
    pub fn new(namespaces: Namespaces, registry_base: &str) -> Self {
        IdentityHasher {
            namespaces,
            registry_base: registry_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.namespaces(), &config.registry_base)
    }

    /// Digest of `attributes`, skipping the `omit` predicates.
    ///
    /// Fails with `UnknownPrefix` when a predicate's prefix is unregistered.
    pub fn hash(&self, attributes: &Attributes, omit: &[&str]) -> Result<blake3::Hash, StoreError> {
        let mut resolved = Vec::with_capacity(attributes.len());
        for (predicate, objects) in attributes.iter() {
            if omit.contains(&predicate) {
                continue;
            }
            resolved.push((self.namespaces.expand(predicate)?, objects.as_slice()));
        }
        resolved.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = blake3::Hasher::new();
        for (predicate, objects) in resolved {
            for object in objects {
                hasher.update(predicate.as_bytes());
                hasher.update(&[FIELD_SEP]);
                hasher.update(object.as_bytes());
                hasher.update(&[RECORD_SEP]);
            }
        }
        Ok(hasher.finalize())
    }

    /// `{registry_base}/{kind-segment}/{hex digest}` for a fragment of `kind`.
    pub fn mint(&self, kind: FragmentKind, attributes: &Attributes) -> Result<FragmentId, StoreError> {
        let digest = self.hash(attributes, kind.identity_omitted())?;
        Ok(FragmentId(format!(
            "{}/{}/{}",
            self.registry_base,
            kind.segment(),
            digest.to_hex()
        )))
    }
}
