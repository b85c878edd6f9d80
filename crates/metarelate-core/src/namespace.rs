//! The namespace table: short prefixes mapped to base URIs.
//!
//! Every predicate name and every prefixed object is written as
//! `<prefix>:<local>` and resolved through a [`Namespaces`] table. The table is
//! plain configuration data, owned by whoever builds the store and passed down
//! explicitly; there is no process-wide registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Prefix to base-URI table.
///
/// Backed by a `BTreeMap` so that the SPARQL and turtle prologs are always
/// emitted in sorted prefix order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespaces {
    prefixes: BTreeMap<String, String>,
}

impl Namespaces {
    /// Creates an empty table.
    pub fn empty() -> Self {
        Namespaces {
            prefixes: BTreeMap::new(),
        }
    }

    /// Returns the table with `prefix` bound to `base`.
    pub fn with(mut self, prefix: &str, base: &str) -> Self {
        self.insert(prefix, base);
        self
    }

    /// Binds `prefix` to `base`, replacing any earlier binding.
    pub fn insert(&mut self, prefix: &str, base: &str) {
        self.prefixes.insert(prefix.to_string(), base.to_string());
    }

    /// Returns the base URI registered for `prefix`.
    pub fn base(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Iterates `(prefix, base)` pairs in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, b)| (p.as_str(), b.as_str()))
    }

    /// Expands a prefixed name to its full URI (without angle brackets).
    ///
    /// Fails with [`CoreError::UnknownPrefix`] when the prefix is not
    /// registered and [`CoreError::MalformedTerm`] when `curie` has no `:`.
    pub fn expand(&self, curie: &str) -> Result<String, CoreError> {
        let (prefix, local) = curie.split_once(':').ok_or_else(|| CoreError::MalformedTerm {
            term: curie.to_string(),
            reason: "expected <prefix>:<local>".to_string(),
        })?;
        let base = self.base(prefix).ok_or_else(|| CoreError::UnknownPrefix {
            prefix: prefix.to_string(),
            term: curie.to_string(),
        })?;
        Ok(format!("{}{}", base, local))
    }

    /// Compacts a full URI into a prefixed name, if some base covers it.
    ///
    /// The longest matching base wins. The remaining local part must be a
    /// plain name (letters, digits, `_`, `-`, `.`), otherwise `None`.
    pub fn compact(&self, uri: &str) -> Option<String> {
        self.prefixes
            .iter()
            .filter_map(|(prefix, base)| {
                uri.strip_prefix(base.as_str())
                    .filter(|local| is_local_name(local))
                    .map(|local| (base.len(), format!("{}:{}", prefix, local)))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, curie)| curie)
    }

    /// The `PREFIX p: <base>` lines prepended to every query and update.
    pub fn sparql_prolog(&self) -> String {
        let mut out = String::new();
        for (prefix, base) in self.iter() {
            out.push_str(&format!("PREFIX {}: <{}>\n", prefix, base));
        }
        out.push('\n');
        out
    }

    /// The `@prefix p: <base> .` header of a turtle file.
    pub fn turtle_prolog(&self) -> String {
        let mut out = String::new();
        for (prefix, base) in self.iter() {
            out.push_str(&format!("@prefix {}: <{}> .\n", prefix, base));
        }
        out.push('\n');
        out
    }
}

impl Default for Namespaces {
    /// The metOcean registry table.
    fn default() -> Self {
        Namespaces::empty()
            .with("rdfs", "http://www.w3.org/2000/01/rdf-schema#")
            .with("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#")
            .with("skos", "http://www.w3.org/2004/02/skos/core#")
            .with("xsd", "http://www.w3.org/2001/XMLSchema#")
            .with("dc", "http://purl.org/dc/terms/")
            .with("map", "http://www.metarelate.net/metOcean/mapping/")
            .with("cflink", "http://www.metarelate.net/metOcean/cflink/")
            .with("mr", "http://www.metarelate.net/predicates/index.html#")
            .with("mrcf", "http://www.metarelate.net/predicates/CF.html#")
            .with("github", "https://github.com/")
            .with("metoc", "http://www.metarelate.net/metOcean/")
            .with("moStCon", "http://reference.metoffice.gov.uk/def/um/stash/concept/")
            .with("moStND", "http://reference.metoffice.gov.uk/def/um/stash/new_dynamics/")
            .with("moStEG", "http://reference.metoffice.gov.uk/def/um/stash/endgame/")
            .with("mofc", "http://reference.metoffice.gov.uk/def/um/fieldcode/")
            .with("moumdpF3", "http://reference.metoffice.gov.uk/def/um/umdp/F3/")
            .with("moumdpC4", "http://reference.metoffice.gov.uk/def/um/umdp/c4/")
            .with("moumdpC4Pseud", "http://reference.metoffice.gov.uk/def/um/umdp/c4/pseudo/")
            .with("momet08", "http://reference.metoffice.gov.uk/def/um/met08/")
            .with("cfsn", "http://def.cfconventions.org/standard_name/")
            .with("gribapi", "http://def.ecmwf.int/api/grib/keys")
    }
}

fn is_local_name(local: &str) -> bool {
    !local.is_empty()
        && !local.ends_with('.')
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
