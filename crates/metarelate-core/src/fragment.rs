//! Fragments: the stored, content-addressed units of metadata.
//!
//! A fragment is a subject URI plus an attribute map of predicate name to
//! one or more N3 objects. Each [`FragmentKind`] carries fixed predicate
//! tables (allowed, mandated, single-valued, unordered, omitted from
//! identity) that [`validate`] enforces before anything reaches the store.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::FragmentId;
use crate::model::MappingStatus;
use crate::namespace::Namespaces;
use crate::term;

/// Predicate names used by the fragment kinds and the store bookkeeping.
pub mod pred {
    pub const NAME: &str = "mr:name";
    pub const VALUE: &str = "rdf:value";
    pub const OPERATOR: &str = "mr:operator";
    pub const HAS_COMPONENT: &str = "mr:hasComponent";
    pub const HAS_PROPERTY: &str = "mr:hasProperty";
    pub const HAS_FORMAT: &str = "mr:hasFormat";
    pub const REQUIRES: &str = "dc:requires";
    pub const MEDIATES: &str = "dc:mediates";
    pub const SCOPE: &str = "mr:scope";
    pub const SUBJECT: &str = "mr:subject";
    pub const OBJECT: &str = "mr:object";
    pub const SOURCE: &str = "mr:source";
    pub const TARGET: &str = "mr:target";
    pub const INVERTIBLE: &str = "mr:invertible";
    pub const REPLACES: &str = "dc:replaces";
    pub const HAS_VALUE_MAP: &str = "mr:hasValueMap";
    pub const STATUS: &str = "mr:status";
    pub const NOTE: &str = "skos:note";
    pub const REASON: &str = "mr:reason";
    pub const DATE: &str = "dc:date";
    pub const CREATOR: &str = "dc:creator";
    pub const OWNER: &str = "mr:owner";
    pub const WATCHER: &str = "mr:watcher";
    pub const LABEL: &str = "rdfs:label";
    pub const IN_SCHEME: &str = "skos:inScheme";
    pub const DATE_ACCEPTED: &str = "dc:dateAccepted";
    pub const RETIRED: &str = "mr:retired";

    // Bookkeeping, never part of a fragment's attributes.
    pub const TYPE: &str = "rdf:type";
    pub const SAVE_CACHE: &str = "mr:saveCache";
    pub const NOTATION: &str = "skos:notation";
}

use self::pred::*;

/// The kinds of fragment the repository can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FragmentKind {
    Property,
    Component,
    Value,
    ScopedProperty,
    ValueMap,
    Mapping,
    Contact,
    Mediator,
}

impl FragmentKind {
    pub const ALL: [FragmentKind; 8] = [
        FragmentKind::Property,
        FragmentKind::Component,
        FragmentKind::Value,
        FragmentKind::ScopedProperty,
        FragmentKind::ValueMap,
        FragmentKind::Mapping,
        FragmentKind::Contact,
        FragmentKind::Mediator,
    ];

    /// Path segment of this kind's ids.
    pub fn segment(self) -> &'static str {
        match self {
            FragmentKind::Property => "property",
            FragmentKind::Component => "component",
            FragmentKind::Value => "value",
            FragmentKind::ScopedProperty => "scopedProperty",
            FragmentKind::ValueMap => "valueMap",
            FragmentKind::Mapping => "mapping",
            FragmentKind::Contact => "contact",
            FragmentKind::Mediator => "mediator",
        }
    }

    /// The `rdf:type` class stamped on every stored fragment of this kind.
    pub fn class(self) -> &'static str {
        match self {
            FragmentKind::Property => "mr:Property",
            FragmentKind::Component => "mr:Component",
            FragmentKind::Value => "mr:Value",
            FragmentKind::ScopedProperty => "mr:ScopedProperty",
            FragmentKind::ValueMap => "mr:ValueMap",
            FragmentKind::Mapping => "mr:Mapping",
            FragmentKind::Contact => "mr:Contact",
            FragmentKind::Mediator => "mr:Mediator",
        }
    }

    /// Reverse of [`FragmentKind::class`].
    pub fn from_class(class: &str) -> Option<FragmentKind> {
        FragmentKind::ALL.into_iter().find(|k| k.class() == class)
    }

    pub fn allowed(self) -> &'static [&'static str] {
        match self {
            FragmentKind::Property => &[NAME, VALUE, OPERATOR, HAS_COMPONENT],
            FragmentKind::Component => &[HAS_FORMAT, HAS_COMPONENT, HAS_PROPERTY, REQUIRES, MEDIATES],
            FragmentKind::Value => &[SUBJECT, OBJECT, OPERATOR],
            FragmentKind::ScopedProperty => &[SCOPE, HAS_PROPERTY],
            FragmentKind::ValueMap => &[SOURCE, TARGET],
            FragmentKind::Mapping => &[
                SOURCE, TARGET, INVERTIBLE, REPLACES, HAS_VALUE_MAP, STATUS, NOTE, REASON, DATE,
                CREATOR, OWNER, WATCHER,
            ],
            FragmentKind::Contact => &[LABEL, IN_SCHEME, DATE_ACCEPTED, RETIRED],
            FragmentKind::Mediator => &[LABEL, HAS_FORMAT],
        }
    }

    pub fn mandated(self) -> &'static [&'static str] {
        match self {
            FragmentKind::Property => &[NAME],
            FragmentKind::Component => &[HAS_FORMAT],
            FragmentKind::Value => &[SUBJECT],
            FragmentKind::ScopedProperty => &[SCOPE, HAS_PROPERTY],
            FragmentKind::ValueMap => &[SOURCE, TARGET],
            FragmentKind::Mapping => &[SOURCE, TARGET, INVERTIBLE, STATUS, REASON, DATE, CREATOR],
            FragmentKind::Contact => &[LABEL, IN_SCHEME],
            FragmentKind::Mediator => &[LABEL, HAS_FORMAT],
        }
    }

    /// Predicates that may hold several objects, compared as sets.
    ///
    /// Every other allowed predicate is single-valued.
    pub fn unordered(self) -> &'static [&'static str] {
        match self {
            FragmentKind::Component => &[HAS_COMPONENT, HAS_PROPERTY, REQUIRES],
            FragmentKind::Mapping => &[HAS_VALUE_MAP, OWNER, WATCHER],
            _ => &[],
        }
    }

    /// Predicates excluded from the content hash and from exact matching.
    pub fn identity_omitted(self) -> &'static [&'static str] {
        match self {
            FragmentKind::Mapping => &[DATE],
            FragmentKind::Contact => &[DATE_ACCEPTED],
            _ => &[],
        }
    }

    pub fn is_single_valued(self, predicate: &str) -> bool {
        !self.unordered().contains(&predicate)
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FragmentKind::Property => "Property",
            FragmentKind::Component => "Component",
            FragmentKind::Value => "Value",
            FragmentKind::ScopedProperty => "ScopedProperty",
            FragmentKind::ValueMap => "ValueMap",
            FragmentKind::Mapping => "Mapping",
            FragmentKind::Contact => "Contact",
            FragmentKind::Mediator => "Mediator",
        };
        f.write_str(name)
    }
}

/// One object or an ordered list of objects for a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Objects {
    One(String),
    Many(Vec<String>),
}

impl Objects {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Objects::One(o) => std::slice::from_ref(o),
            Objects::Many(os) => os,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.as_slice().first().map(String::as_str)
    }
}

impl From<&str> for Objects {
    fn from(value: &str) -> Self {
        Objects::One(value.to_string())
    }
}

impl From<String> for Objects {
    fn from(value: String) -> Self {
        Objects::One(value)
    }
}

impl From<Vec<String>> for Objects {
    fn from(values: Vec<String>) -> Self {
        Objects::Many(values)
    }
}

/// Ordered predicate → objects map.
///
/// Insertion order is kept for display; hashing and matching never depend
/// on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(IndexMap<String, Objects>);

impl Attributes {
    pub fn new() -> Self {
        Attributes(IndexMap::new())
    }

    /// Sets `predicate`, replacing any earlier objects.
    pub fn insert(&mut self, predicate: &str, objects: impl Into<Objects>) {
        self.0.insert(predicate.to_string(), objects.into());
    }

    /// Builder form of [`Attributes::insert`].
    pub fn with(mut self, predicate: &str, objects: impl Into<Objects>) -> Self {
        self.insert(predicate, objects);
        self
    }

    /// Appends one object to `predicate`, turning it multi-valued if needed.
    pub fn push(&mut self, predicate: &str, object: &str) {
        match self.0.get_mut(predicate) {
            None => {
                self.0
                    .insert(predicate.to_string(), Objects::One(object.to_string()));
            }
            Some(existing) => {
                let mut all = existing.as_slice().to_vec();
                all.push(object.to_string());
                *existing = Objects::Many(all);
            }
        }
    }

    pub fn get(&self, predicate: &str) -> Option<&Objects> {
        self.0.get(predicate)
    }

    /// All objects of `predicate`, empty when absent.
    pub fn objects(&self, predicate: &str) -> &[String] {
        self.0.get(predicate).map(Objects::as_slice).unwrap_or(&[])
    }

    /// The first object of `predicate`.
    pub fn first(&self, predicate: &str) -> Option<&str> {
        self.0.get(predicate).and_then(Objects::first)
    }

    pub fn contains(&self, predicate: &str) -> bool {
        self.0.contains_key(predicate)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Objects)> {
        self.0.iter().map(|(p, o)| (p.as_str(), o))
    }

    pub fn predicates(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this map without the `omitted` predicates.
    pub fn without(&self, omitted: &[&str]) -> Attributes {
        self.iter()
            .filter(|(p, _)| !omitted.contains(p))
            .map(|(p, o)| (p.to_string(), o.clone()))
            .collect()
    }

    /// Puts every predicate and object into canonical form for `kind`.
    ///
    /// Predicate prefixes must be registered; objects go through
    /// [`term::canonical`]; unordered predicates are sorted and de-duplicated;
    /// one-element lists collapse to a single object.
    pub fn canonicalize(&self, kind: FragmentKind, ns: &Namespaces) -> Result<Attributes, CoreError> {
        let mut out = Attributes::new();
        for (predicate, objects) in self.iter() {
            ns.expand(predicate)?;
            let mut canon = objects
                .as_slice()
                .iter()
                .map(|o| term::canonical(o, ns))
                .collect::<Result<Vec<_>, _>>()?;
            if kind.unordered().contains(&predicate) {
                canon.sort();
                canon.dedup();
            }
            let objects = if canon.len() == 1 {
                Objects::One(canon.remove(0))
            } else {
                Objects::Many(canon)
            };
            out.insert(predicate, objects);
        }
        Ok(out)
    }
}

impl FromIterator<(String, Objects)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, Objects)>>(iter: I) -> Self {
        Attributes(iter.into_iter().collect())
    }
}

/// A fragment as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub kind: FragmentKind,
    pub attributes: Attributes,
    /// Created this session and not yet saved to the durable files.
    pub dirty: bool,
}

/// Checks `attributes` against the predicate tables of `kind`.
///
/// Runs before any store round-trip: a failure here never touches the
/// network.
pub fn validate(kind: FragmentKind, attributes: &Attributes) -> Result<(), CoreError> {
    let invalid = |reason: String| CoreError::InvalidFragment { kind, reason };

    let allowed = kind.allowed();
    let mut disallowed: Vec<&str> = attributes
        .predicates()
        .filter(|p| !allowed.contains(p))
        .collect();
    if !disallowed.is_empty() {
        disallowed.sort();
        return Err(invalid(format!(
            "predicates {:?} are not in the allowed set {:?}",
            disallowed, allowed
        )));
    }

    let missing: Vec<&str> = kind
        .mandated()
        .iter()
        .copied()
        .filter(|p| !attributes.contains(p))
        .collect();
    if !missing.is_empty() {
        return Err(invalid(format!("mandated predicates {:?} are missing", missing)));
    }

    for (predicate, objects) in attributes.iter() {
        if objects.is_empty() {
            return Err(invalid(format!("{} has no objects", predicate)));
        }
        if kind.is_single_valued(predicate) && objects.len() != 1 {
            return Err(invalid(format!(
                "{} takes exactly one object, got {}",
                predicate,
                objects.len()
            )));
        }
    }

    match kind {
        FragmentKind::Property => {
            let has_value = attributes.contains(VALUE);
            let has_component = attributes.contains(HAS_COMPONENT);
            if has_value && has_component {
                return Err(invalid(format!(
                    "{} and {} are mutually exclusive",
                    VALUE, HAS_COMPONENT
                )));
            }
            if (has_value || has_component) != attributes.contains(OPERATOR) {
                return Err(invalid(
                    "value and operator must be both set or both unset".to_string(),
                ));
            }
        }
        FragmentKind::Component => {
            if !attributes.contains(HAS_COMPONENT) && !attributes.contains(HAS_PROPERTY) {
                return Err(invalid(format!(
                    "needs {} or {} members",
                    HAS_COMPONENT, HAS_PROPERTY
                )));
            }
        }
        FragmentKind::Value => {
            if attributes.contains(OBJECT) != attributes.contains(OPERATOR) {
                return Err(invalid(
                    "object and operator must be both set or both unset".to_string(),
                ));
            }
        }
        FragmentKind::Mapping => {
            if let Some(status) = attributes.first(STATUS) {
                MappingStatus::from_term(status).map_err(|e| invalid(e.to_string()))?;
            }
            if let Some(flag) = attributes.first(INVERTIBLE) {
                parse_flag(flag).ok_or_else(|| {
                    invalid(format!("{} must be \"True\" or \"False\", got {}", INVERTIBLE, flag))
                })?;
            }
        }
        FragmentKind::ScopedProperty
        | FragmentKind::ValueMap
        | FragmentKind::Contact
        | FragmentKind::Mediator => {}
    }

    Ok(())
}

/// Reads a `"True"`/`"False"` literal (or bare boolean).
pub fn parse_flag(term: &str) -> Option<bool> {
    let text = term::literal_lexical(term).unwrap_or_else(|| term.to_string());
    match text.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(name: &str) -> Attributes {
        Attributes::new().with(NAME, name)
    }

    #[test]
    fn minimal_property_is_valid() {
        assert!(validate(FragmentKind::Property, &property("mrcf:standard_name")).is_ok());
    }

    #[test]
    fn disallowed_predicate_is_rejected() {
        let attrs = property("mrcf:standard_name").with(SOURCE, "<http://x/y>");
        let err = validate(FragmentKind::Property, &attrs).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidFragment {
                kind: FragmentKind::Property,
                ..
            }
        ));
    }

    #[test]
    fn missing_mandated_predicate_is_rejected() {
        let attrs = Attributes::new().with(SCOPE, "\"source\"");
        assert!(validate(FragmentKind::ScopedProperty, &attrs).is_err());
    }

    #[test]
    fn property_value_requires_operator() {
        let attrs = property("mrcf:standard_name").with(VALUE, "cfsn:air_temperature");
        assert!(validate(FragmentKind::Property, &attrs).is_err());
        let attrs = attrs.with(OPERATOR, "<http://www.openmath.org/cd/relation1.xhtml#eq>");
        assert!(validate(FragmentKind::Property, &attrs).is_ok());
    }

    #[test]
    fn single_valued_predicate_rejects_lists() {
        let attrs = Attributes::new().with(NAME, vec!["mrcf:a".to_string(), "mrcf:b".to_string()]);
        assert!(validate(FragmentKind::Property, &attrs).is_err());
    }

    #[test]
    fn component_needs_members() {
        let attrs = Attributes::new().with(HAS_FORMAT, "<http://www.metarelate.net/metOcean/format/cf>");
        assert!(validate(FragmentKind::Component, &attrs).is_err());
        let attrs = attrs.with(
            HAS_PROPERTY,
            vec!["<http://p/1>".to_string(), "<http://p/2>".to_string()],
        );
        assert!(validate(FragmentKind::Component, &attrs).is_ok());
    }

    #[test]
    fn mapping_status_must_be_known() {
        let attrs = Attributes::new()
            .with(SOURCE, "<http://c/1>")
            .with(TARGET, "<http://c/2>")
            .with(INVERTIBLE, "\"True\"")
            .with(STATUS, "\"Sideways\"")
            .with(REASON, "\"new mapping\"")
            .with(DATE, "\"2013-01-01T00:00:00\"^^xsd:dateTime")
            .with(CREATOR, "<https://github.com/someone>");
        assert!(validate(FragmentKind::Mapping, &attrs).is_err());
        let attrs = attrs.with(STATUS, "\"Draft\"");
        assert!(validate(FragmentKind::Mapping, &attrs).is_ok());
    }

    #[test]
    fn canonicalize_sorts_unordered_and_expands() {
        let ns = Namespaces::default();
        let attrs = Attributes::new()
            .with(HAS_FORMAT, "metoc:format/cf")
            .with(
                HAS_PROPERTY,
                vec![
                    "<http://p/2>".to_string(),
                    "<http://p/1>".to_string(),
                    "<http://p/2>".to_string(),
                ],
            );
        let canon = attrs.canonicalize(FragmentKind::Component, &ns).unwrap();
        assert_eq!(
            canon.objects(HAS_PROPERTY),
            &["<http://p/1>".to_string(), "<http://p/2>".to_string()]
        );
        assert_eq!(
            canon.first(HAS_FORMAT),
            Some("<http://www.metarelate.net/metOcean/format/cf>")
        );
    }

    #[test]
    fn canonicalize_rejects_unknown_predicate_prefix() {
        let ns = Namespaces::default();
        let attrs = Attributes::new().with("zz:name", "\"x\"");
        assert!(matches!(
            attrs.canonicalize(FragmentKind::Property, &ns),
            Err(CoreError::UnknownPrefix { .. })
        ));
    }

    #[test]
    fn push_turns_predicate_multi_valued() {
        let mut attrs = Attributes::new();
        attrs.push(OWNER, "\"a\"");
        assert_eq!(attrs.get(OWNER), Some(&Objects::One("\"a\"".into())));
        attrs.push(OWNER, "\"b\"");
        assert_eq!(attrs.objects(OWNER).len(), 2);
    }

    #[test]
    fn class_round_trips() {
        for kind in FragmentKind::ALL {
            assert_eq!(FragmentKind::from_class(kind.class()), Some(kind));
        }
    }

    #[test]
    fn parse_flag_reads_literals() {
        assert_eq!(parse_flag("\"True\""), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag("\"maybe\""), None);
    }
}
