//! The immutable domain tree produced by reconstruction.
//!
//! A [`Mapping`] relates a source [`Concept`] to a target [`Concept`]. A
//! concept is the root [`Component`] of a property hierarchy scoped to a
//! format; components aggregate sub-components or [`PropertyComponent`]s,
//! and a property component aggregates uniquely named [`Property`]s whose
//! value is either a terminal [`Item`] or another property component.
//!
//! These are read-only views: nothing here refers back to the store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::term;

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A literal or URI plus its human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Item {
    pub data: String,
    pub notation: Option<String>,
}

impl Item {
    pub fn new(data: impl Into<String>) -> Self {
        Item {
            data: data.into(),
            notation: None,
        }
    }

    /// Builds an item with a label; surrounding quotes on the label are dropped.
    pub fn with_notation(data: impl Into<String>, notation: impl Into<String>) -> Self {
        let notation = notation.into();
        let notation = match notation.strip_prefix('"').and_then(|n| n.strip_suffix('"')) {
            Some(inner) => inner.to_string(),
            None => notation,
        };
        Item {
            data: data.into(),
            notation: Some(notation),
        }
    }

    /// True when `data` is an absolute URI with a scheme and an authority.
    pub fn is_uri(&self) -> bool {
        let data = term::as_uri(&self.data).unwrap_or(&self.data);
        match data.split_once("://") {
            Some((scheme, rest)) => {
                !scheme.is_empty()
                    && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
                    && !rest.split('/').next().unwrap_or_default().is_empty()
            }
            None => false,
        }
    }

    /// Both data and notation are known.
    pub fn complete(&self) -> bool {
        self.notation.is_some()
    }

    /// Matches `text` against the data, or case-insensitively against the label.
    pub fn matches(&self, text: &str) -> bool {
        self.data == text
            || self
                .notation
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(text))
    }

    /// The label when there is one, the data otherwise.
    pub fn label(&self) -> &str {
        self.notation.as_deref().unwrap_or(&self.data)
    }
}

impl PartialEq<str> for Item {
    fn eq(&self, other: &str) -> bool {
        self.matches(other)
    }
}

impl PartialEq<&str> for Item {
    fn eq(&self, other: &&str) -> bool {
        self.matches(other)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// The value side of a property: terminal item or nested structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Item(Item),
    Component(PropertyComponent),
}

/// A named property, e.g. `standard_name = air_temperature`.
///
/// Value and operator are both present or both absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    uri: Item,
    name: Item,
    value: Option<PropertyValue>,
    operator: Option<Item>,
}

impl Property {
    /// A property with a name only.
    pub fn named(uri: Item, name: Item) -> Self {
        Property {
            uri,
            name,
            value: None,
            operator: None,
        }
    }

    /// A property with a value and its operator.
    pub fn with_value(uri: Item, name: Item, value: PropertyValue, operator: Item) -> Self {
        Property {
            uri,
            name,
            value: Some(value),
            operator: Some(operator),
        }
    }

    /// Checked constructor for data read from the store.
    pub fn try_new(
        uri: Item,
        name: Item,
        value: Option<PropertyValue>,
        operator: Option<Item>,
    ) -> Result<Self, CoreError> {
        if value.is_some() != operator.is_some() {
            return Err(CoreError::UnpairedProperty { uri: uri.data });
        }
        Ok(Property {
            uri,
            name,
            value,
            operator,
        })
    }

    pub fn uri(&self) -> &Item {
        &self.uri
    }

    pub fn name(&self) -> &Item {
        &self.name
    }

    pub fn value(&self) -> Option<&PropertyValue> {
        self.value.as_ref()
    }

    pub fn operator(&self) -> Option<&Item> {
        self.operator.as_ref()
    }

    /// The terminal value, when the property is simple and set.
    pub fn item(&self) -> Option<&Item> {
        match &self.value {
            Some(PropertyValue::Item(item)) => Some(item),
            _ => None,
        }
    }

    /// Simple iff the value is an item (or unset).
    pub fn simple(&self) -> bool {
        !self.compound()
    }

    pub fn compound(&self) -> bool {
        matches!(self.value, Some(PropertyValue::Component(_)))
    }

    /// Simple, set, and the value carries a label.
    pub fn complete(&self) -> bool {
        self.item().is_some_and(Item::complete)
    }
}

// ---------------------------------------------------------------------------
// PropertyComponent
// ---------------------------------------------------------------------------

/// One or more uniquely named properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyComponent {
    uri: Item,
    properties: Vec<Property>,
}

impl PropertyComponent {
    pub fn try_new(uri: Item, mut properties: Vec<Property>) -> Result<Self, CoreError> {
        if properties.is_empty() {
            return Err(CoreError::EmptyComponent { uri: uri.data });
        }
        properties.sort_by(|a, b| a.name.data.cmp(&b.name.data));
        if let Some(dup) = properties
            .windows(2)
            .find(|pair| pair[0].name.data == pair[1].name.data)
        {
            return Err(CoreError::DuplicateProperty {
                component: uri.data,
                name: dup[0].name.data.clone(),
            });
        }
        Ok(PropertyComponent { uri, properties })
    }

    pub fn uri(&self) -> &Item {
        &self.uri
    }

    /// Looks a property up by name (URI or label).
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name.matches(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Simple iff every property is simple.
    pub fn simple(&self) -> bool {
        self.properties.iter().all(Property::simple)
    }

    pub fn compound(&self) -> bool {
        !self.simple()
    }
}

// ---------------------------------------------------------------------------
// Component and Concept
// ---------------------------------------------------------------------------

/// A member of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Member {
    Component(Component),
    Properties(PropertyComponent),
}

impl Member {
    pub fn uri(&self) -> &Item {
        match self {
            Member::Component(c) => c.uri(),
            Member::Properties(p) => p.uri(),
        }
    }
}

/// One or more sub-components or property components, ordered by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    uri: Item,
    members: Vec<Member>,
}

impl Component {
    pub fn try_new(uri: Item, mut members: Vec<Member>) -> Result<Self, CoreError> {
        if members.is_empty() {
            return Err(CoreError::EmptyComponent { uri: uri.data });
        }
        members.sort_by(|a, b| a.uri().data.cmp(&b.uri().data));
        Ok(Component { uri, members })
    }

    pub fn uri(&self) -> &Item {
        &self.uri
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, index: usize) -> Option<&Member> {
        self.members.get(index)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Simple iff exactly one member and it is a property component.
    pub fn simple(&self) -> bool {
        matches!(self.members.as_slice(), [Member::Properties(_)])
    }

    pub fn compound(&self) -> bool {
        !self.simple()
    }

    /// Name-based property access; only defined for simple components.
    pub fn get(&self, name: &str) -> Result<Option<&Property>, CoreError> {
        match self.members.as_slice() {
            [Member::Properties(props)] => Ok(props.get(name)),
            _ => Err(CoreError::CompoundAccess {
                uri: self.uri.data.clone(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> Result<bool, CoreError> {
        Ok(self.get(name)?.is_some())
    }
}

/// The root component of a property tree, scoped to a format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    scheme: Item,
    component: Component,
}

impl Concept {
    pub fn new(scheme: Item, component: Component) -> Self {
        Concept { scheme, component }
    }

    pub fn uri(&self) -> &Item {
        self.component.uri()
    }

    pub fn scheme(&self) -> &Item {
        &self.scheme
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    /// Short format name, e.g. `cf` for `<…/format/cf>`.
    pub fn format(&self) -> &str {
        let data = term::as_uri(&self.scheme.data).unwrap_or(&self.scheme.data);
        data.trim_end_matches('/').rsplit('/').next().unwrap_or(data)
    }

    pub fn simple(&self) -> bool {
        self.component.simple()
    }

    pub fn compound(&self) -> bool {
        self.component.compound()
    }

    pub fn get(&self, name: &str) -> Result<Option<&Property>, CoreError> {
        self.component.get(name)
    }
}

// ---------------------------------------------------------------------------
// Value maps
// ---------------------------------------------------------------------------

/// A property tagged with the role it plays in a value map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedProperty {
    pub uri: Item,
    pub scope: Item,
    pub property: Property,
}

/// Right-hand side of a value expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueObject {
    Scoped(ScopedProperty),
    Literal(Item),
}

/// `subject [operator object]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub uri: Item,
    pub subject: ScopedProperty,
    pub object: Option<ValueObject>,
    pub operator: Option<Item>,
}

/// Translates a source value into a target value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMap {
    pub uri: Item,
    pub source: Value,
    pub target: Value,
}

impl ValueMap {
    pub fn inverted(&self) -> ValueMap {
        ValueMap {
            uri: self.uri.clone(),
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Workflow state of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingStatus {
    Draft,
    Proposed,
    Approved,
    Broken,
    Deprecated,
}

impl MappingStatus {
    pub const ALL: [MappingStatus; 5] = [
        MappingStatus::Draft,
        MappingStatus::Proposed,
        MappingStatus::Approved,
        MappingStatus::Broken,
        MappingStatus::Deprecated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MappingStatus::Draft => "Draft",
            MappingStatus::Proposed => "Proposed",
            MappingStatus::Approved => "Approved",
            MappingStatus::Broken => "Broken",
            MappingStatus::Deprecated => "Deprecated",
        }
    }

    /// Parses a stored status, quoted or bare.
    pub fn from_term(term: &str) -> Result<Self, CoreError> {
        let text = term::literal_lexical(term).unwrap_or_else(|| term.to_string());
        text.parse()
    }

    /// The status as an N3 literal.
    pub fn to_term(self) -> String {
        term::literal(self.as_str())
    }

    /// Broken and deprecated mappings take no part in validation.
    pub fn is_active(self) -> bool {
        !matches!(self, MappingStatus::Broken | MappingStatus::Deprecated)
    }
}

impl FromStr for MappingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MappingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::InvalidStatus {
                status: s.to_string(),
            })
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source → target translation rule with its workflow metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub uri: Item,
    pub source: Concept,
    pub target: Concept,
    pub invertible: bool,
    pub status: MappingStatus,
    pub reason: String,
    pub creator: Item,
    pub date: String,
    pub note: Option<String>,
    pub replaces: Option<Item>,
    pub owners: Vec<String>,
    pub watchers: Vec<String>,
    pub value_maps: Vec<ValueMap>,
}

impl Mapping {
    /// The same rule read target → source, when the mapping allows it.
    pub fn inverted(&self) -> Option<Mapping> {
        if !self.invertible {
            return None;
        }
        let mut inverse = self.clone();
        std::mem::swap(&mut inverse.source, &mut inverse.target);
        inverse.value_maps = self.value_maps.iter().map(ValueMap::inverted).collect();
        Some(inverse)
    }
}
