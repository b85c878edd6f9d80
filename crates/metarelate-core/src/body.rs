//! Typed fragment bodies.
//!
//! Each body is the compile-time-checked form of one kind's attribute map:
//! mandated predicates are plain fields, optional ones are `Option`s and
//! multi-valued ones are `Vec`s. Every field holds an N3 term (`<uri>`,
//! `prefix:local` or a quoted literal). [`FragmentBody::attributes`] renders
//! the map the repository validates, hashes and stores.

use serde::{Deserialize, Serialize};

use crate::fragment::pred::*;
use crate::fragment::{Attributes, FragmentKind};
use crate::model::MappingStatus;
use crate::term;

/// What a property's value points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyTarget {
    /// A terminal URI or literal (`rdf:value`).
    Value(String),
    /// A nested component id (`mr:hasComponent`).
    Component(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyAssignment {
    pub target: PropertyTarget,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBody {
    pub name: String,
    pub assignment: Option<PropertyAssignment>,
}

impl PropertyBody {
    pub fn named(name: impl Into<String>) -> Self {
        PropertyBody {
            name: name.into(),
            assignment: None,
        }
    }

    /// `name operator value` with a terminal value.
    pub fn valued(
        name: impl Into<String>,
        value: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        PropertyBody {
            name: name.into(),
            assignment: Some(PropertyAssignment {
                target: PropertyTarget::Value(value.into()),
                operator: operator.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentBody {
    pub format: String,
    pub components: Vec<String>,
    pub properties: Vec<String>,
    pub requires: Vec<String>,
    pub mediates: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedPropertyBody {
    pub scope: String,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueAssignment {
    pub object: String,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueBody {
    pub subject: String,
    pub assignment: Option<ValueAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMapBody {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingBody {
    pub source: String,
    pub target: String,
    pub invertible: bool,
    pub status: MappingStatus,
    pub reason: String,
    pub date: String,
    pub creator: String,
    pub note: Option<String>,
    pub replaces: Option<String>,
    pub value_maps: Vec<String>,
    pub owners: Vec<String>,
    pub watchers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactBody {
    pub label: String,
    pub scheme: String,
    pub date_accepted: Option<String>,
    pub retired: Option<String>,
}

/// A named mediation context within one format, referenced by
/// `dc:mediates` on components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediatorBody {
    pub label: String,
    pub format: String,
}

/// One body per creatable fragment kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentBody {
    Property(PropertyBody),
    Component(ComponentBody),
    ScopedProperty(ScopedPropertyBody),
    Value(ValueBody),
    ValueMap(ValueMapBody),
    Mapping(MappingBody),
    Contact(ContactBody),
    Mediator(MediatorBody),
}

impl FragmentBody {
    pub fn kind(&self) -> FragmentKind {
        match self {
            FragmentBody::Property(_) => FragmentKind::Property,
            FragmentBody::Component(_) => FragmentKind::Component,
            FragmentBody::ScopedProperty(_) => FragmentKind::ScopedProperty,
            FragmentBody::Value(_) => FragmentKind::Value,
            FragmentBody::ValueMap(_) => FragmentKind::ValueMap,
            FragmentBody::Mapping(_) => FragmentKind::Mapping,
            FragmentBody::Contact(_) => FragmentKind::Contact,
            FragmentBody::Mediator(_) => FragmentKind::Mediator,
        }
    }

    /// Renders the body as an attribute map.
    pub fn attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        match self {
            FragmentBody::Property(body) => {
                attrs.insert(NAME, body.name.as_str());
                if let Some(assignment) = &body.assignment {
                    match &assignment.target {
                        PropertyTarget::Value(value) => attrs.insert(VALUE, value.as_str()),
                        PropertyTarget::Component(id) => attrs.insert(HAS_COMPONENT, id.as_str()),
                    }
                    attrs.insert(OPERATOR, assignment.operator.as_str());
                }
            }
            FragmentBody::Component(body) => {
                attrs.insert(HAS_FORMAT, body.format.as_str());
                put_many(&mut attrs, HAS_COMPONENT, &body.components);
                put_many(&mut attrs, HAS_PROPERTY, &body.properties);
                put_many(&mut attrs, REQUIRES, &body.requires);
                if let Some(mediates) = &body.mediates {
                    attrs.insert(MEDIATES, mediates.as_str());
                }
            }
            FragmentBody::ScopedProperty(body) => {
                attrs.insert(SCOPE, body.scope.as_str());
                attrs.insert(HAS_PROPERTY, body.property.as_str());
            }
            FragmentBody::Value(body) => {
                attrs.insert(SUBJECT, body.subject.as_str());
                if let Some(assignment) = &body.assignment {
                    attrs.insert(OBJECT, assignment.object.as_str());
                    attrs.insert(OPERATOR, assignment.operator.as_str());
                }
            }
            FragmentBody::ValueMap(body) => {
                attrs.insert(SOURCE, body.source.as_str());
                attrs.insert(TARGET, body.target.as_str());
            }
            FragmentBody::Mapping(body) => {
                attrs.insert(SOURCE, body.source.as_str());
                attrs.insert(TARGET, body.target.as_str());
                let flag = if body.invertible { "True" } else { "False" };
                attrs.insert(INVERTIBLE, term::literal(flag));
                if let Some(replaces) = &body.replaces {
                    attrs.insert(REPLACES, replaces.as_str());
                }
                put_many(&mut attrs, HAS_VALUE_MAP, &body.value_maps);
                attrs.insert(STATUS, body.status.to_term());
                if let Some(note) = &body.note {
                    attrs.insert(NOTE, note.as_str());
                }
                attrs.insert(REASON, body.reason.as_str());
                attrs.insert(DATE, body.date.as_str());
                attrs.insert(CREATOR, body.creator.as_str());
                put_many(&mut attrs, OWNER, &body.owners);
                put_many(&mut attrs, WATCHER, &body.watchers);
            }
            FragmentBody::Contact(body) => {
                attrs.insert(LABEL, body.label.as_str());
                attrs.insert(IN_SCHEME, body.scheme.as_str());
                if let Some(date) = &body.date_accepted {
                    attrs.insert(DATE_ACCEPTED, date.as_str());
                }
                if let Some(retired) = &body.retired {
                    attrs.insert(RETIRED, retired.as_str());
                }
            }
            FragmentBody::Mediator(body) => {
                attrs.insert(LABEL, body.label.as_str());
                attrs.insert(HAS_FORMAT, body.format.as_str());
            }
        }
        attrs
    }
}

fn put_many(attrs: &mut Attributes, predicate: &str, objects: &[String]) {
    if !objects.is_empty() {
        attrs.insert(predicate, objects.to_vec());
    }
}

impl From<PropertyBody> for FragmentBody {
    fn from(body: PropertyBody) -> Self {
        FragmentBody::Property(body)
    }
}

impl From<ComponentBody> for FragmentBody {
    fn from(body: ComponentBody) -> Self {
        FragmentBody::Component(body)
    }
}

impl From<ScopedPropertyBody> for FragmentBody {
    fn from(body: ScopedPropertyBody) -> Self {
        FragmentBody::ScopedProperty(body)
    }
}

impl From<ValueBody> for FragmentBody {
    fn from(body: ValueBody) -> Self {
        FragmentBody::Value(body)
    }
}

impl From<ValueMapBody> for FragmentBody {
    fn from(body: ValueMapBody) -> Self {
        FragmentBody::ValueMap(body)
    }
}

impl From<MappingBody> for FragmentBody {
    fn from(body: MappingBody) -> Self {
        FragmentBody::Mapping(body)
    }
}

impl From<ContactBody> for FragmentBody {
    fn from(body: ContactBody) -> Self {
        FragmentBody::Contact(body)
    }
}

impl From<MediatorBody> for FragmentBody {
    fn from(body: MediatorBody) -> Self {
        FragmentBody::Mediator(body)
    }
}
