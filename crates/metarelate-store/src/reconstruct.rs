//! Rebuilds the immutable domain tree from stored fragments.
//!
//! Resolution is recursive and follows the fragment references downwards:
//! mapping → concepts → components → property components → properties,
//! and mapping → value maps → values → scoped properties. The references
//! form a DAG by construction, so no cycle detection is done. Any id that
//! cannot be fetched is a hard `DanglingReference`.

use metarelate_core::fragment::parse_flag;
use metarelate_core::pred::*;
use metarelate_core::{
    term, Component, Concept, CoreError, Fragment, FragmentId, FragmentKind, Item, Mapping,
    MappingStatus, Member, Property, PropertyComponent, PropertyValue, ScopedProperty, Value,
    ValueMap, ValueObject,
};

use crate::error::StoreError;
use crate::repository::FragmentRepository;
use crate::traits::GraphStore;

/// Read-side view over a [`FragmentRepository`].
pub struct StructuralReconstructor<'a, S> {
    repo: &'a FragmentRepository<S>,
}

impl<'a, S: GraphStore> StructuralReconstructor<'a, S> {
    pub fn new(repo: &'a FragmentRepository<S>) -> Self {
        StructuralReconstructor { repo }
    }

    /// Resolves a stored mapping into its full tree.
    pub fn resolve(&self, id: &FragmentId) -> Result<Mapping, StoreError> {
        let fragment = self.repo.fetch_expected(FragmentKind::Mapping, id)?;
        let attrs = &fragment.attributes;

        let source = self.concept(&reference(&fragment, SOURCE)?)?;
        let target = self.concept(&reference(&fragment, TARGET)?)?;

        let invertible = required(&fragment, INVERTIBLE)
            .and_then(|flag| {
                parse_flag(flag)
                    .ok_or_else(|| StoreError::malformed(id, format!("bad {} {}", INVERTIBLE, flag)))
            })?;
        let status = MappingStatus::from_term(required(&fragment, STATUS)?)
            .map_err(|e| domain(id, e))?;

        let mut value_maps = Vec::new();
        for vm in attrs.objects(HAS_VALUE_MAP) {
            value_maps.push(self.value_map(&FragmentId::new(vm))?);
        }

        let replaces = match attrs.first(REPLACES) {
            Some(older) => Some(self.item(older)?),
            None => None,
        };

        tracing::debug!(%id, value_maps = value_maps.len(), "resolved mapping");
        Ok(Mapping {
            uri: Item::new(id.to_n3()),
            source,
            target,
            invertible,
            status,
            reason: lexical(required(&fragment, REASON)?),
            creator: self.item(required(&fragment, CREATOR)?)?,
            date: lexical(required(&fragment, DATE)?),
            note: attrs.first(NOTE).map(lexical),
            replaces,
            owners: attrs.objects(OWNER).iter().map(|o| lexical(o)).collect(),
            watchers: attrs.objects(WATCHER).iter().map(|o| lexical(o)).collect(),
            value_maps,
        })
    }

    /// [`StructuralReconstructor::resolve`] with source and target roles
    /// swapped, for invertible mappings only.
    pub fn resolve_inverse(&self, id: &FragmentId) -> Result<Mapping, StoreError> {
        self.resolve(id)?
            .inverted()
            .ok_or_else(|| StoreError::NotInvertible { id: id.clone() })
    }

    /// A concept is the root component of a property tree, scoped to its
    /// format.
    pub fn concept(&self, id: &FragmentId) -> Result<Concept, StoreError> {
        let fragment = self.repo.fetch_expected(FragmentKind::Component, id)?;
        let scheme = self.item(required(&fragment, HAS_FORMAT)?)?;
        let component = self.component(&fragment)?;
        Ok(Concept::new(scheme, component))
    }

    // -- components ---------------------------------------------------------

    fn component(&self, fragment: &Fragment) -> Result<Component, StoreError> {
        let mut members = Vec::new();
        for child in fragment.attributes.objects(HAS_COMPONENT) {
            let child = self
                .repo
                .fetch_expected(FragmentKind::Component, &FragmentId::new(child))?;
            members.push(self.member(&child)?);
        }
        if fragment.attributes.contains(HAS_PROPERTY) {
            members.push(Member::Properties(self.property_component(fragment)?));
        }
        Component::try_new(Item::new(fragment.id.to_n3()), members).map_err(|e| domain(&fragment.id, e))
    }

    fn member(&self, fragment: &Fragment) -> Result<Member, StoreError> {
        if fragment.attributes.contains(HAS_COMPONENT) {
            Ok(Member::Component(self.component(fragment)?))
        } else {
            Ok(Member::Properties(self.property_component(fragment)?))
        }
    }

    fn property_component(&self, fragment: &Fragment) -> Result<PropertyComponent, StoreError> {
        let mut properties = Vec::new();
        for property in fragment.attributes.objects(HAS_PROPERTY) {
            properties.push(self.property(&FragmentId::new(property))?);
        }
        PropertyComponent::try_new(Item::new(fragment.id.to_n3()), properties)
            .map_err(|e| domain(&fragment.id, e))
    }

    // -- properties ---------------------------------------------------------

    fn property(&self, id: &FragmentId) -> Result<Property, StoreError> {
        let fragment = self.repo.fetch_expected(FragmentKind::Property, id)?;
        let attrs = &fragment.attributes;
        let name = self.item(required(&fragment, NAME)?)?;

        let value = if let Some(value) = attrs.first(VALUE) {
            Some(PropertyValue::Item(self.item(value)?))
        } else if let Some(nested) = attrs.first(HAS_COMPONENT) {
            let nested = self
                .repo
                .fetch_expected(FragmentKind::Component, &FragmentId::new(nested))?;
            if nested.attributes.contains(HAS_COMPONENT) {
                return Err(StoreError::malformed(
                    &nested.id,
                    "a property value component holds properties only",
                ));
            }
            Some(PropertyValue::Component(self.property_component(&nested)?))
        } else {
            None
        };
        let operator = match attrs.first(OPERATOR) {
            Some(op) => Some(self.item(op)?),
            None => None,
        };

        Property::try_new(Item::new(id.to_n3()), name, value, operator).map_err(|e| domain(id, e))
    }

    fn scoped_property(&self, id: &FragmentId) -> Result<ScopedProperty, StoreError> {
        let fragment = self.repo.fetch_expected(FragmentKind::ScopedProperty, id)?;
        Ok(ScopedProperty {
            uri: Item::new(id.to_n3()),
            scope: self.item(required(&fragment, SCOPE)?)?,
            property: self.property(&reference(&fragment, HAS_PROPERTY)?)?,
        })
    }

    // -- value maps ---------------------------------------------------------

    fn value_map(&self, id: &FragmentId) -> Result<ValueMap, StoreError> {
        let fragment = self.repo.fetch_expected(FragmentKind::ValueMap, id)?;
        Ok(ValueMap {
            uri: Item::new(id.to_n3()),
            source: self.value(&reference(&fragment, SOURCE)?)?,
            target: self.value(&reference(&fragment, TARGET)?)?,
        })
    }

    fn value(&self, id: &FragmentId) -> Result<Value, StoreError> {
        let fragment = self.repo.fetch_expected(FragmentKind::Value, id)?;
        let attrs = &fragment.attributes;
        let subject = self.scoped_property(&reference(&fragment, SUBJECT)?)?;

        let object = match attrs.first(OBJECT) {
            Some(object) => Some(self.value_object(object)?),
            None => None,
        };
        let operator = match attrs.first(OPERATOR) {
            Some(op) => Some(self.item(op)?),
            None => None,
        };

        Ok(Value {
            uri: Item::new(id.to_n3()),
            subject,
            object,
            operator,
        })
    }

    fn value_object(&self, object: &str) -> Result<ValueObject, StoreError> {
        if term::as_uri(object).is_some() {
            let id = FragmentId::new(object);
            if self.repo.kind_of(&id) == Some(FragmentKind::ScopedProperty) {
                return Ok(ValueObject::Scoped(self.scoped_property(&id)?));
            }
        }
        Ok(ValueObject::Literal(self.item(object)?))
    }

    /// A stored term plus its label: the `skos:notation` of a URI when one is
    /// stored, the lexical form of a literal.
    fn item(&self, object: &str) -> Result<Item, StoreError> {
        if let Some(uri) = term::as_uri(object) {
            return Ok(match self.repo.notation(uri)? {
                Some(label) => Item::with_notation(object, label),
                None => Item::new(object),
            });
        }
        Ok(match term::literal_lexical(object) {
            Some(label) => Item::with_notation(object, label),
            None => Item::with_notation(object, object),
        })
    }
}

fn required<'f>(fragment: &'f Fragment, predicate: &str) -> Result<&'f str, StoreError> {
    fragment
        .attributes
        .first(predicate)
        .ok_or_else(|| StoreError::malformed(&fragment.id, format!("missing {}", predicate)))
}

fn reference(fragment: &Fragment, predicate: &str) -> Result<FragmentId, StoreError> {
    let object = required(fragment, predicate)?;
    term::as_uri(object).map(FragmentId::new).ok_or_else(|| {
        StoreError::malformed(&fragment.id, format!("{} is not a reference: {}", predicate, object))
    })
}

fn lexical(object: &str) -> String {
    term::literal_lexical(object).unwrap_or_else(|| object.to_string())
}

fn domain(id: &FragmentId, error: CoreError) -> StoreError {
    StoreError::malformed(id, error.to_string())
}
