pub mod namespace;
pub mod term;
pub mod id;
pub mod error;
pub mod fragment;
pub mod body;
pub mod model;

// Re-export commonly used types
pub use namespace::Namespaces;
pub use id::{FragmentId, GraphName};
pub use error::CoreError;
pub use fragment::{pred, validate, Attributes, Fragment, FragmentKind, Objects};
pub use body::{
    ComponentBody, ContactBody, FragmentBody, MappingBody, MediatorBody, PropertyAssignment,
    PropertyBody, PropertyTarget, ScopedPropertyBody, ValueAssignment, ValueBody, ValueMapBody,
};
pub use model::{
    Component, Concept, Item, Mapping, MappingStatus, Member, Property, PropertyComponent,
    PropertyValue, ScopedProperty, Value, ValueMap, ValueObject,
};
