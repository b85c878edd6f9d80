//! Core error types for metarelate-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! validation failures of the fragment model and the invariants of the
//! immutable domain tree.

use thiserror::Error;

use crate::fragment::FragmentKind;

/// Core errors produced by the metarelate-core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A prefixed name used a prefix missing from the namespace table.
    #[error("unknown namespace prefix '{prefix}' in '{term}'")]
    UnknownPrefix { prefix: String, term: String },

    /// A term could not be read as a URI, prefixed name or literal.
    #[error("malformed term '{term}': {reason}")]
    MalformedTerm { term: String, reason: String },

    /// An attribute map does not satisfy its kind's predicate tables.
    #[error("invalid {kind} fragment: {reason}")]
    InvalidFragment { kind: FragmentKind, reason: String },

    /// Two properties in one property component share a name.
    #[error("duplicate property name '{name}' in component {component}")]
    DuplicateProperty { component: String, name: String },

    /// A component was built without members.
    #[error("component {uri} must contain at least one member")]
    EmptyComponent { uri: String },

    /// A property carried a value without an operator or the reverse.
    #[error("property {uri}: value and operator must be both set or both unset")]
    UnpairedProperty { uri: String },

    /// Name-based access was attempted on a compound component.
    #[error("component {uri} is compound; access its members by index")]
    CompoundAccess { uri: String },

    /// A mapping status literal is not one of the workflow states.
    #[error("invalid mapping status '{status}'")]
    InvalidStatus { status: String },
}
