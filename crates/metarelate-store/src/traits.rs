//! The [`GraphStore`] trait defining the storage contract for fragments.
//!
//! Two backends implement it:
//! - [`SparqlStore`](crate::sparql::SparqlStore) renders each call as query
//!   or update text for a [`StoreClient`](crate::client::StoreClient).
//! - [`InMemoryStore`](crate::memory::InMemoryStore) keeps the quads in
//!   process, for tests and scratch sessions.
//!
//! Attribute maps crossing this boundary are canonical: prefixed predicate
//! names, canonical N3 objects. Every stored fragment also carries the
//! bookkeeping triples `rdf:type <class>` and, while dirty,
//! `mr:saveCache "True"`; neither appears in [`Fragment::attributes`].

use std::sync::Arc;

use metarelate_core::pred::{SAVE_CACHE, TYPE};
use metarelate_core::{
    Attributes, CoreError, Fragment, FragmentId, FragmentKind, GraphName, Namespaces, Objects,
};

use crate::error::StoreError;

/// The dirty-flag object.
pub const DIRTY_FLAG: &str = "\"True\"";

/// The storage contract for content-addressed fragments.
///
/// Methods take `&self`; backends provide their own interior
/// synchronisation.
pub trait GraphStore {
    // -------------------------------------------------------------------
    // Lookup and creation
    // -------------------------------------------------------------------

    /// Ids of the `kind` fragments in `graph` whose attributes equal
    /// `attributes` exactly.
    ///
    /// Predicates in [`FragmentKind::identity_omitted`] are not compared,
    /// neither on the query side nor on the stored side.
    fn find_exact(
        &self,
        graph: &GraphName,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<Vec<FragmentId>, StoreError>;

    /// Inserts a fragment flagged dirty.
    fn insert(
        &self,
        graph: &GraphName,
        id: &FragmentId,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<(), StoreError>;

    /// Reads one fragment back, `None` when nothing is stored under `id`.
    fn fetch(&self, graph: &GraphName, id: &FragmentId) -> Result<Option<Fragment>, StoreError>;

    /// Every fragment of `kind` in `graph`, ordered by id.
    fn fragments(&self, graph: &GraphName, kind: FragmentKind) -> Result<Vec<Fragment>, StoreError>;

    /// The label stored as `skos:notation` for `uri`, in any graph.
    fn notation(&self, uri: &str) -> Result<Option<String>, StoreError>;

    // -------------------------------------------------------------------
    // Dirty set
    // -------------------------------------------------------------------

    /// Every fragment in `graph` carrying the dirty flag, ordered by id.
    fn dirty(&self, graph: &GraphName) -> Result<Vec<Fragment>, StoreError>;

    /// Removes the dirty flag from exactly `ids`.
    fn clear_dirty(&self, graph: &GraphName, ids: &[FragmentId]) -> Result<(), StoreError>;

    /// Deletes every dirty fragment in `graph`; returns how many went.
    fn remove_dirty(&self, graph: &GraphName) -> Result<usize, StoreError>;
}

impl<T: GraphStore + ?Sized> GraphStore for &T {
    fn find_exact(
        &self,
        graph: &GraphName,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<Vec<FragmentId>, StoreError> {
        (**self).find_exact(graph, kind, attributes)
    }

    fn insert(
        &self,
        graph: &GraphName,
        id: &FragmentId,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<(), StoreError> {
        (**self).insert(graph, id, kind, attributes)
    }

    fn fetch(&self, graph: &GraphName, id: &FragmentId) -> Result<Option<Fragment>, StoreError> {
        (**self).fetch(graph, id)
    }

    fn fragments(&self, graph: &GraphName, kind: FragmentKind) -> Result<Vec<Fragment>, StoreError> {
        (**self).fragments(graph, kind)
    }

    fn notation(&self, uri: &str) -> Result<Option<String>, StoreError> {
        (**self).notation(uri)
    }

    fn dirty(&self, graph: &GraphName) -> Result<Vec<Fragment>, StoreError> {
        (**self).dirty(graph)
    }

    fn clear_dirty(&self, graph: &GraphName, ids: &[FragmentId]) -> Result<(), StoreError> {
        (**self).clear_dirty(graph, ids)
    }

    fn remove_dirty(&self, graph: &GraphName) -> Result<usize, StoreError> {
        (**self).remove_dirty(graph)
    }
}

impl<T: GraphStore + ?Sized> GraphStore for Arc<T> {
    fn find_exact(
        &self,
        graph: &GraphName,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<Vec<FragmentId>, StoreError> {
        (**self).find_exact(graph, kind, attributes)
    }

    fn insert(
        &self,
        graph: &GraphName,
        id: &FragmentId,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<(), StoreError> {
        (**self).insert(graph, id, kind, attributes)
    }

    fn fetch(&self, graph: &GraphName, id: &FragmentId) -> Result<Option<Fragment>, StoreError> {
        (**self).fetch(graph, id)
    }

    fn fragments(&self, graph: &GraphName, kind: FragmentKind) -> Result<Vec<Fragment>, StoreError> {
        (**self).fragments(graph, kind)
    }

    fn notation(&self, uri: &str) -> Result<Option<String>, StoreError> {
        (**self).notation(uri)
    }

    fn dirty(&self, graph: &GraphName) -> Result<Vec<Fragment>, StoreError> {
        (**self).dirty(graph)
    }

    fn clear_dirty(&self, graph: &GraphName, ids: &[FragmentId]) -> Result<(), StoreError> {
        (**self).clear_dirty(graph, ids)
    }

    fn remove_dirty(&self, graph: &GraphName) -> Result<usize, StoreError> {
        (**self).remove_dirty(graph)
    }
}

// ---------------------------------------------------------------------------
// Triples to fragments
// ---------------------------------------------------------------------------

/// Rebuilds a [`Fragment`] from its stored `(predicate URI, N3 object)` pairs.
///
/// Shared by both backends so that a fragment reads back identically from
/// either. Predicates are compacted through `ns`; objects of unordered
/// predicates are sorted. Returns `None` for an empty triple set.
pub fn assemble_fragment<'t>(
    ns: &Namespaces,
    id: FragmentId,
    triples: impl IntoIterator<Item = (&'t str, &'t str)>,
) -> Result<Option<Fragment>, StoreError> {
    let type_uri = ns.expand(TYPE)?;
    let cache_uri = ns.expand(SAVE_CACHE)?;

    let mut kind = None;
    let mut dirty = false;
    let mut attributes = Attributes::new();
    let mut seen = false;
    for (predicate, object) in triples {
        seen = true;
        if predicate == type_uri {
            let class = metarelate_core::term::as_uri(object)
                .and_then(|uri| ns.compact(uri))
                .and_then(|curie| FragmentKind::from_class(&curie));
            if class.is_some() {
                kind = class;
            }
        } else if predicate == cache_uri {
            dirty = object == DIRTY_FLAG;
        } else {
            let name = ns
                .compact(predicate)
                .unwrap_or_else(|| metarelate_core::term::uri(predicate));
            attributes.push(&name, object);
        }
    }
    if !seen {
        return Ok(None);
    }
    let kind = kind.ok_or_else(|| StoreError::malformed(&id, "no recognised rdf:type"))?;

    let canonical: Attributes = attributes
        .iter()
        .map(|(predicate, objects)| {
            let mut objects = objects.as_slice().to_vec();
            if kind.unordered().contains(&predicate) {
                objects.sort();
                objects.dedup();
            }
            let objects: Objects = if objects.len() == 1 {
                objects.remove(0).into()
            } else {
                objects.into()
            };
            (predicate.to_string(), objects)
        })
        .collect();

    Ok(Some(Fragment {
        id,
        kind,
        attributes: canonical,
        dirty,
    }))
}

/// Expands every predicate of a canonical map, keeping the objects.
pub(crate) fn expand_predicates<'a>(
    ns: &Namespaces,
    attributes: &'a Attributes,
) -> Result<Vec<(String, &'a [String])>, CoreError> {
    attributes
        .iter()
        .map(|(p, o)| Ok((ns.expand(p)?, o.as_slice())))
        .collect()
}
