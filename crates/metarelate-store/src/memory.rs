//! In-memory implementation of [`GraphStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests and scratch
//! sessions. It keeps `(graph, subject, predicate, object)` quads in an
//! insertion-ordered set, so inserting the same triple twice is a no-op as
//! it is in a real triple store, and reads back through the same
//! [`assemble_fragment`] path as the SPARQL backend.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexSet;

use metarelate_core::pred::{NOTATION, SAVE_CACHE, TYPE};
use metarelate_core::{term, Attributes, Fragment, FragmentId, FragmentKind, GraphName, Namespaces};

use crate::error::StoreError;
use crate::traits::{assemble_fragment, expand_predicates, GraphStore, DIRTY_FLAG};

/// A stored quad. Predicates are full URIs, objects canonical N3.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Quad {
    graph: String,
    subject: String,
    predicate: String,
    object: String,
}

/// Quad store held in process memory.
#[derive(Debug)]
pub struct InMemoryStore {
    namespaces: Namespaces,
    quads: Mutex<IndexSet<Quad>>,
}

impl InMemoryStore {
    pub fn new(namespaces: Namespaces) -> Self {
        InMemoryStore {
            namespaces,
            quads: Mutex::new(IndexSet::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexSet<Quad>> {
        self.quads.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds one triple; `predicate` is a prefixed name, `object` any N3 term.
    ///
    /// Used to load vocabulary (notations) and static data.
    pub fn add_triple(
        &self,
        graph: &GraphName,
        subject: &str,
        predicate: &str,
        object: &str,
    ) -> Result<(), StoreError> {
        let quad = Quad {
            graph: graph.as_str().to_string(),
            subject: subject_uri(&term::canonical(subject, &self.namespaces)?),
            predicate: self.namespaces.expand(predicate)?,
            object: term::canonical(object, &self.namespaces)?,
        };
        self.lock().insert(quad);
        Ok(())
    }

    /// Deletes every triple whose subject is `id`, dirty or not.
    pub fn remove_fragment(&self, graph: &GraphName, id: &FragmentId) -> usize {
        let mut quads = self.lock();
        let before = quads.len();
        quads.retain(|q| !(q.graph == graph.as_str() && q.subject == id.as_str()));
        before - quads.len()
    }

    /// Number of stored triples.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Subjects in `graph` with predicate `p` and object `o`, in id order.
    fn subjects_with(quads: &IndexSet<Quad>, graph: &GraphName, p: &str, o: &str) -> Vec<String> {
        let mut subjects: Vec<String> = quads
            .iter()
            .filter(|q| q.graph == graph.as_str() && q.predicate == p && q.object == o)
            .map(|q| q.subject.clone())
            .collect();
        subjects.sort();
        subjects.dedup();
        subjects
    }

    fn assemble(
        &self,
        quads: &IndexSet<Quad>,
        graph: &GraphName,
        subject: &str,
    ) -> Result<Option<Fragment>, StoreError> {
        let triples = quads
            .iter()
            .filter(|q| q.graph == graph.as_str() && q.subject == subject)
            .map(|q| (q.predicate.as_str(), q.object.as_str()));
        assemble_fragment(&self.namespaces, FragmentId::new(subject), triples)
    }

    fn class_uri(&self, kind: FragmentKind) -> Result<String, StoreError> {
        Ok(term::uri(&self.namespaces.expand(kind.class())?))
    }
}

impl GraphStore for InMemoryStore {
    fn find_exact(
        &self,
        graph: &GraphName,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<Vec<FragmentId>, StoreError> {
        let wanted = attributes.without(kind.identity_omitted());
        let type_uri = self.namespaces.expand(TYPE)?;
        let class = self.class_uri(kind)?;

        let quads = self.lock();
        let mut matches = Vec::new();
        for subject in Self::subjects_with(&quads, graph, &type_uri, &class) {
            if let Some(stored) = self.assemble(&quads, graph, &subject)? {
                let stored = stored.attributes.without(kind.identity_omitted());
                if same_attributes(&stored, &wanted) {
                    matches.push(stored_id(&subject));
                }
            }
        }
        Ok(matches)
    }

    fn insert(
        &self,
        graph: &GraphName,
        id: &FragmentId,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<(), StoreError> {
        let ns = &self.namespaces;
        let mut pending = vec![
            (ns.expand(TYPE)?, self.class_uri(kind)?),
            (ns.expand(SAVE_CACHE)?, DIRTY_FLAG.to_string()),
        ];
        for (predicate, objects) in expand_predicates(ns, attributes)? {
            for object in objects {
                pending.push((predicate.clone(), object.clone()));
            }
        }

        let mut quads = self.lock();
        for (predicate, object) in pending {
            quads.insert(Quad {
                graph: graph.as_str().to_string(),
                subject: id.as_str().to_string(),
                predicate,
                object,
            });
        }
        Ok(())
    }

    fn fetch(&self, graph: &GraphName, id: &FragmentId) -> Result<Option<Fragment>, StoreError> {
        let quads = self.lock();
        self.assemble(&quads, graph, id.as_str())
    }

    fn fragments(&self, graph: &GraphName, kind: FragmentKind) -> Result<Vec<Fragment>, StoreError> {
        let type_uri = self.namespaces.expand(TYPE)?;
        let class = self.class_uri(kind)?;
        let quads = self.lock();
        let mut out = Vec::new();
        for subject in Self::subjects_with(&quads, graph, &type_uri, &class) {
            out.extend(self.assemble(&quads, graph, &subject)?);
        }
        Ok(out)
    }

    fn notation(&self, uri: &str) -> Result<Option<String>, StoreError> {
        let predicate = self.namespaces.expand(NOTATION)?;
        let subject = term::as_uri(uri).unwrap_or(uri);
        let quads = self.lock();
        Ok(quads
            .iter()
            .find(|q| q.subject == subject && q.predicate == predicate)
            .map(|q| term::literal_lexical(&q.object).unwrap_or_else(|| q.object.clone())))
    }

    fn dirty(&self, graph: &GraphName) -> Result<Vec<Fragment>, StoreError> {
        let cache = self.namespaces.expand(SAVE_CACHE)?;
        let quads = self.lock();
        let mut out = Vec::new();
        for subject in Self::subjects_with(&quads, graph, &cache, DIRTY_FLAG) {
            out.extend(self.assemble(&quads, graph, &subject)?);
        }
        Ok(out)
    }

    fn clear_dirty(&self, graph: &GraphName, ids: &[FragmentId]) -> Result<(), StoreError> {
        let cache = self.namespaces.expand(SAVE_CACHE)?;
        let mut quads = self.lock();
        quads.retain(|q| {
            !(q.graph == graph.as_str()
                && q.predicate == cache
                && q.object == DIRTY_FLAG
                && ids.iter().any(|id| id.as_str() == q.subject))
        });
        Ok(())
    }

    fn remove_dirty(&self, graph: &GraphName) -> Result<usize, StoreError> {
        let cache = self.namespaces.expand(SAVE_CACHE)?;
        let mut quads = self.lock();
        let dirty = Self::subjects_with(&quads, graph, &cache, DIRTY_FLAG);
        quads.retain(|q| !(q.graph == graph.as_str() && dirty.contains(&q.subject)));
        Ok(dirty.len())
    }
}

fn subject_uri(canonical: &str) -> String {
    term::as_uri(canonical).unwrap_or(canonical).to_string()
}

fn stored_id(subject: &str) -> FragmentId {
    FragmentId(subject.to_string())
}

/// Equal predicate sets, and per predicate equal object sets.
fn same_attributes(a: &Attributes, b: &Attributes) -> bool {
    let as_sets = |attrs: &Attributes| -> BTreeMap<String, Vec<String>> {
        attrs
            .iter()
            .map(|(p, o)| {
                let mut objects = o.as_slice().to_vec();
                objects.sort();
                objects.dedup();
                (p.to_string(), objects)
            })
            .collect()
    };
    as_sets(a) == as_sets(b)
}
