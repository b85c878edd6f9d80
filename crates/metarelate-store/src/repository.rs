//! Get-or-create access to content-addressed fragments.
//!
//! [`FragmentRepository`] is the only writer of fragments. A request is
//! validated and canonicalised locally (no round-trip for bad input), looked
//! up with an exact-match query, and inserted under its content hash only
//! when absent. Inserts are flagged dirty until saved.

use metarelate_core::pred::{IN_SCHEME, RETIRED, SOURCE, TARGET};
use metarelate_core::{
    validate, Attributes, Fragment, FragmentBody, FragmentId, FragmentKind, GraphName, Namespaces,
};

use crate::config::{PersistenceConfig, StoreConfig};
use crate::error::StoreError;
use crate::hash::IdentityHasher;
use crate::traits::GraphStore;

/// Fragment creation and lookup over a [`GraphStore`].
pub struct FragmentRepository<S> {
    store: S,
    hasher: IdentityHasher,
    namespaces: Namespaces,
    persistence: PersistenceConfig,
    registry_base: String,
}

impl<S: GraphStore> FragmentRepository<S> {
    pub fn new(store: S, config: &StoreConfig) -> Self {
        FragmentRepository {
            store,
            hasher: IdentityHasher::from_config(config),
            namespaces: config.namespaces(),
            persistence: config.persistence.clone(),
            registry_base: config.registry_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn persistence(&self) -> &PersistenceConfig {
        &self.persistence
    }

    /// The graph holding fragments of `kind`.
    pub fn graph_for(&self, kind: FragmentKind) -> Result<&GraphName, StoreError> {
        Ok(&self.persistence.graph_for(kind)?.name)
    }

    /// Returns the id of the `kind` fragment with exactly `attributes`,
    /// creating it (dirty) when none exists.
    pub fn get_or_create(
        &self,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<FragmentId, StoreError> {
        let canonical = self.prepare(kind, attributes)?;
        let graph = self.graph_for(kind)?;

        if let Some(id) = self.lookup(graph, kind, &canonical)? {
            tracing::debug!(%id, %kind, "fragment exists");
            return Ok(id);
        }

        let id = self.hasher.mint(kind, &canonical)?;
        self.store.insert(graph, &id, kind, &canonical)?;
        tracing::debug!(%id, %kind, "fragment created");

        // Re-read: a concurrent identical insert lands on the same triples.
        self.lookup(graph, kind, &canonical)?
            .ok_or_else(|| StoreError::malformed(&id, "inserted fragment not found by exact match"))
    }

    /// Typed form of [`FragmentRepository::get_or_create`].
    pub fn get_or_create_body(&self, body: &FragmentBody) -> Result<FragmentId, StoreError> {
        self.get_or_create(body.kind(), &body.attributes())
    }

    /// Exact-match lookup without creation.
    pub fn find(
        &self,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<Option<FragmentId>, StoreError> {
        let canonical = self.prepare(kind, attributes)?;
        self.lookup(self.graph_for(kind)?, kind, &canonical)
    }

    /// Reads a fragment of `kind` back from its graph.
    pub fn fetch(&self, kind: FragmentKind, id: &FragmentId) -> Result<Option<Fragment>, StoreError> {
        self.store.fetch(self.graph_for(kind)?, id)
    }

    /// Like [`FragmentRepository::fetch`], but a missing id is a
    /// `DanglingReference` and a fragment of another kind is malformed.
    pub fn fetch_expected(&self, kind: FragmentKind, id: &FragmentId) -> Result<Fragment, StoreError> {
        let fragment = self
            .fetch(kind, id)?
            .ok_or_else(|| StoreError::DanglingReference { id: id.clone() })?;
        if fragment.kind != kind {
            return Err(StoreError::malformed(
                id,
                format!("expected a {} fragment, found a {}", kind, fragment.kind),
            ));
        }
        Ok(fragment)
    }

    /// The kind encoded in a minted id's path, if it is one of ours.
    pub fn kind_of(&self, id: &FragmentId) -> Option<FragmentKind> {
        let rest = id.as_str().strip_prefix(&self.registry_base)?.strip_prefix('/')?;
        let segment = rest.split('/').next()?;
        FragmentKind::ALL.into_iter().find(|k| k.segment() == segment)
    }

    /// `skos:notation` label for a URI term.
    pub fn notation(&self, uri: &str) -> Result<Option<String>, StoreError> {
        self.store.notation(uri)
    }

    // -- listings -----------------------------------------------------------

    /// Active contacts of a register: some `skos:inScheme` contains
    /// `register` (ignoring case) and `mr:retired` is unset.
    pub fn contacts(&self, register: &str) -> Result<Vec<Fragment>, StoreError> {
        let needle = register.to_lowercase();
        let contacts = self.all(FragmentKind::Contact)?;
        Ok(contacts
            .into_iter()
            .filter(|c| !c.attributes.contains(RETIRED))
            .filter(|c| {
                c.attributes
                    .objects(IN_SCHEME)
                    .iter()
                    .any(|scheme| scheme.to_lowercase().contains(&needle))
            })
            .collect())
    }

    /// Every mediator, ordered by id.
    pub fn mediators(&self) -> Result<Vec<Fragment>, StoreError> {
        self.all(FragmentKind::Mediator)
    }

    /// Mappings with any of `concepts` as source or target.
    pub fn mappings_by_concept(&self, concepts: &[FragmentId]) -> Result<Vec<Fragment>, StoreError> {
        let wanted: Vec<String> = concepts.iter().map(FragmentId::to_n3).collect();
        self.mappings_where(|source, target| {
            wanted.iter().any(|c| c == source || c == target)
        })
    }

    /// Mappings from any of `sources` to any of `targets`.
    pub fn mappings_by_ordered_concept(
        &self,
        sources: &[FragmentId],
        targets: &[FragmentId],
    ) -> Result<Vec<Fragment>, StoreError> {
        let sources: Vec<String> = sources.iter().map(FragmentId::to_n3).collect();
        let targets: Vec<String> = targets.iter().map(FragmentId::to_n3).collect();
        self.mappings_where(|source, target| {
            sources.iter().any(|s| s == source) && targets.iter().any(|t| t == target)
        })
    }

    fn all(&self, kind: FragmentKind) -> Result<Vec<Fragment>, StoreError> {
        self.store.fragments(self.graph_for(kind)?, kind)
    }

    fn mappings_where(&self, keep: impl Fn(&str, &str) -> bool) -> Result<Vec<Fragment>, StoreError> {
        let mappings = self.all(FragmentKind::Mapping)?;
        Ok(mappings
            .into_iter()
            .filter(|m| match (m.attributes.first(SOURCE), m.attributes.first(TARGET)) {
                (Some(source), Some(target)) => keep(source, target),
                _ => false,
            })
            .collect())
    }

    fn prepare(&self, kind: FragmentKind, attributes: &Attributes) -> Result<Attributes, StoreError> {
        validate(kind, attributes)?;
        Ok(attributes.canonicalize(kind, &self.namespaces)?)
    }

    fn lookup(
        &self,
        graph: &GraphName,
        kind: FragmentKind,
        canonical: &Attributes,
    ) -> Result<Option<FragmentId>, StoreError> {
        let mut ids = self.store.find_exact(graph, kind, canonical)?;
        match ids.len() {
            0 => Ok(None),
            1 => Ok(ids.pop()),
            count => Err(StoreError::AmbiguousFragment { kind, count, ids }),
        }
    }
}
