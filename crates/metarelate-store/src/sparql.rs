//! SPARQL backend for [`GraphStore`].
//!
//! The `*_query` / `*_update` functions build the request text (without the
//! namespace prolog, which the [`StoreClient`] adds). [`SparqlStore`] runs
//! them and turns `?s ?p ?o` rows back into fragments.

use indexmap::IndexMap;

use metarelate_core::pred::{NOTATION, SAVE_CACHE, TYPE};
use metarelate_core::term;
use metarelate_core::{Attributes, Fragment, FragmentId, FragmentKind, GraphName, Namespaces};

use crate::client::{Row, StoreClient};
use crate::error::StoreError;
use crate::traits::{assemble_fragment, GraphStore, DIRTY_FLAG};

// ---------------------------------------------------------------------------
// Query text
// ---------------------------------------------------------------------------

/// Exact-match lookup.
///
/// Every given `(predicate, objects)` pair must be present, no other object
/// may be attached to those predicates, and no predicate outside the map
/// (bookkeeping and identity-omitted predicates aside) may be present.
pub fn find_exact_query(graph: &GraphName, kind: FragmentKind, attributes: &Attributes) -> String {
    let omitted = kind.identity_omitted();
    let mut predicates: Vec<(&str, &[String])> = attributes
        .iter()
        .filter(|(p, _)| !omitted.contains(p))
        .map(|(p, o)| (p, o.as_slice()))
        .collect();
    predicates.sort_by(|a, b| a.0.cmp(b.0));

    let mut q = String::new();
    q.push_str("SELECT DISTINCT ?fragment\nWHERE {\n");
    q.push_str(&format!("  GRAPH {} {{\n", graph.to_n3()));
    q.push_str(&format!("    ?fragment {} {}", TYPE, kind.class()));
    for (predicate, objects) in &predicates {
        q.push_str(&format!(" ;\n        {} {}", predicate, objects.join(", ")));
    }
    q.push_str(" .\n");
    for (i, (predicate, objects)) in predicates.iter().enumerate() {
        q.push_str(&format!(
            "    FILTER NOT EXISTS {{ ?fragment {} ?o{i} . FILTER(?o{i} NOT IN ({})) }}\n",
            predicate,
            objects.join(", "),
        ));
    }
    let mut known: Vec<&str> = vec![TYPE, SAVE_CACHE];
    known.extend(predicates.iter().map(|(p, _)| *p));
    known.extend(omitted.iter().copied());
    q.push_str(&format!(
        "    FILTER NOT EXISTS {{\n        ?fragment ?p ?o .\n        FILTER(?p NOT IN ({}))\n    }}\n",
        known.join(", ")
    ));
    q.push_str("  }\n}\n");
    q
}

/// Inserts a fragment with its type and the dirty flag.
pub fn insert_update(
    graph: &GraphName,
    id: &FragmentId,
    kind: FragmentKind,
    attributes: &Attributes,
) -> String {
    let mut q = String::new();
    q.push_str("INSERT DATA {\n");
    q.push_str(&format!("  GRAPH {} {{\n", graph.to_n3()));
    q.push_str(&format!("    {} {} {}", id.to_n3(), TYPE, kind.class()));
    for (predicate, objects) in attributes.iter() {
        q.push_str(&format!(" ;\n        {} {}", predicate, objects.as_slice().join(", ")));
    }
    q.push_str(&format!(" ;\n        {} {} .\n", SAVE_CACHE, DIRTY_FLAG));
    q.push_str("  }\n}\n");
    q
}

pub fn fetch_query(graph: &GraphName, id: &FragmentId) -> String {
    format!(
        "SELECT ?p ?o\nWHERE {{\n  GRAPH {} {{ {} ?p ?o }}\n}}\n",
        graph.to_n3(),
        id.to_n3()
    )
}

pub fn fragments_query(graph: &GraphName, kind: FragmentKind) -> String {
    format!(
        "SELECT ?s ?p ?o\nWHERE {{\n  GRAPH {} {{\n    ?s {} {} ;\n        ?p ?o .\n  }}\n}}\nORDER BY ?s\n",
        graph.to_n3(),
        TYPE,
        kind.class()
    )
}

/// Notation lookup for `uri`, given bare or as `<…>`.
pub fn notation_query(uri: &str) -> String {
    let subject = match term::as_uri(uri) {
        Some(_) => uri.to_string(),
        None => term::uri(uri),
    };
    format!(
        "SELECT ?notation\nWHERE {{\n  {{ {s} {p} ?notation }}\n  UNION\n  {{ GRAPH ?g {{ {s} {p} ?notation }} }}\n}}\nLIMIT 1\n",
        s = subject,
        p = NOTATION
    )
}

pub fn dirty_query(graph: &GraphName) -> String {
    format!(
        "SELECT ?s ?p ?o\nWHERE {{\n  GRAPH {} {{\n    ?s {} {} ;\n        ?p ?o .\n  }}\n}}\nORDER BY ?s\n",
        graph.to_n3(),
        SAVE_CACHE,
        DIRTY_FLAG
    )
}

pub fn dirty_count_query(graph: &GraphName) -> String {
    format!(
        "SELECT (COUNT(DISTINCT ?s) AS ?count)\nWHERE {{\n  GRAPH {} {{ ?s {} {} }}\n}}\n",
        graph.to_n3(),
        SAVE_CACHE,
        DIRTY_FLAG
    )
}

/// Drops the dirty flag from exactly `ids`.
pub fn clear_dirty_update(graph: &GraphName, ids: &[FragmentId]) -> String {
    let mut q = String::new();
    q.push_str("DELETE DATA {\n");
    q.push_str(&format!("  GRAPH {} {{\n", graph.to_n3()));
    for id in ids {
        q.push_str(&format!("    {} {} {} .\n", id.to_n3(), SAVE_CACHE, DIRTY_FLAG));
    }
    q.push_str("  }\n}\n");
    q
}

/// Deletes every triple of every dirty fragment.
pub fn revert_update(graph: &GraphName) -> String {
    format!(
        "DELETE WHERE {{\n  GRAPH {} {{\n    ?s {} {} ;\n        ?p ?o .\n  }}\n}}\n",
        graph.to_n3(),
        SAVE_CACHE,
        DIRTY_FLAG
    )
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// [`GraphStore`] over a SPARQL query/update service.
pub struct SparqlStore<C> {
    client: C,
    namespaces: Namespaces,
}

impl<C: StoreClient> SparqlStore<C> {
    pub fn new(client: C, namespaces: Namespaces) -> Self {
        SparqlStore { client, namespaces }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Groups `?s ?p ?o` rows by subject and assembles each group.
    fn group_fragments(&self, rows: &[Row]) -> Result<Vec<Fragment>, StoreError> {
        let mut groups: IndexMap<&str, Vec<(&str, String)>> = IndexMap::new();
        for row in rows {
            let (Some(s), Some(p), Some(o)) = (row.uri("s"), row.uri("p"), row.get("o")) else {
                tracing::warn!(?row, "skipping incomplete triple row");
                continue;
            };
            groups.entry(s).or_default().push((p, o.to_n3()));
        }
        let mut out = Vec::with_capacity(groups.len());
        for (subject, triples) in groups {
            let triples = triples.iter().map(|(p, o)| (*p, o.as_str()));
            out.extend(assemble_fragment(&self.namespaces, FragmentId::new(subject), triples)?);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

impl<C: StoreClient> GraphStore for SparqlStore<C> {
    fn find_exact(
        &self,
        graph: &GraphName,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<Vec<FragmentId>, StoreError> {
        let rows = self.client.query(&find_exact_query(graph, kind, attributes))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.uri("fragment"))
            .map(FragmentId::new)
            .collect())
    }

    fn insert(
        &self,
        graph: &GraphName,
        id: &FragmentId,
        kind: FragmentKind,
        attributes: &Attributes,
    ) -> Result<(), StoreError> {
        self.client.update(&insert_update(graph, id, kind, attributes))
    }

    fn fetch(&self, graph: &GraphName, id: &FragmentId) -> Result<Option<Fragment>, StoreError> {
        let rows = self.client.query(&fetch_query(graph, id))?;
        let triples: Vec<(&str, String)> = rows
            .iter()
            .filter_map(|row| Some((row.uri("p")?, row.get("o")?.to_n3())))
            .collect();
        assemble_fragment(
            &self.namespaces,
            id.clone(),
            triples.iter().map(|(p, o)| (*p, o.as_str())),
        )
    }

    fn fragments(&self, graph: &GraphName, kind: FragmentKind) -> Result<Vec<Fragment>, StoreError> {
        let rows = self.client.query(&fragments_query(graph, kind))?;
        self.group_fragments(&rows)
    }

    fn notation(&self, uri: &str) -> Result<Option<String>, StoreError> {
        let rows = self.client.query(&notation_query(uri))?;
        Ok(rows.first().and_then(|row| row.text("notation")))
    }

    fn dirty(&self, graph: &GraphName) -> Result<Vec<Fragment>, StoreError> {
        let rows = self.client.query(&dirty_query(graph))?;
        self.group_fragments(&rows)
    }

    fn clear_dirty(&self, graph: &GraphName, ids: &[FragmentId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.client.update(&clear_dirty_update(graph, ids))
    }

    fn remove_dirty(&self, graph: &GraphName) -> Result<usize, StoreError> {
        let rows = self.client.query(&dirty_count_query(graph))?;
        let count = rows
            .first()
            .and_then(|row| row.integer("count"))
            .unwrap_or(0)
            .max(0) as usize;
        self.client.update(&revert_update(graph))?;
        Ok(count)
    }
}
