//! Mapping lineage over `dc:replaces` edges.
//!
//! Mappings are never edited in place: a revision is a new mapping that
//! replaces its predecessor. The replaces relation is loaded into a petgraph
//! `DiGraph` (edge newer → older) which must be acyclic. A mapping with no
//! incoming edge is current.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use metarelate_core::fragment::parse_flag;
use metarelate_core::pred::{HAS_FORMAT, INVERTIBLE, REPLACES, SOURCE, STATUS, TARGET};
use metarelate_core::{Fragment, FragmentId, FragmentKind, MappingStatus};

use crate::error::StoreError;
use crate::repository::FragmentRepository;
use crate::traits::GraphStore;

/// The replaces DAG of every stored mapping.
#[derive(Debug)]
pub struct MappingLineage {
    graph: DiGraph<FragmentId, ()>,
    index: HashMap<FragmentId, NodeIndex>,
    mappings: BTreeMap<FragmentId, Fragment>,
}

/// Two current mappings that send one source to different targets of the
/// same format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingConflict {
    pub source: FragmentId,
    pub format: String,
    pub mappings: (FragmentId, FragmentId),
}

impl MappingLineage {
    /// Loads every mapping from the store.
    pub fn load<S: GraphStore>(repo: &FragmentRepository<S>) -> Result<Self, StoreError> {
        let graph = repo.graph_for(FragmentKind::Mapping)?;
        let fragments = repo.store().fragments(graph, FragmentKind::Mapping)?;
        Self::from_fragments(fragments)
    }

    /// Builds the DAG; a replaces cycle is `MalformedFragment`.
    pub fn from_fragments(fragments: Vec<Fragment>) -> Result<Self, StoreError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut mappings = BTreeMap::new();
        for fragment in fragments {
            let node = graph.add_node(fragment.id.clone());
            index.insert(fragment.id.clone(), node);
            mappings.insert(fragment.id.clone(), fragment);
        }
        for (id, fragment) in &mappings {
            if let Some(older) = fragment.attributes.first(REPLACES) {
                let older = FragmentId::new(older);
                // Replacing an unknown mapping leaves no edge; `lineage` reports it.
                if let Some(&target) = index.get(&older) {
                    graph.add_edge(index[id], target, ());
                }
            }
        }
        toposort(&graph, None).map_err(|cycle| {
            StoreError::malformed(&graph[cycle.node_id()], "mapping replaces chain forms a cycle")
        })?;
        Ok(MappingLineage {
            graph,
            index,
            mappings,
        })
    }

    pub fn get(&self, id: &FragmentId) -> Option<&Fragment> {
        self.mappings.get(id)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Mappings that no other mapping replaces, in id order.
    pub fn current_mappings(&self) -> Vec<&Fragment> {
        self.mappings
            .iter()
            .filter(|(id, _)| {
                self.graph
                    .neighbors_directed(self.index[*id], Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|(_, fragment)| fragment)
            .collect()
    }

    /// The mapping that replaces `id`, if any.
    pub fn successor(&self, id: &FragmentId) -> Option<&FragmentId> {
        let node = *self.index.get(id)?;
        self.graph
            .neighbors_directed(node, Direction::Incoming)
            .next()
            .map(|n| &self.graph[n])
    }

    /// `id` followed by every mapping it transitively replaces.
    pub fn lineage(&self, id: &FragmentId) -> Result<Vec<FragmentId>, StoreError> {
        let mut chain = Vec::new();
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            let fragment = self
                .mappings
                .get(&current)
                .ok_or_else(|| StoreError::DanglingReference { id: current.clone() })?;
            cursor = fragment.attributes.first(REPLACES).map(FragmentId::new);
            chain.push(current);
        }
        Ok(chain)
    }

    /// Pairs of active current mappings that map one source concept to
    /// different target concepts of the same format.
    ///
    /// Invertible mappings also count in the target → source direction.
    pub fn conflicting_mappings<S: GraphStore>(
        &self,
        repo: &FragmentRepository<S>,
    ) -> Result<Vec<MappingConflict>, StoreError> {
        let mut formats: HashMap<FragmentId, String> = HashMap::new();
        let mut format_of = |concept: &FragmentId| -> Result<String, StoreError> {
            if let Some(format) = formats.get(concept) {
                return Ok(format.clone());
            }
            let component = repo.fetch_expected(FragmentKind::Component, concept)?;
            let format = component
                .attributes
                .first(HAS_FORMAT)
                .ok_or_else(|| StoreError::malformed(concept, "component has no format"))?
                .to_string();
            formats.insert(concept.clone(), format.clone());
            Ok(format)
        };

        // (from, to-format) → [(mapping, to)]
        let mut directed: BTreeMap<(FragmentId, String), Vec<(FragmentId, FragmentId)>> =
            BTreeMap::new();
        for mapping in self.current_mappings() {
            let status = mapping
                .attributes
                .first(STATUS)
                .map(MappingStatus::from_term)
                .transpose()?
                .ok_or_else(|| StoreError::malformed(&mapping.id, "mapping has no status"))?;
            if !status.is_active() {
                continue;
            }
            let source = required_id(mapping, SOURCE)?;
            let target = required_id(mapping, TARGET)?;
            let invertible = mapping
                .attributes
                .first(INVERTIBLE)
                .and_then(parse_flag)
                .unwrap_or(false);

            let target_format = format_of(&target)?;
            directed
                .entry((source.clone(), target_format))
                .or_default()
                .push((mapping.id.clone(), target.clone()));
            if invertible {
                let source_format = format_of(&source)?;
                directed
                    .entry((target, source_format))
                    .or_default()
                    .push((mapping.id.clone(), source));
            }
        }

        let mut conflicts = Vec::new();
        for ((from, format), edges) in directed {
            for (i, (first, first_to)) in edges.iter().enumerate() {
                for (second, second_to) in &edges[i + 1..] {
                    if first != second && first_to != second_to {
                        let pair = if first < second {
                            (first.clone(), second.clone())
                        } else {
                            (second.clone(), first.clone())
                        };
                        conflicts.push(MappingConflict {
                            source: from.clone(),
                            format: format.clone(),
                            mappings: pair,
                        });
                    }
                }
            }
        }
        conflicts.sort_by(|a, b| a.mappings.cmp(&b.mappings));
        conflicts.dedup();
        Ok(conflicts)
    }
}

fn required_id(fragment: &Fragment, predicate: &str) -> Result<FragmentId, StoreError> {
    fragment
        .attributes
        .first(predicate)
        .map(FragmentId::new)
        .ok_or_else(|| StoreError::malformed(&fragment.id, format!("missing {}", predicate)))
}
