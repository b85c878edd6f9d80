//! Dirty-set tracking: save, revert and inspect uncommitted fragments.
//!
//! A fragment is dirty from its insertion until it has been appended to its
//! graph's durable turtle file. Saving is flush-then-unflag: the file is
//! written and synced before the flags are removed, so a crash between the
//! two steps re-flushes on the next save (at-least-once). Each operation
//! acts on one graph; `save_all` / `revert_all` walk the configured graphs
//! in configuration order.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use metarelate_core::{Fragment, FragmentId, GraphName, Namespaces};

use crate::config::{GraphConfig, PersistenceConfig, StoreConfig};
use crate::error::StoreError;
use crate::traits::GraphStore;
use crate::turtle;

/// Something that can flush every dirty fragment to durable storage.
///
/// The server supervisor calls this before stopping the server.
pub trait DirtyFlush {
    fn flush(&self) -> Result<(), StoreError>;
}

/// Outcome of saving one graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub graph: GraphName,
    pub path: PathBuf,
    pub saved: Vec<FragmentId>,
}

/// Save / revert / query over the dirty fragments of each graph.
pub struct DirtySetManager<S> {
    store: S,
    namespaces: Namespaces,
    persistence: PersistenceConfig,
}

impl<S: GraphStore> DirtySetManager<S> {
    pub fn new(store: S, config: &StoreConfig) -> Self {
        DirtySetManager {
            store,
            namespaces: config.namespaces(),
            persistence: config.persistence.clone(),
        }
    }

    /// Every dirty fragment in `graph`.
    pub fn query_dirty(&self, graph: &GraphName) -> Result<Vec<Fragment>, StoreError> {
        let graph = self.graph(graph)?;
        self.store.dirty(&graph.name)
    }

    /// Appends every dirty fragment of `graph` to its file, then unflags them.
    pub fn save(&self, graph: &GraphName) -> Result<SaveReport, StoreError> {
        let config = self.graph(graph)?;
        let path = self.persistence.file_path(config);
        let dirty = self.store.dirty(&config.name)?;
        if dirty.is_empty() {
            tracing::debug!(graph = %config.name, "nothing to save");
            return Ok(SaveReport {
                graph: config.name.clone(),
                path,
                saved: Vec::new(),
            });
        }

        let document = turtle::document(&self.namespaces, &dirty);
        append_document(&path, &document)?;

        let ids: Vec<FragmentId> = dirty.into_iter().map(|f| f.id).collect();
        self.store.clear_dirty(&config.name, &ids)?;
        tracing::info!(graph = %config.name, path = %path.display(), count = ids.len(), "saved dirty fragments");
        Ok(SaveReport {
            graph: config.name.clone(),
            path,
            saved: ids,
        })
    }

    /// Deletes every dirty fragment of `graph`.
    pub fn revert(&self, graph: &GraphName) -> Result<usize, StoreError> {
        let config = self.graph(graph)?;
        let removed = self.store.remove_dirty(&config.name)?;
        tracing::info!(graph = %config.name, count = removed, "reverted dirty fragments");
        Ok(removed)
    }

    /// [`DirtySetManager::save`] over every configured graph.
    pub fn save_all(&self) -> Result<Vec<SaveReport>, StoreError> {
        self.persistence
            .graphs
            .iter()
            .map(|g| self.save(&g.name))
            .collect()
    }

    /// [`DirtySetManager::revert`] over every configured graph.
    pub fn revert_all(&self) -> Result<usize, StoreError> {
        let mut total = 0;
        for graph in &self.persistence.graphs {
            total += self.revert(&graph.name)?;
        }
        Ok(total)
    }

    /// The configured graphs, in order.
    pub fn graphs(&self) -> impl Iterator<Item = &GraphName> {
        self.persistence.graphs.iter().map(|g| &g.name)
    }

    fn graph(&self, name: &GraphName) -> Result<&GraphConfig, StoreError> {
        self.persistence.graph(name.as_str())
    }
}

impl<S: GraphStore> DirtyFlush for DirtySetManager<S> {
    fn flush(&self) -> Result<(), StoreError> {
        self.save_all().map(|_| ())
    }
}

/// Writes `document` to a new file, or appends it without `@prefix` lines.
fn append_document(path: &Path, document: &str) -> Result<(), StoreError> {
    let persistence = |source: std::io::Error| StoreError::Persistence {
        path: path.to_path_buf(),
        source,
    };
    let text = if path.exists() {
        turtle::strip_prefixes(document)
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(persistence)?;
        }
        document.to_string()
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(persistence)?;
    file.write_all(text.as_bytes()).map_err(persistence)?;
    file.sync_all().map_err(persistence)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::repository::FragmentRepository;
    use metarelate_core::pred::*;
    use metarelate_core::{Attributes, FragmentKind};

    fn config(dir: &std::path::Path) -> StoreConfig {
        let mut config = StoreConfig::default();
        config.persistence.data_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_save_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = InMemoryStore::new(config.namespaces());
        let repo = FragmentRepository::new(&store, &config);
        let manager = DirtySetManager::new(&store, &config);
        let graph = repo.graph_for(FragmentKind::Property).unwrap().clone();

        repo.get_or_create(FragmentKind::Property, &Attributes::new().with(NAME, "mrcf:units"))
            .unwrap();
        let report = manager.save(&graph).unwrap();
        assert_eq!(report.saved.len(), 1);

        repo.get_or_create(FragmentKind::Property, &Attributes::new().with(NAME, "mrcf:long_name"))
            .unwrap();
        manager.save(&graph).unwrap();

        let text = std::fs::read_to_string(dir.path().join("concepts.ttl")).unwrap();
        assert_eq!(text.matches("@prefix mr:").count(), 1);
        assert!(text.contains("mr:name mrcf:units"));
        assert!(text.contains("mr:name mrcf:long_name"));
        assert!(!text.contains("saveCache"));
    }

    #[test]
    fn test_save_with_nothing_dirty_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = InMemoryStore::new(config.namespaces());
        let manager = DirtySetManager::new(&store, &config);
        let reports = manager.save_all().unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.saved.is_empty()));
        assert!(!dir.path().join("concepts.ttl").exists());
    }

    #[test]
    fn test_unknown_graph_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = InMemoryStore::new(config.namespaces());
        let manager = DirtySetManager::new(&store, &config);
        let err = manager.save(&GraphName::new("http://nowhere/x.ttl")).unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
    }
}
