//! Store configuration.
//!
//! [`StoreConfig`] is built once (defaults, optionally a JSON file, then
//! `METARELATE_*` environment overrides) and passed by reference to every
//! constructor. Nothing in the crate reads configuration from globals.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use metarelate_core::{FragmentKind, GraphName, Namespaces};

use crate::error::StoreError;

/// Fragment ids are minted under this root by default.
pub const DEFAULT_REGISTRY_BASE: &str = "http://www.metarelate.net/metOcean";

/// Top-level configuration for the store engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Extra prefixes, merged over the default namespace table.
    pub prefixes: BTreeMap<String, String>,
    /// Root of every minted fragment id.
    pub registry_base: String,
    pub endpoint: EndpointConfig,
    pub server: ServerConfig,
    pub persistence: PersistenceConfig,
}

/// Where the graph-store service listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    pub dataset: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

/// How to launch and probe the graph-store server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub binary: PathBuf,
    /// Database directory passed as `--loc`.
    pub database: PathBuf,
    /// Extra environment for the child, e.g. `JENAROOT` and `FUSEKI_HOME`.
    pub env: BTreeMap<String, String>,
    pub probe_attempts: u32,
    pub probe_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub stop_attempts: u32,
}

/// One logical graph and its durable turtle file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub name: GraphName,
    /// File name, relative to [`PersistenceConfig::data_dir`].
    pub file: PathBuf,
    /// Fragment kinds stored in this graph.
    pub kinds: Vec<FragmentKind>,
}

/// Durable files and the graph layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub data_dir: PathBuf,
    pub graphs: Vec<GraphConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            prefixes: BTreeMap::new(),
            registry_base: DEFAULT_REGISTRY_BASE.to_string(),
            endpoint: EndpointConfig::default(),
            server: ServerConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            host: "127.0.0.1".to_string(),
            port: 3131,
            dataset: "metocean".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            binary: PathBuf::from("fuseki-server"),
            database: PathBuf::from("tdb"),
            env: BTreeMap::new(),
            probe_attempts: 300,
            probe_interval_ms: 100,
            probe_timeout_ms: 250,
            stop_attempts: 100,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        let graph = |file: &str, kinds: &[FragmentKind]| GraphConfig {
            name: GraphName(format!("http://metarelate.net/{}", file)),
            file: PathBuf::from(file),
            kinds: kinds.to_vec(),
        };
        PersistenceConfig {
            data_dir: PathBuf::from("staticData/metocean"),
            graphs: vec![
                graph(
                    "concepts.ttl",
                    &[
                        FragmentKind::Property,
                        FragmentKind::Component,
                        FragmentKind::Value,
                        FragmentKind::ScopedProperty,
                        FragmentKind::ValueMap,
                        FragmentKind::Mediator,
                    ],
                ),
                graph("mappings.ttl", &[FragmentKind::Mapping]),
                graph("contacts.ttl", &[FragmentKind::Contact]),
            ],
        }
    }
}

impl EndpointConfig {
    /// `http://{host}:{port}/{dataset}`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/{}", self.host, self.port, self.dataset)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServerConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl PersistenceConfig {
    /// The graph holding fragments of `kind`.
    pub fn graph_for(&self, kind: FragmentKind) -> Result<&GraphConfig, StoreError> {
        self.graphs
            .iter()
            .find(|g| g.kinds.contains(&kind))
            .ok_or_else(|| StoreError::Config {
                reason: format!("no graph configured for {} fragments", kind),
            })
    }

    /// Looks a graph up by its full name or by its file name.
    pub fn graph(&self, name: &str) -> Result<&GraphConfig, StoreError> {
        let bare = GraphName::new(name);
        self.graphs
            .iter()
            .find(|g| g.name == bare || g.file == Path::new(name))
            .ok_or_else(|| StoreError::Config {
                reason: format!("unknown graph '{}'", name),
            })
    }

    /// Absolute location of a graph's durable file.
    pub fn file_path(&self, graph: &GraphConfig) -> PathBuf {
        self.data_dir.join(&graph.file)
    }
}

impl StoreConfig {
    /// Reads a JSON configuration file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| StoreError::Config {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config = Self::from_json(&text)?;
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Parses and checks a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        let config: StoreConfig = serde_json::from_str(text).map_err(|e| StoreError::Config {
            reason: format!("invalid configuration: {}", e),
        })?;
        config.check()?;
        Ok(config)
    }

    /// Applies `METARELATE_HOST`, `METARELATE_PORT` and `METARELATE_DATA_DIR`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StoreError> {
        if let Some(host) = lookup("METARELATE_HOST") {
            self.endpoint.host = host;
        }
        if let Some(port) = lookup("METARELATE_PORT") {
            self.endpoint.port = port.parse().map_err(|_| StoreError::Config {
                reason: format!("METARELATE_PORT is not a port number: '{}'", port),
            })?;
        }
        if let Some(dir) = lookup("METARELATE_DATA_DIR") {
            self.persistence.data_dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    /// The default namespace table with the configured prefixes merged in.
    pub fn namespaces(&self) -> Namespaces {
        let mut ns = Namespaces::default();
        for (prefix, base) in &self.prefixes {
            ns.insert(prefix, base);
        }
        ns
    }

    /// Every creatable kind must live in exactly one graph.
    pub fn check(&self) -> Result<(), StoreError> {
        for kind in FragmentKind::ALL {
            let homes = self
                .persistence
                .graphs
                .iter()
                .filter(|g| g.kinds.contains(&kind))
                .count();
            if homes != 1 {
                return Err(StoreError::Config {
                    reason: format!("{} fragments are assigned to {} graphs, expected 1", kind, homes),
                });
            }
        }
        if self.server.probe_attempts == 0 || self.server.stop_attempts == 0 {
            return Err(StoreError::Config {
                reason: "probe and stop attempts must be positive".to_string(),
            });
        }
        Ok(())
    }
}
