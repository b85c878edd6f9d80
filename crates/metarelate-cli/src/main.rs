//! metOcean mapping store CLI.
//!
//! Provides the `metarelate` binary: runs the graph-store server, creates
//! property fragments, inspects and saves or reverts the dirty set, and
//! resolves stored mappings to JSON.
//!
//! Every subcommand talks to the store through the same
//! `FragmentRepository` / `DirtySetManager` / `StructuralReconstructor`
//! components a web layer would use.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use metarelate_core::{FragmentId, FragmentKind, GraphName, PropertyBody};
use metarelate_store::{
    DirtyFlush, DirtySetManager, FragmentRepository, HttpStoreClient, MappingLineage,
    ServerSupervisor, SparqlStore, StoreConfig, StoreError, StructuralReconstructor,
};

/// metOcean mapping store tools.
#[derive(Parser)]
#[command(name = "metarelate", about = "metOcean mapping store tools")]
struct Cli {
    /// JSON configuration file (default: built-in settings).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Start the graph-store server if it is not running, and restart it
    /// once when a request fails.
    #[arg(long, global = true)]
    supervise: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the graph-store server until stdin closes.
    Serve {
        /// Save every dirty fragment before stopping.
        #[arg(long)]
        save_on_exit: bool,
    },

    /// Show the endpoint, server health and dirty counts.
    Status,

    /// List the dirty fragments of a graph (name or file name).
    Dirty { graph: String },

    /// Append dirty fragments to their graph files (default: all graphs).
    Save { graphs: Vec<String> },

    /// Discard dirty fragments (default: all graphs).
    Revert { graphs: Vec<String> },

    /// Print a mapping as JSON.
    Resolve {
        /// Mapping id (full URI).
        id: String,

        /// Swap source and target (invertible mappings only).
        #[arg(long)]
        inverse: bool,
    },

    /// List the mappings no other mapping replaces.
    Current,

    /// List pairs of current mappings that disagree on a target.
    Conflicts,

    /// List the mappings that use any of the given concepts.
    Mappings {
        /// Concept ids (full URIs).
        #[arg(required = true)]
        concepts: Vec<String>,

        /// Only mappings whose target is one of these (concepts are then sources).
        #[arg(long)]
        target: Vec<String>,
    },

    /// List the active contacts of a register.
    Contacts { register: String },

    /// List the mediators.
    Mediators,

    /// Get or create a property fragment and print its id.
    Property {
        /// Property name, e.g. `mrcf:standard_name`.
        #[arg(short, long)]
        name: String,

        /// Property value, e.g. `cfsn:air_temperature`.
        #[arg(short, long, requires = "operator")]
        value: Option<String>,

        /// Operator relating name and value.
        #[arg(short, long, requires = "value")]
        operator: Option<String>,
    },
}

type Store = SparqlStore<HttpStoreClient>;

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let exit_code = match run(&cli, &config) {
        Ok(()) => 0,
        Err(e) => report(&e),
    };
    process::exit(exit_code);
}

fn load_config(path: Option<&Path>) -> Result<StoreConfig, StoreError> {
    match path {
        Some(path) => StoreConfig::load(path),
        None => StoreConfig::default().with_env_overrides(|key| std::env::var(key).ok()),
    }
}

/// Prints `error` and returns the exit code: 1 = store or server failure,
/// 2 = rejected input, 3 = I/O error.
fn report(error: &StoreError) -> i32 {
    eprintln!("Error: {}", error);
    match error {
        StoreError::Core(_) | StoreError::NotInvertible { .. } | StoreError::Config { .. } => 2,
        StoreError::Persistence { .. } => 3,
        _ => 1,
    }
}

fn run(cli: &Cli, config: &StoreConfig) -> Result<(), StoreError> {
    let supervisor = Arc::new(ServerSupervisor::new(config.server.clone(), &config.endpoint));

    if let Commands::Serve { save_on_exit } = cli.command {
        return serve(&supervisor, config, save_on_exit);
    }

    if cli.supervise {
        supervisor.start()?;
    }
    let store = open_store(config, cli.supervise.then_some(&supervisor))?;

    match &cli.command {
        Commands::Serve { .. } => Ok(()),
        Commands::Status => status(&store, &supervisor, config),
        Commands::Dirty { graph } => dirty(&store, config, graph),
        Commands::Save { graphs } => save(&store, config, graphs),
        Commands::Revert { graphs } => revert(&store, config, graphs),
        Commands::Resolve { id, inverse } => resolve(&store, config, id, *inverse),
        Commands::Current => current(&store, config),
        Commands::Conflicts => conflicts(&store, config),
        Commands::Mappings { concepts, target } => mappings(&store, config, concepts, target),
        Commands::Contacts { register } => contacts(&store, config, register),
        Commands::Mediators => mediators(&store, config),
        Commands::Property {
            name,
            value,
            operator,
        } => property(&store, config, name, value.as_deref(), operator.as_deref()),
    }
}

/// The SPARQL store, restarting the server through `supervisor` on failure
/// when one is given.
fn open_store(config: &StoreConfig, supervisor: Option<&Arc<ServerSupervisor>>) -> Result<Store, StoreError> {
    let mut client = HttpStoreClient::new(config)?;
    if let Some(supervisor) = supervisor {
        client = client.with_supervisor(Arc::clone(supervisor));
    }
    Ok(SparqlStore::new(client, config.namespaces()))
}

// ---------------------------------------------------------------------------
// Server lifecycle
// ---------------------------------------------------------------------------

fn serve(supervisor: &Arc<ServerSupervisor>, config: &StoreConfig, save_on_exit: bool) -> Result<(), StoreError> {
    supervisor.start()?;
    println!(
        "graph-store server listening on {} (close stdin to stop)",
        config.endpoint.base_url()
    );

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        if line.is_err() {
            break;
        }
    }

    if save_on_exit {
        let store = open_store(config, Some(supervisor))?;
        let manager = DirtySetManager::new(&store, config);
        supervisor.stop(Some(&manager as &dyn DirtyFlush))
    } else {
        supervisor.stop(None)
    }
}

fn status(store: &Store, supervisor: &ServerSupervisor, config: &StoreConfig) -> Result<(), StoreError> {
    let alive = supervisor.alive();
    let mut graphs = serde_json::Map::new();
    if alive {
        let manager = DirtySetManager::new(store, config);
        for graph in manager.graphs() {
            let count = manager.query_dirty(graph)?.len();
            graphs.insert(graph.to_string(), serde_json::json!(count));
        }
    }
    print_json(&serde_json::json!({
        "endpoint": config.endpoint.base_url(),
        "alive": alive,
        "owned": supervisor.owns_process(),
        "dirty": graphs,
    }));
    Ok(())
}

// ---------------------------------------------------------------------------
// Dirty set
// ---------------------------------------------------------------------------

fn graph_names(config: &StoreConfig, requested: &[String]) -> Result<Vec<GraphName>, StoreError> {
    if requested.is_empty() {
        return Ok(config.persistence.graphs.iter().map(|g| g.name.clone()).collect());
    }
    requested
        .iter()
        .map(|name| -> Result<GraphName, StoreError> {
            Ok(config.persistence.graph(name)?.name.clone())
        })
        .collect()
}

fn dirty(store: &Store, config: &StoreConfig, graph: &str) -> Result<(), StoreError> {
    let graph = config.persistence.graph(graph)?.name.clone();
    let fragments = DirtySetManager::new(store, config).query_dirty(&graph)?;
    print_json(&serde_json::to_value(&fragments).unwrap_or_default());
    Ok(())
}

fn save(store: &Store, config: &StoreConfig, graphs: &[String]) -> Result<(), StoreError> {
    let manager = DirtySetManager::new(store, config);
    for graph in graph_names(config, graphs)? {
        let report = manager.save(&graph)?;
        println!(
            "{}: saved {} fragment(s) to {}",
            report.graph,
            report.saved.len(),
            report.path.display()
        );
    }
    Ok(())
}

fn revert(store: &Store, config: &StoreConfig, graphs: &[String]) -> Result<(), StoreError> {
    let manager = DirtySetManager::new(store, config);
    for graph in graph_names(config, graphs)? {
        let removed = manager.revert(&graph)?;
        println!("{}: reverted {} fragment(s)", graph, removed);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

fn resolve(store: &Store, config: &StoreConfig, id: &str, inverse: bool) -> Result<(), StoreError> {
    let repo = FragmentRepository::new(store, config);
    let reconstructor = StructuralReconstructor::new(&repo);
    let id = FragmentId::new(id);
    let mapping = if inverse {
        reconstructor.resolve_inverse(&id)?
    } else {
        reconstructor.resolve(&id)?
    };
    print_json(&serde_json::to_value(&mapping).unwrap_or_default());
    Ok(())
}

fn current(store: &Store, config: &StoreConfig) -> Result<(), StoreError> {
    let repo = FragmentRepository::new(store, config);
    let lineage = MappingLineage::load(&repo)?;
    for mapping in lineage.current_mappings() {
        println!("{}", mapping.id);
    }
    Ok(())
}

fn conflicts(store: &Store, config: &StoreConfig) -> Result<(), StoreError> {
    let repo = FragmentRepository::new(store, config);
    let lineage = MappingLineage::load(&repo)?;
    let conflicts: Vec<serde_json::Value> = lineage
        .conflicting_mappings(&repo)?
        .into_iter()
        .map(|c| {
            serde_json::json!({
                "source": c.source,
                "format": c.format,
                "mappings": [c.mappings.0, c.mappings.1],
            })
        })
        .collect();
    print_json(&serde_json::Value::Array(conflicts));
    Ok(())
}

fn mappings(store: &Store, config: &StoreConfig, concepts: &[String], targets: &[String]) -> Result<(), StoreError> {
    let repo = FragmentRepository::new(store, config);
    let ids = |uris: &[String]| uris.iter().map(|u| FragmentId::new(u)).collect::<Vec<_>>();
    let found = if targets.is_empty() {
        repo.mappings_by_concept(&ids(concepts))?
    } else {
        repo.mappings_by_ordered_concept(&ids(concepts), &ids(targets))?
    };
    print_json(&serde_json::to_value(&found).unwrap_or_default());
    Ok(())
}

// ---------------------------------------------------------------------------
// Registers
// ---------------------------------------------------------------------------

fn contacts(store: &Store, config: &StoreConfig, register: &str) -> Result<(), StoreError> {
    let repo = FragmentRepository::new(store, config);
    for contact in repo.contacts(register)? {
        println!("{}", contact.id);
    }
    Ok(())
}

fn mediators(store: &Store, config: &StoreConfig) -> Result<(), StoreError> {
    let repo = FragmentRepository::new(store, config);
    print_json(&serde_json::to_value(repo.mediators()?).unwrap_or_default());
    Ok(())
}

fn property(
    store: &Store,
    config: &StoreConfig,
    name: &str,
    value: Option<&str>,
    operator: Option<&str>,
) -> Result<(), StoreError> {
    let repo = FragmentRepository::new(store, config);
    let body = match (value, operator) {
        (Some(value), Some(operator)) => PropertyBody::valued(name, value, operator),
        _ => PropertyBody::named(name),
    };
    let id = repo.get_or_create_body(&body.into())?;
    tracing::info!(%id, kind = %FragmentKind::Property, "property ready");
    println!("{}", id);
    Ok(())
}

fn print_json(value: &serde_json::Value) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_requires_operator() {
        let parsed = Cli::try_parse_from(["metarelate", "property", "--name", "mrcf:units", "--value", "\"K\""]);
        assert!(parsed.is_err());
        let parsed = Cli::try_parse_from([
            "metarelate",
            "--supervise",
            "property",
            "--name",
            "mrcf:units",
            "--value",
            "\"K\"",
            "--operator",
            "<http://www.openmath.org/cd/relation1.xhtml#eq>",
        ])
        .unwrap();
        assert!(parsed.supervise);
        assert!(matches!(parsed.command, Commands::Property { value: Some(_), .. }));
    }

    #[test]
    fn test_mappings_requires_a_concept() {
        assert!(Cli::try_parse_from(["metarelate", "mappings"]).is_err());
        let parsed = Cli::try_parse_from([
            "metarelate",
            "mappings",
            "http://www.metarelate.net/metOcean/component/a",
            "--target",
            "http://www.metarelate.net/metOcean/component/b",
        ])
        .unwrap();
        assert!(matches!(
            parsed.command,
            Commands::Mappings { ref concepts, ref target } if concepts.len() == 1 && target.len() == 1
        ));
    }

    #[test]
    fn test_save_defaults_to_all_graphs() {
        let config = StoreConfig::default();
        let names = graph_names(&config, &[]).unwrap();
        assert_eq!(names.len(), 3);
        let names = graph_names(&config, &["mappings.ttl".to_string()]).unwrap();
        assert_eq!(names, vec![GraphName::new("http://metarelate.net/mappings.ttl")]);
        assert!(graph_names(&config, &["nope.ttl".to_string()]).is_err());
    }

    #[test]
    fn test_open_store_attaches_supervisor() {
        let config = StoreConfig::default();
        let supervisor = Arc::new(ServerSupervisor::new(config.server.clone(), &config.endpoint));
        assert!(open_store(&config, Some(&supervisor)).unwrap().client().is_supervised());
        assert!(!open_store(&config, None).unwrap().client().is_supervised());
    }

    #[test]
    fn test_exit_codes() {
        let rejected = StoreError::NotInvertible {
            id: FragmentId::new("http://x/mapping/1"),
        };
        assert_eq!(report(&rejected), 2);
        let unavailable = StoreError::StoreUnavailable {
            endpoint: "http://127.0.0.1:3131/metocean/query".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(report(&unavailable), 1);
    }
}
