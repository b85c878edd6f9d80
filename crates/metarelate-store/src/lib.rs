//! Content-addressed fragment storage for metOcean mappings.
//!
//! Fragments live in an external SPARQL graph-store service and are
//! identified by a hash of their canonical attributes, so creating the same
//! fragment twice returns the same id.
//!
//! # Architecture
//!
//! The engine has a two-layer API:
//! - **Store seam**: the [`GraphStore`] trait, with [`SparqlStore`] speaking
//!   to the service through a [`StoreClient`] and [`InMemoryStore`] as the
//!   stateful backend for tests and offline use.
//! - **Components** over any `GraphStore`: [`FragmentRepository`]
//!   (get-or-create), [`DirtySetManager`] (save/revert), and
//!   [`StructuralReconstructor`] (fragments back to the domain tree).
//!
//! [`ServerSupervisor`] owns the lifecycle of the server process.
//!
//! # Modules
//!
//! - [`error`]: StoreError enum with all failure modes
//! - [`config`]: StoreConfig and its endpoint/server/persistence sections
//! - [`hash`]: IdentityHasher, content digests and minted ids
//! - [`client`]: StoreClient trait, result rows, HTTP client
//! - [`supervisor`]: ServerSupervisor process lifecycle
//! - [`traits`]: GraphStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`sparql`]: query text builders and SparqlStore
//! - [`repository`]: FragmentRepository get-or-create
//! - [`dirty`]: DirtySetManager save/revert
//! - [`turtle`]: durable file serialisation
//! - [`reconstruct`]: StructuralReconstructor
//! - [`lineage`]: mapping replaces DAG and conflict checks

pub mod client;
pub mod config;
pub mod dirty;
pub mod error;
pub mod hash;
pub mod lineage;
pub mod memory;
pub mod reconstruct;
pub mod repository;
pub mod sparql;
pub mod supervisor;
pub mod traits;
pub mod turtle;

// Re-export key types for ergonomic use.
pub use client::{HttpStoreClient, Row, RowValue, StoreClient};
pub use config::{EndpointConfig, GraphConfig, PersistenceConfig, ServerConfig, StoreConfig};
pub use dirty::{DirtyFlush, DirtySetManager, SaveReport};
pub use error::StoreError;
pub use hash::IdentityHasher;
pub use lineage::{MappingConflict, MappingLineage};
pub use memory::InMemoryStore;
pub use reconstruct::StructuralReconstructor;
pub use repository::FragmentRepository;
pub use sparql::SparqlStore;
pub use supervisor::ServerSupervisor;
pub use traits::GraphStore;
