//! Storage error types for metarelate-store.
//!
//! [`StoreError`] covers every failure mode of the store engine: validation
//! errors from the fragment model (wrapped [`CoreError`]), connectivity to
//! the graph-store service, server lifecycle bounds, content-addressing
//! violations, and reconstruction failures.

use std::path::PathBuf;

use thiserror::Error;

use metarelate_core::{CoreError, FragmentId, FragmentKind};

/// Errors produced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller's data was rejected before any store round-trip.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Network failure or non-2xx response from the graph-store service.
    #[error("graph store unavailable at {endpoint}: {reason}")]
    StoreUnavailable { endpoint: String, reason: String },

    /// The server did not open its port within the probe bound.
    #[error("server did not start on port {port} after {attempts} probes")]
    ServerStartTimeout { port: u16, attempts: u32 },

    /// The server still answered after the stop bound.
    #[error("server on port {port} still alive after {attempts} probes")]
    ServerStopTimeout { port: u16, attempts: u32 },

    /// The launched process exited before its port opened.
    #[error("server process exited before opening port {port}: {status}")]
    ServerExited { port: u16, status: String },

    /// The server binary could not be spawned.
    #[error("failed to launch server '{binary}': {source}")]
    ServerLaunch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Something this supervisor did not start already serves the port.
    #[error("port {port} is already served by a process this supervisor did not start")]
    PortInUse { port: u16 },

    /// More than one stored fragment matched an exact-match lookup.
    #[error("{count} {kind} fragments match one attribute set: {ids:?}")]
    AmbiguousFragment {
        kind: FragmentKind,
        count: usize,
        ids: Vec<FragmentId>,
    },

    /// A referenced fragment id does not resolve.
    #[error("dangling reference: {id}")]
    DanglingReference { id: FragmentId },

    /// Stored data violates a domain invariant.
    #[error("malformed fragment {id}: {reason}")]
    MalformedFragment { id: FragmentId, reason: String },

    /// An inverse was requested for a mapping that is not invertible.
    #[error("mapping {id} is not invertible")]
    NotInvertible { id: FragmentId },

    /// Reading or writing a durable graph file failed.
    #[error("persistence error on {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be loaded or is inconsistent.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl StoreError {
    /// True for an unregistered namespace prefix.
    pub fn is_unknown_prefix(&self) -> bool {
        matches!(self, StoreError::Core(CoreError::UnknownPrefix { .. }))
    }

    /// True for attributes rejected by a kind's predicate tables.
    pub fn is_invalid_fragment(&self) -> bool {
        matches!(self, StoreError::Core(CoreError::InvalidFragment { .. }))
    }

    pub(crate) fn malformed(id: &FragmentId, reason: impl Into<String>) -> Self {
        StoreError::MalformedFragment {
            id: id.clone(),
            reason: reason.into(),
        }
    }
}
