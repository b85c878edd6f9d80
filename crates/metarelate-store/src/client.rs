//! The [`StoreClient`] seam to the external graph-store service.
//!
//! A client sends query and update text (the namespace prolog is the
//! client's concern) and returns typed [`Row`]s. [`HttpStoreClient`] speaks
//! the SPARQL 1.1 protocol over HTTP; tests substitute a recording fake.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use metarelate_core::{term, Namespaces};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::supervisor::ServerSupervisor;

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// Read/write access to the graph-store service.
pub trait StoreClient {
    /// Runs a read query and returns its result rows.
    fn query(&self, text: &str) -> Result<Vec<Row>, StoreError>;

    /// Runs an update.
    fn update(&self, text: &str) -> Result<(), StoreError>;
}

impl<C: StoreClient + ?Sized> StoreClient for &C {
    fn query(&self, text: &str) -> Result<Vec<Row>, StoreError> {
        (**self).query(text)
    }

    fn update(&self, text: &str) -> Result<(), StoreError> {
        (**self).update(text)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A single bound value in a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowValue {
    Uri(String),
    Literal {
        lexical: String,
        datatype: Option<String>,
        lang: Option<String>,
    },
    Integer(i64),
    Blank(String),
}

impl RowValue {
    /// The URI, lexical form or number as plain text.
    pub fn text(&self) -> String {
        match self {
            RowValue::Uri(uri) => uri.clone(),
            RowValue::Literal { lexical, .. } => lexical.clone(),
            RowValue::Integer(n) => n.to_string(),
            RowValue::Blank(id) => id.clone(),
        }
    }

    /// The value as an N3 term, matching canonical attribute objects.
    pub fn to_n3(&self) -> String {
        match self {
            RowValue::Uri(uri) => term::uri(uri),
            RowValue::Integer(n) => n.to_string(),
            RowValue::Blank(id) => format!("_:{}", id),
            RowValue::Literal {
                lexical,
                datatype,
                lang,
            } => match (datatype.as_deref(), lang) {
                (_, Some(lang)) => format!("{}@{}", term::literal(lexical), lang),
                (Some(dt), None) if is_bare_datatype(dt) => lexical.clone(),
                (Some(dt), None) => term::typed_literal(lexical, dt),
                (None, None) => term::literal(lexical),
            },
        }
    }
}

/// Numbers and booleans are written bare in N3.
fn is_bare_datatype(datatype: &str) -> bool {
    matches!(
        datatype.strip_prefix(XSD),
        Some("boolean" | "decimal" | "double")
    )
}

/// One result row: variable name to bound value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: IndexMap<String, RowValue>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    /// Builder used by fakes and tests.
    pub fn with(mut self, var: &str, value: RowValue) -> Self {
        self.values.insert(var.to_string(), value);
        self
    }

    pub fn get(&self, var: &str) -> Option<&RowValue> {
        self.values.get(var)
    }

    pub fn uri(&self, var: &str) -> Option<&str> {
        match self.values.get(var) {
            Some(RowValue::Uri(uri)) => Some(uri),
            _ => None,
        }
    }

    pub fn text(&self, var: &str) -> Option<String> {
        self.values.get(var).map(RowValue::text)
    }

    pub fn integer(&self, var: &str) -> Option<i64> {
        match self.values.get(var) {
            Some(RowValue::Integer(n)) => Some(*n),
            Some(RowValue::Literal { lexical, .. }) => lexical.parse().ok(),
            _ => None,
        }
    }

    /// Splits a `&`-joined aggregate into its members.
    pub fn list(&self, var: &str) -> Vec<String> {
        match self.text(var) {
            Some(text) if !text.is_empty() => text.split('&').map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[derive(Deserialize)]
struct ResultsDocument {
    head: ResultsHead,
    results: ResultsBody,
}

#[derive(Deserialize)]
struct ResultsHead {
    vars: Vec<String>,
}

#[derive(Deserialize)]
struct ResultsBody {
    bindings: Vec<IndexMap<String, Binding>>,
}

#[derive(Deserialize)]
struct Binding {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    datatype: Option<String>,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
}

impl Binding {
    fn into_value(self) -> RowValue {
        match self.kind.as_str() {
            "uri" => RowValue::Uri(self.value),
            "bnode" => RowValue::Blank(self.value),
            _ => {
                let integer = self
                    .datatype
                    .as_deref()
                    .and_then(|dt| dt.strip_prefix(XSD))
                    .is_some_and(|local| local == "integer");
                match self.value.parse() {
                    Ok(n) if integer => RowValue::Integer(n),
                    _ => RowValue::Literal {
                        lexical: self.value,
                        datatype: self.datatype,
                        lang: self.lang,
                    },
                }
            }
        }
    }
}

/// Parses a SPARQL JSON results document.
///
/// A body that is not a valid results document yields no rows; only
/// transport failures are errors.
pub fn parse_results(body: &str) -> Vec<Row> {
    let document: ResultsDocument = match serde_json::from_str(body) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable store response, treating as no rows");
            return Vec::new();
        }
    };
    let vars = document.head.vars;
    document
        .results
        .bindings
        .into_iter()
        .map(|mut binding| {
            let mut row = Row::new();
            for var in &vars {
                if let Some(value) = binding.shift_remove(var) {
                    row.values.insert(var.clone(), value.into_value());
                }
            }
            row
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// SPARQL-protocol client: form-encoded POST to `{base}/query` and `{base}/update`.
pub struct HttpStoreClient {
    http: reqwest::blocking::Client,
    base_url: String,
    prolog: String,
    supervisor: Option<Arc<ServerSupervisor>>,
}

impl HttpStoreClient {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::with_namespaces(&config.endpoint.base_url(), &config.namespaces(), config.endpoint.timeout())
    }

    pub fn with_namespaces(
        base_url: &str,
        namespaces: &Namespaces,
        timeout: std::time::Duration,
    ) -> Result<Self, StoreError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| StoreError::Config {
                reason: format!("cannot build HTTP client: {}", e),
            })?;
        Ok(HttpStoreClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            prolog: namespaces.sparql_prolog(),
            supervisor: None,
        })
    }

    /// On `StoreUnavailable`, restart the server through `supervisor` and
    /// retry once.
    pub fn with_supervisor(mut self, supervisor: Arc<ServerSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_supervised(&self) -> bool {
        self.supervisor.is_some()
    }

    fn post(&self, action: &str, form: &[(&str, &str)]) -> Result<String, StoreError> {
        let url = format!("{}/{}", self.base_url, action);
        let unavailable = |reason: String| StoreError::StoreUnavailable {
            endpoint: url.clone(),
            reason,
        };
        let response = self
            .http
            .post(&url)
            .form(form)
            .send()
            .map_err(|e| unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(unavailable(format!("HTTP {}: {}", status, detail.trim())));
        }
        response.text().map_err(|e| unavailable(e.to_string()))
    }

    fn with_retry<T>(&self, op: impl Fn() -> Result<T, StoreError>) -> Result<T, StoreError> {
        match (op(), &self.supervisor) {
            (Err(StoreError::StoreUnavailable { endpoint, reason }), Some(supervisor)) => {
                tracing::warn!(%endpoint, %reason, "store unavailable, restarting server and retrying once");
                match supervisor.restart() {
                    Ok(()) => op(),
                    // Not ours to restart: report the request failure.
                    Err(StoreError::PortInUse { port }) => {
                        tracing::warn!(port, "server on the port is not supervised, not retrying");
                        Err(StoreError::StoreUnavailable { endpoint, reason })
                    }
                    Err(e) => Err(e),
                }
            }
            (result, _) => result,
        }
    }
}

impl StoreClient for HttpStoreClient {
    fn query(&self, text: &str) -> Result<Vec<Row>, StoreError> {
        let full = format!("{}{}", self.prolog, text);
        tracing::debug!(query = %text, "sparql query");
        let body = self.with_retry(|| self.post("query", &[("query", full.as_str()), ("output", "json")]))?;
        Ok(parse_results(&body))
    }

    fn update(&self, text: &str) -> Result<(), StoreError> {
        let full = format!("{}{}", self.prolog, text);
        tracing::debug!(update = %text, "sparql update");
        self.with_retry(|| self.post("update", &[("update", full.as_str())]))?;
        Ok(())
    }
}
