//! Tests for the SPARQL backend and the HTTP client.
//!
//! `SparqlStore` runs against a recording fake client with canned rows, so
//! each resolution step can be checked without a live server. The HTTP
//! client is exercised against a one-shot `TcpListener` that answers a
//! single request.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use metarelate_core::pred::*;
use metarelate_core::{Attributes, FragmentId, FragmentKind, Namespaces};
use metarelate_store::{
    DirtySetManager, FragmentRepository, HttpStoreClient, IdentityHasher, Row, RowValue,
    SparqlStore, StoreClient, StoreConfig, StoreError, StructuralReconstructor,
};

// ---------------------------------------------------------------------------
// Recording fake client
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingClient {
    queries: RefCell<Vec<String>>,
    updates: RefCell<Vec<String>>,
    responses: RefCell<VecDeque<Vec<Row>>>,
}

impl RecordingClient {
    fn respond(&self, rows: Vec<Row>) {
        self.responses.borrow_mut().push_back(rows);
    }
}

impl StoreClient for RecordingClient {
    fn query(&self, text: &str) -> Result<Vec<Row>, StoreError> {
        self.queries.borrow_mut().push(text.to_string());
        Ok(self.responses.borrow_mut().pop_front().unwrap_or_default())
    }

    fn update(&self, text: &str) -> Result<(), StoreError> {
        self.updates.borrow_mut().push(text.to_string());
        Ok(())
    }
}

fn uri(value: &str) -> RowValue {
    RowValue::Uri(value.to_string())
}

fn units() -> Attributes {
    Attributes::new().with(NAME, "mrcf:units")
}

// ---------------------------------------------------------------------------
// SparqlStore
// ---------------------------------------------------------------------------

#[test]
fn test_get_or_create_inserts_then_requeries() {
    let config = StoreConfig::default();
    let client = RecordingClient::default();
    let store = SparqlStore::new(&client, config.namespaces());
    let repo = FragmentRepository::new(&store, &config);

    let canonical = units()
        .canonicalize(FragmentKind::Property, &config.namespaces())
        .unwrap();
    let expected = IdentityHasher::from_config(&config)
        .mint(FragmentKind::Property, &canonical)
        .unwrap();
    client.respond(Vec::new());
    client.respond(vec![Row::new().with("fragment", uri(expected.as_str()))]);

    let id = repo.get_or_create(FragmentKind::Property, &units()).unwrap();
    assert_eq!(id, expected);

    let queries = client.queries.borrow();
    assert_eq!(queries.len(), 2);
    assert!(queries[0].contains("mr:name <http://www.metarelate.net/predicates/CF.html#units>"));
    assert_eq!(queries[0], queries[1]);

    let updates = client.updates.borrow();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].contains(&format!("{} rdf:type mr:Property", expected.to_n3())));
    assert!(updates[0].contains("mr:saveCache \"True\""));
}

#[test]
fn test_existing_fragment_is_not_reinserted() {
    let config = StoreConfig::default();
    let client = RecordingClient::default();
    let store = SparqlStore::new(&client, config.namespaces());
    let repo = FragmentRepository::new(&store, &config);

    client.respond(vec![Row::new().with("fragment", uri("http://www.metarelate.net/metOcean/property/abc"))]);
    let id = repo.get_or_create(FragmentKind::Property, &units()).unwrap();
    assert_eq!(id.as_str(), "http://www.metarelate.net/metOcean/property/abc");
    assert!(client.updates.borrow().is_empty());
}

#[test]
fn test_two_matches_are_ambiguous() {
    let config = StoreConfig::default();
    let client = RecordingClient::default();
    let store = SparqlStore::new(&client, config.namespaces());
    let repo = FragmentRepository::new(&store, &config);

    client.respond(vec![
        Row::new().with("fragment", uri("http://x/property/1")),
        Row::new().with("fragment", uri("http://x/property/2")),
    ]);
    let err = repo.get_or_create(FragmentKind::Property, &units()).unwrap_err();
    assert!(matches!(err, StoreError::AmbiguousFragment { count: 2, .. }));
}

#[test]
fn test_invalid_fragment_sends_nothing() {
    let config = StoreConfig::default();
    let client = RecordingClient::default();
    let store = SparqlStore::new(&client, config.namespaces());
    let repo = FragmentRepository::new(&store, &config);

    let err = repo
        .get_or_create(FragmentKind::Component, &Attributes::new().with(HAS_PROPERTY, "<http://p/1>"))
        .unwrap_err();
    assert!(err.is_invalid_fragment());
    assert!(client.queries.borrow().is_empty());
    assert!(client.updates.borrow().is_empty());
}

#[test]
fn test_save_flushes_rows_then_clears_flags() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StoreConfig::default();
    config.persistence.data_dir = dir.path().to_path_buf();
    let client = RecordingClient::default();
    let store = SparqlStore::new(&client, config.namespaces());
    let manager = DirtySetManager::new(&store, &config);

    let subject = "http://www.metarelate.net/metOcean/property/abc";
    let ns = Namespaces::default();
    let triple = |p: &str, o: RowValue| {
        Row::new()
            .with("s", uri(subject))
            .with("p", uri(&ns.expand(p).unwrap()))
            .with("o", o)
    };
    client.respond(vec![
        triple(TYPE, uri("http://www.metarelate.net/predicates/index.html#Property")),
        triple(NAME, uri("http://www.metarelate.net/predicates/CF.html#units")),
        triple(
            SAVE_CACHE,
            RowValue::Literal {
                lexical: "True".to_string(),
                datatype: None,
                lang: None,
            },
        ),
    ]);

    let graph = config.persistence.graphs[0].name.clone();
    let report = manager.save(&graph).unwrap();
    assert_eq!(report.saved.len(), 1);

    let text = std::fs::read_to_string(dir.path().join("concepts.ttl")).unwrap();
    assert!(text.contains(&format!("<{}>\n    a mr:Property ;\n    mr:name mrcf:units .", subject)));

    let updates = client.updates.borrow();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].starts_with("DELETE DATA"));
    assert!(updates[0].contains(&format!("<{}> mr:saveCache \"True\"", subject)));
}

#[test]
fn test_revert_reports_dirty_count() {
    let config = StoreConfig::default();
    let client = RecordingClient::default();
    let store = SparqlStore::new(&client, config.namespaces());
    let manager = DirtySetManager::new(&store, &config);

    client.respond(vec![Row::new().with("count", RowValue::Integer(3))]);
    let graph = config.persistence.graphs[0].name.clone();
    assert_eq!(manager.revert(&graph).unwrap(), 3);
    assert!(client.updates.borrow()[0].starts_with("DELETE WHERE"));
}

// ---------------------------------------------------------------------------
// Reconstruction over SPARQL
// ---------------------------------------------------------------------------

/// Answers fetch and notation queries from a fixed triple table, the way a
/// graph store would: only well-formed `<uri>` subjects match.
#[derive(Default)]
struct TripleTableClient {
    triples: BTreeMap<String, Vec<(String, RowValue)>>,
    notations: BTreeMap<String, String>,
    queries: RefCell<Vec<String>>,
}

impl TripleTableClient {
    fn add(&mut self, subject: &str, predicate: &str, object: RowValue) {
        let predicate = Namespaces::default().expand(predicate).unwrap();
        self.triples
            .entry(subject.to_string())
            .or_default()
            .push((predicate, object));
    }
}

impl StoreClient for TripleTableClient {
    fn query(&self, text: &str) -> Result<Vec<Row>, StoreError> {
        self.queries.borrow_mut().push(text.to_string());
        if text.contains("skos:notation") {
            let label = self
                .notations
                .iter()
                .find(|(uri, _)| text.contains(&format!("{{ <{}> skos:notation ?notation }}", uri)));
            return Ok(label
                .map(|(_, label)| {
                    vec![Row::new().with(
                        "notation",
                        RowValue::Literal {
                            lexical: label.clone(),
                            datatype: None,
                            lang: None,
                        },
                    )]
                })
                .unwrap_or_default());
        }
        let rows = self
            .triples
            .iter()
            .find(|(subject, _)| text.contains(&format!("{{ <{}> ?p ?o }}", subject)))
            .map(|(_, triples)| {
                triples
                    .iter()
                    .map(|(p, o)| Row::new().with("p", uri(p)).with("o", o.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    fn update(&self, _text: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[test]
fn test_concept_resolves_through_sparql_store() {
    const CF: &str = "http://www.metarelate.net/metOcean/format/cf";
    const STANDARD_NAME: &str = "http://www.metarelate.net/predicates/CF.html#standard_name";
    let property = "http://www.metarelate.net/metOcean/property/p1";
    let component = "http://www.metarelate.net/metOcean/component/c1";

    let mut client = TripleTableClient::default();
    client.add(property, TYPE, uri("http://www.metarelate.net/predicates/index.html#Property"));
    client.add(property, NAME, uri(STANDARD_NAME));
    client.add(component, TYPE, uri("http://www.metarelate.net/predicates/index.html#Component"));
    client.add(component, HAS_FORMAT, uri(CF));
    client.add(component, HAS_PROPERTY, uri(property));
    client.notations.insert(CF.to_string(), "cf".to_string());
    client.notations.insert(STANDARD_NAME.to_string(), "standard_name".to_string());

    let config = StoreConfig::default();
    let store = SparqlStore::new(&client, config.namespaces());
    let repo = FragmentRepository::new(&store, &config);
    let concept = StructuralReconstructor::new(&repo)
        .concept(&FragmentId::new(component))
        .unwrap();

    assert_eq!(concept.scheme().notation.as_deref(), Some("cf"));
    assert_eq!(concept.format(), "cf");

    let queries = client.queries.borrow();
    let notation_queries: Vec<&String> = queries.iter().filter(|q| q.contains("skos:notation")).collect();
    assert!(!notation_queries.is_empty());
    assert!(notation_queries
        .iter()
        .any(|q| q.contains(&format!("<{}> skos:notation", STANDARD_NAME))));
    assert!(notation_queries.iter().all(|q| !q.contains("{ http")));
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Serves one request with `status` and `body`; returns the raw request.
fn one_shot(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}/metocean", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/sparql-results+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&request).to_string()
    });
    (base, handle)
}

fn client(base: &str) -> HttpStoreClient {
    HttpStoreClient::with_namespaces(base, &Namespaces::default(), Duration::from_secs(5)).unwrap()
}

#[test]
fn test_http_query_posts_form_and_parses_rows() {
    let body = r#"{"head":{"vars":["fragment"]},"results":{"bindings":[
        {"fragment":{"type":"uri","value":"http://www.metarelate.net/metOcean/property/abc"}}]}}"#;
    let (base, server) = one_shot("200 OK", body);

    let rows = client(&base).query("SELECT ?fragment WHERE { ?fragment ?p ?o }").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].uri("fragment"), Some("http://www.metarelate.net/metOcean/property/abc"));

    let request = server.join().unwrap();
    assert!(request.starts_with("POST /metocean/query "));
    assert!(request.contains("output=json"));
    assert!(request.contains("query=PREFIX"));
}

#[test]
fn test_http_error_status_is_store_unavailable() {
    let (base, server) = one_shot("500 Internal Server Error", "boom");
    let err = client(&base).update("INSERT DATA { }").unwrap_err();
    assert!(matches!(err, StoreError::StoreUnavailable { .. }));
    let request = server.join().unwrap();
    assert!(request.starts_with("POST /metocean/update "));
}

#[test]
fn test_http_unparseable_body_is_no_rows() {
    let (base, server) = one_shot("200 OK", "not json");
    let rows = client(&base).query("SELECT * WHERE { }").unwrap();
    assert!(rows.is_empty());
    server.join().unwrap();
}

#[test]
fn test_http_connection_refused_is_store_unavailable() {
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let err = client(&format!("http://127.0.0.1:{}/metocean", port))
        .query("SELECT * WHERE { }")
        .unwrap_err();
    assert!(matches!(err, StoreError::StoreUnavailable { .. }));
}
