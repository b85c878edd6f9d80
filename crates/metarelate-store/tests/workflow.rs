//! End-to-end tests of the store engine over the in-memory backend.
//!
//! Each test builds fragments through the repository, then exercises save,
//! revert, reconstruction and lineage the way an editing session would.
//! Durable files go to a fresh temp directory per test.

use metarelate_core::pred::*;
use metarelate_core::{
    Attributes, ComponentBody, FragmentId, FragmentKind, MappingBody, MappingStatus, PropertyBody,
};
use metarelate_store::{
    DirtySetManager, FragmentRepository, GraphStore, InMemoryStore, MappingLineage, StoreConfig,
    StoreError, StructuralReconstructor,
};

const EQ: &str = "<http://www.openmath.org/cd/relation1.xhtml#eq>";
const CF: &str = "<http://www.metarelate.net/metOcean/format/cf>";
const UM: &str = "<http://www.metarelate.net/metOcean/format/um>";
const GRIB: &str = "<http://www.metarelate.net/metOcean/format/grib>";

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct Session {
    _dir: tempfile::TempDir,
    config: StoreConfig,
    store: InMemoryStore,
}

impl Session {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::default();
        config.persistence.data_dir = dir.path().to_path_buf();
        let store = InMemoryStore::new(config.namespaces());
        Session {
            _dir: dir,
            config,
            store,
        }
    }

    fn repo(&self) -> FragmentRepository<&InMemoryStore> {
        FragmentRepository::new(&self.store, &self.config)
    }

    fn dirty(&self) -> DirtySetManager<&InMemoryStore> {
        DirtySetManager::new(&self.store, &self.config)
    }

    fn file(&self, name: &str) -> String {
        std::fs::read_to_string(self.config.persistence.data_dir.join(name)).unwrap()
    }
}

fn property(repo: &FragmentRepository<&InMemoryStore>, name: &str, value: &str) -> FragmentId {
    repo.get_or_create_body(&PropertyBody::valued(name, value, EQ).into())
        .unwrap()
}

fn concept(repo: &FragmentRepository<&InMemoryStore>, format: &str, props: &[&FragmentId]) -> FragmentId {
    let body = ComponentBody {
        format: format.to_string(),
        properties: props.iter().map(|p| p.to_n3()).collect(),
        ..Default::default()
    };
    repo.get_or_create_body(&body.into()).unwrap()
}

fn mapping_body(source: &FragmentId, target: &FragmentId) -> MappingBody {
    MappingBody {
        source: source.to_n3(),
        target: target.to_n3(),
        invertible: true,
        status: MappingStatus::Approved,
        reason: "\"new mapping\"".to_string(),
        date: "\"2013-06-01T12:00:00\"^^xsd:dateTime".to_string(),
        creator: "<https://github.com/metarelate>".to_string(),
        note: None,
        replaces: None,
        value_maps: Vec::new(),
        owners: vec!["\"alice\"".to_string()],
        watchers: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Get-or-create
// ---------------------------------------------------------------------------

#[test]
fn test_standard_name_property_created_once() {
    let session = Session::new();
    let repo = session.repo();
    let attrs = Attributes::new()
        .with(NAME, "<http://def.cfconventions.org/datamodel/standard_name>")
        .with(VALUE, "<http://def.cfconventions.org/standard_name/air_temperature>")
        .with(OPERATOR, EQ);

    let first = repo.get_or_create(FragmentKind::Property, &attrs).unwrap();
    let second = repo.get_or_create(FragmentKind::Property, &attrs).unwrap();
    assert_eq!(first, second);
    assert!(first
        .as_str()
        .starts_with("http://www.metarelate.net/metOcean/property/"));
    assert_eq!(first.local_name().len(), 64);

    let graph = repo.graph_for(FragmentKind::Property).unwrap();
    let stored = session.store.fragments(graph, FragmentKind::Property).unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].dirty);
}

#[test]
fn test_mapping_differing_only_in_date_is_the_same_fragment() {
    let session = Session::new();
    let repo = session.repo();
    let cf = concept(&repo, CF, &[&property(&repo, "mrcf:units", "\"K\"")]);
    let um = concept(&repo, UM, &[&property(&repo, "<http://reference.metoffice.gov.uk/um/f3/stash>", "\"m01s03i236\"")]);

    let first = repo.get_or_create_body(&mapping_body(&um, &cf).into()).unwrap();
    let mut later = mapping_body(&um, &cf);
    later.date = "\"2014-01-01T00:00:00\"^^xsd:dateTime".to_string();
    let second = repo.get_or_create_body(&later.into()).unwrap();
    assert_eq!(first, second);

    let stored = repo.fetch_expected(FragmentKind::Mapping, &first).unwrap();
    assert_eq!(stored.attributes.objects(DATE).len(), 1);
}

// ---------------------------------------------------------------------------
// Save and revert
// ---------------------------------------------------------------------------

#[test]
fn test_save_then_nothing_is_dirty() {
    let session = Session::new();
    let repo = session.repo();
    let manager = session.dirty();
    let id = property(&repo, "mrcf:standard_name", "cfsn:air_temperature");
    let graph = repo.graph_for(FragmentKind::Property).unwrap().clone();

    assert_eq!(manager.query_dirty(&graph).unwrap().len(), 1);
    let report = manager.save(&graph).unwrap();
    assert_eq!(report.saved, vec![id.clone()]);
    assert!(manager.query_dirty(&graph).unwrap().is_empty());

    let text = session.file("concepts.ttl");
    assert!(text.contains(&format!("<{}>", id)));
    assert!(text.contains("mr:name mrcf:standard_name"));
    assert!(text.contains("rdf:value cfsn:air_temperature"));

    // Saved fragments still resolve to the same id.
    assert_eq!(property(&repo, "mrcf:standard_name", "cfsn:air_temperature"), id);
    let fetched = repo.fetch_expected(FragmentKind::Property, &id).unwrap();
    assert!(!fetched.dirty);
}

#[test]
fn test_revert_then_get_or_create_makes_a_fresh_dirty_fragment() {
    let session = Session::new();
    let repo = session.repo();
    let manager = session.dirty();
    let graph = repo.graph_for(FragmentKind::Property).unwrap().clone();

    let attrs = Attributes::new().with(NAME, "mrcf:long_name");
    let id = repo.get_or_create(FragmentKind::Property, &attrs).unwrap();
    assert_eq!(manager.revert(&graph).unwrap(), 1);
    assert!(repo.find(FragmentKind::Property, &attrs).unwrap().is_none());
    assert!(session.store.is_empty());

    let again = repo.get_or_create(FragmentKind::Property, &attrs).unwrap();
    assert_eq!(again, id);
    assert_eq!(manager.query_dirty(&graph).unwrap().len(), 1);
}

#[test]
fn test_revert_keeps_saved_fragments() {
    let session = Session::new();
    let repo = session.repo();
    let manager = session.dirty();
    let graph = repo.graph_for(FragmentKind::Property).unwrap().clone();

    let kept = property(&repo, "mrcf:units", "\"K\"");
    manager.save(&graph).unwrap();
    property(&repo, "mrcf:units", "\"m s-1\"");
    assert_eq!(manager.revert(&graph).unwrap(), 1);

    let left = session.store.fragments(&graph, FragmentKind::Property).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, kept);
}

#[test]
fn test_save_all_writes_each_graph_file() {
    let session = Session::new();
    let repo = session.repo();
    let cf = concept(&repo, CF, &[&property(&repo, "mrcf:units", "\"K\"")]);
    let um = concept(&repo, UM, &[&property(&repo, "<http://reference.metoffice.gov.uk/um/f3/stash>", "\"m01s03i236\"")]);
    let mapping = repo.get_or_create_body(&mapping_body(&um, &cf).into()).unwrap();

    let reports = session.dirty().save_all().unwrap();
    let saved: usize = reports.iter().map(|r| r.saved.len()).sum();
    assert_eq!(saved, 5);

    let mappings = session.file("mappings.ttl");
    assert!(mappings.starts_with("@prefix "));
    assert!(mappings.contains(&format!("<{}>", mapping)));
    assert!(mappings.contains("a mr:Mapping"));
    assert!(!session.config.persistence.data_dir.join("contacts.ttl").exists());
}

// ---------------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------------

#[test]
fn test_round_tripped_mapping_has_original_concepts() {
    let session = Session::new();
    let repo = session.repo();
    let sn = property(&repo, "mrcf:standard_name", "cfsn:air_temperature");
    let stash = property(&repo, "<http://reference.metoffice.gov.uk/um/f3/stash>", "\"m01s03i236\"");
    let cf = concept(&repo, CF, &[&sn]);
    let um = concept(&repo, UM, &[&stash]);
    let id = repo.get_or_create_body(&mapping_body(&um, &cf).into()).unwrap();

    let reconstructor = StructuralReconstructor::new(&repo);
    let mapping = reconstructor.resolve(&id).unwrap();
    assert_eq!(mapping.source, reconstructor.concept(&um).unwrap());
    assert_eq!(mapping.target, reconstructor.concept(&cf).unwrap());
    assert_eq!(mapping.owners, vec!["alice".to_string()]);
    assert_eq!(mapping.date, "2013-06-01T12:00:00");

    let target = mapping.target.get("<http://www.metarelate.net/predicates/CF.html#standard_name>")
        .unwrap()
        .unwrap();
    assert_eq!(
        target.item().unwrap().data,
        "<http://def.cfconventions.org/standard_name/air_temperature>"
    );

    let inverse = reconstructor.resolve_inverse(&id).unwrap();
    assert_eq!(inverse.source, mapping.target);
}

#[test]
fn test_resolve_after_target_deleted_is_dangling() {
    let session = Session::new();
    let repo = session.repo();
    let cf = concept(&repo, CF, &[&property(&repo, "mrcf:units", "\"K\"")]);
    let um = concept(&repo, UM, &[&property(&repo, "<http://reference.metoffice.gov.uk/um/f3/stash>", "\"m01s03i236\"")]);
    let id = repo.get_or_create_body(&mapping_body(&um, &cf).into()).unwrap();

    let graph = repo.graph_for(FragmentKind::Component).unwrap().clone();
    session.store.remove_fragment(&graph, &cf);

    match StructuralReconstructor::new(&repo).resolve(&id) {
        Err(StoreError::DanglingReference { id: missing }) => assert_eq!(missing, cf),
        other => panic!("expected DanglingReference, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Lineage and conflicts
// ---------------------------------------------------------------------------

#[test]
fn test_replaced_mapping_is_not_current() {
    let session = Session::new();
    let repo = session.repo();
    let cf = concept(&repo, CF, &[&property(&repo, "mrcf:units", "\"K\"")]);
    let um = concept(&repo, UM, &[&property(&repo, "<http://reference.metoffice.gov.uk/um/f3/stash>", "\"m01s03i236\"")]);

    let original = repo.get_or_create_body(&mapping_body(&um, &cf).into()).unwrap();
    let mut revision = mapping_body(&um, &cf);
    revision.replaces = Some(original.to_n3());
    revision.reason = "\"corrected units\"".to_string();
    let revised = repo.get_or_create_body(&revision.into()).unwrap();

    let lineage = MappingLineage::load(&repo).unwrap();
    let current: Vec<&FragmentId> = lineage.current_mappings().iter().map(|f| &f.id).collect();
    assert_eq!(current, vec![&revised]);
    assert_eq!(lineage.lineage(&revised).unwrap(), vec![revised.clone(), original.clone()]);
    assert!(lineage.conflicting_mappings(&repo).unwrap().is_empty());
}

#[test]
fn test_same_source_to_two_targets_of_one_format_conflicts() {
    let session = Session::new();
    let repo = session.repo();
    let um = concept(&repo, UM, &[&property(&repo, "<http://reference.metoffice.gov.uk/um/f3/stash>", "\"m01s03i236\"")]);
    let kelvin = concept(&repo, CF, &[&property(&repo, "mrcf:units", "\"K\"")]);
    let celsius = concept(&repo, CF, &[&property(&repo, "mrcf:units", "\"degC\"")]);
    let grib = concept(&repo, GRIB, &[&property(&repo, "<http://codes.wmo.int/def/grib2/parameter>", "\"0-0-0\"")]);

    let a = repo.get_or_create_body(&mapping_body(&um, &kelvin).into()).unwrap();
    let b = repo.get_or_create_body(&mapping_body(&um, &celsius).into()).unwrap();
    repo.get_or_create_body(&mapping_body(&um, &grib).into()).unwrap();

    let mut deprecated = mapping_body(&um, &kelvin);
    deprecated.status = MappingStatus::Deprecated;
    deprecated.reason = "\"superseded\"".to_string();
    repo.get_or_create_body(&deprecated.into()).unwrap();

    let lineage = MappingLineage::load(&repo).unwrap();
    assert_eq!(lineage.len(), 4);
    let conflicts = lineage.conflicting_mappings(&repo).unwrap();
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    assert_eq!(conflict.source, um);
    assert_eq!(conflict.format, CF);
    let expected = if a < b { (a, b) } else { (b, a) };
    assert_eq!(conflict.mappings, expected);
}
