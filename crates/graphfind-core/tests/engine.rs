//! End-to-end engine scenarios over the in-memory store.

use std::collections::BTreeSet;

use graphfind_core::expression;
use graphfind_core::geometry::Envelope;
use graphfind_core::models::{
    ExtentMode, SearchRequest, SearchableField, SearchableRelationship, SearchableTable,
};
use graphfind_core::search::{find, Layer, Session, StandaloneTable};
use graphfind_core::store::memory::InMemoryStore;
use graphfind_core::store::predicate::Value;
use graphfind_core::store::{ClassId, Field, FieldKind, ObjectClass, RelationshipClass, Store};
use graphfind_core::SearchError;

const POLE: ClassId = ClassId(1);
const UNIT: ClassId = ClassId(2);
const ATTACHMENT: ClassId = ClassId(3);
const INSPECTION: ClassId = ClassId(4);
const TAG: ClassId = ClassId(5);

fn class(id: ClassId, name: &str, fields: &[(&str, FieldKind)], spatial: bool) -> ObjectClass {
    ObjectClass {
        id,
        name: name.to_string(),
        workspace: "electric.gdb".to_string(),
        model_names: Vec::new(),
        fields: fields.iter().map(|(n, k)| Field::new(*n, *k)).collect(),
        spatial,
    }
}

fn relationship(id: i64, name: &str, origin: ClassId, destination: ClassId) -> RelationshipClass {
    RelationshipClass {
        id,
        name: name.to_string(),
        origin,
        destination,
        workspace: "electric.gdb".to_string(),
    }
}

fn text_row(store: &InMemoryStore, class: ClassId, oid: i64, field: &str, value: &str) {
    store
        .insert_row(class, oid, vec![(field, Value::from(value))], None)
        .unwrap();
}

/// Five poles at (10, 10) .. (50, 50) with units, attachments, inspections,
/// and unit tags hanging off them.
fn electric() -> InMemoryStore {
    let store = InMemoryStore::new();

    let mut pole = class(
        POLE,
        "Pole",
        &[("FACILITYID", FieldKind::Text), ("HEIGHT", FieldKind::Integer)],
        true,
    );
    pole.model_names = vec!["UtilityPole".to_string()];
    store.add_class(pole);
    store.add_class(class(UNIT, "PoleUnit", &[("SERIAL", FieldKind::Text)], false));
    store.add_class(class(ATTACHMENT, "PoleAttachment", &[("OWNER", FieldKind::Text)], false));
    store.add_class(class(INSPECTION, "PoleInspection", &[("NOTES", FieldKind::Text)], false));
    store.add_class(class(TAG, "UnitTag", &[("TAGNO", FieldKind::Text)], false));

    for oid in 1..=5 {
        let at = (oid * 10) as f64;
        store
            .insert_row(
                POLE,
                oid,
                vec![
                    ("FACILITYID", Value::from(format!("P-00{}", oid))),
                    ("HEIGHT", Value::Integer(30 + oid)),
                ],
                Some(Envelope::point(at, at)),
            )
            .unwrap();
    }

    text_row(&store, UNIT, 20, "SERIAL", "SN-123-A");
    text_row(&store, UNIT, 21, "SERIAL", "SN-999");
    text_row(&store, UNIT, 22, "SERIAL", "shared");
    text_row(&store, ATTACHMENT, 30, "OWNER", "ACME 123");
    text_row(&store, ATTACHMENT, 31, "OWNER", "shared");
    text_row(&store, INSPECTION, 40, "NOTES", "ticket 123");
    text_row(&store, INSPECTION, 400, "NOTES", "ticket 123 orphan");
    text_row(&store, TAG, 50, "TAGNO", "T-77");

    store.add_relationship(relationship(10, "PoleHasUnit", POLE, UNIT));
    store.add_relationship(relationship(11, "PoleHasAttachment", POLE, ATTACHMENT));
    store.add_relationship(relationship(12, "PoleHasInspection", POLE, INSPECTION));
    store.add_relationship(relationship(13, "UnitHasTag", UNIT, TAG));
    store.add_relationship(relationship(-1, "PolePlaceholder", POLE, INSPECTION));

    store.relate("PoleHasUnit", 1, 20).unwrap();
    store.relate("PoleHasUnit", 2, 21).unwrap();
    store.relate("PoleHasUnit", 4, 22).unwrap();
    store.relate("PoleHasAttachment", 2, 30).unwrap();
    store.relate("PoleHasAttachment", 4, 31).unwrap();
    store.relate("PoleHasInspection", 3, 40).unwrap();
    store.relate("PolePlaceholder", 5, 400).unwrap();
    store.relate("UnitHasTag", 21, 50).unwrap();

    store
}

fn session() -> Session {
    Session {
        layers: vec![Layer::new("Poles", POLE)],
        tables: vec![
            StandaloneTable::new("PoleUnit", UNIT),
            StandaloneTable::new("PoleInspection", INSPECTION),
        ],
        extent: None,
    }
}

fn poles(keyword: &str) -> SearchRequest {
    SearchRequest::new(keyword).with_item(
        SearchableTable::feature_class("Pole").with_field(SearchableField::keyword("FACILITYID")),
    )
}

fn oids(response: &graphfind_core::SearchableResponse, name: &str) -> BTreeSet<i64> {
    response
        .get(name)
        .map(|ids| ids.iter().copied().collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_relationship_free_search_equals_direct_query() {
    let store = electric();
    let request = poles("p-00");
    let response = find(&store, &session(), &request).await.unwrap();

    let pole = store.object_class(POLE).await.unwrap().unwrap();
    let clause = expression::compile(
        &pole,
        &request.keyword,
        request.comparison_operator,
        request.logical_operator,
        &request.items[0].fields,
    )
    .unwrap();
    let direct: BTreeSet<i64> = store
        .query(&pole, &clause)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.oid)
        .collect();

    assert_eq!(oids(&response, "Pole"), direct);
    assert_eq!(direct.len(), 5);
    assert_eq!(response.len(), 1);
}

#[tokio::test]
async fn test_any_relationship_spans_every_relationship_class() {
    let request = SearchRequest::new("123").with_item(
        SearchableTable::feature_class("Pole")
            .with_field(SearchableField::keyword("FACILITYID"))
            .with_relationship(
                SearchableRelationship::new("Any").with_field(SearchableField::any()),
            ),
    );
    let response = find(&electric(), &session(), &request).await.unwrap();

    // Unit 20, attachment 30, and inspection 40 lead to poles 1, 2, and 3.
    // Inspection 400 is only reachable through the placeholder class.
    assert_eq!(oids(&response, "Pole"), BTreeSet::from([1, 2, 3]));
    assert_eq!(response.len(), 1);
}

#[tokio::test]
async fn test_record_reached_twice_is_recorded_once() {
    let request = SearchRequest::new("shared").with_item(
        SearchableTable::feature_class("Pole")
            .with_relationship(
                SearchableRelationship::new("PoleHasUnit")
                    .with_field(SearchableField::keyword("SERIAL")),
            )
            .with_relationship(
                SearchableRelationship::new("PoleHasAttachment")
                    .with_field(SearchableField::keyword("OWNER")),
            ),
    );
    let response = find(&electric(), &session(), &request).await.unwrap();
    assert_eq!(response.get("Pole"), Some(&[4][..]));
    assert_eq!(response.count(), 1);
}

#[tokio::test]
async fn test_threshold_stops_search_early() {
    let store = electric();
    let mut request = poles("P-00");
    request.threshold = 3;
    request.items[0]
        .relationships
        .push(SearchableRelationship::new("Any").with_field(SearchableField::any()));

    let response = find(&store, &session(), &request).await.unwrap();
    assert_eq!(response.count(), 3);
    assert_eq!(response.get("Pole"), Some(&[1, 2, 3][..]));
    // Relationship traversal never ran.
    assert_eq!(store.query_count(), 1);
}

#[tokio::test]
async fn test_within_current_extent_excludes_outside_features() {
    let mut session = session();
    session.extent = Some(Envelope::new(0.0, 0.0, 25.0, 25.0));

    let mut request = poles("P-00");
    request.extent = ExtentMode::WithinCurrentExtent;
    let response = find(&electric(), &session, &request).await.unwrap();
    assert_eq!(oids(&response, "Pole"), BTreeSet::from([1, 2]));

    // Features reached through relationships are filtered the same way.
    let mut request = SearchRequest::new("123").with_item(
        SearchableTable::feature_class("Pole").with_relationship(
            SearchableRelationship::new("Any").with_field(SearchableField::any()),
        ),
    );
    request.extent = ExtentMode::WithinCurrentExtent;
    let response = find(&electric(), &session, &request).await.unwrap();
    assert_eq!(oids(&response, "Pole"), BTreeSet::from([1, 2]));

    request.extent = ExtentMode::WithinAnyExtent;
    let response = find(&electric(), &session, &request).await.unwrap();
    assert_eq!(oids(&response, "Pole"), BTreeSet::from([1, 2, 3]));
}

#[tokio::test]
async fn test_nested_relationship_walks_back_to_layer() {
    let request = SearchRequest::new("t-77").with_item(
        SearchableTable::feature_class("Pole").with_relationship(
            SearchableRelationship::new("PoleHasUnit").with_relationship(
                SearchableRelationship::new("UnitHasTag")
                    .with_field(SearchableField::keyword("TAGNO")),
            ),
        ),
    );
    let response = find(&electric(), &session(), &request).await.unwrap();
    assert_eq!(response.get("Pole"), Some(&[2][..]));
}

#[tokio::test]
async fn test_table_item_attaches_to_related_layer() {
    let request = SearchRequest::new("SN-").with_item(
        SearchableTable::table("PoleUnit")
            .with_field(SearchableField::keyword("SERIAL"))
            .with_relationship(SearchableRelationship::new("PoleHasUnit")),
    );
    let response = find(&electric(), &session(), &request).await.unwrap();
    assert_eq!(oids(&response, "Pole"), BTreeSet::from([1, 2]));
    assert!(response.get("PoleUnit").is_none());
}

#[tokio::test]
async fn test_table_item_without_relationships_records_rows() {
    let request = SearchRequest::new("ticket").with_item(
        SearchableTable::table("PoleInspection").with_field(SearchableField::keyword("NOTES")),
    );
    let response = find(&electric(), &session(), &request).await.unwrap();
    assert_eq!(response.get("PoleInspection"), Some(&[40, 400][..]));
}

#[tokio::test]
async fn test_relationship_in_other_database_is_skipped() {
    let store = electric();
    store.add_class(ObjectClass {
        workspace: "gas.gdb".to_string(),
        ..class(ClassId(6), "Vault", &[("NAME", FieldKind::Text)], false)
    });
    text_row(&store, ClassId(6), 60, "NAME", "V-1");
    store.add_relationship(RelationshipClass {
        workspace: "gas.gdb".to_string(),
        ..relationship(14, "VaultHasPole", ClassId(6), POLE)
    });
    store.relate("VaultHasPole", 60, 1).unwrap();

    let mut session = session();
    session.tables.push(StandaloneTable::new("Vault", ClassId(6)));
    let request = SearchRequest::new("V-").with_item(
        SearchableTable::table("Vault")
            .with_field(SearchableField::keyword("NAME"))
            .with_relationship(SearchableRelationship::new("VaultHasPole")),
    );
    let response = find(&store, &session, &request).await.unwrap();
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_class_model_name_matching() {
    let mut request = SearchRequest::new("P-001").with_item(
        SearchableTable::feature_class("UtilityPole")
            .with_field(SearchableField::keyword("FACILITYID")),
    );
    let response = find(&electric(), &session(), &request).await.unwrap();
    assert!(response.is_empty());

    request.items[0].name_as_class_model_name = true;
    let response = find(&electric(), &session(), &request).await.unwrap();
    assert_eq!(response.get("Pole"), Some(&[1][..]));
}

#[tokio::test]
async fn test_visible_field_ignores_keyword() {
    let request = SearchRequest::new("unrelated").with_item(
        SearchableTable::feature_class("Pole")
            .with_field(SearchableField::visible("FACILITYID", "p-005")),
    );
    let response = find(&electric(), &session(), &request).await.unwrap();
    assert_eq!(response.get("Pole"), Some(&[5][..]));
}

#[tokio::test]
async fn test_unknown_field_fails_search() {
    let request = SearchRequest::new("x").with_item(
        SearchableTable::feature_class("Pole").with_field(SearchableField::keyword("COLOR")),
    );
    let err = find(&electric(), &session(), &request).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<SearchError>(),
        Some(&SearchError::FieldNotFound {
            class: "Pole".to_string(),
            field: "COLOR".to_string(),
        })
    );
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let store = electric();
    store.set_offline(true);
    let err = find(&store, &session(), &poles("P")).await.unwrap_err();
    assert!(err.to_string().contains("connection lost"));
    assert!(err.downcast_ref::<SearchError>().is_none());
}

#[tokio::test]
async fn test_repeated_search_is_idempotent() {
    let store = electric();
    let request = SearchRequest::new("123").with_item(
        SearchableTable::feature_class("Pole").with_relationship(
            SearchableRelationship::new("Any").with_field(SearchableField::any()),
        ),
    );
    let first = find(&store, &session(), &request).await.unwrap();
    let second = find(&store, &session(), &request).await.unwrap();
    assert_eq!(first.to_sets(), second.to_sets());
}

#[tokio::test]
async fn test_empty_item_name_is_rejected() {
    let request = SearchRequest::new("x").with_item(SearchableTable::table(" "));
    let err = find(&electric(), &session(), &request).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SearchError>(),
        Some(SearchError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_spaced_and_reserved_field_names() {
    let store = InMemoryStore::new();
    store.add_class(class(
        POLE,
        "Pole",
        &[("Owner Name", FieldKind::Text), ("ORDER", FieldKind::Integer)],
        true,
    ));
    store
        .insert_row(
            POLE,
            1,
            vec![("Owner Name", Value::from("J. Smith")), ("ORDER", Value::Integer(7))],
            Some(Envelope::point(1.0, 1.0)),
        )
        .unwrap();
    store
        .insert_row(
            POLE,
            2,
            vec![("Owner Name", Value::from("Jones")), ("ORDER", Value::Integer(8))],
            Some(Envelope::point(2.0, 2.0)),
        )
        .unwrap();

    let by_owner = SearchRequest::new("smith").with_item(
        SearchableTable::feature_class("Pole").with_field(SearchableField::keyword("Owner Name")),
    );
    let response = find(&store, &session(), &by_owner).await.unwrap();
    assert_eq!(oids(&response, "Pole"), BTreeSet::from([1]));

    let by_order = SearchRequest::new("8").with_item(
        SearchableTable::feature_class("Pole").with_field(SearchableField::keyword("ORDER")),
    );
    let response = find(&store, &session(), &by_order).await.unwrap();
    assert_eq!(oids(&response, "Pole"), BTreeSet::from([2]));
}

#[tokio::test]
async fn test_non_ascii_keyword_matches_exact_accent() {
    let store = electric();
    store
        .insert_row(
            POLE,
            6,
            vec![("FACILITYID", Value::from("Café-1")), ("HEIGHT", Value::Integer(30))],
            Some(Envelope::point(60.0, 60.0)),
        )
        .unwrap();

    let response = find(&store, &session(), &poles("café")).await.unwrap();
    assert_eq!(oids(&response, "Pole"), BTreeSet::from([6]));
    let response = find(&store, &session(), &poles("CAFÉ")).await.unwrap();
    assert!(response.is_empty());
}
