//! Edge case tests for tandem-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use std::cell::Cell;

use serde_json::{json, Value};
use tandem_engine::{
    diff, Applied, ApplyOptions, Attributes, ChildEvent, Error, KeyGenerator, Options, Priority,
    RecordId, RemoteWrite, Replica, Snapshot, SortOrder, PRIORITY_FIELD,
};

struct Sequence(Cell<u64>);

impl KeyGenerator for Sequence {
    fn generate_key(&self) -> RecordId {
        self.0.set(self.0.get() + 1);
        format!("gen_{:04}", self.0.get())
    }
}

fn keys() -> Sequence {
    Sequence(Cell::new(0))
}

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().unwrap()
}

fn remote() -> ApplyOptions {
    ApplyOptions::remote()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn empty_string_fields() {
    let mut replica = Replica::new();
    replica
        .add(vec![attrs(json!({"id": "1", "name": ""}))], Options::default(), &keys())
        .unwrap();

    assert_eq!(replica.get("1").unwrap().get("name"), Some(&json!("")));
}

#[test]
fn unicode_strings() {
    let mut replica = Replica::new();
    let names = ["日本語テスト", "Привет мир", "🎉🚀💯", "Hello\nWorld\tTab"];

    for (i, name) in names.iter().enumerate() {
        replica
            .apply(
                ChildEvent::Added(Snapshot::new(format!("k{}", i), json!({"name": name}))),
                remote(),
            )
            .unwrap();
        assert_eq!(replica.get(&format!("k{}", i)).unwrap().get("name"), Some(&json!(name)));
    }
}

// ============================================================================
// Identifier Edge Cases
// ============================================================================

#[test]
fn numeric_id_becomes_string() {
    let mut replica = Replica::new();
    let mutation = replica
        .add(vec![attrs(json!({"id": 7, "name": "x"}))], Options::default(), &keys())
        .unwrap();

    assert_eq!(mutation.records[0].id, "7");
    assert!(replica.get("7").is_some());
}

#[test]
fn object_id_is_rejected() {
    let mut replica = Replica::new();
    let result = replica.add(vec![attrs(json!({"id": {"nested": 1}}))], Options::default(), &keys());

    assert!(matches!(result, Err(Error::InvalidId(_))));
    assert!(replica.is_empty());
}

#[test]
fn id_in_remote_value_is_not_an_attribute() {
    let mut replica = Replica::new();
    replica
        .apply(
            ChildEvent::Added(Snapshot::new("k1", json!({"id": "other", "a": 1}))),
            remote(),
        )
        .unwrap();

    let record = replica.get("k1").unwrap();
    assert_eq!(record.id, "k1");
    assert!(!record.has("id"));
    assert_eq!(record.payload(), json!({"id": "k1", "a": 1}));
}

#[test]
fn generated_ids_are_distinct() {
    let mut replica = Replica::new();
    let models = (0..50).map(|_| attrs(json!({"x": 1}))).collect();
    replica.add(models, Options::default(), &keys()).unwrap();

    assert_eq!(replica.len(), 50);
}

// ============================================================================
// Priority Edge Cases
// ============================================================================

#[test]
fn null_priority_clears() {
    let mut replica = Replica::new();
    replica
        .add(
            vec![attrs(json!({"id": "1", ".priority": 5, "a": 1}))],
            Options::default(),
            &keys(),
        )
        .unwrap();

    let write = replica
        .set("1", attrs(json!({"a": 1, ".priority": null})), Options::default())
        .unwrap();

    assert!(replica.get("1").unwrap().priority().is_none());
    assert_eq!(
        write,
        Some(RemoteWrite::Whole {
            id: "1".into(),
            value: json!({"id": "1", "a": 1}),
        })
    );
}

#[test]
fn boolean_priority_rejected() {
    let mut replica = Replica::new();
    replica
        .add(vec![attrs(json!({"id": "1"}))], Options::default(), &keys())
        .unwrap();

    let result = replica.set("1", attrs(json!({".priority": false})), Options::default());
    assert!(matches!(result, Err(Error::InvalidPriority(_))));
}

#[test]
fn text_priorities_sort_after_numbers() {
    let mut replica = Replica::with_order(SortOrder::Priority);
    let events = [
        Snapshot::with_priority("s", json!({}), Priority::from("a")),
        Snapshot::with_priority("n", json!({}), Priority::from(100i64)),
        Snapshot::new("none", json!({})),
    ];
    for snapshot in events {
        replica.apply(ChildEvent::Added(snapshot), remote()).unwrap();
    }

    assert_eq!(replica.collection().ids(), &["none", "n", "s"]);
}

#[test]
fn priority_never_stored_as_attribute() {
    let mut replica = Replica::new();
    replica
        .add(vec![attrs(json!({"id": "1", ".priority": "p"}))], Options::default(), &keys())
        .unwrap();

    let record = replica.get("1").unwrap();
    assert!(!record.has(PRIORITY_FIELD));
    assert_eq!(record.to_json()[PRIORITY_FIELD], json!("p"));
}

// ============================================================================
// JSON Edge Cases
// ============================================================================

#[test]
fn nested_values_diff_as_whole_fields() {
    let remote = attrs(json!({"profile": {"name": "A", "tags": ["x"]}}));
    let local = attrs(json!({"profile": {"name": "A", "tags": ["x", "y"]}}));

    let patch = diff(&remote, &local);
    assert_eq!(
        patch.to_value(),
        json!({"profile": {"name": "A", "tags": ["x", "y"]}})
    );
}

#[test]
fn null_attribute_unsets_field() {
    let mut replica = Replica::new();
    replica
        .add(vec![attrs(json!({"id": "1", "a": 1, "b": 2}))], Options::default(), &keys())
        .unwrap();

    let write = replica
        .update("1", Options::default(), |record| {
            record.set("a", Value::Null);
        })
        .unwrap();

    assert!(!replica.get("1").unwrap().has("a"));
    match write {
        Some(RemoteWrite::Partial { patch, .. }) => assert_eq!(patch.to_value(), json!({"a": null})),
        other => panic!("expected partial write, got {:?}", other),
    }
}

// ============================================================================
// Event Ordering Edge Cases
// ============================================================================

#[test]
fn echo_of_own_add_is_ignored() {
    let mut replica = Replica::new();
    let mutation = replica
        .add(vec![attrs(json!({"title": "x"}))], Options::default(), &keys())
        .unwrap();
    let id = mutation.records[0].id.clone();

    let applied = replica
        .apply(ChildEvent::Added(Snapshot::new(id.clone(), json!({"id": id, "title": "x"}))), remote())
        .unwrap();

    assert_eq!(applied, Applied::Ignored);
    assert_eq!(replica.len(), 1);
}

#[test]
fn echo_of_own_update_is_unchanged() {
    let mut replica = Replica::new();
    replica
        .add(vec![attrs(json!({"id": "1", "n": 1}))], Options::default(), &keys())
        .unwrap();
    replica
        .set("1", attrs(json!({"n": 2})), Options::default())
        .unwrap();

    let applied = replica
        .apply(ChildEvent::Changed(Snapshot::new("1", json!({"id": "1", "n": 2}))), remote())
        .unwrap();

    assert_eq!(applied, Applied::Unchanged);
}

#[test]
fn remote_change_after_local_edit_wins() {
    let mut replica = Replica::new();
    replica
        .add(vec![attrs(json!({"id": "1", "n": 1}))], Options::default(), &keys())
        .unwrap();
    replica
        .set("1", attrs(json!({"n": 2})), Options::default())
        .unwrap();

    replica
        .apply(ChildEvent::Changed(Snapshot::new("1", json!({"n": 3}))), remote())
        .unwrap();

    assert_eq!(replica.get("1").unwrap().get("n"), Some(&json!(3)));
    assert_eq!(replica.shadow("1").unwrap().get("n"), Some(&json!(3)));
}

#[test]
fn remove_then_remote_remove_is_ignored() {
    let mut replica = Replica::new();
    replica
        .add(vec![attrs(json!({"id": "1"}))], Options::default(), &keys())
        .unwrap();
    replica.remove(["1"], Options::default());

    let applied = replica
        .apply(ChildEvent::Removed(Snapshot::new("1", Value::Null)), remote())
        .unwrap();
    assert_eq!(applied, Applied::Ignored);
}

#[test]
fn moved_for_unknown_id_is_ignored() {
    let mut replica = Replica::new();
    let applied = replica
        .apply(
            ChildEvent::Moved(Snapshot::with_priority("ghost", json!({}), Priority::from(1i64))),
            remote(),
        )
        .unwrap();

    assert_eq!(applied, Applied::Ignored);
    assert!(replica.is_empty());
}

// ============================================================================
// Bulk Edge Cases
// ============================================================================

#[test]
fn reset_with_empty_models_clears() {
    let mut replica = Replica::new();
    let models = (0..10).map(|i| attrs(json!({"id": i}))).collect();
    replica.add(models, Options::silent(), &keys()).unwrap();

    let mutation = replica.reset(Vec::new(), Options::default(), &keys()).unwrap();

    assert!(replica.is_empty());
    assert_eq!(mutation.writes.len(), 10);
    assert!(mutation
        .writes
        .iter()
        .all(|w| matches!(w, RemoteWrite::Remove { .. })));
}

#[test]
fn many_remote_events() {
    let mut replica = Replica::new();
    for i in 0..1000 {
        replica
            .apply(
                ChildEvent::Added(Snapshot::new(format!("k{:04}", i), json!({"i": i}))),
                remote(),
            )
            .unwrap();
    }
    for i in (0..1000).step_by(2) {
        replica
            .apply(ChildEvent::Removed(Snapshot::new(format!("k{:04}", i), Value::Null)), remote())
            .unwrap();
    }

    assert_eq!(replica.len(), 500);
    assert_eq!(replica.collection().at(0).unwrap().id, "k0001");
}
