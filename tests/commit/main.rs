//! Commit protocol integration tests: conflicts, atomicity, the action log
//! and kollection membership under concurrent writers.

#[path = "../support/mod.rs"]
mod support;

mod concurrent;

use serde_json::{json, Value};
use sourced_views::commit::execute_commit;
use sourced_views::store::{action_path, decode, kollection_path};
use sourced_views::{
    ActionId, ActionIdGenerator, CommitBuilder, CommitOutcome, Conflict, DocumentStore, FacetId,
    InMemoryDocumentStore, Key, Kollection, ManualClock, ReadTracker, SavedAction, Schema,
};
use std::sync::Arc;

use support::{close, engine, join};

fn ids() -> ActionIdGenerator {
    ActionIdGenerator::new("a", 12, Arc::new(ManualClock::new(0)))
}

fn saved(store: &InMemoryDocumentStore, id: &ActionId) -> SavedAction<Value> {
    decode(store.get(&action_path(id.as_str())).unwrap().unwrap()).unwrap()
}

#[test]
fn stale_reader_loses_with_zero_writes() {
    let store = InMemoryDocumentStore::new();
    let g1 = FacetId::new("game", Key::from(["g1"]));
    let schema = Schema::new(["game"]);

    // A1: the game exists.
    let tracker = ReadTracker::new();
    tracker.observe_facet(&store, &g1).unwrap();
    let a1 = match CommitBuilder::new(json!({"n": 1}))
        .diff("game", &schema, &sourced_views::Diff::add(g1.key.clone(), json!(1)))
        .read_set(tracker.read_set().unwrap())
        .commit(&store, &ids())
        .unwrap()
    {
        CommitOutcome::Committed { action_id } => action_id,
        other => panic!("unexpected {:?}", other),
    };

    // Two integrations both read g1 at A1.
    let first = ReadTracker::new();
    let second = ReadTracker::new();
    assert_eq!(first.observe_facet(&store, &g1).unwrap(), Some(a1.clone()));
    assert_eq!(second.observe_facet(&store, &g1).unwrap(), Some(a1.clone()));

    let replace = sourced_views::Diff::replace(g1.key.clone(), json!(1), json!(2));
    let a2 = CommitBuilder::new(json!({"n": 2}))
        .diff("game", &schema, &replace)
        .read_set(first.read_set().unwrap())
        .commit(&store, &ids())
        .unwrap();
    let a2 = match a2 {
        CommitOutcome::Committed { action_id } => action_id,
        other => panic!("unexpected {:?}", other),
    };

    let before = store.dump().unwrap();
    let outcome = CommitBuilder::new(json!({"n": 3}))
        .diff("game", &schema, &sourced_views::Diff::replace(g1.key.clone(), json!(1), json!(3)))
        .read_set(second.read_set().unwrap())
        .commit(&store, &ids())
        .unwrap();
    assert_eq!(
        outcome,
        CommitOutcome::Conflict {
            conflicts: vec![Conflict::Facet {
                facet: g1.clone(),
                expected: Some(a1),
                actual: Some(a2),
            }]
        }
    );
    assert_eq!(store.dump().unwrap(), before);
}

#[test]
fn each_action_records_the_versions_it_read() {
    let engine = engine();
    let first = join(&engine, "g1", "alice").unwrap();
    let second = join(&engine, "g1", "bob").unwrap();

    assert!(saved(engine.store(), &first).parents.is_empty());
    let child = saved(engine.store(), &second);
    assert!(child.parents.contains(&first));
    assert_eq!(child.action["player"], "bob");
    assert!(second.happened_after(&first).unwrap());
}

#[test]
fn membership_follows_status() {
    let engine = engine();
    join(&engine, "g1", "alice").unwrap();
    join(&engine, "g2", "bob").unwrap();

    let open = |engine: &sourced_views::Engine<InMemoryDocumentStore>| -> Vec<FacetId> {
        match engine.store().get(&kollection_path("open")).unwrap() {
            Some(doc) => decode::<Kollection>(doc).unwrap().members,
            None => vec![],
        }
    };
    assert_eq!(
        open(&engine),
        vec![
            FacetId::new("game", Key::from(["g1"])),
            FacetId::new("game", Key::from(["g2"]))
        ]
    );

    close(&engine, "g1").unwrap();
    assert_eq!(open(&engine), vec![FacetId::new("game", Key::from(["g2"]))]);
}

#[test]
fn exports_are_committed_with_the_facet() {
    let engine = engine();
    join(&engine, "g1", "alice").unwrap();
    join(&engine, "g2", "alice").unwrap();
    join(&engine, "g2", "bob").unwrap();

    assert_eq!(
        engine.export_row("playerGameCount", &Key::from(["alice"])).unwrap(),
        Some(json!(2))
    );
    assert_eq!(
        engine.export_row("playerGameCount", &Key::from(["bob"])).unwrap(),
        Some(json!(1))
    );
    assert_eq!(
        engine.export_row("gamesByPlayer", &Key::from(["bob", "g2"])).unwrap(),
        Some(json!({}))
    );
}

#[test]
fn execute_commit_accepts_a_prebuilt_commit() {
    let store = InMemoryDocumentStore::new();
    let tracker = ReadTracker::new();
    let g1 = FacetId::new("game", Key::from(["g1"]));
    tracker.observe_facet(&store, &g1).unwrap();
    let commit = CommitBuilder::new(json!({}))
        .diff("game", &Schema::new(["game"]), &sourced_views::Diff::add(g1.key.clone(), json!(1)))
        .read_set(tracker.read_set().unwrap())
        .build()
        .unwrap();
    assert_eq!(commit.writes.len(), 1);
    assert!(execute_commit(&store, &ids(), commit).unwrap().is_committed());
}
