//! Batch job integration tests: paging, drift detection and backfill.

#[path = "../support/mod.rs"]
mod support;

use serde_json::{json, Value};
use sourced_views::jobs::{forwards_check_page, Difference};
use sourced_views::store::Transaction;
use sourced_views::{
    backfill_page, backwards_check_page, run_job, BatchConfig, CollectionGroup, CollectionPath,
    Cursor, DocumentStore, Engine, InMemoryDocumentStore, JobError, JobKind, Key, StoreError,
};

use support::{engine, join};

fn seeded() -> Engine<InMemoryDocumentStore> {
    let engine = engine();
    join(&engine, "g1", "alice").unwrap();
    join(&engine, "g1", "bob").unwrap();
    join(&engine, "g2", "alice").unwrap();
    engine
}

fn groups(engine: &Engine<InMemoryDocumentStore>) -> Vec<CollectionGroup> {
    engine.collection_groups().unwrap()
}

fn tamper(engine: &Engine<InMemoryDocumentStore>, export: &str, key: Key, value: Option<Value>) {
    tamper_at(engine, engine.export_path(export).unwrap(), key, value);
}

fn tamper_at(
    engine: &Engine<InMemoryDocumentStore>,
    collection: CollectionPath,
    key: Key,
    value: Option<Value>,
) {
    let path = collection.doc_path(&key).unwrap();
    engine
        .store()
        .transaction(|tx: &mut dyn Transaction| -> Result<(), StoreError> {
            match value {
                Some(value) => tx.set(path, value),
                None => tx.delete(path),
            }
        })
        .unwrap();
}

#[test]
fn live_writes_leave_nothing_to_fix() {
    let engine = seeded();
    let groups = groups(&engine);
    let config = BatchConfig::default();

    let names: Vec<&str> = groups.iter().map(|group| group.name.as_str()).collect();
    assert_eq!(names, vec!["seats", "gamesByPlayer", "playerGameCount"]);

    let forwards = run_job(JobKind::ForwardsCheck, &engine, &groups, &config).unwrap();
    assert!(forwards.is_consistent());
    assert_eq!(forwards.processed, 8);

    let backwards = run_job(JobKind::BackwardsCheck, &engine, &groups, &config).unwrap();
    assert_eq!(backwards.processed, 8);

    let backfill = run_job(JobKind::Backfill, &engine, &groups, &config).unwrap();
    assert_eq!(backfill.written, 0);
}

#[test]
fn pages_walk_every_group() {
    let engine = seeded();
    let groups = groups(&engine);
    let config = BatchConfig::default().with_page_size(2);

    let first = forwards_check_page(&engine, &groups, &Cursor::start(), &config).unwrap();
    assert_eq!(first.processed, 2);
    assert_eq!(first.cursor.group, 0);
    assert_eq!(first.cursor.after, Some(Key::from(["alice", "g2"])));

    let second = forwards_check_page(&engine, &groups, &first.cursor, &config).unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.cursor.group, 1);
    assert_eq!(second.cursor.after, None);

    // The cursor survives a trip through its opaque form.
    let resumed = Cursor::from_token(&second.cursor.to_token().unwrap()).unwrap();
    let third = forwards_check_page(&engine, &groups, &resumed, &config).unwrap();
    assert_eq!(third.processed, 2);
    assert_eq!(third.cursor.group, 1);
    assert_eq!(third.cursor.after, Some(Key::from(["alice", "g2"])));

    let fourth = forwards_check_page(&engine, &groups, &third.cursor, &config).unwrap();
    assert_eq!(fourth.processed, 1);
    assert_eq!(fourth.cursor.group, 2);

    let fifth = forwards_check_page(&engine, &groups, &fourth.cursor, &config).unwrap();
    assert_eq!(fifth.processed, 2);
    assert!(fifth.cursor.done);

    let summary = run_job(JobKind::ForwardsCheck, &engine, &groups, &config).unwrap();
    assert_eq!(summary.pages, 5);
}

#[test]
fn forwards_check_reports_drift_without_fixing_it() {
    let engine = seeded();
    tamper(&engine, "playerGameCount", Key::from(["alice"]), Some(json!(7)));
    let groups = groups(&engine);

    let summary =
        run_job(JobKind::ForwardsCheck, &engine, &groups, &BatchConfig::default()).unwrap();
    assert_eq!(summary.inconsistencies.len(), 1);
    let drift = &summary.inconsistencies[0];
    assert_eq!(drift.group, "playerGameCount");
    assert_eq!(drift.key, Key::from(["alice"]));
    assert_eq!(drift.expected, json!(2));
    assert_eq!(
        drift.differences,
        vec![Difference {
            path: String::new(),
            expected: Some(json!(2)),
            actual: Some(json!(7)),
        }]
    );

    // Backfill never overwrites.
    let backfill = run_job(JobKind::Backfill, &engine, &groups, &BatchConfig::default()).unwrap();
    assert_eq!(backfill.written, 0);
    assert_eq!(
        engine.export_row("playerGameCount", &Key::from(["alice"])).unwrap(),
        Some(json!(7))
    );
}

#[test]
fn backfill_restores_missing_rows() {
    let engine = seeded();
    tamper(&engine, "gamesByPlayer", Key::from(["bob", "g1"]), None);
    let groups = groups(&engine);
    let config = BatchConfig::default().with_page_size(1);

    let check = run_job(JobKind::ForwardsCheck, &engine, &groups, &config).unwrap();
    assert_eq!(check.inconsistencies.len(), 1);
    assert_eq!(check.inconsistencies[0].actual, None);

    let mut cursor = Cursor::start();
    let mut written = 0;
    while !cursor.done {
        let report = backfill_page(&engine, &groups, &cursor, &config).unwrap();
        written += report.written;
        cursor = report.cursor;
    }
    assert_eq!(written, 1);
    assert_eq!(
        engine.export_row("gamesByPlayer", &Key::from(["bob", "g1"])).unwrap(),
        Some(json!({}))
    );
    assert!(run_job(JobKind::ForwardsCheck, &engine, &groups, &config)
        .unwrap()
        .is_consistent());
}

#[test]
fn persisted_sort_is_checked_against_its_inputs() {
    let engine = seeded();
    let seats = engine.sorted_path("seats").unwrap();
    tamper_at(&engine, seats, Key::from(["bob", "g1"]), None);
    let groups = groups(&engine);
    let config = BatchConfig::default();

    let check = run_job(JobKind::ForwardsCheck, &engine, &groups, &config).unwrap();
    assert_eq!(check.inconsistencies.len(), 1);
    assert_eq!(check.inconsistencies[0].group, "seats");
    assert_eq!(check.inconsistencies[0].key, Key::from(["bob", "g1"]));

    let backfill = run_job(JobKind::Backfill, &engine, &groups, &config).unwrap();
    assert_eq!(backfill.written, 1);
    assert_eq!(
        engine.sorted_row("seats", &Key::from(["bob", "g1"])).unwrap(),
        Some(json!({}))
    );
    assert!(run_job(JobKind::ForwardsCheck, &engine, &groups, &config)
        .unwrap()
        .is_consistent());
}

#[test]
fn backwards_check_halts_on_unexpected_rows() {
    let engine = seeded();
    tamper(&engine, "gamesByPlayer", Key::from(["mallory", "g1"]), Some(json!({})));
    let groups = groups(&engine);

    // The seats sort is untouched, so its page passes.
    let seats = backwards_check_page(&engine, &groups, &Cursor::start(), &BatchConfig::default())
        .unwrap();
    assert_eq!(seats.cursor.group, 1);

    let err = backwards_check_page(&engine, &groups, &seats.cursor, &BatchConfig::default())
        .unwrap_err();
    assert_eq!(
        err,
        JobError::UnexpectedKey {
            group: "gamesByPlayer".into(),
            key: Key::from(["mallory", "g1"]),
        }
    );
    assert!(run_job(JobKind::BackwardsCheck, &engine, &groups, &BatchConfig::default()).is_err());
}

#[test]
fn cursor_past_the_last_group_is_invalid() {
    let engine = seeded();
    let groups = groups(&engine);
    let cursor = Cursor {
        group: 9,
        after: None,
        done: false,
    };
    assert!(matches!(
        backfill_page(&engine, &groups, &cursor, &BatchConfig::default()),
        Err(JobError::InvalidCursor(_))
    ));
}
