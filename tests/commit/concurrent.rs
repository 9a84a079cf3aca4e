use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::{json, Value};
use sourced_views::store::{decode, DocPath};
use sourced_views::{
    run_job, ActionId, ActionIdGenerator, BatchConfig, CommitBuilder, Diff, DocumentStore, Engine,
    EngineConfig, FacetId, InMemoryDocumentStore, InputDiffs, IntegrateError, JobKind, Key,
    ManualClock, Membership, ReadTracker, SavedAction, Schema,
};

use crate::support::{engine_on, game, join, open_games};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn exactly_one_of_overlapping_commits_wins() {
    let store = InMemoryDocumentStore::new();
    let ids = ActionIdGenerator::new("a", 12, Arc::new(ManualClock::new(0)));
    let g1 = FacetId::new("game", Key::from(["g1"]));
    let tracker = ReadTracker::new();
    tracker.observe_facet(&store, &g1).unwrap();
    let read_set = tracker.read_set().unwrap();

    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));
    let handles: Vec<_> = (0..writers)
        .map(|n| {
            let store = store.clone();
            let ids = ids.clone();
            let read_set = read_set.clone();
            let barrier = Arc::clone(&barrier);
            let key = g1.key.clone();
            thread::spawn(move || {
                barrier.wait();
                CommitBuilder::new(json!({ "writer": n }))
                    .diff("game", &Schema::new(["game"]), &Diff::add(key, json!(n)))
                    .read_set(read_set)
                    .commit(&store, &ids)
                    .unwrap()
                    .is_committed()
            })
        })
        .collect();
    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(wins, 1);

    let actions = store
        .scan(&DocPath::new(["actions"]), std::ops::Bound::Unbounded, 100)
        .unwrap();
    assert_eq!(actions.len(), 1);
}

#[test]
fn concurrent_integrations_all_land_after_retries() {
    init_tracing();
    let engine = Arc::new(
        engine_on(InMemoryDocumentStore::new())
            .with_config(EngineConfig::new().with_max_commit_attempts(50)),
    );
    join(&engine, "g1", "host").unwrap();

    let players: Vec<String> = (0..6).map(|n| format!("p{}", n)).collect();
    let handles: Vec<_> = players
        .iter()
        .cloned()
        .map(|player| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || join(&engine, "g1", &player).unwrap())
        })
        .collect();
    let ids: Vec<ActionId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), players.len());

    let game = engine.facet("game", &Key::from(["g1"])).unwrap().unwrap();
    let seated: Vec<&str> = game["players"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(seated.len(), players.len() + 1);
    for player in &players {
        assert!(seated.contains(&player.as_str()));
        assert_eq!(
            engine.export_row("playerGameCount", &Key::from([player.as_str()])).unwrap(),
            Some(json!(1))
        );
    }

    // Every action is timestamped no earlier than its parents.
    let actions = engine
        .store()
        .scan(&DocPath::new(["actions"]), std::ops::Bound::Unbounded, 100)
        .unwrap();
    assert_eq!(actions.len(), players.len() + 1);
    for (path, doc) in actions {
        let id = ActionId::new(path.segments()[1].clone());
        let saved: SavedAction<Value> = decode(doc).unwrap();
        for parent in &saved.parents {
            assert!(id.happened_after(parent).unwrap());
        }
    }
}

/// Membership that, the first time `trigger` is written, seats `player` in
/// `game` through `other` before the writing commit lands.
fn interleave(
    other: Arc<Engine<InMemoryDocumentStore>>,
    trigger: &str,
    game: &'static str,
    player: &'static str,
) -> Membership {
    let trigger = FacetId::new("game", Key::from([trigger]));
    let fired = AtomicBool::new(false);
    let open = open_games();
    Arc::new(move |facet: &FacetId, value: &Value| -> BTreeSet<String> {
        if *facet == trigger && !fired.swap(true, Ordering::SeqCst) {
            join(&other, game, player).unwrap();
        }
        open(facet, value)
    })
}

/// Seat `player` in `game` on `engine`, counting integrator runs.
fn counted_join(
    engine: &Engine<InMemoryDocumentStore>,
    game_id: &str,
    player: &str,
) -> Result<usize, IntegrateError> {
    let key = Key::from([game_id]);
    let mut runs = 0;
    engine.integrate(json!({ "type": "join", "game": game_id, "player": player }), |ctx| {
        runs += 1;
        let diff = match ctx.get("game", &key)? {
            Some(old) => {
                let mut new = old.clone();
                new["players"]
                    .as_array_mut()
                    .ok_or_else(|| IntegrateError::integrator("game without players"))?
                    .push(json!(player));
                Diff::replace(key.clone(), old, new)
            }
            None => Diff::add(key.clone(), game(&[player])),
        };
        Ok(InputDiffs::from([("game".to_string(), vec![diff])]))
    })?;
    Ok(runs)
}

#[test]
fn shared_export_row_is_not_overwritten_by_a_stale_writer() {
    init_tracing();
    let store = InMemoryDocumentStore::new();
    let other = Arc::new(engine_on(store.clone()));
    join(&other, "g1", "p1").unwrap();

    // p1 joins g2 here while the other engine seats p1 in g3. The two
    // integrations touch different games but the same count row.
    let engine = engine_on(store).membership(interleave(other, "g2", "g3", "p1"));
    let runs = counted_join(&engine, "g2", "p1").unwrap();
    assert_eq!(runs, 2);

    assert_eq!(
        engine.export_row("playerGameCount", &Key::from(["p1"])).unwrap(),
        Some(json!(3))
    );
    let groups = engine.collection_groups().unwrap();
    let check = run_job(JobKind::ForwardsCheck, &engine, &groups, &BatchConfig::default()).unwrap();
    assert!(check.is_consistent(), "{:?}", check.inconsistencies);
}

#[test]
fn unrelated_games_do_not_conflict_through_a_sort() {
    init_tracing();
    let store = InMemoryDocumentStore::new();
    let other = Arc::new(engine_on(store.clone()));
    for n in 0..50 {
        join(&other, &format!("g{:02}", n), &format!("p{:02}", n)).unwrap();
    }

    let engine = engine_on(store).membership(interleave(other, "g00", "g49", "zz"));
    let runs = counted_join(&engine, "g00", "aa").unwrap();
    assert_eq!(runs, 1);

    assert_eq!(
        engine.export_row("playerGameCount", &Key::from(["aa"])).unwrap(),
        Some(json!(1))
    );
    assert_eq!(
        engine.export_row("playerGameCount", &Key::from(["zz"])).unwrap(),
        Some(json!(1))
    );
    assert_eq!(
        engine.sorted_row("seats", &Key::from(["zz", "g49"])).unwrap(),
        Some(json!({}))
    );
}
